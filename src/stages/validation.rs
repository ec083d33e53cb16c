use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifacts::{IngestionArtifact, ValidationArtifact};
use crate::config::DataValidationConfig;
use crate::error::ValidationError;
use crate::pipeline::PipelineContext;

/// How per-entry checks fold into the overall validation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// The status is whatever the last scanned entry produced. Earlier
    /// entries have no effect on the result.
    #[default]
    LastEntryWins,
    /// Every listed entry must be on the required-file list.
    AllEntriesRequired,
}

impl ValidationPolicy {
    /// Status after scanning one more entry, given the status so far
    /// (`None` before the first entry).
    pub fn combine(self, previous: Option<bool>, entry_allowed: bool) -> bool {
        match self {
            Self::LastEntryWins => entry_allowed,
            Self::AllEntriesRequired => previous.unwrap_or(true) && entry_allowed,
        }
    }

    /// Fold a sequence of entry names. An empty listing is `false`.
    pub fn evaluate<I, S>(self, entries: I, required: &[String]) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.evaluate_with(entries, required, |_, _| Ok::<_, Infallible>(())) {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }

    /// Like [`evaluate`](Self::evaluate), calling `on_step` with each entry
    /// name and the status after it. Stops at the first error.
    pub fn evaluate_with<I, S, F, E>(
        self,
        entries: I,
        required: &[String],
        mut on_step: F,
    ) -> Result<bool, E>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str, bool) -> Result<(), E>,
    {
        let mut status = None;
        for name in entries {
            let name = name.as_ref();
            let allowed = required.iter().any(|r| r == name);
            let current = self.combine(status, allowed);
            on_step(name, current)?;
            status = Some(current);
        }
        Ok(status.unwrap_or(false))
    }
}

pub fn status_line(status: bool) -> String {
    format!("Validation status: {status}")
}

pub struct DataValidation<'a> {
    ingestion: &'a IngestionArtifact,
    config: &'a DataValidationConfig,
}

impl<'a> DataValidation<'a> {
    pub fn new(ingestion: &'a IngestionArtifact, config: &'a DataValidationConfig) -> Self {
        Self { ingestion, config }
    }

    /// Compare the feature store's top-level entries against the required
    /// file list, rewriting the status file after every entry.
    pub fn validate(&self) -> Result<bool, ValidationError> {
        let feature_store = self.ingestion.feature_store_path();
        let list_err = |source| ValidationError::ListFeatureStore {
            path: feature_store.to_path_buf(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(feature_store).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        self.check_entries(&names)
    }

    /// Fold `names`, in the given order, through the configured policy and
    /// write the status file after each one.
    pub fn check_entries<S: AsRef<str>>(&self, names: &[S]) -> Result<bool, ValidationError> {
        self.config
            .policy
            .evaluate_with(names, &self.config.required_files, |name, status| {
                tracing::debug!(entry = %name, status, "checked feature store entry");
                self.write_status(status)
            })
    }

    fn write_status(&self, status: bool) -> Result<(), ValidationError> {
        let status_file = &self.config.status_file_path;
        let write_err = |source| ValidationError::WriteStatus {
            path: status_file.clone(),
            source,
        };
        fs::create_dir_all(&self.config.data_validation_dir).map_err(write_err)?;
        fs::write(status_file, status_line(status)).map_err(write_err)
    }

    /// Where a passing run copies the archive to
    fn copy_destination(&self) -> Result<PathBuf, ValidationError> {
        match &self.config.archive_copy_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(ValidationError::CopyDestination),
        }
    }

    /// Copy the archive into the copy destination. Returns `None` when the
    /// destination already is the archive itself.
    fn copy_archive(&self) -> Result<Option<PathBuf>, ValidationError> {
        let archive = self.ingestion.archive_path();
        let dest_dir = self.copy_destination()?;
        let dest = dest_dir.join(archive.file_name().unwrap_or(archive.as_os_str()));
        let copy_err = |source| ValidationError::CopyArchive {
            from: archive.to_path_buf(),
            to: dest.clone(),
            source,
        };

        // Copying a file onto itself truncates it.
        if dest.exists()
            && fs::canonicalize(&dest).map_err(copy_err)?
                == fs::canonicalize(archive).map_err(copy_err)?
        {
            return Ok(None);
        }
        fs::copy(archive, &dest).map_err(copy_err)?;
        Ok(Some(dest))
    }

    pub fn run(&self, context: &PipelineContext) -> Result<ValidationArtifact, ValidationError> {
        context.logger.in_scope(|| {
            let _span = tracing::info_span!("data_validation").entered();
            tracing::info!("Entered data validation stage");

            let status = self.validate()?;
            let artifact = ValidationArtifact::new(status);
            tracing::info!("Data validation artifact: {:?}", artifact);

            if artifact.passed() {
                match self.copy_archive()? {
                    Some(dest) => tracing::info!("Copied dataset archive to {}", dest.display()),
                    None => tracing::info!(
                        "Dataset archive {} is already in the copy destination",
                        self.ingestion.archive_path().display()
                    ),
                }
            } else {
                tracing::warn!(
                    "Feature store {} did not pass validation",
                    self.ingestion.feature_store_path().display()
                );
            }
            tracing::info!("Exited data validation stage");
            Ok(artifact)
        })
    }
}

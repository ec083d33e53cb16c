use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Output of the data ingestion stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionArtifact {
    archive_path: PathBuf,
    feature_store_path: PathBuf,
}

impl IngestionArtifact {
    pub fn new(archive_path: PathBuf, feature_store_path: PathBuf) -> Self {
        Self {
            archive_path,
            feature_store_path,
        }
    }

    /// Downloaded archive
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Directory the archive was extracted into
    pub fn feature_store_path(&self) -> &Path {
        &self.feature_store_path
    }
}

/// Output of the data validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationArtifact {
    passed: bool,
}

impl ValidationArtifact {
    pub fn new(passed: bool) -> Self {
        Self { passed }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }
}

/// Output of the model trainer stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainerArtifact {
    trained_model_path: PathBuf,
}

impl TrainerArtifact {
    pub fn new(trained_model_path: PathBuf) -> Self {
        Self { trained_model_path }
    }

    pub fn trained_model_path(&self) -> &Path {
        &self.trained_model_path
    }
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    /// Present only when training was enabled and validation passed
    pub trainer: Option<TrainerArtifact>,
}

//! YAML helpers for the dataset manifest (`data.yaml`) and the detection
//! framework's model architecture templates.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::ManifestError;

pub const MANIFEST_FILE_NAME: &str = "data.yaml";

const NC: &str = "nc";
const TRAIN: &str = "train";
const VAL: &str = "val";

/// Read a YAML document into a generic value.
pub fn read_yaml_file(path: impl AsRef<Path>) -> Result<Value, ManifestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_yaml::from_reader(BufReader::new(file)).map_err(|source| {
        ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::info!("Read yaml file: {}", path.display());
    Ok(value)
}

/// Write `content` as YAML, creating parent directories. Existing files are
/// truncated.
pub fn write_yaml_file(path: impl AsRef<Path>, content: &Value) -> Result<(), ManifestError> {
    let path = path.as_ref();
    let io_err = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, content).map_err(|source| ManifestError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    tracing::info!("Write yaml file: {}", path.display());
    Ok(())
}

fn into_mapping(value: Value, path: &Path) -> Result<Mapping, ManifestError> {
    match value {
        Value::Mapping(map) => Ok(map),
        _ => Err(ManifestError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Dataset manifest: class count plus train/val image directories.
///
/// Keys other than `nc`, `train` and `val` (class names, test split, ...) are
/// carried through untouched when the manifest is saved.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetManifest {
    path: PathBuf,
    raw: Mapping,
}

impl DatasetManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let raw = into_mapping(read_yaml_file(&path)?, &path)?;
        let manifest = Self { path, raw };
        // Fail early on manifests the trainer cannot use.
        manifest.num_classes()?;
        manifest.train()?;
        manifest.val()?;
        Ok(manifest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_classes(&self) -> Result<u64, ManifestError> {
        self.raw
            .get(NC)
            .and_then(Value::as_u64)
            .ok_or_else(|| self.missing(NC))
    }

    pub fn train(&self) -> Result<&str, ManifestError> {
        self.str_field(TRAIN)
    }

    pub fn val(&self) -> Result<&str, ManifestError> {
        self.str_field(VAL)
    }

    fn str_field(&self, field: &'static str) -> Result<&str, ManifestError> {
        self.raw
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(field))
    }

    fn missing(&self, field: &'static str) -> ManifestError {
        ManifestError::MissingField {
            path: self.path.clone(),
            field,
        }
    }

    /// Point `train` and `val` at absolute locations under `base`.
    ///
    /// Already-absolute entries stay as they are apart from `.`/`..` folding.
    pub fn resolve_paths(&mut self, base: &Path) -> std::io::Result<()> {
        for field in [TRAIN, VAL] {
            let Some(relative) = self.raw.get(field).and_then(Value::as_str) else {
                continue;
            };
            let resolved = normalize_lexically(&std::path::absolute(base.join(relative))?);
            self.raw.insert(
                Value::from(field),
                Value::from(resolved.to_string_lossy().into_owned()),
            );
        }
        Ok(())
    }

    /// Persist back to the file the manifest was loaded from
    pub fn save(&self) -> Result<(), ManifestError> {
        write_yaml_file(&self.path, &Value::Mapping(self.raw.clone()))
    }
}

/// Fold `.` and `..` components without touching the filesystem.
/// `..` at the root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Copy a model architecture template to `output` with its `nc` replaced.
/// The template file is left as it was.
pub fn derive_model_config(
    template: &Path,
    output: &Path,
    num_classes: u64,
) -> Result<(), ManifestError> {
    let mut config = into_mapping(read_yaml_file(template)?, template)?;
    config.insert(Value::from(NC), Value::from(num_classes));
    write_yaml_file(output, &Value::Mapping(config))
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while unpacking a dataset archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("archive entry escapes destination: {0}")]
    UnsafeEntry(String),
    #[error("failed to read zip archive {path:?}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("I/O error while extracting {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure inside a [`DownloadClient`](crate::stages::ingestion::DownloadClient).
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write download to {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read yaml file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse yaml file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write yaml file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize yaml for {path:?}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path:?} is not a yaml mapping")]
    NotAMapping { path: PathBuf },
    #[error("{path:?} is missing field `{field}` or it has the wrong type")]
    MissingField { path: PathBuf, field: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to create directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve absolute path for {path:?}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot derive a resource id from download url {0:?}")]
    InvalidUrl(String),
    #[error("failed to download dataset from {url}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },
    #[error("failed to extract {archive:?}")]
    Extract {
        archive: PathBuf,
        #[source]
        source: ArchiveError,
    },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("failed to list feature store {path:?}")]
    ListFeatureStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write validation status to {path:?}")]
    WriteStatus {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve the archive copy destination")]
    CopyDestination(#[source] io::Error),
    #[error("failed to copy {from:?} to {to:?}")]
    CopyArchive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("data yaml file not found: {0:?}")]
    ManifestNotFound(PathBuf),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("model config template not found: {0:?}")]
    TemplateNotFound(PathBuf),
    #[error("failed to resolve absolute path for {path:?}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch training routine `{program}`")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("training routine exited with {status}")]
    RoutineFailed { status: String },
    #[error("best model not found: {0:?}")]
    BestCheckpointNotFound(PathBuf),
    #[error("failed to copy {from:?} to {to:?}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Any stage failure, as seen by the orchestrator's caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data ingestion failed")]
    Ingestion(#[from] IngestionError),
    #[error("data validation failed")]
    Validation(#[from] ValidationError),
    #[error("model training failed")]
    Training(#[from] TrainingError),
}

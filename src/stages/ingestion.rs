use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::artifacts::IngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::error::{DownloadError, IngestionError};
use crate::pipeline::PipelineContext;
use crate::stages::archive;

/// Fetches a remote resource into a local file
pub trait DownloadClient: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Blocking HTTP download client.
///
/// Must not be driven from inside an async task; the server moves pipeline
/// runs onto a blocking worker first.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadClient for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let http_err = |source| DownloadError::Http {
            url: url.to_string(),
            source,
        };
        let mut response = self.client.get(url).send().map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Stream into a sibling file so an interrupted transfer never looks
        // like a finished download to the existence check.
        let partial = partial_path(dest);
        let io_err = |source| DownloadError::Io {
            path: partial.clone(),
            source,
        };
        let mut out = File::create(&partial).map_err(io_err)?;
        response.copy_to(&mut out).map_err(http_err)?;
        drop(out);
        fs::rename(&partial, dest).map_err(|source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Second-to-last `/`-delimited token of a share link, e.g. the file id in
/// `https://drive.google.com/file/d/<id>/view?usp=sharing`.
pub fn resource_id(url: &str) -> Option<&str> {
    let mut tokens = url.rsplit('/');
    tokens.next()?;
    tokens.next().filter(|id| !id.is_empty())
}

pub struct DataIngestion<'a> {
    config: &'a DataIngestionConfig,
    client: &'a dyn DownloadClient,
}

impl<'a> DataIngestion<'a> {
    pub fn new(config: &'a DataIngestionConfig, client: &'a dyn DownloadClient) -> Self {
        Self { config, client }
    }

    /// Download the dataset archive unless it is already on disk.
    pub fn download(&self) -> Result<PathBuf, IngestionError> {
        let download_dir = &self.config.data_ingestion_dir;
        create_dir(download_dir)?;

        let archive_path = self.config.archive_path();
        if archive_path.exists() {
            tracing::info!(
                "File already exists at : [{}]. Skipping download.",
                archive_path.display()
            );
            return Ok(archive_path);
        }

        let url = &self.config.data_download_url;
        let file_id =
            resource_id(url).ok_or_else(|| IngestionError::InvalidUrl(url.clone()))?;
        let source_url = format!("{}{}", self.config.download_prefix, file_id);

        tracing::info!(
            "Downloading file from : [{}] into : [{}]",
            url,
            archive_path.display()
        );
        self.client
            .download(&source_url, &archive_path)
            .map_err(|source| IngestionError::Download {
                url: source_url.clone(),
                source,
            })?;
        tracing::info!(
            "File : [{}] has been downloaded successfully.",
            archive_path.display()
        );
        Ok(archive_path)
    }

    /// Extract `archive_path` into the feature store.
    pub fn extract(&self, archive_path: &Path) -> Result<PathBuf, IngestionError> {
        let feature_store_path = &self.config.feature_store_path;
        create_dir(feature_store_path)?;

        let count = archive::extract_archive(archive_path, feature_store_path).map_err(
            |source| IngestionError::Extract {
                archive: archive_path.to_path_buf(),
                source,
            },
        )?;
        tracing::info!(
            "Extracted {} files from [{}] into dir: {}",
            count,
            archive_path.display(),
            feature_store_path.display()
        );
        Ok(feature_store_path.clone())
    }

    pub fn run(&self, context: &PipelineContext) -> Result<IngestionArtifact, IngestionError> {
        context.logger.in_scope(|| {
            let _span = tracing::info_span!("data_ingestion").entered();
            tracing::info!("Entered data ingestion stage");

            let archive_path = self.download()?;
            let feature_store_path = self.extract(&archive_path)?;
            let artifact = IngestionArtifact::new(
                absolute(&archive_path)?,
                absolute(&feature_store_path)?,
            );

            if context.verbose {
                tracing::info!("Data ingestion artifact: {:?}", artifact);
            }
            tracing::info!("Exited data ingestion stage");
            Ok(artifact)
        })
    }
}

fn create_dir(path: &Path) -> Result<(), IngestionError> {
    fs::create_dir_all(path).map_err(|source| IngestionError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn absolute(path: &Path) -> Result<PathBuf, IngestionError> {
    std::path::absolute(path).map_err(|source: io::Error| IngestionError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}

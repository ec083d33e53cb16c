use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::ServerConfig;

/// Input for one detection run
#[derive(Debug, Clone, PartialEq)]
pub struct DetectRequest {
    pub weights: String,
    pub image_size: u32,
    pub confidence: f32,
    /// Image path or camera index, as understood by `detect.py --source`
    pub source: String,
}

impl DetectRequest {
    pub fn from_config(config: &ServerConfig, source: impl Into<String>) -> Self {
        Self {
            weights: config.weights.clone(),
            image_size: config.image_size,
            confidence: config.confidence,
            source: source.into(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "--weights".to_string(),
            self.weights.clone(),
            "--img".to_string(),
            self.image_size.to_string(),
            "--conf".to_string(),
            self.confidence.to_string(),
            "--source".to_string(),
            self.source.clone(),
        ]
    }
}

/// Runs the external detector. Blocks until it exits.
///
/// Output lands in a fresh directory under `runs_dir()/detect`.
pub trait Detector: Send + Sync {
    fn detect(&self, request: &DetectRequest) -> io::Result<()>;

    /// Scratch root the detector writes into; removed after each request
    fn runs_dir(&self) -> PathBuf;
}

pub struct SubprocessDetector {
    python: String,
    working_dir: PathBuf,
}

impl SubprocessDetector {
    pub fn new(python: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl Detector for SubprocessDetector {
    fn detect(&self, request: &DetectRequest) -> io::Result<()> {
        let args = request.args();
        tracing::info!("Detection arguments: {:?}", args);
        let status = Command::new(&self.python)
            .arg("detect.py")
            .args(&args)
            .current_dir(&self.working_dir)
            .status()?;
        if !status.success() {
            // The output directory check decides whether anything usable was
            // produced; a non-zero exit alone is only worth a warning.
            tracing::warn!("detect.py exited with {status}");
        }
        Ok(())
    }

    fn runs_dir(&self) -> PathBuf {
        self.working_dir.join("runs")
    }
}

/// Most recently modified directory directly under `dir`
pub fn latest_run_dir(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_dir() {
            continue;
        }
        let modified = meta.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified >= *t) {
            latest = Some((modified, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

pub fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded.trim())
}

pub fn encode_image_into_base64(path: &Path) -> io::Result<String> {
    Ok(STANDARD.encode(fs::read(path)?))
}

/// Remove the detector's scratch output, ignoring a missing directory
pub fn remove_runs(runs_dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(runs_dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

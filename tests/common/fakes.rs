//! In-process stand-ins for the network and the external scripts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use drishti::error::{DownloadError, TrainingError};
use drishti::serve::detect::{DetectRequest, Detector};
use drishti::stages::{DownloadClient, TrainingRequest, TrainingRoutine};

/// Serves fixed bytes for every URL and records what was requested
pub struct RecordingDownloader {
    body: Vec<u8>,
    requests: Mutex<Vec<String>>,
}

impl RecordingDownloader {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl DownloadClient for RecordingDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.requests.lock().unwrap().push(url.to_string());
        fs::write(dest, &self.body).map_err(|source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

/// Pretends to train by dropping a checkpoint where `train.py` would
pub struct FakeTraining {
    checkpoint: Option<PathBuf>,
    requests: Mutex<Vec<TrainingRequest>>,
}

impl FakeTraining {
    /// Writes `best.pt` at `checkpoint` on every run
    pub fn producing(checkpoint: PathBuf) -> Self {
        Self {
            checkpoint: Some(checkpoint),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Completes without producing anything
    pub fn empty() -> Self {
        Self {
            checkpoint: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TrainingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TrainingRoutine for FakeTraining {
    fn train(&self, request: &TrainingRequest) -> Result<(), TrainingError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(checkpoint) = &self.checkpoint {
            fs::create_dir_all(checkpoint.parent().unwrap()).unwrap();
            fs::write(checkpoint, b"trained weights").unwrap();
        }
        Ok(())
    }
}

/// Copies the source image into `runs/detect/exp/` as the annotated output.
/// Camera sources produce nothing.
pub struct FakeDetector {
    runs_dir: PathBuf,
    requests: Mutex<Vec<DetectRequest>>,
}

impl FakeDetector {
    pub fn new(runs_dir: PathBuf) -> Self {
        Self {
            runs_dir,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<DetectRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Detector for FakeDetector {
    fn detect(&self, request: &DetectRequest) -> io::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        let source = Path::new(&request.source);
        if !source.is_file() {
            return Ok(());
        }
        let exp = self.runs_dir.join("detect").join("exp");
        fs::create_dir_all(&exp)?;
        let name = source.file_name().unwrap_or_default();
        fs::copy(source, exp.join(name))?;
        Ok(())
    }

    fn runs_dir(&self) -> PathBuf {
        self.runs_dir.clone()
    }
}

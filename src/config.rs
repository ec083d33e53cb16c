//! Static configuration records for every pipeline stage and the server.
//!
//! [`Settings`] is what a user writes (an optional YAML file plus CLI
//! overrides); [`PipelineConfig`] is the derived, path-resolved form handed to
//! the orchestrator. Nothing here is global: configs are built per run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stages::validation::ValidationPolicy;

pub const ARTIFACTS_DIR: &str = "artifacts";

pub const DATA_INGESTION_DIR_NAME: &str = "data_ingestion";
pub const DATA_INGESTION_FEATURE_STORE_DIR: &str = "feature_store";
pub const DATA_ARCHIVE_FILE_NAME: &str = "data.zip";
pub const DATA_DOWNLOAD_PREFIX: &str = "https://drive.google.com/uc?export=download&confirm=t&id=";

pub const DATA_VALIDATION_DIR_NAME: &str = "data_validation";
pub const DATA_VALIDATION_STATUS_FILE: &str = "status.txt";
pub const DATA_VALIDATION_ALL_REQUIRED_FILES: [&str; 3] = ["train", "valid", "data.yaml"];

pub const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
pub const MODEL_TRAINER_PRETRAINED_WEIGHT_NAME: &str = "yolov5s.pt";
pub const MODEL_TRAINER_NO_EPOCHS: u32 = 1;
pub const MODEL_TRAINER_BATCH_SIZE: u32 = 16;
pub const MODEL_TRAINER_IMAGE_SIZE: u32 = 416;
pub const MODEL_TRAINER_EXPERIMENT_NAME: &str = "exp";

pub const YOLO_DIR: &str = "yolov5";
pub const PYTHON_BIN: &str = "python";

pub const APP_HOST: &str = "0.0.0.0";
pub const APP_PORT: u16 = 8080;

/// User-facing settings, deserialized from YAML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub artifacts_dir: PathBuf,
    pub yolo_dir: PathBuf,
    pub python: String,
    pub ingestion: IngestionSettings,
    pub validation: ValidationSettings,
    pub trainer: TrainerSettings,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub data_download_url: String,
    pub download_prefix: String,
    pub archive_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub required_files: Vec<String>,
    pub policy: ValidationPolicy,
    /// Where the archive is copied when validation passes; `None` means the
    /// process working directory at the time of the copy.
    pub archive_copy_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    pub weight_name: String,
    pub epochs: u32,
    pub batch_size: u32,
    pub image_size: u32,
    pub experiment_name: String,
    pub exist_ok: bool,
    /// Run the trainer after a passing validation
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub log_file: String,
}

impl LoggingConfig {
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub upload_file_name: String,
    pub weights: String,
    pub image_size: u32,
    pub confidence: f32,
    pub camera_source: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(ARTIFACTS_DIR),
            yolo_dir: PathBuf::from(YOLO_DIR),
            python: PYTHON_BIN.to_string(),
            ingestion: IngestionSettings::default(),
            validation: ValidationSettings::default(),
            trainer: TrainerSettings::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            data_download_url: String::new(),
            download_prefix: DATA_DOWNLOAD_PREFIX.to_string(),
            archive_file_name: DATA_ARCHIVE_FILE_NAME.to_string(),
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            required_files: DATA_VALIDATION_ALL_REQUIRED_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            policy: ValidationPolicy::default(),
            archive_copy_dir: None,
        }
    }
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            weight_name: MODEL_TRAINER_PRETRAINED_WEIGHT_NAME.to_string(),
            epochs: MODEL_TRAINER_NO_EPOCHS,
            batch_size: MODEL_TRAINER_BATCH_SIZE,
            image_size: MODEL_TRAINER_IMAGE_SIZE,
            experiment_name: MODEL_TRAINER_EXPERIMENT_NAME.to_string(),
            exist_ok: true,
            enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "logs.log".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: APP_HOST.to_string(),
            port: APP_PORT,
            upload_dir: PathBuf::from("data"),
            upload_file_name: "inputimage.jpg".to_string(),
            weights: "best.pt".to_string(),
            image_size: MODEL_TRAINER_IMAGE_SIZE,
            confidence: 0.5,
            camera_source: "0".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Resolve the per-stage configuration records.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionConfig {
    pub data_ingestion_dir: PathBuf,
    pub feature_store_path: PathBuf,
    pub archive_file_name: String,
    pub data_download_url: String,
    pub download_prefix: String,
}

impl DataIngestionConfig {
    pub fn archive_path(&self) -> PathBuf {
        self.data_ingestion_dir.join(&self.archive_file_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValidationConfig {
    pub data_validation_dir: PathBuf,
    pub status_file_path: PathBuf,
    pub required_files: Vec<String>,
    pub policy: ValidationPolicy,
    pub archive_copy_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTrainerConfig {
    pub model_trainer_dir: PathBuf,
    pub yolo_dir: PathBuf,
    pub python: String,
    pub weight_name: String,
    pub epochs: u32,
    pub batch_size: u32,
    pub image_size: u32,
    pub experiment_name: String,
    pub exist_ok: bool,
}

impl ModelTrainerConfig {
    /// Weight name up to the first `.`, e.g. `yolov5s` for `yolov5s.pt`
    pub fn weight_stem(&self) -> &str {
        self.weight_name
            .split('.')
            .next()
            .unwrap_or(self.weight_name.as_str())
    }

    pub fn model_template_path(&self) -> PathBuf {
        self.yolo_dir
            .join("models")
            .join(format!("{}.yaml", self.weight_stem()))
    }

    pub fn custom_model_config_path(&self) -> PathBuf {
        self.yolo_dir
            .join("models")
            .join(format!("custom_{}.yaml", self.weight_stem()))
    }

    /// Where the training routine leaves its best checkpoint
    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.yolo_dir
            .join("runs")
            .join("train")
            .join(&self.experiment_name)
            .join("weights")
            .join("best.pt")
    }

    pub fn published_model_path(&self) -> PathBuf {
        self.yolo_dir.join("best.pt")
    }
}

/// Derived configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub artifacts_dir: PathBuf,
    pub ingestion: DataIngestionConfig,
    pub validation: DataValidationConfig,
    pub trainer: ModelTrainerConfig,
    pub logging: LoggingConfig,
    pub run_training: bool,
}

impl PipelineConfig {
    pub fn new(settings: &Settings) -> Self {
        let artifacts_dir = settings.artifacts_dir.clone();

        let data_ingestion_dir = artifacts_dir.join(DATA_INGESTION_DIR_NAME);
        let ingestion = DataIngestionConfig {
            feature_store_path: data_ingestion_dir.join(DATA_INGESTION_FEATURE_STORE_DIR),
            data_ingestion_dir,
            archive_file_name: settings.ingestion.archive_file_name.clone(),
            data_download_url: settings.ingestion.data_download_url.clone(),
            download_prefix: settings.ingestion.download_prefix.clone(),
        };

        let data_validation_dir = artifacts_dir.join(DATA_VALIDATION_DIR_NAME);
        let validation = DataValidationConfig {
            status_file_path: data_validation_dir.join(DATA_VALIDATION_STATUS_FILE),
            data_validation_dir,
            required_files: settings.validation.required_files.clone(),
            policy: settings.validation.policy,
            archive_copy_dir: settings.validation.archive_copy_dir.clone(),
        };

        let trainer = ModelTrainerConfig {
            model_trainer_dir: artifacts_dir.join(MODEL_TRAINER_DIR_NAME),
            yolo_dir: settings.yolo_dir.clone(),
            python: settings.python.clone(),
            weight_name: settings.trainer.weight_name.clone(),
            epochs: settings.trainer.epochs,
            batch_size: settings.trainer.batch_size,
            image_size: settings.trainer.image_size,
            experiment_name: settings.trainer.experiment_name.clone(),
            exist_ok: settings.trainer.exist_ok,
        };

        Self {
            artifacts_dir,
            ingestion,
            validation,
            trainer,
            logging: settings.logging.clone(),
            run_training: settings.trainer.enabled,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

pub mod archive;
pub mod ingestion;
pub mod trainer;
pub mod validation;

pub use ingestion::{DataIngestion, DownloadClient, HttpDownloader};
pub use trainer::{ModelTrainer, SubprocessTraining, TrainingRequest, TrainingRoutine};
pub use validation::{DataValidation, ValidationPolicy};

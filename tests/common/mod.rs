mod fixtures;
pub use fixtures::*;

mod fakes;
pub use fakes::*;

// Re-export commonly used types from drishti for tests
pub use drishti::config::{PipelineConfig, Settings};
pub use drishti::stages::{DownloadClient, TrainingRequest, TrainingRoutine, ValidationPolicy};
pub use drishti::{IngestionArtifact, PipelineContext, PipelineLogger, TrainingPipeline};

/// Share link in the format the ingestion stage expects
pub const TEST_DATA_URL: &str = "https://drive.google.com/file/d/1TestFileId/view?usp=sharing";

/// Settings with every writable location inside `root`.
///
/// Also creates the archive copy directory so a passing validation has
/// somewhere to copy to.
pub fn test_settings(root: &std::path::Path) -> Settings {
    let mut settings = Settings::default();
    settings.artifacts_dir = root.join("artifacts");
    settings.yolo_dir = root.join("yolov5");
    settings.ingestion.data_download_url = TEST_DATA_URL.to_string();
    settings.logging.log_dir = root.join("logs");
    settings.server.upload_dir = root.join("data");

    let copies = root.join("copies");
    std::fs::create_dir_all(&copies).expect("Failed to create archive copy dir");
    settings.validation.archive_copy_dir = Some(copies);
    settings
}

/// Context that discards log output
pub fn quiet_context() -> PipelineContext {
    PipelineContext::new(PipelineLogger::disabled())
}

pub mod artifacts;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod serve;
pub mod stages;

pub use artifacts::{IngestionArtifact, PipelineReport, TrainerArtifact, ValidationArtifact};
pub use config::{PipelineConfig, Settings};
pub use error::{IngestionError, PipelineError, TrainingError, ValidationError};
pub use logging::PipelineLogger;
pub use pipeline::{PipelineContext, TrainingPipeline};

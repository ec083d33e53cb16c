use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::artifacts::{IngestionArtifact, PipelineReport, TrainerArtifact, ValidationArtifact};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::logging::PipelineLogger;
use crate::stages::{
    DataIngestion, DataValidation, DownloadClient, HttpDownloader, ModelTrainer,
    SubprocessTraining, TrainingRoutine,
};

/// Context available to all pipeline stages
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub run_id: Uuid,
    pub verbose: bool,
    pub logger: PipelineLogger,
}

impl PipelineContext {
    pub fn new(logger: PipelineLogger) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            verbose: false,
            logger,
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(PipelineLogger::inherit())
    }
}

/// Ingestion → validation → (optional) training, strictly in that order.
///
/// Each stage hands an immutable artifact to the next. A failing stage aborts
/// the run; a failed validation does not, it only skips training.
pub struct TrainingPipeline {
    config: PipelineConfig,
    context: PipelineContext,
    downloader: Arc<dyn DownloadClient>,
    routine: Arc<dyn TrainingRoutine>,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let routine = Arc::new(SubprocessTraining::from_config(&config.trainer));
        Self {
            config,
            context: PipelineContext::default(),
            downloader: Arc::new(HttpDownloader::new()),
            routine,
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    pub fn with_logger(mut self, logger: PipelineLogger) -> Self {
        self.context.logger = logger;
        self
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn DownloadClient>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_training_routine(mut self, routine: Arc<dyn TrainingRoutine>) -> Self {
        self.routine = routine;
        self
    }

    /// Run the trainer after a passing validation
    pub fn with_training(mut self, enabled: bool) -> Self {
        self.config.run_training = enabled;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn start_data_ingestion(&self) -> Result<IngestionArtifact, PipelineError> {
        self.context.logger.in_scope(|| tracing::info!("Getting data from url"));
        let artifact =
            DataIngestion::new(&self.config.ingestion, self.downloader.as_ref()).run(&self.context)?;
        self.context.logger.in_scope(|| tracing::info!("Got data from url"));
        Ok(artifact)
    }

    pub fn start_data_validation(
        &self,
        ingestion: &IngestionArtifact,
    ) -> Result<ValidationArtifact, PipelineError> {
        let artifact = DataValidation::new(ingestion, &self.config.validation).run(&self.context)?;
        self.context.logger.in_scope(|| tracing::info!("Performed data validation"));
        Ok(artifact)
    }

    pub fn start_model_trainer(
        &self,
        ingestion: &IngestionArtifact,
    ) -> Result<TrainerArtifact, PipelineError> {
        let trainer = ModelTrainer::new(&self.config.trainer, self.routine.as_ref());
        Ok(trainer.run(ingestion.feature_store_path(), &self.context)?)
    }

    /// Execute every stage in order and report what each produced.
    pub fn run_pipeline(&self) -> Result<PipelineReport, PipelineError> {
        self.context.logger.in_scope(|| {
            let _span = tracing::info_span!("pipeline", run_id = %self.context.run_id).entered();
            let started_at = OffsetDateTime::now_utc();
            tracing::info!("Starting training pipeline");

            let ingestion = self.start_data_ingestion()?;
            let validation = self.start_data_validation(&ingestion)?;

            let trainer = match (self.config.run_training, validation.passed()) {
                (true, true) => Some(self.start_model_trainer(&ingestion)?),
                (true, false) => {
                    tracing::warn!("Validation failed, skipping model training");
                    None
                }
                (false, _) => None,
            };

            let report = PipelineReport {
                run_id: self.context.run_id,
                started_at,
                finished_at: OffsetDateTime::now_utc(),
                ingestion,
                validation,
                trainer,
            };
            tracing::info!(
                passed = report.validation.passed(),
                trained = report.trainer.is_some(),
                "Training pipeline finished"
            );
            Ok(report)
        })
    }
}

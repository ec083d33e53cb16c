use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::artifacts::TrainerArtifact;
use crate::config::ModelTrainerConfig;
use crate::error::TrainingError;
use crate::manifest::{self, DatasetManifest, MANIFEST_FILE_NAME};
use crate::pipeline::PipelineContext;

/// Everything the training routine needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub image_size: u32,
    pub batch_size: u32,
    pub epochs: u32,
    pub data_yaml: PathBuf,
    pub model_config: PathBuf,
    pub weights: String,
    pub experiment_name: String,
    pub exist_ok: bool,
}

impl TrainingRequest {
    /// Command-line arguments understood by the detection framework's `train.py`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--img".to_string(),
            self.image_size.to_string(),
            "--batch".to_string(),
            self.batch_size.to_string(),
            "--epochs".to_string(),
            self.epochs.to_string(),
            "--data".to_string(),
            self.data_yaml.to_string_lossy().into_owned(),
            "--cfg".to_string(),
            self.model_config.to_string_lossy().into_owned(),
            "--weights".to_string(),
            self.weights.clone(),
            "--name".to_string(),
            self.experiment_name.clone(),
            "--cache".to_string(),
        ];
        if self.exist_ok {
            args.push("--exist-ok".to_string());
        }
        args
    }
}

/// A way of running the external training routine to completion.
///
/// Implementations block until training has finished and leave the best
/// checkpoint where [`ModelTrainerConfig::best_checkpoint_path`] expects it.
pub trait TrainingRoutine: Send + Sync {
    fn train(&self, request: &TrainingRequest) -> Result<(), TrainingError>;
}

/// Runs `train.py` from the detection framework checkout in a child process.
pub struct SubprocessTraining {
    python: String,
    working_dir: PathBuf,
}

impl SubprocessTraining {
    pub fn new(python: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &ModelTrainerConfig) -> Self {
        Self::new(config.python.clone(), config.yolo_dir.clone())
    }
}

impl TrainingRoutine for SubprocessTraining {
    fn train(&self, request: &TrainingRequest) -> Result<(), TrainingError> {
        let args = request.args();
        tracing::info!("Training arguments: {:?}", args);

        let status = Command::new(&self.python)
            .arg("train.py")
            .args(&args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|source| TrainingError::Launch {
                program: self.python.clone(),
                source,
            })?;

        if !status.success() {
            return Err(TrainingError::RoutineFailed {
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

pub struct ModelTrainer<'a> {
    config: &'a ModelTrainerConfig,
    routine: &'a dyn TrainingRoutine,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(config: &'a ModelTrainerConfig, routine: &'a dyn TrainingRoutine) -> Self {
        Self { config, routine }
    }

    /// Load `data.yaml` from the feature store, rewrite its train/val entries
    /// to absolute paths and save it back in place. Returns the manifest.
    pub fn prepare_manifest(&self, feature_store: &Path) -> Result<DatasetManifest, TrainingError> {
        let data_yaml = feature_store.join(MANIFEST_FILE_NAME);
        tracing::info!("Checking for data YAML file: {}", data_yaml.display());

        if !data_yaml.exists() {
            tracing::error!("Data YAML file not found: {}", data_yaml.display());
            log_dir_contents(feature_store);
            return Err(TrainingError::ManifestNotFound(data_yaml));
        }

        let mut data = DatasetManifest::load(&data_yaml)?;
        tracing::info!("Number of classes: {}", data.num_classes()?);

        data.resolve_paths(feature_store)
            .map_err(|source| TrainingError::ResolvePath {
                path: feature_store.to_path_buf(),
                source,
            })?;
        data.save()?;
        Ok(data)
    }

    /// Write `custom_<weights>.yaml` next to the architecture template with
    /// the dataset's class count.
    pub fn prepare_model_config(&self, num_classes: u64) -> Result<PathBuf, TrainingError> {
        let template = self.config.model_template_path();
        if !template.exists() {
            return Err(TrainingError::TemplateNotFound(template));
        }
        let output = self.config.custom_model_config_path();
        manifest::derive_model_config(&template, &output, num_classes)?;
        Ok(output)
    }

    fn publish(&self, best: &Path) -> Result<PathBuf, TrainingError> {
        let published = self.config.published_model_path();
        tracing::info!("Copying best model to {}", published.display());
        copy_file(best, &published)?;

        let trainer_dir = &self.config.model_trainer_dir;
        fs::create_dir_all(trainer_dir).map_err(|source| TrainingError::CreateDir {
            path: trainer_dir.clone(),
            source,
        })?;
        copy_file(best, &trainer_dir.join("best.pt"))?;
        Ok(published)
    }

    pub fn run(
        &self,
        feature_store: &Path,
        context: &PipelineContext,
    ) -> Result<TrainerArtifact, TrainingError> {
        context.logger.in_scope(|| {
            let _span = tracing::info_span!("model_trainer").entered();
            tracing::info!("Entered model trainer stage");

            let result = self.train(feature_store);
            if let Err(e) = &result {
                tracing::error!("Error in model trainer: {e}");
            }
            let artifact = result?;

            tracing::info!("Model trainer artifact: {:?}", artifact);
            tracing::info!("Exited model trainer stage");
            Ok(artifact)
        })
    }

    fn train(&self, feature_store: &Path) -> Result<TrainerArtifact, TrainingError> {
        let data = self.prepare_manifest(feature_store)?;
        let model_config = self.prepare_model_config(data.num_classes()?)?;

        let request = TrainingRequest {
            image_size: self.config.image_size,
            batch_size: self.config.batch_size,
            epochs: self.config.epochs,
            data_yaml: absolute(data.path())?,
            model_config: absolute(&model_config)?,
            weights: self.config.weight_name.clone(),
            experiment_name: self.config.experiment_name.clone(),
            exist_ok: self.config.exist_ok,
        };

        tracing::info!("Starting model training...");
        self.routine.train(&request)?;

        let best = self.config.best_checkpoint_path();
        if !best.exists() {
            tracing::error!("Best model not found: {}", best.display());
            match best.parent() {
                Some(weights_dir) if weights_dir.exists() => log_dir_contents(weights_dir),
                Some(weights_dir) => {
                    tracing::error!("Weights directory not found: {}", weights_dir.display())
                }
                None => {}
            }
            return Err(TrainingError::BestCheckpointNotFound(best));
        }

        let published = self.publish(&best)?;
        Ok(TrainerArtifact::new(published))
    }
}

fn log_dir_contents(dir: &Path) {
    tracing::info!("Contents of {}:", dir.display());
    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                tracing::info!("{}", entry.file_name().to_string_lossy());
            }
        }
        Err(e) => tracing::warn!("could not list {}: {e}", dir.display()),
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), TrainingError> {
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|source| TrainingError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

fn absolute(path: &Path) -> Result<PathBuf, TrainingError> {
    std::path::absolute(path).map_err(|source| TrainingError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}

use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};

use drishti::config::Settings;
use drishti::logging::{self, PipelineLogger};
use drishti::serve::{self, AppState};
use drishti::stages::{ModelTrainer, SubprocessTraining};
use drishti::{PipelineContext, TrainingPipeline};

#[derive(Parser)]
#[command(name = "drishti")]
#[command(about = "Download, validate and train an object detection dataset, then serve predictions")]
struct Cli {
    /// YAML settings file; built-in defaults are used for anything it omits
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Root directory for pipeline artifacts
    #[arg(long, value_name = "DIR", global = true)]
    artifacts_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run ingestion and validation (and training with --train)
    Run {
        /// Dataset share link
        #[arg(long, value_name = "URL")]
        data_url: Option<String>,

        /// Train after a passing validation
        #[arg(long)]
        train: bool,
    },
    /// Train on an already extracted feature store
    Train {
        #[arg(long, value_name = "DIR")]
        feature_store: Option<PathBuf>,
    },
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run detection on a local image
    Predict {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Where to write the annotated image
        #[arg(long, value_name = "FILE", default_value = "prediction.jpg")]
        out: PathBuf,
    },
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.artifacts_dir {
        settings.artifacts_dir = dir.clone();
    }
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli)?;
    logging::init_tracing(&settings.logging);

    match cli.command {
        Command::Run { data_url, train } => {
            if let Some(url) = data_url {
                settings.ingestion.data_download_url = url;
            }
            if train {
                settings.trainer.enabled = true;
            }
            let config = settings.pipeline_config();
            let logger = PipelineLogger::new(&config.logging)
                .with_context(|| format!("Failed to open log file {:?}", config.logging.log_path()))?;

            let report = TrainingPipeline::new(config)
                .with_verbose(cli.verbose)
                .with_logger(logger)
                .run_pipeline()?;

            println!("\n=== Pipeline Results ===");
            println!("Run id: {}", report.run_id);
            println!("Archive: {}", report.ingestion.archive_path().display());
            println!("Feature store: {}", report.ingestion.feature_store_path().display());
            println!("Validation passed: {}", report.validation.passed());
            if let Some(trainer) = &report.trainer {
                println!("Trained model: {}", trainer.trained_model_path().display());
            }
        }
        Command::Train { feature_store } => {
            let config = settings.pipeline_config();
            let feature_store =
                feature_store.unwrap_or_else(|| config.ingestion.feature_store_path.clone());
            let logger = PipelineLogger::new(&config.logging)
                .with_context(|| format!("Failed to open log file {:?}", config.logging.log_path()))?;
            let context = PipelineContext {
                verbose: cli.verbose,
                ..PipelineContext::new(logger)
            };

            let routine = SubprocessTraining::from_config(&config.trainer);
            let artifact = ModelTrainer::new(&config.trainer, &routine)
                .run(&feature_store, &context)?;
            println!("Trained model: {}", artifact.trained_model_path().display());
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve::serve(settings))?;
        }
        Command::Predict { image_path, out } => {
            let bytes = std::fs::read(&image_path)
                .with_context(|| format!("Failed to read image {:?}", image_path))?;
            let encoded = AppState::new(settings).predict_image(&bytes)?;
            let annotated = base64::engine::general_purpose::STANDARD.decode(encoded)?;
            std::fs::write(&out, annotated)
                .with_context(|| format!("Failed to write {:?}", out))?;
            println!("Prediction written to {}", out.display());
        }
    }

    Ok(())
}

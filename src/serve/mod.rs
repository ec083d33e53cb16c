//! HTTP surface: trigger the training pipeline and run detection on uploads.
//!
//! The upload file and the detector's output directory are fixed paths shared
//! by every request, so the inference routes take `inference_lock` and run one
//! at a time.

pub mod detect;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::pipeline::TrainingPipeline;
use detect::{DetectRequest, Detector, SubprocessDetector};

const INDEX_HTML: &str = include_str!("../../templates/index.html");

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Key value error: incorrect key passed")]
    MissingImageKey,
    #[error("Value not found inside json data")]
    InvalidImageValue,
    #[error("Output image not found at {0:?}")]
    OutputNotFound(PathBuf),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImageKey | Self::InvalidImageValue => StatusCode::BAD_REQUEST,
            Self::OutputNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !status.is_server_error() {
            return (status, self.to_string()).into_response();
        }
        let body = format!("{:#}", anyhow::Error::new(self));
        tracing::error!("request failed: {body}");
        (status, body).into_response()
    }
}

/// `{"image": "<base64>"}`, both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub image: String,
}

type PipelineFactory = dyn Fn() -> TrainingPipeline + Send + Sync;

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    detector: Arc<dyn Detector>,
    pipeline: Arc<PipelineFactory>,
    inference_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let detector = Arc::new(SubprocessDetector::new(
            settings.python.clone(),
            settings.yolo_dir.clone(),
        ));
        let pipeline_config = settings.pipeline_config();
        Self {
            settings: Arc::new(settings),
            detector,
            pipeline: Arc::new(move || TrainingPipeline::new(pipeline_config.clone())),
            inference_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_pipeline(
        mut self,
        factory: impl Fn() -> TrainingPipeline + Send + Sync + 'static,
    ) -> Self {
        self.pipeline = Arc::new(factory);
        self
    }

    fn upload_path(&self) -> PathBuf {
        let server = &self.settings.server;
        server.upload_dir.join(&server.upload_file_name)
    }

    /// Write the upload, run detection on it and return the annotated image
    /// as base64. Detector scratch output is removed afterwards.
    pub fn predict_image(&self, image: &[u8]) -> Result<String, ServeError> {
        let upload = self.upload_path();
        if let Some(parent) = upload.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&upload, image)?;
        let source = std::path::absolute(&upload)?;

        let request =
            DetectRequest::from_config(&self.settings.server, source.to_string_lossy());
        self.detector.detect(&request)?;

        let runs_dir = self.detector.runs_dir();
        let result = self.read_detection_output(&runs_dir.join("detect"));
        detect::remove_runs(&runs_dir)?;
        result
    }

    fn read_detection_output(&self, detect_dir: &Path) -> Result<String, ServeError> {
        if !detect_dir.is_dir() {
            return Err(ServeError::OutputNotFound(detect_dir.to_path_buf()));
        }
        let exp_dir = detect::latest_run_dir(detect_dir)?
            .ok_or_else(|| ServeError::OutputNotFound(detect_dir.to_path_buf()))?;
        let output = exp_dir.join(&self.settings.server.upload_file_name);
        if !output.exists() {
            return Err(ServeError::OutputNotFound(output));
        }
        Ok(detect::encode_image_into_base64(&output)?)
    }

    fn live_blocking(&self) -> Result<(), ServeError> {
        let request = DetectRequest::from_config(
            &self.settings.server,
            self.settings.server.camera_source.clone(),
        );
        self.detector.detect(&request)?;
        detect::remove_runs(&self.detector.runs_dir())?;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/train", get(train))
        .route("/predict", post(predict))
        .route("/live", get(live))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn home() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn train(State(state): State<AppState>) -> Result<&'static str, ServeError> {
    let factory = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || factory().run_pipeline()).await??;
    tracing::info!(
        run_id = %report.run_id,
        passed = report.validation.passed(),
        "pipeline run finished"
    );
    Ok("Training successful")
}

async fn predict(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ImagePayload>, ServeError> {
    let encoded = body.get("image").ok_or(ServeError::MissingImageKey)?;
    let encoded = encoded.as_str().ok_or(ServeError::InvalidImageValue)?;
    let bytes = detect::decode_image(encoded).map_err(|_| ServeError::InvalidImageValue)?;
    let decoded = image::load_from_memory(&bytes).map_err(|_| ServeError::InvalidImageValue)?;
    tracing::info!(
        width = decoded.width(),
        height = decoded.height(),
        "received image for prediction"
    );
    drop(decoded);

    // The guard moves into the blocking task so a dropped request cannot
    // release the lock while detect.py is still running.
    let guard = state.inference_lock.clone().lock_owned().await;
    let worker = state.clone();
    let image = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        worker.predict_image(&bytes)
    })
    .await??;
    Ok(Json(ImagePayload { image }))
}

async fn live(State(state): State<AppState>) -> Result<&'static str, ServeError> {
    let guard = state.inference_lock.clone().lock_owned().await;
    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        worker.live_blocking()
    })
    .await??;
    Ok("Camera starting!!")
}

/// Bind and serve until Ctrl-C.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("http server listening on {}", listener.local_addr()?);

    let app = router(AppState::new(settings));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server exited")?;
    Ok(())
}

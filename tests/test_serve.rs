//! Integration tests for the HTTP server.
//!
//! Tests cover:
//! - Request validation on /predict
//! - A successful prediction round trip and scratch cleanup
//! - Missing detector output
//! - One detection at a time, even when a client gives up mid-request
//! - Triggering the pipeline through /train and reporting its failure cause
//! - The index page and /live

mod common;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use drishti::serve::detect::{DetectRequest, Detector};
use drishti::serve::{AppState, ImagePayload, router};
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

use common::*;

/// Serve `state` on an ephemeral port and return the base URL
async fn spawn_app(state: AppState) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router(state)).await });
    Ok(format!("http://{addr}"))
}

fn test_image_base64() -> anyhow::Result<(String, Vec<u8>)> {
    let image = create_test_image();
    let bytes = std::fs::read(image.path())?;
    Ok((STANDARD.encode(&bytes), bytes))
}

/// Runs "successfully" without writing any output
struct SilentDetector {
    runs_dir: PathBuf,
}

impl Detector for SilentDetector {
    fn detect(&self, _request: &DetectRequest) -> io::Result<()> {
        Ok(())
    }

    fn runs_dir(&self) -> PathBuf {
        self.runs_dir.clone()
    }
}

/// Slow detector that records how many runs overlap
struct SlowDetector {
    inner: FakeDetector,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SlowDetector {
    fn new(runs_dir: PathBuf, delay: Duration) -> Self {
        Self {
            inner: FakeDetector::new(runs_dir),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

impl Detector for SlowDetector {
    fn detect(&self, request: &DetectRequest) -> io::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let result = self.inner.detect(request);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn runs_dir(&self) -> PathBuf {
        self.inner.runs_dir()
    }
}

#[tokio::test]
async fn test_predict_returns_annotated_image() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let settings = test_settings(dir.path());
    let runs_dir = dir.path().join("yolov5/runs");
    let detector = Arc::new(FakeDetector::new(runs_dir.clone()));
    let base = spawn_app(AppState::new(settings).with_detector(detector.clone())).await?;
    let (encoded, bytes) = test_image_base64()?;

    let response = reqwest::Client::new()
        .post(format!("{base}/predict"))
        .json(&json!({ "image": encoded }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let payload: ImagePayload = response.json().await?;

    // 1. The fake detector echoes the upload back as its output
    assert_eq!(STANDARD.decode(payload.image)?, bytes);

    // 2. Upload landed at the fixed path and detection used the configured values
    let upload = dir.path().join("data/inputimage.jpg");
    assert_eq!(std::fs::read(&upload)?, bytes);
    let requests = detector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(PathBuf::from(&requests[0].source), std::path::absolute(&upload)?);
    assert_eq!(requests[0].weights, "best.pt");
    assert_eq!(requests[0].image_size, 416);

    // 3. Scratch output is gone
    assert!(!runs_dir.exists());

    Ok(())
}

#[tokio::test]
async fn test_predict_rejects_missing_image_key() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let detector = Arc::new(FakeDetector::new(dir.path().join("runs")));
    let base = spawn_app(AppState::new(test_settings(dir.path())).with_detector(detector.clone())).await?;
    let (encoded, _) = test_image_base64()?;

    let response = reqwest::Client::new()
        .post(format!("{base}/predict"))
        .json(&json!({ "img": encoded }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await?, "Key value error: incorrect key passed");
    assert!(detector.requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_predict_rejects_unusable_values() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let detector = Arc::new(FakeDetector::new(dir.path().join("runs")));
    let base = spawn_app(AppState::new(test_settings(dir.path())).with_detector(detector.clone())).await?;
    let client = reqwest::Client::new();

    let bodies = [
        json!({ "image": 42 }),
        json!({ "image": "%%% not base64 %%%" }),
        json!({ "image": STANDARD.encode(b"plain text, not an image") }),
    ];
    for body in bodies {
        let response = client
            .post(format!("{base}/predict"))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(response.text().await?, "Value not found inside json data");
    }
    assert!(detector.requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_predict_without_output_is_not_found() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let runs_dir = dir.path().join("runs");
    std::fs::create_dir_all(runs_dir.join("detect/exp"))?;
    let detector = Arc::new(SilentDetector {
        runs_dir: runs_dir.clone(),
    });
    let base = spawn_app(AppState::new(test_settings(dir.path())).with_detector(detector)).await?;
    let (encoded, _) = test_image_base64()?;

    let response = reqwest::Client::new()
        .post(format!("{base}/predict"))
        .json(&json!({ "image": encoded }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!runs_dir.exists());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_request_keeps_detection_exclusive() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let detector = Arc::new(SlowDetector::new(
        dir.path().join("runs"),
        Duration::from_millis(800),
    ));
    let base = spawn_app(AppState::new(test_settings(dir.path())).with_detector(detector.clone())).await?;
    let (encoded, _) = test_image_base64()?;
    let body = json!({ "image": encoded });

    // 1. First client gives up while its detection is still running
    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()?;
    let abandoned = impatient.post(format!("{base}/predict")).json(&body).send().await;
    assert!(abandoned.is_err());

    // 2. Second client has to wait for the first detection to finish
    let response = reqwest::Client::new()
        .post(format!("{base}/predict"))
        .json(&body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(detector.inner.requests().len(), 2);
    assert_eq!(detector.max_active.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_train_route_runs_pipeline() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let settings = test_settings(dir.path());
    let config = settings.pipeline_config();
    let downloader = Arc::new(RecordingDownloader::new(dataset_zip_bytes()));

    let factory_downloader = downloader.clone();
    let state = AppState::new(settings).with_pipeline(move || {
        TrainingPipeline::new(config.clone())
            .with_logger(PipelineLogger::disabled())
            .with_downloader(factory_downloader.clone())
    });
    let base = spawn_app(state).await?;

    let response = reqwest::get(format!("{base}/train")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "Training successful");
    assert_eq!(downloader.requests().len(), 1);
    assert!(dir.path().join("artifacts/data_validation/status.txt").exists());

    Ok(())
}

#[tokio::test]
async fn test_train_route_reports_pipeline_failure() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let settings = test_settings(dir.path());
    let config = settings.pipeline_config();

    let state = AppState::new(settings).with_pipeline(move || {
        TrainingPipeline::new(config.clone())
            .with_logger(PipelineLogger::disabled())
            .with_downloader(Arc::new(RecordingDownloader::new(b"corrupt".to_vec())))
    });
    let base = spawn_app(state).await?;

    let response = reqwest::get(format!("{base}/train")).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The body carries the whole cause chain, not just the outer stage error
    let body = response.text().await?;
    assert!(body.contains("data ingestion failed"), "body: {body}");
    assert!(body.contains("failed to extract"), "body: {body}");

    Ok(())
}

#[tokio::test]
async fn test_index_and_live_routes() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let runs_dir = dir.path().join("runs");
    let detector = Arc::new(FakeDetector::new(runs_dir.clone()));
    let base = spawn_app(AppState::new(test_settings(dir.path())).with_detector(detector.clone())).await?;

    let index = reqwest::get(format!("{base}/")).await?;
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.text().await?.contains("/predict"));

    let live = reqwest::get(format!("{base}/live")).await?;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(live.text().await?, "Camera starting!!");
    let requests = detector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source, "0");

    Ok(())
}

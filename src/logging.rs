use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use crate::config::LoggingConfig;

/// Writes every log line to stdout and, when available, to a log file.
#[derive(Clone)]
struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stdout().write_all(buf);
        if let Some(file) = &self.file
            && let Ok(mut guard) = file.lock()
        {
            let _ = guard.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stdout().flush();
        if let Some(file) = &self.file
            && let Ok(mut guard) = file.lock()
        {
            let _ = guard.flush();
        }
        Ok(())
    }
}

fn open_log_file(path: &Path) -> io::Result<Arc<Mutex<File>>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(Mutex::new(file)))
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logger owned by a single pipeline run.
///
/// Stages receive it through the [`PipelineContext`](crate::pipeline::PipelineContext)
/// and run their work inside [`PipelineLogger::in_scope`], so the run's log
/// output goes where the orchestrator says regardless of any process-wide
/// subscriber.
#[derive(Clone)]
pub struct PipelineLogger {
    dispatch: Dispatch,
    log_path: Option<PathBuf>,
}

impl PipelineLogger {
    /// Console + append-mode log file at `config.log_path()`.
    pub fn new(config: &LoggingConfig) -> io::Result<Self> {
        let log_path = config.log_path();
        let file = open_log_file(&log_path)?;
        let writer = TeeWriter { file: Some(file) };
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(default_filter())
            .with_timer(LocalTime::rfc_3339())
            .with_target(true)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            log_path: Some(log_path),
        })
    }

    /// Defers to whatever subscriber is active where the stage runs.
    pub fn inherit() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
            log_path: None,
        }
    }

    /// Discards everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            log_path: None,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Run `f` with this logger as the current default subscriber
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl std::fmt::Debug for PipelineLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLogger")
            .field("log_path", &self.log_path)
            .finish()
    }
}

/// Install the process-wide subscriber used by the CLI and the server.
/// Safe to call more than once.
pub fn init_tracing(config: &LoggingConfig) {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let file = open_log_file(&config.log_path()).ok();
        let writer = TeeWriter { file };
        tracing_subscriber::fmt()
            .with_env_filter(default_filter())
            .with_timer(LocalTime::rfc_3339())
            .with_target(true)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .try_init()
            .ok();
    });
}

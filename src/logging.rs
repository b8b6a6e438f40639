//! Tracing setup shared by the server and the ingest CLI.
//!
//! Logs stream to stdout with a compact formatter, and append to a log file
//! so offline ingestion runs leave an inspectable trail. `RUST_LOG` controls
//! filtering (default `info`); `STUDIORAG_LOG_FILE` overrides the file
//! destination, which otherwise defaults to `logs/studiorag.log`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILE: &str = "logs/studiorag.log";

/// Keeps the non-blocking file writer flushing for the process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout and file tracing layers.
///
/// When the log file cannot be opened the service still starts, logging to
/// stdout only.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry().with(filter).with(stdout);

    let path = resolve_log_path(std::env::var("STUDIORAG_LOG_FILE").ok());
    match open_log_file(&path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        Err(err) => {
            eprintln!(
                "Log file {} unavailable ({err}); logging to stdout only",
                path.display()
            );
            registry.init();
        }
    }
}

/// Pick the log file destination, ignoring blank overrides.
fn resolve_log_path(override_path: Option<String>) -> PathBuf {
    override_path
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

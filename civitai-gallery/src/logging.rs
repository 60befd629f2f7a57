//! Logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr and, when configured, to a
//! daily-rotated log file through a non-blocking writer. `RUST_LOG` takes
//! precedence over the configured level.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

const FALLBACK_LEVEL: &str = "info";

/// Errors from logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log file path {} has no file name", .0.display())]
    InvalidPath(PathBuf),

    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the file writer flushing until dropped.
///
/// Hold it for the lifetime of the program; dropping it early loses buffered
/// log lines.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let (filter, fallback) = build_filter(&config.level);

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::new(Rfc3339));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (dir, prefix) = split_log_path(path)?;
            fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(&dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::new(Rfc3339));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    if fallback {
        tracing::warn!(level = %config.level, "invalid log level, using {}", FALLBACK_LEVEL);
    }
    tracing::debug!(
        level = %config.level,
        file = ?config.file,
        "logging initialized"
    );

    Ok(LoggingGuard { _file: guard })
}

/// Filter from `RUST_LOG`, else from `level`, else `info`.
///
/// The flag is set when `level` was unusable and the fallback applied.
fn build_filter(level: &str) -> (EnvFilter, bool) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, false);
    }
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new(FALLBACK_LEVEL), true),
    }
}

/// Directory and file name prefix for the rolling appender.
fn split_log_path(path: &Path) -> Result<(PathBuf, String), LoggingError> {
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?
        .to_string();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, prefix))
}

//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use civitai_gallery::config::ConfigError;
use civitai_gallery::logging::LoggingError;
use civitai_gallery::thumbnail::ThumbnailError;
use civitai_gallery::FetchError;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error("Cannot use config file {}: {source}", path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),

    #[error("Failed to read cache statistics: {0}")]
    CacheStats(String),

    #[error("Failed to clear cache: {0}")]
    CacheClear(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Fetch(FetchError::Cancelled { .. }) => 130,
            CliError::Config(_)
            | CliError::ConfigFile(_)
            | CliError::ConfigLoad { .. }
            | CliError::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

//! Shared setup for commands that talk to the registry.

use civitai_gallery::config::{config_file_path, ConfigFile};
use civitai_gallery::logging::{init_logging, LoggingGuard};
use civitai_gallery::Gallery;
use tracing::info;

use crate::commands::common::load_config;
use crate::error::CliError;

/// Loaded configuration plus the logging guard for the command's lifetime.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load the configuration file (defaults when absent, an error when
    /// invalid) and start logging.
    ///
    /// `verbose` raises the configured level to `debug`.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = load_config(&config_file_path())?;

        let mut logging = config.logging.clone();
        if verbose {
            logging.level = "debug".to_string();
        }
        let guard = init_logging(&logging)?;

        Ok(Self {
            config,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log the command being run together with the cache location.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            cache = %self.config.cache.directory.display(),
            registry = %self.config.registry.base_url,
            "civitai-gallery starting"
        );
    }

    /// Gallery built from the loaded configuration.
    pub fn gallery(&self) -> Result<Gallery, CliError> {
        Ok(Gallery::new(self.config.gallery_config())?)
    }
}

//! Common types and utilities shared across CLI commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use civitai_gallery::config::ConfigFile;
use civitai_gallery::download::{DownloadOptions, ProgressCallback};
use civitai_gallery::{ArtifactKind, VersionId};

use crate::error::CliError;

/// Model kind selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum KindArg {
    /// Full Stable Diffusion checkpoint
    Checkpoint,
    /// LoRA patch weights
    Lora,
    /// ControlNet model
    Controlnet,
}

impl From<KindArg> for ArtifactKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Checkpoint => ArtifactKind::Checkpoint,
            KindArg::Lora => ArtifactKind::Lora,
            KindArg::Controlnet => ArtifactKind::ControlNet,
        }
    }
}

/// Load the configuration file at `path`.
///
/// A missing file yields defaults. An unreadable or invalid file is an error:
/// acting on defaults instead would clear the wrong cache or overwrite the
/// user's settings on the next save.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    ConfigFile::load_from(path).map_err(|source| CliError::ConfigLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a version id argument.
pub fn parse_version_id(value: &str) -> Result<VersionId, CliError> {
    VersionId::new(value.trim())
        .map_err(|_| CliError::InvalidArgument(format!("'{}' is not a model version id", value)))
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Byte progress bar and the callback feeding it.
///
/// The length is set once the server declares one; until then the bar
/// shows as a spinner.
pub fn download_progress() -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));

    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    let feed = bar.clone();
    let callback: ProgressCallback = Arc::new(move |downloaded, total| {
        if let Some(total) = total {
            if feed.length() != Some(total) {
                feed.set_style(style.clone());
                feed.set_length(total);
            }
        }
        feed.set_position(downloaded);
    });
    (bar, callback)
}

/// Cancellation token tripped by Ctrl+C.
pub fn cancel_on_ctrlc() -> Result<CancellationToken, CliError> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, cancelling download...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    Ok(token)
}

/// Download options with a progress bar and Ctrl+C cancellation.
pub fn interactive_download() -> Result<(ProgressBar, DownloadOptions), CliError> {
    let (bar, progress) = download_progress();
    let options = DownloadOptions::default()
        .with_progress(progress)
        .with_cancellation(cancel_on_ctrlc()?);
    Ok((bar, options))
}

//! Cache management CLI commands.

use std::path::Path;

use clap::Subcommand;
use civitai_gallery::artifact::{cache_stats, clear_cache, remove_stale_partials_under};
use civitai_gallery::config::{config_file_path, format_size, hours_to_duration};
use civitai_gallery::ArtifactKind;

use crate::commands::common::load_config;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show per-kind cache statistics
    Stats,
    /// Remove every cached model file
    Clear,
    /// Delete partial downloads older than the given age
    CleanPartials {
        /// Maximum age in hours (defaults to cache.stale_partial_hours)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

/// Run a cache subcommand with the user's configuration file.
pub fn run(action: CacheAction) -> Result<(), CliError> {
    run_at(action, &config_file_path())
}

/// Run a cache subcommand with the configuration file at `path`.
///
/// Nothing is touched when the file fails to load.
pub fn run_at(action: CacheAction, config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let gallery_config = config.gallery_config();

    match action {
        CacheAction::Stats => {
            println!("Model cache: {}", gallery_config.cache_root.display());
            for kind in ArtifactKind::ALL {
                let dir = gallery_config.kind_dir(kind);
                let stats = cache_stats(&dir).map_err(|e| CliError::CacheStats(e.to_string()))?;
                println!(
                    "  {:<12} {:>4} models, {:>3} partial, {}",
                    kind.cache_subdir(),
                    stats.entries,
                    stats.partial_files,
                    format_size(stats.total_bytes)
                );
            }
            Ok(())
        }
        CacheAction::Clear => {
            println!(
                "Clearing model cache at: {}",
                gallery_config.cache_root.display()
            );
            let mut files = 0;
            let mut bytes = 0;
            for kind in ArtifactKind::ALL {
                let result = clear_cache(&gallery_config.kind_dir(kind))
                    .map_err(|e| CliError::CacheClear(e.to_string()))?;
                files += result.files_deleted;
                bytes += result.bytes_freed;
            }
            println!("Deleted {} files, freed {}", files, format_size(bytes));
            Ok(())
        }
        CacheAction::CleanPartials { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(config.cache.stale_partial_hours);
            let max_age = hours_to_duration(hours);
            let mut files = 0;
            let mut bytes = 0;
            for kind in ArtifactKind::ALL {
                let result = remove_stale_partials_under(&gallery_config.kind_dir(kind), max_age)
                    .map_err(|e| CliError::CacheClear(e.to_string()))?;
                files += result.files_deleted;
                bytes += result.bytes_freed;
            }
            println!(
                "Removed {} partial downloads older than {}h, freed {}",
                files,
                hours,
                format_size(bytes)
            );
            Ok(())
        }
    }
}

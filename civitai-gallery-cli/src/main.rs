//! civitai-gallery CLI
//!
//! Fetches model versions into the local cache, inspects registry metadata,
//! renders thumbnails and manages the cache and configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::cache::CacheAction;
use commands::common::KindArg;
use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "civitai-gallery")]
#[command(version, about = "Download and cache CivitAI model versions", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a model version into the cache (no-op when already cached)
    Fetch {
        /// Model version id
        version_id: String,

        /// Model kind the version must be
        #[arg(short, long, value_enum, default_value = "checkpoint")]
        kind: KindArg,
    },

    /// Show registry metadata for a model version
    Info {
        /// Model version id
        version_id: String,
    },

    /// Fetch the preview image of a model version
    Thumbnail {
        /// Model version id
        version_id: String,

        /// Print the downscaled PNG as a data URL instead of the stored path
        #[arg(long)]
        data_url: bool,
    },

    /// Install a file identified by its SHA-256 hash
    Preinstall {
        /// SHA-256 of the published file
        hash: String,

        /// Where to store the file
        #[arg(short, long)]
        target: PathBuf,

        /// Directory to link the file into under its published name
        #[arg(short, long)]
        link_dir: Option<PathBuf>,
    },

    /// Inspect and clean the download cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View and modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Fetch { version_id, kind } => {
            commands::fetch::run(&version_id, kind.into(), cli.verbose)
        }
        Commands::Info { version_id } => commands::info::run(&version_id, cli.verbose),
        Commands::Thumbnail {
            version_id,
            data_url,
        } => commands::thumbnail::run(&version_id, data_url, cli.verbose),
        Commands::Preinstall {
            hash,
            target,
            link_dir,
        } => commands::preinstall::run(commands::preinstall::PreinstallArgs {
            hash,
            target,
            link_dir,
            verbose: cli.verbose,
        }),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Config { command } => commands::config::run(command),
    }
}

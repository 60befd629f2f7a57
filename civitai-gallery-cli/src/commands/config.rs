//! Configuration management CLI commands.
//!
//! `config get`, `config set`, `config list` and `config path` read and edit
//! the INI configuration file.

use std::path::Path;

use clap::Subcommand;
use civitai_gallery::config::{config_file_path, ConfigKey};

use crate::commands::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., cache.directory)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., download.preferred_fp)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against the user's configuration file.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    run_at(command, &config_file_path())
}

/// Run a config subcommand against the configuration file at `path`.
///
/// A file that fails to load is reported and never rewritten.
pub fn run_at(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            println!("{}", shown(&get_value(path, &key)?));
        }
        ConfigCommands::Set { key, value } => {
            let (key, stored) = set_value(path, &key, &value)?;
            println!("Set {} = {}", key, stored);
        }
        ConfigCommands::List => print_settings(&list_settings(path)?),
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'civitai-gallery config list' to see available keys.",
            key
        ))
    })
}

fn shown(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn get_value(path: &Path, key: &str) -> Result<String, CliError> {
    let key = parse_key(key)?;
    Ok(key.get(&load_config(path)?))
}

/// Apply one setting and save. Returns the key and the value as stored.
fn set_value(path: &Path, key: &str, value: &str) -> Result<(ConfigKey, String), CliError> {
    let key = parse_key(key)?;
    let mut config = load_config(path)?;
    key.set(&mut config, value)?;
    config.save_to(path)?;
    Ok((key, key.get(&config)))
}

fn list_settings(path: &Path) -> Result<Vec<(ConfigKey, String)>, CliError> {
    let config = load_config(path)?;
    Ok(ConfigKey::all()
        .iter()
        .map(|key| (*key, key.get(&config)))
        .collect())
}

fn print_settings(settings: &[(ConfigKey, String)]) {
    println!("Configuration Settings");
    println!("======================");

    let mut current_section = "";
    for (key, value) in settings {
        if key.section() != current_section {
            current_section = key.section();
            println!();
            println!("[{}]", current_section);
        }
        println!("  {} = {}", key.key_name(), shown(value));
    }
}

//! INI configuration file.
//!
//! The file lives at `<config_dir>/civitai-gallery/config.ini`. A missing file
//! or missing keys fall back to defaults; unknown keys are ignored.
//!
//! ```ini
//! [registry]
//! base_url = https://civitai.com
//! token_env = CIVITAI_API_KEY
//! timeout_secs = 30
//! download_timeout_secs = 0
//!
//! [cache]
//! directory = ~/.cache/comfy-civitai
//! metadata_capacity = 1024
//! stale_partial_hours = 24
//!
//! [download]
//! chunk_size = 4194304
//! preferred_fp = fp16
//! preferred_size = pruned
//! preferred_format = SafeTensor
//!
//! [logging]
//! level = info
//! file = ~/.cache/comfy-civitai/logs/civitai-gallery.log
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::client::{ClientConfig, DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_TOKEN_ENV};
use crate::download::DEFAULT_CHUNK_SIZE;
use crate::gallery::{default_cache_root, GalleryConfig};
use crate::registry::DEFAULT_METADATA_CAPACITY;
use crate::variant::VariantPreference;

const APP_DIR: &str = "civitai-gallery";

/// Upper bound for `stale_partial_hours` (ten years).
pub const MAX_STALE_PARTIAL_HOURS: u64 = 10 * 365 * 24;
/// Upper bound for the registry timeouts (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;
/// Upper bound for the download chunk size (256 MiB).
pub const MAX_CHUNK_SIZE: u64 = 256 * 1024 * 1024;
const CONFIG_FILE: &str = "config.ini";

/// Errors from loading, saving or editing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[registry]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub base_url: String,
    /// Environment variable the bearer token is read from.
    pub token_env: String,
    pub timeout_secs: u64,
    /// Overall limit for one file download; 0 disables it.
    pub download_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            download_timeout_secs: 0,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub metadata_capacity: u64,
    /// Age after which partial downloads are removed; 0 keeps them.
    pub stale_partial_hours: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_root(),
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
            stale_partial_hours: 24,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub chunk_size: usize,
    pub preferred_fp: String,
    pub preferred_size: String,
    pub preferred_format: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        let pref = VariantPreference::default();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            preferred_fp: pref.fp,
            preferred_size: pref.size,
            preferred_format: pref.format,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `civitai_gallery=debug`.
    pub level: String,
    /// Optional log file; rotated daily.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub registry: RegistrySettings,
    pub cache: CacheSettings,
    pub download: DownloadSettings,
    pub logging: LoggingConfig,
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(value),
        },
        _ => PathBuf::from(value),
    }
}

/// Format a byte count for display (e.g. `1.5 GB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn parse_number<T: FromStr>(key: ConfigKey, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.name(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse an integer in `min..=max`.
fn parse_bounded(key: ConfigKey, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let number: u64 = parse_number(key, value)?;
    if !(min..=max).contains(&number) {
        return Err(ConfigError::InvalidValue {
            key: key.name(),
            value: value.trim().to_string(),
            reason: format!("expected a value between {} and {}", min, max),
        });
    }
    Ok(number)
}

/// Duration of `hours`, saturating instead of overflowing.
pub fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn non_empty(key: ConfigKey, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.name(),
            value: value.to_string(),
            reason: "value must not be empty".to_string(),
        });
    }
    Ok(value.to_string())
}

impl ConfigFile {
    /// Load from the default location, using defaults if the file is missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, using defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if !path.exists() {
            return Ok(config);
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating its directory. Unset optional values are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(write_err)
    }

    /// Registry client configuration; the token is read from the configured
    /// environment variable.
    pub fn to_client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.registry.base_url.clone())
            .with_timeout(Duration::from_secs(self.registry.timeout_secs))
            .with_download_timeout(
                (self.registry.download_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.registry.download_timeout_secs)),
            );
        client.token = ClientConfig::from_env(&self.registry.token_env).token;
        client
    }

    /// Preferred file variant.
    pub fn preference(&self) -> VariantPreference {
        VariantPreference {
            fp: self.download.preferred_fp.clone(),
            size: self.download.preferred_size.clone(),
            format: self.download.preferred_format.clone(),
        }
    }

    /// Gallery configuration.
    pub fn gallery_config(&self) -> GalleryConfig {
        GalleryConfig::new(self.cache.directory.clone())
            .with_client(self.to_client_config())
            .with_metadata_capacity(self.cache.metadata_capacity)
            .with_chunk_size(self.download.chunk_size)
            .with_preference(self.preference())
            .with_stale_partial_ttl(
                (self.cache.stale_partial_hours > 0)
                    .then(|| hours_to_duration(self.cache.stale_partial_hours)),
            )
    }
}

/// Settable configuration keys, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    RegistryBaseUrl,
    RegistryTokenEnv,
    RegistryTimeoutSecs,
    RegistryDownloadTimeoutSecs,
    CacheDirectory,
    CacheMetadataCapacity,
    CacheStalePartialHours,
    DownloadChunkSize,
    DownloadPreferredFp,
    DownloadPreferredSize,
    DownloadPreferredFormat,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            RegistryBaseUrl,
            RegistryTokenEnv,
            RegistryTimeoutSecs,
            RegistryDownloadTimeoutSecs,
            CacheDirectory,
            CacheMetadataCapacity,
            CacheStalePartialHours,
            DownloadChunkSize,
            DownloadPreferredFp,
            DownloadPreferredSize,
            DownloadPreferredFormat,
            LoggingLevel,
            LoggingFile,
        ]
    }

    /// Section the key lives in.
    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            RegistryBaseUrl
            | RegistryTokenEnv
            | RegistryTimeoutSecs
            | RegistryDownloadTimeoutSecs => "registry",
            CacheDirectory | CacheMetadataCapacity | CacheStalePartialHours => "cache",
            DownloadChunkSize
            | DownloadPreferredFp
            | DownloadPreferredSize
            | DownloadPreferredFormat => "download",
            LoggingLevel | LoggingFile => "logging",
        }
    }

    /// Key name inside its section.
    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            RegistryBaseUrl => "base_url",
            RegistryTokenEnv => "token_env",
            RegistryTimeoutSecs => "timeout_secs",
            RegistryDownloadTimeoutSecs => "download_timeout_secs",
            CacheDirectory => "directory",
            CacheMetadataCapacity => "metadata_capacity",
            CacheStalePartialHours => "stale_partial_hours",
            DownloadChunkSize => "chunk_size",
            DownloadPreferredFp => "preferred_fp",
            DownloadPreferredSize => "preferred_size",
            DownloadPreferredFormat => "preferred_format",
            LoggingLevel => "level",
            LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            RegistryBaseUrl => config.registry.base_url.clone(),
            RegistryTokenEnv => config.registry.token_env.clone(),
            RegistryTimeoutSecs => config.registry.timeout_secs.to_string(),
            RegistryDownloadTimeoutSecs => config.registry.download_timeout_secs.to_string(),
            CacheDirectory => config.cache.directory.display().to_string(),
            CacheMetadataCapacity => config.cache.metadata_capacity.to_string(),
            CacheStalePartialHours => config.cache.stale_partial_hours.to_string(),
            DownloadChunkSize => config.download.chunk_size.to_string(),
            DownloadPreferredFp => config.download.preferred_fp.clone(),
            DownloadPreferredSize => config.download.preferred_size.clone(),
            DownloadPreferredFormat => config.download.preferred_format.clone(),
            LoggingLevel => config.logging.level.clone(),
            LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let key = *self;
        match self {
            RegistryBaseUrl => {
                let url = non_empty(key, value)?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue {
                        key: key.name(),
                        value: url,
                        reason: "expected an http:// or https:// URL".to_string(),
                    });
                }
                config.registry.base_url = url.trim_end_matches('/').to_string();
            }
            RegistryTokenEnv => config.registry.token_env = non_empty(key, value)?,
            RegistryTimeoutSecs => {
                config.registry.timeout_secs = parse_bounded(key, value, 1, MAX_TIMEOUT_SECS)?
            }
            RegistryDownloadTimeoutSecs => {
                config.registry.download_timeout_secs =
                    parse_bounded(key, value, 0, MAX_TIMEOUT_SECS)?
            }
            CacheDirectory => config.cache.directory = expand_tilde(&non_empty(key, value)?),
            CacheMetadataCapacity => config.cache.metadata_capacity = parse_number(key, value)?,
            CacheStalePartialHours => {
                config.cache.stale_partial_hours =
                    parse_bounded(key, value, 0, MAX_STALE_PARTIAL_HOURS)?
            }
            DownloadChunkSize => {
                let size = parse_bounded(key, value, 1, MAX_CHUNK_SIZE)?;
                config.download.chunk_size = size as usize;
            }
            DownloadPreferredFp => config.download.preferred_fp = non_empty(key, value)?,
            DownloadPreferredSize => config.download.preferred_size = non_empty(key, value)?,
            DownloadPreferredFormat => config.download.preferred_format = non_empty(key, value)?,
            LoggingLevel => config.logging.level = non_empty(key, value)?,
            LoggingFile => {
                let value = value.trim();
                config.logging.file = (!value.is_empty()).then(|| expand_tilde(value));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

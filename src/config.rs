use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoConfig;
use crate::duration::deserialize_duration;
use crate::exposure::DEFAULT_TTL;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LOCKBOX_CONFIG";

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

/// Clipboard exposure configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// How long a retrieved secret stays on the clipboard.
    #[serde(default = "default_ttl", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,

    /// Copy command reading the value on stdin, e.g. `"xclip -selection
    /// clipboard"`. Auto-detected when unset.
    pub clipboard_command: Option<String>,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            clipboard_command: None,
        }
    }
}

/// Application configuration as written in `lockbox.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encrypted store file. If relative, resolved from the config file's
    /// directory. Defaults to `store.<backend>` in the XDG data directory.
    pub store_path: Option<PathBuf>,

    /// Clipboard exposure settings.
    pub exposure: ExposureConfig,

    /// Encryption backend settings.
    pub crypto: CryptoConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the store path.
    ///
    /// Absolute paths are used as-is, relative ones are joined to
    /// `config_dir`. Without a setting the store lives in `data_dir`.
    pub fn resolve_store_path(&self, config_dir: &Path, data_dir: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => data_dir.join(format!("store.{}", self.crypto.store_extension())),
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `$LOCKBOX_CONFIG` if set
/// 2. `./lockbox.toml` if it exists in current directory
/// 3. `~/.config/lockbox/lockbox.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let local_config = PathBuf::from("lockbox.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("lockbox").join("lockbox.toml");
    }

    local_config
}

fn default_data_dir(config_dir: &Path) -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("lockbox"))
        .unwrap_or_else(|| config_dir.to_path_buf())
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// File the settings came from (it may not exist).
    pub config_path: PathBuf,

    /// Directory relative paths are resolved against.
    pub config_dir: PathBuf,

    /// The encrypted store file.
    pub store_path: PathBuf,

    /// Clipboard exposure settings.
    pub exposure: ExposureConfig,

    /// Encryption backend settings.
    pub crypto: CryptoConfig,
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config = Config::load(&config_path)?;
        Self::resolve(config, config_path)
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        Self::resolve(Config::default(), config_path)
    }

    fn resolve(config: Config, config_path: PathBuf) -> Result<Self> {
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();
        let store_path = config.resolve_store_path(&config_dir, &default_data_dir(&config_dir));

        if config.exposure.ttl.is_zero() {
            anyhow::bail!("exposure.ttl must be greater than zero");
        }

        Ok(Self {
            config_path,
            config_dir,
            store_path,
            exposure: config.exposure,
            crypto: config.crypto,
        })
    }
}

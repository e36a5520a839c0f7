//! Persisted config (index location, Ollama endpoint, retrieval knobs) in the app data directory.
//!
//! The config is loaded once by the caller and handed to the pieces that need it;
//! nothing in the core reads it on its own.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::DEFAULT_MAX_CHARS;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_COMPLETION_MODEL, DEFAULT_EMBED_MODEL};

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_OVER_FETCH: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where course indexes are written. Falls back to `<app data>/indexes`.
    pub index_dir: Option<String>,
    pub ollama_url: String,
    pub embed_model: String,
    pub completion_model: String,
    /// Maximum characters per segment.
    pub max_chars: usize,
    /// Default number of segments handed to the model.
    pub top_k: usize,
    /// Multiplier on `top_k` for the similarity search when a time scope is present.
    pub over_fetch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_dir: None,
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_chars: DEFAULT_MAX_CHARS,
            top_k: DEFAULT_TOP_K,
            over_fetch: DEFAULT_OVER_FETCH,
        }
    }
}

impl Config {
    /// Resolved index directory: the configured one, else the app data default.
    pub fn index_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.index_dir.as_deref().filter(|s| !s.is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => app_data::default_index_dir().ok_or(ConfigError::NoDataDir),
        }
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    match load_config_from(&path) {
        Ok(config) => config,
        Err(ConfigError::Read(_)) => Config::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
            Config::default()
        }
    }
}

/// Load config from an explicit path. Unlike [`load_config`], errors are returned.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the index directory. Creates it if needed.
pub fn set_index_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(path).map_err(ConfigError::Write)?;
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.index_dir = Some(path.to_string_lossy().into_owned());
    save_config(&config)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::CmdbarError;

/// Default debounce window for file-change reloads, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Config file location; `~` expands to the user's home directory.
pub const CONFIG_FILE: &str = "~/.cmdbar/config.json";

/// File name of the alias store inside the data directory.
pub const ALIAS_FILE: &str = "aliases.json";

/// File name of the command history inside the data directory.
pub const HISTORY_FILE: &str = "history.txt";

fn default_history_limit() -> usize {
    crate::history::HISTORY_LIMIT
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Override for the data directory holding aliases and history.
    /// Supports `~` expansion.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "dataDir")]
    pub data_dir: Option<String>,
    /// Maximum number of history entries kept in memory and on disk.
    #[serde(default = "default_history_limit", rename = "historyLimit")]
    pub history_limit: usize,
    /// Debounce window for alias file change events (milliseconds).
    #[serde(default = "default_debounce_ms", rename = "debounceMs")]
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: None, // Will use default_data_dir() via getter
            history_limit: crate::history::HISTORY_LIMIT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Returns the data directory, honoring the configured override.
    pub fn get_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => default_data_dir(),
        }
    }

    /// Path of the alias store file.
    pub fn alias_path(&self) -> PathBuf {
        self.get_data_dir().join(ALIAS_FILE)
    }

    /// Path of the history file.
    pub fn history_path(&self) -> PathBuf {
        self.get_data_dir().join(HISTORY_FILE)
    }

    /// Returns the reload debounce as a [`Duration`].
    pub fn get_debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// The default data directory (~/.cmdbar), falling back to a temp
/// directory when no home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cmdbar"))
        .unwrap_or_else(|| std::env::temp_dir().join("cmdbar"))
}

/// Log directory. Fixed location; used before configuration is read.
pub fn log_dir() -> PathBuf {
    default_data_dir().join("logs")
}

#[instrument(name = "load_config")]
pub fn load_config() -> Config {
    let config_path = PathBuf::from(shellexpand::tilde(CONFIG_FILE).as_ref());
    load_config_from(&config_path)
}

/// Load configuration from `path`, falling back to defaults on any failure.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Config::default();
    }

    match read_config(path) {
        Ok(config) => {
            info!(path = %path.display(), "Successfully loaded config");
            config
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to load config, using defaults");
            Config::default()
        }
    }
}

fn read_config(path: &Path) -> crate::error::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CmdbarError::Config(format!("unreadable config file: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CmdbarError::Config(format!("invalid config file: {}", e)))
}

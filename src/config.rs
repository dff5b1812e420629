use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_URL_VAR: &str = "TASKBOARD_API_URL";
pub const USER_VAR: &str = "TASKBOARD_USER";
pub const TOKEN_FILE_VAR: &str = "TASKBOARD_TOKEN_FILE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Signed-in user; commands that need a session fail without one
    #[serde(default)]
    pub user_id: Option<String>,
    /// File the identity provider helper writes the current token to
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            user_id: None,
            token_file: default_token_file(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    String::from("https://api.taskboard.app/v1")
}

fn default_token_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
        .join("token")
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Overrides fields from `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup(API_URL_VAR) {
            self.api_url = api_url;
        }
        if let Some(user_id) = lookup(USER_VAR) {
            self.user_id = Some(user_id);
        }
        if let Some(token_file) = lookup(TOKEN_FILE_VAR) {
            self.token_file = PathBuf::from(token_file);
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskboard").join("config.toml"))
}

/// Reads `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the user config file and applies environment overrides.
pub fn load_user_config() -> Result<Config, ConfigError> {
    let mut config = match default_config_path() {
        Some(path) => load_config(&path)?,
        None => Config::default(),
    };
    config.apply_env_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

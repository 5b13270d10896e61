use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversation::DEFAULT_GREETING;
use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "KRAISLAUF_API_URL";

/// Settings as stored in `config.json`. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

/// Fully resolved settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub request_timeout: Option<Duration>,
    pub history_limit: Option<usize>,
    pub greeting: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Layer `overrides` (e.g. CLI flags) and the environment on top of this
    /// file config. Precedence: overrides, then `KRAISLAUF_API_URL`, then the
    /// file, then defaults.
    pub fn resolve(&self, overrides: &Config) -> Settings {
        let env_url = std::env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty());
        self.resolve_with_env(overrides, env_url)
    }

    fn resolve_with_env(&self, overrides: &Config, env_url: Option<String>) -> Settings {
        let api_url = overrides
            .api_url
            .clone()
            .or(env_url)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Settings {
            api_url,
            request_timeout: overrides
                .request_timeout_secs
                .or(self.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            history_limit: overrides.history_limit.or(self.history_limit),
            greeting: overrides
                .greeting
                .clone()
                .or_else(|| self.greeting.clone())
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
        }
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

        Ok(config_dir.join("kraislauf").join("config.json"))
    }
}

impl From<&Settings> for Config {
    fn from(settings: &Settings) -> Self {
        Self {
            api_url: Some(settings.api_url.clone()),
            request_timeout_secs: settings.request_timeout.map(|t| t.as_secs()),
            history_limit: settings.history_limit,
            greeting: Some(settings.greeting.clone()),
        }
    }
}

//! Application settings structures

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::ingest::websocket::WebSocketConfig;

/// Environment variable that overrides `websocket.url`.
pub const WS_URL_ENV: &str = "FERRET_WS_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse method table: {0}")]
    Methods(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub websocket: WebSocketConfig,
    pub monitor: MonitorConfig,
    pub erc20: Erc20Config,
    /// JSON object mapping selectors to method names
    pub methods_file: PathBuf,
}

/// Sliding-window thresholds for the spam predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Window width in blocks; also the eviction horizon
    pub block_range: u64,
    /// Minimum span between first and latest occurrence before alerting
    pub min_consecutive_blocks: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            block_range: 20,
            min_consecutive_blocks: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Erc20Config {
    /// Addresses never probed (wrapped native token, well-known routers, ...)
    pub ignored_addresses: Vec<String>,
}

impl Erc20Config {
    pub fn ignored_set(&self) -> HashSet<String> {
        self.ignored_addresses.iter().map(|a| a.to_lowercase()).collect()
    }
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: AppConfig = toml::from_str(&content)?;
        let mut config = parsed.finish(std::env::var(WS_URL_ENV).ok())?;

        // Relative method tables resolve against the settings file
        if config.methods_file.is_relative() {
            if let Some(parent) = path.parent() {
                config.methods_file = parent.join(&config.methods_file);
            }
        }

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses settings without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let parsed: AppConfig = toml::from_str(content)?;
        parsed.finish(None)
    }

    fn finish(mut self, ws_url_override: Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = ws_url_override {
            if !url.trim().is_empty() {
                self.websocket.url = url.trim().to_string();
            }
        }
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    fn normalize(&mut self) {
        for address in &mut self.erc20.ignored_addresses {
            *address = address.trim().to_lowercase();
        }
        if self.methods_file.as_os_str().is_empty() {
            self.methods_file = PathBuf::from("methods.json");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.websocket.url)
            .map_err(|e| ConfigError::Invalid(format!("websocket.url: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "websocket.url must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        if self.monitor.block_range == 0 {
            return Err(ConfigError::Invalid("monitor.block_range must be positive".into()));
        }
        if self.monitor.min_consecutive_blocks > self.monitor.block_range {
            return Err(ConfigError::Invalid(format!(
                "monitor.min_consecutive_blocks ({}) exceeds monitor.block_range ({})",
                self.monitor.min_consecutive_blocks, self.monitor.block_range
            )));
        }
        Ok(())
    }
}

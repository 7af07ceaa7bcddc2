//! CLI configuration.
//!
//! Stored as TOML, by default at `~/.config/threadlink/realtime.toml`:
//!
//! ```toml
//! api_url = "http://localhost:8000/api"
//!
//! [realtime]
//! base_delay_ms = 1000
//! max_attempts = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use threadlink_realtime::RealtimeConfig;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// REST base address used when `THREADLINK_API_URL` is not set.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// File holding the session token, read when no token is passed on
    /// the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    #[serde(default)]
    pub realtime: RealtimeConfig,
}

fn default_api_url() -> String {
    "http://localhost:8000/api".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_file: None,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the default configuration file path.
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("threadlink")
        .join("realtime.toml")
}

//! Client configuration
//!
//! Values come from the process environment after `.env` is loaded:
//! - `RESEARCH_API_URL` - base URL of the workflow API
//! - `RESEARCH_REQUEST_TIMEOUT_SECS` - upper bound for a whole streamed run
//! - `RESEARCH_EXPORT_DIR` - where exported files are written
//! - `RESEARCH_HISTORY_PATH` - execution history file

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Long enough for a six-step multi-agent run
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

const APP_DIR: &str = "research-client";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL without trailing slash
    pub api_url: String,
    pub request_timeout: Duration,
    pub export_dir: PathBuf,
    pub history_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            export_dir: default_export_dir(),
            history_path: default_history_path(),
        }
    }
}

impl ClientConfig {
    /// Load `.env` (current dir, then parent) and read the environment
    pub fn load() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_path("../.env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("RESEARCH_API_URL").filter(|v| !v.trim().is_empty()) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ClientError::Config(format!(
                    "RESEARCH_API_URL must be an http(s) URL, got '{}'",
                    url
                )));
            }
            config.api_url = url;
        }

        if let Some(raw) = lookup("RESEARCH_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!(
                    "RESEARCH_REQUEST_TIMEOUT_SECS must be a number of seconds, got '{}'",
                    raw
                ))
            })?;
            if secs == 0 {
                return Err(ClientError::Config(
                    "RESEARCH_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = lookup("RESEARCH_EXPORT_DIR").filter(|v| !v.trim().is_empty()) {
            config.export_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("RESEARCH_HISTORY_PATH").filter(|v| !v.trim().is_empty()) {
            config.history_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_history_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("history.json")
}

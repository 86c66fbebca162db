//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{ConsoleError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the admin REST backend (e.g. https://studio.example.com/api)
    pub api_url: String,
    /// File backing the operator's bearer token
    pub token_file: PathBuf,
    /// Port for the local console API
    pub console_port: u16,
    /// Default `limit` for paginated list calls
    pub page_size: u32,
    /// Quiet period before a user search is sent
    pub search_debounce: Duration,
    /// Optional per-request timeout; `None` lets a request hang
    pub http_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api_url: env_var("ADMIN_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api".to_string())
                .trim_end_matches('/')
                .to_string(),
            token_file: env_var("TOKEN_FILE")
                .unwrap_or_else(|_| "./.studio-session.json".to_string())
                .into(),
            console_port: env_var("CONSOLE_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| ConsoleError::Config("Invalid CONSOLE_PORT".to_string()))?,
            page_size: env_var("PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConsoleError::Config("Invalid PAGE_SIZE".to_string()))?,
            search_debounce: Duration::from_millis(
                env_var("SEARCH_DEBOUNCE_MS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .map_err(|_| ConsoleError::Config("Invalid SEARCH_DEBOUNCE_MS".to_string()))?,
            ),
            http_timeout: match env_var("HTTP_TIMEOUT_SECS") {
                Ok(v) => Some(Duration::from_secs(v.parse().map_err(|_| {
                    ConsoleError::Config("Invalid HTTP_TIMEOUT_SECS".to_string())
                })?)),
                Err(_) => None,
            },
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConsoleError::Config(format!("Missing env var: {key}")))
}

//! Application-wide error types.

use thiserror::Error;

use crate::actions::ActionKind;

/// Message shown when the backend rejects a call without saying why.
pub const FALLBACK_MESSAGE: &str = "Request failed";

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Client-side gate failed; nothing was sent.
    #[error("{0}")]
    Validation(String),

    #[error("{0} is already in progress")]
    Busy(ActionKind),

    /// Non-2xx status or `success: false`; `message` is the server's own text.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConsoleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an API failure from an optional server message.
    pub fn api(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
        if status == 409 {
            Self::Conflict(message)
        } else {
            Self::Api { status, message }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

use thiserror::Error;

use crate::models::assistant::RunStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssistantError {
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error{}: {}", .status.map(|s| format!(" ({})", s)).unwrap_or_default(), .message)]
    Transport { status: Option<u16>, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("run {} ended with status '{}'{}", .run_id, .status, .message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    RunFailure {
        run_id: String,
        status: RunStatus,
        message: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, AssistantError>;

impl AssistantError {
    pub fn missing(what: &str) -> Self {
        AssistantError::Validation(format!("{} is required", what))
    }

    /// Maps an HTTP status and the service's error text to the error taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AssistantError::Auth { status, message },
            _ => AssistantError::Transport { status: Some(status), message },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AssistantError::Auth { .. })
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return AssistantError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => AssistantError::from_status(status.as_u16(), err.to_string()),
            None => AssistantError::Transport { status: None, message: err.to_string() },
        }
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::Decode(err.to_string())
    }
}

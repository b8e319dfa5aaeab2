use serde::Deserialize;
use thiserror::Error;

use crate::db::types::AttemptState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("attempt is already {state}")]
    AttemptClosed { state: AttemptState },
    #[error("server answered {status} ({code}): {detail}")]
    Api { status: u16, code: String, detail: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    state: Option<AttemptState>,
}

impl ClientError {
    /// Classifies a non-2xx response from the attempts API.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { code, state: Some(state), .. }) if code == "attempt_closed" => {
                Self::AttemptClosed { state }
            }
            Ok(ErrorBody { code, detail, .. }) => Self::Api { status, code, detail },
            Err(_) => Self::Api { status, code: "unknown".to_string(), detail: body.to_string() },
        }
    }

    /// Transport failures, 5xx and 429 may succeed later; other 4xx never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::AttemptClosed { .. } | Self::Decode(_) => false,
        }
    }
}

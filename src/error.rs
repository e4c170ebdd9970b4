//! Error taxonomy for the performance pipeline.
//!
//! "Not found" is never an error here: lookups that can legitimately come
//! back empty return `Option`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerfError {
    /// Network failure, timeout or 5xx.
    /// Callers may retry or report unavailability.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP 429 from an upstream
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-retryable HTTP answer (4xx other than 429)
    #[error("upstream rejected request ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PerfError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }

    /// Map a non-success HTTP status into the taxonomy.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(body)
        } else if status.is_server_error() {
            Self::Transient(format!("{}: {}", status, body))
        } else {
            Self::Upstream {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}

impl From<reqwest::Error> for PerfError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_client_error() => Self::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            },
            _ => Self::Transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PerfError>;

//! Error types for model provider calls.
//!
//! Every failure a provider can report is mapped onto one [`ProviderError`]
//! variant, and every variant has a fixed [`ErrorClass`]. Callers decide
//! whether to retry by looking at the class, never at the message text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rate limit, timeout, overloaded or unreachable provider.
    Transient,
    /// Authentication, content policy or request shape problems.
    Permanent,
}

/// Errors that can occur when calling a model provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// HTTP 429.
    #[error("rate limited by provider (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The request did not complete in time.
    #[error("provider request timed out")]
    Timeout,

    /// 5xx or the provider's overloaded status.
    #[error("provider unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Connection-level failure before a response arrived.
    #[error("HTTP transport error: {0}")]
    Http(String),

    /// 401 / 403.
    #[error("provider rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    /// The provider refused to answer on content-policy grounds.
    #[error("provider rejected the request content: {0}")]
    ContentRejected(String),

    /// Any other 4xx.
    #[error("provider rejected the request (status {status}): {message}")]
    BadRequest { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Classify this error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout
            | ProviderError::Unavailable { .. }
            | ProviderError::Http(_) => ErrorClass::Transient,
            ProviderError::Unauthorized { .. }
            | ProviderError::ContentRejected(_)
            | ProviderError::BadRequest { .. }
            | ProviderError::MalformedResponse(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Minimum wait the provider asked for before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Map a non-success HTTP status and body to a classified error.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => ProviderError::RateLimited { retry_after_secs },
            408 => ProviderError::Timeout,
            401 | 403 => ProviderError::Unauthorized { status },
            500..=599 => ProviderError::Unavailable {
                status,
                message: body.to_string(),
            },
            400 if looks_like_policy_refusal(body) => {
                ProviderError::ContentRejected(body.to_string())
            }
            _ => ProviderError::BadRequest {
                status,
                message: body.to_string(),
            },
        }
    }
}

fn looks_like_policy_refusal(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("content policy") || lower.contains("content_policy") || lower.contains("refus")
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

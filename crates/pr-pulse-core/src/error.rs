//! Failure taxonomy for remote calls.
//!
//! | Variant | Retried | Side effect |
//! |---------|---------|-------------|
//! | [`Transient`](FetchError::Transient) | yes | progress only |
//! | [`RateLimited`](FetchError::RateLimited) | yes, honoring the reset hint | progress only |
//! | [`AuthFailure`](FetchError::AuthFailure) | no | stored credential is cleared |
//! | [`Forbidden`](FetchError::Forbidden) | no | none |
//! | [`NotFound`](FetchError::NotFound) | no | none |
//! | [`Malformed`](FetchError::Malformed) | no | none |
//! | [`Exhausted`](FetchError::Exhausted) | n/a | wraps the last retryable error |

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Server error (HTTP 5xx) or transport failure.
    #[error("transient upstream failure: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("rate limited: {message}")]
    RateLimited {
        /// When the upstream quota resets, if the response said so.
        reset_at: Option<DateTime<Utc>>,
        message: String,
    },

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed request or response: {0}")]
    Malformed(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. } | FetchError::RateLimited { .. }
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.root(), FetchError::AuthFailure(_))
    }

    /// The underlying error, looking through [`Exhausted`](FetchError::Exhausted).
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self.root() {
            FetchError::RateLimited { reset_at, .. } => *reset_at,
            _ => None,
        }
    }

    /// Short notice suitable for a transient, non-blocking UI message.
    pub fn user_message(&self, now: DateTime<Utc>) -> String {
        match self.root() {
            FetchError::RateLimited { reset_at, .. } => match reset_at {
                Some(reset) => {
                    let secs = (*reset - now).num_seconds().max(0);
                    let minutes = ((secs + 59) / 60).max(1);
                    format!(
                        "GitHub rate limit reached. Try again in {} minute{}.",
                        minutes,
                        if minutes == 1 { "" } else { "s" }
                    )
                }
                None => "GitHub rate limit reached. Try again in a few minutes.".to_string(),
            },
            FetchError::AuthFailure(_) => {
                "Your GitHub token was rejected. Please sign in again.".to_string()
            }
            FetchError::NotFound(what) => format!("Not found: {}", what),
            FetchError::Forbidden(_) => "Access to this resource is not permitted.".to_string(),
            FetchError::Malformed(_) => "The request could not be processed.".to_string(),
            FetchError::Transient { .. } | FetchError::Exhausted { .. } => {
                "GitHub is not responding right now. Please try again shortly.".to_string()
            }
        }
    }
}

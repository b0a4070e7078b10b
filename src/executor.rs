//! Backoff executor for remote calls.
//!
//! Wraps one idempotent remote call and retries it on retryable failures
//! (HTTP 5xx, rate limiting, transport errors) with exponentially growing,
//! capped delays. Every call gets its own attempt budget; budgets are never
//! shared between calls.
//!
//! Retry strategy:
//! - `Transient` / `RateLimited` → wait `min(base * 2^attempt, cap)`
//!   (stretched toward the server's reset hint) and retry
//! - `AuthFailure` → clear the stored token and fail immediately
//! - anything else → fail immediately
//! - attempts exhausted → `Exhausted` wrapping the last error

use chrono::Utc;
use pr_pulse_core::backoff::BackoffPolicy;
use pr_pulse_core::error::FetchError;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::progress::{RetryEvent, RetryReporter};

#[derive(Clone)]
pub struct BackoffExecutor {
    policy: BackoffPolicy,
    reporter: Arc<dyn RetryReporter>,
    auth: Arc<dyn TokenProvider>,
}

impl BackoffExecutor {
    pub fn new(
        policy: BackoffPolicy,
        reporter: Arc<dyn RetryReporter>,
        auth: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            policy,
            reporter,
            auth,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Same reporter and credential, different delay policy.
    pub fn with_policy(&self, policy: BackoffPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Run `call` until it succeeds, fails non-retryably, or the attempt
    /// budget runs out. `call` must be safe to repeat.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_auth_failure() {
                self.auth.invalidate();
                return Err(err);
            }

            if !err.is_retryable() {
                debug!(call = label, "non-retryable failure: {}", err);
                return Err(err);
            }

            if !self.policy.can_retry(attempt) {
                warn!(call = label, attempts = attempt + 1, "retries exhausted: {}", err);
                self.reporter.report(RetryEvent::GaveUp {
                    call: label.to_string(),
                    attempts: attempt + 1,
                });
                return Err(FetchError::Exhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }

            let delay = self
                .policy
                .delay_with_hint(attempt, err.reset_at(), Utc::now());
            debug!(
                call = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retryable failure: {}",
                err
            );
            self.reporter.report(RetryEvent::Waiting {
                call: label.to_string(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                reason: err.to_string(),
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

//! Access-token accessor.
//!
//! How a token was obtained (OAuth exchange, pasted personal token,
//! environment) is outside this crate. Components only read it through
//! [`TokenProvider::token`], and an [`AuthFailure`] from upstream calls
//! [`TokenProvider::invalidate`] so the next call goes out unauthenticated
//! until a new credential is supplied.
//!
//! [`AuthFailure`]: pr_pulse_core::error::FetchError::AuthFailure

use std::sync::RwLock;
use tracing::warn;

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;

    /// Forget the stored credential.
    fn invalidate(&self);
}

/// Token held in memory for the lifetime of a session.
pub struct SharedToken {
    inner: RwLock<Option<String>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    /// Read the token from the named environment variable.
    pub fn from_env(var: &str) -> Self {
        Self::new(std::env::var(var).ok())
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|t| t.clone())
    }

    fn invalidate(&self) {
        match self.inner.write() {
            Ok(mut t) => {
                if t.take().is_some() {
                    warn!("access token rejected upstream; credential cleared");
                }
            }
            Err(_) => warn!("token lock poisoned; credential not cleared"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_clears_token() {
        let token = SharedToken::new(Some("ghp_abc".into()));
        assert_eq!(token.token().as_deref(), Some("ghp_abc"));
        token.invalidate();
        assert_eq!(token.token(), None);
        token.invalidate();
        assert_eq!(token.token(), None);
    }

    #[test]
    fn test_blank_token_is_none() {
        assert_eq!(SharedToken::new(Some("   ".into())).token(), None);
    }
}

//! Session failure taxonomy and retry classification.

use std::time::Duration;

use thiserror::Error;

use crate::{ConfigError, IdentityError, traits::TokenError};

/// Phrase the gateway transport reports once its session has been closed,
/// whether through inactivity, an expired token, or an explicit close.
///
/// Retries depend on this exact wording; if the transport's error text changes,
/// session losses degrade to [`SessionError::Unknown`] (fatal, no retry).
pub const SESSION_NOT_RUNNING: &str = "client session is not running";

/// Whether a transport-reported failure means the session must be replaced.
#[must_use]
pub fn is_session_lost(message: &str) -> bool {
    message.contains(SESSION_NOT_RUNNING)
}

/// Request-level failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Gateway token unavailable: {0}")]
    TokenUnavailable(#[source] TokenError),
    #[error("{0}")]
    SessionLost(String),
    #[error("Gateway {stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("Gateway session exhausted after {attempts} attempts: {last}")]
    SessionExhausted { attempts: u32, last: Box<Self> },
    #[error("{0}")]
    Unknown(String),
}

impl SessionError {
    /// Classify a failure raised by a transport or agent stream.
    #[must_use]
    pub fn from_stream_failure(err: &impl std::fmt::Display) -> Self {
        let message = err.to_string();
        if is_session_lost(&message) {
            Self::SessionLost(message)
        } else {
            Self::Unknown(message)
        }
    }

    /// Whether a fresh attempt may succeed where this one failed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenUnavailable(_) | Self::SessionLost(_) | Self::Timeout { .. }
        )
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        Self::TokenUnavailable(err)
    }
}

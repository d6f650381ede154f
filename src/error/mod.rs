//! Error types for popauth.

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::error::{HandshakeError, StoreError};

/// Primary error type for all popauth operations.
#[derive(Error, Debug)]
pub enum PopauthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Handshake(HandshakeError),

    #[error("Token store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl PopauthError {
    /// HTTP status attached to the error, if it came from a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => err.status(),
            _ => None,
        }
    }

    /// Whether the caller should send the user through login again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::Api(err) => matches!(err.status(), Some(401 | 403)),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PopauthError>;

use std::time::Duration;

use thiserror::Error;

use crate::error::PopauthError;

/// Terminal failures of a popup handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Unable to open popup")]
    PopupBlocked,
    #[error("Authentication popup closed")]
    PopupClosed,
    #[error("Authentication timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Authentication cancelled")]
    Cancelled,
    #[error("Invalid auth URL: {0}")]
    InvalidUrl(String),
}

/// Failures of the durable key-value backend behind the token store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<HandshakeError> for PopauthError {
    fn from(error: HandshakeError) -> Self {
        PopauthError::Handshake(error)
    }
}

impl From<StoreError> for PopauthError {
    fn from(error: StoreError) -> Self {
        PopauthError::Store(error)
    }
}

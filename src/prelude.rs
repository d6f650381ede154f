//! Convenience re-exports for common use.

pub use crate::api::{ApiBody, ApiClient, ApiError, RequestOptions};
pub use crate::auth::{
    Credential, HandshakeError, MessageBus, PopupAuth, PopupOpener, Session, TokenStore,
    WindowMessage,
};
pub use crate::config::PopauthConfig;
pub use crate::error::{PopauthError, Result};

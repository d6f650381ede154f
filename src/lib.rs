//! popauth: popup login bridge
//!
//! Opens a third-party login popup, waits for it to post a signed credential
//! back to the owning window, keeps the tokens in a durable per-origin store
//! and attaches them to outgoing API requests.
//!
//! Browser globals are injected: hosts provide a [`auth::PopupOpener`] and feed
//! window messages into a [`auth::MessageBus`], which keeps the handshake
//! testable without a real window.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use popauth::prelude::*;
//!
//! # async fn example(opener: Arc<dyn PopupOpener>, messages: MessageBus) -> popauth::error::Result<()> {
//! let config = PopauthConfig::global();
//! let api = ApiClient::from_global(config.file_token_store());
//! let auth = PopupAuth::new(popauth::config::api_base(), opener, Arc::new(messages))?
//!     .with_config(config.popup.clone());
//! let session = Session::new(api).with_source(Arc::new(auth));
//!
//! session.login().await?;
//! let body = session.api().get("/me").await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;

//! Popup login handshake, token storage and the session facade.

pub mod error;
pub mod handshake;
pub mod message;
pub mod popup;
pub mod service;
pub mod store;
pub mod token;

pub use error::{HandshakeError, StoreError};
pub use handshake::{begin_popup_auth, Correlation, PopupAuth, PopupAuthConfig};
pub use message::{MessageBus, MessageListener, MessageSource, Subscription, WindowMessage};
pub use popup::{CloseError, PopupGeometry, PopupOpener, PopupWindow, ScreenRect};
pub use service::{CredentialSource, Session, User};
pub use store::{
    FileStore, FileStoreConfig, KeyValueStore, MemoryStore, TokenStore, ACCESS_KEY, REFRESH_KEY,
};
pub use token::Credential;

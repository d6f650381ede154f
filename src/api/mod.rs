//! Authenticated fetch against the configured API origin.

pub mod client;
pub mod error;
pub mod request;

pub use client::{shared_client, ApiClient};
pub use error::ApiError;
pub use request::{ApiBody, RequestOptions};

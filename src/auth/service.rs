use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::HandshakeError;
use super::handshake::PopupAuth;
use super::store::TokenStore;
use super::token::Credential;
use crate::api::{ApiClient, RequestOptions};
use crate::error::{PopauthError, Result};

/// Anything that can produce a fresh credential, usually by asking the user.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn obtain(&self) -> std::result::Result<Credential, HandshakeError>;
}

#[async_trait]
impl CredentialSource for PopupAuth {
    async fn obtain(&self) -> std::result::Result<Credential, HandshakeError> {
        self.begin().await
    }
}

/// Profile returned by `GET /me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Facade tying the handshake, the token store and the API client together.
///
/// All I/O decisions (printing, prompting) belong to the caller; `Session`
/// only returns typed results and errors.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use popauth::api::ApiClient;
/// use popauth::auth::{PopupAuth, Session, TokenStore};
///
/// # async fn example(auth: PopupAuth) -> popauth::error::Result<()> {
/// let api = ApiClient::new("https://api.example.com", TokenStore::in_memory());
/// let session = Session::new(api).with_source(Arc::new(auth));
/// session.login().await?;
/// let me = session.current_user().await?;
/// println!("hello {}", me.email);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    api: ApiClient,
    source: Option<Arc<dyn CredentialSource>>,
}

impl Session {
    pub fn new(api: ApiClient) -> Self {
        Self { api, source: None }
    }

    pub fn with_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &TokenStore {
        self.api.tokens()
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.tokens().is_authenticated()?)
    }

    /// Obtain a credential and persist it.
    pub async fn login(&self) -> Result<Credential> {
        let source = self.source.as_ref().ok_or_else(|| {
            PopauthError::Configuration("no credential source configured".to_string())
        })?;
        let credential = source.obtain().await?;
        self.tokens().save_credential(&credential)?;
        tracing::info!("signed in");
        Ok(credential)
    }

    /// Store a credential obtained elsewhere.
    pub fn import(&self, credential: &Credential) -> Result<()> {
        self.tokens().save_credential(credential)?;
        Ok(())
    }

    /// Revoke the refresh token server-side (best effort) and forget both tokens.
    pub async fn logout(&self) -> Result<()> {
        if let Some(refresh) = self.tokens().refresh_token()?.filter(|rt| !rt.is_empty()) {
            let options = RequestOptions::post()
                .json(serde_json::json!({ "refresh_token": refresh }));
            if let Err(err) = self.api.request("/auth/logout", options).await {
                tracing::warn!(error = %err, "server-side logout failed; clearing local tokens anyway");
            }
        }
        self.tokens().clear()?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Profile of the signed-in user.
    pub async fn current_user(&self) -> Result<User> {
        if !self.tokens().is_authenticated()? {
            return Err(PopauthError::NotAuthenticated);
        }
        Ok(self.api.request_json("/me", RequestOptions::get()).await?)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api", &self.api)
            .field("source", &self.source.as_ref().map(|_| ".."))
            .finish()
    }
}

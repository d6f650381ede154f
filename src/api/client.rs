use std::sync::OnceLock;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::ApiError;
use super::request::{ApiBody, RequestOptions};
use crate::auth::store::TokenStore;
use crate::config::{api_base, normalize_origin};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// HTTP client that attaches the stored access token to every request.
///
/// # Example
/// ```no_run
/// use popauth::api::{ApiBody, ApiClient, RequestOptions};
/// use popauth::auth::TokenStore;
///
/// # async fn example() -> Result<(), popauth::api::ApiError> {
/// let api = ApiClient::new("https://api.example.com", TokenStore::in_memory());
/// let body = api
///     .request("/x", RequestOptions::post().json(serde_json::json!({ "a": 1 })))
///     .await?;
/// if let ApiBody::Json(value) = body {
///     println!("{value}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(base: impl AsRef<str>, tokens: TokenStore) -> Self {
        Self {
            http: shared_client().clone(),
            base: normalize_origin(base.as_ref()),
            tokens,
        }
    }

    /// Client for the process-wide API origin ([`crate::config::api_base`]).
    pub fn from_global(tokens: TokenStore) -> Self {
        Self::new(api_base(), tokens)
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Issue a request against `base + path`.
    ///
    /// JSON responses are parsed; anything else comes back as text.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ApiBody, ApiError> {
        let RequestOptions {
            method,
            mut headers,
            mut body,
            json,
            query,
            timeout,
        } = options;

        // A JSON `null` means "no body", like an omitted one.
        if let Some(json) = json.filter(|value| !value.is_null()) {
            body = Some(serde_json::to_vec(&json)?);
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        // Set last: callers cannot override the stored bearer.
        let token = self.tokens.bearer()?;
        if let Some(token) = token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ApiError::InvalidRequest("stored access token is not a valid header value".into())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        tracing::debug!(method = %method, path, authenticated = token.is_some(), "api request");

        let mut builder = self.http.request(method, self.url(path)).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status_text(status)
            } else {
                text
            };
            tracing::debug!(status = status.as_u16(), path, "api request failed");
            return Err(ApiError::http(status.as_u16(), message));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let text = response.text().await?;
        if !is_json {
            return Ok(ApiBody::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(ApiBody::Json(serde_json::Value::Null));
        }
        Ok(ApiBody::Json(serde_json::from_str(&text)?))
    }

    /// Issue a request and deserialize the JSON body into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let value = match self.request(path, options).await? {
            ApiBody::Json(value) => value,
            // Servers that forget the content type still send JSON text.
            ApiBody::Text(text) => serde_json::from_str(&text)?,
        };
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get(&self, path: &str) -> Result<ApiBody, ApiError> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiBody, ApiError> {
        let json = serde_json::to_value(body)?;
        self.request(path, RequestOptions::post().json(json)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiBody, ApiError> {
        self.request(path, RequestOptions::delete()).await
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}

//! Configuration system (layered: code > env > defaults).

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bon::Builder;
use reqwest::Url;

use crate::auth::handshake::{Correlation, PopupAuthConfig};
use crate::auth::store::{FileStore, FileStoreConfig, TokenStore};
use crate::error::PopauthError;

/// API origin used when nothing else applies.
pub const PRODUCTION_API_BASE: &str = "https://api.rupnil.codes";

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<PopauthConfig> = OnceLock::new();
static API_BASE: OnceLock<String> = OnceLock::new();

/// Settings for the auth bridge.
///
/// # Example
/// ```
/// use popauth::config::PopauthConfig;
///
/// let config = PopauthConfig::builder()
///     .page_origin("http://localhost:5173".to_string())
///     .build();
/// assert_eq!(config.api_base(), "http://localhost:5173");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct PopauthConfig {
    /// Explicit API origin; wins over everything else.
    pub api_base_override: Option<String>,
    /// Origin of the page hosting the bridge.
    pub page_origin: Option<String>,
    #[builder(default)]
    pub popup: PopupAuthConfig,
    /// Directory for the file-backed token store.
    pub store_dir: Option<PathBuf>,
}

impl Default for PopauthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PopauthConfig {
    /// Load from environment variables (and `.env` if present).
    ///
    /// `POPAUTH_API_BASE`, `POPAUTH_PAGE_ORIGIN`, `POPAUTH_PROVIDER_PATH`,
    /// `POPAUTH_CORRELATION`, `POPAUTH_TIMEOUT_SECS`, `POPAUTH_STORE_DIR`.
    pub fn from_env() -> Result<Self, PopauthError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PopauthError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut popup = PopupAuthConfig::default();
        if let Some(path) = var("POPAUTH_PROVIDER_PATH") {
            popup.provider_path = path.trim().trim_matches('/').to_string();
        }
        if let Some(mode) = var("POPAUTH_CORRELATION") {
            popup.correlation = mode.trim().parse::<Correlation>().map_err(|_| {
                PopauthError::Configuration(format!("POPAUTH_CORRELATION: unknown mode '{mode}'"))
            })?;
        }
        if let Some(secs) = var("POPAUTH_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PopauthError::Configuration(format!("POPAUTH_TIMEOUT_SECS: not a number '{secs}'"))
            })?;
            popup.timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            api_base_override: var("POPAUTH_API_BASE"),
            page_origin: var("POPAUTH_PAGE_ORIGIN"),
            popup,
            store_dir: var("POPAUTH_STORE_DIR").map(PathBuf::from),
        })
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static PopauthConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring invalid environment configuration");
                Self::default()
            })
        })
    }

    /// Make `self` the process-wide config and return it.
    ///
    /// Has no effect once [`PopauthConfig::global`] (or [`api_base`]) has
    /// already been initialized; the returned reference is what is in force.
    pub fn install(self) -> &'static PopauthConfig {
        if DEFAULT_CONFIG.set(self).is_err() {
            tracing::debug!("global config already initialized; keeping it");
        }
        Self::global()
    }

    /// API origin this config resolves to.
    pub fn api_base(&self) -> String {
        resolve_api_base(
            self.api_base_override.as_deref(),
            self.page_origin.as_deref(),
        )
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(FileStoreConfig::default_dir)
    }

    /// Origin whose storage holds the tokens: the page if known, else the API.
    pub fn storage_origin(&self) -> String {
        self.page_origin
            .as_deref()
            .map(normalize_origin)
            .filter(|origin| !origin.is_empty())
            .unwrap_or_else(|| self.api_base())
    }

    /// File-backed token store for this config.
    pub fn file_token_store(&self) -> TokenStore {
        let store = FileStore::new(FileStoreConfig::new(
            self.store_dir(),
            self.storage_origin(),
        ));
        TokenStore::new(Arc::new(store))
    }
}

/// Process-wide API origin, resolved once from [`PopauthConfig::global`].
pub fn api_base() -> &'static str {
    API_BASE.get_or_init(|| PopauthConfig::global().api_base())
}

/// Strip surrounding whitespace and trailing slashes.
pub fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

/// Pick the API origin: explicit override, else the page origin when it is
/// served from a loopback host, else production.
pub fn resolve_api_base(explicit: Option<&str>, page_origin: Option<&str>) -> String {
    if let Some(explicit) = explicit.map(normalize_origin).filter(|o| !o.is_empty()) {
        return explicit;
    }
    if let Some(page) = page_origin.and_then(|origin| Url::parse(origin.trim()).ok()) {
        if is_loopback(&page) {
            return page.origin().ascii_serialization();
        }
    }
    PRODUCTION_API_BASE.to_string()
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::token::Credential;

/// Storage key for the access token.
pub const ACCESS_KEY: &str = "rp_jwt";
/// Storage key for the refresh token.
pub const REFRESH_KEY: &str = "rp_rt";

/// Durable per-origin string key-value storage.
///
/// `set_many`/`remove_many` must apply all entries or none from a reader's
/// point of view; the default implementations are only as atomic as the
/// single-key operations they loop over.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Holder for the access/refresh token pair.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use popauth::auth::{MemoryStore, TokenStore};
///
/// let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
/// tokens.save("A", "B")?;
/// assert_eq!(tokens.access_token()?.as_deref(), Some("A"));
/// tokens.clear()?;
/// assert!(tokens.refresh_token()?.is_none());
/// # Ok::<(), popauth::auth::StoreError>(())
/// ```
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Tab-lifetime store, nothing persisted.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn save(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        self.backend
            .set_many(&[(ACCESS_KEY, access), (REFRESH_KEY, refresh)])?;
        tracing::debug!("tokens saved");
        Ok(())
    }

    pub fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.save(&credential.access_token, &credential.refresh_token)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&[ACCESS_KEY, REFRESH_KEY])?;
        tracing::debug!("tokens cleared");
        Ok(())
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.backend.get(ACCESS_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.backend.get(REFRESH_KEY)
    }

    /// Access token, with an empty value treated as absent.
    pub fn bearer(&self) -> Result<Option<String>, StoreError> {
        Ok(self.access_token()?.filter(|token| !token.is_empty()))
    }

    pub fn is_authenticated(&self) -> Result<bool, StoreError> {
        Ok(self.bearer()?.is_some())
    }
}

/// In-memory store; lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut guard = self.entries();
        for (key, value) in entries {
            guard.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut guard = self.entries();
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}

/// Configuration for file-backed storage.
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub base_dir: PathBuf,
    pub origin: String,
}

impl FileStoreConfig {
    pub fn new(base_dir: PathBuf, origin: impl Into<String>) -> Self {
        Self {
            base_dir,
            origin: origin.into(),
        }
    }

    pub fn default_dir() -> PathBuf {
        default_popauth_dir()
    }
}

/// File-backed store: one TOML document per origin.
///
/// Every mutation rewrites the whole document through a temp file and a
/// rename, so multi-key updates land together.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    origin: String,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(config: FileStoreConfig) -> Self {
        let name = format!("{}.toml", normalize_label(&config.origin));
        Self {
            path: config.base_dir.join(name),
            origin: config.origin,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new())
            }
            Err(err) => return Err(err.into()),
        };
        let file: StoreFile = toml::from_str(&raw)?;
        Ok(file.entries)
    }

    fn write(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            };
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = StoreFile {
            version: 1,
            origin: self.origin.clone(),
            entries,
            saved_at: Utc::now(),
        };
        let serialized = toml::to_string(&file)?;
        let tmp = self.path.with_extension("toml.tmp");
        // A leftover temp file would keep its old mode; start fresh.
        match fs::remove_file(&tmp) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }
        let mut out = private_file(&tmp)?;
        out.write_all(serialized.as_bytes())?;
        out.sync_all()?;
        drop(out);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read()?;
        apply(&mut entries);
        self.write(entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.remove_many(&[key])
    }

    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    origin: String,
    entries: BTreeMap<String, String>,
    saved_at: DateTime<Utc>,
}

/// Create `path` readable and writable by the owner only, from the first byte.
fn private_file(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn default_popauth_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".popauth"))
        .unwrap_or_else(|| PathBuf::from(".popauth"))
}

/// Turn an origin like `https://api.example.com:8443` into a file-name-safe label.
fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' || lower == '.' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    let out = out.trim_matches(|c| c == '-' || c == '.').to_string();
    if out.is_empty() {
        "default".to_string()
    } else {
        out
    }
}

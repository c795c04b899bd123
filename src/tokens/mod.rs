//! Token Store
//!
//! Single source of truth for the access and refresh tokens. Each token is
//! kept in two places, a cookie jar and a local key-value store, that can
//! drift apart. Reads prefer the cookie and fall back to the local store;
//! writes go to both.
//!
//! ```rust
//! use guardian_dashboard::tokens::TokenStore;
//!
//! let store = TokenStore::in_memory();
//! assert!(store.get_token().is_none());
//!
//! store.set_token("eyJhbGciOi...").unwrap();
//! assert_eq!(store.get_token().as_deref(), Some("eyJhbGciOi..."));
//! ```

mod cookie;
mod error;
mod local;

pub use cookie::{Cookie, CookieJar};
pub use error::{TokenStoreError, TokenStoreResult};
pub use local::LocalStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::config::StorageConfig;

/// Key of the bearer token in both locations
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key of the refresh token in both locations
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Cookie the server uses for its CSRF token
pub const CSRF_COOKIE: &str = "csrftoken";

/// A string key/value persistence location
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> TokenStoreResult<()>;

    fn remove(&self, key: &str) -> TokenStoreResult<()>;
}

/// Which location a token was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    LocalStore,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Cookie => write!(f, "cookie"),
            TokenSource::LocalStore => write!(f, "local store"),
        }
    }
}

/// Access/refresh token pair over a cookie jar and a local store
#[derive(Debug, Default)]
pub struct TokenStore {
    cookies: CookieJar,
    local: LocalStore,
}

impl TokenStore {
    pub fn new(cookies: CookieJar, local: LocalStore) -> Self {
        Self { cookies, local }
    }

    /// Store with nothing persisted to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the file-backed cookie jar and local store
    pub fn open(config: &StorageConfig) -> TokenStoreResult<Self> {
        let cookies = CookieJar::open(config.cookie_path())?;
        let local = LocalStore::open(config.local_path())?;
        tracing::debug!(data_dir = %config.data_path().display(), "Opened token store");
        Ok(Self::new(cookies, local))
    }

    /// Current bearer token, `None` meaning "not authenticated"
    pub fn get_token(&self) -> Option<String> {
        self.read_preferred(ACCESS_TOKEN_KEY).map(|(token, _)| token)
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.read_preferred(REFRESH_TOKEN_KEY).map(|(token, _)| token)
    }

    /// Bearer token together with the location that supplied it
    pub fn token_with_source(&self) -> Option<(String, TokenSource)> {
        self.read_preferred(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token_with_source(&self) -> Option<(String, TokenSource)> {
        self.read_preferred(REFRESH_TOKEN_KEY)
    }

    /// Write the bearer token to both locations
    pub fn set_token(&self, token: &str) -> TokenStoreResult<()> {
        self.write_both(ACCESS_TOKEN_KEY, token)
    }

    /// Write the refresh token to both locations
    pub fn set_refresh_token(&self, token: &str) -> TokenStoreResult<()> {
        self.write_both(REFRESH_TOKEN_KEY, token)
    }

    /// Forget both tokens everywhere
    pub fn clear(&self) -> TokenStoreResult<()> {
        let results = [
            self.cookies.remove(ACCESS_TOKEN_KEY),
            self.local.remove(ACCESS_TOKEN_KEY),
            self.cookies.remove(REFRESH_TOKEN_KEY),
            self.local.remove(REFRESH_TOKEN_KEY),
        ];
        results.into_iter().collect()
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.cookies.get(CSRF_COOKIE)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    fn read_preferred(&self, key: &str) -> Option<(String, TokenSource)> {
        non_empty(self.cookies.get(key))
            .map(|v| (v, TokenSource::Cookie))
            .or_else(|| non_empty(self.local.get(key)).map(|v| (v, TokenSource::LocalStore)))
    }

    // Both locations are attempted even if the first flush fails, so the
    // in-memory copies never disagree.
    fn write_both(&self, key: &str, value: &str) -> TokenStoreResult<()> {
        let cookie = self.cookies.set(key, value);
        let local = self.local.set(key, value);
        cookie.and(local)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Render a token for logs, keeping only its last four characters
pub fn mask_token(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> TokenStoreResult<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> TokenStoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

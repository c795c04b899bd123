//! Cookie jar
//!
//! Holds the cookies the dashboard server and the client itself set. The jar
//! is rendered into a `Cookie` header on every authenticated request and is
//! updated from `Set-Cookie` response headers, which is how the server's
//! `csrftoken` arrives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::error::TokenStoreResult;
use super::{read_json_file, write_json_file, KeyValueStore};

/// A single named cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Cookie scoped to the whole site with `SameSite=Lax`
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: default_cookie_path(),
            same_site: Some("Lax".to_string()),
        }
    }

    /// Parse a `Set-Cookie` header value.
    ///
    /// Returns the cookie and whether the server asked for it to be dropped
    /// (`Max-Age=0`). Attributes other than `Path`, `SameSite` and `Max-Age`
    /// are ignored.
    pub fn parse_set_cookie(header: &str) -> Option<(Cookie, bool)> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            path: default_cookie_path(),
            same_site: None,
        };
        let mut expired = false;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };

            if key.eq_ignore_ascii_case("path") && !val.is_empty() {
                cookie.path = val.to_string();
            } else if key.eq_ignore_ascii_case("samesite") {
                cookie.same_site = Some(val.to_string());
            } else if key.eq_ignore_ascii_case("max-age") {
                expired = val.parse::<i64>().map(|age| age <= 0).unwrap_or(false);
            }
        }

        Some((cookie, expired))
    }

    /// Path-match as browsers do: `/dashboard` covers `/dashboard/x` but not `/dashboards`
    pub fn matches_path(&self, request_path: &str) -> bool {
        let scope = self.path.as_str();
        match request_path.strip_prefix(scope) {
            Some(rest) => scope.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; path={}", self.name, self.value, self.path)?;
        if let Some(same_site) = &self.same_site {
            write!(f, "; SameSite={}", same_site)?;
        }
        Ok(())
    }
}

/// Collection of cookies keyed by name, optionally backed by a file
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, Cookie>>,
    path: Option<PathBuf>,
}

impl CookieJar {
    /// Jar that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed jar, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> TokenStoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cookies: Vec<Cookie> = read_json_file(&path)?.unwrap_or_default();

        Ok(Self {
            cookies: RwLock::new(cookies.into_iter().map(|c| (c.name.clone(), c)).collect()),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Full cookie record, attributes included
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Insert or replace a cookie
    pub fn insert(&self, cookie: Cookie) -> TokenStoreResult<()> {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(cookie = %cookie.name, "Setting cookie");
        cookies.insert(cookie.name.clone(), cookie);
        self.flush(&cookies)
    }

    /// Apply a `Set-Cookie` header received from the server
    pub fn absorb_set_cookie(&self, header: &str) -> TokenStoreResult<()> {
        match Cookie::parse_set_cookie(header) {
            Some((cookie, true)) => self.remove(&cookie.name),
            Some((cookie, false)) => self.insert(cookie),
            None => {
                tracing::debug!("Ignoring malformed Set-Cookie header");
                Ok(())
            }
        }
    }

    /// Render the cookies scoped to `request_path` as a `Cookie` header value
    pub fn header_value(&self, request_path: &str) -> Option<String> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let pairs: Vec<_> = cookies
            .values()
            .filter(|c| c.matches_path(request_path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn flush(&self, cookies: &BTreeMap<String, Cookie>) -> TokenStoreResult<()> {
        match &self.path {
            Some(path) => write_json_file(path, &cookies.values().collect::<Vec<_>>()),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for CookieJar {
    fn get(&self, key: &str) -> Option<String> {
        self.cookie(key).map(|c| c.value)
    }

    fn set(&self, key: &str, value: &str) -> TokenStoreResult<()> {
        self.insert(Cookie::new(key, value))
    }

    fn remove(&self, key: &str) -> TokenStoreResult<()> {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        if cookies.remove(key).is_some() {
            self.flush(&cookies)?;
        }
        Ok(())
    }
}

//! Redirect boundary
//!
//! Where the client sends the user once a session cannot be recovered. In
//! the browser this was a page navigation; here it is a seam the host
//! implements.

use std::sync::{PoisonError, RwLock};

/// Receives navigation requests from the client
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

/// Records the last requested location and logs it
#[derive(Debug, Default)]
pub struct LoginRedirect {
    location: RwLock<Option<String>>,
    count: RwLock<usize>,
}

impl LoginRedirect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last location navigated to, if any
    pub fn location(&self) -> Option<String> {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many redirects have been requested
    pub fn count(&self) -> usize {
        *self.count.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for LoginRedirect {
    fn navigate(&self, location: &str) {
        tracing::warn!(location, "Session ended, redirecting to login");
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = Some(location.to_string());
        *self.count.write().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

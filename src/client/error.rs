//! Client error types

use thiserror::Error;

/// Errors surfaced by the authenticated client
#[derive(Error, Debug)]
pub enum ClientError {
    /// No access token available; no request was sent
    #[error("Not authenticated")]
    Unauthenticated,

    /// The server still answered 401 after the one refresh-and-retry
    #[error("Authorization expired")]
    AuthorizationExpired,

    /// The refresh endpoint rejected the refresh token or answered garbage
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Network-level failure talking to the server
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("Malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// Non-success status where a decoded body was expected
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Tokens were received but could not be persisted
    #[error("Token storage error: {0}")]
    Storage(#[from] crate::tokens::TokenStoreError),
}

impl ClientError {
    /// Network or parse failure, as opposed to an auth or API outcome
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::MalformedBody(_))
    }

    /// Failures that end the session and send the user to the login page
    pub fn is_terminal_auth(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthenticated
                | ClientError::AuthorizationExpired
                | ClientError::RefreshFailed(_)
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

//! Token refresh and login
//!
//! Both talk to the token endpoints without a bearer token and write what
//! they receive into the token store.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{absorb_set_cookies, AuthClient, ClientError, ClientResult};
use crate::tokens::mask_token;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
    /// Present when the server rotates refresh tokens
    refresh: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Body of a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

impl AuthClient {
    /// Exchange the stored refresh token for a new access token.
    ///
    /// Every failure is reported as [`ClientError::RefreshFailed`]; callers
    /// treat it as the end of the session.
    pub async fn refresh(&self) -> ClientResult<()> {
        self.refresh_access_token().await.map(|_| ())
    }

    pub(super) async fn refresh_access_token(&self) -> ClientResult<String> {
        let Some(refresh_token) = self.tokens.get_refresh_token() else {
            return Err(ClientError::RefreshFailed("no refresh token stored".into()));
        };

        let url = self.url(&self.config.refresh_path)?;
        tracing::debug!(%url, refresh = %mask_token(&refresh_token), "Refreshing access token");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::RefreshFailed(format!(
                "refresh endpoint returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;
        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::RefreshFailed(format!("malformed body: {}", e)))?;

        let access = parsed
            .access
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ClientError::RefreshFailed("response has no access token".into()))?;

        // The in-memory copy is already updated when a flush fails, so the
        // session carries on with the new token.
        if let Err(e) = self.tokens.set_token(&access) {
            tracing::warn!("Failed to persist refreshed access token: {}", e);
        }
        if let Some(rotated) = parsed.refresh.filter(|r| !r.is_empty()) {
            if let Err(e) = self.tokens.set_refresh_token(&rotated) {
                tracing::warn!("Failed to persist rotated refresh token: {}", e);
            }
        }

        tracing::info!(token = %mask_token(&access), "Access token refreshed");
        Ok(access)
    }

    /// Obtain a fresh token pair with username and password
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<LoginResponse> {
        let url = self.url(&self.config.token_path)?;

        let response = self
            .http
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        absorb_set_cookies(&self.tokens, response.headers());

        let login: LoginResponse = super::decode_json(response).await?;

        self.tokens.set_token(&login.access)?;
        self.tokens.set_refresh_token(&login.refresh)?;

        tracing::info!(username, "Logged in");
        Ok(login)
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::{self, MockBackend, RefreshBehavior, FRESH_ACCESS, GOOD_REFRESH};
    use super::super::{LoginRedirect, RequestOptions};
    use super::*;
    use crate::config::ApiConfig;
    use crate::tokens::TokenStore;
    use std::sync::Arc;

    async fn setup(behavior: RefreshBehavior, refresh: Option<&str>) -> (AuthClient, Arc<MockBackend>) {
        let backend = MockBackend::new("valid", behavior);
        let base = mock::spawn(backend.clone()).await;

        let tokens = TokenStore::in_memory();
        tokens.set_token("expired").unwrap();
        if let Some(refresh) = refresh {
            tokens.set_refresh_token(refresh).unwrap();
        }

        let client = AuthClient::new(
            ApiConfig::with_base_url(base),
            Arc::new(tokens),
            Arc::new(LoginRedirect::new()),
        )
        .unwrap();
        (client, backend)
    }

    #[tokio::test]
    async fn test_refresh_updates_store() {
        let (client, backend) = setup(RefreshBehavior::Rotate, Some(GOOD_REFRESH)).await;

        client.refresh().await.unwrap();

        assert_eq!(client.tokens().get_token().as_deref(), Some(FRESH_ACCESS));
        assert_eq!(backend.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_no_refresh_token_fails_without_network() {
        let (client, backend) = setup(RefreshBehavior::Rotate, None).await;

        let err = client.refresh().await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert_eq!(backend.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_token() {
        let (client, _) = setup(RefreshBehavior::Rotate, Some("revoked")).await;

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert_eq!(client.tokens().get_token().as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_malformed_and_incomplete_bodies_fail() {
        for behavior in [RefreshBehavior::Malformed, RefreshBehavior::MissingAccess] {
            let (client, _) = setup(behavior, Some(GOOD_REFRESH)).await;

            let err = client.refresh().await.unwrap_err();
            assert!(matches!(err, ClientError::RefreshFailed(_)), "{:?}", behavior);
            assert_eq!(client.tokens().get_token().as_deref(), Some("expired"));
        }
    }

    #[tokio::test]
    async fn test_login_stores_token_pair() {
        let backend = MockBackend::new("nobody", RefreshBehavior::Rotate);
        let base = mock::spawn(backend.clone()).await;
        let client = AuthClient::new(
            ApiConfig::with_base_url(base),
            Arc::new(TokenStore::in_memory()),
            Arc::new(LoginRedirect::new()),
        )
        .unwrap();

        let login = client.login("parent", "secret").await.unwrap();
        assert_eq!(login.user.unwrap()["username"], "parent");
        assert_eq!(client.tokens().get_token().as_deref(), Some("login-access"));
        assert_eq!(client.tokens().get_refresh_token().as_deref(), Some(GOOD_REFRESH));

        let response = client.request("/api/data/", RequestOptions::get()).await.unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_login_with_bad_credentials() {
        let backend = MockBackend::new("nobody", RefreshBehavior::Rotate);
        let base = mock::spawn(backend).await;
        let client = AuthClient::new(
            ApiConfig::with_base_url(base),
            Arc::new(TokenStore::in_memory()),
            Arc::new(LoginRedirect::new()),
        )
        .unwrap();

        let err = client.login("parent", "wrong").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 401, .. }));
        assert!(client.tokens().get_token().is_none());
    }
}

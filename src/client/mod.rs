//! Authenticated Request Client
//!
//! Wraps outbound calls to the dashboard API with the bearer token from the
//! [`TokenStore`]. A 401 triggers exactly one refresh cycle and, if that
//! succeeds, exactly one retry of the original request. Anything the client
//! cannot recover from sends the user to the login page through the
//! [`Navigator`].

mod error;
#[cfg(test)]
pub(crate) mod mock;
mod navigator;
mod refresh;

pub use error::{ClientError, ClientResult};
pub use navigator::{LoginRedirect, Navigator};
pub use refresh::LoginResponse;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE,
};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::tokens::{mask_token, TokenStore};

/// Header carrying the CSRF cookie value back to the server
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Description of a request that may be sent twice (original + retry)
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// HTTP client bound to one dashboard server and one token store
pub struct AuthClient {
    http: Client,
    config: ApiConfig,
    base_url: Url,
    tokens: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl AuthClient {
    pub fn new(
        config: ApiConfig,
        tokens: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            config,
            base_url,
            tokens,
            navigator,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Resolve a server-relative path (or pass through an absolute URL)
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        let resolved = if path.contains("://") {
            Url::parse(path)
        } else {
            self.base_url.join(path)
        };
        resolved.map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Send an authenticated request, refreshing and retrying once on 401
    pub async fn request(&self, path: &str, options: RequestOptions) -> ClientResult<Response> {
        let url = self.url(path)?;

        let Some(token) = self.tokens.get_token() else {
            tracing::warn!(%url, "No access token available");
            self.redirect_to_login();
            return Err(ClientError::Unauthenticated);
        };

        let response = self.send(&url, &options, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!(%url, token = %mask_token(&token), "Access token rejected, attempting refresh");

        // The refresh is complete, new token persisted, before the retry goes out
        let token = match self.refresh_access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.redirect_to_login();
                return Err(e);
            }
        };

        let retried = self.send(&url, &options, &token).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(%url, "Request still unauthorized after refresh");
            self.redirect_to_login();
            return Err(ClientError::AuthorizationExpired);
        }

        Ok(retried)
    }

    /// Authenticated GET decoded as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.request(path, RequestOptions::get()).await?;
        decode_json(response).await
    }

    /// Hand the user over to the login page
    pub fn redirect_to_login(&self) {
        self.navigator.navigate(&self.config.login_path);
    }

    async fn send(&self, url: &Url, options: &RequestOptions, token: &str) -> ClientResult<Response> {
        let headers = self.merged_headers(url, &options.headers, token)?;

        let mut request = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        tracing::debug!(method = %options.method, %url, "Sending request");
        let response = request.send().await?;
        tracing::debug!(status = %response.status(), %url, "Received response");

        self.absorb_cookies(&response);
        Ok(response)
    }

    fn merged_headers(&self, url: &Url, caller: &HeaderMap, token: &str) -> ClientResult<HeaderMap> {
        let mut headers = caller.clone();

        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(CSRF_HEADER),
            header_value(&self.tokens.csrf_token().unwrap_or_default())?,
        );
        // The jar belongs to the dashboard server only
        if url.origin() == self.base_url.origin() {
            if let Some(cookies) = self.tokens.cookies().header_value(url.path()) {
                headers.insert(COOKIE, header_value(&cookies)?);
            }
        }

        Ok(headers)
    }

    fn absorb_cookies(&self, response: &Response) {
        absorb_set_cookies(&self.tokens, response.headers());
    }
}

pub(crate) fn absorb_set_cookies(tokens: &TokenStore, headers: &HeaderMap) {
    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        if let Err(e) = tokens.cookies().absorb_set_cookie(value) {
            tracing::warn!("Failed to persist cookie from server: {}", e);
        }
    }
}

fn header_value(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader(e.to_string()))
}

/// Check the status and decode the body as JSON
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            message: body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

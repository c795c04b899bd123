//! Where the poller gets its updates from

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::client::{AuthClient, ClientResult};
use crate::config::PollerConfig;

/// Something that can be asked for the latest update payload
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_update(&self) -> ClientResult<Value>;
}

/// The dashboard's events endpoint, fetched through the authenticated client
pub struct EventsEndpoint {
    client: Arc<AuthClient>,
    token_in_query: bool,
}

impl EventsEndpoint {
    pub fn new(client: Arc<AuthClient>, config: &PollerConfig) -> Self {
        Self {
            client,
            token_in_query: config.token_in_query,
        }
    }

    /// Events path, with the access token appended when configured
    fn path(&self) -> String {
        let base = &self.client.config().events_path;

        match self.client.tokens().get_token() {
            Some(token) if self.token_in_query => {
                let separator = if base.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", base, separator, urlencoding::encode(&token))
            }
            _ => base.clone(),
        }
    }
}

#[async_trait]
impl UpdateSource for EventsEndpoint {
    async fn fetch_update(&self) -> ClientResult<Value> {
        self.client.get_json(&self.path()).await
    }
}

//! Event Poller
//!
//! Fetches the dashboard's update endpoint on a fixed cadence: a short
//! interval after a successful poll, a longer one after any failure. The
//! poller only starts if a token is present when it is first asked to
//! start, and then runs until its host stops it or the session ends: the
//! access token disappears, or a poll fails in a way that sends the user
//! back to the login page.

mod source;

pub use source::{EventsEndpoint, UpdateSource};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::client::ClientResult;
use crate::config::PollerConfig;
use crate::tokens::TokenStore;

/// Lifecycle of the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollerState {
    Idle,
    Polling,
}

/// A payload received from the update endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EventUpdate {
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Counters describing the poll loop so far
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStats {
    pub polls: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_poll: Option<DateTime<Utc>>,
}

/// Reasons the poller refuses to start
#[derive(Error, Debug)]
pub enum PollerError {
    #[error("No access token at startup, event polling disabled")]
    NotAuthenticated,

    #[error("Poller start was already attempted")]
    StartAttempted,
}

/// Polls an [`UpdateSource`] and fans payloads out to subscribers
pub struct EventPoller {
    source: Arc<dyn UpdateSource>,
    tokens: Arc<TokenStore>,
    config: PollerConfig,
    state: RwLock<PollerState>,
    stats: RwLock<PollerStats>,
    updates: broadcast::Sender<EventUpdate>,
    start_attempted: AtomicBool,
    shutdown: Notify,
}

impl EventPoller {
    pub fn new(source: Arc<dyn UpdateSource>, tokens: Arc<TokenStore>, config: PollerConfig) -> Self {
        let (updates, _) = broadcast::channel(config.channel_capacity.max(1));

        Self {
            source,
            tokens,
            config,
            state: RwLock::new(PollerState::Idle),
            stats: RwLock::new(PollerStats::default()),
            updates,
            start_attempted: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Receive every payload the poller fetches from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventUpdate> {
        self.updates.subscribe()
    }

    pub async fn state(&self) -> PollerState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> PollerStats {
        self.stats.read().await.clone()
    }

    /// Delay before the next poll given how this one went
    pub fn next_delay<T>(&self, outcome: &ClientResult<T>) -> Duration {
        match outcome {
            Ok(_) => self.config.interval(),
            Err(_) => self.config.backoff(),
        }
    }

    /// Start polling if a token is present right now.
    ///
    /// Only the first call decides; later calls are refused even if a token
    /// has appeared in the meantime.
    pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>, PollerError> {
        if self.start_attempted.swap(true, Ordering::SeqCst) {
            return Err(PollerError::StartAttempted);
        }

        if self.tokens.get_token().is_none() {
            tracing::info!("No access token at startup, event polling disabled");
            return Err(PollerError::NotAuthenticated);
        }

        *self.state.write().await = PollerState::Polling;
        tracing::info!(
            interval_secs = self.config.interval_secs,
            backoff_secs = self.config.backoff_secs,
            "Event polling started"
        );

        let poller = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                if *poller.state.read().await != PollerState::Polling {
                    break;
                }
                if poller.tokens.get_token().is_none() {
                    tracing::info!("Access token gone, ending event polling");
                    break;
                }

                let outcome = poller.poll_once().await;
                if let Err(e) = &outcome {
                    if e.is_terminal_auth() {
                        tracing::info!("Session ended ({}), ending event polling", e);
                        break;
                    }
                }

                let delay = poller.next_delay(&outcome);
                poller.stats.write().await.next_poll = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| Utc::now().checked_add_signed(d));

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = poller.shutdown.notified() => break,
                }
            }

            *poller.state.write().await = PollerState::Idle;
            tracing::info!("Event polling stopped");
        }))
    }

    /// Stop the poll loop; the equivalent of tearing the page down
    pub async fn stop(&self) {
        *self.state.write().await = PollerState::Idle;
        self.shutdown.notify_one();
    }

    /// Run a single poll, recording the outcome and publishing any payload
    pub async fn poll_once(&self) -> ClientResult<Value> {
        let outcome = self.source.fetch_update().await;

        let mut stats = self.stats.write().await;
        stats.polls += 1;

        match &outcome {
            Ok(payload) => {
                tracing::debug!("Received update: {}", payload);
                stats.consecutive_failures = 0;
                stats.last_success = Some(Utc::now());

                // No subscribers is fine; the payload is simply dropped
                let _ = self.updates.send(EventUpdate {
                    payload: payload.clone(),
                    received_at: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    retry_in_secs = self.config.backoff_secs,
                    "Polling error: {}",
                    e
                );
                stats.failures += 1;
                stats.consecutive_failures += 1;
                stats.last_error = Some(e.to_string());
            }
        }

        outcome
    }
}

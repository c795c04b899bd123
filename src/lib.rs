//! # Guardian Dashboard
//!
//! Client-side core of the parental control dashboard: token handling,
//! authenticated API calls with refresh-and-retry, and polling for updates.
//!
//! ## Modules
//!
//! - [`tokens`]: access/refresh tokens kept in a cookie jar and a local store
//! - [`client`]: authenticated requests, refresh cycle, login redirect
//! - [`poller`]: fixed-interval polling of the update endpoint
//! - [`usage`]: per-device usage data consumed by the charts
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardian_dashboard::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let tokens = Arc::new(TokenStore::open(&config.storage)?);
//!     let redirect = Arc::new(LoginRedirect::new());
//!     let client = Arc::new(AuthClient::new(config.api.clone(), tokens.clone(), redirect)?);
//!
//!     let usage = client.usage_data("tablet-1").await?;
//!     println!("{} apps used on {}", usage.labels.len(), usage.device);
//!
//!     let source = Arc::new(EventsEndpoint::new(client.clone(), &config.poller));
//!     let poller = Arc::new(EventPoller::new(source, tokens, config.poller.clone()));
//!     let mut updates = poller.subscribe();
//!     let _handle = poller.start().await?;
//!
//!     while let Ok(update) = updates.recv().await {
//!         println!("update: {}", update.payload);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod poller;
pub mod tokens;
pub mod usage;

pub use client::{
    AuthClient, ClientError, ClientResult, LoginRedirect, LoginResponse, Navigator,
    RequestOptions,
};

pub use config::{ApiConfig, Config, ConfigError, LoggingConfig, PollerConfig, StorageConfig};

pub use poller::{
    EventPoller, EventUpdate, EventsEndpoint, PollerError, PollerState, PollerStats,
    UpdateSource,
};

pub use tokens::{Cookie, CookieJar, KeyValueStore, LocalStore, TokenSource, TokenStore, TokenStoreError};

pub use usage::{AppUsage, UsageData, UsageSummary};

//! # installreferrer: install attribution lookups against an on-device store
//!
//! This library asks the installed app store which campaign or referrer led to
//! the calling app being installed. The store exposes the lookup as a bound
//! service; the library finds the store, binds to it, issues one request and
//! decodes the reply into a typed record or error.
//!
//! ## Key Concepts
//!
//! - **`Platform`**: the capability trait a host implements to query its
//!   service directory, bind to a service and release the binding. Tests and
//!   demos use [`testing::FakePlatform`].
//!
//! - **`ReferrerConfig`**: the app's package name plus the provider list and
//!   service contract, typically loaded from a TOML file.
//!
//! - **`ReferrerClient`**: a cheap handle to a running session. `fetch` drives
//!   resolve, connect, call and decode, and hands back the terminal outcome.
//!
//! ## Quickstart Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use installreferrer::{ReferrerConfig, testing::FakePlatform};
//! use tracing::{error, info};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ReferrerConfig::load("path/to/referrer.toml")?;
//!     let platform = Arc::new(FakePlatform::new().offer("com.skt.skaf.A000Z00040", 70000));
//!
//!     let session = installreferrer::start(config, platform).await?;
//!     match session.client().fetch().await {
//!         Ok(record) => info!("installed via {}", record.install_referrer),
//!         Err(e) => error!("lookup failed: {e}"),
//!     }
//!
//!     // Releases the provider binding.
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod manager;
pub mod models;
pub mod platform;
pub mod registry;
pub mod remote;
pub mod resolver;
pub mod testing;

// Re-export public-facing components.
pub use client::ReferrerClient;
pub use config::ReferrerConfig;
pub use connection::{ConnectionEvent, ConnectionListener, ConnectionManager, ConnectionState};
pub use error::{OutcomeError, ReferrerError};
pub use manager::{Outcome, RunningSession, fetch_install_referrer, start, start_with_notifier};
pub use models::{EndpointDescriptor, PayloadValue, RawResponse, ReferrerRecord, SessionNotification};
pub use platform::{Platform, RemoteFault, ServiceHandle, ServiceMatch};
pub use registry::{ProviderCandidate, ProviderRegistry};
pub use resolver::ProviderResolver;

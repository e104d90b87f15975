//! Capability traits the host platform implements.
//!
//! The session never talks to the operating system directly. Service
//! discovery, binding and the cross-process call all go through these traits,
//! so a real binder bridge and the in-crate [`FakePlatform`](crate::testing::FakePlatform)
//! are interchangeable.

use crate::connection::ConnectionListener;
use crate::models::{EndpointDescriptor, RawResponse};
use async_trait::async_trait;
use thiserror::Error;

/// One registered service returned by a directory query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMatch {
    pub provider: String,
    pub service_name: String,
}

/// Raised by a [`ServiceHandle`] when the cross-process call itself fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RemoteFault(pub String);

/// Access to the platform's service directory and binding machinery.
pub trait Platform: Send + Sync {
    /// Lists the services `provider` registers under `service_name` that
    /// answer `action_name`. An empty list means the provider does not offer it.
    fn query_services(
        &self,
        provider: &str,
        service_name: &str,
        action_name: &str,
    ) -> Vec<ServiceMatch>;

    /// Installed version code of `provider`, if it is installed.
    fn package_version(&self, provider: &str) -> Option<i64>;

    /// Asks the platform to bind to `endpoint`.
    ///
    /// Returns whether the request was accepted. Acceptance only means the
    /// platform will try; the connection itself is reported later through
    /// `listener`, possibly from another thread.
    fn connect(&self, endpoint: &EndpointDescriptor, listener: ConnectionListener) -> bool;

    /// Releases a binding made by [`Platform::connect`].
    fn disconnect(&self, endpoint: &EndpointDescriptor);
}

/// A live proxy to the provider's referrer service.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Asks for the referrer recorded for `package_name`.
    ///
    /// `Ok(None)` means the provider replied without a payload.
    async fn get_install_referrer(
        &self,
        package_name: &str,
    ) -> Result<Option<RawResponse>, RemoteFault>;
}

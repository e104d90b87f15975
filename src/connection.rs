//! Connect/disconnect lifecycle for the resolved provider endpoint.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ReferrerError, Result};
use crate::models::EndpointDescriptor;
use crate::platform::{Platform, ServiceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Asynchronous notifications the platform delivers after a connect request.
#[derive(Clone)]
pub enum ConnectionEvent {
    Connected(Arc<dyn ServiceHandle>),
    Disconnected,
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connected(_) => f.write_str("Connected(..)"),
            ConnectionEvent::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Caller-supplied callback the platform invokes on connection changes.
///
/// It may be invoked from any thread, including from inside
/// [`Platform::connect`] itself.
#[derive(Clone)]
pub struct ConnectionListener {
    callback: Arc<dyn Fn(ConnectionEvent) + Send + Sync>,
}

impl ConnectionListener {
    pub fn new(callback: impl Fn(ConnectionEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn notify(&self, event: ConnectionEvent) {
        (self.callback)(event)
    }

    pub fn connected(&self, handle: Arc<dyn ServiceHandle>) {
        self.notify(ConnectionEvent::Connected(handle))
    }

    pub fn disconnected(&self) {
        self.notify(ConnectionEvent::Disconnected)
    }
}

impl fmt::Debug for ConnectionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionListener")
    }
}

/// Tracks one binding through `Idle -> Connecting -> Connected -> Disconnected`.
///
/// The handle only exists while the state is `Connected`; both change in the
/// same call so a disconnect can never leave a usable stale handle behind.
/// Each handle is tagged with a generation so replies from an invalidated
/// handle can be recognised and dropped. `Disconnected` is terminal.
pub struct ConnectionManager {
    state: ConnectionState,
    endpoint: Option<EndpointDescriptor>,
    handle: Option<Arc<dyn ServiceHandle>>,
    generation: u64,
    /// Set once the platform accepts a connect request, cleared by `release`.
    /// A spontaneous disconnect leaves it set: the binding still needs undoing.
    bound: bool,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            endpoint: None,
            handle: None,
            generation: 0,
            bound: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&EndpointDescriptor> {
        self.endpoint.as_ref()
    }

    /// Requests a binding to `endpoint`. Fails immediately when the platform
    /// refuses the request; otherwise the outcome arrives through `listener`.
    pub fn connect(
        &mut self,
        platform: &dyn Platform,
        endpoint: EndpointDescriptor,
        listener: ConnectionListener,
    ) -> Result<()> {
        self.transition(ConnectionState::Idle, ConnectionState::Connecting)?;
        let accepted = platform.connect(&endpoint, listener);
        if !accepted {
            warn!(provider = %endpoint.provider, "connect request refused");
            self.state = ConnectionState::Disconnected;
            return Err(ReferrerError::ConnectFailed(endpoint.provider));
        }
        debug!(provider = %endpoint.provider, "connect request accepted");
        self.endpoint = Some(endpoint);
        self.bound = true;
        Ok(())
    }

    /// Records the connection and returns the generation of the new handle.
    /// Connections delivered in any state but `Connecting` are ignored.
    pub fn on_connected(&mut self, handle: Arc<dyn ServiceHandle>) -> Option<u64> {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "ignoring late connection");
            return None;
        }
        self.state = ConnectionState::Connected;
        self.generation += 1;
        self.handle = Some(handle);
        info!(generation = self.generation, "provider connected");
        Some(self.generation)
    }

    /// Invalidates the handle. Returns whether a live binding was lost.
    pub fn on_disconnected(&mut self) -> bool {
        let was_live = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );
        self.state = ConnectionState::Disconnected;
        self.handle = None;
        if was_live {
            info!("provider disconnected");
        }
        was_live
    }

    pub fn handle(&self) -> Option<Arc<dyn ServiceHandle>> {
        self.handle.clone()
    }

    /// Whether a reply tagged with `generation` came from the live handle.
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connected && self.generation == generation
    }

    /// Explicitly releases the binding. Unbinds whenever a connect was accepted, even after the provider has
    /// already reported a disconnect.
    pub fn release(&mut self, platform: &dyn Platform) {
        self.on_disconnected();
        if !std::mem::take(&mut self.bound) {
            return;
        }
        if let Some(endpoint) = &self.endpoint {
            debug!(provider = %endpoint.provider, "releasing provider binding");
            platform.disconnect(endpoint);
        }
    }

    fn transition(&mut self, from: ConnectionState, to: ConnectionState) -> Result<()> {
        if self.state != from {
            return Err(ReferrerError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

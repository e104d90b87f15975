//! An in-memory [`Platform`] for tests and demos.
//!
//! `FakePlatform` records every directory probe, connect, disconnect and
//! remote request so tests can assert on exactly what the session did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::connection::ConnectionListener;
use crate::models::{EndpointDescriptor, RawResponse};
use crate::platform::{Platform, RemoteFault, ServiceHandle, ServiceMatch};

/// How the fake provider answers a referrer request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Respond(Option<RawResponse>),
    Fault(String),
    /// Never answers.
    Hang,
    Delay(Duration, Option<RawResponse>),
}

#[derive(Default)]
struct Recorded {
    probes: Mutex<Vec<String>>,
    requests: Mutex<Vec<String>>,
    listener: Mutex<Option<ConnectionListener>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    in_flight: AtomicUsize,
    request_started: Notify,
}

/// Counts a request as in flight until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FakePlatform {
    offered: HashMap<String, Option<i64>>,
    accept: bool,
    auto_connect: bool,
    reply: FakeReply,
    recorded: Arc<Recorded>,
}

impl FakePlatform {
    /// A platform where no provider is installed, connects are accepted and
    /// the provider answers with an empty payload.
    pub fn new() -> Self {
        Self {
            offered: HashMap::new(),
            accept: true,
            auto_connect: true,
            reply: FakeReply::Respond(Some(RawResponse::new())),
            recorded: Arc::new(Recorded::default()),
        }
    }

    /// Installs `provider` at `version` and makes it offer the endpoint.
    pub fn offer(mut self, provider: impl Into<String>, version: i64) -> Self {
        self.offered.insert(provider.into(), Some(version));
        self
    }

    /// Makes `provider` offer the endpoint without reporting a version code.
    pub fn offer_unversioned(mut self, provider: impl Into<String>) -> Self {
        self.offered.insert(provider.into(), None);
        self
    }

    pub fn reply(mut self, reply: FakeReply) -> Self {
        self.reply = reply;
        self
    }

    pub fn refuse_connections(mut self) -> Self {
        self.accept = false;
        self
    }

    /// Accept connects but leave delivering the connection to the test.
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    pub fn handle(&self) -> Arc<dyn ServiceHandle> {
        Arc::new(FakeHandle {
            reply: self.reply.clone(),
            recorded: Arc::clone(&self.recorded),
        })
    }

    /// Delivers a connection to the most recent listener.
    pub fn fire_connected(&self) -> bool {
        let listener = lock(&self.recorded.listener).clone();
        match listener {
            Some(l) => {
                l.connected(self.handle());
                true
            }
            None => false,
        }
    }

    /// Simulates the provider process dying.
    pub fn fire_disconnected(&self) -> bool {
        let listener = lock(&self.recorded.listener).clone();
        match listener {
            Some(l) => {
                l.disconnected();
                true
            }
            None => false,
        }
    }

    /// Resolves once a referrer request has reached the provider.
    pub async fn wait_for_request(&self) {
        self.recorded.request_started.notified().await
    }

    pub fn probes(&self) -> Vec<String> {
        lock(&self.recorded.probes).clone()
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.recorded.requests).clone()
    }

    pub fn connect_count(&self) -> usize {
        self.recorded.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.recorded.disconnects.load(Ordering::SeqCst)
    }

    /// Requests that have reached the provider and not yet finished.
    pub fn in_flight_requests(&self) -> usize {
        self.recorded.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for FakePlatform {
    fn query_services(
        &self,
        provider: &str,
        service_name: &str,
        _action_name: &str,
    ) -> Vec<ServiceMatch> {
        lock(&self.recorded.probes).push(provider.to_string());
        if self.offered.contains_key(provider) {
            vec![ServiceMatch {
                provider: provider.to_string(),
                service_name: service_name.to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    fn package_version(&self, provider: &str) -> Option<i64> {
        self.offered.get(provider).copied().flatten()
    }

    fn connect(&self, _endpoint: &EndpointDescriptor, listener: ConnectionListener) -> bool {
        self.recorded.connects.fetch_add(1, Ordering::SeqCst);
        if !self.accept {
            return false;
        }
        *lock(&self.recorded.listener) = Some(listener.clone());
        if self.auto_connect {
            listener.connected(self.handle());
        }
        true
    }

    fn disconnect(&self, _endpoint: &EndpointDescriptor) {
        self.recorded.disconnects.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded.listener).take();
    }
}

struct FakeHandle {
    reply: FakeReply,
    recorded: Arc<Recorded>,
}

#[async_trait]
impl ServiceHandle for FakeHandle {
    async fn get_install_referrer(
        &self,
        package_name: &str,
    ) -> Result<Option<RawResponse>, RemoteFault> {
        lock(&self.recorded.requests).push(package_name.to_string());
        let _in_flight = InFlight::enter(&self.recorded.in_flight);
        self.recorded.request_started.notify_one();
        match &self.reply {
            FakeReply::Respond(reply) => Ok(reply.clone()),
            FakeReply::Fault(msg) => Err(RemoteFault(msg.clone())),
            FakeReply::Hang => std::future::pending().await,
            FakeReply::Delay(delay, reply) => {
                tokio::time::sleep(*delay).await;
                Ok(reply.clone())
            }
        }
    }
}

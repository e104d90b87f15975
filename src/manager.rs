use crate::client::ReferrerClient;
use crate::config::ReferrerConfig;
use crate::connection::{ConnectionEvent, ConnectionListener, ConnectionManager, ConnectionState};
use crate::decoder;
use crate::error::ReferrerError;
use crate::models::{RawResponse, ReferrerRecord, SessionNotification};
use crate::platform::{Platform, ServiceHandle};
use crate::remote::request_referrer;
use crate::resolver::ProviderResolver;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Terminal result of a lookup.
pub type Outcome = std::result::Result<ReferrerRecord, ReferrerError>;

/// Messages handled by the session actor.
pub enum SessionMessage {
    Fetch {
        reply: RpcReplyPort<Outcome>,
    },
    Connection(ConnectionEvent),
    CallFinished {
        generation: u64,
        result: std::result::Result<Option<RawResponse>, ReferrerError>,
    },
    State {
        reply: RpcReplyPort<ConnectionState>,
    },
    LastOutcome {
        reply: RpcReplyPort<Option<Outcome>>,
    },
}

/// Owns the whole lookup: resolver, connection and the cached outcome.
///
/// All state changes, including connection events delivered from platform
/// threads, are serialised through the mailbox.
pub struct ReferrerSession {
    config: ReferrerConfig,
    platform: Arc<dyn Platform>,
    notifier: Option<mpsc::Sender<SessionNotification>>,
}

pub struct SessionState {
    connection: ConnectionManager,
    pending: Option<RpcReplyPort<Outcome>>,
    outcome: Option<Outcome>,
    call_task: Option<JoinHandle<()>>,
}

impl ReferrerSession {
    async fn notify(&self, note: SessionNotification) {
        if let Some(tx) = &self.notifier {
            if tx.send(note).await.is_err() {
                debug!("notification receiver closed");
            }
        }
    }

    async fn finish(&self, state: &mut SessionState, outcome: Outcome) {
        match &outcome {
            Ok(_) => info!("install referrer received"),
            Err(e) => warn!(error = %e, "referrer lookup failed"),
        }
        state.outcome = Some(outcome.clone());
        if let Some(reply) = state.pending.take() {
            if reply.send(outcome.clone()).is_err() {
                debug!("caller stopped waiting for the referrer");
            }
        }
        self.notify(SessionNotification::Completed { outcome }).await;
    }

    async fn handle_fetch(
        &self,
        myself: &ActorRef<SessionMessage>,
        reply: RpcReplyPort<Outcome>,
        state: &mut SessionState,
    ) {
        if let Some(outcome) = &state.outcome {
            let _ = reply.send(outcome.clone());
            return;
        }
        if state.pending.is_some() {
            let _ = reply.send(Err(ReferrerError::RequestInFlight));
            return;
        }
        state.pending = Some(reply);

        let resolver = ProviderResolver::from_config(&self.config);
        let endpoint = match resolver.resolve(self.platform.as_ref()) {
            Ok(endpoint) => endpoint,
            Err(e) => return self.finish(state, Err(e)).await,
        };

        let mailbox = myself.clone();
        let listener = ConnectionListener::new(move |event| {
            if mailbox
                .send_message(SessionMessage::Connection(event))
                .is_err()
            {
                debug!("session gone, dropping connection event");
            }
        });
        if let Err(e) = state
            .connection
            .connect(self.platform.as_ref(), endpoint, listener)
        {
            self.finish(state, Err(e)).await;
        }
    }

    async fn handle_connected(
        &self,
        myself: &ActorRef<SessionMessage>,
        handle: Arc<dyn ServiceHandle>,
        state: &mut SessionState,
    ) {
        let Some(generation) = state.connection.on_connected(Arc::clone(&handle)) else {
            return;
        };
        if state.pending.is_some() {
            let mailbox = myself.clone();
            let package_name = self.config.package_name.clone();
            let call_timeout = self.config.call_timeout();
            state.call_task = Some(tokio::spawn(async move {
                let result = request_referrer(handle.as_ref(), &package_name, call_timeout).await;
                if mailbox
                    .send_message(SessionMessage::CallFinished { generation, result })
                    .is_err()
                {
                    debug!("session gone, dropping referrer reply");
                }
            }));
        }
        if let Some(endpoint) = state.connection.endpoint() {
            let provider = endpoint.provider.clone();
            self.notify(SessionNotification::Connected { provider }).await;
        }
    }

    async fn handle_disconnected(&self, state: &mut SessionState) {
        if !state.connection.on_disconnected() {
            return;
        }
        if let Some(endpoint) = state.connection.endpoint() {
            let provider = endpoint.provider.clone();
            self.notify(SessionNotification::Disconnected { provider }).await;
        }
        if state.pending.is_some() {
            self.finish(state, Err(ReferrerError::ConnectionLost)).await;
        }
    }

    async fn handle_call_finished(
        &self,
        generation: u64,
        result: std::result::Result<Option<RawResponse>, ReferrerError>,
        state: &mut SessionState,
    ) {
        if !state.connection.is_current(generation) || state.pending.is_none() {
            debug!(generation, "discarding reply from an invalidated connection");
            return;
        }
        let outcome = match result {
            Ok(reply) => match decoder::decode(reply.as_ref()) {
                Some(decoded) => decoded.map_err(ReferrerError::from),
                None => Err(ReferrerError::NoResponse),
            },
            Err(e) => Err(e),
        };
        self.finish(state, outcome).await;
    }
}

#[async_trait]
impl Actor for ReferrerSession {
    type Msg = SessionMessage;
    type State = SessionState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        Ok(SessionState {
            connection: ConnectionManager::new(),
            pending: None,
            outcome: None,
            call_task: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            SessionMessage::Fetch { reply } => self.handle_fetch(&myself, reply, state).await,
            SessionMessage::Connection(ConnectionEvent::Connected(handle)) => {
                self.handle_connected(&myself, handle, state).await
            }
            SessionMessage::Connection(ConnectionEvent::Disconnected) => {
                self.handle_disconnected(state).await
            }
            SessionMessage::CallFinished { generation, result } => {
                self.handle_call_finished(generation, result, state).await
            }
            SessionMessage::State { reply } => {
                let _ = reply.send(state.connection.state());
            }
            SessionMessage::LastOutcome { reply } => {
                let _ = reply.send(state.outcome.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        if let Some(reply) = state.pending.take() {
            let _ = reply.send(Err(ReferrerError::Cancelled));
        }
        if let Some(task) = state.call_task.take() {
            task.abort();
        }
        state.connection.release(self.platform.as_ref());
        debug!("referrer session stopped");
        Ok(())
    }
}

/// A running session. Dropping it tears the session down and releases the
/// provider binding; [`RunningSession::shutdown`] does the same and waits.
pub struct RunningSession {
    client: ReferrerClient,
    handle: Option<JoinHandle<()>>,
}

impl RunningSession {
    pub fn client(&self) -> ReferrerClient {
        self.client.clone()
    }

    /// Stops the session and waits until the binding has been released.
    pub async fn shutdown(mut self) -> Result<()> {
        self.client.actor.stop(Some("shutdown".to_string()));
        if let Some(handle) = self.handle.take() {
            handle.await.context("join referrer session")?;
        }
        Ok(())
    }
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.client.actor.stop(Some("session dropped".to_string()));
        }
    }
}

/// Starts a referrer session against `platform`.
pub async fn start(config: ReferrerConfig, platform: Arc<dyn Platform>) -> Result<RunningSession> {
    spawn_session(config, platform, None).await
}

/// Like [`start`], additionally reporting lifecycle events on `notifier`.
pub async fn start_with_notifier(
    config: ReferrerConfig,
    platform: Arc<dyn Platform>,
    notifier: mpsc::Sender<SessionNotification>,
) -> Result<RunningSession> {
    spawn_session(config, platform, Some(notifier)).await
}

async fn spawn_session(
    config: ReferrerConfig,
    platform: Arc<dyn Platform>,
    notifier: Option<mpsc::Sender<SessionNotification>>,
) -> Result<RunningSession> {
    config.validate()?;
    let session = ReferrerSession {
        config,
        platform,
        notifier,
    };
    let (actor, handle) = Actor::spawn(None, session, ())
        .await
        .map_err(|e| anyhow!("spawn referrer session: {e}"))?;
    Ok(RunningSession {
        client: ReferrerClient { actor },
        handle: Some(handle),
    })
}

/// Runs one lookup from start to teardown.
///
/// The session is always shut down before returning, so the provider binding
/// never outlives the call.
pub async fn fetch_install_referrer(
    config: ReferrerConfig,
    platform: Arc<dyn Platform>,
) -> Result<Outcome> {
    let session = start(config, platform).await?;
    let outcome = session.client().fetch().await;
    session.shutdown().await?;
    Ok(outcome)
}

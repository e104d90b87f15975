use crate::connection::ConnectionState;
use crate::error::ReferrerError;
use crate::manager::{Outcome, SessionMessage};

use ractor::{ActorRef, RpcReplyPort, rpc::CallResult};

/// Handle for talking to a running referrer session.
///
/// Cheap to clone; every clone addresses the same session, which performs at
/// most one remote lookup in its lifetime.
#[derive(Clone)]
pub struct ReferrerClient {
    pub(crate) actor: ActorRef<SessionMessage>,
}

impl ReferrerClient {
    async fn call_actor<TResponse>(
        &self,
        msg_builder: impl FnOnce(RpcReplyPort<TResponse>) -> SessionMessage,
    ) -> Result<TResponse, ReferrerError>
    where
        TResponse: Send + 'static,
    {
        match self.actor.call(msg_builder, None).await {
            Ok(CallResult::Success(r)) => Ok(r),
            // The reply port is only dropped unanswered when the session stops.
            Ok(CallResult::SenderError) => Err(ReferrerError::Cancelled),
            Ok(CallResult::Timeout) => Err(ReferrerError::Session("call timed out".into())),
            Err(e) => Err(ReferrerError::Session(e.to_string())),
        }
    }

    /// Resolves a provider, connects, asks for the referrer and decodes the
    /// reply.
    ///
    /// The first call drives the exchange; later calls return the same
    /// outcome without contacting the provider again. A call made while the
    /// first is still waiting fails with [`ReferrerError::RequestInFlight`].
    pub async fn fetch(&self) -> Outcome {
        self.call_actor(|reply| SessionMessage::Fetch { reply })
            .await
            .and_then(|outcome| outcome)
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, ReferrerError> {
        self.call_actor(|reply| SessionMessage::State { reply }).await
    }

    /// The outcome of the lookup, if it has finished.
    pub async fn last_outcome(&self) -> Result<Option<Outcome>, ReferrerError> {
        self.call_actor(|reply| SessionMessage::LastOutcome { reply })
            .await
    }
}

impl std::fmt::Debug for ReferrerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferrerClient")
            .field("actor", &self.actor.get_id())
            .finish()
    }
}

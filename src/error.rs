//! Error types for referrer lookups.

use crate::connection::ConnectionState;
use thiserror::Error;

/// A failure reported by the provider through the reply's result code.
///
/// Every variant carries the provider's description, or the canonical name of
/// the code when the reply did not include one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutcomeError {
    /// The provider could not read its referrer store.
    #[error("referrer store access failed: {0}")]
    DbAccessFailure(String),

    /// No referrer is recorded for the requesting package.
    #[error("referrer not found: {0}")]
    ReferrerNotFound(String),

    /// The requesting package is not allowed to query referrers.
    #[error("package not allowed: {0}")]
    NotAllowed(String),

    /// The provider rejected the package identifier.
    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    /// Any result code outside the known table.
    #[error("unknown result: {description}")]
    Unknown { code: i64, description: String },
}

impl OutcomeError {
    /// The result code this outcome was decoded from.
    pub fn code(&self) -> i64 {
        match self {
            OutcomeError::DbAccessFailure(_) => -1,
            OutcomeError::ReferrerNotFound(_) => -2,
            OutcomeError::NotAllowed(_) => -3,
            OutcomeError::InvalidPackageName(_) => -4,
            OutcomeError::Unknown { code, .. } => *code,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            OutcomeError::DbAccessFailure(d)
            | OutcomeError::ReferrerNotFound(d)
            | OutcomeError::NotAllowed(d)
            | OutcomeError::InvalidPackageName(d)
            | OutcomeError::Unknown { description: d, .. } => d,
        }
    }
}

/// Errors surfaced by a referrer session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferrerError {
    /// None of the candidate providers offers the referrer endpoint.
    #[error("no provider offers the referrer service ({probed} probed)")]
    NoProviderFound { probed: usize },

    /// The matching provider is missing a version code or is too old.
    #[error("provider {provider} is incompatible (version {version:?}, need {required})")]
    IncompatibleProvider {
        provider: String,
        version: Option<i64>,
        required: i64,
    },

    /// The platform refused the connect request.
    #[error("connect request to {0} was refused")]
    ConnectFailed(String),

    /// The provider went away before the reply arrived.
    #[error("connection lost before the reply arrived")]
    ConnectionLost,

    /// The remote call itself failed.
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// The remote call did not complete within the configured timeout.
    #[error("remote call timed out after {0} ms")]
    Timeout(u64),

    /// The provider answered without a payload.
    #[error("provider returned no payload")]
    NoResponse,

    /// A lookup is already waiting for its reply.
    #[error("a referrer request is already in flight")]
    RequestInFlight,

    /// The session was torn down while the lookup was pending.
    #[error("session closed before the lookup finished")]
    Cancelled,

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The session actor could not be reached.
    #[error("session unavailable: {0}")]
    Session(String),

    /// The provider answered with a failure result code.
    #[error(transparent)]
    Outcome(#[from] OutcomeError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReferrerError>;

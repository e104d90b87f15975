use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ReferrerError;

/// The resolved referrer endpoint: which provider hosts it, under which
/// service name and bind action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub provider: String,
    pub service_name: String,
    pub action_name: String,
}

/// A single value in a provider reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Int(i64),
    Str(String),
}

impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        PayloadValue::Int(v)
    }
}

impl From<i32> for PayloadValue {
    fn from(v: i32) -> Self {
        PayloadValue::Int(v.into())
    }
}

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        PayloadValue::Str(v.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        PayloadValue::Str(v)
    }
}

/// The untyped key-value payload a provider returns.
///
/// Typed reads treat a key holding the wrong kind of value as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawResponse {
    entries: HashMap<String, PayloadValue>,
}

impl RawResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style `insert`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(PayloadValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(PayloadValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawResponse
where
    K: Into<String>,
    V: Into<PayloadValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut response = RawResponse::new();
        for (k, v) in iter {
            response.insert(k, v);
        }
        response
    }
}

/// Decoded install attribution returned on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferrerRecord {
    pub install_referrer: String,
    pub onestore_pid: String,
    /// Seconds since the epoch, or -1 when the provider did not record it.
    pub referrer_click_timestamp_seconds: i64,
    /// Seconds since the epoch, or -1 when the provider did not record it.
    pub install_begin_timestamp_seconds: i64,
}

impl ReferrerRecord {
    pub fn referrer_click_time(&self) -> Option<i64> {
        (self.referrer_click_timestamp_seconds >= 0).then_some(self.referrer_click_timestamp_seconds)
    }

    pub fn install_begin_time(&self) -> Option<i64> {
        (self.install_begin_timestamp_seconds >= 0).then_some(self.install_begin_timestamp_seconds)
    }
}

/// Events sent from a running session back to the application.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// The provider accepted the connection and the lookup was issued.
    Connected { provider: String },
    /// The provider connection went away.
    Disconnected { provider: String },
    /// The lookup reached its terminal outcome.
    Completed {
        outcome: Result<ReferrerRecord, ReferrerError>,
    },
}

//! The ordered list of apps that may host the referrer service.

use serde::{Deserialize, Serialize};

/// Store apps that ship the referrer service, highest priority first.
pub const DEFAULT_PROVIDERS: [&str; 5] = [
    "com.skt.skaf.A000Z00040",
    "com.kt.olleh.storefront",
    "com.kt.olleh.istore",
    "com.lguplus.appstore",
    "android.lgt.appstore",
];

/// Identifier of an installable app that may offer the referrer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCandidate(String);

impl ProviderCandidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority-ordered provider candidates. Duplicates keep their first position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistry {
    candidates: Vec<ProviderCandidate>,
}

impl ProviderRegistry {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut candidates: Vec<ProviderCandidate> = Vec::new();
        for id in ids {
            let candidate = ProviderCandidate::new(id);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        Self { candidates }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &ProviderCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDERS)
    }
}

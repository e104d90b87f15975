use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{io::Read, path::Path, time::Duration};

use crate::registry::{DEFAULT_PROVIDERS, ProviderRegistry};

pub const DEFAULT_SERVICE_NAME: &str =
    "com.onestore.android.external.installreferrer.GetInstallReferrerService";
pub const DEFAULT_ACTION_NAME: &str =
    "com.onestore.android.external.BIND_GET_INSTALL_REFERRER_SERVICE";
/// Oldest provider version code that serves referrer lookups.
pub const DEFAULT_MIN_PROVIDER_VERSION: i64 = 60700;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Settings for a referrer session, typically loaded from a TOML file.
///
/// Only `package_name` is required; everything else defaults to the ONE store
/// service contract.
#[derive(Deserialize, Debug, Clone)]
pub struct ReferrerConfig {
    /// Identifier of the app asking for its own referrer.
    pub package_name: String,
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_action_name")]
    pub action_name: String,
    /// `None` skips the provider version check.
    #[serde(default = "default_min_provider_version")]
    pub min_provider_version: Option<i64>,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_providers() -> Vec<String> {
    DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_action_name() -> String {
    DEFAULT_ACTION_NAME.to_string()
}

fn default_min_provider_version() -> Option<i64> {
    Some(DEFAULT_MIN_PROVIDER_VERSION)
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

impl ReferrerConfig {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            providers: default_providers(),
            service_name: default_service_name(),
            action_name: default_action_name(),
            min_provider_version: default_min_provider_version(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("read config from {:?}", path.as_ref()))?;
        let config: Self = toml::from_str(&content).context("parse referrer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut buf = String::new();
        let mut rdr = reader;
        rdr.read_to_string(&mut buf)?;
        let config: Self = toml::from_str(&buf).context("parse referrer config from reader")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.package_name.trim().is_empty() {
            bail!("package_name must not be empty");
        }
        if self.call_timeout_ms == 0 {
            bail!("call_timeout_ms must be greater than zero");
        }
        if let Some(bad) = self.providers.iter().position(|p| p.trim().is_empty()) {
            bail!("providers[{bad}] is empty");
        }
        Ok(())
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(self.providers.iter().cloned())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

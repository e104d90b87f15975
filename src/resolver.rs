use tracing::{debug, info, warn};

use crate::config::ReferrerConfig;
use crate::error::{ReferrerError, Result};
use crate::models::EndpointDescriptor;
use crate::platform::Platform;
use crate::registry::ProviderRegistry;

/// Picks the provider that will serve the lookup.
///
/// Candidates are probed in registry order and probing stops at the first one
/// whose directory query is non-empty. That candidate is then checked against
/// the minimum version; an incompatible match fails resolution instead of
/// falling through to later candidates.
#[derive(Debug, Clone)]
pub struct ProviderResolver {
    registry: ProviderRegistry,
    service_name: String,
    action_name: String,
    min_provider_version: Option<i64>,
}

impl ProviderResolver {
    pub fn new(
        registry: ProviderRegistry,
        service_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            service_name: service_name.into(),
            action_name: action_name.into(),
            min_provider_version: None,
        }
    }

    pub fn from_config(config: &ReferrerConfig) -> Self {
        Self::new(config.registry(), &config.service_name, &config.action_name)
            .with_min_version(config.min_provider_version)
    }

    pub fn with_min_version(mut self, min: Option<i64>) -> Self {
        self.min_provider_version = min;
        self
    }

    pub fn resolve(&self, platform: &dyn Platform) -> Result<EndpointDescriptor> {
        let mut probed = 0;
        for candidate in self.registry.candidates() {
            probed += 1;
            let matches =
                platform.query_services(candidate.id(), &self.service_name, &self.action_name);
            if matches.is_empty() {
                debug!(provider = %candidate, "provider does not offer the referrer service");
                continue;
            }

            self.check_version(platform, candidate.id())?;
            info!(provider = %candidate, "resolved referrer provider");
            return Ok(EndpointDescriptor {
                provider: candidate.id().to_string(),
                service_name: self.service_name.clone(),
                action_name: self.action_name.clone(),
            });
        }

        warn!(probed, "no provider offers the referrer service");
        Err(ReferrerError::NoProviderFound { probed })
    }

    fn check_version(&self, platform: &dyn Platform, provider: &str) -> Result<()> {
        let Some(required) = self.min_provider_version else {
            return Ok(());
        };
        let version = platform.package_version(provider);
        match version {
            Some(v) if v >= required => Ok(()),
            _ => {
                warn!(provider, ?version, required, "provider too old for referrer lookups");
                Err(ReferrerError::IncompatibleProvider {
                    provider: provider.to_string(),
                    version,
                    required,
                })
            }
        }
    }
}

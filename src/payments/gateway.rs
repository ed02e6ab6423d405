use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::models::{PaymentSettings, ProviderKey};
use super::providers::{build_provider, PaymentProvider};

/// key: payments-gateway -> provider registry
#[derive(Clone)]
pub struct PaymentGateway {
    enabled: bool,
    providers: BTreeMap<ProviderKey, Arc<dyn PaymentProvider>>,
}

impl PaymentGateway {
    pub fn new(enabled: bool, providers: Vec<Arc<dyn PaymentProvider>>) -> Self {
        Self {
            enabled,
            providers: providers
                .into_iter()
                .map(|provider| (provider.key(), provider))
                .collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn from_settings(settings: &PaymentSettings) -> Result<Self> {
        let mut providers: Vec<Arc<dyn PaymentProvider>> = Vec::new();
        for (key, credentials) in &settings.credentials {
            providers.push(Arc::from(build_provider(*key, credentials, settings.timeout)?));
            info!(provider = %key, "payment provider registered");
        }
        Ok(Self::new(settings.enabled, providers))
    }

    /// Payments gate provisioning only when switched on and at least one provider exists.
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.providers.is_empty()
    }

    pub fn available(&self) -> Vec<ProviderKey> {
        self.providers.keys().copied().collect()
    }

    pub fn provider(&self, key: ProviderKey) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&key).cloned()
    }
}

pub mod accounts;
pub mod api;
pub mod config;
pub mod error;
pub mod locks;
pub mod onboarding;
pub mod orchestrator;
pub mod panel;
pub mod payments;
pub mod provisioning;
pub mod routes;
pub mod session;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use accounts::{AccountStore, RewardPolicy};
use onboarding::OnboardingGate;
use orchestrator::SubscriptionOrchestrator;
use panel::PanelApi;
use payments::{PaymentGateway, PaymentPricing, PaymentWorkflow};
use provisioning::{ProvisioningPolicy, ProvisioningReconciler};

/// Collaborators wired together once at start-up.
pub struct Dependencies {
    pub panel: Arc<dyn PanelApi>,
    pub store: Arc<dyn AccountStore>,
    pub gateway: PaymentGateway,
    pub policy: ProvisioningPolicy,
    pub rewards: RewardPolicy,
    pub pricing: PaymentPricing,
    pub onboarding: OnboardingGate,
}

impl Dependencies {
    pub fn into_orchestrator(self) -> SubscriptionOrchestrator {
        let reconciler = Arc::new(ProvisioningReconciler::new(
            self.panel,
            self.store.clone(),
            self.policy.inbound_id,
            self.policy.endpoint.clone(),
        ));
        let payments = Arc::new(PaymentWorkflow::new(
            self.gateway,
            reconciler.clone(),
            accounts::LedgerUpdater::new(self.store.clone()),
            self.policy.clone(),
            self.rewards,
            self.pricing,
        ));
        SubscriptionOrchestrator::new(
            reconciler,
            payments,
            self.store,
            self.onboarding,
            self.policy,
            self.rewards,
        )
    }
}

async fn root() -> &'static str {
    "VPN subscription API"
}

pub fn app(orchestrator: Arc<SubscriptionOrchestrator>) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(routes::api_routes())
        .layer(Extension(orchestrator))
}

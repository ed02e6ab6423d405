use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

use vpn_backend::accounts::PgAccountStore;
use vpn_backend::config;
use vpn_backend::onboarding::OnboardingGate;
use vpn_backend::panel::XuiPanelClient;
use vpn_backend::payments::{PaymentGateway, PaymentPricing};
use vpn_backend::Dependencies;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the panel is not configured
    let panel_settings = config::panel_settings();
    let policy = config::provisioning_policy();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let payment_settings = config::payment_settings();
    let gateway = PaymentGateway::from_settings(&payment_settings)?;
    if payment_settings.enabled && !gateway.is_enabled() {
        tracing::warn!("PAYMENT_ENABLED is set but no provider credentials are configured");
    }

    let orchestrator = Dependencies {
        panel: Arc::new(XuiPanelClient::new(panel_settings)),
        store: Arc::new(PgAccountStore::new(pool.clone())),
        gateway,
        policy,
        rewards: config::reward_policy(),
        pricing: PaymentPricing {
            amount: payment_settings.amount,
            currency: payment_settings.currency.clone(),
            return_url: payment_settings.return_url.clone(),
        },
        onboarding: OnboardingGate::new(config::ONBOARDING_REQUIRED_FIELDS.clone()),
    }
    .into_orchestrator();

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = vpn_backend::app(Arc::new(orchestrator))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

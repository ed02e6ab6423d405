use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::artifact::{ConnectionArtifact, ConnectionEndpoint};
use super::expiry::{self, RemainingDays};
use crate::accounts::AccountStore;
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::panel::{
    ClientSpec, ClientView, InboundClient, InboundSnapshot, PanelApi, PanelSession,
    DEFAULT_CLIENT_FLOW,
};

/// Grant terms and where clients connect to.
#[derive(Debug, Clone)]
pub struct ProvisioningPolicy {
    pub inbound_id: u32,
    pub subscription_days: u32,
    pub trial_days: u32,
    pub trial_enabled: bool,
    pub quota_gb: u64,
    pub endpoint: ConnectionEndpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionKind {
    Created,
    Existing,
    Overwritten,
    Renewed,
}

/// key: provisioning-result -> entitlement + artifact
#[derive(Debug, Clone)]
pub struct ProvisionedEntitlement {
    pub kind: ProvisionKind,
    pub identity: String,
    pub email: String,
    pub expiry_ms: i64,
    pub quota_bytes: i64,
    pub remaining: RemainingDays,
    pub artifact: ConnectionArtifact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementStatus {
    pub identity: Option<String>,
    pub enabled: bool,
    pub expiry_ms: i64,
    pub remaining: RemainingDays,
}

impl EntitlementStatus {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.remaining.is_expired()
    }
}

/// key: provisioning-reconciler -> idempotent create/find/renew against the panel
///
/// The email-keyed lookup only answers "does it exist". The inbound listing is the
/// sole source of the client UUID used for updates and connection URIs.
pub struct ProvisioningReconciler {
    panel: Arc<dyn PanelApi>,
    store: Arc<dyn AccountStore>,
    inbound_id: u32,
    endpoint: ConnectionEndpoint,
    locks: KeyedLocks<i64>,
}

impl ProvisioningReconciler {
    pub fn new(
        panel: Arc<dyn PanelApi>,
        store: Arc<dyn AccountStore>,
        inbound_id: u32,
        endpoint: ConnectionEndpoint,
    ) -> Self {
        Self {
            panel,
            store,
            inbound_id,
            endpoint,
            locks: KeyedLocks::new(),
        }
    }

    /// Creates or refreshes the user's client. With `allow_existing`, a listed client
    /// that is still enabled and unexpired is returned untouched as `Existing`.
    pub async fn provision(
        &self,
        user_id: i64,
        duration_days: u32,
        quota_gb: u64,
        allow_existing: bool,
    ) -> AppResult<ProvisionedEntitlement> {
        let guard = self.locks.acquire(&user_id).await;
        let result = self
            .provision_locked(user_id, duration_days, quota_gb, allow_existing)
            .await;
        drop(guard);
        self.locks.release(&user_id);
        result
    }

    async fn provision_locked(
        &self,
        user_id: i64,
        duration_days: u32,
        quota_gb: u64,
        allow_existing: bool,
    ) -> AppResult<ProvisionedEntitlement> {
        let email = user_id.to_string();
        let session = self.authenticate().await?;

        let probe = session
            .find_client_by_email(&email)
            .await
            .map_err(AppError::Panel)?;
        let inbound = self.fetch_inbound(session.as_ref()).await?;
        let listed = inbound.find_client(&email).cloned();
        let now = expiry::now_ms();

        if listed.is_some() && probe.is_none() {
            warn!(%user_id, "client listed in inbound but email lookup missed it");
        }

        let entitlement = match listed {
            Some(client) if allow_existing && is_live(&client, probe.as_ref(), now) => {
                let expiry_ms = probe
                    .as_ref()
                    .map(|view| view.expiry_time)
                    .unwrap_or(client.expiry_time);
                let quota_bytes = probe
                    .as_ref()
                    .map(|view| view.total_bytes)
                    .unwrap_or(client.total_bytes);
                info!(%user_id, identity = %client.id, "client already provisioned; reusing");
                ProvisionedEntitlement {
                    kind: ProvisionKind::Existing,
                    artifact: self.artifact(&client.id, &email, &inbound)?,
                    identity: client.id,
                    email,
                    expiry_ms,
                    quota_bytes,
                    remaining: expiry::remaining_days(expiry_ms, now),
                }
            }
            Some(client) => {
                let spec = client_spec(client.id.clone(), &email, duration_days, quota_gb, now);
                session
                    .update_client(self.inbound_id, &client.id, &spec)
                    .await
                    .map_err(AppError::Panel)?;
                info!(
                    %user_id,
                    identity = %client.id,
                    previous_expiry = client.expiry_time,
                    previously_enabled = client.enable,
                    "existing client overwritten with fresh terms"
                );
                self.entitlement(ProvisionKind::Overwritten, &client, &spec, &inbound, now)?
            }
            None => {
                if probe.is_some() {
                    warn!(%user_id, "email lookup found client absent from inbound listing");
                }
                let spec = client_spec(
                    Uuid::new_v4().to_string(),
                    &email,
                    duration_days,
                    quota_gb,
                    now,
                );
                session
                    .create_client(self.inbound_id, &spec)
                    .await
                    .map_err(AppError::Panel)?;

                let refreshed = self.fetch_inbound(session.as_ref()).await?;
                let Some(client) = refreshed.find_client(&email).cloned() else {
                    error!(
                        %user_id,
                        inbound_id = self.inbound_id,
                        "panel acknowledged create but client is absent from inbound"
                    );
                    return Err(AppError::Inconsistency {
                        email,
                        inbound_id: self.inbound_id,
                    });
                };
                info!(%user_id, identity = %client.id, "client created");
                self.entitlement(ProvisionKind::Created, &client, &spec, &refreshed, now)?
            }
        };

        self.persist(user_id, &entitlement).await?;
        Ok(entitlement)
    }

    pub async fn renew(
        &self,
        user_id: i64,
        duration_days: u32,
        quota_gb: u64,
    ) -> AppResult<ProvisionedEntitlement> {
        let guard = self.locks.acquire(&user_id).await;
        let result = self.renew_locked(user_id, duration_days, quota_gb).await;
        drop(guard);
        self.locks.release(&user_id);
        result
    }

    async fn renew_locked(
        &self,
        user_id: i64,
        duration_days: u32,
        quota_gb: u64,
    ) -> AppResult<ProvisionedEntitlement> {
        let email = user_id.to_string();
        let session = self.authenticate().await?;

        let probe = session
            .find_client_by_email(&email)
            .await
            .map_err(AppError::Panel)?;
        if probe.is_none() {
            info!(%user_id, "renewal requested without an existing client");
            return Err(AppError::NotFound(user_id));
        }

        let inbound = self.fetch_inbound(session.as_ref()).await?;
        let Some(client) = inbound.find_client(&email).cloned() else {
            error!(%user_id, "client exists by email but is absent from inbound listing");
            return Err(AppError::Inconsistency {
                email,
                inbound_id: self.inbound_id,
            });
        };

        let now = expiry::now_ms();
        let spec = client_spec(client.id.clone(), &email, duration_days, quota_gb, now);
        session
            .update_client(self.inbound_id, &client.id, &spec)
            .await
            .map_err(AppError::Panel)?;
        info!(%user_id, identity = %client.id, duration_days, "client renewed");

        let entitlement = self.entitlement(ProvisionKind::Renewed, &client, &spec, &inbound, now)?;
        self.persist(user_id, &entitlement).await?;
        Ok(entitlement)
    }

    /// Number of per-user lock slots currently allocated.
    pub fn lock_slots(&self) -> usize {
        self.locks.len()
    }

    /// Read-only lookup. `None` when the user has never been provisioned.
    pub async fn status(&self, user_id: i64) -> AppResult<Option<EntitlementStatus>> {
        let email = user_id.to_string();
        let session = self.authenticate().await?;
        let Some(probe) = session
            .find_client_by_email(&email)
            .await
            .map_err(AppError::Panel)?
        else {
            return Ok(None);
        };

        let inbound = self.fetch_inbound(session.as_ref()).await?;
        let identity = inbound.find_client(&email).map(|client| client.id.clone());
        Ok(Some(EntitlementStatus {
            identity,
            enabled: probe.enable,
            expiry_ms: probe.expiry_time,
            remaining: expiry::remaining_days(probe.expiry_time, expiry::now_ms()),
        }))
    }

    async fn authenticate(&self) -> AppResult<Box<dyn PanelSession>> {
        self.panel.authenticate().await.map_err(|err| {
            error!(?err, "panel authentication failed");
            AppError::Auth(err)
        })
    }

    async fn fetch_inbound(&self, session: &dyn PanelSession) -> AppResult<InboundSnapshot> {
        session
            .get_inbound(self.inbound_id)
            .await
            .map_err(AppError::Panel)
    }

    fn artifact(
        &self,
        identity: &str,
        email: &str,
        inbound: &InboundSnapshot,
    ) -> AppResult<ConnectionArtifact> {
        ConnectionArtifact::build(identity, email, inbound, &self.endpoint).map_err(AppError::Panel)
    }

    fn entitlement(
        &self,
        kind: ProvisionKind,
        client: &InboundClient,
        spec: &ClientSpec,
        inbound: &InboundSnapshot,
        now: i64,
    ) -> AppResult<ProvisionedEntitlement> {
        Ok(ProvisionedEntitlement {
            kind,
            identity: client.id.clone(),
            email: spec.email.clone(),
            expiry_ms: spec.expiry_time,
            quota_bytes: spec.total_bytes,
            remaining: expiry::remaining_days(spec.expiry_time, now),
            artifact: self.artifact(&client.id, &spec.email, inbound)?,
        })
    }

    async fn persist(&self, user_id: i64, entitlement: &ProvisionedEntitlement) -> AppResult<()> {
        self.store
            .save_connection_string(user_id, &entitlement.artifact.uri)
            .await
            .map_err(AppError::Storage)
    }
}

/// Enabled and not yet expired. The email lookup wins over the listing when present.
fn is_live(client: &InboundClient, probe: Option<&ClientView>, now: i64) -> bool {
    let (enabled, expiry_ms) = probe
        .map(|view| (view.enable, view.expiry_time))
        .unwrap_or((client.enable, client.expiry_time));
    enabled && !expiry::remaining_days(expiry_ms, now).is_expired()
}

fn client_spec(
    identity: String,
    email: &str,
    duration_days: u32,
    quota_gb: u64,
    now: i64,
) -> ClientSpec {
    ClientSpec {
        id: identity,
        email: email.to_string(),
        enable: true,
        flow: DEFAULT_CLIENT_FLOW.to_string(),
        expiry_time: expiry::expiry_ms(duration_days, now),
        total_bytes: expiry::quota_bytes(quota_gb),
    }
}

//! Panel capability: the external service that owns VPN client entitlements.

pub mod client;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{XuiPanelClient, XuiPanelSession};

#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Network parameters shared by every client of an inbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealityParams {
    pub public_key: String,
    pub server_names: Vec<String>,
    pub short_ids: Vec<String>,
}

/// key: panel-inbound -> authoritative client listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSnapshot {
    pub id: u32,
    pub remark: String,
    pub reality: RealityParams,
    pub clients: Vec<InboundClient>,
}

impl InboundSnapshot {
    pub fn find_client(&self, email: &str) -> Option<&InboundClient> {
        self.clients.iter().find(|client| client.email == email)
    }
}

/// A client as listed inside the inbound. `id` is the panel UUID required by updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundClient {
    pub id: String,
    pub email: String,
    pub enable: bool,
    pub expiry_time: i64,
    pub total_bytes: i64,
}

/// Result of the email-keyed lookup. Its `id` is a traffic row id, not the client UUID,
/// so it only ever serves as an existence probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientView {
    pub id: i64,
    pub inbound_id: u32,
    pub email: String,
    pub enable: bool,
    pub expiry_time: i64,
    pub total_bytes: i64,
}

/// Fields submitted on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {
    pub id: String,
    pub email: String,
    pub enable: bool,
    pub flow: String,
    pub expiry_time: i64,
    pub total_bytes: i64,
}

pub const DEFAULT_CLIENT_FLOW: &str = "xtls-rprx-vision";

#[async_trait]
pub trait PanelApi: Send + Sync {
    async fn authenticate(&self) -> Result<Box<dyn PanelSession>>;
}

#[async_trait]
pub trait PanelSession: Send + Sync {
    async fn get_inbound(&self, inbound_id: u32) -> Result<InboundSnapshot>;

    async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientView>>;

    async fn create_client(&self, inbound_id: u32, client: &ClientSpec) -> Result<()>;

    async fn update_client(&self, inbound_id: u32, identity: &str, client: &ClientSpec)
        -> Result<()>;
}

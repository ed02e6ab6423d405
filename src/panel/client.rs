use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    ClientSpec, ClientView, InboundClient, InboundSnapshot, PanelApi, PanelSession,
    PanelSettings, RealityParams,
};

// key: panel-http-client -> 3x-ui api

/// Connects to the panel with form login and a per-session cookie jar.
#[derive(Clone)]
pub struct XuiPanelClient {
    settings: PanelSettings,
}

impl XuiPanelClient {
    pub fn new(settings: PanelSettings) -> Self {
        Self { settings }
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint(&self.settings.base_url, path)
    }
}

#[async_trait]
impl PanelApi for XuiPanelClient {
    async fn authenticate(&self) -> Result<Box<dyn PanelSession>> {
        let client = reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .cookie_store(true)
            .build()
            .context("failed to build panel client")?;

        let response = client
            .post(self.endpoint("login"))
            .form(&[
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .context("failed to contact panel for login")?
            .error_for_status()
            .context("panel rejected login request")?;

        let envelope: Envelope<Value> = response
            .json()
            .await
            .context("failed to decode panel login response")?;
        if !envelope.success {
            bail!("panel login refused: {}", envelope.msg);
        }

        tracing::debug!(panel = %self.settings.base_url, "authenticated against panel");
        Ok(Box::new(XuiPanelSession {
            client,
            base_url: self.settings.base_url.clone(),
        }))
    }
}

/// An authenticated panel session.
pub struct XuiPanelSession {
    client: reqwest::Client,
    base_url: String,
}

impl XuiPanelSession {
    fn endpoint(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    async fn get_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .with_context(|| format!("failed to reach panel at {path}"))?
            .error_for_status()
            .with_context(|| format!("panel rejected request to {path}"))?;
        response
            .json()
            .await
            .with_context(|| format!("failed to decode panel response from {path}"))
    }

    async fn post_clients(&self, path: &str, inbound_id: u32, client: &ClientSpec) -> Result<()> {
        let payload = client_payload(inbound_id, client);
        let envelope: Envelope<Value> = self
            .client
            .post(self.endpoint(path))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to reach panel at {path}"))?
            .error_for_status()
            .with_context(|| format!("panel rejected request to {path}"))?
            .json()
            .await
            .with_context(|| format!("failed to decode panel response from {path}"))?;

        if !envelope.success {
            bail!("panel refused {path}: {}", envelope.msg);
        }
        Ok(())
    }
}

#[async_trait]
impl PanelSession for XuiPanelSession {
    async fn get_inbound(&self, inbound_id: u32) -> Result<InboundSnapshot> {
        let envelope: Envelope<RawInbound> = self
            .get_envelope(&format!("panel/api/inbounds/get/{inbound_id}"))
            .await?;
        if !envelope.success {
            bail!("panel refused inbound {inbound_id}: {}", envelope.msg);
        }
        let raw = envelope
            .obj
            .ok_or_else(|| anyhow!("inbound {inbound_id} missing from panel response"))?;
        parse_inbound(raw)
    }

    async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientView>> {
        let envelope: Envelope<RawClientTraffic> = self
            .get_envelope(&format!("panel/api/inbounds/getClientTraffics/{email}"))
            .await?;
        // An unknown email is `success: true` with a null `obj`.
        if !envelope.success {
            bail!("panel refused client lookup for {email}: {}", envelope.msg);
        }
        Ok(envelope.obj.map(|raw| ClientView {
            id: raw.id,
            inbound_id: raw.inbound_id,
            email: raw.email,
            enable: raw.enable,
            expiry_time: raw.expiry_time,
            total_bytes: raw.total,
        }))
    }

    async fn create_client(&self, inbound_id: u32, client: &ClientSpec) -> Result<()> {
        self.post_clients("panel/api/inbounds/addClient", inbound_id, client)
            .await
    }

    async fn update_client(
        &self,
        inbound_id: u32,
        identity: &str,
        client: &ClientSpec,
    ) -> Result<()> {
        self.post_clients(
            &format!("panel/api/inbounds/updateClient/{identity}"),
            inbound_id,
            client,
        )
        .await
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    msg: String,
    obj: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    id: u32,
    #[serde(default)]
    remark: String,
    #[serde(default)]
    settings: String,
    #[serde(default, rename = "streamSettings")]
    stream_settings: String,
}

#[derive(Debug, Deserialize)]
struct RawClientTraffic {
    id: i64,
    #[serde(rename = "inboundId")]
    inbound_id: u32,
    email: String,
    #[serde(default)]
    enable: bool,
    #[serde(default, rename = "expiryTime")]
    expiry_time: i64,
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Deserialize)]
struct RawInboundSettings {
    #[serde(default)]
    clients: Vec<RawInboundClient>,
}

#[derive(Debug, Deserialize)]
struct RawInboundClient {
    #[serde(default)]
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default = "default_enable")]
    enable: bool,
    #[serde(default, rename = "expiryTime")]
    expiry_time: i64,
    #[serde(default, rename = "totalGB")]
    total_gb: i64,
}

fn default_enable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawStreamSettings {
    #[serde(rename = "realitySettings")]
    reality_settings: Option<RawRealitySettings>,
}

#[derive(Debug, Deserialize)]
struct RawRealitySettings {
    #[serde(default, rename = "serverNames")]
    server_names: Vec<String>,
    #[serde(default, rename = "shortIds")]
    short_ids: Vec<String>,
    settings: Option<RawRealityPublic>,
}

#[derive(Debug, Deserialize)]
struct RawRealityPublic {
    #[serde(default, rename = "publicKey")]
    public_key: String,
}

fn parse_inbound(raw: RawInbound) -> Result<InboundSnapshot> {
    let settings: RawInboundSettings = if raw.settings.trim().is_empty() {
        RawInboundSettings {
            clients: Vec::new(),
        }
    } else {
        serde_json::from_str(&raw.settings).context("failed to parse inbound settings")?
    };

    let stream: RawStreamSettings = serde_json::from_str(&raw.stream_settings)
        .context("failed to parse inbound stream settings")?;
    let reality = stream
        .reality_settings
        .ok_or_else(|| anyhow!("inbound {} has no reality settings", raw.id))?;
    let public_key = reality
        .settings
        .map(|settings| settings.public_key)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("inbound {} has no reality public key", raw.id))?;

    Ok(InboundSnapshot {
        id: raw.id,
        remark: raw.remark,
        reality: RealityParams {
            public_key,
            server_names: reality.server_names,
            short_ids: reality.short_ids,
        },
        clients: settings
            .clients
            .into_iter()
            .map(|client| InboundClient {
                id: client.id,
                email: client.email,
                enable: client.enable,
                expiry_time: client.expiry_time,
                total_bytes: client.total_gb,
            })
            .collect(),
    })
}

/// The panel expects the client list as a JSON document embedded in a string field.
fn client_payload(inbound_id: u32, client: &ClientSpec) -> Value {
    let clients = json!({
        "clients": [{
            "id": client.id,
            "email": client.email,
            "enable": client.enable,
            "flow": client.flow,
            "expiryTime": client.expiry_time,
            "totalGB": client.total_bytes,
            "limitIp": 0,
            "tgId": "",
            "subId": "",
            "reset": 0,
        }]
    });
    json!({
        "id": inbound_id,
        "settings": clients.to_string(),
    })
}

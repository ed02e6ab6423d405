use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::panel::InboundSnapshot;

/// Public host and port clients connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    pub host: String,
    pub port: u16,
}

/// key: connection-artifact -> uri + qr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionArtifact {
    pub uri: String,
    pub qr_png: Bytes,
}

impl ConnectionArtifact {
    pub fn build(
        identity: &str,
        email: &str,
        inbound: &InboundSnapshot,
        endpoint: &ConnectionEndpoint,
    ) -> Result<Self> {
        let uri = connection_uri(identity, email, inbound, endpoint)?;
        let qr_png = render_qr_png(&uri)?;
        Ok(Self { uri, qr_png })
    }
}

pub fn connection_uri(
    identity: &str,
    email: &str,
    inbound: &InboundSnapshot,
    endpoint: &ConnectionEndpoint,
) -> Result<String> {
    let server_name = inbound
        .reality
        .server_names
        .first()
        .ok_or_else(|| anyhow!("inbound {} has no server names", inbound.id))?;
    let short_id = inbound
        .reality
        .short_ids
        .first()
        .ok_or_else(|| anyhow!("inbound {} has no short ids", inbound.id))?;

    Ok(format!(
        "vless://{identity}@{host}:{port}?type=tcp&security=reality&pbk={public_key}&fp=firefox&sni={server_name}&sid={short_id}&spx=%2F#{remark}-{email}",
        host = endpoint.host,
        port = endpoint.port,
        public_key = inbound.reality.public_key,
        remark = inbound.remark,
    ))
}

/// Encodes `data` as a PNG QR code held entirely in memory.
pub fn render_qr_png(data: &str) -> Result<Bytes> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .context("failed to encode connection uri as qr")?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(10, 10)
        .quiet_zone(true)
        .build();

    let mut buffer = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .context("failed to write qr png")?;
    Ok(Bytes::from(buffer))
}

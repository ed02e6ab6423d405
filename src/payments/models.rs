use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// key: payments-provider-key -> provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKey {
    YooMoney,
    Sbp,
    Card,
}

impl ProviderKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKey::YooMoney => "yoomoney",
            ProviderKey::Sbp => "sbp",
            ProviderKey::Card => "card",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKey::YooMoney => "YooMoney",
            ProviderKey::Sbp => "SBP",
            ProviderKey::Card => "Bank card",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKey::YooMoney => "YOOMONEY",
            ProviderKey::Sbp => "SBP",
            ProviderKey::Card => "CARD",
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yoomoney" => Ok(ProviderKey::YooMoney),
            "sbp" => Ok(ProviderKey::Sbp),
            "card" => Ok(ProviderKey::Card),
            other => Err(format!("unknown payment provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Create,
    Renew,
}

impl PaymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAction::Create => "create",
            PaymentAction::Renew => "renew",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaymentAction::Create => "VPN subscription",
            PaymentAction::Renew => "VPN subscription renewal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Settled,
    Abandoned,
}

/// key: payments-intent -> one pay-before-provision attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub user_id: i64,
    pub provider: ProviderKey,
    pub provider_payment_id: String,
    pub redirect_url: String,
    pub amount: f64,
    pub currency: String,
    pub action: PaymentAction,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub tax: String,
}

impl LineItem {
    pub fn single(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
            quantity: 1,
            tax: "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUrls {
    pub success: String,
    pub fail: String,
}

/// Everything a gateway needs to open a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub return_urls: ReturnUrls,
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub account_id: String,
    pub secret_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub enabled: bool,
    pub amount: f64,
    pub currency: String,
    pub return_url: String,
    pub timeout: Duration,
    pub credentials: BTreeMap<ProviderKey, ProviderCredentials>,
}

/// Converts a decimal amount into minor currency units.
pub fn minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::models::{
    minor_units, CreatedPayment, PaymentRequest, ProviderCredentials, ProviderKey,
};

/// key: payments-provider -> gateway integration
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn key(&self) -> ProviderKey;

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment>;

    /// `true` once the gateway reports terminal success.
    async fn check_payment(&self, payment_id: &str) -> Result<bool>;
}

/// Builds the provider variant for `key`.
pub fn build_provider(
    key: ProviderKey,
    credentials: &ProviderCredentials,
    timeout: Duration,
) -> Result<Box<dyn PaymentProvider>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build payment client")?;
    let provider: Box<dyn PaymentProvider> = match key {
        ProviderKey::YooMoney => Box::new(YooMoneyProvider::new(client, credentials)),
        ProviderKey::Sbp => Box::new(SbpProvider::new(client, credentials)),
        ProviderKey::Card => Box::new(BankCardProvider::new(client, credentials)),
    };
    Ok(provider)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Deserialize)]
struct RedirectPayment {
    id: String,
    #[serde(default)]
    status: String,
    confirmation: Option<RedirectConfirmation>,
}

#[derive(Debug, Deserialize)]
struct RedirectConfirmation {
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentState {
    status: String,
}

fn redirect_payload(request: &PaymentRequest) -> Value {
    json!({
        "amount": {
            "value": format!("{:.2}", request.amount),
            "currency": request.currency,
        },
        "capture": true,
        "description": request.description,
        "confirmation": {
            "type": "redirect",
            "return_url": request.return_urls.success,
        },
        "metadata": request.metadata,
    })
}

fn into_created(payment: RedirectPayment, provider: ProviderKey) -> Result<CreatedPayment> {
    let redirect_url = payment
        .confirmation
        .and_then(|confirmation| confirmation.confirmation_url)
        .ok_or_else(|| anyhow!("{provider} payment {} has no confirmation url", payment.id))?;
    tracing::debug!(%provider, payment_id = %payment.id, status = %payment.status, "payment opened");
    Ok(CreatedPayment {
        payment_id: payment.id,
        redirect_url,
    })
}

/// Wallet payments with bearer-token auth.
pub struct YooMoneyProvider {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl YooMoneyProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://yoomoney.ru/api/v4";

    pub fn new(client: reqwest::Client, credentials: &ProviderCredentials) -> Self {
        Self {
            client,
            secret_key: credentials.secret_key.clone(),
            base_url: credentials
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl PaymentProvider for YooMoneyProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::YooMoney
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment> {
        let payment: RedirectPayment = self
            .client
            .post(endpoint(&self.base_url, "payments"))
            .bearer_auth(&self.secret_key)
            .json(&redirect_payload(request))
            .send()
            .await
            .context("failed to reach yoomoney")?
            .error_for_status()
            .context("yoomoney rejected payment")?
            .json()
            .await
            .context("failed to decode yoomoney payment")?;
        into_created(payment, self.key())
    }

    async fn check_payment(&self, payment_id: &str) -> Result<bool> {
        let state: PaymentState = self
            .client
            .get(endpoint(&self.base_url, &format!("payments/{payment_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("failed to reach yoomoney")?
            .error_for_status()
            .context("yoomoney rejected status check")?
            .json()
            .await
            .context("failed to decode yoomoney status")?;
        Ok(state.status == "succeeded")
    }
}

/// Card checkout with basic auth and per-request idempotence keys.
pub struct BankCardProvider {
    client: reqwest::Client,
    shop_id: String,
    secret_key: String,
    base_url: String,
}

impl BankCardProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.yookassa.ru/v3";

    pub fn new(client: reqwest::Client, credentials: &ProviderCredentials) -> Self {
        Self {
            client,
            shop_id: credentials.account_id.clone(),
            secret_key: credentials.secret_key.clone(),
            base_url: credentials
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl PaymentProvider for BankCardProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Card
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment> {
        let mut payload = redirect_payload(request);
        payload["payment_method_data"] = json!({ "type": "bank_card" });

        let payment: RedirectPayment = self
            .client
            .post(endpoint(&self.base_url, "payments"))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&payload)
            .send()
            .await
            .context("failed to reach card gateway")?
            .error_for_status()
            .context("card gateway rejected payment")?
            .json()
            .await
            .context("failed to decode card payment")?;
        into_created(payment, self.key())
    }

    async fn check_payment(&self, payment_id: &str) -> Result<bool> {
        let state: PaymentState = self
            .client
            .get(endpoint(&self.base_url, &format!("payments/{payment_id}")))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await
            .context("failed to reach card gateway")?
            .error_for_status()
            .context("card gateway rejected status check")?
            .json()
            .await
            .context("failed to decode card payment status")?;
        Ok(state.status == "succeeded")
    }
}

/// Fast-payment-system transfers through an acquiring gateway with SHA-256 request tokens.
pub struct SbpProvider {
    client: reqwest::Client,
    terminal_key: String,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SbpInitResponse {
    success: bool,
    #[serde(default)]
    payment_id: Option<Value>,
    #[serde(default, rename = "PaymentURL")]
    payment_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SbpStateResponse {
    success: bool,
    #[serde(default)]
    status: String,
}

impl SbpProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://securepay.tinkoff.ru/v2";

    pub fn new(client: reqwest::Client, credentials: &ProviderCredentials) -> Self {
        Self {
            client,
            terminal_key: credentials.account_id.clone(),
            secret_key: credentials.secret_key.clone(),
            base_url: credentials
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        }
    }

    fn init_payload(&self, request: &PaymentRequest, order_id: &str) -> Value {
        let amount = minor_units(request.amount);
        let items: Vec<Value> = if request.line_items.is_empty() {
            vec![json!({
                "Name": request.description,
                "Price": amount,
                "Quantity": 1,
                "Amount": amount,
                "Tax": "none",
            })]
        } else {
            request
                .line_items
                .iter()
                .map(|item| {
                    json!({
                        "Name": item.name,
                        "Price": minor_units(item.price),
                        "Quantity": item.quantity,
                        "Amount": minor_units(item.price * f64::from(item.quantity)),
                        "Tax": item.tax,
                    })
                })
                .collect()
        };

        let mut receipt = json!({ "Taxation": "osn", "Items": items });
        if let Some(email) = request.metadata.get("email") {
            receipt["Email"] = json!(email);
        }
        if let Some(phone) = request.metadata.get("phone") {
            receipt["Phone"] = json!(phone);
        }

        let token = sbp_token(&[
            &amount.to_string(),
            order_id,
            &request.description,
            &request.return_urls.success,
            &request.return_urls.fail,
            &self.secret_key,
        ]);

        json!({
            "TerminalKey": self.terminal_key,
            "Amount": amount,
            "OrderId": order_id,
            "Description": request.description,
            "SuccessURL": request.return_urls.success,
            "FailURL": request.return_urls.fail,
            "Data": request.metadata,
            "Receipt": receipt,
            "Token": token,
        })
    }
}

/// Hex SHA-256 over the concatenated fields.
pub fn sbp_token(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl PaymentProvider for SbpProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Sbp
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment> {
        let order_id = Uuid::new_v4().to_string();
        let response: SbpInitResponse = self
            .client
            .post(endpoint(&self.base_url, "Init"))
            .json(&self.init_payload(request, &order_id))
            .send()
            .await
            .context("failed to reach sbp gateway")?
            .error_for_status()
            .context("sbp gateway rejected payment")?
            .json()
            .await
            .context("failed to decode sbp init response")?;

        if !response.success {
            bail!(
                "sbp gateway declined payment: {}",
                response.message.unwrap_or_default()
            );
        }
        let payment_id = match response.payment_id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => bail!("sbp gateway returned no payment id"),
        };
        let redirect_url = response
            .payment_url
            .ok_or_else(|| anyhow!("sbp payment {payment_id} has no payment url"))?;
        Ok(CreatedPayment {
            payment_id,
            redirect_url,
        })
    }

    async fn check_payment(&self, payment_id: &str) -> Result<bool> {
        let token = sbp_token(&[&self.terminal_key, payment_id, &self.secret_key]);
        let state: SbpStateResponse = self
            .client
            .post(endpoint(&self.base_url, "GetState"))
            .json(&json!({
                "TerminalKey": self.terminal_key,
                "PaymentId": payment_id,
                "Token": token,
            }))
            .send()
            .await
            .context("failed to reach sbp gateway")?
            .error_for_status()
            .context("sbp gateway rejected status check")?
            .json()
            .await
            .context("failed to decode sbp state")?;
        Ok(state.success && state.status == "CONFIRMED")
    }
}

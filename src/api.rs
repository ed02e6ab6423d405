use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD as Base64Engine;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::onboarding::ProfileField;
use crate::orchestrator::{Outcome, Reply, SubscriptionOrchestrator};
use crate::payments::ProviderKey;
use crate::provisioning::ProvisionedEntitlement;

/// key: vpn-api -> json surface for the bot front end
pub type Orchestrator = Extension<Arc<SubscriptionOrchestrator>>;

#[derive(Debug, Default, Deserialize)]
pub struct UsernamePayload {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPayload {
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct SelectProviderPayload {
    pub provider: ProviderKey,
}

#[derive(Debug, Deserialize)]
pub struct ProfileFieldPayload {
    pub field: ProfileField,
    pub value: String,
}

pub async fn request_subscription(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
    payload: Option<Json<UsernamePayload>>,
) -> Outcome {
    let Json(payload) = payload.unwrap_or_default();
    orchestrator
        .request_subscription(user_id, payload.username.as_deref())
        .await
}

pub async fn confirm_overwrite(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
    Json(payload): Json<ConfirmPayload>,
) -> Outcome {
    orchestrator.confirm_overwrite(user_id, payload.accept).await
}

pub async fn request_renewal(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
) -> Outcome {
    orchestrator.request_renewal(user_id).await
}

pub async fn request_trial(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
    payload: Option<Json<UsernamePayload>>,
) -> Outcome {
    let Json(payload) = payload.unwrap_or_default();
    orchestrator
        .request_trial(user_id, payload.username.as_deref())
        .await
}

pub async fn status(Extension(orchestrator): Orchestrator, Path(user_id): Path<i64>) -> Outcome {
    orchestrator.status(user_id).await
}

pub async fn connection(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
) -> Outcome {
    orchestrator.connection(user_id).await
}

pub async fn profile(Extension(orchestrator): Orchestrator, Path(user_id): Path<i64>) -> Outcome {
    orchestrator.profile(user_id).await
}

pub async fn update_profile(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
    Json(payload): Json<ProfileFieldPayload>,
) -> Outcome {
    orchestrator
        .update_profile(user_id, payload.field, &payload.value)
        .await
}

pub async fn select_payment(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
    Json(payload): Json<SelectProviderPayload>,
) -> Outcome {
    orchestrator.select_payment(user_id, payload.provider).await
}

pub async fn check_payment(
    Extension(orchestrator): Orchestrator,
    Path(user_id): Path<i64>,
) -> Outcome {
    orchestrator.check_payment(user_id).await
}

pub async fn back(Extension(orchestrator): Orchestrator, Path(user_id): Path<i64>) -> Outcome {
    orchestrator.back(user_id).await
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let body = match self {
            Outcome::Error(error) => return error.into_response(),
            Outcome::Success(reply) => reply_body(reply),
            Outcome::PaymentRequired { action, providers } => json!({
                "type": "payment_required",
                "action": action,
                "providers": providers
                    .iter()
                    .map(|key| json!({ "key": key, "name": key.display_name() }))
                    .collect::<Vec<_>>(),
            }),
            Outcome::ConfirmationRequired { existing_days } => json!({
                "type": "confirmation_required",
                "existing_days": existing_days,
            }),
            Outcome::OnboardingRequired { missing } => json!({
                "type": "onboarding_required",
                "missing": missing,
            }),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

fn reply_body(reply: Reply) -> Value {
    match reply {
        Reply::Granted(entitlement) => granted_body(entitlement),
        Reply::Status(status) => json!({ "type": "success", "result": "status", "status": status }),
        Reply::Connection {
            uri,
            qr_png,
            remaining,
        } => json!({
            "type": "success",
            "result": "connection",
            "connection_uri": uri,
            "qr_png_base64": Base64Engine.encode(qr_png),
            "remaining_days": remaining,
        }),
        Reply::Profile(account) => json!({
            "type": "success",
            "result": "profile",
            "profile": account,
        }),
        Reply::PaymentCreated(intent) => json!({
            "type": "success",
            "result": "payment_created",
            "intent_id": intent.id,
            "provider": intent.provider,
            "provider_name": intent.provider.display_name(),
            "redirect_url": intent.redirect_url,
            "amount": intent.amount,
            "currency": intent.currency,
        }),
        Reply::PaymentPending(intent) => json!({
            "type": "success",
            "result": "payment_pending",
            "intent_id": intent.id,
            "redirect_url": intent.redirect_url,
        }),
        Reply::PaymentAlreadySettled(intent) => json!({
            "type": "success",
            "result": "payment_already_settled",
            "intent_id": intent.id,
        }),
        Reply::Declined => json!({ "type": "success", "result": "declined" }),
        Reply::Back { left, current } => json!({
            "type": "success",
            "result": "back",
            "left": left,
            "session": current,
        }),
    }
}

fn granted_body(entitlement: ProvisionedEntitlement) -> Value {
    json!({
        "type": "success",
        "result": "granted",
        "kind": entitlement.kind,
        "identity": entitlement.identity,
        "email": entitlement.email,
        "expiry_ms": entitlement.expiry_ms,
        "quota_bytes": entitlement.quota_bytes,
        "remaining_days": entitlement.remaining,
        "connection_uri": entitlement.artifact.uri,
        "qr_png_base64": Base64Engine.encode(&entitlement.artifact.qr_png),
    })
}

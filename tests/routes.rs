mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use common::{HarnessBuilder, ScriptedProvider};
use vpn_backend::payments::ProviderKey;

// key: route-tests -> json outcomes over http

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("Content-Type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn subscription_route_returns_connection_artifact() {
    let harness = HarnessBuilder::new().build();
    let app = vpn_backend::app(Arc::new(harness.orchestrator));

    let (status, body) = send(
        &app,
        Method::POST,
        "/users/42/subscription",
        Some(serde_json::json!({ "username": "alice" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "success");
    assert_eq!(body["result"], "granted");
    assert_eq!(body["kind"], "created");
    assert_eq!(body["remaining_days"], 31);
    assert!(body["connection_uri"]
        .as_str()
        .unwrap()
        .starts_with("vless://"));
    assert!(!body["qr_png_base64"].as_str().unwrap().is_empty());

    let (status, body) = send(&app, Method::POST, "/users/42/subscription", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "confirmation_required");
    assert!(matches!(body["existing_days"].as_u64(), Some(30..=31)));
}

#[tokio::test]
async fn status_route_reports_missing_entitlement_as_null() {
    let harness = HarnessBuilder::new().build();
    let app = vpn_backend::app(Arc::new(harness.orchestrator));

    let (status, body) = send(&app, Method::GET, "/users/7/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "status");
    assert!(body["status"].is_null());
}

#[tokio::test]
async fn errors_are_generic_with_mapped_status_codes() {
    let harness = HarnessBuilder::new().build();
    let app = vpn_backend::app(Arc::new(harness.orchestrator));

    let (status, body) = send(&app, Method::POST, "/users/7/renewal", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["type"], "error");
    assert!(body["message"].as_str().unwrap().contains("subscribe first"));

    let (status, body) = send(&app, Method::POST, "/users/7/payments/check", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], "error");

    let (status, body) = send(
        &app,
        Method::POST,
        "/users/7/profile",
        Some(serde_json::json!({ "field": "phone", "value": "12" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please enter a valid phone.");
}

#[tokio::test]
async fn payment_routes_walk_the_payment_handshake() {
    let provider = Arc::new(ScriptedProvider::new(ProviderKey::Sbp, &[true]));
    let harness = HarnessBuilder::new().provider(provider).build();
    let app = vpn_backend::app(Arc::new(harness.orchestrator));

    let (_, body) = send(&app, Method::POST, "/users/42/subscription", None).await;
    assert_eq!(body["type"], "payment_required");
    assert_eq!(body["providers"][0]["key"], "sbp");
    assert_eq!(body["providers"][0]["name"], "SBP");

    let (status, body) = send(
        &app,
        Method::POST,
        "/users/42/payments",
        Some(serde_json::json!({ "provider": "sbp" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "payment_created");
    assert_eq!(body["redirect_url"], "https://pay.example.com/pay-1");

    let (_, body) = send(&app, Method::POST, "/users/42/payments/check", None).await;
    assert_eq!(body["result"], "granted");

    let (_, body) = send(&app, Method::GET, "/users/42/profile", None).await;
    assert_eq!(body["profile"]["balance"], 10);
}

use axum::{
    routing::{get, post},
    Router,
};

use crate::api;

pub fn api_routes() -> Router {
    Router::new()
        .route("/users/:id/subscription", post(api::request_subscription))
        .route(
            "/users/:id/subscription/confirm",
            post(api::confirm_overwrite),
        )
        .route("/users/:id/renewal", post(api::request_renewal))
        .route("/users/:id/trial", post(api::request_trial))
        .route("/users/:id/status", get(api::status))
        .route("/users/:id/connection", get(api::connection))
        .route(
            "/users/:id/profile",
            get(api::profile).post(api::update_profile),
        )
        .route("/users/:id/payments", post(api::select_payment))
        .route("/users/:id/payments/check", post(api::check_payment))
        .route("/users/:id/payments/back", post(api::back))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("panel authentication failed: {0:#}")]
    Auth(#[source] anyhow::Error),
    #[error("no entitlement found for user {0}")]
    NotFound(i64),
    #[error("panel acknowledged client {email} but it is absent from inbound {inbound_id}")]
    Inconsistency { email: String, inbound_id: u32 },
    #[error("payment provider error: {0}")]
    Provider(String),
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("panel request failed: {0:#}")]
    Panel(#[source] anyhow::Error),
    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Text safe to show to an end user. Full detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(_) => "Service is temporarily unavailable. Please try again later.".into(),
            AppError::NotFound(_) => {
                "No active subscription found. Please subscribe first.".into()
            }
            AppError::Provider(_) => {
                "Payment could not be created. Please choose another method.".into()
            }
            AppError::Validation { field, .. } => format!("Please enter a valid {field}."),
            AppError::Conflict(_) => "This action is no longer available.".into(),
            AppError::Inconsistency { .. } | AppError::Panel(_) | AppError::Storage(_) => {
                "Something went wrong. Please try again later.".into()
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Provider(_) | AppError::Panel(_) => StatusCode::BAD_GATEWAY,
            AppError::Auth(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Inconsistency { .. } | AppError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(error = %self, "request failed");
        let body = json!({ "type": "error", "message": self.user_message() });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

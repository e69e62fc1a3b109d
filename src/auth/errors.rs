use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::repo::StoreError;
use crate::auth::validation::{FieldError, FieldErrorBody, FormError};

/// Outcome of a failed account workflow.
///
/// `Rejected` carries every field problem found so the form can be re-rendered
/// in one round trip; the infrastructure variants short-circuit and map to a
/// single generic failure.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("{} field error(s)", .0.len())]
    Rejected(Vec<FieldError>),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid confirmation code")]
    InvalidConfirmationCode,
    #[error("session refers to an unknown account")]
    UnknownAccount,
    #[error("user store unavailable")]
    StoreUnavailable(#[source] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            AccountError::Rejected(errors) => errors,
            _ => &[],
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AccountError::Rejected(vec![FieldError::RegisteredEmail]),
            StoreError::NotFound => AccountError::UnknownAccount,
            StoreError::Codec(e) => AccountError::Internal(e.to_string()),
            e @ StoreError::Unavailable(_) => AccountError::StoreUnavailable(e),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        match self {
            AccountError::Form(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_form", "fields": e.fields })),
            )
                .into_response(),
            AccountError::Rejected(errors) => {
                let errors: Vec<FieldErrorBody> = errors.into_iter().map(Into::into).collect();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "validation_failed", "errors": errors })),
                )
                    .into_response()
            }
            AccountError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_credentials" })),
            )
                .into_response(),
            AccountError::InvalidConfirmationCode => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_confirmation_code" })),
            )
                .into_response(),
            AccountError::UnknownAccount => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unknown_account" })),
            )
                .into_response(),
            AccountError::StoreUnavailable(e) => {
                error!(error = ?e, "user store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "unavailable", "message": "Please try again later." })),
                )
                    .into_response()
            }
            AccountError::Internal(msg) => {
                error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal" })),
                )
                    .into_response()
            }
        }
    }
}

//! Webhook Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hb_crypto::SigningError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to the webhook caller.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The `secret` query parameter is absent, blank or unparseable.
    #[error("Secret required")]
    MissingKey,

    /// Challenge fields are present but unusable.
    #[error("Invalid challenge: {0}")]
    SignatureInput(String),

    /// Payload body is not UTF-8 text.
    #[error("Payload must be UTF-8 text")]
    InvalidEncoding,
}

impl From<SigningError> for WebhookError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::InvalidSecret => Self::MissingKey,
            SigningError::Encoding(field) => Self::SignatureInput(format!("{field} is not UTF-8")),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingKey | Self::SignatureInput(_) | Self::InvalidEncoding => {
                StatusCode::BAD_REQUEST
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

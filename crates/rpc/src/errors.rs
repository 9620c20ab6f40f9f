//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sharelock_files::ContentError;
use sharelock_gateway::{DenialReason, GatewayError};
use tracing::warn;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Error returned by every handler: status, machine code and message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnsupportedContentKind { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Content(ContentError::NotFound(_)) => {
                return Self::not_found("Stored content is missing");
            }
            GatewayError::CodeEncoding(_)
            | GatewayError::Persistence(_)
            | GatewayError::Content(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", err);
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<DenialReason> for ApiError {
    fn from(reason: DenialReason) -> Self {
        let status = match reason {
            DenialReason::NotFound => StatusCode::NOT_FOUND,
            DenialReason::CredentialRequired => StatusCode::UNAUTHORIZED,
            DenialReason::CredentialMismatch => StatusCode::FORBIDDEN,
        };
        Self::new(status, reason.code(), reason.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
            code: self.code,
        });
        (self.status, payload).into_response()
    }
}

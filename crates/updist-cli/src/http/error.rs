//! Error responses

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use updist_core::{ErrorClass, UpdateError};

/// An error rendered as `{"error": <code>, "message": <text>}`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// A domain failure from the service.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Malformed request outside the service's validation.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or unrecognized credentials.
    #[error("missing or invalid bearer token")]
    Unauthorized,

    /// A request the transport layer refused, with its own status.
    #[error("{message}")]
    Rejected {
        /// Status chosen by the layer that refused it.
        status: StatusCode,
        /// Its explanation.
        message: String,
    },
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::Rejected {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Rejected { status, .. } => *status,
            Self::Update(UpdateError::TenantNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Update(e) => match e.class() {
                ErrorClass::Validation | ErrorClass::State => StatusCode::BAD_REQUEST,
                ErrorClass::Conflict => StatusCode::CONFLICT,
                ErrorClass::Gating | ErrorClass::Forbidden => StatusCode::FORBIDDEN,
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Rejected { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            Self::Rejected { status, .. } if status.is_server_error() => "internal_error",
            Self::Rejected { .. } => "bad_request",
            Self::Update(e) => match e.class() {
                ErrorClass::Validation => "validation_failed",
                ErrorClass::Conflict => "conflict",
                ErrorClass::Gating => "not_eligible",
                ErrorClass::NotFound => "not_found",
                ErrorClass::State => "inactive",
                ErrorClass::Forbidden => "forbidden",
                ErrorClass::Storage => "internal_error",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Update(e) if e.class() == ErrorClass::Storage => {
                tracing::error!(error = %e, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

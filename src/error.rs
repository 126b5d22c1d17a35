//! Error taxonomy for the payment gateway, collapsed to HTTP responses at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors surfaced by the Payment Middleware's request classifier.
///
/// Every variant here is terminal from the middleware's point of view: it maps to
/// exactly one HTTP response. Recoverable conditions (e.g. an invalid bearer token
/// that falls through to Path 2) never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("bad request")]
    BadRequest,
    #[error("payment already processed")]
    ReplayConflict,
    #[error("internal error")]
    Internal,
    #[error("upstream unavailable")]
    BadGateway,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::BadRequest => (
                StatusCode::BAD_REQUEST,
                axum::Json(ErrorBody {
                    error: "bad request".to_string(),
                    reason: None,
                }),
            )
                .into_response(),
            GatewayError::ReplayConflict => (
                StatusCode::CONFLICT,
                axum::Json(ErrorBody {
                    error: "payment already processed".to_string(),
                    reason: None,
                }),
            )
                .into_response(),
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(ErrorBody {
                    error: "internal error".to_string(),
                    reason: None,
                }),
            )
                .into_response(),
            GatewayError::BadGateway => (
                StatusCode::BAD_GATEWAY,
                axum::Json(ErrorBody {
                    error: "upstream unavailable".to_string(),
                    reason: None,
                }),
            )
                .into_response(),
        }
    }
}

/// Errors produced while loading and validating process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is required when {context}")]
    MissingField {
        field: &'static str,
        context: &'static str,
    },
    #[error("local and remote facilitator settings are mutually exclusive")]
    ConflictingFacilitatorMode,
    #[error("invalid value for {field}: {source}")]
    InvalidValue {
        field: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

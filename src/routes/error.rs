//! Gateway error type and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Request-shape and forwarding errors surfaced to clients. Authentication
/// and authorization failures are not errors; they are decision variants
/// rendered by the gateway modes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Credential-exchange body was missing or not valid JSON.
    #[error("invalid JSON body")]
    InvalidJson,

    /// Credential-exchange body carried no token.
    #[error("token required")]
    TokenRequired,

    /// The upstream origin could not be reached or misbehaved.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::InvalidJson => {
                (StatusCode::BAD_REQUEST, "invalid_json", "Request body must be valid JSON")
            }
            GatewayError::TokenRequired => {
                (StatusCode::BAD_REQUEST, "token_required", "Token required")
            }
            GatewayError::UpstreamUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_unavailable",
                "Upstream application is unavailable",
            ),
            GatewayError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }

        let body = json!({"error": {"code": code, "message": message}});
        (status, Json(body)).into_response()
    }
}

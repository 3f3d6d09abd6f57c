use crate::http::HttpState;
use crate::protocol::ErrorResponse;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use syncwarden_core::constants::API_KEY_HEADER;
use syncwarden_core::error::ProtocolErrorCode;
use tracing::warn;

/// Shared-secret middleware for the control endpoints.
///
/// Reads the secret from the `x-api-key` header. With no secret configured the
/// request is let through and a warning is logged.
pub async fn require_api_secret(
    State(state): State<Arc<HttpState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_secret() else {
        warn!(
            path = %request.uri().path(),
            "API secret not set; control endpoint is unauthenticated"
        );
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided.is_some_and(|secret| secrets_match(secret, expected)) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rejected request with invalid API secret");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(
            ProtocolErrorCode::Unauthorized,
            "Invalid API secret",
        )),
    )
        .into_response()
}

/// Compare secrets through their BLAKE3 digests; `blake3::Hash` equality is
/// constant-time.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    blake3::hash(provided.as_bytes()) == blake3::hash(expected.as_bytes())
}

pub mod agents;
pub mod health;
pub mod resolve;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use ar_domain::error::Error;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        // Capability resolution
        .route("/v1/agents", get(agents::list_agents))
        .route("/v1/resolve", post(resolve::resolve_sync))
        .route("/v1/resolve/distributed", post(resolve::resolve_distributed))
        .route("/v1/resolver/stats", get(resolve::stats))
        // Session directory
        .route("/v1/sessions/route", post(sessions::route))
        .route(
            "/v1/sessions/:tenant_id/:node_id",
            get(sessions::lookup).delete(sessions::evict),
        )
        .route("/v1/sessions/:tenant_id/:node_id/inbox", get(sessions::inbox))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a library error to its HTTP status.
pub(crate) fn error_response(error: &Error) -> Response {
    let status = match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
        })),
    )
        .into_response()
}

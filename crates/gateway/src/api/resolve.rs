//! Capability resolution endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use ar_domain::{AgentId, DataKey};
use ar_protocol::{DataQuery, NotFoundReason, ResolutionReply};
use ar_resolver::AgentRegistry;

use super::{api_error, error_response};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/resolve
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub start: AgentId,
    pub key: DataKey,
}

/// Synchronous search: full subtree, then siblings on the way up.
/// `provider` is `null` when nothing reachable declares the key.
pub async fn resolve_sync(
    State(state): State<AppState>,
    Json(body): Json<ResolveBody>,
) -> Response {
    if state.registry.get_agent(&body.start).is_none() {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("unknown agent \"{}\"", body.start),
        );
    }
    let provider = state.capabilities.find_provider(&body.start, &body.key);
    Json(serde_json::json!({
        "start": body.start,
        "key": body.key,
        "provider": provider,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/resolve/distributed
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Route the query through the resolution actor and return its terminal
/// reply.  Not-found replies keep their body; the status reflects why.
pub async fn resolve_distributed(
    State(state): State<AppState>,
    Json(body): Json<DataQuery>,
) -> Response {
    let reply = match state.resolver.resolve(body.context_path, body.key).await {
        Ok(reply) => reply,
        Err(e) => return error_response(&e),
    };
    let status = match &reply {
        ResolutionReply::DataSourceFound(_) => StatusCode::OK,
        ResolutionReply::DataSourceNotFound(n) => match n.reason {
            NotFoundReason::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            NotFoundReason::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            NotFoundReason::RegistryFault { .. } | NotFoundReason::Correlation { .. } => {
                StatusCode::BAD_GATEWAY
            }
            NotFoundReason::Exhausted | NotFoundReason::HopLimit { .. } => StatusCode::NOT_FOUND,
        },
    };
    (status, Json(reply)).into_response()
}

/// GET /v1/resolver/stats
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.resolver.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(&e),
    }
}

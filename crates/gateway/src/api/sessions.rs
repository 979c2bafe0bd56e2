//! Session directory endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use ar_domain::SessionKey;
use ar_protocol::RouteSessionRequest;

use super::{api_error, error_response};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/route
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deliver a payload to the session owning `(tenant_id, node_id)`,
/// creating the owner on first use.
pub async fn route(
    State(state): State<AppState>,
    Json(body): Json<RouteSessionRequest>,
) -> Response {
    let key = SessionKey::new(body.tenant_id, body.node_id);
    match state.directory.route(key, body.payload).await {
        Ok(receipt) => {
            let status = if receipt.spawned {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(receipt)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /v1/sessions/:tenant_id/:node_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn lookup(
    State(state): State<AppState>,
    Path((tenant_id, node_id)): Path<(String, String)>,
) -> Response {
    let key = SessionKey::new(tenant_id, node_id);
    match state.directory.lookup(key.clone()).await {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("no session for {key}")),
        Err(e) => error_response(&e),
    }
}

/// Remove the record and stop its owner.
pub async fn evict(
    State(state): State<AppState>,
    Path((tenant_id, node_id)): Path<(String, String)>,
) -> Response {
    let key = SessionKey::new(tenant_id, node_id);
    match state.directory.evict(key.clone()).await {
        Ok(true) => Json(serde_json::json!({ "evicted": true })).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("no session for {key}")),
        Err(e) => error_response(&e),
    }
}

/// Most recent payloads handled by the session's current owner.
pub async fn inbox(
    State(state): State<AppState>,
    Path((tenant_id, node_id)): Path<(String, String)>,
) -> Response {
    let key = SessionKey::new(tenant_id, node_id);
    match state.inbox.snapshot(&key) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("no inbox for {key}")),
    }
}

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/agents: the agent tree in pre-order.
pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let agents = state.registry.list();
    Json(serde_json::json!({
        "root": state.registry.root(),
        "count": agents.len(),
        "agents": agents,
    }))
}

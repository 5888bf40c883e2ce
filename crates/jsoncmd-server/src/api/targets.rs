//! Registry discovery.
//!
//! Exposes `GET /api/targets`, listing every registered target with its
//! operation signatures and policies.

use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_targets))
}

/// GET /api/targets: list all registered targets and their operations.
async fn list_targets(State(state): State<AppState>) -> Json<serde_json::Value> {
    let targets = state.registry().describe();
    Json(serde_json::json!({ "targets": targets }))
}

pub mod command;
pub mod targets;

use axum::Router;

use crate::state::AppState;

/// Build the discovery API router (`/api/...`).
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/api/targets", targets::router())
}

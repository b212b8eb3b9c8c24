use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod scan;

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/scan", post(scan::handle_scan))
        .route("/health", get(health::get_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::inference::holder::ModelState;
use crate::state::AppState;

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: ModelState,
}

/// Handler for `GET /health`. Reports whether the model is loaded without
/// triggering a load.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.holder.state(),
    })
}

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::EngineState;

/// `GET /`: liveness plus a quick stats snapshot.
pub async fn liveness(State(state): State<EngineState>) -> impl IntoResponse {
    let catalog_stats = state.ctx.catalog.stats().await.ok();
    Json(json!({
        "status": "ok",
        "stats": catalog_stats,
    }))
}

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::EngineState;

/// `GET /health`: reachability of the catalog and the model runtime, plus
/// the circuit breaker's current view of the runtime.
pub async fn health(State(state): State<EngineState>) -> impl IntoResponse {
    let catalog_ok = state.ctx.catalog.stats().await.is_ok();
    let model_ok = state.model_client.health().await;
    let breaker_state = state.circuit_breaker.state();

    let status = if catalog_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "catalog": if catalog_ok { "ok" } else { "fail" },
            "model_runtime": if model_ok { "ok" } else { "unreachable" },
            "circuit_breaker": breaker_state,
        })),
    )
}

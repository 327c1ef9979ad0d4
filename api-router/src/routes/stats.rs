use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::EngineState;

#[derive(Serialize)]
pub struct StatsResponse {
    pub catalog: common::catalog::CatalogStats,
    pub keyword_index_size: usize,
    pub embed_queue_depth: usize,
    pub summarize_queue_depth: usize,
}

/// `GET /stats`: index sizes and worker queue depths.
pub async fn stats(State(state): State<EngineState>) -> Result<Json<StatsResponse>, ApiError> {
    let catalog = state.ctx.catalog.stats().await?;
    let keyword_index_size = state.ctx.keyword_index.lock().unwrap_or_else(|p| p.into_inner()).len();
    let (embed_queue_depth, summarize_queue_depth) = state.ctx.worker.queue_depths();

    Ok(Json(StatsResponse {
        catalog,
        keyword_index_size,
        embed_queue_depth,
        summarize_queue_depth,
    }))
}

use axum::{extract::State, Json};
use retrieval_pipeline::RetrievedChunk;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::EngineState;

const DEFAULT_K: usize = 5;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SourceOut {
    pub path: String,
    pub source: String,
    pub summary: String,
    pub relevance_score: f32,
    pub processing_status: common::catalog::ProcessingStatus,
    pub content: String,
}

impl From<RetrievedChunk> for SourceOut {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            path: chunk.source_path.clone(),
            source: chunk.source_path,
            summary: chunk.summary,
            relevance_score: chunk.score,
            processing_status: chunk.processing_status,
            content: chunk.content,
        }
    }
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SourceOut>,
    pub count: usize,
}

pub async fn search(
    State(state): State<EngineState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let k = request.k.unwrap_or(DEFAULT_K);
    let results: Vec<SourceOut> = state
        .retriever
        .retrieve(&request.query, k)
        .await?
        .into_iter()
        .map(SourceOut::from)
        .collect();

    Ok(Json(SearchResponse {
        query: request.query,
        count: results.len(),
        results,
    }))
}

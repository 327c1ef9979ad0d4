//! `/ask_rag`: the full self-correcting retrieve/grade/transform/generate
//! workflow, with conversation history carried through the session store.

use axum::{extract::State, Json};
use common::session::MessageRole;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::search::SourceOut;
use crate::state::EngineState;

const DEFAULT_K: usize = 5;

#[derive(Deserialize)]
pub struct AskRagRequest {
    pub query: String,
    pub k: Option<usize>,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct GradingStats {
    pub attempts: u32,
}

#[derive(Serialize)]
pub struct AskRagResponse {
    pub answer: String,
    pub sources: Vec<SourceOut>,
    pub grading_stats: GradingStats,
    pub session_id: String,
}

pub async fn ask_rag(
    State(state): State<EngineState>,
    Json(request): Json<AskRagRequest>,
) -> Result<Json<AskRagResponse>, ApiError> {
    let session_id = state.sessions.create(request.session_id).await?;
    state.sessions.append(&session_id, MessageRole::User, &request.query).await?;

    let k = request.k.unwrap_or(DEFAULT_K);
    let outcome = state.rag.run(&request.query, k).await?;

    state.sessions.append(&session_id, MessageRole::Assistant, &outcome.answer).await?;

    Ok(Json(AskRagResponse {
        answer: outcome.answer,
        sources: outcome.sources.into_iter().map(SourceOut::from).collect(),
        grading_stats: GradingStats { attempts: outcome.attempts },
        session_id,
    }))
}

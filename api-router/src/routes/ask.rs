//! `/ask`: intent-classified dispatch. A `Search` intent goes straight to the
//! hybrid retriever; every other intent (including the out-of-scope
//! `Move`/`List`/`Read` labels — file management is not implemented, only
//! classified) falls back to a plain conversational reply.

use axum::{extract::State, Json};
use common::session::MessageRole;
use retrieval_pipeline::{classify_intent, ChatMessage, ChatOptions, Intent};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::search::SourceOut;
use crate::state::EngineState;

const DEFAULT_K: usize = 5;
const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a local file search engine. Answer briefly and plainly.";

#[derive(Deserialize)]
pub struct AskRequest {
    pub query: String,
    pub k: Option<usize>,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceOut>,
    pub intent: Intent,
    pub tool_used: &'static str,
    pub session_id: String,
}

pub async fn ask(
    State(state): State<EngineState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let session_id = state.sessions.create(request.session_id).await?;
    let intent = classify_intent(&request.query);
    state.sessions.append(&session_id, MessageRole::User, &request.query).await?;

    let (answer, sources, tool_used) = match intent {
        Intent::Search => {
            let k = request.k.unwrap_or(DEFAULT_K);
            let hits = state.retriever.retrieve(&request.query, k).await?;
            let answer = if hits.is_empty() {
                "No matching files were found.".to_string()
            } else {
                format!("Found {} matching file(s).", hits.len())
            };
            let sources: Vec<SourceOut> = hits.into_iter().map(SourceOut::from).collect();
            (answer, sources, "search")
        }
        Intent::Read | Intent::List | Intent::Move | Intent::Chat => {
            let history = state.sessions.history(&session_id).await?;
            let mut messages = vec![ChatMessage::system(CHAT_SYSTEM_PROMPT)];
            messages.extend(history.into_iter().map(|m| match m.role {
                MessageRole::User => ChatMessage::user(m.content),
                MessageRole::Assistant => ChatMessage::assistant(m.content),
            }));

            if !state.circuit_breaker.allow() {
                ("the assistant is temporarily unavailable".to_string(), Vec::new(), "chat")
            } else {
                match state.model_client.chat(&state.config.query_model, &messages, ChatOptions::default()).await {
                    Ok(reply) => {
                        state.circuit_breaker.record_success();
                        (reply, Vec::new(), "chat")
                    }
                    Err(err) => {
                        state.circuit_breaker.record_failure();
                        return Err(err.into());
                    }
                }
            }
        }
    };

    state.sessions.append(&session_id, MessageRole::Assistant, &answer).await?;

    Ok(Json(AskResponse {
        answer,
        sources,
        intent,
        tool_used,
        session_id,
    }))
}

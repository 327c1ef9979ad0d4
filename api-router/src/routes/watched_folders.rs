use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::EngineState;

#[derive(Serialize)]
pub struct WatchedFoldersResponse {
    pub folders: Vec<String>,
}

/// `GET /watched_folders`: the current list of watched roots.
pub async fn watched_folders(State(state): State<EngineState>) -> Json<WatchedFoldersResponse> {
    let folders = state.watched_folders.lock().unwrap_or_else(|p| p.into_inner()).clone();
    Json(WatchedFoldersResponse { folders })
}

//! `/add_folder`: indexes an existing directory tree and starts watching it
//! for further changes.

use std::path::PathBuf;

use axum::{extract::State, Json};
use common::error::AppError;
use serde::{Deserialize, Serialize};
use watcher::scan_directory;

use crate::error::ApiError;
use crate::state::EngineState;

#[derive(Deserialize)]
pub struct AddFolderRequest {
    pub path: String,
}

#[derive(Serialize)]
pub struct AddFolderResponse {
    pub status: &'static str,
    pub path: String,
    pub files_indexed: usize,
}

pub async fn add_folder(
    State(state): State<EngineState>,
    Json(request): Json<AddFolderRequest>,
) -> Result<Json<AddFolderResponse>, ApiError> {
    let root = PathBuf::from(&request.path);
    if !root.is_dir() {
        return Err(AppError::NotFound(format!("no such directory: {}", request.path)).into());
    }

    let stats = scan_directory(&state.ctx, &root).await?;

    {
        let mut folders = state.watched_folders.lock().unwrap_or_else(|p| p.into_inner());
        if !folders.iter().any(|f| f == &request.path) {
            folders.push(request.path.clone());
        }
    }

    let handle = watcher::start_watching(
        state.ctx.clone(),
        state.vector_index.clone(),
        vec![root],
        tokio::runtime::Handle::current(),
    )?;
    state.watcher_handles.lock().unwrap_or_else(|p| p.into_inner()).push(handle);

    Ok(Json(AddFolderResponse {
        status: "ok",
        path: request.path,
        files_indexed: stats.files_indexed,
    }))
}

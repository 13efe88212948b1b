//! Watched-folder management.

use std::path::PathBuf;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use kinema_core::folders::AddedFolder;
use kinema_core::types::{FolderRoles, WatchedFolder};
use serde::Deserialize;
use tracing::info;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct AddFolderRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub roles: Option<FolderRoles>,
}

#[derive(Debug, Deserialize)]
pub struct FolderPathQuery {
    pub path: PathBuf,
}

pub async fn list_folders_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<WatchedFolder>>> {
    let folders = state.service().list_folders().await?;
    Ok(Json(folders))
}

/// `201` for a new registration, `200` when the folder was already known.
pub async fn add_folder_handler(
    State(state): State<AppState>,
    Json(request): Json<AddFolderRequest>,
) -> AppResult<(StatusCode, Json<AddedFolder>)> {
    if request.path.as_os_str().is_empty() {
        return Err(AppError::bad_request("path must not be empty"));
    }
    let roles = request.roles.unwrap_or_default();
    let added = state.service().add_folder(&request.path, roles).await?;

    let status = if added.created {
        info!(folder = %added.folder.path.display(), "folder added");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(added)))
}

pub async fn remove_folder_handler(
    State(state): State<AppState>,
    Query(query): Query<FolderPathQuery>,
) -> AppResult<Json<WatchedFolder>> {
    let removed = state.service().remove_folder(&query.path).await?;
    info!(folder = %removed.path.display(), "folder removed");
    Ok(Json(removed))
}

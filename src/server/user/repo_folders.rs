use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::ServerState;
use crate::server::dto::RepoFolderSet;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::{Permission, Repo};

use super::access::require_repo_permission;

async fn load_repo_for(
    state: &ServerState,
    auth: &RequireUser,
    id: &str,
    required: Permission,
) -> Result<Repo, ApiError> {
    let repo = state
        .store
        .get_repo_by_id(id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    require_repo_permission(state.store.as_ref(), &auth.user, &repo, required)?;

    Ok(repo)
}

/// Folders must live in the repo's own namespace.
fn check_folders_in_namespace(
    state: &ServerState,
    repo: &Repo,
    folder_ids: &[String],
) -> Result<(), ApiError> {
    for folder_id in folder_ids {
        let folder = state
            .store
            .get_folder(folder_id)
            .api_err("Failed to load folder")?
            .or_not_found("Folder not found")?;

        if folder.namespace_id != repo.namespace_id {
            return Err(ApiError::bad_request(
                "Folder belongs to a different namespace",
            ));
        }
    }
    Ok(())
}

pub async fn list_repo_folders(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_repo_for(&state, &auth, &id, Permission::REPO_READ).await?;

    let folders = state
        .store
        .list_repo_folders(&repo.id)
        .api_err("Failed to list repo folders")?;

    Ok(Json(ApiResponse::success(folders)))
}

pub async fn add_repo_folders(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RepoFolderSet>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_repo_for(&state, &auth, &id, Permission::REPO_WRITE).await?;
    check_folders_in_namespace(&state, &repo, &req.folder_ids)?;

    for folder_id in &req.folder_ids {
        state
            .store
            .add_repo_folder(&repo.id, folder_id)
            .api_err("Failed to add repo folder")?;
    }

    let folders = state
        .store
        .list_repo_folders(&repo.id)
        .api_err("Failed to list repo folders")?;

    Ok(Json(ApiResponse::success(folders)))
}

pub async fn set_repo_folders(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RepoFolderSet>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_repo_for(&state, &auth, &id, Permission::REPO_WRITE).await?;
    check_folders_in_namespace(&state, &repo, &req.folder_ids)?;

    state
        .store
        .set_repo_folders(&repo.id, &req.folder_ids)
        .api_err("Failed to set repo folders")?;

    let folders = state
        .store
        .list_repo_folders(&repo.id)
        .api_err("Failed to list repo folders")?;

    Ok(Json(ApiResponse::success(folders)))
}

pub async fn remove_repo_folder(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path((id, folder_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = load_repo_for(&state, &auth, &id, Permission::REPO_WRITE).await?;

    let removed = state
        .store
        .remove_repo_folder(&repo.id, &folder_id)
        .api_err("Failed to remove repo folder")?;

    if !removed {
        return Err(ApiError::not_found("Repository is not in that folder"));
    }

    Ok(StatusCode::NO_CONTENT)
}

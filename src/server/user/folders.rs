use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::ServerState;
use crate::server::dto::{FolderCreate, FolderDeleteQuery, FolderListQuery, FolderUpdate};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_folder_name;
use crate::types::{Folder, Permission};

use super::access::{require_namespace_permission, resolve_namespace_id};

pub async fn list_folders(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<FolderListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let ns_id = resolve_namespace_id(store, &auth.user, params.namespace.as_deref())?;
    require_namespace_permission(store, &auth.user, &ns_id, Permission::NAMESPACE_READ)?;

    let cursor = params.cursor.as_deref().unwrap_or("");
    let folders = store
        .list_folders(&ns_id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list folders")?;

    let (folders, next_cursor, has_more) =
        paginate(folders, DEFAULT_PAGE_SIZE as usize, |f| f.name.clone());

    Ok(Json(PaginatedResponse::new(folders, next_cursor, has_more)))
}

pub async fn create_folder(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Json(req): Json<FolderCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let name = req.name.to_lowercase();
    validate_folder_name(&name)?;

    let ns_id = resolve_namespace_id(store, &auth.user, req.namespace.as_deref())?;
    require_namespace_permission(store, &auth.user, &ns_id, Permission::NAMESPACE_WRITE)?;

    if store
        .get_folder_by_name(&ns_id, &name)
        .api_err("Failed to check folder")?
        .is_some()
    {
        return Err(ApiError::conflict("Folder already exists"));
    }

    let folder = Folder {
        id: Uuid::new_v4().to_string(),
        namespace_id: ns_id,
        name,
        color: req.color,
        created_at: Utc::now(),
    };

    store
        .create_folder(&folder)
        .api_err("Failed to create folder")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(folder))))
}

async fn load_folder_for(
    state: &ServerState,
    auth: &RequireUser,
    id: &str,
    required: Permission,
) -> Result<Folder, ApiError> {
    let folder = state
        .store
        .get_folder(id)
        .api_err("Failed to load folder")?
        .or_not_found("Folder not found")?;

    require_namespace_permission(
        state.store.as_ref(),
        &auth.user,
        &folder.namespace_id,
        required,
    )?;

    Ok(folder)
}

pub async fn get_folder(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = load_folder_for(&state, &auth, &id, Permission::NAMESPACE_READ).await?;
    Ok(Json(ApiResponse::success(folder)))
}

pub async fn update_folder(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<FolderUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let mut folder = load_folder_for(&state, &auth, &id, Permission::NAMESPACE_WRITE).await?;
    let store = state.store.as_ref();

    if let Some(name) = req.name.map(|n| n.to_lowercase()) {
        if name != folder.name {
            validate_folder_name(&name)?;
            if store
                .get_folder_by_name(&folder.namespace_id, &name)
                .api_err("Failed to check folder name")?
                .is_some()
            {
                return Err(ApiError::conflict("Folder name already exists"));
            }
            folder.name = name;
        }
    }
    if let Some(color) = req.color {
        folder.color = Some(color);
    }

    store
        .update_folder(&folder)
        .api_err("Failed to update folder")?;

    Ok(Json(ApiResponse::success(folder)))
}

pub async fn delete_folder(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(params): Query<FolderDeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = load_folder_for(&state, &auth, &id, Permission::NAMESPACE_WRITE).await?;
    let store = state.store.as_ref();

    let repo_count = store
        .count_folder_repos(&folder.id)
        .api_err("Failed to count folder repos")?;

    if repo_count > 0 && !params.force.unwrap_or(false) {
        return Err(ApiError::conflict(
            "Folder is not empty; pass force=true to delete anyway",
        ));
    }

    store
        .delete_folder(&folder.id)
        .api_err("Failed to delete folder")?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_folder_repos(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = load_folder_for(&state, &auth, &id, Permission::NAMESPACE_READ).await?;

    let repos = state
        .store
        .list_folder_repos(&folder.id)
        .api_err("Failed to list folder repos")?;

    Ok(Json(ApiResponse::success(repos)))
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::error::Error;
use crate::server::ServerState;
use crate::server::dto::{CursorQuery, NamespaceCreate};
use crate::server::resources::remove_namespace_storage;
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_namespace_name;
use crate::types::Namespace;

pub async fn create_namespace(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Json(req): Json<NamespaceCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.to_lowercase();
    validate_namespace_name(&name)?;

    let ns = Namespace {
        id: Uuid::new_v4().to_string(),
        name,
        created_at: Utc::now(),
        repo_limit: req.repo_limit,
        storage_limit_bytes: req.storage_limit_bytes,
        external_id: req.external_id,
    };

    match state.store.create_namespace(&ns) {
        Ok(()) => Ok((StatusCode::CREATED, Json(ApiResponse::success(ns)))),
        Err(Error::AlreadyExists) => Err(ApiError::conflict("Namespace already exists")),
        Err(e) => {
            tracing::error!("failed to create namespace: {e}");
            Err(ApiError::internal("Failed to create namespace"))
        }
    }
}

pub async fn list_namespaces(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let namespaces = state
        .store
        .list_namespaces(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list namespaces")?;

    let (namespaces, next_cursor, has_more) =
        paginate(namespaces, DEFAULT_PAGE_SIZE as usize, |ns| ns.name.clone());

    Ok(Json(PaginatedResponse::new(
        namespaces,
        next_cursor,
        has_more,
    )))
}

pub async fn get_namespace(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ns = state
        .store
        .get_namespace_by_name(&name.to_lowercase())
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    Ok(Json(ApiResponse::success(ns)))
}

pub async fn delete_namespace(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ns = state
        .store
        .get_namespace_by_name(&name.to_lowercase())
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    let repo_ids: Vec<String> = state
        .store
        .list_repos(&ns.id, "", 0)
        .api_err("Failed to list repos")?
        .into_iter()
        .map(|r| r.id)
        .collect();

    state
        .store
        .delete_namespace(&ns.id)
        .api_err("Failed to delete namespace")?;

    remove_namespace_storage(&state, &ns.id, &repo_ids).await;

    Ok(StatusCode::NO_CONTENT)
}

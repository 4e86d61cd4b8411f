use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::ServerState;
use crate::server::dto::{GrantHolderView, NamespaceUpdate, NamespaceView};
use crate::server::resources::remove_namespace_storage;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::Permission;

use super::access::require_namespace_permission;

/// The caller's current (primary) namespace.
pub async fn current_namespace(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let ns = state
        .store
        .get_namespace(&auth.user.primary_namespace_id)
        .api_err("Failed to load namespace")?
        .ok_or_else(|| ApiError::internal("Primary namespace not found"))?;

    Ok(Json(ApiResponse::success(NamespaceView {
        namespace: ns,
        is_primary: true,
    })))
}

/// Every namespace the caller can see: the primary one, namespaces with a
/// direct grant, and namespaces reachable through per-repo grants.
pub async fn list_namespaces(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = &auth.user;
    let store = state.store.as_ref();
    let mut namespaces = Vec::new();

    let primary = store
        .get_namespace(&user.primary_namespace_id)
        .api_err("Failed to load primary namespace")?
        .ok_or_else(|| ApiError::internal("Primary namespace not found"))?;
    namespaces.push(primary);

    for grant in store
        .list_user_namespace_grants(&user.id)
        .api_err("Failed to list namespace grants")?
    {
        if grant.namespace_id == user.primary_namespace_id {
            continue;
        }
        if let Some(ns) = store
            .get_namespace(&grant.namespace_id)
            .api_err("Failed to load namespace")?
        {
            namespaces.push(ns);
        }
    }

    for grant in store
        .list_user_repo_grants(&user.id)
        .api_err("Failed to list repo grants")?
    {
        let Some(repo) = store
            .get_repo_by_id(&grant.repo_id)
            .api_err("Failed to load repository")?
        else {
            continue;
        };
        if namespaces.iter().any(|ns| ns.id == repo.namespace_id) {
            continue;
        }
        if let Some(ns) = store
            .get_namespace(&repo.namespace_id)
            .api_err("Failed to load namespace")?
        {
            namespaces.push(ns);
        }
    }

    let responses: Vec<NamespaceView> = namespaces
        .into_iter()
        .map(|ns| NamespaceView {
            is_primary: ns.id == user.primary_namespace_id,
            namespace: ns,
        })
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

pub async fn update_namespace(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(req): Json<NamespaceUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let mut ns = store
        .get_namespace_by_name(&name.to_lowercase())
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    require_namespace_permission(store, &auth.user, &ns.id, Permission::NAMESPACE_ADMIN)?;

    if let Some(limit) = req.repo_limit {
        ns.repo_limit = Some(limit);
    }
    if let Some(limit) = req.storage_limit_bytes {
        ns.storage_limit_bytes = Some(limit);
    }

    store
        .update_namespace(&ns)
        .api_err("Failed to update namespace")?;

    Ok(Json(ApiResponse::success(ns)))
}

pub async fn delete_namespace(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let ns = store
        .get_namespace_by_name(&name.to_lowercase())
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    if ns.id == auth.user.primary_namespace_id {
        return Err(ApiError::forbidden("Cannot delete your primary namespace"));
    }

    require_namespace_permission(store, &auth.user, &ns.id, Permission::NAMESPACE_ADMIN)?;

    // Collect repo ids before the cascade eats the rows.
    let repo_ids: Vec<String> = store
        .list_repos(&ns.id, "", 0)
        .api_err("Failed to list repos")?
        .into_iter()
        .map(|r| r.id)
        .collect();

    store
        .delete_namespace(&ns.id)
        .api_err("Failed to delete namespace")?;

    remove_namespace_storage(&state, &ns.id, &repo_ids).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_namespace_grants(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let ns = store
        .get_namespace_by_name(&name.to_lowercase())
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    require_namespace_permission(store, &auth.user, &ns.id, Permission::NAMESPACE_ADMIN)?;

    let responses: Vec<GrantHolderView> = store
        .list_namespace_grants_for_namespace(&ns.id)
        .api_err("Failed to list grants")?
        .into_iter()
        .map(|g| GrantHolderView {
            user_id: g.user_id,
            allow: g.allow_bits.names(),
            deny: g.deny_bits.names(),
        })
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

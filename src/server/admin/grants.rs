use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireAdmin;
use crate::error::Error;
use crate::server::ServerState;
use crate::server::dto::{
    NamespaceGrantUpsert, NamespaceGrantView, RepoGrantUpsert, RepoGrantView,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::{NamespaceGrant, Permission, RepoGrant, User};

fn parse_permissions(perms: &[String]) -> Result<Permission, ApiError> {
    Permission::parse_many(perms)
        .ok_or_else(|| ApiError::bad_request("Invalid permission name"))
}

fn load_user(state: &ServerState, id: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .api_err("Failed to load user")?
        .or_not_found("User not found")
}

fn namespace_grant_response(grant: NamespaceGrant) -> NamespaceGrantView {
    NamespaceGrantView {
        namespace_id: grant.namespace_id,
        allow: grant.allow_bits.names(),
        deny: grant.deny_bits.names(),
    }
}

fn repo_grant_response(grant: RepoGrant) -> RepoGrantView {
    RepoGrantView {
        repo_id: grant.repo_id,
        allow: grant.allow_bits.names(),
        deny: grant.deny_bits.names(),
    }
}

pub async fn create_namespace_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    Json(req): Json<NamespaceGrantUpsert>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &user_id)?;

    let ns = state
        .store
        .get_namespace(&req.namespace_id)
        .api_err("Failed to load namespace")?
        .or_not_found("Namespace not found")?;

    let allow_bits = parse_permissions(&req.allow)?;
    let deny_bits = parse_permissions(&req.deny)?;

    let now = Utc::now();
    let grant = NamespaceGrant {
        user_id: user.id.clone(),
        namespace_id: ns.id,
        allow_bits,
        deny_bits,
        created_at: now,
        updated_at: now,
    };

    match state.store.upsert_namespace_grant(&grant) {
        Ok(()) => {}
        Err(Error::PrimaryNamespaceGrant) => {
            return Err(ApiError::forbidden(
                "Cannot grant access to another user's primary namespace",
            ));
        }
        Err(e) => {
            tracing::error!("failed to create grant: {e}");
            return Err(ApiError::internal("Failed to create grant"));
        }
    }

    let responses: Vec<NamespaceGrantView> = state
        .store
        .list_user_namespace_grants(&user.id)
        .api_err("Failed to list grants")?
        .into_iter()
        .map(namespace_grant_response)
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

pub async fn list_namespace_grants(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &user_id)?;

    let responses: Vec<NamespaceGrantView> = state
        .store
        .list_user_namespace_grants(&user.id)
        .api_err("Failed to list grants")?
        .into_iter()
        .map(namespace_grant_response)
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

#[derive(serde::Deserialize)]
pub struct NamespaceGrantPath {
    id: String,
    ns_id: String,
}

pub async fn get_namespace_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<NamespaceGrantPath>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &path.id)?;

    let grant = state
        .store
        .get_namespace_grant(&user.id, &path.ns_id)
        .api_err("Failed to load grant")?
        .or_not_found("Grant not found")?;

    Ok(Json(ApiResponse::success(namespace_grant_response(grant))))
}

pub async fn delete_namespace_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<NamespaceGrantPath>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &path.id)?;

    let deleted = state
        .store
        .delete_namespace_grant(&user.id, &path.ns_id)
        .api_err("Failed to delete grant")?;

    if !deleted {
        return Err(ApiError::not_found("Grant not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_repo_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    Json(req): Json<RepoGrantUpsert>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &user_id)?;

    let repo = state
        .store
        .get_repo_by_id(&req.repo_id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    let allow_bits = parse_permissions(&req.allow)?;
    let deny_bits = parse_permissions(&req.deny)?;

    let now = Utc::now();
    let grant = RepoGrant {
        user_id: user.id.clone(),
        repo_id: repo.id,
        allow_bits,
        deny_bits,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .upsert_repo_grant(&grant)
        .api_err("Failed to create grant")?;

    let responses: Vec<RepoGrantView> = state
        .store
        .list_user_repo_grants(&user.id)
        .api_err("Failed to list grants")?
        .into_iter()
        .map(repo_grant_response)
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

pub async fn list_repo_grants(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &user_id)?;

    let responses: Vec<RepoGrantView> = state
        .store
        .list_user_repo_grants(&user.id)
        .api_err("Failed to list grants")?
        .into_iter()
        .map(repo_grant_response)
        .collect();

    Ok(Json(ApiResponse::success(responses)))
}

#[derive(serde::Deserialize)]
pub struct RepoGrantPath {
    id: String,
    repo_id: String,
}

pub async fn get_repo_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<RepoGrantPath>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &path.id)?;

    let grant = state
        .store
        .get_repo_grant(&user.id, &path.repo_id)
        .api_err("Failed to load grant")?
        .or_not_found("Grant not found")?;

    Ok(Json(ApiResponse::success(repo_grant_response(grant))))
}

pub async fn delete_repo_grant(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<RepoGrantPath>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &path.id)?;

    let deleted = state
        .store
        .delete_repo_grant(&user.id, &path.repo_id)
        .api_err("Failed to delete grant")?;

    if !deleted {
        return Err(ApiError::not_found("Grant not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

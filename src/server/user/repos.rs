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
use crate::server::dto::{RepoCreate, RepoListQuery, RepoUpdate};
use crate::server::resources::{
    create_repo_with_storage, delete_repo_with_storage, rename_repo_with_storage,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_repo_name;
use crate::types::{Permission, Repo};

use super::access::{
    can_access_namespace, check_namespace_permission, require_namespace_permission,
    require_repo_permission, resolve_namespace_id,
};

pub async fn list_repos(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RepoListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = &auth.user;
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let repos = if let Some(ns_name) = params.namespace.as_deref() {
        let ns_id = resolve_namespace_id(store, user, Some(ns_name))?;

        if !can_access_namespace(store, user, &ns_id)? {
            return Err(ApiError::forbidden("No access to this namespace"));
        }

        if check_namespace_permission(store, user, &ns_id, Permission::NAMESPACE_READ)? {
            store
                .list_repos(&ns_id, cursor, DEFAULT_PAGE_SIZE + 1)
                .api_err("Failed to list repos")?
        } else {
            // No namespace-level read: show only the repos granted directly.
            store
                .list_user_repos_with_grants(&user.id, &ns_id)
                .api_err("Failed to list repos")?
        }
    } else {
        reachable_repos(store, user, cursor)?
    };

    let (repos, next_cursor, has_more) =
        paginate(repos, DEFAULT_PAGE_SIZE as usize, |r| r.name.clone());

    Ok(Json(PaginatedResponse::new(repos, next_cursor, has_more)))
}

/// Merges everything the user can see into one name-sorted list: the primary
/// namespace, namespaces with an effective namespace:read grant, and repos
/// granted individually.
fn reachable_repos(
    store: &dyn crate::store::Store,
    user: &crate::types::User,
    cursor: &str,
) -> Result<Vec<Repo>, ApiError> {
    let mut merged = store
        .list_repos(&user.primary_namespace_id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list repos")?;

    for grant in store
        .list_user_namespace_grants(&user.id)
        .api_err("Failed to list namespace grants")?
    {
        if grant.namespace_id == user.primary_namespace_id {
            continue;
        }
        let effective = grant.allow_bits.expand_implied().remove(grant.deny_bits);
        if effective.contains(Permission::NAMESPACE_READ) {
            merged.extend(
                store
                    .list_repos(&grant.namespace_id, cursor, DEFAULT_PAGE_SIZE + 1)
                    .api_err("Failed to list repos")?,
            );
        }
    }

    for grant in store
        .list_user_repo_grants(&user.id)
        .api_err("Failed to list repo grants")?
    {
        let repo = store
            .get_repo_by_id(&grant.repo_id)
            .api_err("Failed to load repository")?;
        if let Some(repo) = repo {
            if !merged.iter().any(|r| r.id == repo.id) {
                merged.push(repo);
            }
        }
    }

    merged.sort_by_key(|r| r.name.clone());
    Ok(merged)
}

pub async fn create_repo(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Json(req): Json<RepoCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let user = &auth.user;
    let store = state.store.as_ref();

    let name = req.name.to_lowercase();
    validate_repo_name(&name)?;

    let ns_id = resolve_namespace_id(store, user, req.namespace.as_deref())?;

    require_namespace_permission(store, user, &ns_id, Permission::NAMESPACE_WRITE)?;

    if store
        .get_repo(&ns_id, &name)
        .api_err("Failed to check repo")?
        .is_some()
    {
        return Err(ApiError::conflict("Repository already exists"));
    }

    let now = Utc::now();
    let repo = Repo {
        id: Uuid::new_v4().to_string(),
        namespace_id: ns_id,
        name,
        description: req.description,
        public: req.public,
        size_bytes: 0,
        last_push_at: None,
        created_at: now,
        updated_at: now,
    };

    create_repo_with_storage(&state, &repo).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(repo))))
}

pub async fn get_repo(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let repo = store
        .get_repo_by_id(&id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    require_repo_permission(store, &auth.user, &repo, Permission::REPO_READ)?;

    Ok(Json(ApiResponse::success(repo)))
}

pub async fn update_repo(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RepoUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let mut repo = store
        .get_repo_by_id(&id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    require_repo_permission(store, &auth.user, &repo, Permission::REPO_ADMIN)?;

    // A rename is validated and checked for collisions before anything
    // touches the disk; then the directory moves first, then the row.
    if let Some(name) = req.name.map(|n| n.to_lowercase()) {
        if name != repo.name {
            validate_repo_name(&name)?;
            if store
                .get_repo(&repo.namespace_id, &name)
                .api_err("Failed to check repo name")?
                .is_some()
            {
                return Err(ApiError::conflict("Repository name already exists"));
            }

            rename_repo_with_storage(&state, &repo, &name).await?;
            repo.name = name;
        }
    }

    let mut metadata_changed = false;
    if let Some(description) = req.description {
        repo.description = Some(description);
        metadata_changed = true;
    }
    if let Some(public) = req.public {
        repo.public = public;
        metadata_changed = true;
    }

    if metadata_changed {
        store.update_repo(&repo).api_err("Failed to update repo")?;
    }

    Ok(Json(ApiResponse::success(repo)))
}

pub async fn delete_repo(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();

    let repo = store
        .get_repo_by_id(&id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    require_repo_permission(store, &auth.user, &repo, Permission::REPO_ADMIN)?;

    delete_repo_with_storage(&state, &repo).await?;

    Ok(StatusCode::NO_CONTENT)
}

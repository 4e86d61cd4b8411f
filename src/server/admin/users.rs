use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAdmin, TokenGenerator, provision};
use crate::server::ServerState;
use crate::server::dto::{CursorQuery, MintedTokenView, TokenCreate, TokenView, UserCreate};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_namespace_name;
use crate::types::{Namespace, NamespaceGrant, Permission, User};

use super::tokens::token_to_response;

/// Creates a user owning the named namespace (created on the fly when it
/// does not exist yet) and seeds the default grant on it.
pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Json(req): Json<UserCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.as_ref();
    let name = req.namespace_name.to_lowercase();
    validate_namespace_name(&name)?;

    let ns = match store
        .get_namespace_by_name(&name)
        .api_err("Failed to check namespace")?
    {
        Some(ns) => ns,
        None => {
            let ns = Namespace {
                id: Uuid::new_v4().to_string(),
                name,
                created_at: Utc::now(),
                repo_limit: None,
                storage_limit_bytes: None,
                external_id: None,
            };
            store
                .create_namespace(&ns)
                .api_err("Failed to create namespace")?;
            ns
        }
    };

    if store
        .get_user_by_primary_namespace_id(&ns.id)
        .api_err("Failed to check existing user")?
        .is_some()
    {
        return Err(ApiError::conflict("User already exists for this namespace"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        primary_namespace_id: ns.id.clone(),
        created_at: now,
        updated_at: now,
    };

    store.create_user(&user).api_err("Failed to create user")?;

    let grant = NamespaceGrant {
        user_id: user.id.clone(),
        namespace_id: ns.id,
        allow_bits: Permission::primary_namespace_defaults(),
        deny_bits: Permission::empty(),
        created_at: now,
        updated_at: now,
    };

    store
        .upsert_namespace_grant(&grant)
        .api_err("Failed to create grant")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list users")?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.id.clone());

    Ok(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

fn load_user(state: &ServerState, id: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .api_err("Failed to load user")?
        .or_not_found("User not found")
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &id)?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &id)?;

    state
        .store
        .delete_user(&user.id)
        .api_err("Failed to delete user")?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_user_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &id)?;

    let tokens = state
        .store
        .list_user_tokens(&user.id)
        .api_err("Failed to list user tokens")?;

    let responses: Vec<TokenView> = tokens
        .into_iter()
        .map(|t| token_to_response(&state, t))
        .collect::<Result<_, _>>()?;

    Ok(Json(ApiResponse::success(responses)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<TokenCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &id)?;

    if let Some(seconds) = req.expires_in_seconds {
        if seconds < 0 {
            return Err(ApiError::bad_request(
                "expires_in_seconds cannot be negative",
            ));
        }
    }

    let expires_at = req.expires_in_seconds.map(|s| Utc::now() + Duration::seconds(s));

    let generator = TokenGenerator::new();
    let (token, raw_token) = provision::generate_user_token(
        state.store.as_ref(),
        &generator,
        &user.id,
        req.name,
        expires_at,
    )
    .map_err(ApiError::from)?;

    let metadata = token_to_response(&state, token)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(MintedTokenView {
            token: raw_token,
            metadata,
        })),
    ))
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::ServerState;
use crate::server::dto::{CursorQuery, NamespaceGrantView, RepoGrantView, TokenView};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::Token;

/// Denormalises a token with its user's grants for display. The hash and
/// lookup never leave the server.
pub fn token_to_response(state: &ServerState, token: Token) -> Result<TokenView, ApiError> {
    let (namespace_grants, repo_grants) = match &token.user_id {
        Some(user_id) => {
            let ns = state
                .store
                .list_user_namespace_grants(user_id)
                .api_err("Failed to list namespace grants")?
                .into_iter()
                .map(|g| NamespaceGrantView {
                    namespace_id: g.namespace_id,
                    allow: g.allow_bits.names(),
                    deny: g.deny_bits.names(),
                })
                .collect();
            let repo = state
                .store
                .list_user_repo_grants(user_id)
                .api_err("Failed to list repo grants")?
                .into_iter()
                .map(|g| RepoGrantView {
                    repo_id: g.repo_id,
                    allow: g.allow_bits.names(),
                    deny: g.deny_bits.names(),
                })
                .collect();
            (ns, repo)
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(TokenView {
        id: token.id,
        name: token.name,
        is_admin: token.is_admin,
        user_id: token.user_id,
        created_at: token.created_at,
        expires_at: token.expires_at,
        last_used_at: token.last_used_at,
        namespace_grants,
        repo_grants,
    })
}

pub async fn list_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let tokens = state
        .store
        .list_tokens(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list tokens")?;

    let (tokens, next_cursor, has_more) =
        paginate(tokens, DEFAULT_PAGE_SIZE as usize, |t| t.id.clone());

    let responses: Vec<TokenView> = tokens
        .into_iter()
        .map(|t| token_to_response(&state, t))
        .collect::<Result<_, _>>()?;

    Ok(Json(PaginatedResponse::new(responses, next_cursor, has_more)))
}

pub async fn get_token(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .store
        .get_token_by_id(&id)
        .api_err("Failed to load token")?
        .or_not_found("Token not found")?;

    Ok(Json(ApiResponse::success(token_to_response(&state, token)?)))
}

pub async fn delete_token(
    _admin: RequireAdmin,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .store
        .delete_token(&id)
        .api_err("Failed to delete token")?;

    if !deleted {
        return Err(ApiError::not_found("Token not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

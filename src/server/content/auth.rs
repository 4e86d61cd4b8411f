use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::auth::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::ServerState;
use crate::server::response::ApiError;
use crate::server::user::access::check_repo_permission;
use crate::types::{Permission, Repo, Token, User};

/// Auth extractor for endpoints that allow anonymous reads of public repos.
/// Absent credentials are fine; present credentials must be valid, and admin
/// tokens are always refused (admins manage the platform, not the data).
pub struct OptionalAuth {
    pub user: Option<User>,
    #[allow(dead_code)]
    pub token: Option<Token>,
}

#[derive(Debug)]
pub enum OptionalAuthError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    AdminTokenNotAllowed,
    InternalError,
}

impl OptionalAuthError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use StatusCode as S;
        match self {
            Self::InvalidScheme => (S::UNAUTHORIZED, "Invalid authorization scheme"),
            Self::InvalidToken => (S::UNAUTHORIZED, "Invalid token"),
            Self::TokenExpired => (S::UNAUTHORIZED, "Token expired"),
            Self::AdminTokenNotAllowed => {
                (S::FORBIDDEN, "Admin token cannot be used for this operation")
            }
            Self::InternalError => (S::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for OptionalAuthError {
    fn into_response(self) -> Response {
        let (status, message) = self.parts();

        let body = json!({ "data": null, "error": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"ephemeral\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<ServerState>> for OptionalAuth {
    type Rejection = OptionalAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let raw_token = match extract_token_from_header(auth_header, false) {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Ok(OptionalAuth {
                    user: None,
                    token: None,
                });
            }
            Err(TokenValidationError::InvalidScheme) => {
                return Err(OptionalAuthError::InvalidScheme);
            }
            Err(_) => return Err(OptionalAuthError::InvalidToken),
        };

        let validated =
            validate_token(state.store.as_ref(), &raw_token, false).map_err(|e| match e {
                TokenValidationError::InvalidScheme => OptionalAuthError::InvalidScheme,
                TokenValidationError::InvalidToken => OptionalAuthError::InvalidToken,
                TokenValidationError::TokenExpired => OptionalAuthError::TokenExpired,
                TokenValidationError::AdminTokenNotAllowed => {
                    OptionalAuthError::AdminTokenNotAllowed
                }
                TokenValidationError::InternalError => OptionalAuthError::InternalError,
            })?;

        Ok(OptionalAuth {
            user: validated.user,
            token: Some(validated.token),
        })
    }
}

/// Read access to repo content: public repos are open, private ones require
/// `repo:read` from an authenticated user.
pub fn check_content_access(
    state: &Arc<ServerState>,
    auth: &OptionalAuth,
    repo: &Repo,
) -> Result<(), ApiError> {
    if repo.public {
        return Ok(());
    }

    let user = auth
        .user
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !check_repo_permission(state.store.as_ref(), user, repo, Permission::REPO_READ)? {
        return Err(ApiError::forbidden("Access denied"));
    }

    Ok(())
}

use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::ServerState;
use crate::types::{Token, User};

/// Extractor requiring a valid admin token.
pub struct RequireAdmin(pub Token);

/// Extractor requiring a valid user-bound (non-admin) token.
pub struct RequireUser {
    pub token: Token,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    NotUser,
    InternalError,
}

impl From<TokenValidationError> for AuthError {
    fn from(err: TokenValidationError) -> Self {
        match err {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            TokenValidationError::TokenExpired => AuthError::TokenExpired,
            TokenValidationError::AdminTokenNotAllowed => AuthError::NotUser,
            TokenValidationError::InternalError => AuthError::InternalError,
        }
    }
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use StatusCode as S;
        match self {
            Self::MissingAuth => (S::UNAUTHORIZED, "Authentication required"),
            Self::InvalidScheme => (S::UNAUTHORIZED, "Invalid authorization scheme"),
            Self::InvalidToken => (S::UNAUTHORIZED, "Invalid token"),
            Self::TokenExpired => (S::UNAUTHORIZED, "Token expired"),
            Self::NotAdmin => (S::FORBIDDEN, "Admin access required"),
            Self::NotUser => (S::FORBIDDEN, "User token required for this operation"),
            Self::InternalError => (S::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for AuthError {
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

fn authenticate(parts: &Parts, state: &Arc<ServerState>) -> Result<super::ValidatedToken, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_token_from_header(auth_header, false)?
        .ok_or(AuthError::MissingAuth)?;

    Ok(validate_token(state.store.as_ref(), &raw_token, true)?)
}

impl FromRequestParts<Arc<ServerState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = authenticate(parts, state)?;

        if !validated.token.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(validated.token))
    }
}

impl FromRequestParts<Arc<ServerState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = authenticate(parts, state)?;

        if validated.token.is_admin {
            return Err(AuthError::NotUser);
        }

        let user = validated.user.ok_or(AuthError::NotUser)?;

        Ok(RequireUser {
            token: validated.token,
            user,
        })
    }
}

use chrono::Utc;

use super::token::{TokenGenerator, parse_token};
use crate::error::Error;
use crate::store::Store;
use crate::types::{Token, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    AdminTokenNotAllowed,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: Option<User>,
}

/// Decodes a `Basic` header into a token.
///
/// The JSON API expects the username `x-token`; Git clients send whatever
/// username the remote URL carried, so the Git surface accepts any username
/// and treats the password as the token.
pub fn basic_auth_token(header: &str, any_username: bool) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if !any_username && username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Pulls a raw token out of an `Authorization` header value.
///
/// Returns `Ok(None)` when no header is present, so callers can decide
/// whether anonymous access is acceptable.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
    any_basic_username: bool,
) -> Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            Ok(header.strip_prefix("Bearer ").map(str::to_string))
        }
        Some(header) if header.starts_with("Basic ") => basic_auth_token(header, any_basic_username)
            .ok_or(TokenValidationError::InvalidToken)
            .map(Some),
        Some(_) => Err(TokenValidationError::InvalidScheme),
        None => Ok(None),
    }
}

/// Validates a raw wire token: parse, O(1) lookup, Argon2id verify, expiry.
/// Stamps `last_used_at` fire-and-forget on success.
pub fn validate_token(
    store: &dyn Store,
    raw_token: &str,
    allow_admin: bool,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    match generator.verify(raw_token, &token.token_hash) {
        Ok(()) => {}
        Err(Error::HashMismatch) => return Err(TokenValidationError::InvalidToken),
        Err(_) => return Err(TokenValidationError::InternalError),
    }

    if token.expires_at.is_some_and(|t| t < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    if !allow_admin && token.is_admin {
        return Err(TokenValidationError::AdminTokenNotAllowed);
    }

    let user = match &token.user_id {
        Some(user_id) => store
            .get_user(user_id)
            .map_err(|_| TokenValidationError::InternalError)?,
        None => None,
    };

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

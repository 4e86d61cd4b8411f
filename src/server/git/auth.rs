use std::sync::Arc;

use axum::http::HeaderMap;

use crate::auth::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::ServerState;
use crate::server::user::access::{check_namespace_permission, check_repo_permission};
use crate::types::{Namespace, Permission, Repo, Token, User};

pub struct GitAuth {
    pub user: Option<User>,
    #[allow(dead_code)]
    pub token: Option<Token>,
}

#[derive(Debug)]
pub enum GitAuthError {
    InvalidCredentials,
    TokenExpired,
    AdminTokenNotAllowed,
    AuthRequired,
    NamespaceNotFound,
    RepoNotFound,
    PermissionDenied,
    InvalidRepoName,
    InternalError,
}

impl GitAuthError {
    /// Status and client message, together so they can never drift apart.
    pub fn parts(&self) -> (axum::http::StatusCode, &'static str) {
        use axum::http::StatusCode as S;
        match self {
            Self::InvalidCredentials => (S::UNAUTHORIZED, "Invalid credentials"),
            Self::TokenExpired => (S::UNAUTHORIZED, "Token expired"),
            Self::AuthRequired => (S::UNAUTHORIZED, "Authentication required"),
            Self::AdminTokenNotAllowed => {
                (S::FORBIDDEN, "Admin token cannot be used for git operations")
            }
            Self::PermissionDenied => (S::FORBIDDEN, "Permission denied"),
            Self::NamespaceNotFound => (S::NOT_FOUND, "Namespace not found"),
            Self::RepoNotFound => (S::NOT_FOUND, "Repository not found"),
            Self::InvalidRepoName => (S::BAD_REQUEST, "Invalid repository name"),
            Self::InternalError => (S::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        self.parts().0
    }

    pub fn message(&self) -> &'static str {
        self.parts().1
    }

    /// 401s carry a `WWW-Authenticate` challenge so git prompts for creds.
    pub fn requires_auth_header(&self) -> bool {
        self.status_code() == axum::http::StatusCode::UNAUTHORIZED
    }
}

/// Credential extraction for the Git wire surface: Bearer, or Basic with any
/// username (git sends whatever the remote URL carried). Absent credentials
/// are not an error here; public reads allow anonymous access.
pub fn extract_git_auth(
    headers: &HeaderMap,
    state: &Arc<ServerState>,
) -> Result<GitAuth, GitAuthError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = match extract_token_from_header(auth_header, true) {
        Ok(Some(token)) => token,
        Ok(None) => {
            return Ok(GitAuth {
                user: None,
                token: None,
            });
        }
        Err(_) => return Err(GitAuthError::InvalidCredentials),
    };

    let validated =
        validate_token(state.store.as_ref(), &raw_token, false).map_err(|e| match e {
            TokenValidationError::InvalidScheme | TokenValidationError::InvalidToken => {
                GitAuthError::InvalidCredentials
            }
            TokenValidationError::TokenExpired => GitAuthError::TokenExpired,
            TokenValidationError::AdminTokenNotAllowed => GitAuthError::AdminTokenNotAllowed,
            TokenValidationError::InternalError => GitAuthError::InternalError,
        })?;

    Ok(GitAuth {
        user: validated.user,
        token: Some(validated.token),
    })
}

/// Authorisation for a Git or LFS operation against a repo (or, for pushes
/// that will auto-create, against its namespace).
pub fn check_git_access(
    state: &Arc<ServerState>,
    git_auth: &GitAuth,
    namespace: &Namespace,
    repo: Option<&Repo>,
    is_write: bool,
) -> Result<(), GitAuthError> {
    let is_public_read = !is_write && repo.is_some_and(|r| r.public);

    let user = match &git_auth.user {
        Some(u) => u,
        None if is_public_read => return Ok(()),
        None => return Err(GitAuthError::AuthRequired),
    };

    let has_permission = match (repo, is_write) {
        (Some(r), true) => {
            check_repo_permission(state.store.as_ref(), user, r, Permission::REPO_WRITE)
        }
        (Some(r), false) => {
            if r.public {
                return Ok(());
            }
            check_repo_permission(state.store.as_ref(), user, r, Permission::REPO_READ)
        }
        // Auto-create path: pushing into a namespace without the repo row.
        (None, true) => check_namespace_permission(
            state.store.as_ref(),
            user,
            &namespace.id,
            Permission::NAMESPACE_WRITE,
        ),
        (None, false) => return Err(GitAuthError::RepoNotFound),
    };

    if !has_permission.map_err(|_| GitAuthError::InternalError)? {
        return Err(GitAuthError::PermissionDenied);
    }

    Ok(())
}

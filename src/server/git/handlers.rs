use std::path::PathBuf;
use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};
use uuid::Uuid;

use super::auth::{GitAuth, GitAuthError, check_git_access, extract_git_auth};
use super::process::{
    GIT_SERVICE_TIMEOUT, GitService, advertise_refs, init_bare_repo, pkt_line_header,
    repo_disk_size, spawn_service,
};
use crate::error::Error;
use crate::server::ServerState;
use crate::store::paths;
use crate::types::{Namespace, Repo};

#[derive(Deserialize)]
pub struct InfoRefsQuery {
    service: Option<String>,
}

#[derive(Deserialize)]
pub struct GitPathParams {
    namespace: String,
    repo: String,
}

pub struct GitContext {
    pub git_auth: GitAuth,
    pub namespace: Namespace,
    pub repo: Option<Repo>,
    pub repo_name: String,
}

pub fn git_error_response(err: GitAuthError) -> Response {
    let mut response = (err.status_code(), err.message()).into_response();

    if err.requires_auth_header() {
        response.headers_mut().insert(
            "WWW-Authenticate",
            "Basic realm=\"ephemeral\"".parse().unwrap(),
        );
    }

    response
}

pub fn strip_git_suffix(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

/// Resolves the URL's `<namespace>/<repo>.git` pair against the catalogue
/// and validates credentials (without yet authorising the operation).
pub fn resolve_git_context(
    state: &Arc<ServerState>,
    headers: &HeaderMap,
    namespace: &str,
    repo: &str,
) -> Result<GitContext, GitAuthError> {
    let repo_name = strip_git_suffix(repo).to_lowercase();
    paths::validate_name(&repo_name).map_err(|_| GitAuthError::InvalidRepoName)?;

    let git_auth = extract_git_auth(headers, state)?;

    let namespace = state
        .store
        .get_namespace_by_name(namespace)
        .map_err(|_| GitAuthError::InternalError)?
        .ok_or(GitAuthError::NamespaceNotFound)?;

    let repo = state
        .store
        .get_repo(&namespace.id, &repo_name)
        .map_err(|_| GitAuthError::InternalError)?;

    Ok(GitContext {
        git_auth,
        namespace,
        repo,
        repo_name,
    })
}

fn resolve_repo_dir(state: &ServerState, namespace_id: &str, repo_name: &str) -> Result<PathBuf, Response> {
    paths::repo_dir(&state.data_dir, namespace_id, repo_name)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid repository path").into_response())
}

/// Ensures the repo row and bare directory exist for an incoming push.
/// A loser of the row-insert race recovers the winner's row; a failed disk
/// init rolls our own row back.
async fn ensure_repo_for_push(
    state: &Arc<ServerState>,
    namespace: &Namespace,
    repo_name: &str,
    existing: Option<Repo>,
) -> Result<Repo, Response> {
    let mut created = false;

    let repo = match existing {
        Some(r) => r,
        None => {
            let now = Utc::now();
            let repo = Repo {
                id: Uuid::new_v4().to_string(),
                namespace_id: namespace.id.clone(),
                name: repo_name.to_string(),
                description: None,
                public: false,
                size_bytes: 0,
                last_push_at: None,
                created_at: now,
                updated_at: now,
            };

            match state.store.create_repo(&repo) {
                Ok(()) => {
                    created = true;
                    repo
                }
                Err(Error::AlreadyExists) => state
                    .store
                    .get_repo(&namespace.id, repo_name)
                    .ok()
                    .flatten()
                    .ok_or_else(|| {
                        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create repository")
                            .into_response()
                    })?,
                Err(e) => {
                    warn!("failed to create repo row: {e}");
                    return Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to create repository",
                    )
                        .into_response());
                }
            }
        }
    };

    let path = resolve_repo_dir(state, &namespace.id, repo_name)?;
    if !path.exists() {
        if let Err(e) = init_bare_repo(&path).await {
            warn!("failed to init bare repo: {e}");
            if created {
                if let Err(db_err) = state.store.delete_repo(&repo.id) {
                    tracing::error!(
                        "CRITICAL: repo row {} has no backing directory and rollback failed: {db_err}",
                        repo.id
                    );
                }
            }
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to initialize repository",
            )
                .into_response());
        }
    }

    Ok(repo)
}

pub async fn info_refs(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<GitPathParams>,
    Query(query): Query<InfoRefsQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(service) = query.service.as_deref().and_then(GitService::from_query) else {
        return (StatusCode::BAD_REQUEST, "Invalid service").into_response();
    };

    let ctx = match resolve_git_context(&state, &headers, &params.namespace, &params.repo) {
        Ok(ctx) => ctx,
        Err(e) => return git_error_response(e),
    };

    let is_write = service.is_write();

    if let Err(e) = check_git_access(
        &state,
        &ctx.git_auth,
        &ctx.namespace,
        ctx.repo.as_ref(),
        is_write,
    ) {
        return git_error_response(e);
    }

    if is_write {
        if let Err(resp) =
            ensure_repo_for_push(&state, &ctx.namespace, &ctx.repo_name, ctx.repo).await
        {
            return resp;
        }
    } else if ctx.repo.is_none() {
        return git_error_response(GitAuthError::RepoNotFound);
    }

    let path = match resolve_repo_dir(&state, &ctx.namespace.id, &ctx.repo_name) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if !path.exists() {
        return git_error_response(GitAuthError::RepoNotFound);
    }

    let advertisement = match advertise_refs(&path, service).await {
        Ok(out) => out,
        Err(e) => {
            warn!("ref advertisement failed: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    let mut body = pkt_line_header(service);
    body.extend_from_slice(&advertisement);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.advertisement_content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub async fn upload_pack(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<GitPathParams>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let ctx = match resolve_git_context(&state, &headers, &params.namespace, &params.repo) {
        Ok(ctx) => ctx,
        Err(e) => return git_error_response(e),
    };

    let Some(repo) = ctx.repo else {
        return git_error_response(GitAuthError::RepoNotFound);
    };

    if let Err(e) = check_git_access(&state, &ctx.git_auth, &ctx.namespace, Some(&repo), false) {
        return git_error_response(e);
    }

    let path = match resolve_repo_dir(&state, &ctx.namespace.id, &ctx.repo_name) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if !path.exists() {
        return git_error_response(GitAuthError::RepoNotFound);
    }

    serve_pack_service(&state, &path, GitService::UploadPack, &headers, body, None)
}

pub async fn receive_pack(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<GitPathParams>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let ctx = match resolve_git_context(&state, &headers, &params.namespace, &params.repo) {
        Ok(ctx) => ctx,
        Err(e) => return git_error_response(e),
    };

    if let Err(e) = check_git_access(
        &state,
        &ctx.git_auth,
        &ctx.namespace,
        ctx.repo.as_ref(),
        true,
    ) {
        return git_error_response(e);
    }

    let repo = match ensure_repo_for_push(&state, &ctx.namespace, &ctx.repo_name, ctx.repo).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let path = match resolve_repo_dir(&state, &ctx.namespace.id, &ctx.repo_name) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    serve_pack_service(
        &state,
        &path,
        GitService::ReceivePack,
        &headers,
        body,
        Some(repo),
    )
}

/// Wraps the request body in an async reader, decompressing inline when the
/// client sent `Content-Encoding: gzip`.
fn request_body_reader(headers: &HeaderMap, body: Body) -> Box<dyn AsyncRead + Send + Unpin> {
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);

    let is_gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    if is_gzip {
        Box::new(GzipDecoder::new(reader))
    } else {
        Box::new(reader)
    }
}

/// Splices the request into the service child and the child back into the
/// response, without buffering either direction: clones can be multi-GB.
///
/// The child is waited on (and on timeout killed) in a detached task; for
/// receive-pack that task also runs the post-push bookkeeping once the
/// child has exited cleanly.
fn serve_pack_service(
    state: &Arc<ServerState>,
    repo_path: &std::path::Path,
    service: GitService,
    headers: &HeaderMap,
    body: Body,
    pushed_repo: Option<Repo>,
) -> Response {
    let mut child = match spawn_service(repo_path, service, false) {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to spawn {}: {e}", service.command_name());
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    let Some(mut stdin) = child.stdin.take() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
    };
    let Some(stdout) = child.stdout.take() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
    };
    let stderr = child.stderr.take();

    let mut reader = request_body_reader(headers, body);
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut reader, &mut stdin).await {
            debug!("request body pipe closed early: {e}");
        }
        let _ = stdin.shutdown().await;
    });

    // Drain stderr so a chatty child can't block on a full pipe.
    if let Some(mut stderr) = stderr {
        tokio::spawn(async move {
            let mut buf = String::new();
            if stderr.read_to_string(&mut buf).await.is_ok() && !buf.is_empty() {
                debug!("{} stderr: {}", service.command_name(), buf.trim_end());
            }
        });
    }

    let reaper_state = state.clone();
    let reaper_path = repo_path.to_path_buf();
    tokio::spawn(async move {
        match tokio::time::timeout(GIT_SERVICE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    warn!("{} exited with {status}", service.command_name());
                } else if let Some(repo) = pushed_repo {
                    post_push_bookkeeping(&reaper_state, &repo, &reaper_path).await;
                }
            }
            Ok(Err(e)) => warn!("failed to wait for {}: {e}", service.command_name()),
            Err(_) => {
                warn!("{} timed out, killing", service.command_name());
                let _ = child.kill().await;
            }
        }
    });

    let stream = ReaderStream::new(stdout);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.result_content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// After a successful receive-pack: stamp the push time and recompute the
/// repository's on-disk size. Neither failure affects the finished push.
async fn post_push_bookkeeping(state: &Arc<ServerState>, repo: &Repo, repo_path: &std::path::Path) {
    if let Err(e) = state.store.update_repo_last_push(&repo.id) {
        warn!("failed to update last_push_at for {}: {e}", repo.id);
    }

    match repo_disk_size(repo_path).await {
        Ok(size) => {
            if let Err(e) = state.store.update_repo_size(&repo.id, size) {
                warn!("failed to update repo size for {}: {e}", repo.id);
            }
        }
        Err(e) => warn!("failed to compute repo size for {}: {e}", repo.id),
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::warn;

use super::dto::{
    Action, BatchObject, BatchRequest, BatchResponse, LfsErrorBody, ObjectSpec, VerifyRequest,
};
use crate::lfs::{LfsStorage, LfsStorageError, is_valid_oid};
use crate::server::ServerState;
use crate::server::git::auth::{GitAuthError, check_git_access, extract_git_auth};
use crate::server::git::handlers::strip_git_suffix;
use crate::types::{LfsObject, Repo};

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";
const ACTION_EXPIRY_SECS: i32 = 3600;

#[derive(serde::Deserialize)]
pub struct LfsPathParams {
    pub namespace: String,
    pub repo: String,
}

#[derive(serde::Deserialize)]
pub struct LfsObjectPathParams {
    pub namespace: String,
    pub repo: String,
    pub oid: String,
}

/// A resolved, authorised LFS request target.
struct LfsContext {
    repo: Repo,
}

fn lfs_json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    let json = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, LFS_MEDIA_TYPE)
        .body(Body::from(json))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn lfs_error(status: StatusCode, message: &str) -> Response {
    lfs_json_response(
        status,
        &LfsErrorBody {
            message: message.to_string(),
        },
    )
}

fn lfs_auth_error(err: GitAuthError) -> Response {
    let mut response = lfs_error(err.status_code(), err.message());

    if err.requires_auth_header() {
        response.headers_mut().insert(
            "WWW-Authenticate",
            "Basic realm=\"Git LFS\"".parse().unwrap(),
        );
    }

    response
}

/// Resolves the repo and authorises the operation in one step: every LFS
/// endpoint needs both, and admin tokens are rejected for all of them.
fn authorize_lfs(
    state: &Arc<ServerState>,
    headers: &HeaderMap,
    namespace: &str,
    repo: &str,
    is_write: bool,
) -> Result<LfsContext, Response> {
    let resolved = (|| {
        let repo_name = strip_git_suffix(repo).to_lowercase();

        let git_auth = extract_git_auth(headers, state)?;

        let namespace = state
            .store
            .get_namespace_by_name(namespace)
            .map_err(|_| GitAuthError::InternalError)?
            .ok_or(GitAuthError::NamespaceNotFound)?;

        let repo = state
            .store
            .get_repo(&namespace.id, &repo_name)
            .map_err(|_| GitAuthError::InternalError)?
            .ok_or(GitAuthError::RepoNotFound)?;

        check_git_access(state, &git_auth, &namespace, Some(&repo), is_write)?;

        Ok(LfsContext { repo })
    })();

    resolved.map_err(lfs_auth_error)
}

fn base_url(state: &ServerState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_base_url {
        return url.trim_end_matches('/').to_string();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    format!("{scheme}://{host}")
}

fn object_url(base: &str, namespace: &str, repo: &str, oid: &str) -> String {
    format!("{base}/git/{namespace}/{repo}.git/info/lfs/objects/{oid}")
}

fn verify_url(base: &str, namespace: &str, repo: &str) -> String {
    format!("{base}/git/{namespace}/{repo}.git/info/lfs/verify")
}

fn action(href: String) -> Action {
    Action {
        href,
        header: None,
        expires_in: Some(ACTION_EXPIRY_SECS),
    }
}

pub async fn batch(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<LfsPathParams>,
    headers: HeaderMap,
    Json(request): Json<BatchRequest>,
) -> Response {
    let is_upload = match request.operation.as_str() {
        "download" => false,
        "upload" => true,
        _ => return lfs_error(StatusCode::BAD_REQUEST, "Invalid operation"),
    };

    let ctx = match authorize_lfs(&state, &headers, &params.namespace, &params.repo, is_upload) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    let storage = LfsStorage::new(&state.data_dir);
    let base = base_url(&state, &headers);
    let repo_name = strip_git_suffix(&params.repo);

    let mut objects = Vec::with_capacity(request.objects.len());
    for obj in &request.objects {
        objects.push(
            object_response(
                &state,
                &storage,
                &ctx.repo,
                obj,
                is_upload,
                &base,
                &params.namespace,
                repo_name,
            )
            .await,
        );
    }

    lfs_json_response(
        StatusCode::OK,
        &BatchResponse {
            transfer: Some("basic".to_string()),
            objects,
        },
    )
}

#[allow(clippy::too_many_arguments)]
async fn object_response(
    state: &Arc<ServerState>,
    storage: &LfsStorage,
    repo: &Repo,
    obj: &ObjectSpec,
    is_upload: bool,
    base: &str,
    namespace: &str,
    repo_name: &str,
) -> BatchObject {
    if !is_valid_oid(&obj.oid) {
        return BatchObject::failed(obj.oid.clone(), obj.size, 422, "Invalid OID format");
    }

    if let Some(max) = state.lfs_max_file_size {
        if is_upload && obj.size > max {
            return BatchObject::failed(
                obj.oid.clone(),
                obj.size,
                413,
                format!("Object exceeds maximum file size ({max} bytes)"),
            );
        }
    }

    // Present means present on disk AND in the catalogue; verify is what
    // reconciles the two after an upload.
    let on_disk = storage.exists(&repo.id, &obj.oid).await.unwrap_or(false);
    let in_catalogue = state
        .store
        .get_lfs_object(&repo.id, &obj.oid)
        .ok()
        .flatten()
        .is_some();
    let present = on_disk && in_catalogue;

    if is_upload {
        if present {
            return BatchObject::already_present(obj.oid.clone(), obj.size);
        }
        let actions = HashMap::from([
            (
                "upload".to_string(),
                action(object_url(base, namespace, repo_name, &obj.oid)),
            ),
            (
                "verify".to_string(),
                action(verify_url(base, namespace, repo_name)),
            ),
        ]);
        BatchObject::with_actions(obj.oid.clone(), obj.size, actions)
    } else if present {
        let actions = HashMap::from([(
            "download".to_string(),
            action(object_url(base, namespace, repo_name, &obj.oid)),
        )]);
        BatchObject::with_actions(obj.oid.clone(), obj.size, actions)
    } else {
        BatchObject::failed(obj.oid.clone(), obj.size, 404, "Object not found")
    }
}

pub async fn download(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<LfsObjectPathParams>,
    headers: HeaderMap,
) -> Response {
    let ctx = match authorize_lfs(&state, &headers, &params.namespace, &params.repo, false) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if !is_valid_oid(&params.oid) {
        return lfs_error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid OID format");
    }

    let storage = LfsStorage::new(&state.data_dir);
    let (reader, size) = match storage.get(&ctx.repo.id, &params.oid).await {
        Ok(result) => result,
        Err(LfsStorageError::NotFound) => {
            return lfs_error(StatusCode::NOT_FOUND, "Object not found");
        }
        Err(e) => {
            warn!("LFS storage error: {e}");
            return lfs_error(StatusCode::INTERNAL_SERVER_ERROR, "Storage error");
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub async fn upload(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<LfsObjectPathParams>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let ctx = match authorize_lfs(&state, &headers, &params.namespace, &params.repo, true) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if !is_valid_oid(&params.oid) {
        return lfs_error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid OID format");
    }

    let Some(expected_size) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
    else {
        return lfs_error(StatusCode::BAD_REQUEST, "Content-Length required");
    };

    if let Some(max) = state.lfs_max_file_size {
        if expected_size > max {
            return lfs_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Object exceeds maximum file size",
            );
        }
    }

    let storage = LfsStorage::new(&state.data_dir);
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));

    if let Err(e) = storage
        .put(&ctx.repo.id, &params.oid, reader, expected_size)
        .await
    {
        return match e {
            LfsStorageError::SizeMismatch { .. } => {
                lfs_error(StatusCode::BAD_REQUEST, "size mismatch")
            }
            LfsStorageError::HashMismatch { .. } => {
                lfs_error(StatusCode::BAD_REQUEST, "content hash does not match OID")
            }
            other => {
                warn!("LFS storage error during upload: {other}");
                lfs_error(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
            }
        };
    }

    // Only a fully verified object reaches the catalogue.
    let record = LfsObject {
        repo_id: ctx.repo.id.clone(),
        oid: params.oid.clone(),
        size: expected_size,
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.upsert_lfs_object(&record) {
        warn!("failed to record LFS object {}: {e}", params.oid);
        return lfs_error(StatusCode::INTERNAL_SERVER_ERROR, "Storage error");
    }

    StatusCode::OK.into_response()
}

pub async fn verify(
    State(state): State<Arc<ServerState>>,
    Path(params): Path<LfsPathParams>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let ctx = match authorize_lfs(&state, &headers, &params.namespace, &params.repo, true) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if !is_valid_oid(&request.oid) {
        return lfs_error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid OID format");
    }

    let storage = LfsStorage::new(&state.data_dir);
    let actual_size = match storage.size(&ctx.repo.id, &request.oid).await {
        Ok(size) => size,
        Err(LfsStorageError::NotFound) => {
            return lfs_error(StatusCode::NOT_FOUND, "Object not found");
        }
        Err(e) => {
            warn!("LFS storage error during verify: {e}");
            return lfs_error(StatusCode::INTERNAL_SERVER_ERROR, "Storage error");
        }
    };

    if actual_size != request.size {
        return lfs_error(
            StatusCode::BAD_REQUEST,
            &format!("Size mismatch: expected {}, got {actual_size}", request.size),
        );
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, LFS_MEDIA_TYPE)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

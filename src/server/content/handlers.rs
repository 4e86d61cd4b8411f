use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_compression::tokio::bufread::GzipEncoder;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use git2::{ObjectType, Oid};
use tokio::io::{AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::auth::RequireUser;
use crate::server::ServerState;
use crate::server::response::{
    ApiError, ApiResponse, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::user::access::require_repo_permission;
use crate::store::paths;
use crate::types::Permission;

use super::auth::{OptionalAuth, check_content_access};
use super::dto::{
    ArchiveQuery, BlameInfo, BlameLine, BlobInfo, BlobQuery, CommitInfo, CommitsQuery,
    CompareInfo, CompareQuery, DEFAULT_PAGE_SIZE, DEFAULT_TREE_DEPTH, DefaultBranchUpdate,
    DiffInfo, MAX_BLOB_SIZE, MAX_PAGE_SIZE, MAX_RAW_BLOB_SIZE, MAX_TREE_DEPTH, ReadmeInfo,
    ReadmeQuery, RefCreate, RefInfo, RefUpdate, TreeEntry, TreeQuery,
};
use super::git_ops::{
    GitError, blob_at_path, build_diff, commit_to_response, commit_tree, count_ahead_behind,
    create_ref, default_branch, delete_ref, entry_type_str, find_merge_base, first_parent_stats,
    first_parent_walk, get_commit, is_binary, open_repo, resolve_ref, set_default_branch,
    signature_to_response, tree_at_path, update_ref,
};

/// Archive streams can outlive the ordinary service timeout.
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(600);

fn repo_path(state: &ServerState, namespace_id: &str, repo_name: &str) -> Result<PathBuf, ApiError> {
    paths::repo_dir(&state.data_dir, namespace_id, repo_name).map_err(ApiError::from)
}

async fn open_repo_for_read(
    state: &Arc<ServerState>,
    auth: &OptionalAuth,
    repo_id: &str,
) -> Result<(crate::types::Repo, git2::Repository), ApiError> {
    let repo = state
        .store
        .get_repo_by_id(repo_id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    check_content_access(state, auth, &repo)?;

    let path = repo_path(state, &repo.namespace_id, &repo.name)?;
    let git_repo = open_repo(&path)?;

    Ok((repo, git_repo))
}

async fn open_repo_for_write(
    state: &Arc<ServerState>,
    auth: &RequireUser,
    repo_id: &str,
) -> Result<(crate::types::Repo, git2::Repository), ApiError> {
    let repo = state
        .store
        .get_repo_by_id(repo_id)
        .api_err("Failed to load repository")?
        .or_not_found("Repository not found")?;

    require_repo_permission(
        state.store.as_ref(),
        &auth.user,
        &repo,
        Permission::REPO_WRITE,
    )?;

    let path = repo_path(state, &repo.namespace_id, &repo.name)?;
    let git_repo = open_repo(&path)?;

    Ok((repo, git_repo))
}

fn collect_branch_refs(git_repo: &git2::Repository, default: Option<&str>, refs: &mut Vec<RefInfo>) {
    let Ok(branches) = git_repo.branches(None) else {
        return;
    };

    for (branch, _branch_type) in branches.flatten() {
        let Some(name) = branch.name().ok().flatten() else {
            continue;
        };
        let Some(target) = branch.get().target() else {
            continue;
        };

        refs.push(RefInfo {
            name: name.to_string(),
            ref_type: "branch".to_string(),
            commit_sha: target.to_string(),
            is_default: default == Some(name),
        });
    }
}

fn collect_tag_refs(git_repo: &git2::Repository, refs: &mut Vec<RefInfo>) {
    let Ok(tag_names) = git_repo.tag_names(None) else {
        return;
    };

    for tag_name in tag_names.iter().flatten() {
        let Some(oid) = git_repo
            .find_reference(&format!("refs/tags/{tag_name}"))
            .ok()
            .and_then(|r| r.target())
        else {
            continue;
        };

        // Annotated tags report the referenced commit, not the tag object.
        let commit_sha = match git_repo.find_tag(oid) {
            Ok(tag) => tag.target_id().to_string(),
            Err(_) => oid.to_string(),
        };

        refs.push(RefInfo {
            name: tag_name.to_string(),
            ref_type: "tag".to_string(),
            commit_sha,
            is_default: false,
        });
    }
}

pub async fn list_refs(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let default = default_branch(&git_repo);
    let mut refs = Vec::new();
    collect_branch_refs(&git_repo, default.as_deref(), &mut refs);
    collect_tag_refs(&git_repo, &mut refs);

    if refs.is_empty() {
        return Err(GitError::EmptyRepo.into());
    }

    // Default first, then branches before tags, then by name.
    refs.sort_by_key(|r| (!r.is_default, r.ref_type != "branch", r.name.clone()));

    Ok(Json(ApiResponse::success(refs)))
}

/// True when the commit's first-parent diff touches `path`. Comparing the
/// tree entry's object id covers both cases: for a file the blob id changes,
/// for a directory the subtree id changes whenever anything under the
/// prefix does.
fn commit_touches_path(commit: &git2::Commit<'_>, path: &str) -> bool {
    let Ok(tree) = commit.tree() else {
        return false;
    };

    let parent_tree = if commit.parent_count() > 0 {
        commit.parent(0).ok().and_then(|p| p.tree().ok())
    } else {
        None
    };

    let path_obj = std::path::Path::new(path);
    let entry_id =
        |t: Option<&git2::Tree<'_>>| t.and_then(|t| t.get_path(path_obj).ok().map(|e| e.id()));

    entry_id(Some(&tree)) != entry_id(parent_tree.as_ref())
}

pub async fn list_commits(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(params): Query<CommitsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let oid = resolve_ref(&git_repo, params.ref_name.as_deref().unwrap_or(""))?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;

    let start = match &params.cursor {
        Some(cursor) => {
            Oid::from_str(cursor).map_err(|_| ApiError::bad_request("Invalid cursor"))?
        }
        None => oid,
    };

    let path_filter = params
        .path
        .as_deref()
        .map(|p| p.trim_matches('/').to_string())
        .filter(|p| !p.is_empty());

    let mut commits = Vec::new();
    for oid_result in first_parent_walk(&git_repo, start, params.cursor.is_some())? {
        if commits.len() > limit {
            break;
        }

        let commit_oid = oid_result.map_err(|e| {
            warn!("revwalk error: {e}");
            ApiError::internal("Failed to walk history")
        })?;
        let commit = get_commit(&git_repo, commit_oid)?;

        if let Some(filter) = &path_filter {
            if !commit_touches_path(&commit, filter) {
                continue;
            }
        }

        let stats = first_parent_stats(&git_repo, &commit);
        commits.push(commit_to_response(&commit, stats));
    }

    let has_more = commits.len() > limit;
    let next_cursor = if has_more {
        commits.pop();
        commits.last().map(|c| c.sha.clone())
    } else {
        None
    };

    Ok(Json(PaginatedResponse::new(commits, next_cursor, has_more)))
}

pub async fn get_commit_handler(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, sha)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let oid = resolve_ref(&git_repo, &sha)?;
    let commit = get_commit(&git_repo, oid)?;
    let stats = first_parent_stats(&git_repo, &commit);

    Ok(Json(ApiResponse::success(commit_to_response(
        &commit, stats,
    ))))
}

pub async fn get_commit_diff(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, sha)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let oid = resolve_ref(&git_repo, &sha)?;
    let commit = get_commit(&git_repo, oid)?;
    let head_tree = commit_tree(&git_repo, &commit)?;

    // First parent, or the empty tree for root commits.
    let (base_sha, parent_tree) = if commit.parent_count() > 0 {
        let parent = commit
            .parent(0)
            .map_err(|e| {
                warn!("failed to get parent: {e}");
                ApiError::internal("Failed to get parent commit")
            })?;
        let tree = commit_tree(&git_repo, &parent)?;
        (Some(parent.id().to_string()), Some(tree))
    } else {
        (None, None)
    };

    let (patch, stats) = build_diff(&git_repo, parent_tree.as_ref(), &head_tree)?;

    Ok(Json(ApiResponse::success(DiffInfo {
        base_sha,
        head_sha: oid.to_string(),
        stats,
        patch,
    })))
}

pub async fn compare_refs(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, spec)): Path<(String, String)>,
    Query(params): Query<CompareQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let (base_ref, head_ref) = spec
        .split_once("...")
        .ok_or_else(|| ApiError::bad_request("Invalid compare spec, expected base...head"))?;

    let base_ref = urlencoding::decode(base_ref)
        .map_err(|_| ApiError::bad_request("Invalid base ref encoding"))?;
    let head_ref = urlencoding::decode(head_ref)
        .map_err(|_| ApiError::bad_request("Invalid head ref encoding"))?;

    let base_oid = resolve_ref(&git_repo, &base_ref)?;
    let head_oid = resolve_ref(&git_repo, &head_ref)?;

    let merge_base_oid = find_merge_base(&git_repo, base_oid, head_oid)?;
    let (ahead_by, behind_by) = count_ahead_behind(&git_repo, base_oid, head_oid)?;

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;

    // base..head: walk from head (or the cursor), hiding base.
    let start = match &params.cursor {
        Some(cursor) => {
            Oid::from_str(cursor).map_err(|_| ApiError::bad_request("Invalid cursor"))?
        }
        None => head_oid,
    };

    let mut revwalk = git_repo
        .revwalk()
        .map_err(|e| {
            warn!("failed to create revwalk: {e}");
            ApiError::internal("Failed to walk history")
        })?;
    revwalk.push(start).map_err(|e| {
        warn!("failed to start revwalk: {e}");
        ApiError::internal("Failed to walk history")
    })?;
    revwalk.hide(base_oid).map_err(|e| {
        warn!("failed to hide base: {e}");
        ApiError::internal("Failed to walk history")
    })?;

    let mut iter = revwalk.into_iter();
    if params.cursor.is_some() {
        iter.next();
    }

    let mut commits = Vec::new();
    for oid_result in iter.take(limit + 1) {
        let commit_oid = oid_result.map_err(|e| {
            warn!("revwalk error: {e}");
            ApiError::internal("Failed to walk history")
        })?;
        let commit = get_commit(&git_repo, commit_oid)?;
        let stats = first_parent_stats(&git_repo, &commit);
        commits.push(commit_to_response(&commit, stats));
    }

    let has_more = commits.len() > limit;
    let next_cursor = if has_more {
        commits.pop();
        commits.last().map(|c: &CommitInfo| c.sha.clone())
    } else {
        None
    };

    let base_tree = commit_tree(&git_repo, &get_commit(&git_repo, base_oid)?)?;
    let head_tree = commit_tree(&git_repo, &get_commit(&git_repo, head_oid)?)?;
    let (patch, stats) = build_diff(&git_repo, Some(&base_tree), &head_tree)?;

    Ok(Json(ApiResponse::success(CompareInfo {
        base_ref: base_ref.to_string(),
        head_ref: head_ref.to_string(),
        base_sha: base_oid.to_string(),
        head_sha: head_oid.to_string(),
        merge_base_sha: merge_base_oid.to_string(),
        ahead_by,
        behind_by,
        commits,
        next_cursor,
        has_more,
        diff: DiffInfo {
            base_sha: Some(base_oid.to_string()),
            head_sha: head_oid.to_string(),
            stats,
            patch,
        },
    })))
}

pub async fn get_tree_root(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, ref_name)): Path<(String, String)>,
    Query(params): Query<TreeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    get_tree_impl(auth, state, id, ref_name, String::new(), params).await
}

pub async fn get_tree_handler(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, ref_name, path)): Path<(String, String, String)>,
    Query(params): Query<TreeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    get_tree_impl(auth, state, id, ref_name, path, params).await
}

async fn get_tree_impl(
    auth: OptionalAuth,
    state: Arc<ServerState>,
    id: String,
    ref_name: String,
    path: String,
    params: TreeQuery,
) -> Result<Json<ApiResponse<Vec<TreeEntry>>>, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let depth = params
        .depth
        .unwrap_or(DEFAULT_TREE_DEPTH)
        .clamp(1, MAX_TREE_DEPTH);

    let oid = resolve_ref(&git_repo, &ref_name)?;
    let commit = get_commit(&git_repo, oid)?;
    let root_tree = commit_tree(&git_repo, &commit)?;

    let path = path.trim_matches('/');
    let tree = tree_at_path(&git_repo, &root_tree, path)?;

    let base_path = if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    };

    let mut entries = build_tree_entries(&git_repo, &tree, &base_path, depth);
    sort_tree_entries(&mut entries);

    Ok(Json(ApiResponse::success(entries)))
}

fn build_tree_entries(
    repo: &git2::Repository,
    tree: &git2::Tree<'_>,
    base_path: &str,
    depth: i32,
) -> Vec<TreeEntry> {
    let mut entries = Vec::new();

    for entry in tree.iter() {
        let name = entry.name().unwrap_or("").to_string();
        let entry_path = format!("{base_path}{name}");

        let mut resp = TreeEntry {
            name,
            path: entry_path.clone(),
            entry_type: entry_type_str(entry.kind(), entry.filemode()).to_string(),
            sha: entry.id().to_string(),
            mode: format!("{:06o}", entry.filemode()),
            size: None,
            has_children: None,
            children: Vec::new(),
        };

        match entry.kind() {
            Some(ObjectType::Blob) => {
                if let Ok(blob) = repo.find_blob(entry.id()) {
                    resp.size = Some(blob.size() as i64);
                }
            }
            Some(ObjectType::Tree) => {
                if let Ok(sub_tree) = repo.find_tree(entry.id()) {
                    resp.has_children = Some(!sub_tree.is_empty());
                    if depth > 1 {
                        resp.children = build_tree_entries(
                            repo,
                            &sub_tree,
                            &format!("{entry_path}/"),
                            depth - 1,
                        );
                    }
                }
            }
            _ => {}
        }

        entries.push(resp);
    }

    entries
}

// Directories first, then alphabetic, applied at every level.
fn sort_tree_entries(entries: &mut [TreeEntry]) {
    entries.sort_by_key(|e| (e.entry_type != "dir", e.name.clone()));

    for entry in entries.iter_mut() {
        if !entry.children.is_empty() {
            sort_tree_entries(&mut entry.children);
        }
    }
}

pub async fn get_blob(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, ref_name, path)): Path<(String, String, String)>,
    Query(params): Query<BlobQuery>,
) -> Result<Response, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(ApiError::bad_request("Path is required"));
    }

    let oid = resolve_ref(&git_repo, &ref_name)?;
    let commit = get_commit(&git_repo, oid)?;
    let tree = commit_tree(&git_repo, &commit)?;
    let blob = blob_at_path(&git_repo, &tree, path)?;

    if params.raw.unwrap_or(false) {
        return serve_raw_blob(&blob, path);
    }

    let size = blob.size() as i64;
    let is_truncated = size > MAX_BLOB_SIZE;
    let read_size = size.min(MAX_BLOB_SIZE) as usize;

    let content_bytes = &blob.content()[..read_size];
    let binary = is_binary(content_bytes);

    let (content, encoding) = if binary {
        (STANDARD.encode(content_bytes), "base64".to_string())
    } else {
        (
            String::from_utf8_lossy(content_bytes).to_string(),
            "utf-8".to_string(),
        )
    };

    Ok(Json(ApiResponse::success(BlobInfo {
        sha: blob.id().to_string(),
        size,
        content,
        encoding,
        is_binary: binary,
        is_truncated,
    }))
    .into_response())
}

fn serve_raw_blob(blob: &git2::Blob<'_>, filename: &str) -> Result<Response, ApiError> {
    let size = blob.size() as i64;
    if size > MAX_RAW_BLOB_SIZE {
        return Err(ApiError::payload_too_large(format!(
            "File size ({size} bytes) exceeds maximum allowed size ({MAX_RAW_BLOB_SIZE} bytes)"
        )));
    }

    let content_type = detect_content_type(filename, blob.content());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.size() as u64));

    Ok((StatusCode::OK, headers, blob.content().to_vec()).into_response())
}

/// Extension map first, content sniff of the first 512 bytes as fallback.
fn detect_content_type(filename: &str, content: &[u8]) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mapped = match ext.as_str() {
        "go" | "rs" | "py" | "rb" | "java" | "c" | "cpp" | "h" | "hpp" | "sh" | "sql" | "txt" => {
            Some("text/plain; charset=utf-8")
        }
        "js" => Some("text/javascript; charset=utf-8"),
        "ts" => Some("text/typescript; charset=utf-8"),
        "md" => Some("text/markdown; charset=utf-8"),
        "json" => Some("application/json"),
        "yaml" | "yml" => Some("text/yaml; charset=utf-8"),
        "xml" => Some("application/xml"),
        "html" | "htm" => Some("text/html; charset=utf-8"),
        "css" => Some("text/css; charset=utf-8"),
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    };

    if let Some(ct) = mapped {
        return ct.to_string();
    }

    let sample = &content[..content.len().min(512)];
    if is_binary(sample) {
        "application/octet-stream".to_string()
    } else {
        "text/plain; charset=utf-8".to_string()
    }
}

pub async fn get_blame(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, ref_name, path)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(ApiError::bad_request("Path is required"));
    }

    let oid = resolve_ref(&git_repo, &ref_name)?;

    let blame = git_repo
        .blame_file(
            std::path::Path::new(path),
            Some(git2::BlameOptions::new().newest_commit(oid)),
        )
        .map_err(|_| GitError::PathNotFound(path.to_string()))?;

    let commit = get_commit(&git_repo, oid)?;
    let tree = commit_tree(&git_repo, &commit)?;
    let blob = blob_at_path(&git_repo, &tree, path)?;

    let text = String::from_utf8_lossy(blob.content());
    let mut lines = Vec::new();

    for (i, line_text) in text.lines().enumerate() {
        let line_num = i + 1;
        if let Some(hunk) = blame.get_line(line_num) {
            lines.push(BlameLine {
                line: line_num,
                sha: hunk.final_commit_id().to_string(),
                author: signature_to_response(&hunk.final_signature()),
                text: line_text.to_string(),
            });
        }
    }

    Ok(Json(ApiResponse::success(BlameInfo {
        path: path.to_string(),
        ref_name,
        lines,
    })))
}

pub async fn get_archive(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path((id, ref_name)): Path<(String, String)>,
    Query(params): Query<ArchiveQuery>,
) -> Result<Response, ApiError> {
    let (repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let oid = resolve_ref(&git_repo, &ref_name)?;

    let format = params.format.as_deref().unwrap_or("zip");
    let (content_type, extension, git_format, use_gzip) = match format.to_lowercase().as_str() {
        "zip" => ("application/zip", "zip", "zip", false),
        "tar.gz" | "tgz" => ("application/gzip", "tar.gz", "tar", true),
        _ => return Err(ApiError::bad_request("Invalid archive format")),
    };

    if let Some(path) = &params.path {
        if path.contains("..") {
            return Err(ApiError::bad_request("Invalid path"));
        }

        let path = path.trim_start_matches('/');
        let commit = get_commit(&git_repo, oid)?;
        let tree = commit_tree(&git_repo, &commit)?;
        tree.get_path(std::path::Path::new(path))
            .map_err(|_| GitError::PathNotFound(path.to_string()))?;
    }

    let repo_dir = repo_path(&state, &repo.namespace_id, &repo.name)?;

    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(&repo_dir)
        .arg("archive")
        .arg(format!("--format={git_format}"))
        .arg(oid.to_string());
    if let Some(path) = &params.path {
        cmd.arg(path.trim_start_matches('/'));
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        warn!("failed to spawn git archive: {e}");
        ApiError::internal("Failed to run git archive")
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ApiError::internal("Failed to run git archive"))?;

    tokio::spawn(async move {
        match tokio::time::timeout(ARCHIVE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if !status.success() => warn!("git archive exited with {status}"),
            Ok(Err(e)) => warn!("failed to wait for git archive: {e}"),
            Err(_) => {
                warn!("git archive timed out, killing");
                let _ = child.kill().await;
            }
            _ => {}
        }
    });

    let reader: Box<dyn AsyncRead + Send + Unpin> = if use_gzip {
        Box::new(GzipEncoder::new(BufReader::new(stdout)))
    } else {
        Box::new(stdout)
    };

    let clean_ref = ref_name.replace('/', "-");
    let filename: String = format!("{}-{}.{}", repo.name, clean_ref, extension)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or(HeaderValue::from_static("attachment; filename=\"archive\""));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((
        StatusCode::OK,
        headers,
        axum::body::Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

const README_FILENAMES: &[&str] = &[
    "README.md",
    "readme.md",
    "README.MD",
    "Readme.md",
    "README",
    "readme",
    "README.txt",
    "readme.txt",
    "README.rst",
    "readme.rst",
];

pub async fn get_readme(
    auth: OptionalAuth,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(params): Query<ReadmeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_read(&state, &auth, &id).await?;

    let oid = resolve_ref(&git_repo, params.ref_name.as_deref().unwrap_or(""))?;
    let commit = get_commit(&git_repo, oid)?;
    let tree = commit_tree(&git_repo, &commit)?;

    let entry = README_FILENAMES
        .iter()
        .find_map(|name| {
            tree.get_path(std::path::Path::new(name))
                .ok()
                .filter(|e| e.kind() == Some(ObjectType::Blob))
                .map(|e| (name.to_string(), e))
        })
        .ok_or_else(|| ApiError::not_found("No README found"))?;
    let (filename, entry) = entry;

    let blob = git_repo.find_blob(entry.id()).map_err(|e| {
        warn!("failed to read README blob: {e}");
        ApiError::internal("Failed to read README")
    })?;

    let size = blob.size() as i64;
    let is_truncated = size > MAX_BLOB_SIZE;
    let read_size = size.min(MAX_BLOB_SIZE) as usize;

    let content = &blob.content()[..read_size];
    let binary = is_binary(content);

    Ok(Json(ApiResponse::success(ReadmeInfo {
        filename,
        content: if binary {
            String::new()
        } else {
            String::from_utf8_lossy(content).to_string()
        },
        size,
        sha: blob.id().to_string(),
        is_binary: binary,
        is_truncated,
    })))
}

pub async fn create_ref_handler(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RefCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_write(&state, &auth, &id).await?;

    let oid = create_ref(&git_repo, &req.ref_type, &req.name, &req.target_sha, req.force)?;
    let is_default = default_branch(&git_repo).as_deref() == Some(&req.name);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RefInfo {
            name: req.name,
            ref_type: req.ref_type,
            commit_sha: oid.to_string(),
            is_default,
        })),
    ))
}

#[derive(serde::Deserialize)]
pub struct RefPath {
    id: String,
    #[serde(rename = "type")]
    ref_type: String,
    name: String,
}

pub async fn update_ref_handler(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<RefPath>,
    Json(req): Json<RefUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_write(&state, &auth, &path.id).await?;

    let oid = update_ref(
        &git_repo,
        &path.ref_type,
        &path.name,
        &req.target_sha,
        req.expected_sha.as_deref(),
    )?;
    let is_default = default_branch(&git_repo).as_deref() == Some(&path.name);

    Ok(Json(ApiResponse::success(RefInfo {
        name: path.name,
        ref_type: path.ref_type,
        commit_sha: oid.to_string(),
        is_default,
    })))
}

pub async fn delete_ref_handler(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(path): Path<RefPath>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_write(&state, &auth, &path.id).await?;

    delete_ref(&git_repo, &path.ref_type, &path.name)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default_branch_handler(
    auth: RequireUser,
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<DefaultBranchUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let (_repo, git_repo) = open_repo_for_write(&state, &auth, &id).await?;

    set_default_branch(&git_repo, &req.branch)?;

    let commit_sha = git_repo
        .find_reference(&format!("refs/heads/{}", req.branch))
        .ok()
        .and_then(|r| r.target())
        .map(|oid| oid.to_string())
        .unwrap_or_default();

    Ok(Json(ApiResponse::success(RefInfo {
        name: req.branch,
        ref_type: "branch".to_string(),
        commit_sha,
        is_default: true,
    })))
}

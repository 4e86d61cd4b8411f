//! Coordination between the metadata catalogue and the on-disk tree.
//!
//! Invariant: after any create/rename/delete, the DB row and the filesystem
//! agree, or the divergence has been rolled back. When rollback itself
//! fails, a CRITICAL log line tells the operator exactly what is left.

use std::sync::Arc;

use tokio::fs;
use tracing::{error, warn};

use super::ServerState;
use super::git::process::init_bare_repo;
use super::response::{ApiError, StoreResultExt};
use crate::store::paths;
use crate::types::Repo;

/// Inserts the repo row, then initialises the bare repository. If the disk
/// step fails the row is removed again.
pub async fn create_repo_with_storage(state: &Arc<ServerState>, repo: &Repo) -> Result<(), ApiError> {
    state
        .store
        .create_repo(repo)
        .api_err("Failed to create repository")?;

    let path = paths::repo_dir(&state.data_dir, &repo.namespace_id, &repo.name)
        .map_err(ApiError::from)?;

    if let Err(e) = init_bare_repo(&path).await {
        warn!("failed to init bare repo at {}: {e}", path.display());
        if let Err(db_err) = state.store.delete_repo(&repo.id) {
            error!(
                "CRITICAL: repo row {} has no backing directory and rollback failed: {db_err}",
                repo.id
            );
        }
        return Err(ApiError::internal("Failed to initialize repository"));
    }

    Ok(())
}

/// Renames a repo on disk and in the DB: rename directory, update DB,
/// rename back when the DB write fails.
pub async fn rename_repo_with_storage(
    state: &Arc<ServerState>,
    repo: &Repo,
    new_name: &str,
) -> Result<(), ApiError> {
    let old_path = paths::repo_dir(&state.data_dir, &repo.namespace_id, &repo.name)
        .map_err(ApiError::from)?;
    let new_path =
        paths::repo_dir(&state.data_dir, &repo.namespace_id, new_name).map_err(ApiError::from)?;

    let on_disk = old_path.exists();
    if on_disk {
        fs::rename(&old_path, &new_path).await.map_err(|e| {
            warn!("failed to rename repo directory: {e}");
            ApiError::internal("Failed to rename repository")
        })?;
    }

    let mut updated = repo.clone();
    updated.name = new_name.to_string();

    if let Err(e) = state.store.update_repo(&updated) {
        if on_disk {
            if let Err(fs_err) = fs::rename(&new_path, &old_path).await {
                error!(
                    "CRITICAL: failed to roll back directory rename {} -> {}: {fs_err}",
                    new_path.display(),
                    old_path.display()
                );
            }
        }
        return Err(ApiError::from(e));
    }

    Ok(())
}

/// Removes the repo row (cascading grants, folders, LFS rows) and then the
/// repo directory plus its LFS tree. Disk failures are logged, not surfaced:
/// the row is gone and the request already succeeded.
pub async fn delete_repo_with_storage(state: &Arc<ServerState>, repo: &Repo) -> Result<(), ApiError> {
    state
        .store
        .delete_repo(&repo.id)
        .api_err("Failed to delete repository")?;

    if let Ok(path) = paths::repo_dir(&state.data_dir, &repo.namespace_id, &repo.name) {
        if path.exists() {
            if let Err(e) = fs::remove_dir_all(&path).await {
                error!(
                    "CRITICAL: deleted repo {} but directory {} remains: {e}",
                    repo.id,
                    path.display()
                );
            }
        }
    }

    remove_lfs_tree(state, &repo.id).await;

    Ok(())
}

/// Removes a namespace's repo directories and LFS trees after its rows are
/// gone. `repo_ids` must be collected before the cascade delete.
pub async fn remove_namespace_storage(state: &Arc<ServerState>, namespace_id: &str, repo_ids: &[String]) {
    if let Ok(dir) = paths::namespace_dir(&state.data_dir, namespace_id) {
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                error!(
                    "CRITICAL: deleted namespace {namespace_id} but directory {} remains: {e}",
                    dir.display()
                );
            }
        }
    }

    for repo_id in repo_ids {
        remove_lfs_tree(state, repo_id).await;
    }
}

async fn remove_lfs_tree(state: &Arc<ServerState>, repo_id: &str) {
    let Ok(lfs_dir) = paths::lfs_repo_dir(&state.data_dir, repo_id) else {
        return;
    };
    if lfs_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&lfs_dir).await {
            error!(
                "CRITICAL: LFS tree {} for deleted repo {repo_id} remains: {e}",
                lfs_dir.display()
            );
        }
    }
}

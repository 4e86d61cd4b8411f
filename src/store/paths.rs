//! Containment of user-influenced paths under the data directory.
//!
//! Every name that ends up in a filesystem path goes through
//! [`validate_name`] first, and every materialised path is re-checked to
//! still live under its root before use.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const MAX_NAME_LEN: usize = 128;

/// Validates a single user-supplied name used as a path component.
///
/// Accepts 1..=128 chars, first char alphanumeric, remainder alphanumeric or
/// `.`, `_`, `-`. Rejects `..` anywhere, and path separators outright.
pub fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name cannot exceed {MAX_NAME_LEN} characters"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err("name cannot contain '..' or path separators".to_string());
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err("name must start with an alphanumeric character".to_string());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        return Err(
            "name can only contain alphanumeric characters, periods, hyphens, and underscores"
                .to_string(),
        );
    }

    Ok(())
}

/// Lexically normalizes a path: resolves `.` and `..` without touching the
/// filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn contained_join(root: PathBuf, components: &[&str]) -> Result<PathBuf> {
    let mut joined = root.clone();
    for c in components {
        joined.push(c);
    }

    let root = clean(&root);
    let joined = clean(&joined);
    if joined.strip_prefix(&root).is_err() || joined == root {
        return Err(Error::PathEscape);
    }
    Ok(joined)
}

/// The bare repository directory: `<data>/repos/<ns_id>/<name>.git`.
pub fn repo_dir(data_dir: &Path, namespace_id: &str, repo_name: &str) -> Result<PathBuf> {
    validate_name(namespace_id).map_err(|_| Error::PathEscape)?;
    validate_name(repo_name).map_err(|_| Error::PathEscape)?;
    contained_join(
        data_dir.join("repos"),
        &[namespace_id, &format!("{repo_name}.git")],
    )
}

/// The per-namespace repos directory: `<data>/repos/<ns_id>`.
pub fn namespace_dir(data_dir: &Path, namespace_id: &str) -> Result<PathBuf> {
    validate_name(namespace_id).map_err(|_| Error::PathEscape)?;
    contained_join(data_dir.join("repos"), &[namespace_id])
}

/// The per-repo LFS root: `<data>/lfs/<repo_id>`.
pub fn lfs_repo_dir(data_dir: &Path, repo_id: &str) -> Result<PathBuf> {
    validate_name(repo_id).map_err(|_| Error::PathEscape)?;
    contained_join(data_dir.join("lfs"), &[repo_id])
}

//! Read-side operations over a bare repository via libgit2, plus the small
//! amount of ref surgery the API exposes.

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::{Commit, DiffOptions, ObjectType, Oid, Repository, Signature, Sort, Tree};

use super::dto::{CommitInfo, DiffStats, Identity};
use crate::server::response::ApiError;

#[derive(Debug)]
pub enum GitError {
    RepoNotFound,
    RefNotFound(String),
    PathNotFound(String),
    EmptyRepo,
    NotAFile,
    NotADirectory,
    Invalid(String),
    Conflict(String),
    Internal(String),
}

impl From<GitError> for ApiError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RepoNotFound => ApiError::not_found("Repository not initialized"),
            GitError::RefNotFound(r) => ApiError::not_found(format!("Reference not found: {r}")),
            GitError::PathNotFound(p) => ApiError::not_found(format!("Path not found: {p}")),
            GitError::EmptyRepo => ApiError::not_found("Repository is empty"),
            GitError::NotAFile => ApiError::bad_request("Path is a directory, not a file"),
            GitError::NotADirectory => ApiError::bad_request("Path is a file, not a directory"),
            GitError::Invalid(msg) => ApiError::bad_request(msg),
            GitError::Conflict(msg) => ApiError::conflict(msg),
            GitError::Internal(msg) => {
                tracing::error!("git operation failed: {msg}");
                ApiError::internal("Git operation failed")
            }
        }
    }
}

fn internal(context: &str) -> impl FnOnce(git2::Error) -> GitError + '_ {
    move |e| GitError::Internal(format!("{context}: {e}"))
}

pub fn open_repo(path: &Path) -> Result<Repository, GitError> {
    Repository::open_bare(path).map_err(|_| GitError::RepoNotFound)
}

/// Resolves a ref spec in priority order: full SHA, branch, tag (peeled to
/// its commit), then symbolic HEAD.
pub fn resolve_ref(repo: &Repository, ref_spec: &str) -> Result<Oid, GitError> {
    let ref_spec = if ref_spec.is_empty() { "HEAD" } else { ref_spec };

    if ref_spec.len() == 40 {
        if let Ok(oid) = Oid::from_str(ref_spec) {
            if repo.find_commit(oid).is_ok() {
                return Ok(oid);
            }
        }
    }

    if let Ok(reference) = repo.find_reference(&format!("refs/heads/{ref_spec}")) {
        if let Some(oid) = reference.target() {
            return Ok(oid);
        }
    }

    if let Ok(reference) = repo.find_reference(&format!("refs/tags/{ref_spec}")) {
        if let Some(oid) = reference.target() {
            // Annotated tags point at a tag object; peel to the commit.
            if let Ok(tag) = repo.find_tag(oid) {
                return Ok(tag.target_id());
            }
            return Ok(oid);
        }
    }

    if ref_spec == "HEAD" {
        let head = repo.head().map_err(|_| GitError::EmptyRepo)?;
        return head.target().ok_or(GitError::EmptyRepo);
    }

    Err(GitError::RefNotFound(ref_spec.to_string()))
}

pub fn get_commit<'a>(repo: &'a Repository, oid: Oid) -> Result<Commit<'a>, GitError> {
    repo.find_commit(oid).map_err(internal("failed to get commit"))
}

pub fn commit_tree<'a>(repo: &'a Repository, commit: &Commit<'_>) -> Result<Tree<'a>, GitError> {
    repo.find_tree(commit.tree_id())
        .map_err(internal("failed to get tree"))
}

pub fn tree_at_path<'a>(
    repo: &'a Repository,
    root: &Tree<'_>,
    path: &str,
) -> Result<Tree<'a>, GitError> {
    if path.is_empty() {
        return repo
            .find_tree(root.id())
            .map_err(internal("failed to reopen tree"));
    }

    let entry = root
        .get_path(Path::new(path))
        .map_err(|_| GitError::PathNotFound(path.to_string()))?;

    if entry.kind() != Some(ObjectType::Tree) {
        return Err(GitError::NotADirectory);
    }

    entry
        .to_object(repo)
        .map_err(internal("failed to get tree object"))?
        .into_tree()
        .map_err(|_| GitError::NotADirectory)
}

pub fn blob_at_path<'a>(
    repo: &'a Repository,
    root: &Tree<'_>,
    path: &str,
) -> Result<git2::Blob<'a>, GitError> {
    let entry = root
        .get_path(Path::new(path))
        .map_err(|_| GitError::PathNotFound(path.to_string()))?;

    if entry.kind() == Some(ObjectType::Tree) {
        return Err(GitError::NotAFile);
    }

    entry
        .to_object(repo)
        .map_err(internal("failed to get blob object"))?
        .into_blob()
        .map_err(|_| GitError::Internal("object is not a blob".to_string()))
}

/// Binary when the content holds a NUL byte or is not valid UTF-8.
/// Both checks cover the whole slice: NUL is valid UTF-8, so a late NUL
/// would otherwise slip through.
#[must_use]
pub fn is_binary(content: &[u8]) -> bool {
    content.contains(&0) || std::str::from_utf8(content).is_err()
}

#[must_use]
pub fn signature_to_response(sig: &Signature<'_>) -> Identity {
    let secs = sig.when().seconds();
    let date = Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now);

    Identity {
        name: sig.name().unwrap_or("").to_string(),
        email: sig.email().unwrap_or("").to_string(),
        date,
    }
}

#[must_use]
pub fn commit_to_response(commit: &Commit<'_>, stats: Option<DiffStats>) -> CommitInfo {
    CommitInfo {
        sha: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author: signature_to_response(&commit.author()),
        committer: signature_to_response(&commit.committer()),
        parent_shas: commit.parent_ids().map(|id| id.to_string()).collect(),
        tree_sha: commit.tree_id().to_string(),
        stats,
    }
}

/// Stats of a commit's diff against its first parent (or the empty tree for
/// root commits).
#[must_use]
pub fn first_parent_stats(repo: &Repository, commit: &Commit<'_>) -> Option<DiffStats> {
    let current_tree = commit.tree().ok()?;
    let parent_tree = if commit.parent_count() > 0 {
        commit.parent(0).ok()?.tree().ok()
    } else {
        None
    };

    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), None)
        .ok()?;
    let stats = diff.stats().ok()?;

    Some(DiffStats {
        files_changed: stats.files_changed(),
        additions: stats.insertions(),
        deletions: stats.deletions(),
    })
}

/// A first-parent revwalk starting at `start`, skipping one commit when the
/// start is a pagination cursor.
pub fn first_parent_walk<'a>(
    repo: &'a Repository,
    start: Oid,
    skip_start: bool,
) -> Result<impl Iterator<Item = Result<Oid, git2::Error>> + 'a, GitError> {
    let mut revwalk = repo
        .revwalk()
        .map_err(internal("failed to create revwalk"))?;
    revwalk
        .set_sorting(Sort::NONE)
        .map_err(internal("failed to set sorting"))?;
    revwalk.simplify_first_parent().map_err(internal(
        "failed to simplify revwalk to first parents",
    ))?;
    revwalk
        .push(start)
        .map_err(internal("failed to start revwalk"))?;

    let mut iter = revwalk.into_iter();
    if skip_start {
        iter.next();
    }
    Ok(iter)
}

pub fn build_diff(
    repo: &Repository,
    base_tree: Option<&Tree<'_>>,
    head_tree: &Tree<'_>,
) -> Result<(String, DiffStats), GitError> {
    let mut opts = DiffOptions::new();
    opts.context_lines(3);

    let diff = repo
        .diff_tree_to_tree(base_tree, Some(head_tree), Some(&mut opts))
        .map_err(internal("failed to compute diff"))?;

    let stats = diff.stats().map_err(internal("failed to get diff stats"))?;

    let mut patch = Vec::new();
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        let origin = line.origin();
        if origin == '+' || origin == '-' || origin == ' ' {
            patch.push(origin as u8);
        }
        patch.extend_from_slice(line.content());
        true
    })
    .map_err(internal("failed to format diff"))?;

    Ok((
        String::from_utf8_lossy(&patch).to_string(),
        DiffStats {
            files_changed: stats.files_changed(),
            additions: stats.insertions(),
            deletions: stats.deletions(),
        },
    ))
}

pub fn find_merge_base(repo: &Repository, base: Oid, head: Oid) -> Result<Oid, GitError> {
    repo.merge_base(base, head)
        .map_err(internal("failed to find merge base"))
}

/// `(ahead, behind)` of `head` relative to `base`.
pub fn count_ahead_behind(
    repo: &Repository,
    base: Oid,
    head: Oid,
) -> Result<(usize, usize), GitError> {
    repo.graph_ahead_behind(head, base)
        .map_err(internal("failed to count ahead/behind"))
}

#[must_use]
pub fn default_branch(repo: &Repository) -> Option<String> {
    repo.head().ok()?.shorthand().map(String::from)
}

#[must_use]
pub fn entry_type_str(kind: Option<ObjectType>, filemode: i32) -> &'static str {
    match kind {
        Some(ObjectType::Tree) => "dir",
        Some(ObjectType::Blob) if filemode == 0o120000 => "symlink",
        Some(ObjectType::Blob) => "file",
        Some(ObjectType::Commit) => "submodule",
        _ => "file",
    }
}

fn full_ref_name(ref_type: &str, name: &str) -> Result<String, GitError> {
    match ref_type {
        "branch" => Ok(format!("refs/heads/{name}")),
        "tag" => Ok(format!("refs/tags/{name}")),
        _ => Err(GitError::Invalid(format!(
            "Invalid ref type: {ref_type}. Must be 'branch' or 'tag'"
        ))),
    }
}

pub fn create_ref(
    repo: &Repository,
    ref_type: &str,
    name: &str,
    target_sha: &str,
    force: bool,
) -> Result<Oid, GitError> {
    let oid = Oid::from_str(target_sha)
        .map_err(|_| GitError::Invalid(format!("Invalid SHA: {target_sha}")))?;

    repo.find_commit(oid)
        .map_err(|_| GitError::RefNotFound(format!("Target commit not found: {target_sha}")))?;

    let full_ref = full_ref_name(ref_type, name)?;

    if !force && repo.find_reference(&full_ref).is_ok() {
        return Err(GitError::Conflict(format!("Reference already exists: {name}")));
    }

    repo.reference(&full_ref, oid, force, &format!("Creating {ref_type} {name}"))
        .map_err(internal("failed to create reference"))?;

    Ok(oid)
}

/// Updates a ref, optionally compare-and-swap against `expected_sha`.
pub fn update_ref(
    repo: &Repository,
    ref_type: &str,
    name: &str,
    target_sha: &str,
    expected_sha: Option<&str>,
) -> Result<Oid, GitError> {
    let full_ref = full_ref_name(ref_type, name)?;

    let current = repo
        .find_reference(&full_ref)
        .map_err(|_| GitError::RefNotFound(name.to_string()))?;

    if let Some(expected) = expected_sha {
        let expected_oid = Oid::from_str(expected)
            .map_err(|_| GitError::Invalid(format!("Invalid expected SHA: {expected}")))?;
        let current_oid = current.target().ok_or_else(|| {
            GitError::Internal("reference has no direct target".to_string())
        })?;
        if current_oid != expected_oid {
            return Err(GitError::Conflict(format!(
                "Reference has moved. Expected {expected}, found {current_oid}"
            )));
        }
    }

    let new_oid = Oid::from_str(target_sha)
        .map_err(|_| GitError::Invalid(format!("Invalid SHA: {target_sha}")))?;
    repo.find_commit(new_oid)
        .map_err(|_| GitError::RefNotFound(format!("Target commit not found: {target_sha}")))?;

    repo.reference(&full_ref, new_oid, true, &format!("Updating {ref_type} {name}"))
        .map_err(internal("failed to update reference"))?;

    Ok(new_oid)
}

pub fn delete_ref(repo: &Repository, ref_type: &str, name: &str) -> Result<(), GitError> {
    let full_ref = full_ref_name(ref_type, name)?;

    let mut reference = repo
        .find_reference(&full_ref)
        .map_err(|_| GitError::RefNotFound(name.to_string()))?;

    reference
        .delete()
        .map_err(internal("failed to delete reference"))
}

pub fn set_default_branch(repo: &Repository, branch: &str) -> Result<(), GitError> {
    let full_ref = format!("refs/heads/{branch}");

    repo.find_reference(&full_ref)
        .map_err(|_| GitError::RefNotFound(branch.to_string()))?;

    repo.set_head(&full_ref)
        .map_err(internal("failed to set HEAD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path()).unwrap();

        {
            let blob = repo.blob(b"hello\n").unwrap();
            let mut builder = repo.treebuilder(None).unwrap();
            builder.insert("hello.txt", blob, 0o100644).unwrap();
            let tree_oid = builder.write().unwrap();
            let tree = repo.find_tree(tree_oid).unwrap();
            let sig = Signature::now("Test", "test@example.com").unwrap();
            repo.commit(Some("refs/heads/main"), &sig, &sig, "init", &tree, &[])
                .unwrap();
            repo.set_head("refs/heads/main").unwrap();
        }

        (temp, repo)
    }

    #[test]
    fn resolve_ref_by_branch_sha_and_head() {
        let (_temp, repo) = seed_repo();

        let by_branch = resolve_ref(&repo, "main").unwrap();
        let by_head = resolve_ref(&repo, "").unwrap();
        assert_eq!(by_branch, by_head);

        let by_sha = resolve_ref(&repo, &by_branch.to_string()).unwrap();
        assert_eq!(by_sha, by_branch);

        assert!(matches!(
            resolve_ref(&repo, "does-not-exist"),
            Err(GitError::RefNotFound(_))
        ));
    }

    #[test]
    fn annotated_tag_peels_to_commit() {
        let (_temp, repo) = seed_repo();
        let head = resolve_ref(&repo, "main").unwrap();
        let commit = repo.find_commit(head).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        repo.tag("v1", commit.as_object(), &sig, "release", false)
            .unwrap();

        assert_eq!(resolve_ref(&repo, "v1").unwrap(), head);
    }

    #[test]
    fn binary_detection() {
        assert!(!is_binary(b"plain text"));
        assert!(is_binary(b"has\0nul"));
        assert!(is_binary(&[0xff, 0xfe, 0x00, 0x41]));
        assert!(is_binary(&[0xc3, 0x28])); // invalid UTF-8, no NUL

        // A NUL buried deep in otherwise valid UTF-8 still counts.
        let mut late_nul = vec![b'a'; 16 * 1024];
        late_nul.push(0);
        assert!(is_binary(&late_nul));
    }

    #[test]
    fn root_commit_stats_use_empty_tree() {
        let (_temp, repo) = seed_repo();
        let head = resolve_ref(&repo, "main").unwrap();
        let commit = repo.find_commit(head).unwrap();

        let stats = first_parent_stats(&repo, &commit).unwrap();
        assert_eq!(stats.files_changed, 1);
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 0);
    }

    #[test]
    fn ref_management_roundtrip() {
        let (_temp, repo) = seed_repo();
        let head = resolve_ref(&repo, "main").unwrap();
        let sha = head.to_string();

        create_ref(&repo, "branch", "feature", &sha, false).unwrap();
        assert!(matches!(
            create_ref(&repo, "branch", "feature", &sha, false),
            Err(GitError::Conflict(_))
        ));

        update_ref(&repo, "branch", "feature", &sha, Some(&sha)).unwrap();
        assert!(matches!(
            update_ref(&repo, "branch", "feature", &sha, Some(&"0".repeat(40))),
            Err(GitError::Conflict(_))
        ));

        delete_ref(&repo, "branch", "feature").unwrap();
        assert!(matches!(
            delete_ref(&repo, "branch", "feature"),
            Err(GitError::RefNotFound(_))
        ));
    }
}

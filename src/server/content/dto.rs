use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Inline blob content is truncated beyond this; `raw=true` streams instead.
pub const MAX_BLOB_SIZE: i64 = 1_048_576;
/// Hard cap for raw blob downloads.
pub const MAX_RAW_BLOB_SIZE: i64 = 100_000_000;
pub const MAX_TREE_DEPTH: i32 = 10;
pub const DEFAULT_TREE_DEPTH: i32 = 1;
pub const DEFAULT_PAGE_SIZE: i32 = 20;
pub const MAX_PAGE_SIZE: i32 = 100;

#[derive(Debug, Serialize)]
pub struct RefInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ref_type: String,
    pub commit_sha: String,
    pub is_default: bool,
}

/// Author or committer identity on a commit.
#[derive(Debug, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub date: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct DiffStats {
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: Identity,
    pub committer: Identity,
    pub parent_shas: Vec<String>,
    pub tree_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DiffStats>,
}

#[derive(Debug, Serialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_children: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

#[derive(Debug, Serialize)]
pub struct BlobInfo {
    pub sha: String,
    pub size: i64,
    pub content: String,
    /// "utf-8" or "base64".
    pub encoding: String,
    pub is_binary: bool,
    pub is_truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct DiffInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,
    pub head_sha: String,
    pub stats: DiffStats,
    pub patch: String,
}

#[derive(Debug, Serialize)]
pub struct CompareInfo {
    pub base_ref: String,
    pub head_ref: String,
    pub base_sha: String,
    pub head_sha: String,
    pub merge_base_sha: String,
    pub ahead_by: usize,
    pub behind_by: usize,
    pub commits: Vec<CommitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub diff: DiffInfo,
}

#[derive(Debug, Serialize)]
pub struct BlameLine {
    pub line: usize,
    pub sha: String,
    pub author: Identity,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct BlameInfo {
    pub path: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub lines: Vec<BlameLine>,
}

#[derive(Debug, Serialize)]
pub struct ReadmeInfo {
    pub filename: String,
    pub content: String,
    pub size: i64,
    pub sha: String,
    pub is_binary: bool,
    pub is_truncated: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommitsQuery {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub path: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub depth: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    #[serde(default)]
    pub raw: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub format: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub cursor: Option<String>,
    pub limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReadmeQuery {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub ref_type: String,
    pub target_sha: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefUpdate {
    pub target_sha: String,
    /// Compare-and-swap guard: reject when the ref no longer points here.
    #[serde(default)]
    pub expected_sha: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DefaultBranchUpdate {
    pub branch: String,
}

use serde::{Deserialize, Serialize};

use crate::types::{Namespace, Timestamp};

// Request bodies

#[derive(Debug, Deserialize)]
pub struct NamespaceCreate {
    pub name: String,
    #[serde(default)]
    pub repo_limit: Option<i32>,
    #[serde(default)]
    pub storage_limit_bytes: Option<i64>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceUpdate {
    #[serde(default)]
    pub repo_limit: Option<i32>,
    #[serde(default)]
    pub storage_limit_bytes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserCreate {
    /// The user's primary namespace, created on the fly when missing.
    pub namespace_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenCreate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceGrantUpsert {
    pub namespace_id: String,
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepoGrantUpsert {
    pub repo_id: String,
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepoCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    /// Defaults to the caller's primary namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepoUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FolderCreate {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepoFolderSet {
    pub folder_ids: Vec<String>,
}

// Query parameters

#[derive(Debug, Default, Deserialize)]
pub struct CursorQuery {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepoListQuery {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FolderListQuery {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FolderDeleteQuery {
    #[serde(default)]
    pub force: Option<bool>,
}

// Response shapes

#[derive(Debug, Serialize)]
pub struct NamespaceGrantView {
    pub namespace_id: String,
    pub allow: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct RepoGrantView {
    pub repo_id: String,
    pub allow: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<&'static str>,
}

/// A grant as seen from the namespace side: who holds it.
#[derive(Debug, Serialize)]
pub struct GrantHolderView {
    pub user_id: String,
    pub allow: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub namespace_grants: Vec<NamespaceGrantView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repo_grants: Vec<RepoGrantView>,
}

/// The raw token appears here once and is never retrievable again.
#[derive(Debug, Serialize)]
pub struct MintedTokenView {
    pub token: String,
    pub metadata: TokenView,
}

#[derive(Debug, Serialize)]
pub struct NamespaceView {
    #[serde(flatten)]
    pub namespace: Namespace,
    pub is_primary: bool,
}

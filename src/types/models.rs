use serde::{Deserialize, Serialize};

use super::{Permission, Timestamp};

/// A tenant boundary. Repos and folders live inside exactly one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    pub name: String,
    pub created_at: Timestamp,
    /// Soft limits; None means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_limit_bytes: Option<i64>,
    /// Opaque correlation id for an embedding platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// A user owns exactly one primary namespace and carries grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub primary_namespace_id: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An auth credential. Admin tokens have no user; user tokens always do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: String,
    pub namespace_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Public repos allow anonymous reads over every surface.
    pub public: bool,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_push_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Flat label for grouping repos within a namespace. No nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub namespace_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceGrant {
    pub user_id: String,
    pub namespace_id: String,
    pub allow_bits: Permission,
    pub deny_bits: Permission,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoGrant {
    pub user_id: String,
    pub repo_id: String,
    pub allow_bits: Permission,
    pub deny_bits: Permission,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Catalogue row for an LFS object held on disk for a repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfsObject {
    pub repo_id: String,
    pub oid: String,
    pub size: i64,
    pub created_at: Timestamp,
}

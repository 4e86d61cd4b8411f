pub mod paths;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// The metadata catalogue.
///
/// All `list_*` operations take a `(cursor, limit)` pair: rows strictly after
/// `cursor` in the listing order are returned, at most `limit` of them.
/// A `limit <= 0` means unlimited. Callers that paginate fetch `limit + 1`
/// rows and slice.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Namespaces
    fn create_namespace(&self, ns: &Namespace) -> Result<()>;
    fn get_namespace(&self, id: &str) -> Result<Option<Namespace>>;
    fn get_namespace_by_name(&self, name: &str) -> Result<Option<Namespace>>;
    fn list_namespaces(&self, cursor: &str, limit: i64) -> Result<Vec<Namespace>>;
    fn update_namespace(&self, ns: &Namespace) -> Result<()>;
    fn delete_namespace(&self, id: &str) -> Result<bool>;

    // Users
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_primary_namespace_id(&self, namespace_id: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i64) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Tokens
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i64) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Repos
    fn create_repo(&self, repo: &Repo) -> Result<()>;
    fn get_repo(&self, namespace_id: &str, name: &str) -> Result<Option<Repo>>;
    fn get_repo_by_id(&self, id: &str) -> Result<Option<Repo>>;
    fn list_repos(&self, namespace_id: &str, cursor: &str, limit: i64) -> Result<Vec<Repo>>;
    fn update_repo(&self, repo: &Repo) -> Result<()>;
    fn delete_repo(&self, id: &str) -> Result<bool>;
    fn update_repo_last_push(&self, id: &str) -> Result<()>;
    fn update_repo_size(&self, id: &str, size_bytes: i64) -> Result<()>;

    // Folders
    fn create_folder(&self, folder: &Folder) -> Result<()>;
    fn get_folder(&self, id: &str) -> Result<Option<Folder>>;
    fn get_folder_by_name(&self, namespace_id: &str, name: &str) -> Result<Option<Folder>>;
    fn list_folders(&self, namespace_id: &str, cursor: &str, limit: i64) -> Result<Vec<Folder>>;
    fn update_folder(&self, folder: &Folder) -> Result<()>;
    fn delete_folder(&self, id: &str) -> Result<bool>;
    fn count_folder_repos(&self, id: &str) -> Result<i64>;

    // Repo <-> folder membership
    fn add_repo_folder(&self, repo_id: &str, folder_id: &str) -> Result<()>;
    fn remove_repo_folder(&self, repo_id: &str, folder_id: &str) -> Result<bool>;
    fn set_repo_folders(&self, repo_id: &str, folder_ids: &[String]) -> Result<()>;
    fn list_repo_folders(&self, repo_id: &str) -> Result<Vec<Folder>>;
    fn list_folder_repos(&self, folder_id: &str) -> Result<Vec<Repo>>;

    // Namespace grants
    fn upsert_namespace_grant(&self, grant: &NamespaceGrant) -> Result<()>;
    fn get_namespace_grant(
        &self,
        user_id: &str,
        namespace_id: &str,
    ) -> Result<Option<NamespaceGrant>>;
    fn delete_namespace_grant(&self, user_id: &str, namespace_id: &str) -> Result<bool>;
    fn list_user_namespace_grants(&self, user_id: &str) -> Result<Vec<NamespaceGrant>>;
    fn list_namespace_grants_for_namespace(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<NamespaceGrant>>;

    // Repo grants
    fn upsert_repo_grant(&self, grant: &RepoGrant) -> Result<()>;
    fn get_repo_grant(&self, user_id: &str, repo_id: &str) -> Result<Option<RepoGrant>>;
    fn delete_repo_grant(&self, user_id: &str, repo_id: &str) -> Result<bool>;
    fn list_user_repo_grants(&self, user_id: &str) -> Result<Vec<RepoGrant>>;
    fn list_user_repos_with_grants(&self, user_id: &str, namespace_id: &str) -> Result<Vec<Repo>>;
    fn has_repo_grants_in_namespace(&self, user_id: &str, namespace_id: &str) -> Result<bool>;

    // LFS objects
    fn upsert_lfs_object(&self, obj: &LfsObject) -> Result<()>;
    fn get_lfs_object(&self, repo_id: &str, oid: &str) -> Result<Option<LfsObject>>;
    fn list_lfs_objects(&self, repo_id: &str) -> Result<Vec<LfsObject>>;
    fn delete_lfs_object(&self, repo_id: &str, oid: &str) -> Result<bool>;
    fn get_repo_lfs_size(&self, repo_id: &str) -> Result<i64>;

    fn close(&self) -> Result<()>;
}

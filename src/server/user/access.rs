//! The permission evaluator.
//!
//! Effective permissions for a user over a resource:
//! `expand(ns.allow) | expand(repo.allow)` minus `ns.deny | repo.deny`.
//! Implied expansion (admin implies write implies read) applies to allow
//! bits only. There is no owner fast path: authority over a user's own
//! primary namespace comes from the grant seeded at creation.

use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{Permission, Repo, User};

/// True when the user holds `required` over the namespace.
pub fn check_namespace_permission(
    store: &dyn Store,
    user: &User,
    namespace_id: &str,
    required: Permission,
) -> Result<bool, ApiError> {
    let grant = store
        .get_namespace_grant(&user.id, namespace_id)
        .api_err("Failed to check namespace grant")?;

    Ok(grant
        .map(|g| {
            g.allow_bits
                .expand_implied()
                .remove(g.deny_bits)
                .contains(required)
        })
        .unwrap_or(false))
}

/// True when the user holds `required` over the repo, merging the
/// namespace-level and repo-level grants.
pub fn check_repo_permission(
    store: &dyn Store,
    user: &User,
    repo: &Repo,
    required: Permission,
) -> Result<bool, ApiError> {
    let ns_grant = store
        .get_namespace_grant(&user.id, &repo.namespace_id)
        .api_err("Failed to check namespace grant")?;

    let repo_grant = store
        .get_repo_grant(&user.id, &repo.id)
        .api_err("Failed to check repo grant")?;

    let mut allow = Permission::empty();
    let mut deny = Permission::empty();

    if let Some(grant) = ns_grant {
        allow |= grant.allow_bits.expand_implied();
        deny |= grant.deny_bits;
    }

    if let Some(grant) = repo_grant {
        allow |= grant.allow_bits.expand_implied();
        deny |= grant.deny_bits;
    }

    Ok(allow.remove(deny).contains(required))
}

/// A namespace is reachable if the user holds any grant on it, or a grant
/// on some repo inside it. The latter lets an operator hand out per-repo
/// access without opening the whole namespace.
pub fn can_access_namespace(
    store: &dyn Store,
    user: &User,
    namespace_id: &str,
) -> Result<bool, ApiError> {
    if store
        .get_namespace_grant(&user.id, namespace_id)
        .api_err("Failed to check namespace grant")?
        .is_some()
    {
        return Ok(true);
    }

    store
        .has_repo_grants_in_namespace(&user.id, namespace_id)
        .api_err("Failed to check repo grants")
}

/// Resolves a namespace name to its id, defaulting to the user's primary
/// namespace when no name is given.
pub fn resolve_namespace_id(
    store: &dyn Store,
    user: &User,
    namespace_name: Option<&str>,
) -> Result<String, ApiError> {
    match namespace_name {
        Some(name) => {
            let ns = store
                .get_namespace_by_name(name)
                .api_err("Failed to lookup namespace")?
                .ok_or_else(|| ApiError::not_found("Namespace not found"))?;
            Ok(ns.id)
        }
        None => Ok(user.primary_namespace_id.clone()),
    }
}

pub fn require_namespace_permission(
    store: &dyn Store,
    user: &User,
    namespace_id: &str,
    required: Permission,
) -> Result<(), ApiError> {
    if !check_namespace_permission(store, user, namespace_id, required)? {
        return Err(ApiError::forbidden("Insufficient namespace permissions"));
    }
    Ok(())
}

pub fn require_repo_permission(
    store: &dyn Store,
    user: &User,
    repo: &Repo,
    required: Permission,
) -> Result<(), ApiError> {
    if !check_repo_permission(store, user, repo, required)? {
        return Err(ApiError::forbidden("Insufficient repository permissions"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Namespace, NamespaceGrant, RepoGrant};
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: SqliteStore,
        user: User,
        repo: Repo,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let now = Utc::now();
        for (id, name) in [("ns-own", "own"), ("ns-other", "other")] {
            store
                .create_namespace(&Namespace {
                    id: id.to_string(),
                    name: name.to_string(),
                    created_at: now,
                    repo_limit: None,
                    storage_limit_bytes: None,
                    external_id: None,
                })
                .unwrap();
        }

        let user = User {
            id: "u-1".to_string(),
            primary_namespace_id: "ns-own".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_user(&user).unwrap();

        let repo = Repo {
            id: "r-1".to_string(),
            namespace_id: "ns-other".to_string(),
            name: "app".to_string(),
            description: None,
            public: false,
            size_bytes: 0,
            last_push_at: None,
            created_at: now,
            updated_at: now,
        };
        store.create_repo(&repo).unwrap();

        Fixture {
            _temp: temp,
            store,
            user,
            repo,
        }
    }

    fn ns_grant(user_id: &str, ns_id: &str, allow: Permission, deny: Permission) -> NamespaceGrant {
        let now = Utc::now();
        NamespaceGrant {
            user_id: user_id.to_string(),
            namespace_id: ns_id.to_string(),
            allow_bits: allow,
            deny_bits: deny,
            created_at: now,
            updated_at: now,
        }
    }

    fn repo_grant(user_id: &str, repo_id: &str, allow: Permission, deny: Permission) -> RepoGrant {
        let now = Utc::now();
        RepoGrant {
            user_id: user_id.to_string(),
            repo_id: repo_id.to_string(),
            allow_bits: allow,
            deny_bits: deny,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_grant_means_no_access() {
        let f = fixture();
        assert!(
            !check_repo_permission(&f.store, &f.user, &f.repo, Permission::REPO_READ).unwrap()
        );
        assert!(!can_access_namespace(&f.store, &f.user, "ns-other").unwrap());
    }

    #[test]
    fn namespace_admin_does_not_cross_scopes() {
        // namespace:admin expands within the namespace scope only.
        let f = fixture();
        f.store
            .upsert_namespace_grant(&ns_grant(
                "u-1",
                "ns-other",
                Permission::NAMESPACE_ADMIN,
                Permission::empty(),
            ))
            .unwrap();

        assert!(
            check_namespace_permission(&f.store, &f.user, "ns-other", Permission::NAMESPACE_READ)
                .unwrap()
        );
        assert!(
            !check_repo_permission(&f.store, &f.user, &f.repo, Permission::REPO_READ).unwrap()
        );
    }

    #[test]
    fn repo_grant_merges_with_namespace_grant() {
        let f = fixture();
        f.store
            .upsert_namespace_grant(&ns_grant(
                "u-1",
                "ns-other",
                Permission::REPO_READ,
                Permission::empty(),
            ))
            .unwrap();
        f.store
            .upsert_repo_grant(&repo_grant(
                "u-1",
                "r-1",
                Permission::REPO_WRITE,
                Permission::empty(),
            ))
            .unwrap();

        assert!(
            check_repo_permission(
                &f.store,
                &f.user,
                &f.repo,
                Permission::REPO_READ | Permission::REPO_WRITE
            )
            .unwrap()
        );
        assert!(
            !check_repo_permission(&f.store, &f.user, &f.repo, Permission::REPO_ADMIN).unwrap()
        );
    }

    #[test]
    fn deny_wins_over_allow_but_does_not_expand() {
        let f = fixture();
        f.store
            .upsert_namespace_grant(&ns_grant(
                "u-1",
                "ns-other",
                Permission::NAMESPACE_ADMIN,
                Permission::NAMESPACE_ADMIN,
            ))
            .unwrap();

        // admin denied, but the implied write and read survive
        assert!(
            !check_namespace_permission(&f.store, &f.user, "ns-other", Permission::NAMESPACE_ADMIN)
                .unwrap()
        );
        assert!(
            check_namespace_permission(&f.store, &f.user, "ns-other", Permission::NAMESPACE_WRITE)
                .unwrap()
        );
        assert!(
            check_namespace_permission(&f.store, &f.user, "ns-other", Permission::NAMESPACE_READ)
                .unwrap()
        );
    }

    #[test]
    fn repo_deny_blocks_namespace_allow() {
        let f = fixture();
        f.store
            .upsert_namespace_grant(&ns_grant(
                "u-1",
                "ns-other",
                Permission::REPO_ADMIN,
                Permission::empty(),
            ))
            .unwrap();
        f.store
            .upsert_repo_grant(&repo_grant(
                "u-1",
                "r-1",
                Permission::empty(),
                Permission::REPO_WRITE,
            ))
            .unwrap();

        assert!(
            !check_repo_permission(&f.store, &f.user, &f.repo, Permission::REPO_WRITE).unwrap()
        );
        assert!(check_repo_permission(&f.store, &f.user, &f.repo, Permission::REPO_READ).unwrap());
    }

    #[test]
    fn repo_grant_alone_makes_namespace_reachable() {
        let f = fixture();
        f.store
            .upsert_repo_grant(&repo_grant(
                "u-1",
                "r-1",
                Permission::REPO_READ,
                Permission::empty(),
            ))
            .unwrap();

        assert!(can_access_namespace(&f.store, &f.user, "ns-other").unwrap());
        assert!(
            !check_namespace_permission(&f.store, &f.user, "ns-other", Permission::NAMESPACE_READ)
                .unwrap()
        );
    }
}

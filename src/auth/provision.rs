//! Token and account provisioning over the store.
//!
//! Lookups are derived from the token id, so a unique-index collision is
//! possible (if astronomically unlikely); every mint loop retries with a
//! fresh id.

use chrono::{DateTime, Utc};

use super::token::TokenGenerator;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{NamespaceGrant, Permission, Token};

const MINT_RETRIES: usize = 5;

fn mint_and_insert(
    store: &dyn Store,
    generator: &TokenGenerator,
    name: Option<String>,
    is_admin: bool,
    user_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(Token, String)> {
    for _ in 0..MINT_RETRIES {
        let minted = generator.mint()?;
        let token = Token {
            id: minted.id,
            token_hash: minted.hash,
            token_lookup: minted.lookup,
            name: name.clone(),
            is_admin,
            user_id: user_id.clone(),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match store.create_token(&token) {
            Ok(()) => return Ok((token, minted.raw)),
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(Error::TokenLookupCollision)
}

/// First-run bootstrap: mints the platform admin token.
pub fn generate_admin_token(
    store: &dyn Store,
    generator: &TokenGenerator,
    name: Option<String>,
) -> Result<(Token, String)> {
    mint_and_insert(store, generator, name, true, None, None)
}

/// Mints a token bound to a user.
pub fn generate_user_token(
    store: &dyn Store,
    generator: &TokenGenerator,
    user_id: &str,
    name: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(Token, String)> {
    mint_and_insert(
        store,
        generator,
        name,
        false,
        Some(user_id.to_string()),
        expires_at,
    )
}

/// Mints a user token and applies namespace grants in the same call.
/// Used when provisioning access for a user in one step.
pub fn generate_user_token_with_grants(
    store: &dyn Store,
    generator: &TokenGenerator,
    user_id: &str,
    name: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    grants: &[(String, Permission, Permission)],
) -> Result<(Token, String)> {
    let now = Utc::now();
    for (namespace_id, allow, deny) in grants {
        store.upsert_namespace_grant(&NamespaceGrant {
            user_id: user_id.to_string(),
            namespace_id: namespace_id.clone(),
            allow_bits: *allow,
            deny_bits: *deny,
            created_at: now,
            updated_at: now,
        })?;
    }

    generate_user_token(store, generator, user_id, name, expires_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::Namespace;
    use crate::types::User;
    use tempfile::TempDir;

    #[test]
    fn admin_bootstrap_creates_usable_token() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let generator = TokenGenerator::new();
        assert!(!store.has_admin_token().unwrap());

        let (token, raw) = generate_admin_token(&store, &generator, None).unwrap();
        assert!(token.is_admin);
        assert!(token.user_id.is_none());
        assert!(store.has_admin_token().unwrap());

        let stored = store
            .get_token_by_lookup(&token.token_lookup)
            .unwrap()
            .unwrap();
        generator.verify(&raw, &stored.token_hash).unwrap();
    }

    #[test]
    fn token_with_grants_seeds_namespace_access() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let now = Utc::now();
        store
            .create_namespace(&Namespace {
                id: "ns-1".to_string(),
                name: "acme".to_string(),
                created_at: now,
                repo_limit: None,
                storage_limit_bytes: None,
                external_id: None,
            })
            .unwrap();
        store
            .create_user(&User {
                id: "u-1".to_string(),
                primary_namespace_id: "ns-1".to_string(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let generator = TokenGenerator::new();
        let grants = vec![(
            "ns-1".to_string(),
            Permission::primary_namespace_defaults(),
            Permission::empty(),
        )];
        let (token, _raw) =
            generate_user_token_with_grants(&store, &generator, "u-1", None, None, &grants)
                .unwrap();

        assert_eq!(token.user_id.as_deref(), Some("u-1"));
        let grant = store.get_namespace_grant("u-1", "ns-1").unwrap().unwrap();
        assert!(grant.allow_bits.contains(Permission::NAMESPACE_WRITE));
    }
}

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::RngCore;
use uuid::Uuid;

use crate::error::{Error, Result};

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "eph";
const LOOKUP_LEN: usize = 8;
const SECRET_LEN: usize = 24;
const SECRET_BYTES: usize = SECRET_LEN / 2;

/// A freshly minted token. `raw` is shown to the caller exactly once;
/// everything else is what gets persisted.
pub struct MintedToken {
    pub id: String,
    pub lookup: String,
    pub raw: String,
    pub hash: String,
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Mints a new token. The lookup is the first 8 hex chars of the token's
    /// own UUID, so a row can be found before the expensive verify.
    pub fn mint(&self) -> Result<MintedToken> {
        let id = Uuid::new_v4().to_string();
        let lookup = id[..LOOKUP_LEN].to_string();
        let secret = generate_secret();
        let raw = build_token(&lookup, &secret);
        let hash = self.hash(&raw)?;

        Ok(MintedToken {
            id,
            lookup,
            raw,
            hash,
        })
    }

    /// Argon2id with a fresh random salt, serialised in PHC form.
    pub fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Constant-time verification of a raw token against a stored PHC hash.
    pub fn verify(&self, token: &str, hash: &str) -> Result<()> {
        let parsed = PasswordHash::new(hash).map_err(|_| Error::InvalidHash)?;

        match self.argon2.verify_password(token.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(Error::HashMismatch),
            Err(_) => Err(Error::InvalidHash),
        }
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `eph_<lookup>_<secret>`.
#[must_use]
pub fn build_token(lookup: &str, secret: &str) -> String {
    format!("{TOKEN_PREFIX}_{lookup}_{secret}")
}

/// Splits a wire token into `(lookup, secret)`. The inverse of
/// [`build_token`] for every valid pair.
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let mut parts = token.split('_');

    let (prefix, lookup, secret) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(l), Some(s), None) => (p, l, s),
        _ => return Err(Error::InvalidToken),
    };

    if prefix != TOKEN_PREFIX || lookup.len() != LOOKUP_LEN || secret.len() != SECRET_LEN {
        return Err(Error::InvalidToken);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_produces_wire_format() {
        let generator = TokenGenerator::new();
        let minted = generator.mint().unwrap();

        assert!(minted.raw.starts_with("eph_"));
        assert_eq!(minted.lookup.len(), 8);
        assert_eq!(&minted.id[..8], minted.lookup);
        assert!(minted.hash.starts_with("$argon2id$"));

        let (lookup, secret) = parse_token(&minted.raw).unwrap();
        assert_eq!(lookup, minted.lookup);
        assert_eq!(secret.len(), 24);
    }

    #[test]
    fn build_parse_roundtrip() {
        let raw = build_token("12345678", "123456789012345678901234");
        let (lookup, secret) = parse_token(&raw).unwrap();
        assert_eq!(lookup, "12345678");
        assert_eq!(secret, "123456789012345678901234");
    }

    #[test]
    fn parse_rejects_malformed_tokens() {
        for bad in [
            "",
            "eph",
            "eph_12345678",
            "eph_12345678_short",
            "eph_12345678_123456789012345678901234_extra",
            "gph_12345678_123456789012345678901234",
            "eph_1234567_123456789012345678901234",
        ] {
            assert!(parse_token(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn verify_accepts_matching_token() {
        let generator = TokenGenerator::new();
        let minted = generator.mint().unwrap();
        generator.verify(&minted.raw, &minted.hash).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_token() {
        let generator = TokenGenerator::new();
        let minted = generator.mint().unwrap();
        let other = generator.mint().unwrap();

        assert!(matches!(
            generator.verify(&other.raw, &minted.hash),
            Err(Error::HashMismatch)
        ));
        assert!(matches!(
            generator.verify(&minted.raw, "not-a-phc-string"),
            Err(Error::InvalidHash)
        ));
    }

    #[test]
    fn hash_uses_fresh_salt() {
        let generator = TokenGenerator::new();
        let a = generator.hash("eph_aaaaaaaa_bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let b = generator.hash("eph_aaaaaaaa_bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        assert_ne!(a, b);
    }
}

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A bitmask of granted permissions over repos and namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

const NAMES: &[(&str, Permission)] = &[
    ("repo:read", Permission::REPO_READ),
    ("repo:write", Permission::REPO_WRITE),
    ("repo:admin", Permission::REPO_ADMIN),
    ("namespace:read", Permission::NAMESPACE_READ),
    ("namespace:write", Permission::NAMESPACE_WRITE),
    ("namespace:admin", Permission::NAMESPACE_ADMIN),
];

impl Permission {
    pub const REPO_READ: Permission = Permission(1);
    pub const REPO_WRITE: Permission = Permission(1 << 1);
    pub const REPO_ADMIN: Permission = Permission(1 << 2);
    pub const NAMESPACE_READ: Permission = Permission(1 << 3);
    pub const NAMESPACE_WRITE: Permission = Permission(1 << 4);
    pub const NAMESPACE_ADMIN: Permission = Permission(1 << 5);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `required` is present in `self`.
    #[must_use]
    pub const fn contains(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Removes `other`'s bits from this mask.
    #[must_use]
    pub const fn remove(self, other: Permission) -> Permission {
        Permission(self.0 & !other.0)
    }

    /// Expands the mask with implied permissions: admin implies write
    /// implies read, independently for the repo and namespace scopes.
    ///
    /// Only ever applied to ALLOW bits. Deny bits are used as stored.
    #[must_use]
    pub const fn expand_implied(self) -> Permission {
        let mut bits = self.0;
        if bits & Self::REPO_ADMIN.0 != 0 {
            bits |= Self::REPO_WRITE.0;
        }
        if bits & Self::REPO_WRITE.0 != 0 {
            bits |= Self::REPO_READ.0;
        }
        if bits & Self::NAMESPACE_ADMIN.0 != 0 {
            bits |= Self::NAMESPACE_WRITE.0;
        }
        if bits & Self::NAMESPACE_WRITE.0 != 0 {
            bits |= Self::NAMESPACE_READ.0;
        }
        Permission(bits)
    }

    /// The allow mask seeded on a user's primary namespace at creation:
    /// namespace:write + repo:admin (read bits follow by implication).
    #[must_use]
    pub const fn primary_namespace_defaults() -> Permission {
        Permission(Self::NAMESPACE_WRITE.0 | Self::REPO_ADMIN.0)
    }

    pub fn parse(s: &str) -> Option<Permission> {
        NAMES.iter().find(|(name, _)| *name == s).map(|(_, p)| *p)
    }

    pub fn parse_many<S: AsRef<str>>(strs: &[S]) -> Option<Permission> {
        strs.iter()
            .map(|s| Self::parse(s.as_ref()))
            .try_fold(Permission::empty(), |acc, p| Some(acc | p?))
    }

    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, p)| self.contains(*p))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

impl From<i64> for Permission {
    fn from(bits: i64) -> Self {
        Self(bits as u32)
    }
}

impl From<Permission> for i64 {
    fn from(p: Permission) -> Self {
        i64::from(p.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_checks_all_bits() {
        let p = Permission::REPO_READ | Permission::REPO_WRITE;
        assert!(p.contains(Permission::REPO_READ));
        assert!(p.contains(Permission::REPO_READ | Permission::REPO_WRITE));
        assert!(!p.contains(Permission::REPO_ADMIN));
    }

    #[test]
    fn expand_implied_cascades_per_scope() {
        let expanded = Permission::REPO_ADMIN.expand_implied();
        assert!(expanded.contains(Permission::REPO_WRITE));
        assert!(expanded.contains(Permission::REPO_READ));
        assert!(!expanded.contains(Permission::NAMESPACE_READ));

        let expanded = Permission::NAMESPACE_WRITE.expand_implied();
        assert!(expanded.contains(Permission::NAMESPACE_READ));
        assert!(!expanded.contains(Permission::NAMESPACE_ADMIN));
        assert!(!expanded.contains(Permission::REPO_READ));
    }

    #[test]
    fn deny_is_removed_after_expansion() {
        // allow namespace:admin, deny namespace:admin: the implied write and
        // read survive because deny bits never expand.
        let allow = Permission::NAMESPACE_ADMIN.expand_implied();
        let effective = allow.remove(Permission::NAMESPACE_ADMIN);
        assert!(effective.contains(Permission::NAMESPACE_WRITE));
        assert!(effective.contains(Permission::NAMESPACE_READ));
        assert!(!effective.contains(Permission::NAMESPACE_ADMIN));
    }

    #[test]
    fn parse_roundtrip() {
        for (name, perm) in NAMES {
            assert_eq!(Permission::parse(name), Some(*perm));
            assert_eq!(perm.names(), vec![*name]);
        }
        assert_eq!(Permission::parse("repo:execute"), None);
    }

    #[test]
    fn parse_many_combines_or_rejects() {
        let p = Permission::parse_many(&["repo:read", "namespace:read"]).unwrap();
        assert!(p.contains(Permission::REPO_READ | Permission::NAMESPACE_READ));
        assert!(Permission::parse_many(&["repo:read", "bogus"]).is_none());
    }
}

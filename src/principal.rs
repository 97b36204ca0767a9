//! Principals and the directory of registered identities.
//!
//! A principal is identified by its normalised address (trimmed,
//! lowercased). Ownership and grants always reference this identifier, so
//! comparisons are insensitive to case and surrounding whitespace in caller
//! input.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult, VaultError};

/// A normalised principal identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Normalise and validate a raw identifier.
    ///
    /// Fails with `InvalidPrincipal` if nothing is left after trimming or if
    /// the identifier contains control characters (NUL is the key separator
    /// in the redb indexes).
    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let normalised = raw.trim().to_lowercase();
        if normalised.is_empty() || normalised.chars().any(char::is_control) {
            return Err(VaultError::InvalidPrincipal);
        }
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The registry of identities allowed to own or receive objects.
///
/// Credentials live elsewhere; the directory only answers whether an
/// identity is registered.
pub trait PrincipalDirectory: Send + Sync {
    fn exists(&self, principal: &PrincipalId) -> StoreResult<bool>;

    /// Resolve a raw identifier to a registered principal, if there is one.
    fn resolve(&self, raw: &str) -> StoreResult<Option<PrincipalId>> {
        let Ok(principal) = PrincipalId::parse(raw) else {
            return Ok(None);
        };
        Ok(self.exists(&principal)?.then_some(principal))
    }
}

impl<T: PrincipalDirectory + ?Sized> PrincipalDirectory for std::sync::Arc<T> {
    fn exists(&self, principal: &PrincipalId) -> StoreResult<bool> {
        (**self).exists(principal)
    }
}

/// A directory held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    principals: RwLock<BTreeSet<PrincipalId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal. Returns `false` if it was already registered.
    pub fn register(&self, raw: &str) -> Result<bool, VaultError> {
        let principal = PrincipalId::parse(raw)?;
        let mut principals = self.principals.write().map_err(|_| StoreError::Poisoned)?;
        Ok(principals.insert(principal))
    }
}

impl PrincipalDirectory for InMemoryDirectory {
    fn exists(&self, principal: &PrincipalId) -> StoreResult<bool> {
        let principals = self.principals.read().map_err(|_| StoreError::Poisoned)?;
        Ok(principals.contains(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_lowercases() {
        let p = PrincipalId::parse("  Alice@Example.COM \n").unwrap();
        assert_eq!(p.as_str(), "alice@example.com");
        assert_eq!(p, PrincipalId::parse("alice@example.com").unwrap());
    }

    #[test]
    fn test_parse_rejects_empty_and_control() {
        assert!(matches!(PrincipalId::parse("   "), Err(VaultError::InvalidPrincipal)));
        assert!(matches!(PrincipalId::parse("a\0b"), Err(VaultError::InvalidPrincipal)));
    }

    #[test]
    fn test_directory_register_and_resolve() {
        let dir = InMemoryDirectory::new();
        assert!(dir.register("Bob").unwrap());
        assert!(!dir.register(" bob ").unwrap());

        assert_eq!(dir.resolve("BOB").unwrap(), Some(PrincipalId::parse("bob").unwrap()));
        assert_eq!(dir.resolve("carol").unwrap(), None);
        assert_eq!(dir.resolve("").unwrap(), None);
    }
}

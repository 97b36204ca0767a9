//! # objectvault
//!
//! Encrypted object storage with owner-controlled sharing.
//!
//! Every object is sealed under its own freshly generated AES-256-GCM key.
//! The owner can grant other registered principals read access, revoke it
//! again, and delete the object together with every grant on it. Reads are
//! gated by a single predicate: the requester owns the object or holds a
//! grant for it.
//!
//! ## Public API
//!
//! [`Vault`] is the entry point. It is generic over a [`MetadataStore`]
//! (where objects and grants live) and a [`PrincipalDirectory`] (which
//! identities exist). Two backends ship with the crate:
//!
//! - [`InMemoryStore`] + [`InMemoryDirectory`] for tests and embedding.
//! - [`RedbStore`], a single-file embedded database that serves as both.
//!
//! ```no_run
//! use objectvault::{Vault, VaultConfig};
//!
//! let vault = Vault::open(VaultConfig::from_env()?)?;
//! vault.directory().register("alice@example.com")?;
//! let id = vault.store("alice@example.com", b"hello vault", "hello.txt", "text/plain")?;
//! assert_eq!(vault.retrieve_plaintext(id, "alice@example.com")?, b"hello vault");
//! # Ok::<(), objectvault::VaultError>(())
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber itself.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod model;
pub mod principal;
pub mod store;
pub mod vault;

pub use audit::{AuditAction, AuditOutcome, AuditRecord, AuditSink, FileAuditSink};
pub use config::VaultConfig;
pub use crypto::Envelope;
pub use error::{StoreError, VaultError, VaultResult};
pub use ledger::GrantOutcome;
pub use model::{GrantId, ObjectId, ObjectMetadata};
pub use principal::{InMemoryDirectory, PrincipalDirectory, PrincipalId};
pub use store::{InMemoryStore, MetadataStore, RedbStore};
pub use vault::Vault;

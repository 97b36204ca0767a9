//! Error types for objectvault.
//!
//! Every variant is a distinct failure mode of the vault. Messages are
//! intentionally minimal: they say *what* failed without echoing key
//! material, plaintext, or anything else that could leak secret state.

use crate::model::ObjectId;

/// The single error type for all vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The caller tried an owner-only operation on an object it does not own.
    #[error("caller is not the owner of object {0}")]
    NotOwner(ObjectId),

    /// The caller is neither the owner nor a grant recipient.
    #[error("access denied to object {0}")]
    AccessDenied(ObjectId),

    /// An owner tried to share an object with itself.
    #[error("an object cannot be shared with its owner")]
    SelfShare,

    /// The principal is not registered in the directory.
    #[error("principal is not registered: {0}")]
    UnknownPrincipal(String),

    /// The object (or principal) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The envelope failed AEAD verification: tampered or corrupted
    /// ciphertext, or the wrong key. Never retried.
    #[error("object failed integrity verification")]
    CorruptObject,

    /// A key was malformed (wrong length, bad encoding).
    #[error("invalid key")]
    InvalidKey,

    /// Encryption failed. The underlying `ring` operation returned an error.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// A principal identifier was empty or contained control characters.
    #[error("invalid principal identifier")]
    InvalidPrincipal,

    /// A caller-supplied argument was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The plaintext exceeds the configured object size limit.
    #[error("object of {actual} bytes exceeds the {limit}-byte limit")]
    ObjectTooLarge { limit: usize, actual: usize },

    /// The persistence layer failed.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

impl VaultError {
    /// True if the caller may retry the whole operation.
    ///
    /// Only transient storage failures qualify. Authorization, validation and
    /// integrity failures are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure(e) if e.is_transient())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Failures raised by a [`MetadataStore`](crate::store::MetadataStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A stored record could not be decoded.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether the failure may clear up on its own (I/O hiccup, contention).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transaction(_) | Self::Commit(_) | Self::Io(_) => true,
            Self::Storage(e) => matches!(e, redb::StorageError::Io(_)),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

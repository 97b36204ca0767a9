//! Object metadata store.
//!
//! The vault talks to persistence only through [`MetadataStore`]. Every
//! access happens inside a unit of work:
//!
//! - `read` hands the closure a consistent snapshot (`&dyn StoreReader`).
//! - `write` hands the closure a transaction (`&mut dyn StoreWriter`) and
//!   commits only if the closure returns `Ok`. An `Err` discards every change
//!   made inside the closure, so multi-record sequences (grant with existence
//!   check, cascade delete) are all-or-nothing.
//!
//! Stores persist the [`Envelope`](crate::crypto::Envelope) bytes verbatim and
//! never interpret them.

mod memory;
mod redb_store;

pub use memory::InMemoryStore;
pub use redb_store::RedbStore;

use crate::error::{StoreError, StoreResult};
use crate::model::{GrantId, GrantInsert, NewObject, ObjectId, ObjectMetadata, SecureObject, ShareGrant};
use crate::principal::PrincipalId;

/// Read access to objects and grants.
pub trait StoreReader {
    /// Load an object including its envelope and encoded key.
    fn object(&self, id: ObjectId) -> StoreResult<Option<SecureObject>>;

    /// Load only the non-secret attributes of an object.
    fn metadata(&self, id: ObjectId) -> StoreResult<Option<ObjectMetadata>>;

    fn owned_by(&self, owner: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>>;

    /// The grant for this (object, recipient) pair, if any.
    fn grant(&self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<Option<GrantId>>;

    fn grants_for(&self, id: ObjectId) -> StoreResult<Vec<ShareGrant>>;

    /// Metadata of every object `recipient` holds a grant for.
    fn shared_with(&self, recipient: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>>;
}

/// Mutations, available only inside [`MetadataStore::write`].
pub trait StoreWriter: StoreReader {
    /// Insert a new object and return the identifier the store assigned.
    fn insert_object(&mut self, object: NewObject) -> StoreResult<ObjectId>;

    /// Insert a grant unless one exists for the pair. Writes nothing if the
    /// object row is gone.
    fn insert_grant_if_absent(
        &mut self,
        id: ObjectId,
        recipient: &PrincipalId,
    ) -> StoreResult<GrantInsert>;

    /// Returns `true` if a grant was removed.
    fn remove_grant(&mut self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<bool>;

    /// Remove every grant referencing the object. Returns how many went.
    fn remove_grants_for(&mut self, id: ObjectId) -> StoreResult<usize>;

    /// Remove the object row and its payload. Returns `true` if it existed.
    fn remove_object(&mut self, id: ObjectId) -> StoreResult<bool>;
}

/// A transactional store for objects and grants.
pub trait MetadataStore: Send + Sync {
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn StoreReader) -> Result<T, E>;

    fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E>;
}

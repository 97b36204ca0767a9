//! Embedded metadata store backed by redb (pure Rust, ACID).
//!
//! ## Table layout
//!
//! - `objects`: object id → JSON metadata record (incl. encoded key)
//! - `payloads`: object id → raw envelope bytes, stored verbatim
//! - `owner_index`: `owner | 0x00 | object id` → object id
//! - `grants`: `object id | 0x00 | recipient` → grant id
//! - `recipient_index`: `recipient | 0x00 | object id` → grant id
//! - `principals`: normalised principal → registration time (unix seconds)
//!
//! Principals cannot contain control characters, so `0x00` never appears
//! inside a component and `prefix | 0x00 .. prefix | 0x01` scans exactly one
//! owner, recipient or object.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, Table,
    TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult, VaultError};
use crate::model::{
    GrantId, GrantInsert, NewObject, ObjectId, ObjectMetadata, SecureObject, ShareGrant,
};
use crate::crypto::Envelope;
use crate::principal::{PrincipalDirectory, PrincipalId};

use super::{MetadataStore, StoreReader, StoreWriter};

// =============================================================================
// Table Definitions
// =============================================================================

type Bytes = &'static [u8];

const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");
const PAYLOADS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("payloads");
const OWNER_INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("owner_index");
const GRANTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("grants");
const RECIPIENT_INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("recipient_index");
const PRINCIPALS: TableDefinition<&str, i64> = TableDefinition::new("principals");

const SEPARATOR: u8 = 0x00;

/// Persisted form of an object's metadata. The id is the row key.
#[derive(Serialize, Deserialize)]
struct ObjectRecord {
    name: String,
    content_type: String,
    owner: PrincipalId,
    created_at: DateTime<Utc>,
    wrapped_key: String,
}

impl ObjectRecord {
    fn metadata(self, id: ObjectId) -> (ObjectMetadata, String) {
        let metadata = ObjectMetadata {
            id,
            name: self.name,
            content_type: self.content_type,
            owner: self.owner,
            created_at: self.created_at,
        };
        (metadata, self.wrapped_key)
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

fn composite_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(SEPARATOR);
    key.extend_from_slice(suffix);
    key
}

/// Half-open bounds covering every composite key that starts with `prefix`.
fn prefix_bounds(prefix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = prefix.to_vec();
    start.push(SEPARATOR);
    let mut end = prefix.to_vec();
    end.push(SEPARATOR + 1);
    (start, end)
}

fn id_bytes(raw: &[u8]) -> StoreResult<[u8; 16]> {
    raw.try_into()
        .map_err(|_| StoreError::Malformed(format!("expected 16-byte id, got {}", raw.len())))
}

/// The trailing object id of an owner or recipient index key.
fn trailing_object_id(key: &[u8]) -> StoreResult<ObjectId> {
    let start = key
        .len()
        .checked_sub(16)
        .ok_or_else(|| StoreError::Malformed("index key too short".into()))?;
    Ok(ObjectId::from_bytes(id_bytes(&key[start..])?))
}

/// The recipient suffix of a grant key.
fn grant_recipient(key: &[u8]) -> StoreResult<PrincipalId> {
    let raw = key
        .get(17..)
        .ok_or_else(|| StoreError::Malformed("grant key too short".into()))?;
    let text = std::str::from_utf8(raw).map_err(|e| StoreError::Malformed(e.to_string()))?;
    PrincipalId::parse(text).map_err(|_| StoreError::Malformed("grant recipient".into()))
}

fn scan_prefix<T: ReadableTable<Bytes, Bytes>>(
    table: &T,
    prefix: &[u8],
) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let (start, end) = prefix_bounds(prefix);
    let mut entries = Vec::new();
    for entry in table.range(start.as_slice()..end.as_slice())? {
        let (key, value) = entry?;
        entries.push((key.value().to_vec(), value.value().to_vec()));
    }
    Ok(entries)
}

// =============================================================================
// Unit of work
// =============================================================================

/// The five object/grant tables opened inside one redb transaction.
///
/// Read transactions use `ReadOnlyTable`, write transactions use `Table`;
/// every read path is shared through the generic `StoreReader` impl.
struct Tables<T> {
    objects: T,
    payloads: T,
    owners: T,
    grants: T,
    recipients: T,
}

impl Tables<ReadOnlyTable<Bytes, Bytes>> {
    fn open_read(txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            objects: txn.open_table(OBJECTS)?,
            payloads: txn.open_table(PAYLOADS)?,
            owners: txn.open_table(OWNER_INDEX)?,
            grants: txn.open_table(GRANTS)?,
            recipients: txn.open_table(RECIPIENT_INDEX)?,
        })
    }
}

impl<'txn> Tables<Table<'txn, Bytes, Bytes>> {
    fn open_write(txn: &'txn WriteTransaction) -> StoreResult<Self> {
        Ok(Self {
            objects: txn.open_table(OBJECTS)?,
            payloads: txn.open_table(PAYLOADS)?,
            owners: txn.open_table(OWNER_INDEX)?,
            grants: txn.open_table(GRANTS)?,
            recipients: txn.open_table(RECIPIENT_INDEX)?,
        })
    }
}

impl<T: ReadableTable<Bytes, Bytes>> Tables<T> {
    fn record(&self, id: ObjectId) -> StoreResult<Option<(ObjectMetadata, String)>> {
        let Some(row) = self.objects.get(&id.as_bytes()[..])? else {
            return Ok(None);
        };
        let record: ObjectRecord = serde_json::from_slice(row.value())?;
        Ok(Some(record.metadata(id)))
    }

    fn metadata_for(&self, ids: impl IntoIterator<Item = ObjectId>) -> StoreResult<Vec<ObjectMetadata>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some((metadata, _)) = self.record(id)? {
                out.push(metadata);
            }
        }
        Ok(out)
    }
}

impl<T: ReadableTable<Bytes, Bytes>> StoreReader for Tables<T> {
    fn object(&self, id: ObjectId) -> StoreResult<Option<SecureObject>> {
        let Some((metadata, wrapped_key)) = self.record(id)? else {
            return Ok(None);
        };
        let payload = self
            .payloads
            .get(&id.as_bytes()[..])?
            .map(|row| row.value().to_vec())
            .ok_or_else(|| StoreError::Malformed(format!("object {id} has no payload")))?;
        Ok(Some(SecureObject {
            metadata,
            envelope: Envelope::from_bytes(payload),
            wrapped_key,
        }))
    }

    fn metadata(&self, id: ObjectId) -> StoreResult<Option<ObjectMetadata>> {
        Ok(self.record(id)?.map(|(metadata, _)| metadata))
    }

    fn owned_by(&self, owner: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>> {
        let ids = scan_prefix(&self.owners, owner.as_str().as_bytes())?
            .into_iter()
            .map(|(key, _)| trailing_object_id(&key))
            .collect::<StoreResult<Vec<_>>>()?;
        self.metadata_for(ids)
    }

    fn grant(&self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<Option<GrantId>> {
        let key = composite_key(id.as_bytes(), recipient.as_str().as_bytes());
        match self.grants.get(key.as_slice())? {
            Some(row) => Ok(Some(GrantId::from_bytes(id_bytes(row.value())?))),
            None => Ok(None),
        }
    }

    fn grants_for(&self, id: ObjectId) -> StoreResult<Vec<ShareGrant>> {
        scan_prefix(&self.grants, id.as_bytes())?
            .into_iter()
            .map(|(key, value)| {
                Ok(ShareGrant {
                    id: GrantId::from_bytes(id_bytes(&value)?),
                    object_id: id,
                    recipient: grant_recipient(&key)?,
                })
            })
            .collect()
    }

    fn shared_with(&self, recipient: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>> {
        let ids = scan_prefix(&self.recipients, recipient.as_str().as_bytes())?
            .into_iter()
            .map(|(key, _)| trailing_object_id(&key))
            .collect::<StoreResult<Vec<_>>>()?;
        self.metadata_for(ids)
    }
}

impl<'txn> StoreWriter for Tables<Table<'txn, Bytes, Bytes>> {
    fn insert_object(&mut self, object: NewObject) -> StoreResult<ObjectId> {
        let mut id = ObjectId::new();
        while self.objects.get(&id.as_bytes()[..])?.is_some() {
            id = ObjectId::new();
        }
        let key = &id.as_bytes()[..];

        let record = ObjectRecord {
            name: object.name,
            content_type: object.content_type,
            owner: object.owner,
            created_at: object.created_at,
            wrapped_key: object.wrapped_key,
        };
        let json = serde_json::to_vec(&record)?;
        let owner_key = composite_key(record.owner.as_str().as_bytes(), key);

        self.objects.insert(key, json.as_slice())?;
        self.payloads.insert(key, object.envelope.as_bytes())?;
        self.owners.insert(owner_key.as_slice(), key)?;
        Ok(id)
    }

    fn insert_grant_if_absent(
        &mut self,
        id: ObjectId,
        recipient: &PrincipalId,
    ) -> StoreResult<GrantInsert> {
        if self.objects.get(&id.as_bytes()[..])?.is_none() {
            return Ok(GrantInsert::ObjectMissing);
        }
        if let Some(existing) = self.grant(id, recipient)? {
            return Ok(GrantInsert::AlreadyPresent(existing));
        }

        let grant_id = GrantId::new();
        let grant_key = composite_key(id.as_bytes(), recipient.as_str().as_bytes());
        let index_key = composite_key(recipient.as_str().as_bytes(), id.as_bytes());
        self.grants.insert(grant_key.as_slice(), &grant_id.as_bytes()[..])?;
        self.recipients.insert(index_key.as_slice(), &grant_id.as_bytes()[..])?;
        Ok(GrantInsert::Created(grant_id))
    }

    fn remove_grant(&mut self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<bool> {
        let grant_key = composite_key(id.as_bytes(), recipient.as_str().as_bytes());
        let removed = self.grants.remove(grant_key.as_slice())?.is_some();
        if removed {
            let index_key = composite_key(recipient.as_str().as_bytes(), id.as_bytes());
            self.recipients.remove(index_key.as_slice())?;
        }
        Ok(removed)
    }

    fn remove_grants_for(&mut self, id: ObjectId) -> StoreResult<usize> {
        let keys: Vec<Vec<u8>> = scan_prefix(&self.grants, id.as_bytes())?
            .into_iter()
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            let recipient = grant_recipient(key)?;
            let index_key = composite_key(recipient.as_str().as_bytes(), id.as_bytes());
            self.grants.remove(key.as_slice())?;
            self.recipients.remove(index_key.as_slice())?;
        }
        Ok(keys.len())
    }

    fn remove_object(&mut self, id: ObjectId) -> StoreResult<bool> {
        let Some((metadata, _)) = self.record(id)? else {
            return Ok(false);
        };
        let key = &id.as_bytes()[..];
        let owner_key = composite_key(metadata.owner.as_str().as_bytes(), key);

        self.objects.remove(key)?;
        self.payloads.remove(key)?;
        self.owners.remove(owner_key.as_slice())?;
        Ok(true)
    }
}

// =============================================================================
// RedbStore
// =============================================================================

/// A [`MetadataStore`] and [`PrincipalDirectory`] backed by one redb file.
///
/// Cloning is cheap and every clone shares the same database handle, so one
/// instance can serve as both store and directory of a
/// [`Vault`](crate::Vault).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail.
        let txn = db.begin_write()?;
        {
            Tables::open_write(&txn)?;
            txn.open_table(PRINCIPALS)?;
        }
        txn.commit()?;

        tracing::debug!(path = %path.display(), "opened redb object store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Register a principal. Returns `false` if it was already registered.
    pub fn register(&self, raw: &str) -> Result<bool, VaultError> {
        let principal = PrincipalId::parse(raw)?;
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let fresh = {
            let mut table = txn.open_table(PRINCIPALS).map_err(StoreError::from)?;
            let fresh = table
                .get(principal.as_str())
                .map_err(StoreError::from)?
                .is_none();
            if fresh {
                table
                    .insert(principal.as_str(), Utc::now().timestamp())
                    .map_err(StoreError::from)?;
            }
            fresh
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(fresh)
    }
}

impl MetadataStore for RedbStore {
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn StoreReader) -> Result<T, E>,
    {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        let tables = Tables::open_read(&txn)?;
        f(&tables)
    }

    fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E>,
    {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let result = Tables::open_write(&txn)
            .map_err(E::from)
            .and_then(|mut tables| f(&mut tables));

        match result {
            Ok(out) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(out)
            }
            Err(e) => {
                txn.abort().map_err(StoreError::from)?;
                Err(e)
            }
        }
    }
}

impl PrincipalDirectory for RedbStore {
    fn exists(&self, principal: &PrincipalId) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PRINCIPALS)?;
        let found = table.get(principal.as_str())?.is_some();
        Ok(found)
    }
}

//! The vault: every operation a caller can perform on stored objects.
//!
//! Each operation is one linear sequence with the authorization gate in
//! front of any cryptographic work or storage side effect:
//!
//! ```text
//! store     validate -> generate key -> seal -> insert (one unit of work)
//! retrieve  load metadata -> authorize_read -> load envelope -> decode key -> open
//! share     load metadata -> owner check -> self / registered checks -> insert-if-absent
//! delete    load metadata -> owner check -> drop grants -> drop object (one unit of work)
//! ```
//!
//! The caller's identity is always an explicit argument. It is assumed to be
//! authenticated already; the vault only normalises it.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::audit::{AuditAction, AuditLog, AuditOutcome, AuditRecord, AuditSink, FileAuditSink};
use crate::config::VaultConfig;
use crate::crypto::{self, Envelope};
use crate::error::{StoreError, VaultError, VaultResult};
use crate::keys;
use crate::ledger::{self, GrantOutcome};
use crate::model::{NewObject, ObjectId, ObjectMetadata, SecureObject, DEFAULT_CONTENT_TYPE};
use crate::principal::{PrincipalDirectory, PrincipalId};
use crate::store::{MetadataStore, RedbStore, StoreReader};

/// Extension given to exported envelope files.
pub const EXPORT_EXTENSION: &str = "sealed";

/// Encrypted object vault over a metadata store and a principal directory.
pub struct Vault<S, D> {
    store: S,
    directory: D,
    config: VaultConfig,
    audit: Mutex<AuditLog>,
}

impl<S, D> std::fmt::Debug for Vault<S, D>
where
    S: std::fmt::Debug,
    D: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("store", &self.store)
            .field("directory", &self.directory)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Vault<RedbStore, RedbStore> {
    /// Open a redb-backed vault as described by `config`.
    ///
    /// The same database file serves as object store and principal
    /// directory. If `config.audit_log` is set, records are also appended
    /// to that file.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(StoreError::from)?;
        let store = RedbStore::open(&config.database_path())?;
        let audit_path = config.audit_log.clone();
        let vault = Self::with_config(store.clone(), store, config);

        if let Some(path) = audit_path {
            let sink = FileAuditSink::new(&path).map_err(StoreError::from)?;
            vault.add_audit_sink(Box::new(sink));
        }
        tracing::info!(data_dir = %vault.config.data_dir.display(), "vault opened");
        Ok(vault)
    }
}

impl<S, D> Vault<S, D>
where
    S: MetadataStore,
    D: PrincipalDirectory,
{
    pub fn new(store: S, directory: D) -> Self {
        Self::with_config(store, directory, VaultConfig::default())
    }

    pub fn with_config(store: S, directory: D, config: VaultConfig) -> Self {
        Self {
            store,
            directory,
            config,
            audit: Mutex::new(AuditLog::new()),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Forward every future audit record to `sink` as well.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        self.audit_log().attach(sink);
    }

    /// A snapshot of the in-memory audit trail.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit_log().records().to_vec()
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    /// Encrypt `plaintext` under a fresh key and persist it for `owner`.
    ///
    /// Metadata, envelope and encoded key are written in one unit of work;
    /// nothing is persisted if any step fails.
    pub fn store(
        &self,
        owner: &str,
        plaintext: &[u8],
        name: &str,
        content_type: &str,
    ) -> VaultResult<ObjectId> {
        let owner = PrincipalId::parse(owner)?;
        let result = self.store_inner(&owner, plaintext, name, content_type);
        let object_id = result.as_ref().ok().copied();
        self.finish(AuditAction::Store, object_id, &owner, None, result)
    }

    fn store_inner(
        &self,
        owner: &PrincipalId,
        plaintext: &[u8],
        name: &str,
        content_type: &str,
    ) -> VaultResult<ObjectId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::InvalidInput("object name is empty".into()));
        }
        if plaintext.len() > self.config.max_object_bytes {
            return Err(VaultError::ObjectTooLarge {
                limit: self.config.max_object_bytes,
                actual: plaintext.len(),
            });
        }
        if !self.directory.exists(owner)? {
            return Err(VaultError::UnknownPrincipal(owner.to_string()));
        }

        let content_type = match content_type.trim() {
            "" => DEFAULT_CONTENT_TYPE,
            declared => declared,
        };

        let key = keys::generate_key()?;
        let envelope = crypto::seal(plaintext, &key)?;
        let object = NewObject {
            name: name.to_string(),
            content_type: content_type.to_string(),
            owner: owner.clone(),
            created_at: Utc::now(),
            envelope,
            wrapped_key: keys::encode_key(&key),
        };

        self.store
            .write(|w| -> VaultResult<ObjectId> { Ok(w.insert_object(object)?) })
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    /// Decrypt and return an object's contents.
    ///
    /// Fails `NotFound` if the object does not exist, `AccessDenied` if the
    /// requester is neither owner nor recipient, and `CorruptObject` if the
    /// envelope does not verify.
    pub fn retrieve_plaintext(&self, object_id: ObjectId, requester: &str) -> VaultResult<Vec<u8>> {
        let requester = PrincipalId::parse(requester)?;
        let result = self.load_authorized(object_id, &requester).and_then(|object| {
            let key = keys::decode_key(&object.wrapped_key).map_err(|_| VaultError::CorruptObject)?;
            crypto::open(&object.envelope, &key)
        });
        self.finish(AuditAction::Retrieve, Some(object_id), &requester, None, result)
    }

    /// Return the sealed envelope without opening it, for export or backup.
    ///
    /// Gated exactly like [`retrieve_plaintext`](Self::retrieve_plaintext).
    pub fn retrieve_raw(&self, object_id: ObjectId, requester: &str) -> VaultResult<Envelope> {
        let requester = PrincipalId::parse(requester)?;
        let result = self
            .load_authorized(object_id, &requester)
            .map(|object| object.envelope);
        self.finish(AuditAction::RetrieveRaw, Some(object_id), &requester, None, result)
    }

    /// Non-secret attributes of an object, behind the read gate.
    pub fn describe(&self, object_id: ObjectId, requester: &str) -> VaultResult<ObjectMetadata> {
        let requester = PrincipalId::parse(requester)?;
        let result = self.store.read(|r| authorized_metadata(r, object_id, &requester));
        self.finish(AuditAction::Describe, Some(object_id), &requester, None, result)
    }

    /// File name for a raw envelope export: `{name}_id_{object_id}.sealed`.
    pub fn export_file_name(&self, object_id: ObjectId, requester: &str) -> VaultResult<String> {
        let metadata = self.describe(object_id, requester)?;
        Ok(format!("{}_id_{}.{}", metadata.name, object_id, EXPORT_EXTENSION))
    }

    fn load_authorized(&self, object_id: ObjectId, requester: &PrincipalId) -> VaultResult<SecureObject> {
        self.store.read(|r| -> VaultResult<SecureObject> {
            authorized_metadata(r, object_id, requester)?;
            r.object(object_id)?
                .ok_or_else(|| VaultError::NotFound(format!("object {object_id}")))
        })
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    /// Let `recipient` read the object. Owner only; repeating is a no-op.
    ///
    /// Ownership is checked before the recipient is looked at, so a caller
    /// who does not own the object always gets `NotOwner`.
    pub fn share(&self, object_id: ObjectId, owner: &str, recipient: &str) -> VaultResult<GrantOutcome> {
        let owner = PrincipalId::parse(owner)?;
        let parsed = PrincipalId::parse(recipient).ok();

        let result = self.store.write(|w| -> VaultResult<GrantOutcome> {
            let metadata = load_metadata(&*w, object_id)?;
            ledger::require_owner(&metadata, &owner)?;
            let recipient = parsed
                .as_ref()
                .ok_or_else(|| VaultError::UnknownPrincipal(recipient.trim().to_string()))?;
            ledger::grant(w, &self.directory, &metadata, &owner, recipient)
        });
        self.finish(AuditAction::Share, Some(object_id), &owner, parsed.as_ref(), result)
    }

    /// Withdraw `recipient`'s access. Owner only; revoking a grant that does
    /// not exist succeeds.
    pub fn revoke(&self, object_id: ObjectId, owner: &str, recipient: &str) -> VaultResult<()> {
        let owner = PrincipalId::parse(owner)?;
        let parsed = PrincipalId::parse(recipient).ok();

        let result = self.store.write(|w| -> VaultResult<bool> {
            let metadata = load_metadata(&*w, object_id)?;
            ledger::require_owner(&metadata, &owner)?;
            let recipient = parsed.as_ref().ok_or(VaultError::InvalidPrincipal)?;
            ledger::revoke(w, &metadata, &owner, recipient)
        });
        if let (Ok(false), Some(recipient)) = (&result, &parsed) {
            tracing::debug!(%object_id, %recipient, "revoke found no grant");
        }
        self.finish(AuditAction::Revoke, Some(object_id), &owner, parsed.as_ref(), result.map(|_| ()))
    }

    /// Current grant recipients, sorted. Owner only.
    pub fn list_recipients(&self, object_id: ObjectId, owner: &str) -> VaultResult<Vec<PrincipalId>> {
        let owner = PrincipalId::parse(owner)?;
        let result: VaultResult<Vec<PrincipalId>> = self
            .store
            .read(|r| -> VaultResult<_> {
                let metadata = load_metadata(r, object_id)?;
                ledger::list_recipients(r, &metadata, &owner)
            })
            .map(|recipients| recipients.into_iter().collect());
        self.finish(AuditAction::ListRecipients, Some(object_id), &owner, None, result)
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Objects `owner` owns, oldest first. Objects shared with `owner` are
    /// not included; see [`list_shared_with`](Self::list_shared_with).
    pub fn list_owned(&self, owner: &str) -> VaultResult<Vec<ObjectMetadata>> {
        let owner = PrincipalId::parse(owner)?;
        let mut objects = self.store.read(|r| -> VaultResult<_> { Ok(r.owned_by(&owner)?) })?;
        sort_oldest_first(&mut objects);
        tracing::debug!(%owner, count = objects.len(), "listed owned objects");
        Ok(objects)
    }

    /// Objects other principals have shared with `principal`, oldest first.
    pub fn list_shared_with(&self, principal: &str) -> VaultResult<Vec<ObjectMetadata>> {
        let principal = PrincipalId::parse(principal)?;
        let mut objects = self.store.read(|r| -> VaultResult<_> { Ok(r.shared_with(&principal)?) })?;
        sort_oldest_first(&mut objects);
        Ok(objects)
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete an object and every grant on it in one unit of work. Owner only.
    pub fn delete(&self, object_id: ObjectId, owner: &str) -> VaultResult<()> {
        let owner = PrincipalId::parse(owner)?;
        let result = self.store.write(|w| -> VaultResult<usize> {
            let metadata = load_metadata(&*w, object_id)?;
            ledger::require_owner(&metadata, &owner)?;

            let grants = ledger::cascade_delete(w, object_id)?;
            if !w.remove_object(object_id)? {
                return Err(VaultError::NotFound(format!("object {object_id}")));
            }
            Ok(grants)
        });
        if let Ok(grants) = result {
            tracing::debug!(%object_id, grants, "cascade removed grants");
        }
        self.finish(AuditAction::Delete, Some(object_id), &owner, None, result.map(|_| ()))
    }

    // -----------------------------------------------------------------------
    // Audit + logging
    // -----------------------------------------------------------------------

    fn audit_log(&self) -> MutexGuard<'_, AuditLog> {
        // A panic while appending cannot leave a record half-written, so a
        // poisoned log is still usable.
        self.audit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the outcome, append an audit record, and hand the result back.
    fn finish<T>(
        &self,
        action: AuditAction,
        object_id: Option<ObjectId>,
        actor: &PrincipalId,
        subject: Option<&PrincipalId>,
        result: VaultResult<T>,
    ) -> VaultResult<T> {
        let outcome = match &result {
            Ok(_) => {
                match action {
                    AuditAction::Retrieve
                    | AuditAction::RetrieveRaw
                    | AuditAction::Describe
                    | AuditAction::ListRecipients => {
                        tracing::debug!(?action, object_id = ?object_id, %actor, "access granted")
                    }
                    _ => tracing::info!(?action, object_id = ?object_id, %actor, subject = ?subject, "vault operation succeeded"),
                }
                AuditOutcome::Allowed
            }
            Err(
                e @ (VaultError::NotOwner(_)
                | VaultError::AccessDenied(_)
                | VaultError::SelfShare
                | VaultError::UnknownPrincipal(_)),
            ) => {
                tracing::warn!(?action, object_id = ?object_id, %actor, subject = ?subject, error = %e, "vault operation denied");
                AuditOutcome::Denied
            }
            Err(e @ VaultError::CorruptObject) => {
                tracing::error!(?action, object_id = ?object_id, %actor, error = %e, "object failed integrity verification");
                AuditOutcome::Failed
            }
            Err(e @ VaultError::StorageFailure(_)) => {
                tracing::error!(?action, object_id = ?object_id, %actor, error = %e, retryable = e.is_retryable(), "storage failure");
                AuditOutcome::Failed
            }
            Err(e) => {
                tracing::debug!(?action, object_id = ?object_id, %actor, error = %e, "vault operation rejected");
                AuditOutcome::Failed
            }
        };

        self.audit_log().append(AuditRecord {
            action,
            object_id,
            actor: actor.clone(),
            subject: subject.cloned(),
            outcome,
            timestamp: Utc::now(),
        });
        result
    }
}

fn load_metadata<R: StoreReader + ?Sized>(reader: &R, object_id: ObjectId) -> VaultResult<ObjectMetadata> {
    reader
        .metadata(object_id)?
        .ok_or_else(|| VaultError::NotFound(format!("object {object_id}")))
}

/// Load metadata and apply the read gate in one snapshot.
///
/// A missing object is `NotFound` and an unreadable one is `AccessDenied`,
/// so existence is observable to anyone holding an id; ids are random v4
/// UUIDs and cannot be enumerated.
fn authorized_metadata(
    reader: &dyn StoreReader,
    object_id: ObjectId,
    requester: &PrincipalId,
) -> VaultResult<ObjectMetadata> {
    let metadata = load_metadata(reader, object_id)?;
    if !ledger::authorize_read(reader, &metadata, requester)? {
        return Err(VaultError::AccessDenied(object_id));
    }
    Ok(metadata)
}

fn sort_oldest_first(objects: &mut [ObjectMetadata]) {
    objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

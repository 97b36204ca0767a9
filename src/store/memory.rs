//! In-memory metadata store.
//!
//! Units of work are copy-on-write: a writer clones the state, applies the
//! closure to the clone and swaps it in only on success. Object rows sit
//! behind `Arc`, so the clone copies pointers rather than payloads. The
//! single `RwLock` serialises writers, which gives serializable isolation.
//!
//! Every write therefore costs O(objects + grants) for the clone. This backend
//! is meant for tests and small embedded vaults; use [`RedbStore`](super::RedbStore)
//! for anything larger.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    GrantId, GrantInsert, NewObject, ObjectId, ObjectMetadata, SecureObject, ShareGrant,
};
use crate::principal::PrincipalId;

use super::{MetadataStore, StoreReader, StoreWriter};

#[derive(Clone, Default)]
struct MemoryState {
    objects: BTreeMap<ObjectId, Arc<SecureObject>>,
    grants: BTreeMap<(ObjectId, PrincipalId), GrantId>,
}

/// A [`MetadataStore`] held entirely in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self
            .state
            .read()
            .map(|s| (s.objects.len(), s.grants.len()))
            .ok();
        f.debug_struct("InMemoryStore")
            .field("objects_and_grants", &counts)
            .finish()
    }
}

impl MetadataStore for InMemoryStore {
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn StoreReader) -> Result<T, E>,
    {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        f(&*state)
    }

    fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreWriter) -> Result<T, E>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut draft = state.clone();
        let out = f(&mut draft)?;
        *state = draft;
        Ok(out)
    }
}

impl MemoryState {
    fn metadata_of(&self, ids: impl Iterator<Item = ObjectId>) -> Vec<ObjectMetadata> {
        ids.filter_map(|id| self.objects.get(&id))
            .map(|object| object.metadata.clone())
            .collect()
    }
}

impl StoreReader for MemoryState {
    fn object(&self, id: ObjectId) -> StoreResult<Option<SecureObject>> {
        Ok(self.objects.get(&id).map(|object| (**object).clone()))
    }

    fn metadata(&self, id: ObjectId) -> StoreResult<Option<ObjectMetadata>> {
        Ok(self.objects.get(&id).map(|object| object.metadata.clone()))
    }

    fn owned_by(&self, owner: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>> {
        Ok(self
            .objects
            .values()
            .filter(|object| object.owner() == owner)
            .map(|object| object.metadata.clone())
            .collect())
    }

    fn grant(&self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<Option<GrantId>> {
        Ok(self.grants.get(&(id, recipient.clone())).copied())
    }

    fn grants_for(&self, id: ObjectId) -> StoreResult<Vec<ShareGrant>> {
        Ok(self
            .grants
            .iter()
            .filter(|((object_id, _), _)| *object_id == id)
            .map(|((object_id, recipient), grant_id)| ShareGrant {
                id: *grant_id,
                object_id: *object_id,
                recipient: recipient.clone(),
            })
            .collect())
    }

    fn shared_with(&self, recipient: &PrincipalId) -> StoreResult<Vec<ObjectMetadata>> {
        let ids = self
            .grants
            .keys()
            .filter(|(_, r)| r == recipient)
            .map(|(id, _)| *id);
        Ok(self.metadata_of(ids))
    }
}

impl StoreWriter for MemoryState {
    fn insert_object(&mut self, object: NewObject) -> StoreResult<ObjectId> {
        let mut id = ObjectId::new();
        while self.objects.contains_key(&id) {
            id = ObjectId::new();
        }
        self.objects.insert(id, Arc::new(object.into_object(id)));
        Ok(id)
    }

    fn insert_grant_if_absent(
        &mut self,
        id: ObjectId,
        recipient: &PrincipalId,
    ) -> StoreResult<GrantInsert> {
        if !self.objects.contains_key(&id) {
            return Ok(GrantInsert::ObjectMissing);
        }
        let key = (id, recipient.clone());
        if let Some(existing) = self.grants.get(&key) {
            return Ok(GrantInsert::AlreadyPresent(*existing));
        }
        let grant_id = GrantId::new();
        self.grants.insert(key, grant_id);
        Ok(GrantInsert::Created(grant_id))
    }

    fn remove_grant(&mut self, id: ObjectId, recipient: &PrincipalId) -> StoreResult<bool> {
        Ok(self.grants.remove(&(id, recipient.clone())).is_some())
    }

    fn remove_grants_for(&mut self, id: ObjectId) -> StoreResult<usize> {
        let before = self.grants.len();
        self.grants.retain(|(object_id, _), _| *object_id != id);
        Ok(before - self.grants.len())
    }

    fn remove_object(&mut self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.objects.remove(&id).is_some())
    }
}

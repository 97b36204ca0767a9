//! Access-control ledger.
//!
//! Answers who may read an object and manages the share grants that extend
//! read access beyond the owner. Every function runs against a store unit of
//! work supplied by the caller, so a check and the mutation it guards commit
//! or roll back together.
//!
//! The only read predicate is [`authorize_read`]: owner or grant recipient.
//! Mutations (`grant`, `revoke`, `list_recipients`) are owner-only.

use std::collections::BTreeSet;

use crate::error::{StoreResult, VaultError, VaultResult};
use crate::model::{GrantId, GrantInsert, ObjectId, ObjectMetadata};
use crate::principal::{PrincipalDirectory, PrincipalId};
use crate::store::{StoreReader, StoreWriter};

/// What a successful [`grant`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Created(GrantId),
    /// The pair was already granted; nothing changed.
    AlreadyGranted(GrantId),
}

impl GrantOutcome {
    pub fn grant_id(&self) -> GrantId {
        match self {
            Self::Created(id) | Self::AlreadyGranted(id) => *id,
        }
    }
}

pub fn is_owner(object: &ObjectMetadata, principal: &PrincipalId) -> bool {
    object.owner == *principal
}

pub fn is_shared<R: StoreReader + ?Sized>(
    reader: &R,
    object_id: ObjectId,
    principal: &PrincipalId,
) -> StoreResult<bool> {
    Ok(reader.grant(object_id, principal)?.is_some())
}

/// `is_owner || is_shared`. Every read path evaluates this before it touches
/// the envelope.
pub fn authorize_read<R: StoreReader + ?Sized>(
    reader: &R,
    object: &ObjectMetadata,
    principal: &PrincipalId,
) -> StoreResult<bool> {
    if is_owner(object, principal) {
        return Ok(true);
    }
    is_shared(reader, object.id, principal)
}

/// Fail with `NotOwner` unless `principal` owns the object.
pub fn require_owner(object: &ObjectMetadata, principal: &PrincipalId) -> VaultResult<()> {
    if is_owner(object, principal) {
        Ok(())
    } else {
        Err(VaultError::NotOwner(object.id))
    }
}

/// Grant `recipient` read access.
///
/// Checks run in order: ownership, self-share, recipient registration. The
/// insert itself is a single insert-if-absent, so repeating a grant is a
/// successful no-op.
pub fn grant<W, D>(
    writer: &mut W,
    directory: &D,
    object: &ObjectMetadata,
    owner: &PrincipalId,
    recipient: &PrincipalId,
) -> VaultResult<GrantOutcome>
where
    W: StoreWriter + ?Sized,
    D: PrincipalDirectory + ?Sized,
{
    require_owner(object, owner)?;
    if recipient == owner {
        return Err(VaultError::SelfShare);
    }
    if !directory.exists(recipient)? {
        return Err(VaultError::UnknownPrincipal(recipient.to_string()));
    }

    match writer.insert_grant_if_absent(object.id, recipient)? {
        GrantInsert::Created(id) => Ok(GrantOutcome::Created(id)),
        GrantInsert::AlreadyPresent(id) => Ok(GrantOutcome::AlreadyGranted(id)),
        GrantInsert::ObjectMissing => Err(VaultError::NotFound(format!("object {}", object.id))),
    }
}

/// Withdraw `recipient`'s access. Returns whether a grant existed; a missing
/// grant is not an error.
pub fn revoke<W: StoreWriter + ?Sized>(
    writer: &mut W,
    object: &ObjectMetadata,
    owner: &PrincipalId,
    recipient: &PrincipalId,
) -> VaultResult<bool> {
    require_owner(object, owner)?;
    Ok(writer.remove_grant(object.id, recipient)?)
}

pub fn list_recipients<R: StoreReader + ?Sized>(
    reader: &R,
    object: &ObjectMetadata,
    owner: &PrincipalId,
) -> VaultResult<BTreeSet<PrincipalId>> {
    require_owner(object, owner)?;
    Ok(reader
        .grants_for(object.id)?
        .into_iter()
        .map(|grant| grant.recipient)
        .collect())
}

/// Remove every grant on the object. Only called from object deletion,
/// inside the same unit of work that removes the object row.
pub(crate) fn cascade_delete<W: StoreWriter + ?Sized>(
    writer: &mut W,
    object_id: ObjectId,
) -> StoreResult<usize> {
    writer.remove_grants_for(object_id)
}

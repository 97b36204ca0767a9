//! Records held by the metadata store.
//!
//! Secret and non-secret parts of an object travel together but stay
//! distinct: metadata is plain data, the payload is an opaque [`Envelope`]
//! and the key is an encoded string. Listings only ever expose
//! [`ObjectMetadata`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::Envelope;
use crate::principal::PrincipalId;

/// Content type recorded when the caller declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Identifier of a stored object, assigned by the store on insert.
///
/// Random (UUID v4) so identifiers cannot be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a share grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-secret attributes of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub id: ObjectId,
    /// Original file name.
    pub name: String,
    /// Declared content type.
    pub content_type: String,
    /// Immutable after creation.
    pub owner: PrincipalId,
    pub created_at: DateTime<Utc>,
}

/// A stored object: metadata, sealed payload and encoded key.
#[derive(Debug, Clone)]
pub struct SecureObject {
    pub metadata: ObjectMetadata,
    pub envelope: Envelope,
    /// Base64 text of the object key.
    pub wrapped_key: String,
}

impl SecureObject {
    pub fn id(&self) -> ObjectId {
        self.metadata.id
    }

    pub fn owner(&self) -> &PrincipalId {
        &self.metadata.owner
    }
}

/// An object about to be inserted. The store assigns the identifier.
#[derive(Debug, Clone)]
pub struct NewObject {
    pub name: String,
    pub content_type: String,
    pub owner: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub envelope: Envelope,
    pub wrapped_key: String,
}

impl NewObject {
    pub(crate) fn into_object(self, id: ObjectId) -> SecureObject {
        SecureObject {
            metadata: ObjectMetadata {
                id,
                name: self.name,
                content_type: self.content_type,
                owner: self.owner,
                created_at: self.created_at,
            },
            envelope: self.envelope,
            wrapped_key: self.wrapped_key,
        }
    }
}

/// One (object, recipient) authorization edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub id: GrantId,
    pub object_id: ObjectId,
    pub recipient: PrincipalId,
}

/// Result of an atomic insert-if-absent on the grant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantInsert {
    Created(GrantId),
    AlreadyPresent(GrantId),
    /// The object row no longer exists; nothing was written.
    ObjectMissing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_display_parse_roundtrip() {
        let id = ObjectId::new();
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(ObjectId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn test_metadata_serializes_owner_as_plain_string() {
        let meta = ObjectMetadata {
            id: ObjectId::new(),
            name: "report.pdf".into(),
            content_type: "application/pdf".into(),
            owner: PrincipalId::parse("alice").unwrap(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["owner"], "alice");
        let back: ObjectMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}

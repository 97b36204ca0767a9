//! Per-object key material.
//!
//! Every stored object gets its own freshly generated 256-bit key. This
//! module owns that key type and its textual encoding for persistence:
//!
//! - `ObjectKey` is not `Clone` and is zeroised on drop.
//! - Raw bytes are only reachable inside the crate (`as_bytes` is
//!   `pub(crate)`), so the crypto engine is the only consumer.
//! - The persisted form is standard base64 of the 32 raw bytes.
//!
//! This is one of exactly two modules that import `ring` directly (the other
//! is `crypto`).

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::VaultError;

/// Size of an object key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// A symmetric key protecting exactly one object.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ObjectKey {
    bytes: [u8; KEY_LEN],
}

impl ObjectKey {
    /// Construct a key from raw bytes.
    ///
    /// Production keys come from [`generate_key`]. This exists for tests and
    /// for callers re-importing a key they exported with [`encode_key`].
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        ring::constant_time::verify_slices_are_equal(&self.bytes, &other.bytes).is_ok()
    }
}

impl Eq for ObjectKey {}

impl std::fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObjectKey(..)")
    }
}

/// Generate a fresh key from the system CSPRNG.
///
/// Each call draws independently from `SystemRandom`; nothing is cached
/// between calls.
pub fn generate_key() -> Result<ObjectKey, VaultError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; KEY_LEN];
    rng.fill(&mut bytes).map_err(|_| VaultError::RandomnessFailure)?;
    let key = ObjectKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Encode a key as standard base64 for storage alongside object metadata.
pub fn encode_key(key: &ObjectKey) -> String {
    STANDARD.encode(key.as_bytes())
}

/// Decode a key produced by [`encode_key`].
///
/// Anything that does not decode to exactly 32 bytes is `InvalidKey`.
pub fn decode_key(encoded: &str) -> Result<ObjectKey, VaultError> {
    let raw = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|_| VaultError::InvalidKey)?,
    );
    let bytes: [u8; KEY_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::InvalidKey)?;
    Ok(ObjectKey::from_bytes(bytes))
}

//! Envelope sealing and opening.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `keys`). Everything else encrypts and decrypts
//! exclusively through `seal` and `open`.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption, 128-bit tag)
//! - **Nonce**: 96-bit (12 bytes), generated fresh inside every `seal` call
//!   via `SystemRandom`. Callers cannot supply one.
//! - **Key size**: 256 bits (32 bytes), one key per object
//!
//! # Stored envelope layout
//! ```text
//! [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
//! ```
//! This layout is persisted as-is and must stay stable for previously
//! stored objects to remain readable.

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::VaultError;
use crate::keys::ObjectKey;

/// The AEAD algorithm used for every envelope.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// The sealed, persisted form of one object.
///
/// This is the boundary type between the crypto engine and storage. Stores
/// hold and return it as opaque bytes; only [`open`] looks inside. There are
/// no methods that mutate the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    /// Wrap bytes previously produced by [`seal`] (e.g. read back from disk).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nonce prefix, if the envelope is long enough to have one.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.0.get(..NONCE_LEN)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("len", &self.0.len()).finish()
    }
}

/// Nonce produced for exactly one seal. Not `Clone`, consumed by `seal`.
struct OwnedNonce(Nonce);

/// Generate a cryptographically secure random nonce.
///
/// There is no nonce caching or counter-based generation.
fn generate_nonce() -> Result<OwnedNonce, VaultError> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; NONCE_LEN];
    rng.fill(&mut buf).map_err(|_| VaultError::RandomnessFailure)?;
    Ok(OwnedNonce(Nonce::assume_unique_for_key(buf)))
}

fn aead_key(key: &ObjectKey) -> Result<LessSafeKey, VaultError> {
    let unbound = UnboundKey::new(ALGORITHM, key.as_bytes()).map_err(|_| VaultError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` and return the envelope.
///
/// A fresh nonce is drawn for every call and bundled in front of the
/// ciphertext, so the caller never manages nonces.
pub fn seal(plaintext: &[u8], key: &ObjectKey) -> Result<Envelope, VaultError> {
    let key = aead_key(key)?;
    let nonce = generate_nonce()?;
    let nonce_bytes: [u8; NONCE_LEN] = *nonce.0.as_ref();

    let mut sealed = Vec::with_capacity(plaintext.len() + TAG_LEN);
    sealed.extend_from_slice(plaintext);
    key.seal_in_place_append_tag(nonce.0, aead::Aad::empty(), &mut sealed)
        .map_err(|_| VaultError::EncryptionFailure)?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&sealed);
    Ok(Envelope(output))
}

/// Verify and decrypt an envelope produced by [`seal`].
///
/// A wrong key, a flipped bit anywhere in the envelope, or a truncated
/// envelope all fail with `CorruptObject`. No partial plaintext is returned.
pub fn open(envelope: &Envelope, key: &ObjectKey) -> Result<Vec<u8>, VaultError> {
    let bytes = envelope.as_bytes();
    if bytes.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::CorruptObject);
    }

    let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
    let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| VaultError::CorruptObject)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let key = aead_key(key)?;
    let mut payload = sealed.to_vec();
    let plaintext = key
        .open_in_place(nonce, aead::Aad::empty(), &mut payload)
        .map_err(|_| VaultError::CorruptObject)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_key, KEY_LEN};

    #[test]
    fn test_seal_open_roundtrip() {
        let key = ObjectKey::from_bytes([0u8; KEY_LEN]);
        for plaintext in [&b""[..], b"x", b"hello vault", &[0xAB; 4096][..]] {
            let envelope = seal(plaintext, &key).unwrap();
            assert_eq!(envelope.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
            assert_eq!(open(&envelope, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_open_fails_with_wrong_key() {
        let key = generate_key().unwrap();
        let other = generate_key().unwrap();
        let envelope = seal(b"secret", &key).unwrap();
        assert!(matches!(open(&envelope, &other), Err(VaultError::CorruptObject)));
    }

    #[test]
    fn test_truncated_envelope_is_corrupt() {
        let key = ObjectKey::from_bytes([3u8; KEY_LEN]);
        let envelope = seal(b"abc", &key).unwrap();

        let short = Envelope::from_bytes(envelope.as_bytes()[..NONCE_LEN + TAG_LEN - 1].to_vec());
        assert!(matches!(open(&short, &key), Err(VaultError::CorruptObject)));
        assert!(matches!(
            open(&Envelope::from_bytes(Vec::new()), &key),
            Err(VaultError::CorruptObject)
        ));
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = ObjectKey::from_bytes([9u8; KEY_LEN]);
        let a = seal(b"same", &key).unwrap();
        let b = seal(b"same", &key).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a, b);
    }
}

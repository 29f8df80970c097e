//! Signing identities.
//!
//! An identity is an ed25519 key pair. Remote identities carry only the
//! verifying key; local identities can also sign. The log never looks up
//! keys elsewhere: every entry embeds the public key needed to verify it.

use crate::error::{EntryError, Result};
use crate::hash::Hasher;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

/// Hex-encode a byte slice.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hex-decode into a fixed-size array.
pub(crate) fn from_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 {
        return None;
    }
    let mut bytes = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex_str = std::str::from_utf8(chunk).ok()?;
        bytes[i] = u8::from_str_radix(hex_str, 16).ok()?;
    }
    Some(bytes)
}

/// An identity that authors log entries.
#[derive(Clone)]
pub struct Identity {
    /// Identity hash: SHA-256 of the hex public key, hex-encoded.
    id: String,

    /// Hex-encoded ed25519 verifying key.
    public_key: String,

    /// Present only for local identities.
    signing_key: Option<SigningKey>,
}

impl Identity {
    /// Generate a fresh local identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Build a local identity from an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = to_hex(signing_key.verifying_key().as_bytes());
        let id = Hasher::hash(public_key.as_bytes()).to_hex();
        Identity {
            id,
            public_key,
            signing_key: Some(signing_key),
        }
    }

    /// Build a verify-only identity from a hex public key.
    pub fn from_public_key(public_key: impl Into<String>) -> Result<Self> {
        let public_key = public_key.into();
        let bytes: [u8; 32] = from_hex(&public_key)
            .ok_or_else(|| EntryError::InvalidKey(public_key.clone()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| EntryError::InvalidKey(public_key.clone()))?;
        let id = Hasher::hash(public_key.as_bytes()).to_hex();
        Ok(Identity {
            id,
            public_key,
            signing_key: None,
        })
    }

    /// The identity hash.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The hex-encoded public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Whether this identity can produce signatures.
    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Sign bytes, returning the hex-encoded signature.
    ///
    /// Fails with [`EntryError::IdentityRequired`] for verify-only
    /// identities.
    pub fn sign(&self, bytes: &[u8]) -> Result<String> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(EntryError::IdentityRequired)?;
        let signature: Signature = key.sign(bytes);
        Ok(to_hex(&signature.to_bytes()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("public_key", &self.public_key)
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

/// Verify a hex signature over bytes against a hex public key.
///
/// Returns `false` for malformed keys or signatures rather than erroring;
/// foreign data is expected to be arbitrary.
pub fn verify(sig: &str, public_key: &str, bytes: &[u8]) -> bool {
    let Some(key_bytes) = from_hex::<32>(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Some(sig_bytes) = from_hex::<64>(sig) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(bytes, &signature).is_ok()
}

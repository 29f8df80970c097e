//! Immutable, signed, content-addressed log entries.
//!
//! An entry records one appended operation: the log it belongs to, the
//! payload, the author's Lamport clock, hash references to its parents
//! (`next`) and to sampled deeper ancestors (`refs`), the author's public
//! key and a signature. The entry's identity in the DAG is the SHA-256
//! hash of its canonical wire encoding.

use crate::clock::LamportClock;
use crate::error::{EntryError, Result};
use crate::hash::{Hash, Hasher};
use crate::identity::{self, Identity};
use serde::{Deserialize, Serialize};

/// Wire format version embedded in every entry.
pub const FORMAT_VERSION: u8 = 1;

/// A single immutable entry in the operation log.
///
/// Entries are created once via [`Entry::create`] or recovered via
/// [`Entry::decode`] and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The log (stream) this entry belongs to.
    pub id: String,

    /// Application-supplied payload, opaque to the log.
    pub payload: Vec<u8>,

    /// The author's clock at creation time.
    pub clock: LamportClock,

    /// Hashes of the direct parent entries (the heads at append time).
    pub next: Vec<Hash>,

    /// Sampled deeper ancestor hashes (power-of-two skip references).
    pub refs: Vec<Hash>,

    /// Hex public key of the signer.
    pub key: String,

    /// Hex signature over the signable encoding.
    pub sig: String,

    /// Wire format version.
    pub v: u8,

    /// Content hash of the wire encoding. Derived, not serialized.
    #[serde(skip)]
    hash: Hash,
}

/// The portion of an entry covered by the signature (everything except
/// `sig` and the derived hash).
#[derive(Serialize)]
struct SignableContent<'a> {
    id: &'a str,
    payload: &'a [u8],
    clock: &'a LamportClock,
    next: &'a [Hash],
    refs: &'a [Hash],
    key: &'a str,
    v: u8,
}

impl Entry {
    /// Create and sign a new entry.
    ///
    /// When `clock` is `None` the identity's zero clock is used; the log
    /// normally supplies its own ticked clock. Identical inputs produce an
    /// identical hash and signature.
    pub fn create(
        identity: &Identity,
        log_id: &str,
        payload: impl Into<Vec<u8>>,
        clock: Option<LamportClock>,
        next: Vec<Hash>,
        refs: Vec<Hash>,
    ) -> Result<Entry> {
        if !identity.can_sign() {
            return Err(EntryError::IdentityRequired);
        }
        if log_id.is_empty() {
            return Err(EntryError::MissingLogId);
        }
        let payload = payload.into();
        if payload.is_empty() {
            return Err(EntryError::MissingPayload);
        }

        let clock = clock.unwrap_or_else(|| LamportClock::new(identity.public_key()));
        let key = identity.public_key().to_string();

        let signable = signable_bytes(log_id, &payload, &clock, &next, &refs, &key);
        let sig = identity.sign(&signable)?;

        let mut entry = Entry {
            id: log_id.to_string(),
            payload,
            clock,
            next,
            refs,
            key,
            sig,
            v: FORMAT_VERSION,
            hash: Hash::default(),
        };
        entry.hash = Hasher::hash(&entry.encode());
        Ok(entry)
    }

    /// The entry's content hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Canonical wire encoding (deterministic, includes the signature).
    pub fn encode(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("entry serialization should not fail")
    }

    /// Decode an entry from wire bytes.
    ///
    /// Structurally invalid records are rejected here, before any
    /// signature or admission check runs.
    pub fn decode(bytes: &[u8]) -> Result<Entry> {
        let mut entry: Entry =
            postcard::from_bytes(bytes).map_err(|e| EntryError::Decode(e.to_string()))?;
        entry.hash = Hasher::hash(bytes);
        entry.validate()?;
        Ok(entry)
    }

    /// Structural validation of a (possibly foreign) entry.
    pub fn validate(&self) -> Result<()> {
        if self.v != FORMAT_VERSION {
            return Err(EntryError::InvalidEntry(format!(
                "unsupported format version {}",
                self.v
            )));
        }
        if self.id.is_empty() {
            return Err(EntryError::InvalidEntry("entry has no id".into()));
        }
        if self.payload.is_empty() {
            return Err(EntryError::InvalidEntry("entry has no payload".into()));
        }
        if self.key.is_empty() {
            return Err(EntryError::InvalidEntry("entry has no key".into()));
        }
        if self.sig.is_empty() {
            return Err(EntryError::InvalidEntry("entry has no signature".into()));
        }
        Ok(())
    }

    /// Verify the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        let signable = signable_bytes(
            &self.id,
            &self.payload,
            &self.clock,
            &self.next,
            &self.refs,
            &self.key,
        );
        identity::verify(&self.sig, &self.key, &signable)
    }
}

fn signable_bytes(
    id: &str,
    payload: &[u8],
    clock: &LamportClock,
    next: &[Hash],
    refs: &[Hash],
    key: &str,
) -> Vec<u8> {
    let content = SignableContent {
        id,
        payload,
        clock,
        next,
        refs,
        key,
        v: FORMAT_VERSION,
    };
    postcard::to_allocvec(&content).expect("entry serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::generate()
    }

    #[test]
    fn test_create_basic() {
        let id = identity();
        let entry = Entry::create(&id, "logA", "hello", None, vec![], vec![]).unwrap();

        assert_eq!(entry.id, "logA");
        assert_eq!(entry.payload, b"hello");
        assert_eq!(entry.key, id.public_key());
        assert_eq!(entry.v, FORMAT_VERSION);
        assert!(entry.verify());
    }

    #[test]
    fn test_create_deterministic() {
        let id = identity();
        let clock = LamportClock::at(id.public_key(), 1);
        let e1 = Entry::create(&id, "logA", "hello", Some(clock.clone()), vec![], vec![]).unwrap();
        let e2 = Entry::create(&id, "logA", "hello", Some(clock), vec![], vec![]).unwrap();

        assert_eq!(e1.hash(), e2.hash());
        assert_eq!(e1.sig, e2.sig);
        assert_eq!(e1.encode(), e2.encode());
    }

    #[test]
    fn test_create_rejects_missing_fields() {
        let id = identity();
        assert!(matches!(
            Entry::create(&id, "", "hello", None, vec![], vec![]),
            Err(EntryError::MissingLogId)
        ));
        assert!(matches!(
            Entry::create(&id, "logA", Vec::new(), None, vec![], vec![]),
            Err(EntryError::MissingPayload)
        ));

        let remote = Identity::from_public_key(id.public_key()).unwrap();
        assert!(matches!(
            Entry::create(&remote, "logA", "hello", None, vec![], vec![]),
            Err(EntryError::IdentityRequired)
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let id = identity();
        let parent = Hasher::hash(b"parent");
        let entry = Entry::create(
            &id,
            "logA",
            "hello",
            Some(LamportClock::at(id.public_key(), 2)),
            vec![parent],
            vec![],
        )
        .unwrap();

        let decoded = Entry::decode(&entry.encode()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.hash(), entry.hash());
        assert!(decoded.verify());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Entry::decode(b"not an entry"),
            Err(EntryError::Decode(_)) | Err(EntryError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let id = identity();
        let mut entry = Entry::create(&id, "logA", "hello", None, vec![], vec![]).unwrap();
        entry.payload = b"evil".to_vec();
        assert!(!entry.verify());
    }

    proptest::proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            time in 1u64..1_000,
        ) {
            let id = identity();
            let clock = LamportClock::at(id.public_key(), time);
            let entry = Entry::create(&id, "logA", payload, Some(clock), vec![], vec![]).unwrap();
            let decoded = Entry::decode(&entry.encode()).unwrap();
            proptest::prop_assert_eq!(&decoded, &entry);
            proptest::prop_assert!(decoded.verify());
        }
    }

    #[test]
    fn test_hash_changes_with_content() {
        let id = identity();
        let clock = LamportClock::at(id.public_key(), 1);
        let e1 = Entry::create(&id, "logA", "one", Some(clock.clone()), vec![], vec![]).unwrap();
        let e2 = Entry::create(&id, "logA", "two", Some(clock), vec![], vec![]).unwrap();
        assert_ne!(e1.hash(), e2.hash());
    }
}

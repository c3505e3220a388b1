// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use sha2::{Digest, Sha256};

/// An opaque conflict-parameter value supplied by a caller with each
/// read/write, or the sentinel `All`, meaning "conflicts with any update on
/// this stream".
///
/// `Value` carries the caller's canonical serialization of the parameter
/// (e.g. the encoded key a map read/wrote). Equality and hashing are on that
/// byte string, not on the fingerprint, so precise-conflict resolution (which
/// compares parameters exactly, not just by fingerprint) can use this type
/// directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConflictParam {
    All,
    Value(Arc<Vec<u8>>),
}

impl ConflictParam {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Value(Arc::new(bytes.into()))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            ConflictParam::All => Fingerprint::All,
            ConflictParam::Value(bytes) => {
                let digest = Sha256::digest(bytes.as_slice());
                Fingerprint::Hash(digest.into())
            }
        }
    }
}

/// A fixed-width fingerprint of a [`ConflictParam`], as carried on the wire
/// to the sequencer. `All` is encoded as the zero-length byte string; any
/// concrete parameter is encoded as its 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    All,
    Hash([u8; 32]),
}

impl Fingerprint {
    pub fn to_wire_bytes(self) -> Vec<u8> {
        match self {
            Fingerprint::All => Vec::new(),
            Fingerprint::Hash(bytes) => bytes.to_vec(),
        }
    }

    pub fn from_wire_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return Some(Fingerprint::All);
        }
        <[u8; 32]>::try_from(bytes).ok().map(Fingerprint::Hash)
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fingerprint::All => write!(f, "Fingerprint::All"),
            Fingerprint::Hash(bytes) => {
                write!(f, "Fingerprint(")?;
                for b in &bytes[..4] {
                    write!(f, "{b:02x}")?;
                }
                write!(f, "…)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fingerprints_to_empty_wire_bytes() {
        assert!(ConflictParam::All.fingerprint().to_wire_bytes().is_empty());
    }

    #[test]
    fn value_fingerprint_is_deterministic() {
        let a = ConflictParam::from_bytes(b"key-1".to_vec());
        let b = ConflictParam::from_bytes(b"key-1".to_vec());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn distinct_values_fingerprint_differently() {
        let a = ConflictParam::from_bytes(b"key-1".to_vec());
        let b = ConflictParam::from_bytes(b"key-2".to_vec());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn wire_roundtrip() {
        let fp = ConflictParam::from_bytes(b"key-1".to_vec()).fingerprint();
        let bytes = fp.to_wire_bytes();
        assert_eq!(Fingerprint::from_wire_bytes(&bytes), Some(fp));
    }
}

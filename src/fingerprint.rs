//! Deterministic fingerprints for facts, rules and traces.
//!
//! Every fingerprint is SHA-256 over canonical bytes with domain separation
//! and length prefixing, so the same value hashes identically across runs
//! and processes regardless of how it was built.
//!
//! # Citations
//! - SHA-256: NIST FIPS 180-4 (2015)
//! - Domain separation & length prefixing: Bernstein et al., "How to hash into elliptic curves" (2009)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// The hashed input is `b"RC:<domain>:v1" || len(data) as u64 LE || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        // Domain tag
        hasher.update(b"RC:");
        hasher.update(domain);
        hasher.update(b":v1");
        // Length prefix (64-bit little-endian)
        let len = data.len() as u64;
        hasher.update(len.to_le_bytes());
        // Data
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 4 bytes in hex for readability
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Types with a deterministic byte encoding suitable for hashing.
pub trait Canonicalizable {
    /// Appends the canonical encoding of `self` to `buf`.
    fn write_canonical_bytes(&self, buf: &mut Vec<u8>);

    /// Returns the canonical encoding of `self`.
    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_canonical_bytes(&mut buf);
        buf
    }
}

/// Writes a length-prefixed UTF-8 string.
pub(crate) fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

//! Fundamental identifier types.
//!
//! [`Hash256`] is the canonical 32-byte SHA-256 digest used for transaction
//! fingerprints, value digests and envelope de-duplication. [`NodeId`] is
//! the identity of a simulated node.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 hash.
///
/// Hashes order lexicographically on their bytes, which is the tie-break
/// used when comparing ballots with equal counters.
///
/// # Examples
///
/// ```rust
/// use scpsim_common::Hash256;
///
/// let a = Hash256::hash(b"tx-a");
/// let b = Hash256::hash(b"tx-b");
/// assert_eq!(a.to_hex().len(), 64);
/// assert_eq!(a.short(), &a.to_hex()[..8]);
/// assert_ne!(Hash256::hash_all([&a, &b]), Hash256::hash_all([&b, &a]));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (all bytes are 0x00).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Compute the SHA-256 hash of arbitrary data.
    pub fn hash(data: &[u8]) -> Self {
        Self::hash_multi(&[data])
    }

    /// Compute the SHA-256 hash of several chunks.
    ///
    /// Equivalent to hashing the concatenation of all chunks without
    /// allocating an intermediate buffer.
    pub fn hash_multi(chunks: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for chunk in chunks {
            hasher.update(chunk);
        }
        Self::from_digest(hasher)
    }

    /// Hash an ordered sequence of hashes into one digest.
    pub fn hash_all<'a, I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = &'a Hash256>,
    {
        let mut hasher = Sha256::new();
        for hash in hashes {
            hasher.update(hash.0);
        }
        Self::from_digest(hasher)
    }

    fn from_digest(hasher: Sha256) -> Self {
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Returns a reference to the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Creates a `Hash256` from a 32-byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Converts the hash to a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The first eight hex characters, used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.short())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identity of a simulated node.
///
/// Node ids are dense indices assigned by the topology builder, so a
/// network of `n` nodes uses ids `0..n`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The index of this node in the simulation's node table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Stable byte encoding used by priority hashing.
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

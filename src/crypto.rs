//! Hashing primitives for mining
//!
//! SHA-256 helpers and the conventions used to compare a header digest with a
//! target. Digests are treated as 256-bit little-endian integers, the byte
//! order the header hash is produced in.

use crate::Target;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Reusable double SHA-256 hasher for tight nonce loops
pub struct DoubleSha256 {
    hasher: Sha256,
}

impl DoubleSha256 {
    /// Create a new hasher
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Hash data and reset internal state for the next call
    pub fn hash(&mut self, data: &[u8]) -> [u8; 32] {
        self.hasher.update(data);
        let first = self.hasher.finalize_reset();
        self.hasher.update(first);
        self.hasher.finalize_reset().into()
    }
}

impl Default for DoubleSha256 {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret a digest as an unsigned integer
pub fn hash_to_biguint(hash: &[u8; 32]) -> BigUint {
    BigUint::from_bytes_le(hash)
}

/// Most significant 32 bits of a digest.
///
/// Used for best-hash tracking: lower means closer to a solution.
pub fn abbreviate_hash(hash: &[u8; 32]) -> u32 {
    u32::from_le_bytes([hash[28], hash[29], hash[30], hash[31]])
}

/// Hex string in display order (most significant byte first)
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

impl Target {
    /// Check if a digest is strictly below this target
    pub fn is_met_by(&self, hash: &[u8; 32]) -> bool {
        hash_to_biguint(hash) < *self.value()
    }

    /// Little-endian 32-byte form for fast comparisons.
    ///
    /// `None` when the target does not fit in 256 bits, in which case every
    /// digest meets it.
    pub fn to_le_bytes32(&self) -> Option<[u8; 32]> {
        if self.value().bits() > 256 {
            return None;
        }
        let mut bytes = [0u8; 32];
        let le = self.value().to_bytes_le();
        bytes[..le.len()].copy_from_slice(&le);
        Some(bytes)
    }
}

/// Compare a digest against a target in [`Target::to_le_bytes32`] form
#[inline]
pub fn hash_below_target(hash: &[u8; 32], target_le: &[u8; 32]) -> bool {
    for i in (0..32).rev() {
        match hash[i].cmp(&target_le[i]) {
            std::cmp::Ordering::Less => return true,
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => continue,
        }
    }
    false
}

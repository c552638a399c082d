//! Core types for batch mining
//!
//! The 80-byte block header with its canonical encoding, and the mining
//! target expanded from the header's compact difficulty bits.

use crate::crypto::{double_sha256, sha256};
use crate::utils::current_timestamp_secs;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::DateTime;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

/// Serialized header size in bytes
pub const HEADER_SIZE: usize = 80;

/// Compact bits of the easiest standard target, used as difficulty 1
pub const DIFFICULTY_ONE_BITS: u32 = 0x1d00_ffff;

/// Block header searched over by the miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    #[serde(with = "hex_bytes")]
    pub prev_block_hash: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub merkle_root: [u8; 32],
    /// Seconds since the Unix epoch
    pub timestamp: u32,
    /// Difficulty target in compact form
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Create a header with nonce 0 and the current time
    pub fn new(version: u32, prev_block_hash: [u8; 32], merkle_root: [u8; 32], bits: u32) -> Self {
        Self {
            version,
            prev_block_hash,
            merkle_root,
            timestamp: current_timestamp_secs() as u32,
            bits,
            nonce: 0,
        }
    }

    /// Header used by solo and benchmark sessions (difficulty 1)
    pub fn test_header() -> Self {
        Self::new(
            1,
            [0u8; 32],
            sha256(b"batch_pow_miner_test"),
            DIFFICULTY_ONE_BITS,
        )
    }

    /// Header for a session with caller-chosen difficulty bits
    pub fn with_difficulty(bits: u32) -> Self {
        Self::new(1, [0u8; 32], sha256(b"custom_difficulty_test"), bits)
    }

    /// Canonical 80-byte little-endian encoding
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.prev_block_hash);
        bytes[36..68].copy_from_slice(&self.merkle_root);
        bytes[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Decode a header produced by [`BlockHeader::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(Error::header(format!(
                "Invalid header length: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u32::<LittleEndian>()?;
        let mut prev_block_hash = [0u8; 32];
        cursor.read_exact(&mut prev_block_hash)?;
        let mut merkle_root = [0u8; 32];
        cursor.read_exact(&mut merkle_root)?;

        Ok(Self {
            version,
            prev_block_hash,
            merkle_root,
            timestamp: cursor.read_u32::<LittleEndian>()?,
            bits: cursor.read_u32::<LittleEndian>()?,
            nonce: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Double SHA-256 of the serialized header
    pub fn hash(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }

    /// Target encoded by this header's bits
    pub fn target(&self) -> Target {
        Target::from_bits(self.bits)
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockHeader{{version: {}, timestamp: {}",
            self.version, self.timestamp
        )?;
        if let Some(time) = DateTime::from_timestamp(i64::from(self.timestamp), 0) {
            write!(f, " ({})", time.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        write!(f, ", bits: {:08x}, nonce: {}}}", self.bits, self.nonce)
    }
}

/// Mining target: a digest must be numerically below this value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    value: BigUint,
}

impl Target {
    /// Wrap an arbitrary-precision value
    pub fn new(value: BigUint) -> Self {
        Self { value }
    }

    /// Expand compact difficulty bits.
    ///
    /// The top byte is a base-256 exponent, the low three bytes the mantissa.
    /// Exponents of 3 or less shift the mantissa right instead of left. The
    /// sign bit of the mantissa is not interpreted.
    pub fn from_bits(bits: u32) -> Self {
        let exponent = bits >> 24;
        let mantissa = bits & 0x00ff_ffff;

        let value = if exponent <= 3 {
            BigUint::from(mantissa >> (8 * (3 - exponent)))
        } else {
            BigUint::from(mantissa) << (8 * (exponent - 3)) as usize
        };

        Self { value }
    }

    /// Underlying integer
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Hex string, at least 64 characters, most significant digit first
    pub fn to_hex_be(&self) -> String {
        format!("{:064x}", self.value)
    }

    /// Difficulty relative to [`DIFFICULTY_ONE_BITS`]
    pub fn difficulty(&self) -> f64 {
        if self.value.is_zero() {
            return f64::INFINITY;
        }
        let one = Target::from_bits(DIFFICULTY_ONE_BITS);
        let num = one.value.to_f64().unwrap_or(f64::MAX);
        let den = self.value.to_f64().unwrap_or(f64::MAX);
        num / den
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_start_matches("0x");
        BigUint::parse_bytes(trimmed.as_bytes(), 16)
            .map(Self::new)
            .ok_or_else(|| Error::config(format!("Invalid target hex: {}", s)))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_be())
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_be())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Target::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse compact bits given as hex, with or without a `0x` prefix
pub fn parse_bits(s: &str) -> Result<u32> {
    let trimmed = s.trim().trim_start_matches("0x");
    u32::from_str_radix(trimmed, 16)
        .map_err(|e| Error::config(format!("Invalid difficulty bits '{}': {}", s, e)))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

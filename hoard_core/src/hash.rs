//! Content hashes using SHA-1.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;

/// Hash digest size in bytes (SHA-1 produces 160-bit hashes).
pub const HASH_SIZE: usize = 20;

/// A 20-byte SHA-1 digest identifying blob content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// The all-zero hash, used on disk to mean "no hash".
    pub const ZERO: ContentHash = ContentHash([0u8; HASH_SIZE]);

    /// Create a ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        ContentHash(bytes)
    }

    /// Create a ContentHash from a slice, which must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            Error::invalid_hash(format!(
                "Expected {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(ContentHash(bytes))
    }

    /// Create a ContentHash from a hex string (40 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != HASH_SIZE * 2 {
            return Err(Error::invalid_hash(format!(
                "Expected {} hex characters, got {}",
                HASH_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::invalid_hash(format!("Invalid hex: {}", e)))?;

        Self::from_slice(&bytes)
    }

    /// Convert to hex string (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// True for the all-zero placeholder.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Hash raw bytes using SHA-1.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

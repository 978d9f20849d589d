//! Patchable catalog mapping identifiers to content hashes and paths.
//!
//! Database source layout:
//! ```text
//! 0x00  4   "HDB1" magic
//! 0x04  4   version (u32 LE) = 0x100
//! 0x08  4   row_count (u32 LE)
//! 0x0C  ... rows
//! ```
//!
//! Row layout:
//! ```text
//! 4   identifier (u32 LE)
//! 20  SHA-1 content hash
//! 4   size (u32 LE)
//! 2   path_len (u16 LE)
//! N   path (UTF-8)
//! ```

use crate::error::{Error, Result};
use crate::hash::{ContentHash, HASH_SIZE};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::str::FromStr;

/// Magic bytes at the start of every database source.
pub const MAGIC: &[u8; 4] = b"HDB1";

/// Current database format version.
pub const VERSION: u32 = 0x100;

/// Stable numeric key of a catalog entry, independent of its content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Identifier(u32);

impl Identifier {
    /// Create an identifier from its numeric value.
    pub const fn new(value: u32) -> Self {
        Identifier(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// True if any bit of `mask` is set. A zero mask reserves nothing.
    pub fn is_reserved(&self, mask: u32) -> bool {
        self.0 & mask != 0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl FromStr for Identifier {
    type Err = Error;

    /// Accepts `g123`, `123` or `0x7b`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = s
            .strip_prefix('g')
            .or_else(|| s.strip_prefix('G'))
            .unwrap_or(s);
        parse_u32(digits)
            .map(Identifier)
            .ok_or_else(|| Error::invalid_config(format!("Invalid identifier: {:?}", s)))
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal u32.
pub(crate) fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseRow {
    /// Stable identifier.
    pub identifier: Identifier,
    /// Hash of the current content.
    pub hash: ContentHash,
    /// Size of the content in bytes.
    pub size: u32,
    /// Loose-file locator, relative to the game root.
    pub path: String,
}

impl DatabaseRow {
    /// Create a new row.
    pub fn new(identifier: Identifier, hash: ContentHash, size: u32, path: impl Into<String>) -> Self {
        Self {
            identifier,
            hash,
            size,
            path: path.into(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let path_len = u16::try_from(self.path.len()).map_err(|_| {
            Error::invalid_database(
                "<memory>",
                format!("Path too long for {}: {} bytes", self.identifier, self.path.len()),
            )
        })?;

        buf.extend_from_slice(&self.identifier.0.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&path_len.to_le_bytes());
        buf.extend_from_slice(self.path.as_bytes());
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> std::io::Result<std::result::Result<Self, String>> {
        let mut id_buf = [0u8; 4];
        reader.read_exact(&mut id_buf)?;

        let mut hash_buf = [0u8; HASH_SIZE];
        reader.read_exact(&mut hash_buf)?;

        let mut size_buf = [0u8; 4];
        reader.read_exact(&mut size_buf)?;

        let mut len_buf = [0u8; 2];
        reader.read_exact(&mut len_buf)?;

        let mut path_buf = vec![0u8; u16::from_le_bytes(len_buf) as usize];
        reader.read_exact(&mut path_buf)?;

        let identifier = Identifier(u32::from_le_bytes(id_buf));
        Ok(match String::from_utf8(path_buf) {
            Ok(path) => Ok(Self {
                identifier,
                hash: ContentHash::from_bytes(hash_buf),
                size: u32::from_le_bytes(size_buf),
                path,
            }),
            Err(e) => Err(format!("Invalid UTF-8 in path of {}: {}", identifier, e)),
        })
    }
}

/// Ordered identifier-to-row catalog.
///
/// Iteration follows insertion order. Patching replaces rows in place, so an
/// overridden identifier keeps its original position and new identifiers are
/// appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDatabase {
    rows: Vec<DatabaseRow>,
    index: HashMap<Identifier, usize>,
}

impl EntryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and parse one database source.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        Self::decode(&data, path)
    }

    /// Parse a database source from bytes. `path` is used for error context.
    pub fn decode(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::invalid_database(
                path,
                format!("Header too short: {} bytes", data.len()),
            ));
        }

        if &data[0..4] != MAGIC {
            return Err(Error::invalid_database(
                path,
                format!("Invalid magic: expected {:?}, got {:?}", MAGIC, &data[0..4]),
            ));
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&data[4..8]);
        let version = u32::from_le_bytes(word);
        if version != VERSION {
            return Err(Error::invalid_database(
                path,
                format!("Unsupported version: {:#x} (expected {:#x})", version, VERSION),
            ));
        }

        word.copy_from_slice(&data[8..12]);
        let count = u32::from_le_bytes(word);

        let mut reader = Cursor::new(&data[12..]);
        let mut database = Self::new();
        for n in 0..count {
            let row = DatabaseRow::decode(&mut reader)
                .map_err(|_| {
                    Error::invalid_database(path, format!("Row {} of {} truncated", n, count))
                })?
                .map_err(|reason| Error::invalid_database(path, reason))?;
            database.insert(row);
        }

        let consumed = reader.position() as usize;
        if consumed != data.len() - 12 {
            return Err(Error::invalid_database(
                path,
                format!("{} trailing bytes after {} rows", data.len() - 12 - consumed, count),
            ));
        }

        Ok(database)
    }

    /// Serialize to the on-disk source format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.rows.len() as u32).to_le_bytes());
        for row in &self.rows {
            row.encode(&mut buf)?;
        }
        Ok(buf)
    }

    /// Insert a row. An existing row with the same identifier is replaced in place.
    pub fn insert(&mut self, row: DatabaseRow) {
        match self.index.get(&row.identifier) {
            Some(&slot) => self.rows[slot] = row,
            None => {
                self.index.insert(row.identifier, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    /// Overlay another database on top of this one; the overlay wins on collision.
    pub fn patch(&mut self, overlay: &EntryDatabase) {
        for row in &overlay.rows {
            self.insert(row.clone());
        }
    }

    /// Look up a row by identifier.
    pub fn get(&self, identifier: Identifier) -> Option<&DatabaseRow> {
        self.index.get(&identifier).map(|&slot| &self.rows[slot])
    }

    /// Iterate rows in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, DatabaseRow> {
        self.rows.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the database has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntryDatabase {
    type Item = &'a DatabaseRow;
    type IntoIter = std::slice::Iter<'a, DatabaseRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<DatabaseRow> for EntryDatabase {
    fn from_iter<I: IntoIterator<Item = DatabaseRow>>(iter: I) -> Self {
        let mut database = Self::new();
        for row in iter {
            database.insert(row);
        }
        database
    }
}

//! Binary container format shared by read-only archives and the save store.
//!
//! A container is a 40-byte header, a directory of 37-byte entries, then the
//! payloads the directory points at:
//!
//! ```text
//! 0x00  4   magic: "FARC" (archive) or "SAVE" (save store)
//! 0x04  1   version (u8) = 1
//! 0x05  3   reserved (must be 0)
//! 0x08  4   revision (u32 LE), 0 for archives
//! 0x0C  4   root type tag, zero when unset
//! 0x10  20  root hash, zero when unset
//! 0x24  4   entry_count (u32 LE)
//! 0x28  ... entry_count directory entries
//! ```
//!
//! Directory entry:
//! ```text
//! 0x00  20  SHA-1 of the uncompressed payload
//! 0x14  8   offset from start of file (u64 LE)
//! 0x1C  4   stored length (u32 LE)
//! 0x20  4   raw length (u32 LE)
//! 0x24  1   compression: 0=none, 1=zstd
//! ```

use crate::error::{Error, Result};
use crate::hash::{ContentHash, HASH_SIZE};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Magic bytes of a read-only archive.
pub const ARCHIVE_MAGIC: &[u8; 4] = b"FARC";

/// Magic bytes of a save store.
pub const SAVE_MAGIC: &[u8; 4] = b"SAVE";

/// Current container format version.
pub const VERSION: u8 = 1;

/// Size of the container header in bytes.
pub const HEADER_SIZE: usize = 40;

/// Size of one directory entry in bytes.
pub const ENTRY_SIZE: usize = 37;

/// Payloads at or above this size are zstd compressed on write.
pub const COMPRESSION_THRESHOLD: usize = 4096;

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

/// The fixed-size container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Archive or save magic.
    pub magic: [u8; 4],
    /// Revision of the data the container was written for.
    pub revision: u32,
    /// Type tag of the root resource, all zero when unset.
    pub root_type: [u8; 4],
    /// Root pointer, zero when unset.
    pub root: ContentHash,
    /// Number of directory entries.
    pub entry_count: u32,
}

impl ContainerHeader {
    /// Encode the header to a 40-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = VERSION;
        // 5..8 reserved
        buf[8..12].copy_from_slice(&self.revision.to_le_bytes());
        buf[12..16].copy_from_slice(&self.root_type);
        buf[16..36].copy_from_slice(self.root.as_bytes());
        buf[36..40].copy_from_slice(&self.entry_count.to_le_bytes());
        buf
    }

    /// Decode a header, requiring the given magic.
    pub fn decode(buf: &[u8], magic: &[u8; 4], path: &Path) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::corrupted_container(
                path,
                format!(
                    "Header too short: {} bytes (expected {})",
                    buf.len(),
                    HEADER_SIZE
                ),
            ));
        }

        if &buf[0..4] != magic {
            return Err(Error::corrupted_container(
                path,
                format!("Invalid magic: expected {:?}, got {:?}", magic, &buf[0..4]),
            ));
        }

        if buf[4] != VERSION {
            return Err(Error::corrupted_container(
                path,
                format!("Unsupported version: {} (expected {})", buf[4], VERSION),
            ));
        }

        if buf[5..8] != [0, 0, 0] {
            return Err(Error::corrupted_container(path, "Reserved bytes must be 0"));
        }

        let mut root_type = [0u8; 4];
        root_type.copy_from_slice(&buf[12..16]);

        Ok(Self {
            magic: *magic,
            revision: read_u32(buf, 8),
            root_type,
            root: ContentHash::from_slice(&buf[16..36])?,
            entry_count: read_u32(buf, 36),
        })
    }
}

/// One directory entry locating a payload inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Hash of the uncompressed payload.
    pub hash: ContentHash,
    /// Absolute offset of the stored payload.
    pub offset: u64,
    /// Length of the stored (possibly compressed) payload.
    pub stored_len: u32,
    /// Length after decompression.
    pub raw_len: u32,
    /// Compression applied to the stored payload.
    pub compression: CompressionType,
}

impl DirectoryEntry {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.stored_len.to_le_bytes());
        buf.extend_from_slice(&self.raw_len.to_le_bytes());
        buf.push(self.compression.to_u8());
    }

    fn decode(buf: &[u8], path: &Path) -> Result<Self> {
        let hash = ContentHash::from_slice(&buf[0..HASH_SIZE])?;
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[20..28]);
        let compression = CompressionType::from_u8(buf[36]).ok_or_else(|| {
            Error::corrupted_container(path, format!("Invalid compression type: {}", buf[36]))
        })?;

        Ok(Self {
            hash,
            offset: u64::from_le_bytes(offset),
            stored_len: read_u32(buf, 28),
            raw_len: read_u32(buf, 32),
            compression,
        })
    }
}

/// Parse and validate a container's header and directory.
///
/// Every entry must lie entirely within `data`; the directory is never
/// trusted past a failed check.
pub fn parse(
    data: &[u8],
    magic: &[u8; 4],
    path: &Path,
) -> Result<(ContainerHeader, Vec<DirectoryEntry>)> {
    let header = ContainerHeader::decode(data, magic, path)?;

    let directory_len = (header.entry_count as usize)
        .checked_mul(ENTRY_SIZE)
        .ok_or_else(|| Error::corrupted_container(path, "Directory size overflow"))?;
    let payload_start = HEADER_SIZE + directory_len;
    if data.len() < payload_start {
        return Err(Error::corrupted_container(
            path,
            format!(
                "Directory truncated: {} entries need {} bytes, file has {}",
                header.entry_count,
                payload_start,
                data.len()
            ),
        ));
    }

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for raw in data[HEADER_SIZE..payload_start].chunks_exact(ENTRY_SIZE) {
        let entry = DirectoryEntry::decode(raw, path)?;
        let end = entry.offset.checked_add(entry.stored_len as u64);
        match end {
            Some(end) if entry.offset >= payload_start as u64 && end <= data.len() as u64 => {}
            _ => {
                return Err(Error::corrupted_container(
                    path,
                    format!(
                        "Entry {} out of bounds: offset {} length {}",
                        entry.hash, entry.offset, entry.stored_len
                    ),
                ));
            }
        }
        entries.push(entry);
    }

    Ok((header, entries))
}

/// Read, decompress and verify one payload.
pub fn read_payload(data: &[u8], entry: &DirectoryEntry, path: &Path) -> Result<Vec<u8>> {
    let start = entry.offset as usize;
    let stored = &data[start..start + entry.stored_len as usize];

    let payload = match entry.compression {
        CompressionType::None => stored.to_vec(),
        CompressionType::Zstd => decompress_zstd(stored)?,
    };

    if payload.len() != entry.raw_len as usize {
        return Err(Error::corrupted_container(
            path,
            format!(
                "Payload length mismatch for {}: expected {}, got {}",
                entry.hash,
                entry.raw_len,
                payload.len()
            ),
        ));
    }

    // Verify hash matches uncompressed data (corruption detection)
    let computed = ContentHash::hash_bytes(&payload);
    if computed != entry.hash {
        return Err(Error::corrupted_container(
            path,
            format!("Hash mismatch: expected {}, got {}", entry.hash, computed),
        ));
    }

    Ok(payload)
}

/// Serialize a complete container.
///
/// Payloads are written in the order given, so callers control determinism.
pub fn encode<'a, I>(header: &ContainerHeader, blobs: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a ContentHash, &'a [u8])>,
{
    let mut stored = Vec::new();
    for (hash, payload) in blobs {
        let raw_len = u32::try_from(payload.len())
            .map_err(|_| Error::invalid_resource(format!("Blob {} exceeds 4 GiB", hash)))?;
        let (bytes, compression) = if payload.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(payload)?, CompressionType::Zstd)
        } else {
            (payload.to_vec(), CompressionType::None)
        };
        stored.push((*hash, raw_len, compression, bytes));
    }

    let header = ContainerHeader {
        entry_count: stored.len() as u32,
        ..header.clone()
    };

    let mut buf = Vec::new();
    buf.extend_from_slice(&header.encode());

    let mut offset = (HEADER_SIZE + stored.len() * ENTRY_SIZE) as u64;
    for (hash, raw_len, compression, bytes) in &stored {
        DirectoryEntry {
            hash: *hash,
            offset,
            stored_len: bytes.len() as u32,
            raw_len: *raw_len,
            compression: *compression,
        }
        .encode(&mut buf);
        offset += bytes.len() as u64;
    }

    for (_, _, _, bytes) in &stored {
        buf.extend_from_slice(bytes);
    }

    Ok(buf)
}

/// Write a file atomically using tempfile.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;

    // Persist atomically
    temp_file.persist(path)?;
    Ok(())
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}

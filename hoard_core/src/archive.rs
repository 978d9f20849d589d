//! Read-only content-addressed archives.

use crate::container::{self, ARCHIVE_MAGIC, ContainerHeader, DirectoryEntry};
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// An opened archive: a validated directory over the file's bytes.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    data: Vec<u8>,
    index: HashMap<ContentHash, DirectoryEntry>,
    /// Listed blobs that failed to read.
    corrupt: RefCell<HashSet<ContentHash>>,
}

impl Archive {
    /// Open an archive, validating its header and directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;

        if data.is_empty() {
            return Err(Error::corrupted_container(&path, "File is empty"));
        }

        let (_, entries) = container::parse(&data, ARCHIVE_MAGIC, &path)?;

        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            // First entry wins when a hash repeats
            index.entry(entry.hash).or_insert(entry);
        }

        Ok(Self {
            path,
            data,
            index,
            corrupt: RefCell::new(HashSet::new()),
        })
    }

    /// Write a new archive holding `blobs`, returning their hashes in order.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn create<P: AsRef<Path>>(path: P, blobs: &[Vec<u8>]) -> Result<Vec<ContentHash>> {
        let path = path.as_ref();
        let hashes: Vec<ContentHash> = blobs.iter().map(|b| ContentHash::hash_bytes(b)).collect();

        let header = ContainerHeader {
            magic: *ARCHIVE_MAGIC,
            revision: 0,
            root_type: [0; 4],
            root: ContentHash::ZERO,
            entry_count: 0,
        };
        let bytes = container::encode(
            &header,
            hashes.iter().zip(blobs.iter().map(Vec::as_slice)),
        )?;

        container::write_atomic(path, &bytes)?;
        Ok(hashes)
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct blobs.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the archive holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True if the directory lists this hash.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.index.contains_key(hash)
    }

    /// Extract a blob.
    ///
    /// A listed blob that fails to decompress or verify is logged once and
    /// reported as absent.
    pub fn extract(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        let entry = self.index.get(hash)?;
        if self.corrupt.borrow().contains(hash) {
            return None;
        }

        match container::read_payload(&self.data, entry, &self.path) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(archive = %self.path.display(), %hash, error = %err, "unreadable blob");
                self.corrupt.borrow_mut().insert(*hash);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{COMPRESSION_THRESHOLD, HEADER_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_create_open_extract() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.farc");

        let big = vec![1u8; COMPRESSION_THRESHOLD * 3];
        let hashes = Archive::create(&path, &[b"alpha".to_vec(), big.clone()]).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.path(), path);
        assert_eq!(archive.extract(&hashes[0]).unwrap(), b"alpha");
        assert_eq!(archive.extract(&hashes[1]).unwrap(), big);
        assert!(archive.extract(&ContentHash::hash_bytes(b"missing")).is_none());
    }

    #[test]
    fn test_duplicate_blobs_collapse() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dup.farc");

        let hashes = Archive::create(&path, &[b"same".to_vec(), b"same".to_vec()]).unwrap();
        assert_eq!(hashes[0], hashes[1]);

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.contains(&hashes[0]));
    }

    #[test]
    fn test_open_rejects_bad_signature() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.farc");
        fs::write(&path, vec![0u8; HEADER_SIZE]).unwrap();

        assert!(matches!(
            Archive::open(&path),
            Err(Error::CorruptedContainer { .. })
        ));
    }

    #[test]
    fn test_open_rejects_empty_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.farc");
        fs::write(&path, b"").unwrap();

        assert!(Archive::open(&path).is_err());
        assert!(Archive::open(temp_dir.path().join("missing.farc")).is_err());
    }

    #[test]
    fn test_corrupt_blob_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rot.farc");
        let hashes = Archive::create(&path, &[b"fragile".to_vec(), b"sturdy".to_vec()]).unwrap();

        // Flip the first payload byte; the directory itself stays valid
        let mut bytes = fs::read(&path).unwrap();
        let first_payload = HEADER_SIZE + 2 * crate::container::ENTRY_SIZE;
        bytes[first_payload] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert!(archive.extract(&hashes[0]).is_none());
        assert_eq!(archive.extract(&hashes[1]).unwrap(), b"sturdy");

        // Remembered, so later lookups skip the read
        assert!(archive.corrupt.borrow().contains(&hashes[0]));
        assert!(!archive.corrupt.borrow().contains(&hashes[1]));
        assert!(archive.extract(&hashes[0]).is_none());
        assert_eq!(archive.corrupt.borrow().len(), 1);
    }

    #[test]
    fn test_archive_is_detached_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("moving.farc");
        let hashes = Archive::create(&path, &[b"kept".to_vec()]).unwrap();

        let archive = Archive::open(&path).unwrap();
        // Truncating the file after open does not affect extraction
        fs::write(&path, &[0u8; 3]).unwrap();
        assert_eq!(archive.extract(&hashes[0]).unwrap(), b"kept");
    }
}

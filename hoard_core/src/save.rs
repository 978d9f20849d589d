//! The mutable save store: one root pointer over a set of blobs.
//!
//! A save store is loaded whole into memory, edited, then rewritten in one
//! pass. The file on disk is only replaced by [`SaveStore::persist`], which
//! writes a sibling temporary file and renames it over the old one, so a run
//! that fails before that point leaves the previous root intact.

use crate::container::{self, ContainerHeader, SAVE_MAGIC};
use crate::deps::DependencyScanner;
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::profile::Profile;
use crate::resource::{ResourceReference, ResourceType};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Number of blobs deleted.
    pub objects_deleted: usize,
    /// Payload bytes freed.
    pub bytes_freed: u64,
}

/// A read/write content-addressed store with a single root.
#[derive(Debug, Clone)]
pub struct SaveStore {
    path: PathBuf,
    revision: u32,
    root: Option<(ResourceType, ContentHash)>,
    blobs: BTreeMap<ContentHash, Vec<u8>>,
}

impl SaveStore {
    /// Create an empty store that will be written to `path` on persist.
    pub fn create<P: AsRef<Path>>(path: P, revision: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            revision,
            root: None,
            blobs: BTreeMap::new(),
        }
    }

    /// Open an existing store, reading every blob.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::invalid_save(&path, "file does not exist"));
        }

        let data = fs::read(&path)?;
        let (header, entries) = container::parse(&data, SAVE_MAGIC, &path)?;

        let mut blobs = BTreeMap::new();
        for entry in &entries {
            let payload = container::read_payload(&data, entry, &path)?;
            blobs.insert(entry.hash, payload);
        }

        let root = if header.root.is_zero() {
            None
        } else {
            let resource_type = ResourceType::from_tag(&header.root_type).ok_or_else(|| {
                Error::invalid_save(
                    &path,
                    format!("Unknown root type tag: {:?}", header.root_type),
                )
            })?;
            Some((resource_type, header.root))
        };

        debug!(save = %path.display(), blobs = blobs.len(), "opened save store");
        Ok(Self {
            path,
            revision: header.revision,
            root,
            blobs,
        })
    }

    /// Path the store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision resources in this store are written with.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Current root pointer.
    pub fn root(&self) -> Option<(ResourceType, ContentHash)> {
        self.root
    }

    /// Number of blobs held.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// True if a blob with this hash is held.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blobs.contains_key(hash)
    }

    /// Borrow a blob.
    pub fn get(&self, hash: &ContentHash) -> Option<&[u8]> {
        self.blobs.get(hash).map(Vec::as_slice)
    }

    /// Decode the profile the root points at.
    ///
    /// Fails if the root is unset, is not a profile, or names a missing blob.
    pub fn load_root(&self) -> Result<Profile> {
        let (resource_type, hash) = self
            .root
            .ok_or_else(|| Error::invalid_save(&self.path, "root pointer is unset"))?;

        if resource_type != ResourceType::LocalProfile {
            return Err(Error::invalid_save(
                &self.path,
                format!("root is a {}, not a profile", resource_type.as_str()),
            ));
        }

        let blob = self.get(&hash).ok_or_else(|| {
            Error::invalid_save(&self.path, format!("root {} is not in the store", hash))
        })?;
        Profile::decode(blob)
    }

    /// Insert a blob, returning its hash. Inserting the same bytes twice is a no-op.
    pub fn add(&mut self, bytes: Vec<u8>) -> ContentHash {
        let hash = ContentHash::hash_bytes(&bytes);
        self.blobs.entry(hash).or_insert(bytes);
        hash
    }

    /// Point the root at a blob already in the store.
    pub fn repoint_root(&mut self, resource_type: ResourceType, hash: ContentHash) -> Result<()> {
        if !self.contains(&hash) {
            return Err(Error::object_not_found(hash.to_hex()));
        }
        self.root = Some((resource_type, hash));
        Ok(())
    }

    /// Rewrite the store file with every blob and the current root.
    ///
    /// Blobs are written in hash order, so identical contents always produce
    /// identical files.
    pub fn persist(&self) -> Result<()> {
        let (root_type, root) = match self.root {
            Some((resource_type, hash)) => (resource_type.tag(), hash),
            None => ([0; 4], ContentHash::ZERO),
        };

        let header = ContainerHeader {
            magic: *SAVE_MAGIC,
            revision: self.revision,
            root_type,
            root,
            entry_count: 0,
        };
        let bytes = container::encode(
            &header,
            self.blobs.iter().map(|(hash, blob)| (hash, blob.as_slice())),
        )?;

        container::write_atomic(&self.path, &bytes)?;
        debug!(save = %self.path.display(), blobs = self.blobs.len(), "persisted save store");
        Ok(())
    }

    /// Run garbage collection.
    ///
    /// Marks everything reachable from the root through hash references, then
    /// drops the rest. If `dry_run` is true, reports what would be dropped
    /// without changing the store. Nothing is written; call
    /// [`persist`](Self::persist) afterwards.
    pub fn gc(&mut self, dry_run: bool) -> Result<GcStats> {
        let (_, root) = self
            .root
            .ok_or_else(|| Error::invalid_save(&self.path, "root pointer is unset"))?;

        // Mark phase
        let reachable = self.mark_reachable(root);

        // Sweep phase
        let mut stats = GcStats {
            objects_deleted: 0,
            bytes_freed: 0,
        };
        for (hash, blob) in &self.blobs {
            if !reachable.contains(hash) {
                stats.objects_deleted += 1;
                stats.bytes_freed += blob.len() as u64;
            }
        }

        if !dry_run {
            self.blobs.retain(|hash, _| reachable.contains(hash));
        }

        Ok(stats)
    }

    fn mark_reachable(&self, root: ContentHash) -> HashSet<ContentHash> {
        let scanner = DependencyScanner::new();
        let mut reachable = HashSet::new();
        let mut pending = vec![root];

        while let Some(hash) = pending.pop() {
            // Already visited, or referenced but not stored
            if reachable.contains(&hash) {
                continue;
            }
            let Some(blob) = self.get(&hash) else {
                continue;
            };
            reachable.insert(hash);

            for reference in scanner.scan(blob) {
                if let ResourceReference::Hash(child) = reference {
                    pending.push(child);
                }
            }
        }

        reachable
    }
}

//! Ordered archive registry with a loose-file fallback.

use crate::archive::Archive;
use crate::database::{DatabaseRow, Identifier};
use crate::error::Result;
use crate::hash::ContentHash;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Where an optional source lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A file or directory on disk.
    Path(PathBuf),
    /// A catalog entry.
    Entry(Identifier),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Entry(id) => write!(f, "{}", id),
        }
    }
}

/// An optional source that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: Source,
    pub reason: String,
}

/// Outcome of scanning a directory for archives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discovery {
    /// Archives registered, in registration order.
    pub registered: Vec<PathBuf>,
    /// Archives or directory entries that were skipped.
    pub skipped: Vec<SkippedSource>,
}

/// Read-only content lookup over registered archives.
///
/// Archives are consulted in registration order and the first match wins.
#[derive(Debug, Default)]
pub struct ContentStore {
    archives: Vec<Archive>,
    loose_root: Option<PathBuf>,
}

impl ContentStore {
    /// Create an empty store with no loose-file fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that falls back to files under `root`.
    pub fn with_loose_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            archives: Vec::new(),
            loose_root: Some(root.as_ref().to_path_buf()),
        }
    }

    /// Register an already opened archive after all existing ones.
    pub fn register(&mut self, archive: Archive) {
        self.archives.push(archive);
    }

    /// Open and register an archive.
    ///
    /// On failure nothing is registered and the error is returned to the
    /// caller to decide whether it is fatal.
    pub fn open_archive<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let archive = Archive::open(path)?;
        info!(
            archive = %archive.path().display(),
            blobs = archive.len(),
            "registered archive"
        );
        self.register(archive);
        Ok(())
    }

    /// Registered archives in lookup order.
    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Root directory of the loose-file fallback, if any.
    pub fn loose_root(&self) -> Option<&Path> {
        self.loose_root.as_deref()
    }

    /// Find and register every archive below `dir` with the given extension.
    ///
    /// Files are visited in path order and the extension is matched without
    /// regard to case. Archives that fail to open and entries that cannot be
    /// read are logged and reported back; they never stop the scan.
    pub fn discover<P: AsRef<Path>>(&mut self, dir: P, extension: &str) -> Discovery {
        let dir = dir.as_ref();
        let mut discovery = Discovery::default();

        let walker = ignore::WalkBuilder::new(dir)
            .standard_filters(false) // Archives may sit in hidden or ignored dirs
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    discovery.skipped.push(SkippedSource {
                        source: Source::Path(dir.to_path_buf()),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if !matches {
                continue;
            }

            match self.open_archive(path) {
                Ok(()) => discovery.registered.push(path.to_path_buf()),
                Err(err) => {
                    warn!(archive = %path.display(), error = %err, "skipping archive");
                    discovery.skipped.push(SkippedSource {
                        source: Source::Path(path.to_path_buf()),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(
            registered = discovery.registered.len(),
            skipped = discovery.skipped.len(),
            "archive discovery finished"
        );
        discovery
    }

    /// Extract a blob by hash from the first archive holding it.
    pub fn extract(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        self.archives
            .iter()
            .filter(|archive| archive.contains(hash))
            .find_map(|archive| archive.extract(hash))
    }

    /// Extract a row's content, falling back to its path on disk.
    ///
    /// The loose file is only consulted when no archive yields the hash and
    /// the row's path stays inside the loose root.
    pub fn extract_row(&self, row: &DatabaseRow) -> Option<Vec<u8>> {
        if let Some(data) = self.extract(&row.hash) {
            return Some(data);
        }

        let path = self.loose_path(&row.path)?;
        match fs::read(&path) {
            Ok(data) => Some(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "unreadable loose file");
                None
            }
        }
    }

    fn loose_path(&self, relative: &str) -> Option<PathBuf> {
        let root = self.loose_root.as_ref()?;
        let relative = Path::new(relative.trim_start_matches('/'));

        let mut components = relative.components().peekable();
        components.peek()?;
        if !components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return None;
        }

        Some(root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Identifier;
    use tempfile::TempDir;

    fn row(hash: ContentHash, path: &str) -> DatabaseRow {
        DatabaseRow::new(Identifier::new(1), hash, 0, path)
    }

    #[test]
    fn test_first_registered_archive_wins() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("a.farc");
        let second = temp_dir.path().join("b.farc");
        let hashes = Archive::create(&first, &[b"shared".to_vec()]).unwrap();
        Archive::create(&second, &[b"shared".to_vec(), b"only-b".to_vec()]).unwrap();

        let mut store = ContentStore::new();
        store.open_archive(&first).unwrap();
        store.open_archive(&second).unwrap();

        assert_eq!(store.archives()[0].path(), first);
        assert_eq!(store.extract(&hashes[0]).unwrap(), b"shared");
        assert_eq!(
            store
                .extract(&ContentHash::hash_bytes(b"only-b"))
                .unwrap(),
            b"only-b"
        );
    }

    #[test]
    fn test_corrupt_copy_falls_through_to_next_archive() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("a.farc");
        let second = temp_dir.path().join("b.farc");
        let hashes = Archive::create(&first, &[b"payload".to_vec()]).unwrap();
        Archive::create(&second, &[b"payload".to_vec()]).unwrap();

        let mut bytes = fs::read(&first).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&first, bytes).unwrap();

        let mut store = ContentStore::new();
        store.open_archive(&first).unwrap();
        store.open_archive(&second).unwrap();
        assert_eq!(store.extract(&hashes[0]).unwrap(), b"payload");
    }

    #[test]
    fn test_extract_row_loose_fallback() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("gamedata/plans")).unwrap();
        fs::write(temp_dir.path().join("gamedata/plans/crate.plan"), b"loose").unwrap();

        let store = ContentStore::with_loose_root(temp_dir.path());
        let hash = ContentHash::hash_bytes(b"not in any archive");

        assert_eq!(
            store.extract_row(&row(hash, "gamedata/plans/crate.plan")).unwrap(),
            b"loose"
        );
        assert!(store.extract_row(&row(hash, "gamedata/plans/missing.plan")).is_none());
        assert!(store.extract(&hash).is_none());
    }

    #[test]
    fn test_extract_row_prefers_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("data.farc");
        let hashes = Archive::create(&archive_path, &[b"packed".to_vec()]).unwrap();
        fs::write(temp_dir.path().join("thing.plan"), b"loose").unwrap();

        let mut store = ContentStore::with_loose_root(temp_dir.path());
        store.open_archive(&archive_path).unwrap();
        assert_eq!(store.extract_row(&row(hashes[0], "thing.plan")).unwrap(), b"packed");
    }

    #[test]
    fn test_extract_row_without_loose_root() {
        let store = ContentStore::new();
        let hash = ContentHash::hash_bytes(b"x");
        assert!(store.extract_row(&row(hash, "anything")).is_none());
    }

    #[test]
    fn test_loose_path_rejects_escapes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(temp_dir.path().join("secret"), b"outside").unwrap();

        let store = ContentStore::with_loose_root(&root);
        let hash = ContentHash::hash_bytes(b"x");
        assert!(store.extract_row(&row(hash, "../secret")).is_none());
        assert!(store.extract_row(&row(hash, "")).is_none());
    }

    #[test]
    fn test_discover_order_and_skips() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();

        Archive::create(root.join("b.farc"), &[b"b".to_vec()]).unwrap();
        Archive::create(root.join("A.FARC"), &[b"a".to_vec()]).unwrap();
        Archive::create(root.join("sub/c.farc"), &[b"c".to_vec()]).unwrap();
        Archive::create(root.join(".hidden/d.farc"), &[b"d".to_vec()]).unwrap();
        fs::write(root.join("broken.farc"), b"not an archive").unwrap();
        fs::write(root.join("notes.txt"), b"ignored").unwrap();

        let mut store = ContentStore::new();
        let discovery = store.discover(root, "farc");

        let names: Vec<String> = discovery
            .registered
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().display().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                ".hidden/d.farc".to_string(),
                "A.FARC".to_string(),
                "b.farc".to_string(),
                "sub/c.farc".to_string(),
            ]
        );
        assert_eq!(discovery.skipped.len(), 1);
        assert_eq!(
            discovery.skipped[0].source,
            Source::Path(root.join("broken.farc"))
        );
        assert_eq!(store.archives().len(), 4);
        assert!(store.extract(&ContentHash::hash_bytes(b"c")).is_some());
    }

    #[test]
    fn test_discover_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ContentStore::new();
        let discovery = store.discover(temp_dir.path().join("nope"), "farc");

        assert!(discovery.registered.is_empty());
        assert_eq!(discovery.skipped.len(), 1);
    }
}

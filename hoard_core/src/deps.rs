//! Reference scanning over resource blobs.

use crate::resource::{Frame, ResourceReference};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Result of a transitive dependency walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyClosure {
    /// Resolved references in discovery order.
    pub found: Vec<ResourceReference>,
    /// References nothing could resolve, in discovery order.
    pub missing: Vec<ResourceReference>,
}

/// Reads the reference table of resource blobs without a full decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyScanner;

impl DependencyScanner {
    /// Create a scanner.
    pub fn new() -> Self {
        Self
    }

    /// Every reference a blob embeds.
    ///
    /// A blob whose frame or reference table cannot be read yields an empty set.
    pub fn scan(&self, blob: &[u8]) -> BTreeSet<ResourceReference> {
        self.references(blob).into_iter().collect()
    }

    /// True if the blob embeds at least one hash reference.
    pub fn has_hash_references(&self, blob: &[u8]) -> bool {
        self.scan(blob).iter().any(ResourceReference::is_hash)
    }

    /// Walk references transitively, breadth first, starting from `root`.
    ///
    /// `resolve` maps a reference to its blob. Every reference is visited at
    /// most once, so cycles terminate.
    pub fn collect<F>(&self, root: &[u8], mut resolve: F) -> DependencyClosure
    where
        F: FnMut(&ResourceReference) -> Option<Vec<u8>>,
    {
        let mut closure = DependencyClosure::default();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ResourceReference> = VecDeque::new();

        for reference in self.references(root) {
            if seen.insert(reference) {
                queue.push_back(reference);
            }
        }

        while let Some(reference) = queue.pop_front() {
            let Some(blob) = resolve(&reference) else {
                closure.missing.push(reference);
                continue;
            };
            closure.found.push(reference);

            for child in self.references(&blob) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        closure
    }

    fn references(&self, blob: &[u8]) -> Vec<ResourceReference> {
        match Frame::parse(blob) {
            Ok(frame) => frame.references,
            Err(_) => Vec::new(),
        }
    }
}

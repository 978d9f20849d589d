//! # Hoard Core
//!
//! Rebuilds the inventory of a game save from content-addressed archives.
//!
//! Game content lives in read-only archives keyed by SHA-1. A patchable
//! catalog maps stable identifiers to content hashes and loose-file paths.
//! This library walks that catalog, filters out everything that is not a
//! curated, placeable plan, and adds what remains to the profile held in a
//! mutable save store, rewriting the store atomically at the end.
//!
//! ## Features
//!
//! - Ordered archive registry with a loose-file fallback
//! - Catalog overlay: later patch databases win on identifier collision
//! - Shallow reference scanning and transitive dependency walks
//! - Single-root save store with deduplicating adds and garbage collection
//! - Deterministic, idempotent inventory synthesis with typed skip reasons
//!
//! ## Example
//!
//! ```no_run
//! use hoard_core::{Config, populate};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("hoard.conf")?;
//! let summary = populate(Path::new("profile.save"), Path::new("./game"), &config)?;
//! println!("Added {} items", summary.report.added.len());
//! for source in &summary.skipped_sources {
//!     println!("skipped {}: {}", source.source, source.reason);
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod config;
mod container;
mod content;
mod database;
mod deps;
mod error;
mod hash;
mod inventory;
mod profile;
mod resource;
mod save;
mod session;
mod synth;
mod translation;

#[cfg(test)]
mod testutil;

pub use archive::Archive;
pub use config::Config;
pub use content::{ContentStore, Discovery, SkippedSource, Source};
pub use database::{DatabaseRow, EntryDatabase, Identifier};
pub use deps::{DependencyClosure, DependencyScanner};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use inventory::{InventoryData, InventoryItem, ItemDetails, ItemFlags, ObjectTypes, ToolType};
pub use profile::{PROGRESSION_COMPLETED, Profile, Progression};
pub use resource::{
    Frame, ResourceHeader, ResourceReference, ResourceType, decode_header, encode_frame, encode_plan,
};
pub use save::{GcStats, SaveStore};
pub use session::{Catalog, PopulateSummary, populate};
pub use synth::{DEFAULT_RESERVED_MASK, RowSkip, Rules, SynthesisReport, Synthesizer};
pub use translation::TranslationTable;

//! Inventory synthesis: walk the catalog and add every admissible plan.
//!
//! Each row runs through a fixed sequence of checks. The first one that
//! fails produces a [`RowSkip`] and the row is left out; nothing a single row
//! does can abort the walk. Rows are visited in catalog order, so the items
//! added and their order depend only on the inputs.

use crate::content::ContentStore;
use crate::database::{DatabaseRow, EntryDatabase, Identifier};
use crate::deps::DependencyScanner;
use crate::inventory::{InventoryData, ObjectTypes, ToolType};
use crate::profile::Profile;
use crate::resource::{ResourceType, decode_header};
use crate::translation::TranslationTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Default bit marking identifiers from the legacy reserved range.
pub const DEFAULT_RESERVED_MASK: u32 = 0x8000_0000;

/// Admissibility rules applied to every catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    /// Rows whose path lacks this suffix are not candidates.
    pub family_suffix: String,
    /// Resource type candidates must decode as.
    pub resource_type: ResourceType,
    /// Path substrings naming synthetic or level-scoped content.
    pub deny: Vec<String>,
    /// Identifiers with any of these bits set are skipped. Zero disables the check.
    pub reserved_mask: u32,
    /// Object types that disqualify a plan.
    pub excluded_types: ObjectTypes,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            family_suffix: ".plan".to_string(),
            resource_type: ResourceType::Plan,
            deny: vec!["base_virtual".to_string(), "levels".to_string()],
            reserved_mask: DEFAULT_RESERVED_MASK,
            excluded_types: ObjectTypes::PLAYER_COLOUR,
        }
    }
}

/// Why a row was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSkip {
    /// Path does not end with the family suffix.
    WrongFamily,
    /// Path contains a denied substring.
    DeniedPath,
    /// Identifier lies in the reserved range.
    ReservedIdentifier,
    /// The profile already owns this plan.
    AlreadyPresent,
    /// No archive or loose file holds the content.
    ContentMissing,
    /// The blob references ad hoc content by hash.
    HashReference,
    /// The header could not be decoded.
    Undecodable,
    /// The blob is not of the expected resource type.
    WrongType,
    /// The plan carries no inventory data.
    NoInventoryData,
    /// The plan has no icon.
    NoIcon,
    /// The plan belongs to no object type.
    NoObjectType,
    /// The plan activates a tool.
    ToolType,
    /// The plan has an excluded object type.
    ExcludedType,
    /// Every item uid is already taken.
    NoFreeUid,
}

impl RowSkip {
    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            RowSkip::WrongFamily => "wrong_family",
            RowSkip::DeniedPath => "denied_path",
            RowSkip::ReservedIdentifier => "reserved_identifier",
            RowSkip::AlreadyPresent => "already_present",
            RowSkip::ContentMissing => "content_missing",
            RowSkip::HashReference => "hash_reference",
            RowSkip::Undecodable => "undecodable",
            RowSkip::WrongType => "wrong_type",
            RowSkip::NoInventoryData => "no_inventory_data",
            RowSkip::NoIcon => "no_icon",
            RowSkip::NoObjectType => "no_object_type",
            RowSkip::ToolType => "tool_type",
            RowSkip::ExcludedType => "excluded_type",
            RowSkip::NoFreeUid => "no_free_uid",
        }
    }
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one catalog walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisReport {
    /// Rows visited.
    pub rows: usize,
    /// Plans added, in the order they were added.
    pub added: Vec<Identifier>,
    /// Skipped rows counted by reason.
    pub skipped: BTreeMap<RowSkip, usize>,
}

impl SynthesisReport {
    /// Total rows skipped for any reason.
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Adds admissible catalog plans to a profile.
#[derive(Debug)]
pub struct Synthesizer<'a> {
    database: &'a EntryDatabase,
    content: &'a ContentStore,
    scanner: DependencyScanner,
    rules: &'a Rules,
    translations: &'a TranslationTable,
}

impl<'a> Synthesizer<'a> {
    /// Create a synthesizer over read-only sources.
    pub fn new(
        database: &'a EntryDatabase,
        content: &'a ContentStore,
        scanner: DependencyScanner,
        rules: &'a Rules,
        translations: &'a TranslationTable,
    ) -> Self {
        Self {
            database,
            content,
            scanner,
            rules,
            translations,
        }
    }

    /// Run every check on one row, returning the plan's inventory data if it
    /// may be added.
    pub fn evaluate(
        &self,
        row: &DatabaseRow,
        profile: &Profile,
    ) -> Result<InventoryData, RowSkip> {
        let rules = self.rules;

        if !row.path.ends_with(&rules.family_suffix) {
            return Err(RowSkip::WrongFamily);
        }
        if rules.deny.iter().any(|needle| row.path.contains(needle.as_str())) {
            return Err(RowSkip::DeniedPath);
        }
        if row.identifier.is_reserved(rules.reserved_mask) {
            return Err(RowSkip::ReservedIdentifier);
        }
        if profile.has_item(row.identifier) {
            return Err(RowSkip::AlreadyPresent);
        }

        let blob = self
            .content
            .extract_row(row)
            .ok_or(RowSkip::ContentMissing)?;

        if self.scanner.has_hash_references(&blob) {
            return Err(RowSkip::HashReference);
        }

        let header = decode_header(&blob).map_err(|_| RowSkip::Undecodable)?;
        if header.resource_type != rules.resource_type {
            return Err(RowSkip::WrongType);
        }

        let data = header.inventory.ok_or(RowSkip::NoInventoryData)?;
        if data.icon.is_none() {
            return Err(RowSkip::NoIcon);
        }
        if data.object_types.is_empty() {
            return Err(RowSkip::NoObjectType);
        }
        if data.tool_type != ToolType::None {
            return Err(RowSkip::ToolType);
        }
        if data.object_types.intersects(rules.excluded_types) {
            return Err(RowSkip::ExcludedType);
        }

        Ok(data)
    }

    /// Walk the whole catalog, adding every admissible plan to `profile`.
    pub fn run(&self, profile: &mut Profile) -> SynthesisReport {
        let mut report = SynthesisReport::default();

        for row in self.database {
            report.rows += 1;
            match self.evaluate(row, profile) {
                Ok(data) => match profile.add_item(&data, row.identifier, self.translations) {
                    Some(_) => report.added.push(row.identifier),
                    None => *report.skipped.entry(RowSkip::NoFreeUid).or_insert(0) += 1,
                },
                Err(skip) => *report.skipped.entry(skip).or_insert(0) += 1,
            }
        }

        debug!(
            rows = report.rows,
            added = report.added.len(),
            skipped = report.skipped_total(),
            "catalog walk finished"
        );
        report
    }
}

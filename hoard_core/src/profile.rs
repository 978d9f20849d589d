//! The local profile: the single mutable root resource of a save store.
//!
//! Payload layout:
//! ```text
//! 4   item count (u32 LE)
//! ... items (see InventoryItem::encode)
//! 4   progression flags
//! 4   progression status
//! 4   events happened bits
//! 4   events explained bits
//! 4   menu unlocks
//! ```

use crate::database::Identifier;
use crate::error::Result;
use crate::inventory::{InventoryData, InventoryItem, ItemDetails, ItemFlags, ToolType};
use crate::resource::{Frame, ResourceReference, ResourceType, encode_frame, read_u32};
use crate::translation::TranslationTable;
use std::collections::HashSet;
use std::io::Cursor;

/// Progression status meaning every story step is done.
pub const PROGRESSION_COMPLETED: u32 = 3;

/// Global unlock and progression fields of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progression {
    pub flags: u32,
    pub status: u32,
    pub events_happened: u32,
    pub events_explained: u32,
    pub menu_unlocks: u32,
}

/// Inventory plus progression state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    inventory: Vec<InventoryItem>,
    owned: HashSet<Identifier>,
    pub progression: Progression,
}

impl Profile {
    /// Create an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a profile resource blob.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let frame = Frame::parse_as(data, ResourceType::LocalProfile)?;
        let mut reader = Cursor::new(frame.payload);

        let count = read_u32(&mut reader)?;
        let mut profile = Profile::new();
        // Stored items are kept as-is, duplicates included
        for _ in 0..count {
            let item = InventoryItem::decode(&mut reader)?;
            profile.owned.insert(item.plan);
            profile.inventory.push(item);
        }

        profile.progression = Progression {
            flags: read_u32(&mut reader)?,
            status: read_u32(&mut reader)?,
            events_happened: read_u32(&mut reader)?,
            events_explained: read_u32(&mut reader)?,
            menu_unlocks: read_u32(&mut reader)?,
        };

        Ok(profile)
    }

    /// Encode as a profile resource blob.
    ///
    /// The reference table lists every item's plan, then its icon, each once,
    /// in inventory order.
    pub fn encode(&self, revision: u32) -> Vec<u8> {
        let mut references = Vec::new();
        let mut seen = HashSet::new();
        for item in &self.inventory {
            let plan = ResourceReference::Identifier(item.plan);
            if seen.insert(plan) {
                references.push(plan);
            }
            if let Some(icon) = item.details.as_ref().and_then(|d| d.data.icon)
                && seen.insert(icon)
            {
                references.push(icon);
            }
        }

        let mut payload = Vec::new();
        payload.extend_from_slice(&(self.inventory.len() as u32).to_le_bytes());
        for item in &self.inventory {
            item.encode(&mut payload);
        }

        let p = &self.progression;
        for field in [
            p.flags,
            p.status,
            p.events_happened,
            p.events_explained,
            p.menu_unlocks,
        ] {
            payload.extend_from_slice(&field.to_le_bytes());
        }

        encode_frame(ResourceType::LocalProfile, revision, &references, &payload)
    }

    /// Items in inventory order.
    pub fn items(&self) -> &[InventoryItem] {
        &self.inventory
    }

    /// Append an existing item. Returns false, leaving the profile
    /// unchanged, if its plan is already owned.
    pub fn insert_item(&mut self, item: InventoryItem) -> bool {
        if !self.owned.insert(item.plan) {
            return false;
        }
        self.inventory.push(item);
        true
    }

    /// True if an item for this plan is already in the inventory.
    pub fn has_item(&self, plan: Identifier) -> bool {
        self.owned.contains(&plan)
    }

    /// Add an item for `plan`, translating its title and description.
    ///
    /// Returns the new item's uid, or `None` if the plan is already owned or
    /// every uid is taken.
    pub fn add_item(
        &mut self,
        data: &InventoryData,
        plan: Identifier,
        translations: &TranslationTable,
    ) -> Option<u32> {
        if self.has_item(plan) {
            return None;
        }

        let uid = self.next_uid()?;
        self.insert_item(InventoryItem {
            plan,
            uid,
            flags: ItemFlags::empty(),
            details: Some(ItemDetails {
                data: data.clone(),
                title: translations.translate(data.title_key),
                description: translations.translate(data.description_key),
            }),
        });
        Some(uid)
    }

    /// One past the largest uid, or the smallest free non-zero uid once the
    /// largest is `u32::MAX`.
    fn next_uid(&self) -> Option<u32> {
        let max = self.inventory.iter().map(|item| item.uid).max().unwrap_or(0);
        if let Some(uid) = max.checked_add(1) {
            return Some(uid);
        }

        let taken: HashSet<u32> = self.inventory.iter().map(|item| item.uid).collect();
        (1..u32::MAX).find(|uid| !taken.contains(uid))
    }

    /// Mark every progression step complete and every menu unlocked.
    pub fn unlock_progression(&mut self) {
        self.progression = Progression {
            flags: u32::MAX,
            status: PROGRESSION_COMPLETED,
            events_happened: u32::MAX,
            events_explained: u32::MAX,
            menu_unlocks: u32::MAX,
        };
    }

    /// Heart existing items by tool type or plan identifier.
    ///
    /// Items without details are left alone. Returns how many items changed.
    pub fn highlight(&mut self, tools: &[ToolType], plans: &[Identifier]) -> usize {
        let mut changed = 0;
        for item in &mut self.inventory {
            let Some(details) = &item.details else {
                continue;
            };

            let wanted =
                tools.contains(&details.data.tool_type) || plans.contains(&item.plan);
            if wanted && !item.flags.contains(ItemFlags::HEARTED) {
                item.flags |= ItemFlags::HEARTED;
                changed += 1;
            }
        }
        changed
    }
}

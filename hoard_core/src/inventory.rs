//! Inventory data carried by plans and stored in profile items.

use crate::database::Identifier;
use crate::error::{Error, Result};
use crate::resource::{ResourceReference, read_string, read_u8, read_u32, write_string};
use bitflags::bitflags;
use serde::Serialize;
use std::io::Cursor;

bitflags! {
    /// Inventory categories an object belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectTypes: u32 {
        const PRIMITIVE_MATERIAL = 1 << 0;
        const PRIMITIVE_SHAPE = 1 << 1;
        const READYMADE = 1 << 2;
        const DECORATIONS = 1 << 3;
        const STICKERS = 1 << 4;
        const COSTUME = 1 << 5;
        const JOINTS = 1 << 6;
        const GAMEPLAY_KIT = 1 << 7;
        const BACKGROUND = 1 << 8;
        const SOUND = 1 << 9;
        const MUSIC = 1 << 10;
        const TOOL = 1 << 11;
        /// Palette entry, not a placeable item
        const PLAYER_COLOUR = 1 << 12;
        const USER_OBJECT = 1 << 13;
    }
}

impl ObjectTypes {
    /// Parse a comma-separated list of lowercase flag names.
    pub fn parse_list(s: &str) -> Result<Self> {
        let mut types = ObjectTypes::empty();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let flag = ObjectTypes::from_name(&name.to_ascii_uppercase())
                .ok_or_else(|| Error::invalid_config(format!("Unknown object type: {}", name)))?;
            types |= flag;
        }
        Ok(types)
    }

    /// Lowercase names of the set flags, for display.
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

bitflags! {
    /// Per-item status flags in a profile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u32 {
        const HEARTED = 0x01;
        const UPLOADED = 0x02;
        const CHEAT = 0x04;
        const UNSAVED = 0x08;
        const ERRORED = 0x10;
    }
}

/// Tool an item activates when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// Ordinary placeable item.
    #[default]
    None,
    /// Removes physics from the target.
    Unphysics,
    /// Strips stickers from the target.
    StickerWash,
    /// Any other tool, kept by its raw value.
    Other(u8),
}

impl ToolType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        match self {
            ToolType::None => 0,
            ToolType::Unphysics => 1,
            ToolType::StickerWash => 2,
            ToolType::Other(value) => value,
        }
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ToolType::None,
            1 => ToolType::Unphysics,
            2 => ToolType::StickerWash,
            other => ToolType::Other(other),
        }
    }

    /// Parse a config name (`none`, `unphysics`, `sticker_wash`) or raw number.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ToolType::None),
            "unphysics" => Ok(ToolType::Unphysics),
            "sticker_wash" => Ok(ToolType::StickerWash),
            other => other
                .parse::<u8>()
                .map(ToolType::from_u8)
                .map_err(|_| Error::invalid_config(format!("Unknown tool type: {}", other))),
        }
    }
}

/// Inventory fields of a plan.
///
/// Layout: `has_icon u8`, icon reference when set, `object_types u32`,
/// `tool_type u8`, `title_key u32`, `description_key u32`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryData {
    pub icon: Option<ResourceReference>,
    pub object_types: ObjectTypes,
    pub tool_type: ToolType,
    /// Translation key of the item name.
    pub title_key: u32,
    /// Translation key of the item description.
    pub description_key: u32,
}

impl InventoryData {
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match &self.icon {
            Some(icon) => {
                buf.push(1);
                icon.encode(buf);
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.object_types.bits().to_le_bytes());
        buf.push(self.tool_type.to_u8());
        buf.extend_from_slice(&self.title_key.to_le_bytes());
        buf.extend_from_slice(&self.description_key.to_le_bytes());
    }

    pub(crate) fn decode(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let icon = match read_u8(reader)? {
            0 => None,
            1 => Some(ResourceReference::decode(reader)?),
            flag => {
                return Err(Error::invalid_resource(format!(
                    "Invalid icon flag: {}",
                    flag
                )));
            }
        };

        Ok(Self {
            icon,
            object_types: ObjectTypes::from_bits_retain(read_u32(reader)?),
            tool_type: ToolType::from_u8(read_u8(reader)?),
            title_key: read_u32(reader)?,
            description_key: read_u32(reader)?,
        })
    }
}

/// Plan data copied into a profile item, with names already translated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemDetails {
    pub data: InventoryData,
    pub title: String,
    pub description: String,
}

/// One entry of a profile's inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    /// Catalog identifier of the plan.
    pub plan: Identifier,
    /// Profile-unique item number.
    pub uid: u32,
    pub flags: ItemFlags,
    pub details: Option<ItemDetails>,
}

impl InventoryItem {
    /// Encode the item.
    ///
    /// Format:
    /// - 4 bytes: plan identifier
    /// - 4 bytes: uid
    /// - 4 bytes: flags
    /// - 1 byte: details present
    /// - details: inventory data, title, description (u16-prefixed UTF-8)
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.plan.value().to_le_bytes());
        buf.extend_from_slice(&self.uid.to_le_bytes());
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        match &self.details {
            Some(details) => {
                buf.push(1);
                details.data.encode(buf);
                write_string(buf, &details.title);
                write_string(buf, &details.description);
            }
            None => buf.push(0),
        }
    }

    pub(crate) fn decode(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let plan = Identifier::new(read_u32(reader)?);
        let uid = read_u32(reader)?;
        let flags = ItemFlags::from_bits_retain(read_u32(reader)?);

        let details = match read_u8(reader)? {
            0 => None,
            1 => Some(ItemDetails {
                data: InventoryData::decode(reader)?,
                title: read_string(reader)?,
                description: read_string(reader)?,
            }),
            flag => {
                return Err(Error::invalid_resource(format!(
                    "Invalid details flag: {}",
                    flag
                )));
            }
        };

        Ok(Self {
            plan,
            uid,
            flags,
            details,
        })
    }
}

//! Resource blob framing.
//!
//! Every resource starts with the same frame; only the payload differs by type:
//!
//! ```text
//! 0x00  4   type tag ("PLNb", "TEX ", "MSHb", "TRNb", "PRFb")
//! 0x04  4   revision (u32 LE)
//! 0x08  4   reference count (u32 LE)
//! 0x0C  ... references, each a kind byte followed by its value:
//!           1 = hash (20 bytes), 2 = identifier (u32 LE)
//!       ... type-specific payload
//! ```

use crate::database::Identifier;
use crate::error::{Error, Result};
use crate::hash::{ContentHash, HASH_SIZE};
use crate::inventory::InventoryData;
use serde::Serialize;
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

/// Size of the fixed part of a resource frame.
pub const FRAME_HEADER_SIZE: usize = 12;

const KIND_HASH: u8 = 1;
const KIND_IDENTIFIER: u8 = 2;

/// Resource kinds this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Placeable object plan; carries inventory data.
    Plan,
    /// Texture.
    Texture,
    /// Mesh.
    Mesh,
    /// Key to string translation table.
    TranslationTable,
    /// Per-user profile holding the inventory.
    LocalProfile,
}

impl ResourceType {
    /// The 4-byte tag written at the start of the blob.
    pub fn tag(self) -> [u8; 4] {
        match self {
            ResourceType::Plan => *b"PLNb",
            ResourceType::Texture => *b"TEX ",
            ResourceType::Mesh => *b"MSHb",
            ResourceType::TranslationTable => *b"TRNb",
            ResourceType::LocalProfile => *b"PRFb",
        }
    }

    /// Look up a type from its tag.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"PLNb" => Some(ResourceType::Plan),
            b"TEX " => Some(ResourceType::Texture),
            b"MSHb" => Some(ResourceType::Mesh),
            b"TRNb" => Some(ResourceType::TranslationTable),
            b"PRFb" => Some(ResourceType::LocalProfile),
            _ => None,
        }
    }

    /// Get the string name of this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Plan => "plan",
            ResourceType::Texture => "texture",
            ResourceType::Mesh => "mesh",
            ResourceType::TranslationTable => "translation_table",
            ResourceType::LocalProfile => "local_profile",
        }
    }

    /// Parse from the name returned by [`ResourceType::as_str`].
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "plan" => Ok(ResourceType::Plan),
            "texture" => Ok(ResourceType::Texture),
            "mesh" => Ok(ResourceType::Mesh),
            "translation_table" => Ok(ResourceType::TranslationTable),
            "local_profile" => Ok(ResourceType::LocalProfile),
            _ => Err(Error::invalid_config(format!("Unknown resource type: {}", s))),
        }
    }
}

/// A reference from one resource to another.
///
/// Hash references point at ad hoc content that has no catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceReference {
    /// Content addressed by hash.
    Hash(ContentHash),
    /// Catalog entry addressed by identifier.
    Identifier(Identifier),
}

impl ResourceReference {
    /// True for hash-kind references.
    pub fn is_hash(&self) -> bool {
        matches!(self, ResourceReference::Hash(_))
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ResourceReference::Hash(hash) => {
                buf.push(KIND_HASH);
                buf.extend_from_slice(hash.as_bytes());
            }
            ResourceReference::Identifier(id) => {
                buf.push(KIND_IDENTIFIER);
                buf.extend_from_slice(&id.value().to_le_bytes());
            }
        }
    }

    pub(crate) fn decode(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        match read_u8(reader)? {
            KIND_HASH => {
                let mut hash = [0u8; HASH_SIZE];
                read_exact(reader, &mut hash)?;
                Ok(ResourceReference::Hash(ContentHash::from_bytes(hash)))
            }
            KIND_IDENTIFIER => Ok(ResourceReference::Identifier(Identifier::new(read_u32(
                reader,
            )?))),
            kind => Err(Error::invalid_resource(format!(
                "Invalid reference kind: {}",
                kind
            ))),
        }
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceReference::Hash(hash) => write!(f, "h{}", hash),
            ResourceReference::Identifier(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for ResourceReference {
    type Err = Error;

    /// Accepts a content hash as `h<40 hex>` or bare 40 hex digits, and
    /// anything `Identifier` accepts.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let hex = s
            .strip_prefix('h')
            .or_else(|| s.strip_prefix('H'))
            .unwrap_or(s);
        if hex.len() == HASH_SIZE * 2 {
            return ContentHash::from_hex(hex).map(ResourceReference::Hash);
        }
        s.parse().map(ResourceReference::Identifier)
    }
}

/// A parsed resource frame borrowing its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub resource_type: ResourceType,
    pub revision: u32,
    pub references: Vec<ResourceReference>,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse the frame of a resource blob.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(Error::invalid_resource(format!(
                "Resource too short: {} bytes",
                data.len()
            )));
        }

        let resource_type = ResourceType::from_tag(&data[0..4]).ok_or_else(|| {
            Error::invalid_resource(format!("Unknown type tag: {:?}", &data[0..4]))
        })?;

        let mut reader = Cursor::new(&data[4..]);
        let revision = read_u32(&mut reader)?;
        let count = read_u32(&mut reader)? as usize;

        // Smallest reference is 5 bytes; refuse counts the blob cannot hold
        let remaining = data.len() - FRAME_HEADER_SIZE;
        if count > remaining / 5 {
            return Err(Error::invalid_resource(format!(
                "Reference count {} exceeds blob size",
                count
            )));
        }

        let mut references = Vec::with_capacity(count);
        for _ in 0..count {
            references.push(ResourceReference::decode(&mut reader)?);
        }

        let payload = &data[4 + reader.position() as usize..];
        Ok(Self {
            resource_type,
            revision,
            references,
            payload,
        })
    }

    /// Parse and require a specific resource type.
    pub fn parse_as(data: &'a [u8], expected: ResourceType) -> Result<Self> {
        let frame = Self::parse(data)?;
        if frame.resource_type != expected {
            return Err(Error::invalid_resource_type(
                expected.as_str(),
                frame.resource_type.as_str(),
            ));
        }
        Ok(frame)
    }
}

/// Build a resource blob from its parts.
pub fn encode_frame(
    resource_type: ResourceType,
    revision: u32,
    references: &[ResourceReference],
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + references.len() * 21 + payload.len());
    buf.extend_from_slice(&resource_type.tag());
    buf.extend_from_slice(&revision.to_le_bytes());
    buf.extend_from_slice(&(references.len() as u32).to_le_bytes());
    for reference in references {
        reference.encode(&mut buf);
    }
    buf.extend_from_slice(payload);
    buf
}

/// The handful of fields needed to judge a resource without a full decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHeader {
    pub resource_type: ResourceType,
    pub revision: u32,
    /// Inventory data; only plans carry it, and it may be absent on a plan.
    pub inventory: Option<InventoryData>,
}

/// Decode the type tag and, for plans, the inventory fields.
pub fn decode_header(data: &[u8]) -> Result<ResourceHeader> {
    let frame = Frame::parse(data)?;

    let inventory = match frame.resource_type {
        ResourceType::Plan => {
            let mut reader = Cursor::new(frame.payload);
            match read_u8(&mut reader)? {
                0 => None,
                1 => Some(InventoryData::decode(&mut reader)?),
                flag => {
                    return Err(Error::invalid_resource(format!(
                        "Invalid inventory flag: {}",
                        flag
                    )));
                }
            }
        }
        _ => None,
    };

    Ok(ResourceHeader {
        resource_type: frame.resource_type,
        revision: frame.revision,
        inventory,
    })
}

/// Build a plan blob.
///
/// The icon reference, when present, is added to the reference table after
/// `dependencies` unless already listed.
pub fn encode_plan(
    revision: u32,
    inventory: Option<&InventoryData>,
    dependencies: &[ResourceReference],
) -> Vec<u8> {
    let mut references = dependencies.to_vec();
    let mut payload = Vec::new();

    match inventory {
        Some(data) => {
            if let Some(icon) = data.icon
                && !references.contains(&icon)
            {
                references.push(icon);
            }
            payload.push(1);
            data.encode(&mut payload);
        }
        None => payload.push(0),
    }

    encode_frame(ResourceType::Plan, revision, &references, &payload)
}

pub(crate) fn read_exact(reader: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|_| Error::invalid_resource("Unexpected end of resource"))
}

pub(crate) fn read_u8(reader: &mut Cursor<&[u8]>) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16(reader: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32(reader: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_string(reader: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_u16(reader)? as usize;
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::invalid_resource(format!("Invalid UTF-8: {}", e)))
}

pub(crate) fn write_string(buf: &mut Vec<u8>, s: &str) {
    // Longer strings are truncated at a char boundary
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.extend_from_slice(&(end as u16).to_le_bytes());
    buf.extend_from_slice(&s.as_bytes()[..end]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{ObjectTypes, ToolType};

    fn texture_ref(n: u32) -> ResourceReference {
        ResourceReference::Identifier(Identifier::new(n))
    }

    fn sample_inventory() -> InventoryData {
        InventoryData {
            icon: Some(texture_ref(900)),
            object_types: ObjectTypes::READYMADE,
            tool_type: ToolType::None,
            title_key: 11,
            description_key: 12,
        }
    }

    #[test]
    fn test_resource_type_tags() {
        for ty in [
            ResourceType::Plan,
            ResourceType::Texture,
            ResourceType::Mesh,
            ResourceType::TranslationTable,
            ResourceType::LocalProfile,
        ] {
            assert_eq!(ResourceType::from_tag(&ty.tag()), Some(ty));
            assert_eq!(ResourceType::parse(ty.as_str()).unwrap(), ty);
        }
        assert_eq!(ResourceType::from_tag(b"ZZZZ"), None);
        assert!(ResourceType::parse("sound").is_err());
    }

    #[test]
    fn test_reference_from_str() {
        let hash = ContentHash::hash_bytes(b"blob");
        let hex = hash.to_hex();

        assert_eq!(
            format!("h{}", hex).parse::<ResourceReference>().unwrap(),
            ResourceReference::Hash(hash)
        );
        assert_eq!(
            hex.parse::<ResourceReference>().unwrap(),
            ResourceReference::Hash(hash)
        );
        assert_eq!(
            ResourceReference::Hash(hash)
                .to_string()
                .parse::<ResourceReference>()
                .unwrap(),
            ResourceReference::Hash(hash)
        );
        assert_eq!("g123".parse::<ResourceReference>().unwrap(), texture_ref(123));
        assert_eq!("0x7b".parse::<ResourceReference>().unwrap(), texture_ref(123));

        assert!(format!("h{}", &hex[..39]).parse::<ResourceReference>().is_err());
        assert!("z".repeat(40).parse::<ResourceReference>().is_err());
    }

    #[test]
    fn test_frame_parse() {
        let hash = ContentHash::hash_bytes(b"sticker");
        let refs = [ResourceReference::Hash(hash), texture_ref(3)];
        let blob = encode_frame(ResourceType::Mesh, 0x272, &refs, b"tail");

        let frame = Frame::parse(&blob).unwrap();
        assert_eq!(frame.resource_type, ResourceType::Mesh);
        assert_eq!(frame.revision, 0x272);
        assert_eq!(frame.references, refs);
        assert_eq!(frame.payload, b"tail");
    }

    #[test]
    fn test_frame_parse_as_wrong_type() {
        let blob = encode_frame(ResourceType::Texture, 1, &[], b"");
        assert!(Frame::parse_as(&blob, ResourceType::Texture).is_ok());
        assert!(matches!(
            Frame::parse_as(&blob, ResourceType::Plan),
            Err(Error::InvalidResourceType { .. })
        ));
    }

    #[test]
    fn test_frame_rejects_bad_input() {
        assert!(Frame::parse(b"PLNb").is_err());
        assert!(Frame::parse(b"XXXX\0\0\0\0\0\0\0\0").is_err());

        // Count claims more references than bytes available
        let mut blob = encode_frame(ResourceType::Plan, 1, &[texture_ref(1)], b"");
        blob[8..12].copy_from_slice(&1000u32.to_le_bytes());
        assert!(Frame::parse(&blob).is_err());

        // Unknown reference kind
        let mut blob = encode_frame(ResourceType::Plan, 1, &[texture_ref(1)], b"");
        blob[12] = 9;
        assert!(Frame::parse(&blob).is_err());
    }

    #[test]
    fn test_decode_plan_header() {
        let blob = encode_plan(1, Some(&sample_inventory()), &[texture_ref(5)]);
        let header = decode_header(&blob).unwrap();

        assert_eq!(header.resource_type, ResourceType::Plan);
        assert_eq!(header.inventory, Some(sample_inventory()));

        // Icon was folded into the reference table
        let frame = Frame::parse(&blob).unwrap();
        assert_eq!(frame.references, vec![texture_ref(5), texture_ref(900)]);
    }

    #[test]
    fn test_decode_plan_without_inventory() {
        let blob = encode_plan(1, None, &[]);
        assert_eq!(decode_header(&blob).unwrap().inventory, None);
    }

    #[test]
    fn test_decode_header_non_plan() {
        let blob = encode_frame(ResourceType::Texture, 1, &[], b"\x01garbage");
        let header = decode_header(&blob).unwrap();
        assert_eq!(header.resource_type, ResourceType::Texture);
        assert_eq!(header.inventory, None);
    }

    #[test]
    fn test_decode_plan_truncated_payload() {
        let blob = encode_plan(1, Some(&sample_inventory()), &[]);
        assert!(decode_header(&blob[..blob.len() - 2]).is_err());
    }

    #[test]
    fn test_write_string_truncates_on_char_boundary() {
        let long = "é".repeat(40_000);
        let mut buf = Vec::new();
        write_string(&mut buf, &long);

        let decoded = read_string(&mut Cursor::new(buf.as_slice())).unwrap();
        assert!(decoded.len() <= u16::MAX as usize);
        assert!(long.starts_with(&decoded));
    }
}

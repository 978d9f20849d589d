//! Translation tables mapping string keys to display text.

use crate::error::Result;
use crate::resource::{Frame, ResourceType, encode_frame, read_string, read_u32, write_string};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Key to string table decoded from a translation resource.
///
/// Payload: `count u32`, then `key u32` and a u16-prefixed UTF-8 string per entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    entries: BTreeMap<u32, String>,
}

impl TranslationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a translation resource blob.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let frame = Frame::parse_as(data, ResourceType::TranslationTable)?;
        let mut reader = Cursor::new(frame.payload);

        let count = read_u32(&mut reader)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = read_u32(&mut reader)?;
            entries.insert(key, read_string(&mut reader)?);
        }

        Ok(Self { entries })
    }

    /// Encode as a translation resource blob.
    pub fn encode(&self, revision: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (key, text) in &self.entries {
            payload.extend_from_slice(&key.to_le_bytes());
            write_string(&mut payload, text);
        }
        encode_frame(ResourceType::TranslationTable, revision, &[], &payload)
    }

    /// Insert or replace one entry.
    pub fn insert(&mut self, key: u32, text: impl Into<String>) {
        self.entries.insert(key, text.into());
    }

    /// Look up a key.
    pub fn get(&self, key: u32) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    /// Look up a key, falling back to an empty string.
    pub fn translate(&self, key: u32) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Overlay another table; its entries win.
    pub fn patch(&mut self, overlay: &TranslationTable) {
        for (key, text) in &overlay.entries {
            self.entries.insert(*key, text.clone());
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

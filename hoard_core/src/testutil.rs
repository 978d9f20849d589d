//! Fixture builders shared by unit tests.

use crate::database::{DatabaseRow, EntryDatabase, Identifier};
use crate::hash::ContentHash;
use crate::inventory::{InventoryData, ObjectTypes, ToolType};
use crate::profile::Profile;
use crate::resource::{ResourceReference, ResourceType, encode_plan};
use crate::save::SaveStore;
use std::fs;
use std::path::Path;

/// Inventory data that passes every admissibility rule.
pub fn inventory(icon: u32) -> InventoryData {
    InventoryData {
        icon: Some(ResourceReference::Identifier(Identifier::new(icon))),
        object_types: ObjectTypes::READYMADE,
        tool_type: ToolType::None,
        title_key: 1,
        description_key: 2,
    }
}

/// A plan blob with no dependencies besides its icon.
pub fn plan(data: &InventoryData) -> Vec<u8> {
    encode_plan(1, Some(data), &[])
}

/// A row pointing at `blob`.
pub fn row(id: u32, blob: &[u8], path: &str) -> DatabaseRow {
    DatabaseRow::new(
        Identifier::new(id),
        ContentHash::hash_bytes(blob),
        blob.len() as u32,
        path,
    )
}

/// Write a database source holding `rows` in order.
pub fn write_database(path: &Path, rows: Vec<DatabaseRow>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let database: EntryDatabase = rows.into_iter().collect();
    fs::write(path, database.encode().unwrap()).unwrap();
}

/// Write a save store whose root is `profile`.
pub fn write_save(path: &Path, profile: &Profile, revision: u32) -> ContentHash {
    let mut store = SaveStore::create(path, revision);
    let root = store.add(profile.encode(revision));
    store.repoint_root(ResourceType::LocalProfile, root).unwrap();
    store.persist().unwrap();
    root
}

//! Run configuration.
//!
//! Read from a `key = value` file. Blank lines and lines starting with `#`
//! are ignored; list values are comma separated. `patch` may be given more
//! than once and is applied in the order listed.

use crate::database::{Identifier, parse_u32};
use crate::error::{Error, Result};
use crate::inventory::{ObjectTypes, ToolType};
use crate::resource::ResourceType;
use crate::synth::Rules;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a populate run needs besides its two paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Primary database, relative to the game directory.
    pub database: PathBuf,
    /// Optional patch databases, relative to the game directory, in apply order.
    pub patches: Vec<PathBuf>,
    /// Extension archives are discovered by, matched without regard to case.
    pub archive_extension: String,
    /// Catalog identifier of the translation table.
    pub translations: Option<Identifier>,
    /// Catalog identifier of the translation patch table.
    pub translation_patch: Option<Identifier>,
    pub rules: Rules,
    /// Set every progression field to completed after the walk.
    pub unlock_progression: bool,
    /// Existing items with these tool types are hearted.
    pub highlight_tools: Vec<ToolType>,
    /// Existing items with these plan identifiers are hearted.
    pub highlight_ids: Vec<Identifier>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("output/blurayguids.map"),
            patches: vec![PathBuf::from("output/brg_patch.map")],
            archive_extension: "farc".to_string(),
            translations: Some(Identifier::new(54800)),
            translation_patch: Some(Identifier::new(69910)),
            rules: Rules::default(),
            unlock_progression: true,
            highlight_tools: vec![ToolType::Unphysics, ToolType::StickerWash],
            highlight_ids: Vec::new(),
        }
    }
}

impl Config {
    /// Load a config file. Keys it does not set keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config text. Unknown keys are an error.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Config::default();
        let mut patches: Option<Vec<PathBuf>> = None;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::invalid_config(format!("Line {}: expected key = value", number + 1))
            })?;
            let value = value.trim();

            match key.trim() {
                "database" => config.database = PathBuf::from(value),
                "patch" => {
                    let list = patches.get_or_insert_with(Vec::new);
                    if !value.is_empty() {
                        list.push(PathBuf::from(value));
                    }
                }
                "archive_extension" => {
                    config.archive_extension = value.trim_start_matches('.').to_string()
                }
                "translations" => config.translations = parse_optional_identifier(value)?,
                "translation_patch" => {
                    config.translation_patch = parse_optional_identifier(value)?
                }
                "family_suffix" => config.rules.family_suffix = value.to_string(),
                "resource_type" => config.rules.resource_type = ResourceType::parse(value)?,
                "deny" => config.rules.deny = split_list(value).map(str::to_string).collect(),
                "reserved_mask" => {
                    config.rules.reserved_mask = parse_u32(value).ok_or_else(|| {
                        Error::invalid_config(format!("Invalid reserved_mask: {:?}", value))
                    })?
                }
                "exclude_types" => config.rules.excluded_types = ObjectTypes::parse_list(value)?,
                "unlock_progression" => config.unlock_progression = parse_bool(value)?,
                "highlight_tools" => {
                    config.highlight_tools =
                        split_list(value).map(ToolType::parse).collect::<Result<_>>()?
                }
                "highlight_ids" => {
                    config.highlight_ids = split_list(value)
                        .map(str::parse::<Identifier>)
                        .collect::<Result<_>>()?
                }
                other => {
                    return Err(Error::invalid_config(format!(
                        "Line {}: unknown key {:?}",
                        number + 1,
                        other
                    )));
                }
            }
        }

        if let Some(patches) = patches {
            config.patches = patches;
        }

        Ok(config)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_optional_identifier(value: &str) -> Result<Option<Identifier>> {
    if value.is_empty() || value == "none" {
        return Ok(None);
    }
    value.parse().map(Some)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(Error::invalid_config(format!("Invalid boolean: {:?}", other))),
    }
}

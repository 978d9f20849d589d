//! Output formatting for CLI commands.
//!
//! Results go to stdout as text or JSON; errors go to stderr in the same format.

use anyhow::Result;
use hoard_core::{
    ContentHash, Identifier, InventoryItem, ItemFlags, ResourceReference, RowSkip, SkippedSource,
    ToolType,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error and its causes on one line.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `populate` command.
#[derive(Debug, Serialize)]
pub struct PopulateOutput {
    pub success: bool,
    pub result_code: u8,
    pub save: String,
    pub root: ContentHash,
    pub archives: usize,
    pub rows: usize,
    pub added: Vec<Identifier>,
    pub skipped_rows: BTreeMap<RowSkip, usize>,
    pub highlighted: usize,
    pub skipped_sources: Vec<SkippedSource>,
}

/// One profile item for `inventory` command.
#[derive(Debug, Clone, Serialize)]
pub struct ItemInfo {
    pub plan: Identifier,
    pub uid: u32,
    pub hearted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ToolType>,
    pub object_types: Vec<String>,
}

impl From<&InventoryItem> for ItemInfo {
    fn from(item: &InventoryItem) -> Self {
        let details = item.details.as_ref();
        Self {
            plan: item.plan,
            uid: item.uid,
            hearted: item.flags.contains(ItemFlags::HEARTED),
            title: details.map(|d| d.title.clone()),
            tool_type: details.map(|d| d.data.tool_type),
            object_types: details
                .map(|d| d.data.object_types.names())
                .unwrap_or_default(),
        }
    }
}

/// Output for `inventory` command.
#[derive(Debug, Serialize)]
pub struct InventoryOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: ContentHash,
    pub progression_status: u32,
    pub items: Vec<ItemInfo>,
}

/// Output for `deps` command.
#[derive(Debug, Serialize)]
pub struct DepsOutput {
    pub success: bool,
    pub result_code: u8,
    pub reference: ResourceReference,
    pub found: Vec<ResourceReference>,
    pub missing: Vec<ResourceReference>,
}

/// Output for `gc` command.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub objects_deleted: usize,
    pub bytes_freed: u64,
}

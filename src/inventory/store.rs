//! Inventory persistence
//!
//! `save` writes a snapshot atomically (temp file + rename) so that a
//! checkpoint interrupted mid-write never replaces a good one. `load`
//! detects the format from the content itself, not the file extension.

use super::types::Inventory;
use super::{document, tabular};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk inventory format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryFormat {
    /// Comma-separated rows with a fixed header
    Csv,
    /// Single JSON document
    Json,
}

impl InventoryFormat {
    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            InventoryFormat::Csv => "csv",
            InventoryFormat::Json => "json",
        }
    }

    /// Detect the format from the first non-whitespace character
    pub fn detect(text: &str) -> Self {
        match text.trim_start_matches('\u{feff}').trim_start().chars().next() {
            Some('{') => InventoryFormat::Json,
            _ => InventoryFormat::Csv,
        }
    }
}

/// Encode an inventory in the given format
pub fn render(inventory: &Inventory, format: InventoryFormat) -> StoreResult<String> {
    match format {
        InventoryFormat::Csv => tabular::render(inventory),
        InventoryFormat::Json => document::render(inventory),
    }
}

/// Decode an inventory from text of either format
pub fn parse(text: &str) -> StoreResult<Inventory> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(StoreError::Empty {
            path: PathBuf::new(),
        });
    }

    match InventoryFormat::detect(text) {
        InventoryFormat::Json => document::parse(text),
        InventoryFormat::Csv => tabular::parse(text),
    }
}

/// Write an inventory to `path`
pub fn save(inventory: &Inventory, path: &Path, format: InventoryFormat) -> StoreResult<()> {
    let text = render(inventory, format)?;

    let tmp = temp_path(path);
    fs::write(&tmp, text.as_bytes()).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;

    debug!(
        path = %path.display(),
        files = inventory.total_files(),
        format = format.extension(),
        "Inventory saved"
    );
    Ok(())
}

/// Read an inventory from `path`, whichever format it is in
pub fn load(path: &Path) -> StoreResult<Inventory> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;

    if text.trim_start_matches('\u{feff}').trim().is_empty() {
        return Err(StoreError::Empty {
            path: path.to_path_buf(),
        });
    }

    let inventory = parse(&text)?;
    debug!(
        path = %path.display(),
        files = inventory.total_files(),
        "Inventory loaded"
    );
    Ok(inventory)
}

/// Save once per format as `<stem>.<extension>`, returning the paths written
pub fn save_all(
    inventory: &Inventory,
    stem: &Path,
    formats: &[InventoryFormat],
) -> StoreResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let mut name = stem.as_os_str().to_os_string();
        name.push(".");
        name.push(format.extension());
        let path = PathBuf::from(name);
        save(inventory, &path, *format)?;
        written.push(path);
    }
    Ok(written)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Canonical textual form of an instant (RFC 3339, UTC, sub-second digits as needed)
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an RFC 3339 instant; offset-less values are taken as UTC
pub fn parse_instant(value: &str) -> StoreResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

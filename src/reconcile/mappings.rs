//! URL mapping export
//!
//! CSV columns: `old_url,new_url,old_path,new_path,filename,size,md5,status`.
//! JSON: `{generated_at, total_mappings, base_url, mappings: [...]}`.
//! An empty event list writes nothing.

use super::MoveEvent;
use crate::error::{StoreError, StoreResult};
use crate::inventory::format_instant;
use crate::redirect::EmitOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// JSON mapping document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub generated_at: String,
    pub total_mappings: usize,
    /// Empty when no base URL was given
    pub base_url: String,
    pub mappings: Vec<MoveEvent>,
}

/// Write the mapping CSV
pub fn save_mappings_csv(events: &[MoveEvent], path: &Path) -> StoreResult<EmitOutcome> {
    if events.is_empty() {
        return Ok(EmitOutcome::NothingToEmit);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for event in events {
        writer.serialize(event)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.into_error().into()))?;

    fs::write(path, bytes).map_err(|e| StoreError::io(path, e))?;
    debug!("Wrote {} mappings to {}", events.len(), path.display());
    Ok(EmitOutcome::Written {
        rules: events.len(),
    })
}

/// Write the mapping JSON document
pub fn save_mappings_json(
    events: &[MoveEvent],
    base_url: Option<&str>,
    generated_at: DateTime<Utc>,
    path: &Path,
) -> StoreResult<EmitOutcome> {
    if events.is_empty() {
        return Ok(EmitOutcome::NothingToEmit);
    }

    let document = MappingDocument {
        generated_at: format_instant(generated_at),
        total_mappings: events.len(),
        base_url: base_url.unwrap_or_default().to_string(),
        mappings: events.to_vec(),
    };
    let mut text = serde_json::to_string_pretty(&document)?;
    text.push('\n');

    fs::write(path, text).map_err(|e| StoreError::io(path, e))?;
    debug!("Wrote {} mappings to {}", events.len(), path.display());
    Ok(EmitOutcome::Written {
        rules: events.len(),
    })
}

//! JSON inventory codec
//!
//! `{"generated_at": ..., "total_files": N, "files": [...]}` with one object
//! per descriptor. Older inventories stored `size` as a string and left
//! timestamps without an offset; both are accepted on read.

use super::store::{format_instant, parse_instant};
use super::types::{ContentHash, FileDescriptor, Inventory};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Serialize)]
struct DocumentOut<'a> {
    generated_at: String,
    total_files: usize,
    files: Vec<RecordOut<'a>>,
}

#[derive(Serialize)]
struct RecordOut<'a> {
    path: &'a str,
    name: &'a str,
    size: u64,
    permissions: &'a str,
    md5: &'a str,
    timestamp: String,
}

#[derive(Deserialize)]
struct DocumentIn {
    #[serde(default)]
    generated_at: Option<String>,
    #[serde(default)]
    total_files: Option<usize>,
    #[serde(default)]
    files: Vec<RecordIn>,
}

#[derive(Deserialize)]
struct RecordIn {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<SizeValue>,
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(u64),
    Text(String),
}

/// Encode an inventory as pretty-printed JSON
pub(crate) fn render(inventory: &Inventory) -> StoreResult<String> {
    let doc = DocumentOut {
        generated_at: format_instant(inventory.generated_at()),
        total_files: inventory.total_files(),
        files: inventory
            .files()
            .iter()
            .map(|f| RecordOut {
                path: &f.path,
                name: &f.name,
                size: f.size,
                permissions: &f.permissions,
                md5: f.hash.as_persisted(),
                timestamp: format_instant(f.timestamp),
            })
            .collect(),
    };

    let mut text = serde_json::to_string_pretty(&doc)?;
    text.push('\n');
    Ok(text)
}

/// Decode JSON text into an inventory
pub(crate) fn parse(text: &str) -> StoreResult<Inventory> {
    let doc: DocumentIn = serde_json::from_str(text)?;

    let generated_at = doc
        .generated_at
        .as_deref()
        .map(parse_instant)
        .transpose()?
        .unwrap_or(DateTime::<Utc>::default());

    if let Some(total) = doc.total_files {
        if total != doc.files.len() {
            warn!(
                declared = total,
                actual = doc.files.len(),
                "JSON inventory total_files does not match file count"
            );
        }
    }

    let files = doc
        .files
        .into_iter()
        .map(|record| descriptor_from_record(record, generated_at))
        .collect::<StoreResult<Vec<_>>>()?;

    Inventory::new(generated_at, files)
}

fn descriptor_from_record(
    record: RecordIn,
    fallback: DateTime<Utc>,
) -> StoreResult<FileDescriptor> {
    let size = match record.size {
        Some(SizeValue::Number(n)) => n,
        Some(SizeValue::Text(text)) => {
            text.trim()
                .parse::<u64>()
                .map_err(|_| StoreError::InvalidSize {
                    path: record.path.clone(),
                    value: text.clone(),
                })?
        }
        None => {
            return Err(StoreError::InvalidSize {
                path: record.path.clone(),
                value: String::new(),
            })
        }
    };

    let timestamp = match record.timestamp.as_deref().map(str::trim) {
        None | Some("") => fallback,
        Some(value) => parse_instant(value)?,
    };

    let name = record
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            record
                .path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

    Ok(FileDescriptor {
        path: record.path,
        name,
        size,
        permissions: record.permissions.unwrap_or_default(),
        hash: ContentHash::from_persisted(record.md5.as_deref()),
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::types::UnhashedReason;

    #[test]
    fn test_parse_legacy_document() {
        // String sizes and offset-less timestamps
        let text = r#"{
            "generated_at": "2024-05-01T12:00:00.123456",
            "total_files": 2,
            "files": [
                {"path": "/img/a.png", "name": "a.png", "size": "1024",
                 "permissions": "-rw-r--r--", "md5": "d41d8cd98f00b204e9800998ecf8427e",
                 "timestamp": "2024-05-01T12:00:01.5"},
                {"path": "/img/b.png", "name": "b.png", "size": "10",
                 "permissions": "-rw-r--r--", "md5": "ERROR",
                 "timestamp": "2024-05-01T12:00:02"}
            ]
        }"#;

        let inv = parse(text).unwrap();
        assert_eq!(inv.total_files(), 2);
        assert_eq!(inv.files()[0].size, 1024);
        assert_eq!(
            inv.files()[1].hash,
            ContentHash::Unhashed(UnhashedReason::Failed)
        );
        assert_eq!(format_instant(inv.generated_at()), "2024-05-01T12:00:00.123456Z");
    }

    #[test]
    fn test_missing_hash_field_is_not_attempted() {
        let text = r#"{"generated_at": "2024-05-01T12:00:00Z", "total_files": 1,
            "files": [{"path": "/a.png", "name": "a.png", "size": 3, "permissions": "-rw-r--r--"}]}"#;
        let inv = parse(text).unwrap();
        assert_eq!(
            inv.files()[0].hash,
            ContentHash::Unhashed(UnhashedReason::NotAttempted)
        );
        assert_eq!(inv.files()[0].timestamp, inv.generated_at());
    }

    #[test]
    fn test_missing_size_rejected() {
        let text = r#"{"files": [{"path": "/a.png"}]}"#;
        assert!(matches!(parse(text), Err(StoreError::InvalidSize { .. })));
    }
}

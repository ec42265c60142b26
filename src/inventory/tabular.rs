//! CSV inventory codec
//!
//! Layout:
//! ```text
//! # generated_at=2024-05-01T12:00:00Z
//! # total_files=2
//! path,name,size,permissions,md5,timestamp
//! /img/a.png,a.png,1024,-rw-r--r--,9e107d9d372bb6826bd81d3542a419d6,2024-05-01T12:00:03Z
//! /img/b c.png,b c.png,77,-rw-r--r--,ERROR,2024-05-01T12:00:04Z
//! ```
//! The comment lines carry pass metadata; readers that do not understand
//! them still see a plain CSV with the header row first.

use super::store::{format_instant, parse_instant};
use super::types::{ContentHash, FileDescriptor, Inventory};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const GENERATED_AT_KEY: &str = "generated_at";
const TOTAL_FILES_KEY: &str = "total_files";

#[derive(Serialize)]
struct RowOut<'a> {
    path: &'a str,
    name: &'a str,
    size: u64,
    permissions: &'a str,
    md5: &'a str,
    timestamp: String,
}

#[derive(Deserialize)]
struct RowIn {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Encode an inventory as CSV text
pub(crate) fn render(inventory: &Inventory) -> StoreResult<String> {
    let mut out = format!(
        "# {}={}\n# {}={}\n",
        GENERATED_AT_KEY,
        format_instant(inventory.generated_at()),
        TOTAL_FILES_KEY,
        inventory.total_files()
    );

    let mut writer = csv::Writer::from_writer(Vec::new());
    if inventory.is_empty() {
        writer.write_record(["path", "name", "size", "permissions", "md5", "timestamp"])?;
    }
    for file in inventory.files() {
        writer.serialize(RowOut {
            path: &file.path,
            name: &file.name,
            size: file.size,
            permissions: &file.permissions,
            md5: file.hash.as_persisted(),
            timestamp: format_instant(file.timestamp),
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.into_error().into()))?;
    out.push_str(&String::from_utf8_lossy(&bytes));
    Ok(out)
}

/// Decode CSV text into an inventory
pub(crate) fn parse(text: &str) -> StoreResult<Inventory> {
    let (generated_at, declared_total) = read_metadata(text)?;

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(text.as_bytes());

    // Rows without their own timestamp inherit the pass instant
    let fallback = generated_at.unwrap_or(DateTime::<Utc>::default());

    let mut files = Vec::new();
    for row in reader.deserialize::<RowIn>() {
        let row = row?;
        files.push(descriptor_from_row(row, fallback)?);
    }

    if let Some(total) = declared_total {
        if total != files.len() {
            warn!(
                declared = total,
                actual = files.len(),
                "CSV inventory total_files does not match row count"
            );
        }
    }

    Inventory::new(generated_at.unwrap_or(fallback), files)
}

fn descriptor_from_row(row: RowIn, fallback: DateTime<Utc>) -> StoreResult<FileDescriptor> {
    let size_text = row.size.unwrap_or_default();
    let size = size_text
        .trim()
        .parse::<u64>()
        .map_err(|_| StoreError::InvalidSize {
            path: row.path.clone(),
            value: size_text.clone(),
        })?;

    let timestamp = match row.timestamp.as_deref().map(str::trim) {
        None | Some("") => fallback,
        Some(value) => parse_instant(value)?,
    };

    let name = row
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| row.path.rsplit('/').next().unwrap_or_default().to_string());

    Ok(FileDescriptor {
        path: row.path,
        name,
        size,
        permissions: row.permissions.unwrap_or_default(),
        hash: ContentHash::from_persisted(row.md5.as_deref()),
        timestamp,
    })
}

/// Read the `# key=value` lines that precede the header
fn read_metadata(text: &str) -> StoreResult<(Option<DateTime<Utc>>, Option<usize>)> {
    let mut generated_at = None;
    let mut total = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(comment) = line.strip_prefix('#') else {
            break;
        };
        let Some((key, value)) = comment.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            GENERATED_AT_KEY => generated_at = Some(parse_instant(value.trim())?),
            TOTAL_FILES_KEY => total = value.trim().parse().ok(),
            _ => {}
        }
    }

    Ok((generated_at, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::types::UnhashedReason;

    #[test]
    fn test_header_follows_metadata() {
        let inv = Inventory::new(Utc::now(), Vec::new()).unwrap();
        let text = render(&inv).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("# generated_at="));
        assert_eq!(lines[1], "# total_files=0");
        assert_eq!(lines[2], "path,name,size,permissions,md5,timestamp");
    }

    #[test]
    fn test_parse_plain_csv_without_metadata() {
        let text = "path,name,size,permissions,md5,timestamp\n\
                    /img/a.png,a.png,1024,-rw-r--r--,ABC123,2024-05-01T12:00:00.250000\n\
                    /img/b c.png,b c.png,77,-rw-r--r--,ERROR,\n\
                    /img/d.png,d.png,5,-rw-r--r--,,\n";
        let inv = parse(text).unwrap();

        assert_eq!(inv.total_files(), 3);
        assert_eq!(inv.files()[0].hash, ContentHash::Digest("abc123".into()));
        assert_eq!(inv.files()[0].size, 1024);
        assert_eq!(inv.files()[1].name, "b c.png");
        assert_eq!(
            inv.files()[1].hash,
            ContentHash::Unhashed(UnhashedReason::Failed)
        );
        assert_eq!(
            inv.files()[2].hash,
            ContentHash::Unhashed(UnhashedReason::NotAttempted)
        );
        assert_eq!(inv.files()[2].timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn test_parse_without_md5_column() {
        let text = "path,name,size,permissions\n/a.png,a.png,3,-rw-r--r--\n";
        let inv = parse(text).unwrap();
        assert_eq!(inv.unhashed_count(), 1);
    }

    #[test]
    fn test_invalid_size_rejected() {
        let text = "path,name,size,permissions,md5,timestamp\n/a.png,a.png,big,-rw-r--r--,,\n";
        assert!(matches!(parse(text), Err(StoreError::InvalidSize { .. })));
    }
}

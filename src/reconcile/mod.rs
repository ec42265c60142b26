//! Before/after reconciliation by content hash
//!
//! Each digest present in either inventory falls in exactly one class:
//!
//! | before | after | representative paths | class       |
//! |--------|-------|----------------------|-------------|
//! | yes    | yes   | before path survives | `unchanged` |
//! | yes    | yes   | before path gone     | `moved`     |
//! | yes    | no    |                      | `deleted`   |
//! | no     | yes   |                      | `new`       |
//!
//! When several paths on one side share a digest, the lexicographically
//! smallest path represents it, so the result never depends on listing
//! order. A digest is `unchanged` when the before representative's path
//! still carries it after, even if a smaller duplicate appeared there;
//! otherwise the smallest after path is the redirect target. Only `Digest`
//! hashes take part; unhashed descriptors are counted as unclassifiable.

pub mod mappings;

use crate::inventory::{FileDescriptor, Inventory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

pub use mappings::{save_mappings_csv, save_mappings_json, MappingDocument};

/// Classification of one digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    Moved,
    Unchanged,
    New,
    Deleted,
}

impl MoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveStatus::Moved => "moved",
            MoveStatus::Unchanged => "unchanged",
            MoveStatus::New => "new",
            MoveStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for MoveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file whose content stayed the same while its path changed
///
/// Field order is the column order of the mapping CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub old_url: String,
    pub new_url: String,
    pub old_path: String,
    pub new_path: String,
    /// Name on the after side
    pub filename: String,
    /// Size on the after side
    pub size: u64,
    #[serde(rename = "md5")]
    pub hash: String,
    pub status: MoveStatus,
}

/// Class counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub moved: usize,
    pub unchanged: usize,
    pub new: usize,
    pub deleted: usize,
    /// Digests carried by more than one path on either side
    pub duplicate_hashes: usize,
    pub unclassifiable_before: usize,
    pub unclassifiable_after: usize,
}

impl ReconcileSummary {
    /// Digests classified in total
    pub fn classified(&self) -> usize {
        self.moved + self.unchanged + self.new + self.deleted
    }
}

/// Full reconciliation result
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// `moved` events sorted by `old_path`
    pub events: Vec<MoveEvent>,
    pub summary: ReconcileSummary,
    /// Class of every digest seen on either side
    pub classes: BTreeMap<String, MoveStatus>,
}

/// Build a public URL for a remote path
///
/// `https://example.com` + `/img/a.png` → `https://example.com/img/a.png`;
/// without a base URL the result is the rooted path.
pub fn path_to_url(base_url: Option<&str>, path: &str) -> String {
    let clean = path.trim_start_matches('/');
    match base_url.map(|b| b.trim_end_matches('/')) {
        Some(base) if !base.is_empty() => format!("{}/{}", base, clean),
        _ => format!("/{}", clean),
    }
}

/// Compare two inventories by digest
pub fn reconcile(before: &Inventory, after: &Inventory, base_url: Option<&str>) -> Reconciliation {
    let before_index = before.hash_index();
    let after_index = after.hash_index();

    let mut summary = ReconcileSummary {
        unclassifiable_before: before.unhashed_count(),
        unclassifiable_after: after.unhashed_count(),
        ..ReconcileSummary::default()
    };
    let mut classes = BTreeMap::new();
    let mut events = Vec::new();

    for digest in before_index.digests() {
        let Some(old) = representative(before, digest) else {
            continue;
        };
        let still_live = after.lookup(digest).any(|f| f.path == old.path);
        let status = match representative(after, digest) {
            None => MoveStatus::Deleted,
            Some(_) if still_live => MoveStatus::Unchanged,
            Some(new) => {
                events.push(MoveEvent {
                    old_url: path_to_url(base_url, &old.path),
                    new_url: path_to_url(base_url, &new.path),
                    old_path: old.path.clone(),
                    new_path: new.path.clone(),
                    filename: new.name.clone(),
                    size: new.size,
                    hash: digest.to_string(),
                    status: MoveStatus::Moved,
                });
                MoveStatus::Moved
            }
        };
        classes.insert(digest.to_string(), status);
    }

    for digest in after_index.digests() {
        classes
            .entry(digest.to_string())
            .or_insert(MoveStatus::New);
    }

    for (digest, status) in &classes {
        match status {
            MoveStatus::Moved => summary.moved += 1,
            MoveStatus::Unchanged => summary.unchanged += 1,
            MoveStatus::New => summary.new += 1,
            MoveStatus::Deleted => summary.deleted += 1,
        }
        if before_index.positions(digest).len() > 1 || after_index.positions(digest).len() > 1 {
            summary.duplicate_hashes += 1;
        }
    }

    events.sort_by(|a, b| a.old_path.cmp(&b.old_path));

    debug!(?summary, "Reconciliation counts");
    info!(
        moved = summary.moved,
        unchanged = summary.unchanged,
        new = summary.new,
        deleted = summary.deleted,
        "Reconciled {} before / {} after files",
        before.total_files(),
        after.total_files()
    );

    Reconciliation {
        events,
        summary,
        classes,
    }
}

/// Smallest path carrying `digest` on one side
fn representative<'a>(inventory: &'a Inventory, digest: &str) -> Option<&'a FileDescriptor> {
    inventory.lookup(digest).min_by(|a, b| a.path.cmp(&b.path))
}

//! Inventory data model
//!
//! A `FileDescriptor` is created by the walker, enriched with a
//! `ContentHash` by the hasher and frozen into an `Inventory` at save time.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// Persisted marker for a file whose hash could not be computed
pub const ERROR_SENTINEL: &str = "ERROR";

/// Why a descriptor carries no digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnhashedReason {
    /// Hashing has not been tried yet (fresh walk, checkpoint remainder, blank field)
    NotAttempted,
    /// Hashing was tried and gave up
    Failed,
}

/// Content identity of a file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentHash {
    /// Lowercase hex MD5 digest
    Digest(String),
    /// No digest available
    Unhashed(UnhashedReason),
}

impl ContentHash {
    /// Build a digest value, normalizing to lowercase hex
    pub fn digest(hex: impl AsRef<str>) -> Self {
        ContentHash::Digest(hex.as_ref().trim().to_ascii_lowercase())
    }

    /// Parse the value stored in the `md5` column/field
    ///
    /// Blank maps to `NotAttempted`, the `ERROR` sentinel to `Failed`.
    pub fn from_persisted(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => ContentHash::Unhashed(UnhashedReason::NotAttempted),
            Some(v) if v.eq_ignore_ascii_case(ERROR_SENTINEL) => {
                ContentHash::Unhashed(UnhashedReason::Failed)
            }
            Some(v) => ContentHash::digest(v),
        }
    }

    /// Value written to the `md5` column/field
    pub fn as_persisted(&self) -> &str {
        match self {
            ContentHash::Digest(hex) => hex,
            ContentHash::Unhashed(UnhashedReason::Failed) => ERROR_SENTINEL,
            ContentHash::Unhashed(UnhashedReason::NotAttempted) => "",
        }
    }

    /// The digest, if there is one
    pub fn as_digest(&self) -> Option<&str> {
        match self {
            ContentHash::Digest(hex) => Some(hex),
            ContentHash::Unhashed(_) => None,
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self, ContentHash::Digest(_))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHash::Digest(hex) => f.write_str(hex),
            ContentHash::Unhashed(UnhashedReason::Failed) => f.write_str(ERROR_SENTINEL),
            ContentHash::Unhashed(UnhashedReason::NotAttempted) => f.write_str("<pending>"),
        }
    }
}

/// One file found on the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute, slash-separated path (identity)
    pub path: String,

    /// Final path component as listed
    pub name: String,

    /// Size in bytes from the listing
    pub size: u64,

    /// Raw permission flags from the listing (e.g. `-rw-r--r--`)
    pub permissions: String,

    /// Content hash, or why there is none
    pub hash: ContentHash,

    /// When the descriptor was last observed or hashed
    pub timestamp: DateTime<Utc>,
}

impl FileDescriptor {
    /// Create a freshly-listed descriptor with no hash yet
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        permissions: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size,
            permissions: permissions.into(),
            hash: ContentHash::Unhashed(UnhashedReason::NotAttempted),
            timestamp,
        }
    }

    /// Builder-style helper used by tests and the store
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.hash = hash;
        self
    }
}

/// Derived mapping from digest to descriptor positions
///
/// Positions are in inventory order; a digest shared by several paths is
/// a true duplicate and keeps all of them.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    by_digest: HashMap<String, Vec<usize>>,
}

impl HashIndex {
    pub fn build(files: &[FileDescriptor]) -> Self {
        let mut by_digest: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, file) in files.iter().enumerate() {
            if let Some(digest) = file.hash.as_digest() {
                by_digest.entry(digest.to_string()).or_default().push(pos);
            }
        }
        Self { by_digest }
    }

    /// Positions of every descriptor with this digest
    pub fn positions(&self, digest: &str) -> &[usize] {
        self.by_digest.get(digest).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.by_digest.contains_key(digest)
    }

    /// Number of distinct digests
    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }

    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.by_digest.keys().map(String::as_str)
    }

    /// Digests shared by more than one path
    pub fn duplicate_count(&self) -> usize {
        self.by_digest.values().filter(|p| p.len() > 1).count()
    }
}

/// Snapshot produced by one crawl pass
#[derive(Debug, Clone)]
pub struct Inventory {
    generated_at: DateTime<Utc>,
    files: Vec<FileDescriptor>,
    index: OnceLock<HashIndex>,
}

impl Inventory {
    /// Build an inventory, enforcing unique paths
    pub fn new(generated_at: DateTime<Utc>, files: Vec<FileDescriptor>) -> StoreResult<Self> {
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.path.as_str()) {
                return Err(StoreError::DuplicatePath {
                    path: file.path.clone(),
                });
            }
        }

        Ok(Self {
            generated_at,
            files,
            index: OnceLock::new(),
        })
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Consume the inventory, returning its descriptors
    pub fn into_files(self) -> Vec<FileDescriptor> {
        self.files
    }

    /// Hash index, built on first use
    pub fn hash_index(&self) -> &HashIndex {
        self.index.get_or_init(|| HashIndex::build(&self.files))
    }

    /// All descriptors with the given digest, in inventory order
    pub fn lookup<'a>(&'a self, digest: &str) -> impl Iterator<Item = &'a FileDescriptor> + 'a {
        self.hash_index()
            .positions(digest)
            .iter()
            .map(move |&pos| &self.files[pos])
    }

    /// Find a descriptor by path
    pub fn get(&self, path: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Descriptors with no digest
    pub fn unhashed(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.files.iter().filter(|f| !f.hash.is_digest())
    }

    pub fn unhashed_count(&self) -> usize {
        self.unhashed().count()
    }

    /// Total listed bytes
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

impl PartialEq for Inventory {
    fn eq(&self, other: &Self) -> bool {
        self.generated_at == other.generated_at && self.files == other.files
    }
}

impl Eq for Inventory {}

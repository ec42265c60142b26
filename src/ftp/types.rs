//! FTP listing types
//!
//! Parses Unix long-format `LIST` lines:
//!
//! ```text
//! drwxr-xr-x    2 web      web          4096 Mar 01 10:15 cropped images
//! -rw-r--r--    1 web      web        183245 Mar 01 10:15 hero banner.png
//! lrwxrwxrwx    1 web      web            11 Mar 01 10:15 latest.png -> hero.png
//! ```
//!
//! Fields are whitespace-delimited; the name is everything after the
//! eighth field so embedded spaces survive.

use crate::error::{FtpError, FtpResult};

/// Number of whitespace-delimited fields before the name
const FIELDS_BEFORE_NAME: usize = 8;

/// Kind of listing entry, from the first character of the permission string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// `-`
    File,
    /// `d`
    Directory,
    /// `l`
    Symlink,
    /// Anything else (`b`, `c`, `p`, `s`, ...)
    Other,
}

impl EntryKind {
    /// Classify from the raw permission flags
    pub fn from_permissions(permissions: &str) -> Self {
        match permissions.chars().next() {
            Some('d') | Some('D') => EntryKind::Directory,
            Some('l') => EntryKind::Symlink,
            Some('-') => EntryKind::File,
            _ => EntryKind::Other,
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }
}

/// One parsed `LIST` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Raw permission flags (`drwxr-xr-x`)
    pub permissions: String,

    /// Size column in bytes
    pub size: u64,

    /// Entry name, symlink target stripped
    pub name: String,

    /// Entry kind
    pub kind: EntryKind,

    /// Symlink target, if this is a link
    pub link_target: Option<String>,
}

impl ListingEntry {
    /// Parse a single listing line
    pub fn parse(line: &str) -> FtpResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        let mut fields: Vec<&str> = Vec::with_capacity(FIELDS_BEFORE_NAME);
        let mut rest = line.trim_start();
        while fields.len() < FIELDS_BEFORE_NAME {
            let Some(end) = rest.find(char::is_whitespace) else {
                return Err(malformed(line, "too few fields"));
            };
            fields.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }

        if rest.is_empty() {
            return Err(malformed(line, "missing name"));
        }

        let permissions = fields[0].to_string();
        let size = fields[4]
            .parse::<u64>()
            .map_err(|_| malformed(line, "size column is not a number"))?;
        let kind = EntryKind::from_permissions(&permissions);

        let (name, link_target) = match (kind, rest.split_once(" -> ")) {
            (EntryKind::Symlink, Some((name, target))) => {
                (name.to_string(), Some(target.to_string()))
            }
            _ => (rest.to_string(), None),
        };

        Ok(Self {
            permissions,
            size,
            name,
            kind,
            link_target,
        })
    }

    /// `.` and `..` entries some servers include
    pub fn is_special(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

fn malformed(line: &str, reason: &str) -> FtpError {
    FtpError::MalformedListing {
        line: line.to_string(),
        reason: reason.into(),
    }
}

/// Join a remote directory and an entry name with exactly one slash
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

//! Error types for ftp-inventory
//!
//! This module defines the error hierarchy covering:
//! - FTP connection, protocol and transfer errors
//! - Inventory persistence (CSV / JSON) errors
//! - Configuration and credential errors
//!
//! FTP errors carry a transient/permanent split: transient errors drive the
//! reconnect-and-retry policy, permanent ones end the current file or
//! directory without retrying.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the ftp-inventory application
#[derive(Error, Debug)]
pub enum InventoryError {
    /// FTP-related errors
    #[error("FTP error: {0}")]
    Ftp(#[from] FtpError),

    /// Inventory persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (output files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// FTP connection, protocol and transfer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FtpError {
    /// TCP connect to the control port failed
    #[error("Failed to connect to FTP server '{server}': {reason}")]
    ConnectionFailed { server: String, reason: String },

    /// Login rejected
    #[error("Authentication failed for '{user}' on '{server}': {reason}")]
    AuthenticationFailed {
        server: String,
        user: String,
        reason: String,
    },

    /// No usable session (never connected, or torn down)
    #[error("Not connected")]
    NotConnected,

    /// Read or write on the control/data socket timed out
    #[error("Timed out while accessing '{path}'")]
    Timeout { path: String },

    /// Connection reset, closed or aborted by the peer
    #[error("Connection lost while accessing '{path}': {reason}")]
    ConnectionReset { path: String, reason: String },

    /// Download returned fewer bytes than the listing advertised
    #[error("Truncated read of '{path}': expected {expected} bytes, received {received}")]
    TruncatedRead {
        path: String,
        expected: u64,
        received: u64,
    },

    /// 4xx reply: the server asks us to try again later
    #[error("Transient reply {code} for '{path}': {message}")]
    TransientReply {
        path: String,
        code: u32,
        message: String,
    },

    /// 550-class reply: no access to the path, or it does not exist
    #[error("Permission denied: '{path}': {reason}")]
    PermissionDenied { path: String, reason: String },

    /// Any other 5xx reply
    #[error("FTP reply {code} for '{path}': {message}")]
    Protocol {
        path: String,
        code: u32,
        message: String,
    },

    /// A reply we could not interpret at all
    #[error("Unexpected response for '{path}': {reason}")]
    Unexpected { path: String, reason: String },

    /// A LIST line that does not have the Unix long-format shape
    #[error("Malformed listing line '{line}': {reason}")]
    MalformedListing { line: String, reason: String },
}

impl FtpError {
    /// Check if this error is worth retrying after a reconnect
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FtpError::ConnectionFailed { .. }
                | FtpError::NotConnected
                | FtpError::Timeout { .. }
                | FtpError::ConnectionReset { .. }
                | FtpError::TruncatedRead { .. }
                | FtpError::TransientReply { .. }
        )
    }

    /// Check if the session is likely dead and must be re-established
    pub fn should_reconnect(&self) -> bool {
        matches!(
            self,
            FtpError::ConnectionFailed { .. }
                | FtpError::NotConnected
                | FtpError::Timeout { .. }
                | FtpError::ConnectionReset { .. }
                | FtpError::TruncatedRead { .. }
        )
    }
}

/// Inventory persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// File could not be opened, read or written
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp that is not RFC 3339
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// A size that is not a non-negative integer
    #[error("Invalid size '{value}' for '{path}'")]
    InvalidSize { path: String, value: String },

    /// Two descriptors with the same path in one inventory
    #[error("Duplicate path in inventory: '{path}'")]
    DuplicatePath { path: String },

    /// Source contained nothing to parse
    #[error("Inventory source '{path}' is empty")]
    Empty { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Credential missing from args/environment and no prompt available
    #[error("Missing {name}: set {env} or pass it on the command line")]
    MissingCredential { name: &'static str, env: &'static str },

    /// Interactive prompt failed
    #[error("Failed to read {name} from terminal: {reason}")]
    Prompt { name: &'static str, reason: String },

    /// Invalid attempt bound
    #[error("Invalid attempt count {count}: must be between 1 and {max}")]
    InvalidAttempts { count: u32, max: u32 },

    /// Invalid chunk size
    #[error("Invalid chunk size {size}: must be between {min} and {max}")]
    InvalidChunkSize { size: usize, min: usize, max: usize },

    /// Remote start path must be absolute
    #[error("Invalid start path '{path}': must begin with '/'")]
    InvalidStartPath { path: String },

    /// Base URL did not look like a URL
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Input inventory missing
    #[error("Cannot read inventory '{path}': {reason}")]
    InvalidInventory { path: PathBuf, reason: String },
}

/// Result type alias for InventoryError
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Result type alias for FtpError
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Represents the outcome of walking a single directory
#[derive(Debug)]
pub enum DirOutcome {
    /// Listed and processed
    Listed {
        path: String,
        files: usize,
        subdirs: usize,
    },

    /// Could not be entered or listed; siblings continue
    Skipped { path: String, error: FtpError },
}

impl DirOutcome {
    /// Returns true if the directory was listed
    pub fn is_listed(&self) -> bool {
        matches!(self, DirOutcome::Listed { .. })
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            DirOutcome::Listed { path, .. } => path,
            DirOutcome::Skipped { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = FtpError::Timeout {
            path: "/a.png".into(),
        };
        assert!(timeout.is_transient());
        assert!(timeout.should_reconnect());

        let busy = FtpError::TransientReply {
            path: "/a.png".into(),
            code: 421,
            message: "Too many connections".into(),
        };
        assert!(busy.is_transient());
        assert!(!busy.should_reconnect());

        let denied = FtpError::PermissionDenied {
            path: "/private".into(),
            reason: "550 Permission denied".into(),
        };
        assert!(!denied.is_transient());

        let auth = FtpError::AuthenticationFailed {
            server: "ftp.example.com".into(),
            user: "web".into(),
            reason: "530 Login incorrect".into(),
        };
        assert!(!auth.is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let ftp_err = FtpError::NotConnected;
        let err: InventoryError = ftp_err.into();
        assert!(matches!(err, InventoryError::Ftp(_)));

        let store_err = StoreError::DuplicatePath { path: "/x".into() };
        let err: InventoryError = store_err.into();
        assert!(matches!(err, InventoryError::Store(_)));
    }

    #[test]
    fn test_dir_outcome_path() {
        let skipped = DirOutcome::Skipped {
            path: "/locked".into(),
            error: FtpError::NotConnected,
        };
        assert!(!skipped.is_listed());
        assert_eq!(skipped.path(), "/locked");
    }
}

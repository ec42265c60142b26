//! ftp-inventory - Resilient FTP Media Inventory and Redirect Generator
//!
//! Builds an inventory of every file under a directory on a remote FTP
//! server, each tagged with an MD5 content digest, over connections that
//! are expected to time out and drop. Two inventories taken before and
//! after a reorganization are then reconciled by digest to find files
//! that moved, and the moves are emitted as URL mappings and redirect
//! rules.
//!
//! # Features
//!
//! - **Resilient Hashing**: `NOOP` liveness probes, bounded retries with
//!   reconnect, and a scheduled reconnect every N files. A file that
//!   cannot be hashed is recorded as `Unhashed` instead of aborting the run.
//!
//! - **Checkpoint & Resume**: the growing inventory is saved periodically;
//!   a later scan reuses digests for files whose path and size are
//!   unchanged, and `rehash` retries only the files that failed.
//!
//! - **CSV and JSON Inventories**: either format loads transparently,
//!   detected from content rather than file extension.
//!
//! - **Redirects**: Apache `RewriteRule` and Nginx `location` output.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │        FTP Server        │
//! └────────────┬─────────────┘
//!              │ CWD / LIST / RETR / NOOP
//!              ▼
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │       TreeWalker         │ ───► │        HashPass          │
//! │  depth-first listing     │      │  probe → download → MD5  │
//! │  → FileDescriptors       │      │  retry / reconnect       │
//! └──────────────────────────┘      └────────────┬─────────────┘
//!                                                │ checkpoints
//!                                                ▼
//!                                   ┌──────────────────────────┐
//!                                   │   Inventory (CSV/JSON)   │
//!                                   └────────────┬─────────────┘
//!                                                │ before + after
//!                                                ▼
//!                                   ┌──────────────────────────┐
//!                                   │       Reconciler         │
//!                                   │  moved / unchanged /     │
//!                                   │  new / deleted           │
//!                                   └────────────┬─────────────┘
//!                                                ▼
//!                                   url_mappings.{csv,json}
//!                                   redirects.{htaccess,nginx.conf}
//! ```
//!
//! # Example
//!
//! ```bash
//! # Inventory a tree (credentials from FTP_HOST / FTP_USER / FTP_PASS)
//! ftp-inventory scan --start /uploaded-files/cropped-images
//!
//! # Retry only the files that could not be hashed
//! ftp-inventory rehash ftp_inventory_20240501_120000.json
//!
//! # Compare two inventories and write redirects
//! ftp-inventory reconcile before.json after.json --base-url https://example.com
//! ```

pub mod config;
pub mod error;
pub mod ftp;
pub mod hasher;
pub mod inventory;
pub mod progress;
pub mod reconcile;
pub mod redirect;
pub mod walker;

pub use config::{HashConfig, RemoteConfig};
pub use error::{InventoryError, Result};
pub use ftp::{FtpConnection, FtpConnectionBuilder, RemoteSession};
pub use hasher::{HashPass, HashSummary};
pub use inventory::{ContentHash, FileDescriptor, Inventory, InventoryFormat};
pub use reconcile::{reconcile, MoveEvent, MoveStatus, ReconcileSummary};
pub use redirect::{Dialect, EmitOutcome};
pub use walker::{TreeWalker, WalkStats};

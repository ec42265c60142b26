//! FTP session layer
//!
//! - `connection`: the `RemoteSession` trait and the live `FtpConnection`
//! - `types`: `LIST` line parsing and remote path joining
//! - `fake`: scripted in-memory session, a testing aid

pub mod connection;
/// Testing aid: an in-memory server stand-in, never used by the binary
pub mod fake;
pub mod types;

pub use connection::{FtpConnection, FtpConnectionBuilder, RemoteSession};
pub use fake::FakeSession;
pub use types::{join_remote, EntryKind, ListingEntry};

//! Per-file retry state machine
//!
//! ```text
//! Probing ──► Downloading ──► Done
//!    ▲             │
//!    │             ├── transient ──► Retrying ──► Probing   (attempts left)
//!    │             │                    └───────► Failed    (bound hit)
//!    │             └── permanent ──────────────► Failed
//!    └── NOOP fails: reconnect; if that fails too ──► Retrying
//! ```
//!
//! `max_attempts` counts every download attempt including the one that
//! succeeds. A failure here never escapes the file: the outcome carries
//! `Unhashed(Failed)` and the last error instead.

use super::digest::md5_reader;
use crate::config::HashConfig;
use crate::error::{FtpError, FtpResult};
use crate::ftp::RemoteSession;
use crate::inventory::{ContentHash, FileDescriptor, UnhashedReason};
use std::io::Cursor;
use tracing::{debug, warn};

/// Where a single file is in its attempt cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Checking the session with `NOOP`
    Probing,
    /// `RETR` in progress
    Downloading,
    /// Last attempt failed transiently
    Retrying(FtpError),
    /// Gave up
    Failed(FtpError),
    /// Digest computed
    Done(String),
}

/// Result of hashing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub hash: ContentHash,
    /// Download attempts made (1 on first-try success)
    pub attempts: u32,
    /// Reconnects performed while hashing this file
    pub reconnects: u32,
    /// Last error, when the file ended up unhashed
    pub error: Option<FtpError>,
}

impl FileOutcome {
    pub fn is_hashed(&self) -> bool {
        self.hash.is_digest()
    }
}

/// Hash one file, retrying transient failures up to `config.max_attempts`
pub fn hash_file<S: RemoteSession + ?Sized>(
    session: &mut S,
    file: &FileDescriptor,
    config: &HashConfig,
) -> FileOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;
    let mut reconnects = 0u32;
    let mut state = AttemptState::Probing;

    loop {
        state = match state {
            AttemptState::Probing => match session.noop() {
                Ok(()) => AttemptState::Downloading,
                Err(e) => {
                    debug!("Probe before {} failed ({}), reconnecting", file.path, e);
                    reconnects += 1;
                    match session.reconnect() {
                        Ok(()) => AttemptState::Downloading,
                        Err(re) => AttemptState::Retrying(re),
                    }
                }
            },

            AttemptState::Downloading => match download(session, file, config.chunk_size) {
                Ok(hex) => AttemptState::Done(hex),
                Err(e) if e.is_transient() => AttemptState::Retrying(e),
                Err(e) => AttemptState::Failed(e),
            },

            AttemptState::Retrying(error) => {
                if attempt >= max_attempts {
                    AttemptState::Failed(error)
                } else {
                    warn!(
                        "Retry {}/{} for {}: {}",
                        attempt, max_attempts, file.path, error
                    );
                    attempt += 1;
                    if !config.retry_delay.is_zero() {
                        std::thread::sleep(config.retry_delay);
                    }
                    if error.should_reconnect() {
                        reconnects += 1;
                        if let Err(e) = session.reconnect() {
                            // The probe of the next attempt sees the dead session
                            debug!("Reconnect before retry of {} failed: {}", file.path, e);
                        }
                    }
                    AttemptState::Probing
                }
            }

            AttemptState::Done(hex) => {
                debug!(path = %file.path, attempts = attempt, "Hashed");
                return FileOutcome {
                    hash: ContentHash::digest(hex),
                    attempts: attempt,
                    reconnects,
                    error: None,
                };
            }

            AttemptState::Failed(error) => {
                warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    file.path, attempt, error
                );
                return FileOutcome {
                    hash: ContentHash::Unhashed(UnhashedReason::Failed),
                    attempts: attempt,
                    reconnects,
                    error: Some(error),
                };
            }
        };
    }
}

/// `RETR` the whole file and digest it
fn download<S: RemoteSession + ?Sized>(
    session: &mut S,
    file: &FileDescriptor,
    chunk_size: usize,
) -> FtpResult<String> {
    let bytes = session.retrieve(&file.path)?;

    let (hex, received) =
        md5_reader(Cursor::new(&bytes), chunk_size).map_err(|e| FtpError::Unexpected {
            path: file.path.clone(),
            reason: e.to_string(),
        })?;

    if received < file.size {
        return Err(FtpError::TruncatedRead {
            path: file.path.clone(),
            expected: file.size,
            received,
        });
    }

    Ok(hex)
}

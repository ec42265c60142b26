//! Sequential hash pass over a list of descriptors
//!
//! Every descriptor appears exactly once in the resulting inventory. For
//! each one, in order:
//!
//! 1. already carries a digest → kept as is
//! 2. resume inventory has a digest for the same path and size → carried over
//! 3. otherwise → downloaded and hashed through `hash_file`
//!
//! Downloads are numbered from 1; before download `i` with
//! `i % reconnect_interval == 0` the session is recycled regardless of its
//! state. The growing inventory is checkpointed every `checkpoint_interval`
//! downloads and when a shutdown is requested.

use super::resilient::hash_file;
use crate::config::HashConfig;
use crate::error::Result;
use crate::ftp::RemoteSession;
use crate::inventory::{self, ContentHash, FileDescriptor, Inventory, InventoryFormat};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Totals for one hash pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSummary {
    /// Descriptors in the output
    pub total: u64,
    /// Digests computed in this pass
    pub hashed: u64,
    /// Digests reused from the resume inventory
    pub carried_over: u64,
    /// Descriptors that already had a digest on input
    pub already_hashed: u64,
    /// Files left `Unhashed(Failed)`
    pub errored: u64,
    /// Download attempts across all files
    pub attempts: u64,
    pub scheduled_reconnects: u64,
    /// Reconnects triggered by probes and retries
    pub recovery_reconnects: u64,
    pub checkpoints: u64,
    pub completed: bool,
    pub duration: Duration,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct HashProgress {
    /// 1-based position in the input
    pub position: u64,
    pub total: u64,
    pub hashed: u64,
    pub errored: u64,
    pub carried_over: u64,
    pub current: String,
    pub elapsed: Duration,
}

/// Inventory plus the summary of how it was produced
#[derive(Debug)]
pub struct HashRun {
    pub inventory: Inventory,
    pub summary: HashSummary,
}

type ProgressFn<'a> = Box<dyn FnMut(&HashProgress) + 'a>;

/// A configured hash pass over a borrowed session
pub struct HashPass<'a, S: RemoteSession + ?Sized> {
    session: &'a mut S,
    config: HashConfig,
    generated_at: DateTime<Utc>,
    shutdown: Arc<AtomicBool>,
    checkpoint: Option<PathBuf>,
    carry_over: HashMap<String, (u64, String)>,
    on_progress: Option<ProgressFn<'a>>,
}

impl<'a, S: RemoteSession + ?Sized> HashPass<'a, S> {
    pub fn new(session: &'a mut S, config: HashConfig) -> Self {
        Self {
            session,
            config,
            generated_at: Utc::now(),
            shutdown: Arc::new(AtomicBool::new(false)),
            checkpoint: None,
            carry_over: HashMap::new(),
            on_progress: None,
        }
    }

    /// Stop before the next file once this flag is set
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Save JSON checkpoints to `path`
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }

    /// `generated_at` of the produced inventory
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = at;
        self
    }

    /// Reuse digests from an earlier inventory for unchanged files
    pub fn resume_from(mut self, previous: &Inventory) -> Self {
        self.carry_over = previous
            .files()
            .iter()
            .filter_map(|f| {
                f.hash
                    .as_digest()
                    .map(|hex| (f.path.clone(), (f.size, hex.to_string())))
            })
            .collect();
        debug!("{} digests available for carry-over", self.carry_over.len());
        self
    }

    /// Called after every descriptor
    pub fn on_progress(mut self, callback: impl FnMut(&HashProgress) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Hash `files` and freeze the result into an inventory
    ///
    /// An interrupted pass still returns the partial inventory, with
    /// `summary.completed == false` and the unprocessed remainder left
    /// `NotAttempted`.
    pub fn run(mut self, mut files: Vec<FileDescriptor>) -> Result<HashRun> {
        let started = Instant::now();
        let mut summary = HashSummary {
            total: files.len() as u64,
            ..HashSummary::default()
        };
        let mut downloads = 0usize;

        info!(
            files = files.len(),
            reconnect_interval = self.config.reconnect_interval,
            "Hashing files on {}",
            self.session.endpoint()
        );

        let mut interrupted = false;
        for position in 0..files.len() {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping before file {}", position + 1);
                interrupted = true;
                break;
            }

            let file = &mut files[position];

            if file.hash.is_digest() {
                summary.already_hashed += 1;
            } else if let Some(hex) = carried_digest(&self.carry_over, file) {
                debug!("Carried over digest for {}", file.path);
                file.hash = ContentHash::digest(hex);
                summary.carried_over += 1;
            } else {
                downloads += 1;
                if self.config.reconnect_interval > 0
                    && downloads % self.config.reconnect_interval == 0
                {
                    debug!("Scheduled reconnect before download {}", downloads);
                    summary.scheduled_reconnects += 1;
                    if let Err(e) = self.session.reconnect() {
                        warn!("Scheduled reconnect failed: {}", e);
                    }
                }

                let outcome = hash_file(&mut *self.session, file, &self.config);
                summary.attempts += u64::from(outcome.attempts);
                summary.recovery_reconnects += u64::from(outcome.reconnects);
                if outcome.is_hashed() {
                    summary.hashed += 1;
                } else {
                    summary.errored += 1;
                }
                file.hash = outcome.hash;
                file.timestamp = Utc::now();

                if self.config.checkpoint_interval > 0
                    && downloads % self.config.checkpoint_interval == 0
                {
                    self.save_checkpoint(&files, &mut summary);
                }
            }

            self.report(position, &files, &summary, started);
        }

        if interrupted {
            self.save_checkpoint(&files, &mut summary);
        }

        summary.completed = !interrupted;
        summary.duration = started.elapsed();
        let inventory = Inventory::new(self.generated_at, files)?;

        info!(
            hashed = summary.hashed,
            carried_over = summary.carried_over,
            errored = summary.errored,
            "Hash pass {}",
            if summary.completed { "complete" } else { "interrupted" }
        );

        Ok(HashRun { inventory, summary })
    }

    fn save_checkpoint(&self, files: &[FileDescriptor], summary: &mut HashSummary) {
        let Some(path) = &self.checkpoint else {
            return;
        };

        let result = Inventory::new(self.generated_at, files.to_vec())
            .and_then(|snapshot| inventory::save(&snapshot, path, InventoryFormat::Json));

        match result {
            Ok(()) => {
                summary.checkpoints += 1;
                debug!("Checkpoint written to {}", path.display());
            }
            // A missed checkpoint only costs re-downloads on resume
            Err(e) => warn!("Failed to write checkpoint {}: {}", path.display(), e),
        }
    }

    fn report(
        &mut self,
        position: usize,
        files: &[FileDescriptor],
        summary: &HashSummary,
        started: Instant,
    ) {
        if let Some(callback) = self.on_progress.as_mut() {
            let progress = HashProgress {
                position: position as u64 + 1,
                total: summary.total,
                hashed: summary.hashed,
                errored: summary.errored,
                carried_over: summary.carried_over,
                current: files[position].path.clone(),
                elapsed: started.elapsed(),
            };
            callback(&progress);
        }
    }
}

fn carried_digest<'c>(
    carry_over: &'c HashMap<String, (u64, String)>,
    file: &FileDescriptor,
) -> Option<&'c str> {
    carry_over
        .get(&file.path)
        .filter(|(size, _)| *size == file.size)
        .map(|(_, hex)| hex.as_str())
}

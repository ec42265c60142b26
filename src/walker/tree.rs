//! Depth-first remote tree walker
//!
//! For every directory: `CWD` to its absolute path, `LIST`, parse each line,
//! recurse into subdirectories, then `CDUP` back so that sibling recursion
//! starts from the same working directory.
//!
//! ```text
//! visit(/)
//! ├── CWD /        LIST → a.png, img/
//! ├── visit(/img)
//! │   ├── CWD /img LIST → b.png
//! │   └── CDUP     → /
//! └── CDUP
//! ```
//!
//! A directory that cannot be entered or listed is skipped with a warning.
//! Transient failures get one reconnect and one retry of that directory.

use crate::error::{DirOutcome, FtpError, FtpResult, InventoryError, Result};
use crate::ftp::{join_remote, EntryKind, ListingEntry, RemoteSession};
use crate::inventory::FileDescriptor;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result from walk operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub dirs_visited: u64,
    pub dirs_skipped: u64,
    pub files: u64,
    pub bytes: u64,
    pub malformed_lines: u64,
    pub reconnects: u64,
    pub duration: Duration,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub dirs: u64,
    pub skipped: u64,
    pub files: u64,
    pub bytes: u64,
    pub current: String,
    pub elapsed: Duration,
}

impl WalkProgress {
    pub fn dirs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.dirs as f64 / secs
        } else {
            0.0
        }
    }
}

/// Everything a walk produced
#[derive(Debug)]
pub struct WalkOutput {
    /// Descriptors in depth-first listing order, hashes not yet computed
    pub files: Vec<FileDescriptor>,
    pub stats: WalkStats,
    /// Directories that were skipped, with the error that caused it
    pub skipped: Vec<DirOutcome>,
}

type ProgressFn<'a> = Box<dyn FnMut(&WalkProgress) + 'a>;

/// Sequential walker over a borrowed session
pub struct TreeWalker<'a, S: RemoteSession + ?Sized> {
    session: &'a mut S,
    shutdown: Arc<AtomicBool>,
    on_progress: Option<ProgressFn<'a>>,
    stats: WalkStats,
    skipped: Vec<DirOutcome>,
    seen: HashSet<String>,
    started: Instant,
}

impl<'a, S: RemoteSession + ?Sized> TreeWalker<'a, S> {
    pub fn new(session: &'a mut S) -> Self {
        Self {
            session,
            shutdown: Arc::new(AtomicBool::new(false)),
            on_progress: None,
            stats: WalkStats::default(),
            skipped: Vec::new(),
            seen: HashSet::new(),
            started: Instant::now(),
        }
    }

    /// Stop between directories once this flag is set
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Called after every listed directory
    pub fn on_progress(mut self, callback: impl FnMut(&WalkProgress) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Walk everything beneath `start`
    ///
    /// Fails only if `start` itself cannot be listed or the walk is
    /// interrupted; failures below it are recorded as skipped directories.
    pub fn walk(mut self, start: &str) -> Result<WalkOutput> {
        self.started = Instant::now();
        info!("Walking {} from {}", self.session.endpoint(), start);

        let mut files = Vec::new();
        let root_lines = self.enter_and_list(start)?;
        self.process(start, root_lines, &mut files)?;

        self.stats.duration = self.started.elapsed();
        info!(
            dirs = self.stats.dirs_visited,
            skipped = self.stats.dirs_skipped,
            files = self.stats.files,
            "Walk complete"
        );

        Ok(WalkOutput {
            files,
            stats: self.stats,
            skipped: self.skipped,
        })
    }

    fn visit(&mut self, path: &str, files: &mut Vec<FileDescriptor>) -> Result<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(InventoryError::Interrupted);
        }

        match self.enter_and_list(path) {
            Ok(lines) => self.process(path, lines, files),
            Err(error) => {
                warn!("Skipping directory {}: {}", path, error);
                self.stats.dirs_skipped += 1;
                self.skipped.push(DirOutcome::Skipped {
                    path: path.to_string(),
                    error,
                });
                Ok(())
            }
        }
    }

    /// Record one listed directory, recurse into its children, then `CDUP`
    fn process(
        &mut self,
        path: &str,
        lines: Vec<String>,
        files: &mut Vec<FileDescriptor>,
    ) -> Result<()> {
        self.stats.dirs_visited += 1;
        let listed_at = Utc::now();
        let mut subdirs = Vec::new();
        let mut file_count = 0usize;

        for line in &lines {
            let entry = match ListingEntry::parse(line) {
                Ok(entry) => entry,
                Err(e) => {
                    // "total N" headers land here too
                    debug!("{}: {}", path, e);
                    if !line.trim_start().starts_with("total ") {
                        warn!("Malformed listing line in {}: {:?}", path, line);
                        self.stats.malformed_lines += 1;
                    }
                    continue;
                }
            };

            if entry.is_special() {
                continue;
            }

            let full_path = join_remote(path, &entry.name);
            match entry.kind {
                EntryKind::Directory => subdirs.push(full_path),
                EntryKind::File | EntryKind::Symlink | EntryKind::Other => {
                    if !self.seen.insert(full_path.clone()) {
                        warn!("Duplicate listing entry {}", full_path);
                        continue;
                    }
                    self.stats.files += 1;
                    self.stats.bytes += entry.size;
                    file_count += 1;
                    files.push(FileDescriptor::new(
                        full_path,
                        entry.name,
                        entry.size,
                        entry.permissions,
                        listed_at,
                    ));
                }
            }
        }

        let outcome = DirOutcome::Listed {
            path: path.to_string(),
            files: file_count,
            subdirs: subdirs.len(),
        };
        debug!(?outcome, "Directory listed");
        self.report(path);

        for subdir in &subdirs {
            self.visit(subdir, files)?;
        }

        self.return_to_parent(path);
        Ok(())
    }

    /// `CWD` + `LIST`, with one reconnect-and-retry on transient failure
    fn enter_and_list(&mut self, path: &str) -> FtpResult<Vec<String>> {
        match self.try_list(path) {
            Ok(lines) => Ok(lines),
            Err(e) if e.is_transient() => {
                warn!("Listing {} failed ({}), reconnecting", path, e);
                self.session.reconnect()?;
                self.stats.reconnects += 1;
                self.try_list(path)
            }
            Err(e) => Err(e),
        }
    }

    /// On a failed `LIST` the working directory goes back to the parent
    fn try_list(&mut self, path: &str) -> FtpResult<Vec<String>> {
        self.session.cwd(path)?;
        match self.session.list() {
            Ok(lines) => Ok(lines),
            Err(e) => {
                self.return_to_parent(path);
                Err(e)
            }
        }
    }

    fn return_to_parent(&mut self, path: &str) {
        if path == "/" {
            return;
        }
        if let Err(e) = self.session.cdup() {
            // Every directory is entered by absolute path, so a lost CDUP only
            // matters if the session itself is gone
            warn!("CDUP from {} failed: {}", path, e);
            if e.should_reconnect() {
                self.recover_session(&e);
            }
        }
    }

    fn recover_session(&mut self, cause: &FtpError) {
        match self.session.reconnect() {
            Ok(()) => self.stats.reconnects += 1,
            Err(e) => warn!("Reconnect after '{}' failed: {}", cause, e),
        }
    }

    fn report(&mut self, current: &str) {
        if let Some(callback) = self.on_progress.as_mut() {
            let progress = WalkProgress {
                dirs: self.stats.dirs_visited,
                skipped: self.stats.dirs_skipped,
                files: self.stats.files,
                bytes: self.stats.bytes,
                current: current.to_string(),
                elapsed: self.started.elapsed(),
            };
            callback(&progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::FakeSession;

    fn paths(output: &WalkOutput) -> Vec<&str> {
        output.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_walks_depth_first() {
        let mut fake = FakeSession::new();
        fake.add_file("/a.png", b"aaaa")
            .add_file("/img/b.png", b"bb")
            .add_file("/img/deep/c d.png", b"c")
            .add_file("/z.png", b"");

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(
            paths(&output),
            vec!["/a.png", "/z.png", "/img/b.png", "/img/deep/c d.png"]
        );
        assert_eq!(output.stats.dirs_visited, 3);
        assert_eq!(output.stats.files, 4);
        assert_eq!(output.stats.bytes, 7);
        assert_eq!(fake.cwd_path(), "/");
    }

    #[test]
    fn test_permission_denied_directory_skipped() {
        let mut fake = FakeSession::new();
        fake.add_file("/open/a.png", b"a")
            .add_file("/locked/b.png", b"b")
            .deny("/locked");

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/open/a.png"]);
        assert_eq!(output.stats.dirs_skipped, 1);
        assert_eq!(output.skipped[0].path(), "/locked");
        assert_eq!(fake.reconnects(), 0);
    }

    #[test]
    fn test_transient_listing_retried_once() {
        let mut fake = FakeSession::new();
        fake.add_file("/img/a.png", b"a").fail_list(
            "/img",
            FtpError::Timeout {
                path: "/img".into(),
            },
        );

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/img/a.png"]);
        assert_eq!(output.stats.reconnects, 1);
        assert_eq!(output.stats.dirs_skipped, 0);
    }

    #[test]
    fn test_transient_listing_skipped_after_retry() {
        let mut fake = FakeSession::new();
        let timeout = FtpError::Timeout {
            path: "/img".into(),
        };
        fake.add_file("/img/a.png", b"a")
            .add_file("/b.png", b"b")
            .fail_list("/img", timeout.clone())
            .fail_list("/img", timeout);

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/b.png"]);
        assert_eq!(output.stats.dirs_skipped, 1);
    }

    #[test]
    fn test_cwd_restored_when_listing_fails() {
        let mut fake = FakeSession::new();
        fake.add_file("/a/locked/x.png", b"x")
            .add_file("/a/ok.png", b"ok")
            .add_file("/b.png", b"b")
            .fail_list(
                "/a/locked",
                FtpError::PermissionDenied {
                    path: "/a/locked".into(),
                    reason: "550 Permission denied".into(),
                },
            );

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/b.png", "/a/ok.png"]);
        assert_eq!(output.stats.dirs_skipped, 1);
        assert_eq!(fake.cwd_path(), "/");
    }

    #[test]
    fn test_cwd_restored_after_failed_retry() {
        let mut fake = FakeSession::new();
        let timeout = FtpError::Timeout {
            path: "/a/slow".into(),
        };
        fake.add_file("/a/slow/x.png", b"x")
            .add_file("/a/ok.png", b"ok")
            .fail_list("/a/slow", timeout.clone())
            .fail_list("/a/slow", timeout);

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/a/ok.png"]);
        assert_eq!(fake.cwd_path(), "/");
    }

    #[test]
    fn test_malformed_lines_and_symlinks() {
        let mut fake = FakeSession::new();
        fake.add_file("/a.png", b"a")
            .add_raw_line("/", "total 12")
            .add_raw_line("/", "garbage line")
            .add_raw_line("/", "lrwxrwxrwx 1 web web 5 Mar 01 10:15 latest.png -> a.png");

        let output = TreeWalker::new(&mut fake).walk("/").unwrap();

        assert_eq!(paths(&output), vec!["/a.png", "/latest.png"]);
        assert_eq!(output.stats.malformed_lines, 1);
    }

    #[test]
    fn test_unlistable_root_is_an_error() {
        let mut fake = FakeSession::new();
        fake.deny("/");
        assert!(TreeWalker::new(&mut fake).walk("/").is_err());
    }

    #[test]
    fn test_shutdown_interrupts() {
        let mut fake = FakeSession::new();
        fake.add_file("/img/a.png", b"a");
        let flag = Arc::new(AtomicBool::new(true));

        let result = TreeWalker::new(&mut fake).with_shutdown(flag).walk("/");
        assert!(matches!(result, Err(InventoryError::Interrupted)));
    }

    #[test]
    fn test_progress_callback() {
        let mut fake = FakeSession::new();
        fake.add_file("/img/a.png", b"a");
        let mut seen = Vec::new();

        TreeWalker::new(&mut fake)
            .on_progress(|p| seen.push(p.current.clone()))
            .walk("/")
            .unwrap();

        assert_eq!(seen, vec!["/".to_string(), "/img".to_string()]);
    }
}

//! Scripted in-memory session
//!
//! Serves a directory tree and file contents from memory and lets callers
//! queue failures per operation, so the walker and hasher can be exercised
//! without a server. Failures are consumed in FIFO order, one per call.
//!
//! This is a testing aid for the unit tests and `tests/`. Nothing
//! in the binary constructs it; production sessions are `FtpConnection`.

use super::connection::RemoteSession;
use super::types::join_remote;
use crate::error::{FtpError, FtpResult};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// In-memory `RemoteSession` for tests
#[derive(Debug)]
pub struct FakeSession {
    dirs: BTreeMap<String, Vec<String>>,
    files: HashMap<String, Vec<u8>>,
    denied: HashSet<String>,
    retrieve_failures: HashMap<String, VecDeque<FtpError>>,
    short_reads: HashMap<String, VecDeque<usize>>,
    list_failures: HashMap<String, VecDeque<FtpError>>,
    noop_failures: VecDeque<FtpError>,
    reconnect_failures: VecDeque<FtpError>,
    cwd: String,
    connected: bool,
    reconnects: usize,
    disconnects: usize,
    noops: usize,
    retrievals: HashMap<String, usize>,
    listed: Vec<String>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    /// Empty tree, connected, working directory `/`
    pub fn new() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert("/".to_string(), special_lines());
        Self {
            dirs,
            files: HashMap::new(),
            denied: HashSet::new(),
            retrieve_failures: HashMap::new(),
            short_reads: HashMap::new(),
            list_failures: HashMap::new(),
            noop_failures: VecDeque::new(),
            reconnect_failures: VecDeque::new(),
            cwd: "/".to_string(),
            connected: true,
            reconnects: 0,
            disconnects: 0,
            noops: 0,
            retrievals: HashMap::new(),
            listed: Vec::new(),
        }
    }

    /// Add a directory (and any missing parents)
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.ensure_dir(path);
        self
    }

    /// Add a file (and any missing parent directories)
    pub fn add_file(&mut self, path: &str, contents: &[u8]) -> &mut Self {
        let (parent, name) = split_parent(path);
        self.ensure_dir(&parent);
        let line = listing_line("-rw-r--r--", contents.len() as u64, &name);
        self.dirs.entry(parent).or_default().push(line);
        self.files.insert(path.to_string(), contents.to_vec());
        self
    }

    /// Append an arbitrary raw line to a directory listing
    pub fn add_raw_line(&mut self, dir: &str, line: &str) -> &mut Self {
        self.ensure_dir(dir);
        self.dirs.entry(dir.to_string()).or_default().push(line.to_string());
        self
    }

    /// Make `cwd` into this directory fail with 550
    pub fn deny(&mut self, dir: &str) -> &mut Self {
        self.denied.insert(dir.to_string());
        self
    }

    /// Queue a failure for the next retrieval of `path`
    pub fn fail_retrieve(&mut self, path: &str, error: FtpError) -> &mut Self {
        self.retrieve_failures
            .entry(path.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Serve only the first `len` bytes on the next retrieval of `path`
    pub fn short_read(&mut self, path: &str, len: usize) -> &mut Self {
        self.short_reads
            .entry(path.to_string())
            .or_default()
            .push_back(len);
        self
    }

    /// Queue a failure for the next listing of `dir`
    pub fn fail_list(&mut self, dir: &str, error: FtpError) -> &mut Self {
        self.list_failures
            .entry(dir.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Queue a failure for the next `NOOP`
    pub fn fail_noop(&mut self, error: FtpError) -> &mut Self {
        self.noop_failures.push_back(error);
        self
    }

    /// Queue a failure for the next reconnect
    pub fn fail_reconnect(&mut self, error: FtpError) -> &mut Self {
        self.reconnect_failures.push_back(error);
        self
    }

    /// Simulate the server dropping an idle session
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    pub fn cwd_path(&self) -> &str {
        &self.cwd
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects
    }

    pub fn noops(&self) -> usize {
        self.noops
    }

    /// How many times `path` was downloaded (including failed attempts)
    pub fn retrievals(&self, path: &str) -> usize {
        self.retrievals.get(path).copied().unwrap_or(0)
    }

    /// Directories listed, in order
    pub fn listed_dirs(&self) -> &[String] {
        &self.listed
    }

    fn ensure_dir(&mut self, path: &str) {
        if self.dirs.contains_key(path) {
            return;
        }
        let (parent, name) = split_parent(path);
        self.ensure_dir(&parent);
        let line = listing_line("drwxr-xr-x", 4096, &name);
        self.dirs.entry(parent).or_default().push(line);
        self.dirs.insert(path.to_string(), special_lines());
    }

    fn check_connected(&self) -> FtpResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(FtpError::NotConnected)
        }
    }

    fn resolve(&self, path: &str) -> String {
        if path == ".." {
            split_parent(&self.cwd).0
        } else if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&join_remote(&self.cwd, path))
        }
    }
}

impl RemoteSession for FakeSession {
    fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.check_connected()?;
        let target = self.resolve(path);
        if self.denied.contains(&target) || !self.dirs.contains_key(&target) {
            return Err(FtpError::PermissionDenied {
                path: target,
                reason: "550 Failed to change directory.".into(),
            });
        }
        self.cwd = target;
        Ok(())
    }

    fn cdup(&mut self) -> FtpResult<()> {
        self.cwd("..")
    }

    fn list(&mut self) -> FtpResult<Vec<String>> {
        self.check_connected()?;
        let dir = self.cwd.clone();
        if let Some(err) = self.list_failures.get_mut(&dir).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        self.listed.push(dir.clone());
        Ok(self.dirs.get(&dir).cloned().unwrap_or_default())
    }

    fn retrieve(&mut self, path: &str) -> FtpResult<Vec<u8>> {
        self.check_connected()?;
        *self.retrievals.entry(path.to_string()).or_default() += 1;

        if let Some(err) = self
            .retrieve_failures
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| FtpError::PermissionDenied {
                path: path.to_string(),
                reason: "550 No such file.".into(),
            })?;

        match self.short_reads.get_mut(path).and_then(VecDeque::pop_front) {
            Some(len) => Ok(data[..len.min(data.len())].to_vec()),
            None => Ok(data),
        }
    }

    fn noop(&mut self) -> FtpResult<()> {
        self.noops += 1;
        self.check_connected()?;
        match self.noop_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reconnect(&mut self) -> FtpResult<()> {
        self.reconnects += 1;
        self.connected = false;
        if let Some(err) = self.reconnect_failures.pop_front() {
            return Err(err);
        }
        self.connected = true;
        self.cwd = "/".to_string();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }

    fn endpoint(&self) -> String {
        "fake://memory".to_string()
    }
}

fn special_lines() -> Vec<String> {
    vec![
        listing_line("drwxr-xr-x", 4096, "."),
        listing_line("drwxr-xr-x", 4096, ".."),
    ]
}

fn listing_line(permissions: &str, size: u64, name: &str) -> String {
    format!(
        "{}    1 web      web      {:>10} Mar 01 10:15 {}",
        permissions, size, name
    )
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_parent(path: &str) -> (String, String) {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_building() {
        let mut fake = FakeSession::new();
        fake.add_file("/img/a.png", b"abc");

        fake.cwd("/").unwrap();
        let root = fake.list().unwrap();
        assert!(root.iter().any(|l| l.ends_with(" img") && l.starts_with('d')));

        fake.cwd("/img").unwrap();
        let img = fake.list().unwrap();
        assert!(img.iter().any(|l| l.ends_with(" a.png")));

        fake.cdup().unwrap();
        assert_eq!(fake.cwd_path(), "/");
    }

    #[test]
    fn test_scripted_failures_consumed_in_order() {
        let mut fake = FakeSession::new();
        fake.add_file("/a.png", b"abc")
            .fail_retrieve("/a.png", FtpError::Timeout { path: "/a.png".into() });

        assert!(fake.retrieve("/a.png").is_err());
        assert_eq!(fake.retrieve("/a.png").unwrap(), b"abc");
        assert_eq!(fake.retrievals("/a.png"), 2);
    }

    #[test]
    fn test_dropped_connection_until_reconnect() {
        let mut fake = FakeSession::new();
        fake.drop_connection();
        assert_eq!(fake.noop(), Err(FtpError::NotConnected));
        fake.reconnect().unwrap();
        assert!(fake.noop().is_ok());
    }
}

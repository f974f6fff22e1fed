//! In-process file server
//!
//! Keeps shares, directories and files in memory behind a shared handle, so
//! a test can hand the server to the pipeline as a connector and inspect the
//! result afterwards. Faults can be injected per server.

use crate::{is_special_share, ShareConnector, ShareError, ShareSession, ShareTarget};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemShare {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_connect: bool,
    fail_every_other_write: bool,
    fail_write_under: Vec<(String, String)>,
    fail_delete_of: Vec<(String, String)>,
    fail_rename: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    shares: BTreeMap<String, MemShare>,
    faults: Faults,
    write_calls: u64,
    connected_servers: Vec<String>,
    disconnects: usize,
}

/// Cheaply cloneable handle to an in-memory file server
#[derive(Debug, Clone, Default)]
pub struct MemoryShareServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryShareServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a share. Names ending in `$` are hidden from `list_shares`.
    pub fn add_share(&self, share: &str) -> &Self {
        self.lock().shares.entry(share.to_string()).or_default();
        self
    }

    /// Create a directory and all its parents
    pub fn add_dir(&self, share: &str, dir: &str) -> &Self {
        let mut state = self.lock();
        let entry = state.shares.entry(share.to_string()).or_default();
        let mut current = String::new();
        for segment in normalize(dir).split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            entry.dirs.insert(current.clone());
        }
        self
    }

    pub fn put_file(&self, share: &str, path: &str, data: &[u8]) -> &Self {
        self.lock()
            .shares
            .entry(share.to_string())
            .or_default()
            .files
            .insert(normalize(path), data.to_vec());
        self
    }

    pub fn file(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .shares
            .get(share)
            .and_then(|s| s.files.get(&normalize(path)).cloned())
    }

    /// Every file path in a share
    pub fn files(&self, share: &str) -> Vec<String> {
        self.lock()
            .shares
            .get(share)
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of files across all shares
    pub fn file_count(&self) -> usize {
        self.lock().shares.values().map(|s| s.files.len()).sum()
    }

    pub fn fail_connect(&self) -> &Self {
        self.lock().faults.fail_connect = true;
        self
    }

    /// Fail the 2nd, 4th, ... write call
    pub fn fail_every_other_write(&self) -> &Self {
        self.lock().faults.fail_every_other_write = true;
        self
    }

    /// Fail every write whose path lies under `prefix` in `share`
    pub fn fail_writes_under(&self, share: &str, prefix: &str) -> &Self {
        self.lock()
            .faults
            .fail_write_under
            .push((share.to_string(), normalize(prefix)));
        self
    }

    /// Fail every delete of exactly `path` in `share`
    pub fn fail_deletes_of(&self, share: &str, path: &str) -> &Self {
        self.lock()
            .faults
            .fail_delete_of
            .push((share.to_string(), normalize(path)));
        self
    }

    /// Fail every rename
    pub fn fail_rename(&self) -> &Self {
        self.lock().faults.fail_rename = true;
        self
    }

    pub fn write_calls(&self) -> u64 {
        self.lock().write_calls
    }

    /// Servers a session was opened against, in order
    pub fn connected_servers(&self) -> Vec<String> {
        self.lock().connected_servers.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

#[async_trait]
impl ShareConnector for MemoryShareServer {
    async fn connect(&self, target: &ShareTarget) -> Result<Box<dyn ShareSession>, ShareError> {
        let mut state = self.lock();
        if state.faults.fail_connect {
            return Err(ShareError::Connect {
                server: target.server.clone(),
                message: "connection refused".to_string(),
            });
        }
        state.connected_servers.push(target.server.clone());
        Ok(Box::new(MemorySession {
            server: self.clone(),
            connected: true,
        }))
    }
}

struct MemorySession {
    server: MemoryShareServer,
    connected: bool,
}

impl MemorySession {
    fn state(&self) -> Result<MutexGuard<'_, ServerState>, ShareError> {
        if !self.connected {
            return Err(ShareError::NotConnected);
        }
        Ok(self.server.lock())
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn io(op: &'static str, share: &str, path: &str, message: &str) -> ShareError {
    ShareError::Io {
        op,
        share: share.to_string(),
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ShareSession for MemorySession {
    async fn write(&mut self, share: &str, path: &str, data: &[u8]) -> Result<(), ShareError> {
        let path = normalize(path);
        let mut state = self.state()?;
        state.write_calls += 1;

        let calls = state.write_calls;
        let faults = &state.faults;
        if faults.fail_every_other_write && calls % 2 == 0 {
            return Err(io("write", share, &path, "injected failure"));
        }
        if faults
            .fail_write_under
            .iter()
            .any(|(s, prefix)| s == share && (path == *prefix || path.starts_with(&format!("{}/", prefix))))
        {
            return Err(io("write", share, &path, "access denied"));
        }

        let entry = state
            .shares
            .get_mut(share)
            .ok_or_else(|| io("write", share, &path, "no such share"))?;
        let parent = parent_of(&path);
        if !parent.is_empty() && !entry.dirs.contains(parent) {
            return Err(io("write", share, &path, "parent directory missing"));
        }
        entry.files.insert(path, data.to_vec());
        Ok(())
    }

    async fn delete(&mut self, share: &str, path: &str) -> Result<(), ShareError> {
        let path = normalize(path);
        let mut state = self.state()?;
        if state
            .faults
            .fail_delete_of
            .iter()
            .any(|(s, p)| s == share && *p == path)
        {
            return Err(io("delete", share, &path, "sharing violation"));
        }
        match state.shares.get_mut(share).and_then(|s| s.files.remove(&path)) {
            Some(_) => Ok(()),
            None => Err(ShareError::NotFound {
                share: share.to_string(),
                path,
            }),
        }
    }

    async fn rename(&mut self, share: &str, old_path: &str, new_path: &str) -> Result<(), ShareError> {
        let (old_path, new_path) = (normalize(old_path), normalize(new_path));
        let mut state = self.state()?;
        if state.faults.fail_rename {
            return Err(io("rename", share, &new_path, "injected failure"));
        }
        let entry = state.shares.get_mut(share).ok_or_else(|| ShareError::NotFound {
            share: share.to_string(),
            path: old_path.clone(),
        })?;
        if entry.files.contains_key(&new_path) {
            return Err(io("rename", share, &new_path, "target exists"));
        }
        let data = entry.files.remove(&old_path).ok_or_else(|| ShareError::NotFound {
            share: share.to_string(),
            path: old_path.clone(),
        })?;
        entry.files.insert(new_path, data);
        Ok(())
    }

    async fn directory_exists(&mut self, share: &str, path: &str) -> Result<bool, ShareError> {
        let path = normalize(path);
        let state = self.state()?;
        Ok(match state.shares.get(share) {
            Some(s) => path.is_empty() || s.dirs.contains(&path),
            None => false,
        })
    }

    async fn list_shares(&mut self) -> Result<BTreeSet<String>, ShareError> {
        let state = self.state()?;
        Ok(state
            .shares
            .keys()
            .filter(|name| !is_special_share(name))
            .cloned()
            .collect())
    }

    async fn disconnect(&mut self) -> Result<(), ShareError> {
        if self.connected {
            self.connected = false;
            self.server.lock().disconnects += 1;
        }
        Ok(())
    }
}

//! ipl-share: remote file-share sessions
//!
//! The pipeline never speaks SMB itself. It talks to a [`ShareSession`]
//! obtained from a [`ShareConnector`], one session per data source, and
//! layers [`atomic_write`] on top of the session primitives.
//!
//! # Crash safety
//!
//! ```text
//! write ~ipl-<random>.tmp ──► delete target ──► rename tmp → target
//!            │                                        │
//!            └──────── always: best-effort delete tmp ┘
//! ```
//!
//! A reader of the target path sees either the previous sidecar or the new
//! one, because the visible name is only ever produced by a rename.

pub mod memory;
pub mod mounted;

pub use memory::MemoryShareServer;
pub use mounted::MountedShareConnector;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Step of [`atomic_write`] that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    WriteTemp,
    DeleteTarget,
    Rename,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteStep::WriteTemp => write!(f, "write temp file"),
            WriteStep::DeleteTarget => write!(f, "delete existing file"),
            WriteStep::Rename => write!(f, "rename temp file"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("failed to connect to {server}: {message}")]
    Connect { server: String, message: String },

    #[error("session is not connected")]
    NotConnected,

    #[error("not found: {share}/{path}")]
    NotFound { share: String, path: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("{op} {share}/{path} failed: {message}")]
    Io {
        op: &'static str,
        share: String,
        path: String,
        message: String,
    },

    #[error("{step} failed for {share}/{path}: {source}")]
    Step {
        step: WriteStep,
        share: String,
        path: String,
        #[source]
        source: Box<ShareError>,
    },
}

impl ShareError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShareError::NotFound { .. })
    }

    fn at_step(self, step: WriteStep, share: &str, path: &str) -> Self {
        ShareError::Step {
            step,
            share: share.to_string(),
            path: path.to_string(),
            source: Box::new(self),
        }
    }
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// Where and as whom to connect. `Debug` hides the login.
#[derive(Clone)]
pub struct ShareTarget {
    pub server: String,
    pub domain: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ShareTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ShareTarget")
            .field("server", &self.server)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Opens sessions against a file server
#[async_trait]
pub trait ShareConnector: Send + Sync {
    async fn connect(&self, target: &ShareTarget) -> Result<Box<dyn ShareSession>, ShareError>;
}

/// A connected session. Paths are relative to the share, `/` separated.
#[async_trait]
pub trait ShareSession: Send {
    async fn write(&mut self, share: &str, path: &str, data: &[u8]) -> Result<(), ShareError>;

    /// Fails with [`ShareError::NotFound`] when nothing exists at `path`
    async fn delete(&mut self, share: &str, path: &str) -> Result<(), ShareError>;

    async fn rename(&mut self, share: &str, old_path: &str, new_path: &str) -> Result<(), ShareError>;

    /// `Ok(false)` when the directory (or share) does not exist
    async fn directory_exists(&mut self, share: &str, path: &str) -> Result<bool, ShareError>;

    /// Shares on the server, without administrative/hidden ones
    async fn list_shares(&mut self) -> Result<BTreeSet<String>, ShareError>;

    async fn disconnect(&mut self) -> Result<(), ShareError>;
}

// ============================================================================
// COMPOSITE OPERATIONS
// ============================================================================

/// Join a share-relative directory and a file name
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Random name for a temporary sibling file
pub fn temp_file_name() -> String {
    format!("~ipl-{}.tmp", uuid::Uuid::new_v4().simple())
}

/// Hidden shares (`IPC$`, `C$`, `ADMIN$`, ...) end with `$`
pub fn is_special_share(name: &str) -> bool {
    name.ends_with('$')
}

/// Replace `dir/filename` with `data` so that readers never see a partial
/// file.
pub async fn atomic_write(
    session: &mut dyn ShareSession,
    share: &str,
    dir: &str,
    filename: &str,
    data: &[u8],
) -> Result<(), ShareError> {
    let target = join_path(dir, filename);
    let temp = join_path(dir, &temp_file_name());

    let result = replace_via_temp(session, share, &temp, &target, data).await;

    // gone already after a successful rename
    match session.delete(share, &temp).await {
        Ok(()) => tracing::debug!(share, path = %temp, "removed leftover temp file"),
        Err(e) if e.is_not_found() => {}
        Err(e) => tracing::debug!(share, path = %temp, error = %e, "temp cleanup failed"),
    }

    result
}

async fn replace_via_temp(
    session: &mut dyn ShareSession,
    share: &str,
    temp: &str,
    target: &str,
    data: &[u8],
) -> Result<(), ShareError> {
    session
        .write(share, temp, data)
        .await
        .map_err(|e| e.at_step(WriteStep::WriteTemp, share, temp))?;

    match session.delete(share, target).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.at_step(WriteStep::DeleteTarget, share, target)),
    }

    session
        .rename(share, temp, target)
        .await
        .map_err(|e| e.at_step(WriteStep::Rename, share, target))?;

    tracing::debug!(share, path = %target, bytes = data.len(), "atomic write complete");
    Ok(())
}

//! Shares mounted on the local host
//!
//! Deployments mount each file server's shares (CIFS / `mount.smb3`) under a
//! common root, one directory per server:
//!
//! ```text
//! <root>/<server>/<share>/<path...>
//! ```
//!
//! The mount carries the credentials, so the login in [`ShareTarget`] is
//! not used here.

use crate::{is_special_share, ShareConnector, ShareError, ShareSession, ShareTarget};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MountedShareConnector {
    root: PathBuf,
}

impl MountedShareConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ShareConnector for MountedShareConnector {
    async fn connect(&self, target: &ShareTarget) -> Result<Box<dyn ShareSession>, ShareError> {
        let server = single_segment(&target.server).map_err(|_| ShareError::Connect {
            server: target.server.clone(),
            message: "invalid server name".to_string(),
        })?;
        let server_root = self.root.join(server);

        match tokio::fs::metadata(&server_root).await {
            Ok(md) if md.is_dir() => {}
            Ok(_) => {
                return Err(ShareError::Connect {
                    server: target.server.clone(),
                    message: format!("{} is not a directory", server_root.display()),
                })
            }
            Err(e) => {
                return Err(ShareError::Connect {
                    server: target.server.clone(),
                    message: format!("{}: {}", server_root.display(), e),
                })
            }
        }

        tracing::debug!(server = %target.server, root = %server_root.display(), "mounted share session opened");
        Ok(Box::new(MountedSession {
            server_root,
            connected: true,
        }))
    }
}

struct MountedSession {
    server_root: PathBuf,
    connected: bool,
}

impl MountedSession {
    fn resolve(&self, share: &str, path: &str) -> Result<PathBuf, ShareError> {
        if !self.connected {
            return Err(ShareError::NotConnected);
        }
        let mut full = self.server_root.join(single_segment(share)?);
        for segment in path.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
            full.push(single_segment(segment)?);
        }
        Ok(full)
    }
}

/// A path component that cannot escape its parent
fn single_segment(raw: &str) -> Result<&str, ShareError> {
    let mut components = Path::new(raw).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !raw.contains(['/', '\\']) => Ok(raw),
        _ => Err(ShareError::InvalidPath(raw.to_string())),
    }
}

fn map_io(op: &'static str, share: &str, path: &str, err: io::Error) -> ShareError {
    if err.kind() == io::ErrorKind::NotFound {
        ShareError::NotFound {
            share: share.to_string(),
            path: path.to_string(),
        }
    } else {
        ShareError::Io {
            op,
            share: share.to_string(),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ShareSession for MountedSession {
    async fn write(&mut self, share: &str, path: &str, data: &[u8]) -> Result<(), ShareError> {
        let full = self.resolve(share, path)?;
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| map_io("write", share, path, e))
    }

    async fn delete(&mut self, share: &str, path: &str) -> Result<(), ShareError> {
        let full = self.resolve(share, path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| map_io("delete", share, path, e))
    }

    async fn rename(&mut self, share: &str, old_path: &str, new_path: &str) -> Result<(), ShareError> {
        let from = self.resolve(share, old_path)?;
        let to = self.resolve(share, new_path)?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| map_io("rename", share, old_path, e))
    }

    async fn directory_exists(&mut self, share: &str, path: &str) -> Result<bool, ShareError> {
        let full = self.resolve(share, path)?;
        match tokio::fs::metadata(&full).await {
            Ok(md) => Ok(md.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io("stat", share, path, e)),
        }
    }

    async fn list_shares(&mut self) -> Result<BTreeSet<String>, ShareError> {
        if !self.connected {
            return Err(ShareError::NotConnected);
        }
        let mut entries = tokio::fs::read_dir(&self.server_root)
            .await
            .map_err(|e| map_io("list", "", "", e))?;

        let mut shares = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io("list", "", "", e))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_dir && !is_special_share(&name) && !name.starts_with('.') {
                shares.insert(name);
            }
        }
        Ok(shares)
    }

    async fn disconnect(&mut self) -> Result<(), ShareError> {
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_rejects_escapes() {
        assert!(single_segment("share").is_ok());
        assert!(single_segment("..").is_err());
        assert!(single_segment("a/b").is_err());
        assert!(single_segment("/abs").is_err());
        assert!(single_segment("").is_err());
    }
}

//! Confined filesystem facade handed to the bash engine (spec.md §4.3).
//!
//! Every operation first runs the path (source and destination, where there
//! are two) through [`PathGuard`], then delegates to an unconfined backing
//! filesystem rooted at `ROOT`. `SecureFs` performs no quota enforcement —
//! the bash engine's own `maxLoopIterations`/`maxCommandCount`/`maxCallDepth`
//! limits bound adversarial workloads (spec.md §4.3, §6).
//!
//! `FileSystem` is the capability interface spec.md §6 requires of the bash
//! engine's pluggable filesystem. It is richer than what `bashkit` itself
//! declares, so `SecureFs` additionally implements `bashkit::fs::FileSystem`
//! directly (see the adapter impl below) by delegating to these same
//! confined operations; `bashkit::Bash::builder().filesystem(...)` is
//! constructed against that adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SandboxError;
use crate::path_guard::PathGuard;

/// Kind of filesystem entry, matching the `isFile|isDirectory|isSymbolicLink`
/// triplet spec.md §6 requires directory entries to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub kind: EntryKind,
    pub len: u64,
}

/// Capability interface for a pluggable filesystem, matching the set of
/// operations spec.md §6 requires the bash engine's filesystem trait to offer.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;
    async fn write(&self, path: &str, data: &[u8]) -> std::io::Result<()>;
    async fn append(&self, path: &str, data: &[u8]) -> std::io::Result<()>;
    async fn exists(&self, path: &str) -> bool;
    async fn stat(&self, path: &str) -> std::io::Result<FileMeta>;
    async fn lstat(&self, path: &str) -> std::io::Result<FileMeta>;
    async fn readlink(&self, path: &str) -> std::io::Result<String>;
    async fn readdir(&self, path: &str) -> std::io::Result<Vec<DirEntry>>;
    async fn mkdir(&self, path: &str, recursive: bool) -> std::io::Result<()>;
    async fn rm(&self, path: &str) -> std::io::Result<()>;
    async fn cp(&self, src: &str, dst: &str) -> std::io::Result<()>;
    async fn mv(&self, src: &str, dst: &str) -> std::io::Result<()>;
    async fn chmod(&self, path: &str, mode: u32) -> std::io::Result<()>;
    async fn symlink(&self, target: &str, link: &str) -> std::io::Result<()>;
    async fn link(&self, src: &str, dst: &str) -> std::io::Result<()>;
}

fn denied(err: SandboxError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::PermissionDenied, err.public_message())
}

/// `SecureFs`: the `FileSystem` implementation passed to `BashRunner`/`bashkit`.
pub struct SecureFs {
    guard: Arc<PathGuard>,
}

impl SecureFs {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }

    fn confine(&self, path: &str) -> Result<PathBuf, SandboxError> {
        Ok(self.guard.validate(path)?.host_path)
    }

    fn confine_parent_only(&self, path: &str) -> Result<PathBuf, SandboxError> {
        Ok(self.guard.validate_parent_only(path)?.host_path)
    }

    fn meta_of(metadata: std::fs::Metadata) -> FileMeta {
        let kind = if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        FileMeta {
            kind,
            len: metadata.len(),
        }
    }
}

#[async_trait]
impl FileSystem for SecureFs {
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        let host = self.confine(path).map_err(denied)?;
        tokio::fs::read(host).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> std::io::Result<()> {
        let host = self.confine(path).map_err(denied)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(host, data).await
    }

    async fn append(&self, path: &str, data: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let host = self.confine(path).map_err(denied)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(host)
            .await?;
        file.write_all(data).await
    }

    async fn exists(&self, path: &str) -> bool {
        // spec.md §4.3: on a symlink-escape rejection, report false rather
        // than surfacing the error — observing existence through an
        // attacker-created symlink is itself a side channel to avoid.
        match self.confine(path) {
            Ok(host) => host.exists(),
            Err(SandboxError::SymlinkEscape(_)) => false,
            Err(_) => false,
        }
    }

    async fn stat(&self, path: &str) -> std::io::Result<FileMeta> {
        let host = self.confine(path).map_err(denied)?;
        let metadata = tokio::fs::metadata(host).await?;
        Ok(Self::meta_of(metadata))
    }

    async fn lstat(&self, path: &str) -> std::io::Result<FileMeta> {
        let host = self.confine_parent_only(path).map_err(denied)?;
        let metadata = tokio::fs::symlink_metadata(host).await?;
        Ok(Self::meta_of(metadata))
    }

    async fn readlink(&self, path: &str) -> std::io::Result<String> {
        let host = self.confine_parent_only(path).map_err(denied)?;
        let target = tokio::fs::read_link(host).await?;
        Ok(target.display().to_string())
    }

    async fn readdir(&self, path: &str) -> std::io::Result<Vec<DirEntry>> {
        let host = self.confine(path).map_err(denied)?;
        let mut entries = tokio::fs::read_dir(host).await?;
        let mut result = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            result.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(result)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> std::io::Result<()> {
        let host = self.confine(path).map_err(denied)?;
        if recursive {
            tokio::fs::create_dir_all(host).await
        } else {
            tokio::fs::create_dir(host).await
        }
    }

    async fn rm(&self, path: &str) -> std::io::Result<()> {
        // spec.md §4.3: if the target is a symlink, validate only the parent
        // so an adversarial link can be removed without following it.
        let parent_host = self.confine_parent_only(path).map_err(denied)?;
        let metadata = tokio::fs::symlink_metadata(&parent_host).await?;
        if metadata.file_type().is_symlink() || metadata.is_file() {
            tokio::fs::remove_file(parent_host).await
        } else {
            tokio::fs::remove_dir_all(parent_host).await
        }
    }

    async fn cp(&self, src: &str, dst: &str) -> std::io::Result<()> {
        let src_host = self.confine(src).map_err(denied)?;
        let dst_host = self.confine(dst).map_err(denied)?;
        if let Some(parent) = dst_host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src_host, dst_host).await.map(|_| ())
    }

    async fn mv(&self, src: &str, dst: &str) -> std::io::Result<()> {
        let src_host = self.confine(src).map_err(denied)?;
        let dst_host = self.confine(dst).map_err(denied)?;
        if let Some(parent) = dst_host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(src_host, dst_host).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let host = self.confine(path).map_err(denied)?;
            tokio::fs::set_permissions(host, std::fs::Permissions::from_mode(mode)).await
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Ok(())
        }
    }

    async fn symlink(&self, target: &str, link: &str) -> std::io::Result<()> {
        // spec.md §4.1/§4.3: reject creation when the resolved target escapes
        // the workspace, even though the link location itself is confined.
        let target_host = self
            .guard
            .validate_symlink_target(link, target)
            .map_err(denied)?;
        let link_host = self.confine_parent_only(link).map_err(denied)?;
        #[cfg(unix)]
        {
            tokio::fs::symlink(target_host, link_host).await
        }
        #[cfg(not(unix))]
        {
            let _ = target_host;
            tokio::fs::write(link_host, []).await
        }
    }

    async fn link(&self, src: &str, dst: &str) -> std::io::Result<()> {
        let src_host = self.confine(src).map_err(denied)?;
        let dst_host = self.confine(dst).map_err(denied)?;
        tokio::fs::hard_link(src_host, dst_host).await
    }
}

/// Adapter from this module's confinement-checked operations onto bashkit's
/// own (narrower) `FileSystem` trait, which is what `Bash::builder()
/// .filesystem(...)` actually expects. `bashkit::Error` is constructed from
/// `std::io::Error` via `From`, matching the rest of this module's
/// io::Result-based confined operations.
fn path_to_str(path: &Path) -> std::io::Result<&str> {
    path.to_str().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is not valid UTF-8")
    })
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

fn to_bashkit_meta(metadata: &std::fs::Metadata) -> bashkit::fs::FileMeta {
    let file_type = if metadata.file_type().is_symlink() {
        bashkit::fs::FileType::Symlink
    } else if metadata.is_dir() {
        bashkit::fs::FileType::Directory
    } else {
        bashkit::fs::FileType::File
    };
    bashkit::fs::FileMeta {
        file_type,
        mode: mode_of(metadata),
        size: metadata.len(),
        modified: metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
    }
}

#[async_trait]
impl bashkit::fs::FileSystem for SecureFs {
    async fn read_file(&self, path: &Path) -> bashkit::error::Result<Vec<u8>> {
        let p = path_to_str(path)?;
        <Self as FileSystem>::read(self, p).await.map_err(Into::into)
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> bashkit::error::Result<()> {
        let p = path_to_str(path)?;
        <Self as FileSystem>::write(self, p, data)
            .await
            .map_err(Into::into)
    }

    async fn exists(&self, path: &Path) -> bashkit::error::Result<bool> {
        let p = path_to_str(path)?;
        Ok(<Self as FileSystem>::exists(self, p).await)
    }

    async fn stat(&self, path: &Path) -> bashkit::error::Result<bashkit::fs::FileMeta> {
        let p = path_to_str(path)?;
        let host = self.confine(p).map_err(denied)?;
        let metadata = tokio::fs::metadata(host).await?;
        Ok(to_bashkit_meta(&metadata))
    }

    async fn mkdir(&self, path: &Path, parents: bool) -> bashkit::error::Result<()> {
        let p = path_to_str(path)?;
        <Self as FileSystem>::mkdir(self, p, parents)
            .await
            .map_err(Into::into)
    }

    // bashkit unifies unlink/rmdir behind one call; `recursive` distinguishes
    // `rm` from `rmdir`. A symlink leaf is always removed without following
    // it, mirroring `FileSystem::rm` above.
    async fn remove(&self, path: &Path, recursive: bool) -> bashkit::error::Result<()> {
        let p = path_to_str(path)?;
        let parent_host = self.confine_parent_only(p).map_err(denied)?;
        let metadata = tokio::fs::symlink_metadata(&parent_host).await?;
        if metadata.file_type().is_symlink() || metadata.is_file() {
            tokio::fs::remove_file(parent_host).await.map_err(Into::into)
        } else if recursive {
            tokio::fs::remove_dir_all(parent_host).await.map_err(Into::into)
        } else {
            tokio::fs::remove_dir(parent_host).await.map_err(Into::into)
        }
    }

    async fn read_dir(&self, path: &Path) -> bashkit::error::Result<Vec<bashkit::fs::DirEntry>> {
        let p = path_to_str(path)?;
        let entries = <Self as FileSystem>::readdir(self, p).await?;
        Ok(entries
            .into_iter()
            .map(|e| bashkit::fs::DirEntry { name: e.name })
            .collect())
    }

    async fn rename(&self, from: &Path, to: &Path) -> bashkit::error::Result<()> {
        let src = path_to_str(from)?;
        let dst = path_to_str(to)?;
        <Self as FileSystem>::mv(self, src, dst)
            .await
            .map_err(Into::into)
    }
}

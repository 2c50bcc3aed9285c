//! Bidirectional host↔virtual filesystem synchronization (spec.md §4.4).
//!
//! `sync_host_to_virtual` runs before Python execution; `sync_virtual_to_host`
//! runs after, on both success and failure, since user code may have written
//! files before raising. Targeted (single-path) variants back the per-call
//! file tools; whole-tree variants back execution boundaries.

use std::path::Path;

use tracing::warn;

use crate::error::SandboxError;
use crate::path_guard::{PathGuard, VROOT};
use crate::vfs::VirtualFs;

pub struct SyncEngine {
    vfs: std::sync::Arc<VirtualFs>,
    guard: std::sync::Arc<PathGuard>,
}

impl SyncEngine {
    pub fn new(vfs: std::sync::Arc<VirtualFs>, guard: std::sync::Arc<PathGuard>) -> Self {
        Self { vfs, guard }
    }

    /// Recursively copy the entire workspace from host into the virtual FS.
    pub async fn sync_host_to_virtual(&self) -> Result<(), SandboxError> {
        self.sync_host_path_to_virtual("").await
    }

    /// Recursively copy the entire workspace from the virtual FS to host.
    pub async fn sync_virtual_to_host(&self) -> Result<(), SandboxError> {
        self.sync_virtual_path_to_host(VROOT).await
    }

    /// Targeted host→virtual sync for a single file or subtree.
    pub async fn sync_host_path_to_virtual(&self, virt_path: &str) -> Result<(), SandboxError> {
        let confined = self.guard.validate(virt_path)?;
        self.copy_host_subtree_to_virtual(&confined.host_path, &confined.virt_path)
            .await
    }

    /// Targeted virtual→host sync for a single file or subtree.
    pub async fn sync_virtual_path_to_host(&self, virt_path: &str) -> Result<(), SandboxError> {
        if !self.vfs.exists(virt_path) {
            return Ok(());
        }
        self.copy_virtual_subtree_to_host(virt_path).await
    }

    fn copy_host_subtree_to_virtual<'a>(
        &'a self,
        host_path: &'a Path,
        virt_path: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SandboxError>> + Send + 'a>>
    {
        Box::pin(async move {
            let metadata = match tokio::fs::metadata(host_path).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(SandboxError::from(e)),
            };

            if metadata.is_dir() {
                self.vfs.mkdir_tree(virt_path)?;
                let mut entries = tokio::fs::read_dir(host_path).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let child_virt = format!("{}/{}", virt_path.trim_end_matches('/'), name);
                    let child_host = entry.path();
                    if let Err(e) = self
                        .copy_host_subtree_to_virtual(&child_host, &child_virt)
                        .await
                    {
                        warn!(path = %child_host.display(), error = %e, "host->virtual sync: subtree failed");
                    }
                }
            } else {
                let data = tokio::fs::read(host_path).await?;
                self.vfs.write_file(virt_path, &data)?;
            }
            Ok(())
        })
    }

    fn copy_virtual_subtree_to_host<'a>(
        &'a self,
        virt_path: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SandboxError>> + Send + 'a>>
    {
        Box::pin(async move {
            let confined = self.guard.validate(virt_path)?;

            if self.vfs.is_directory(virt_path) {
                tokio::fs::create_dir_all(&confined.host_path).await?;
                for name in self.vfs.readdir(virt_path)? {
                    let child_virt = format!("{}/{}", virt_path.trim_end_matches('/'), name);
                    if let Err(e) = self.copy_virtual_subtree_to_host(&child_virt).await {
                        warn!(path = %child_virt, error = %e, "virtual->host sync: subtree failed");
                    }
                }
            } else {
                if let Some(parent) = confined.host_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                // Re-validate immediately before the write: defends against a
                // symlink introduced between the directory-tree walk above and
                // this write (spec.md §4.4).
                let revalidated = self.guard.validate(virt_path)?;
                let data = self.vfs.read_file(virt_path)?;
                tokio::fs::write(&revalidated.host_path, &data).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn engine_in(dir: &Path) -> SyncEngine {
        let guard = Arc::new(PathGuard::new(dir.canonicalize().unwrap()));
        let vfs = Arc::new(VirtualFs::new());
        SyncEngine::new(vfs, guard)
    }

    #[tokio::test]
    async fn host_to_virtual_copies_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("a/b")).await.unwrap();
        tokio::fs::write(dir.path().join("a/b/f.txt"), b"data").await.unwrap();

        let engine = engine_in(dir.path());
        engine.sync_host_to_virtual().await.unwrap();

        assert_eq!(
            engine.vfs.read_file(&format!("{VROOT}/a/b/f.txt")).unwrap(),
            b"data"
        );
    }

    #[tokio::test]
    async fn virtual_to_host_copies_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine
            .vfs
            .write_file(&format!("{VROOT}/x/y.txt"), b"hello")
            .unwrap();

        engine.sync_virtual_to_host().await.unwrap();

        let host_contents = tokio::fs::read(dir.path().join("x/y.txt")).await.unwrap();
        assert_eq!(host_contents, b"hello");
    }

    // Universal invariant 4: idempotence of sync.
    #[tokio::test]
    async fn host_to_virtual_sync_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.txt"), b"v1").await.unwrap();
        let engine = engine_in(dir.path());

        engine.sync_host_to_virtual().await.unwrap();
        let first = engine.vfs.read_file(&format!("{VROOT}/f.txt")).unwrap();
        engine.sync_host_to_virtual().await.unwrap();
        let second = engine.vfs.read_file(&format!("{VROOT}/f.txt")).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn targeted_sync_touches_only_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"1").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"2").await.unwrap();

        let engine = engine_in(dir.path());
        engine.sync_host_path_to_virtual("a.txt").await.unwrap();

        assert!(engine.vfs.exists(&format!("{VROOT}/a.txt")));
        assert!(!engine.vfs.exists(&format!("{VROOT}/b.txt")));
    }

    #[tokio::test]
    async fn sync_virtual_path_to_host_missing_path_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        assert!(engine
            .sync_virtual_path_to_host(&format!("{VROOT}/missing"))
            .await
            .is_ok());
    }
}

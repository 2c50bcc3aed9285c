//! Coordinator: the top-level tool entrypoints (spec.md §4.8). Composes
//! PathGuard, QuotaKeeper, the virtual filesystem, SyncEngine, PySupervisor,
//! and BashRunner into the six operations the outside world calls.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bash::{validate_cwd, BashExecutionResult, BashRunner};
use crate::config::Config;
use crate::error::SandboxError;
use crate::path_guard::{PathGuard, VROOT};
use crate::quota::QuotaKeeper;
use crate::supervisor::PySupervisor;
use crate::sync_engine::SyncEngine;
use crate::types::ExecutionSettings;
use crate::vfs::VirtualFs;

/// Directory listing entry (spec.md §4.8 `list_files`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Result of `execute_python` (spec.md §3's Python execution result shape).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PyExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub result: Option<String>,
    pub error: Option<String>,
}

pub struct Coordinator {
    config: Config,
    guard: Arc<PathGuard>,
    vfs: Arc<VirtualFs>,
    quota: QuotaKeeper,
    sync: SyncEngine,
    supervisor: PySupervisor,
    bash: BashRunner,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        let guard = Arc::new(PathGuard::new(config.workspace_real.clone()));
        let vfs = Arc::new(VirtualFs::new());
        let quota = QuotaKeeper::new(
            config.workspace_real.clone(),
            config.max_file_size,
            config.max_workspace_size,
        );
        let sync = SyncEngine::new(Arc::clone(&vfs), Arc::clone(&guard));

        let allowed_modules: HashSet<String> = ExecutionSettings::default()
            .allowed_modules
            .into_iter()
            .collect();
        let supervisor = PySupervisor::new(
            Arc::clone(&guard),
            Arc::clone(&vfs),
            allowed_modules,
            config.py_timeout_ms,
        );
        let bash = BashRunner::new(Arc::clone(&guard));

        Self {
            config,
            guard,
            vfs,
            quota,
            sync,
            supervisor,
            bash,
        }
    }

    /// `write_file(path, content)` (spec.md §4.8).
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let confined = self.guard.validate(path)?;
        let bytes = content.as_bytes();
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(SandboxError::FileTooLarge {
                size: bytes.len() as u64,
                limit: self.config.max_file_size,
            });
        }

        let host_path = confined.host_path.clone();
        self.quota
            .reserve(bytes.len() as u64, move || async move {
                if let Some(parent) = host_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&host_path, bytes).await?;
                Ok(())
            })
            .await?;

        self.sync.sync_host_path_to_virtual(&confined.virt_path).await?;
        Ok(())
    }

    /// `read_file(path)` (spec.md §4.8).
    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let confined = self.guard.validate(path)?;
        self.sync.sync_host_path_to_virtual(&confined.virt_path).await?;
        let bytes = self.vfs.read_file(&confined.virt_path)?;
        String::from_utf8(bytes)
            .map_err(|_| SandboxError::InvalidPath("file contents are not valid UTF-8".to_string()))
    }

    /// `list_files(dir?)` (spec.md §4.8). Defaults to `VROOT`.
    pub async fn list_files(&self, dir: Option<&str>) -> Result<Vec<FileEntry>, SandboxError> {
        let target = dir.unwrap_or(VROOT);
        let confined = self.guard.validate(target)?;
        self.sync.sync_host_path_to_virtual(&confined.virt_path).await?;

        let names = self.vfs.readdir(&confined.virt_path)?;
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            if name == "." || name == ".." {
                continue;
            }
            let child_virt = format!("{}/{}", confined.virt_path.trim_end_matches('/'), name);
            let stat = self.vfs.stat(&child_virt)?;
            entries.push(FileEntry {
                name,
                is_directory: stat.is_dir,
                size: stat.len,
            });
        }
        Ok(entries)
    }

    /// `delete_file(path)` (spec.md §4.8). Missing host file is not an error.
    ///
    /// spec.md §4.1's remove-symlink rule: if the leaf itself is a symlink,
    /// only its parent is confinement-checked, so deleting an escaping link
    /// succeeds without following it (§8 scenario S1). Everything else goes
    /// through the full realpath-validated path, mirroring `SecureFs::rm`.
    pub async fn delete_file(&self, path: &str) -> Result<(), SandboxError> {
        let parent_confined = self.guard.validate_parent_only(path)?;

        if let Ok(metadata) = tokio::fs::symlink_metadata(&parent_confined.host_path).await {
            if metadata.file_type().is_symlink() {
                let _ = self.vfs.unlink(&parent_confined.virt_path);
                tokio::fs::remove_file(&parent_confined.host_path).await?;
                return Ok(());
            }
        }

        let confined = self.guard.validate(path)?;

        if self.vfs.is_directory(&confined.virt_path) {
            let _ = self.vfs.rmdir(&confined.virt_path);
        } else {
            let _ = self.vfs.unlink(&confined.virt_path);
        }

        match tokio::fs::metadata(&confined.host_path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&confined.host_path).await?,
            Ok(_) => tokio::fs::remove_file(&confined.host_path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SandboxError::from(e)),
        }
        Ok(())
    }

    /// `execute_python(code, packages?)` (spec.md §4.8). Delegates to PySupervisor.
    pub async fn execute_python(&self, code: &str, packages: Vec<String>) -> PyExecutionResult {
        let max_output_bytes = ExecutionSettings::default().max_output_bytes;
        match self.supervisor.execute(code.to_string(), packages, max_output_bytes).await {
            Ok(result) => PyExecutionResult {
                success: result.error.is_none(),
                stdout: result.stdout,
                stderr: result.stderr,
                result: result.return_value,
                error: result.error.map(|e| describe_execution_error(&e)),
            },
            Err(e) => PyExecutionResult {
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                result: None,
                error: Some(e.public_message()),
            },
        }
    }

    /// `execute_bash(command, cwd?)` (spec.md §4.8).
    pub async fn execute_bash(
        &self,
        command: &str,
        cwd: Option<&str>,
    ) -> Result<BashExecutionResult, SandboxError> {
        let cwd_virt = match cwd {
            Some(c) => Some(validate_cwd(&self.guard, c)?),
            None => None,
        };
        let result = self.bash.execute(command, cwd_virt.as_deref()).await;
        self.sync.sync_host_to_virtual().await?;
        Ok(result)
    }
}

fn describe_execution_error(error: &crate::types::ExecutionError) -> String {
    use crate::types::ExecutionError::*;
    match error {
        SyntaxError { message, line, col } => format!("SyntaxError at line {line}, col {col}: {message}"),
        RuntimeError { message, .. } => message.clone(),
        Timeout { limit_ns } => format!("execution timed out after {} ms", limit_ns / 1_000_000),
        OutputLimitExceeded { limit_bytes } => format!("output exceeded {limit_bytes} bytes"),
        ModuleNotAllowed { module_name } => format!("module not allowed: {module_name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator_in(dir: &std::path::Path) -> Coordinator {
        let config = Config::for_workspace(dir).unwrap();
        Coordinator::new(config)
    }

    // Universal invariant 3: round-trip write then read.
    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_in(dir.path());
        coordinator.write_file("notes.txt", "hello").await.unwrap();
        let content = coordinator.read_file("notes.txt").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn write_file_rejects_oversized_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            max_file_size: 4,
            ..Config::for_workspace(dir.path()).unwrap()
        };
        let coordinator = Coordinator::new(config);
        let result = coordinator.write_file("f.txt", "too long").await;
        assert!(matches!(result, Err(SandboxError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn list_files_excludes_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_in(dir.path());
        coordinator.write_file("a.txt", "1").await.unwrap();
        coordinator.write_file("sub/b.txt", "2").await.unwrap();

        let entries = coordinator.list_files(None).await.unwrap();
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
    }

    #[tokio::test]
    async fn delete_file_on_missing_host_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_in(dir.path());
        assert!(coordinator.delete_file("missing.txt").await.is_ok());
    }

    // S1: symlink read blocked via the Coordinator surface.
    #[tokio::test]
    #[cfg(unix)]
    async fn read_file_through_escaping_symlink_fails() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"root:x:0:0").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("evil")).unwrap();

        let coordinator = coordinator_in(dir.path());
        let result = coordinator.read_file("evil").await;
        assert!(matches!(result, Err(SandboxError::SymlinkEscape(_))));
    }

    // S1: deleting an escaping symlink removes the link itself rather than
    // being blocked by the confinement check on its (out-of-workspace) target.
    #[tokio::test]
    #[cfg(unix)]
    async fn delete_file_removes_escaping_symlink_without_following_it() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"root:x:0:0").unwrap();
        let link = dir.path().join("evil");
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), &link).unwrap();

        let coordinator = coordinator_in(dir.path());
        coordinator.delete_file("evil").await.unwrap();
        assert!(!link.exists());
        assert!(outside.path().join("secret.txt").exists());
    }

    // S6: path traversal rejected via the Coordinator surface.
    #[tokio::test]
    async fn write_file_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_in(dir.path());
        let result = coordinator.write_file("../escape.txt", "x").await;
        assert!(result.is_err());
    }
}

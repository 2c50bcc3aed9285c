//! Workspace quota enforcement, safe under concurrent writers (spec.md §4.2).
//!
//! `reserve` holds a named async mutex (keyed on the workspace root) across
//! the size-check and the write itself, preventing the classic
//! check-then-act race where two concurrent writers both observe
//! `current + size <= limit` but collectively exceed it. Readers never take
//! the lock.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::SandboxError;

type NamedLocks = Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>;

fn registry() -> &'static NamedLocks {
    static REGISTRY: OnceLock<NamedLocks> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn named_lock(root: &Path) -> Arc<AsyncMutex<()>> {
    let mut map = registry().lock().expect("quota lock registry poisoned");
    map.entry(root.to_path_buf())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Enforces `MAX_FILE_SIZE` and `MAX_WORKSPACE_SIZE` for a single workspace root.
pub struct QuotaKeeper {
    root: PathBuf,
    max_file_size: u64,
    max_workspace_size: u64,
    lock: Arc<AsyncMutex<()>>,
}

impl QuotaKeeper {
    pub fn new(root: PathBuf, max_file_size: u64, max_workspace_size: u64) -> Self {
        let lock = named_lock(&root);
        Self {
            root,
            max_file_size,
            max_workspace_size,
            lock,
        }
    }

    /// `precheck(file_bytes)`: spec.md §4.2 — fail fast without touching the
    /// workspace tree when a single write alone exceeds the per-file cap.
    pub fn precheck(&self, file_bytes: u64) -> Result<(), SandboxError> {
        if file_bytes > self.max_file_size {
            return Err(SandboxError::FileTooLarge {
                size: file_bytes,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// `reserve(file_bytes, do_write)`: acquire the named mutex, measure the
    /// current workspace size, reject if the reservation would exceed the
    /// cap, otherwise run `do_write` while still holding the lock.
    pub async fn reserve<F, Fut, T>(&self, file_bytes: u64, do_write: F) -> Result<T, SandboxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SandboxError>>,
    {
        self.precheck(file_bytes)?;
        let _guard = self.lock.lock().await;

        let current = workspace_size(&self.root).await?;
        if current + file_bytes > self.max_workspace_size {
            return Err(SandboxError::WorkspaceFull {
                requested: file_bytes,
                limit: self.max_workspace_size,
            });
        }

        do_write().await
    }
}

/// Recursively sum file sizes under `root`. Not cached between calls, per
/// spec.md §3's quota-state note — implementations MAY cache with
/// invalidation, but this reference implementation recomputes on demand.
fn workspace_size(root: &Path) -> std::pin::Pin<Box<dyn Future<Output = std::io::Result<u64>> + Send + '_>> {
    Box::pin(async move {
        let mut total = 0u64;
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                total += workspace_size(&entry.path()).await?;
            } else {
                total += metadata.len();
            }
        }
        Ok(total)
    })
}

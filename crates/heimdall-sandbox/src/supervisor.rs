//! PySupervisor: owns the PyWorker lifecycle, translates tool requests into
//! worker messages, and enforces the wall-clock timeout (spec.md §4.6).
//!
//! ```text
//! Absent --spawn--> Starting --ready--> Idle --execute--> Busy --result--> Idle
//!                        \--fail--> Absent            \--timeout--> Absent (kill)
//!                                                     \--exit--> Absent
//! ```
//!
//! The `tokio::sync::Mutex` guarding the worker slot is the serialization
//! point: only one `execute` call may be in flight against a given worker at
//! a time, matching spec.md §5's "`execute_python` requests are serialized by
//! the PySupervisor per worker."

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::SandboxError;
use crate::path_guard::PathGuard;
use crate::types::{ExecutionError, ExecutionResult};
use crate::vfs::VirtualFs;
use crate::worker::{spawn_worker, ExecuteRequest, WorkerHandle};

/// Generous bound on first-time worker start (spec.md §4.6).
const INIT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct PySupervisor {
    guard: Arc<PathGuard>,
    vfs: Arc<VirtualFs>,
    allowed_modules: HashSet<String>,
    py_timeout_ms: u64,
    worker: tokio::sync::Mutex<Option<WorkerHandle>>,
}

impl PySupervisor {
    pub fn new(
        guard: Arc<PathGuard>,
        vfs: Arc<VirtualFs>,
        allowed_modules: HashSet<String>,
        py_timeout_ms: u64,
    ) -> Self {
        Self {
            guard,
            vfs,
            allowed_modules,
            py_timeout_ms,
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Execute `code` against the worker, lazily spawning it if absent.
    ///
    /// Returns `Ok(ExecutionResult)` for every outcome a user would recognize
    /// as "my code ran" — including a timed-out execution, reported as
    /// `ExecutionError::Timeout` inside the result, per spec.md §3 invariant
    /// 3. Returns `Err(SandboxError::WorkerUnavailable)` only when the worker
    /// itself could not be started or died outright.
    pub async fn execute(
        &self,
        code: String,
        packages: Vec<String>,
        max_output_bytes: usize,
    ) -> Result<ExecutionResult, SandboxError> {
        let mut slot = self.worker.lock().await;

        if slot.is_none() {
            let handle = self.spawn().await?;
            *slot = Some(handle);
        }

        let (response_tx, response_rx) = mpsc::sync_channel(1);
        let request = ExecuteRequest {
            code,
            packages,
            max_output_bytes,
            response: response_tx,
        };

        if let Err(e) = slot.as_ref().expect("worker just populated").send(request) {
            // Worker exited between the ready-check and send (spec.md §4.6
            // "on worker exit with non-zero status ... mark absent").
            *slot = None;
            return Err(e);
        }

        let timeout = Duration::from_millis(self.py_timeout_ms.max(1));
        let outcome = tokio::task::spawn_blocking(move || response_rx.recv_timeout(timeout))
            .await
            .map_err(|e| SandboxError::WorkerUnavailable(format!("supervisor task join failed: {e}")))?;

        match outcome {
            Ok(result) => Ok(result),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Force-terminate: abandon the worker thread (it may still be
                // running the user's code forever) and mark the slot absent
                // so the next call spawns a fresh worker.
                warn!(py_timeout_ms = self.py_timeout_ms, "python execution timed out, abandoning worker");
                *slot = None;
                Ok(ExecutionResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: None,
                    error: Some(ExecutionError::Timeout {
                        limit_ns: self.py_timeout_ms * 1_000_000,
                    }),
                    duration_ns: self.py_timeout_ms * 1_000_000,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                *slot = None;
                Err(SandboxError::WorkerUnavailable(
                    "worker exited before returning a result".to_string(),
                ))
            }
        }
    }

    async fn spawn(&self) -> Result<WorkerHandle, SandboxError> {
        let guard = Arc::clone(&self.guard);
        let vfs = Arc::clone(&self.vfs);
        let allowed_modules = self.allowed_modules.clone();
        tokio::task::spawn_blocking(move || spawn_worker(guard, vfs, allowed_modules, INIT_TIMEOUT))
            .await
            .map_err(|e| SandboxError::WorkerUnavailable(format!("worker spawn task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_ALLOWED_MODULES;

    fn allowed_set() -> HashSet<String> {
        DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect()
    }

    fn supervisor_in(dir: &std::path::Path, py_timeout_ms: u64) -> PySupervisor {
        let guard = Arc::new(PathGuard::new(dir.canonicalize().unwrap()));
        let vfs = Arc::new(VirtualFs::new());
        PySupervisor::new(guard, vfs, allowed_set(), py_timeout_ms)
    }

    #[tokio::test]
    #[ignore = "slow: VM init per test"]
    async fn execute_lazily_spawns_and_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path(), 5000);
        let result = supervisor
            .execute("1 + 1".to_string(), vec![], 1_048_576)
            .await
            .unwrap();
        assert_eq!(result.return_value, Some("2".to_string()));
    }

    // S3: Python timeout, then a subsequent benign call succeeds.
    #[tokio::test]
    #[ignore = "slow: VM init per test"]
    async fn s3_timeout_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path(), 2000);

        let timed_out = supervisor
            .execute("while True: pass".to_string(), vec![], 1_048_576)
            .await
            .unwrap();
        match timed_out.error {
            Some(ExecutionError::Timeout { limit_ns }) => assert_eq!(limit_ns, 2000 * 1_000_000),
            other => panic!("expected Timeout, got {other:?}"),
        }

        let recovered = supervisor
            .execute("print(1+1)".to_string(), vec![], 1_048_576)
            .await
            .unwrap();
        assert!(recovered.error.is_none());
        assert!(recovered.stdout.contains('2'));
    }

    #[tokio::test]
    #[ignore = "slow: VM init per test"]
    async fn execute_serializes_concurrent_calls() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(supervisor_in(dir.path(), 5000));

        let a = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.execute("1 + 1".to_string(), vec![], 1_048_576).await })
        };
        let b = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.execute("2 + 2".to_string(), vec![], 1_048_576).await })
        };

        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(ra.return_value, Some("2".to_string()));
        assert_eq!(rb.return_value, Some("4".to_string()));
    }
}

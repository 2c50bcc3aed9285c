//! PyWorker: owns one instance of the embedded Python engine in an isolated
//! execution context, handling one execute request at a time (spec.md §4.5).
//!
//! The engine object (`PyInterp`) is not `Send`, so it never leaves the
//! thread that created it. That thread also owns a single-threaded Tokio
//! runtime used to drive [`SyncEngine`]'s async host filesystem calls —
//! spawning a runtime per worker thread rather than sharing the process-wide
//! one keeps the worker's blocking Python execution from ever stalling
//! unrelated async tasks.
//!
//! `PySupervisor` communicates with a worker over two channels: requests in,
//! outcomes out. There is deliberately no "kill" message — per spec.md §4.5/
//! §9 the only termination mechanism is abandoning the thread, which
//! `PySupervisor` does by simply dropping its handle to a stuck worker and
//! spawning a fresh one.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;

use tracing::warn;

use crate::engine::{build_interpreter, run_code, PyInterp};
use crate::error::SandboxError;
use crate::output::OutputBuffer;
use crate::path_guard::{PathGuard, VROOT};
use crate::sync_engine::SyncEngine;
use crate::types::{ExecutionError, ExecutionResult};
use crate::vfs::VirtualFs;
use crate::wrap::maybe_wrap_last_expr;

/// A single execute request sent to a running worker thread.
pub(crate) struct ExecuteRequest {
    pub code: String,
    pub packages: Vec<String>,
    pub max_output_bytes: usize,
    pub response: mpsc::SyncSender<ExecutionResult>,
}

/// Outcome of spawning a worker: either it became `Ready`, or initialization
/// failed and the thread has already exited (spec.md §4.5 "On initialization
/// failure").
pub(crate) enum WorkerInit {
    Ready,
    Error(String),
}

/// Handle to a live worker thread.
pub(crate) struct WorkerHandle {
    request_tx: mpsc::SyncSender<ExecuteRequest>,
    // Retained so the thread is joined on graceful drop; a timed-out worker
    // is simply never joined — its handle is dropped, and the detached
    // thread runs to completion (or forever) unobserved.
    _thread: std::thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn send(&self, request: ExecuteRequest) -> Result<(), SandboxError> {
        self.request_tx
            .send(request)
            .map_err(|_| SandboxError::WorkerUnavailable("worker thread exited".to_string()))
    }
}

/// Spawn a new worker thread and block until it reports `Ready` or `Error`,
/// bounded by `init_timeout`. Mirrors spec.md §4.6's "spawn waits (bounded by
/// a generous init timeout)".
pub(crate) fn spawn_worker(
    guard: Arc<PathGuard>,
    vfs: Arc<VirtualFs>,
    allowed_modules: HashSet<String>,
    init_timeout: std::time::Duration,
) -> Result<WorkerHandle, SandboxError> {
    let (init_tx, init_rx) = mpsc::sync_channel::<WorkerInit>(1);
    let (request_tx, request_rx) = mpsc::sync_channel::<ExecuteRequest>(1);

    let thread = std::thread::Builder::new()
        .name("heimdall-py-worker".to_string())
        .spawn(move || worker_main(guard, vfs, allowed_modules, init_tx, request_rx))
        .expect("failed to spawn heimdall-py-worker thread");

    match init_rx.recv_timeout(init_timeout) {
        Ok(WorkerInit::Ready) => Ok(WorkerHandle {
            request_tx,
            _thread: thread,
        }),
        Ok(WorkerInit::Error(message)) => Err(SandboxError::WorkerUnavailable(message)),
        Err(_) => Err(SandboxError::WorkerUnavailable(
            "worker did not become ready within the init timeout".to_string(),
        )),
    }
}

/// Body of the dedicated worker thread (spec.md §4.5).
fn worker_main(
    guard: Arc<PathGuard>,
    vfs: Arc<VirtualFs>,
    allowed_modules: HashSet<String>,
    init_tx: mpsc::SyncSender<WorkerInit>,
    request_rx: mpsc::Receiver<ExecuteRequest>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = init_tx.send(WorkerInit::Error(format!("failed to start worker runtime: {e}")));
            return;
        }
    };

    // mkdir the virtual workspace (spec.md §4.5 "Initialization").
    if let Err(e) = vfs.mkdir_tree(VROOT) {
        let _ = init_tx.send(WorkerInit::Error(format!(
            "failed to initialize virtual workspace: {e}"
        )));
        return;
    }

    // No package-installer module exists in this engine (RustPython has no
    // pip); this is the "best effort, absence is not fatal" case spec.md
    // §4.5 calls out — installation attempts at execution time log and
    // continue rather than aborting.
    let dummy_output = OutputBuffer::new(1);
    let interp = build_interpreter(allowed_modules, dummy_output, Arc::clone(&vfs));

    let sync_engine = SyncEngine::new(vfs, guard);

    let _ = init_tx.send(WorkerInit::Ready);

    loop {
        let request = match request_rx.recv() {
            Ok(r) => r,
            Err(_) => break, // Supervisor dropped the handle — shut down.
        };
        let result = handle_request(&runtime, &interp, &sync_engine, request.code, &request.packages, request.max_output_bytes);
        // If the caller already gave up (timeout), this send fails silently;
        // that's fine, nobody is listening.
        let _ = request.response.send(result);
    }
}

fn handle_request(
    runtime: &tokio::runtime::Runtime,
    interp: &PyInterp,
    sync_engine: &SyncEngine,
    code: String,
    packages: &[String],
    max_output_bytes: usize,
) -> ExecutionResult {
    let start = std::time::Instant::now();

    // Step 2: host -> virtual sync.
    if let Err(e) = runtime.block_on(sync_engine.sync_host_to_virtual()) {
        warn!(error = %e, "pre-execution sync failed");
    }

    // Step 3: package installs — best effort, not supported by this engine.
    for package in packages {
        warn!(package = %package, "package installation requested but not supported by the embedded engine");
    }

    // Steps 4-7: capture output, set cwd (handled inside engine::install_vfs_bridge),
    // auto-load is not supported by this engine, execute.
    let wrapped = maybe_wrap_last_expr(&code);
    let output = OutputBuffer::new(max_output_bytes);
    let vm_result = run_code(interp, &wrapped, output.clone());

    // Step 8: virtual -> host sync, regardless of outcome.
    if let Err(e) = runtime.block_on(sync_engine.sync_virtual_to_host()) {
        warn!(error = %e, "post-execution sync failed");
    }

    let duration_ns = start.elapsed().as_nanos() as u64;

    let limit_exceeded = output.is_limit_exceeded();
    let error = if limit_exceeded {
        Some(ExecutionError::OutputLimitExceeded {
            limit_bytes: max_output_bytes,
        })
    } else {
        vm_result.error
    };

    ExecutionResult {
        stdout: vm_result.stdout,
        stderr: vm_result.stderr,
        return_value: vm_result.return_value,
        error,
        duration_ns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_ALLOWED_MODULES;
    use std::time::Duration;

    fn allowed_set() -> HashSet<String> {
        DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect()
    }

    fn worker_in(dir: &std::path::Path) -> WorkerHandle {
        let guard = Arc::new(PathGuard::new(dir.canonicalize().unwrap()));
        let vfs = Arc::new(VirtualFs::new());
        spawn_worker(guard, vfs, allowed_set(), Duration::from_secs(30)).unwrap()
    }

    #[test]
    #[ignore = "slow: VM init per test"]
    fn worker_becomes_ready_and_executes() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_in(dir.path());

        let (tx, rx) = mpsc::sync_channel(1);
        worker
            .send(ExecuteRequest {
                code: "1 + 1".to_string(),
                packages: vec![],
                max_output_bytes: 1_048_576,
                response: tx,
            })
            .unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.return_value, Some("2".to_string()));
        assert!(result.error.is_none());
    }

    // Universal invariant 4 applied at the worker boundary: files user code
    // writes under VROOT show up on the host afterward.
    #[test]
    #[ignore = "slow: VM init per test"]
    fn worker_syncs_written_files_to_host() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_in(dir.path());

        let (tx, rx) = mpsc::sync_channel(1);
        worker
            .send(ExecuteRequest {
                code: "open('out.txt', 'w').write('hi')".to_string(),
                packages: vec![],
                max_output_bytes: 1_048_576,
                response: tx,
            })
            .unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.error.is_none());

        let host_contents = std::fs::read(dir.path().join("out.txt")).unwrap();
        assert_eq!(host_contents, b"hi");
    }
}

//! Thread-safe output capture buffer for embedded Python execution.
//!
//! [`OutputBuffer`] accumulates bytes written to stdout and stderr during Python
//! execution, enforcing a combined byte limit.  The buffer is designed to be
//! shared between the main thread (which reads results after execution) and the
//! VM thread (which writes during execution) via `Arc<Mutex<_>>` interior
//! mutability — no `unsafe` code required.
//!
//! # Timeout path
//!
//! When the VM thread is abandoned on timeout, it may still hold a clone of the
//! `OutputBuffer`.  [`into_strings`](OutputBuffer::into_strings) handles this
//! gracefully: it tries `Arc::try_unwrap` first (fast path when no other clone
//! exists) and falls back to locking the `Mutex` and cloning the inner data.

use std::sync::{Arc, Mutex};

use crate::types::ExecutionError;

// ── Inner state ───────────────────────────────────────────────────────────────

struct OutputBufferInner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    max_bytes: usize,
    limit_exceeded: bool,
}

impl OutputBufferInner {
    fn new(max_bytes: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            max_bytes,
            limit_exceeded: false,
        }
    }

    /// Returns the combined number of bytes written so far.
    fn total_len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A thread-safe buffer that captures VM stdout and stderr output.
///
/// Cheap to clone — all clones share the same underlying data via
/// `Arc<Mutex<OutputBufferInner>>`.
#[derive(Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<OutputBufferInner>>,
}

impl OutputBuffer {
    /// Creates a new `OutputBuffer` that will accept up to `max_bytes` combined
    /// across stdout and stderr.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputBufferInner::new(max_bytes))),
        }
    }

    /// Appends `data` to the stdout stream.
    ///
    /// Returns `Err(ExecutionError::OutputLimitExceeded { limit_bytes })` if
    /// accepting `data` would push the combined stdout+stderr total over
    /// `max_bytes`.  On error the buffer state is *not* modified and
    /// `is_limit_exceeded()` is set to `true`.
    pub fn write_stdout(&self, data: &[u8]) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        if inner.total_len() + data.len() > inner.max_bytes {
            inner.limit_exceeded = true;
            return Err(ExecutionError::OutputLimitExceeded {
                limit_bytes: inner.max_bytes,
            });
        }
        inner.stdout.extend_from_slice(data);
        Ok(())
    }

    /// Appends `data` to the stderr stream.
    ///
    /// Same limit semantics as [`write_stdout`](Self::write_stdout).
    pub fn write_stderr(&self, data: &[u8]) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        if inner.total_len() + data.len() > inner.max_bytes {
            inner.limit_exceeded = true;
            return Err(ExecutionError::OutputLimitExceeded {
                limit_bytes: inner.max_bytes,
            });
        }
        inner.stderr.extend_from_slice(data);
        Ok(())
    }

    /// Returns `true` if any write has been rejected due to the byte limit.
    pub fn is_limit_exceeded(&self) -> bool {
        let inner = self.inner.lock().expect("OutputBuffer mutex poisoned");
        inner.limit_exceeded
    }

    /// Consumes this handle and returns `(stdout, stderr)` as UTF-8 strings.
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement
    /// character (`\u{FFFD}`) via [`String::from_utf8_lossy`].
    ///
    /// If another `Arc` clone exists (e.g. the VM thread is still running after
    /// a timeout), this method falls back to locking the `Mutex` and cloning
    /// the byte vectors rather than panicking.
    pub fn into_strings(self) -> (String, String) {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => {
                // We are the sole owner — unwrap without locking.
                let inner = mutex.into_inner().expect("OutputBuffer mutex poisoned");
                (
                    String::from_utf8_lossy(&inner.stdout).into_owned(),
                    String::from_utf8_lossy(&inner.stderr).into_owned(),
                )
            }
            Err(arc) => {
                // Another clone exists (timeout path) — lock and clone the data.
                let inner = arc.lock().expect("OutputBuffer mutex poisoned");
                (
                    String::from_utf8_lossy(&inner.stdout).into_owned(),
                    String::from_utf8_lossy(&inner.stderr).into_owned(),
                )
            }
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

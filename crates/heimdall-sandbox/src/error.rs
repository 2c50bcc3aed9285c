//! Workspace-wide error type surfaced by every sandbox component.
//!
//! [`types::ExecutionError`](crate::types::ExecutionError) remains the
//! Python-specific, serde-tagged detail type (syntax/runtime/timeout/output-limit/
//! module-denied). [`SandboxError`] is the coarser kind every component — PathGuard,
//! QuotaKeeper, SecureFs, SyncEngine, PySupervisor, BashRunner, Coordinator — can
//! fail with, matching the error kinds named in the error-handling design.

use std::path::PathBuf;

use crate::types::ExecutionError;

/// Error kind surfaced by any sandbox component.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A normalized path leaves the virtual workspace root.
    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    /// A path or one of its ancestors resolves (via symlink) outside the workspace.
    #[error("symlink escapes the workspace: {0}")]
    SymlinkEscape(String),

    /// A single write would exceed the per-file size cap.
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge {
        /// Size of the rejected write, in bytes.
        size: u64,
        /// The configured per-file limit, in bytes.
        limit: u64,
    },

    /// A reservation would push the workspace past its total size cap.
    #[error("workspace full: reserving {requested} bytes would exceed the {limit} byte cap")]
    WorkspaceFull {
        /// Bytes requested by the reservation that was rejected.
        requested: u64,
        /// The configured workspace size cap, in bytes.
        limit: u64,
    },

    /// Python execution exceeded the configured wall-clock timeout.
    #[error("python execution timed out after {limit_ms} ms")]
    Timeout {
        /// The timeout that was exceeded, in milliseconds.
        limit_ms: u64,
    },

    /// The Python worker failed to start, crashed, or was killed for timeout.
    #[error("python worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// User Python code raised during execution; carries the structured detail.
    #[error("python execution error: {0:?}")]
    ExecutionError(ExecutionError),

    /// A bash command exited non-zero. Carried as a variant (not a hard error)
    /// for callers that want to distinguish engine failure from user-script failure;
    /// `BashRunner::execute` itself never returns this — it always returns a result
    /// with the nonzero `exit_code` populated, per spec.md 4.7.
    #[error("bash command exited with status {0}")]
    BashNonZero(i32),

    /// A malformed path: NUL bytes, empty string, or similar.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Any other I/O failure not covered by a named kind above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Human-readable message safe to return to a caller: never includes an
    /// absolute host path (which would leak `ROOT_REAL`), per spec.md 7.
    pub fn public_message(&self) -> String {
        match self {
            SandboxError::PathEscape(p) | SandboxError::SymlinkEscape(p) => {
                format!("{}: {}", self.kind_name(), sanitize_path(p))
            }
            other => other.to_string(),
        }
    }

    /// The semantic error kind name as used throughout spec.md 7.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SandboxError::PathEscape(_) => "PathEscape",
            SandboxError::SymlinkEscape(_) => "SymlinkEscape",
            SandboxError::FileTooLarge { .. } => "FileTooLarge",
            SandboxError::WorkspaceFull { .. } => "WorkspaceFull",
            SandboxError::Timeout { .. } => "Timeout",
            SandboxError::WorkerUnavailable(_) => "WorkerUnavailable",
            SandboxError::ExecutionError(_) => "ExecutionError",
            SandboxError::BashNonZero(_) => "BashNonZero",
            SandboxError::InvalidPath(_) => "InvalidPath",
            SandboxError::Io(_) => "Io",
        }
    }
}

/// Strip any absolute host path down to its workspace-relative tail so error
/// messages never leak `ROOT_REAL`.
fn sanitize_path(raw: &str) -> String {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<path>".to_string())
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_matches_spec_error_kinds() {
        assert_eq!(SandboxError::PathEscape("x".into()).kind_name(), "PathEscape");
        assert_eq!(
            SandboxError::SymlinkEscape("x".into()).kind_name(),
            "SymlinkEscape"
        );
        assert_eq!(
            SandboxError::FileTooLarge { size: 1, limit: 0 }.kind_name(),
            "FileTooLarge"
        );
        assert_eq!(
            SandboxError::WorkspaceFull { requested: 1, limit: 0 }.kind_name(),
            "WorkspaceFull"
        );
        assert_eq!(SandboxError::Timeout { limit_ms: 1 }.kind_name(), "Timeout");
        assert_eq!(
            SandboxError::WorkerUnavailable("x".into()).kind_name(),
            "WorkerUnavailable"
        );
        assert_eq!(SandboxError::BashNonZero(1).kind_name(), "BashNonZero");
        assert_eq!(SandboxError::InvalidPath("x".into()).kind_name(), "InvalidPath");
    }

    #[test]
    fn public_message_never_leaks_absolute_host_path() {
        let err = SandboxError::SymlinkEscape("/home/user/workspace/secret/evil".to_string());
        let msg = err.public_message();
        assert!(!msg.contains("/home/user/workspace"));
        assert!(msg.contains("evil"));
    }

    #[test]
    fn public_message_keeps_relative_path_as_is() {
        let err = SandboxError::PathEscape("../etc/passwd".to_string());
        let msg = err.public_message();
        assert!(msg.contains("../etc/passwd"));
    }
}

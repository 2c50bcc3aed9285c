//! heimdall-sandbox: a confined code-execution sandbox for AI agents.
//!
//! Exposes six tool entrypoints through [`Coordinator`] — `write_file`,
//! `read_file`, `list_files`, `delete_file`, `execute_python`, `execute_bash` —
//! backed by path confinement, workspace quota enforcement, a virtual
//! filesystem synchronized with the host, and two isolated execution engines
//! (an embedded Python VM and a sandboxed bash interpreter).

pub mod bash;
pub mod config;
pub mod coordinator;
pub(crate) mod engine;
pub mod error;
pub mod modules;
pub mod output;
pub mod path_guard;
pub mod quota;
pub mod secure_fs;
mod supervisor;
mod sync_engine;
pub mod types;
pub mod vfs;
mod worker;
pub mod wrap;

pub use bash::{BashExecutionResult, BashRunner};
pub use config::Config;
pub use coordinator::{Coordinator, FileEntry, PyExecutionResult};
pub use error::SandboxError;
pub use output::OutputBuffer;
pub use path_guard::{ConfinedPath, PathGuard, VROOT};
pub use quota::QuotaKeeper;
pub use secure_fs::{DirEntry, EntryKind, FileMeta, FileSystem, SecureFs};
pub use types::{
    ExecutionError, ExecutionResult, ExecutionSettings, DEFAULT_ALLOWED_MODULES,
};
pub use vfs::{VStat, VirtualFs};
pub use wrap::maybe_wrap_last_expr;

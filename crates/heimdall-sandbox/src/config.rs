//! Startup configuration: the environment-variable table from spec.md §6.
//!
//! `Config` is built once (`Config::from_env`) and handed to every component
//! as an immutable context value — no implicit globals, so tests can run
//! against distinct workspace roots in parallel (see spec.md §9).

use std::path::{Path, PathBuf};

const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_WORKSPACE_SIZE: u64 = 100 * 1024 * 1024;
const DEFAULT_PY_TIMEOUT_MS: u64 = 5000;

/// Immutable startup configuration shared by every sandbox component.
#[derive(Debug, Clone)]
pub struct Config {
    /// `ROOT`: the host workspace directory as configured (may contain `.`/`..`
    /// components if passed relative; see [`Config::workspace_real`] for the
    /// canonical form used in confinement checks).
    pub workspace: PathBuf,
    /// `ROOT_REAL`: `workspace` canonicalized once at startup.
    pub workspace_real: PathBuf,
    /// `MAX_FILE_SIZE`, in bytes.
    pub max_file_size: u64,
    /// `MAX_WORKSPACE_SIZE`, in bytes.
    pub max_workspace_size: u64,
    /// `PY_TIMEOUT_MS`, in milliseconds.
    pub py_timeout_ms: u64,
}

impl Config {
    /// Build configuration from the environment, creating the workspace
    /// directory if it does not yet exist. Invalid or non-positive values for
    /// the numeric settings fall back to their default with a warning,
    /// matching spec.md §6's "on invalid" column.
    pub fn from_env() -> std::io::Result<Self> {
        let workspace = std::env::var("HEIMDALL_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default().join("workspace"));

        std::fs::create_dir_all(&workspace)?;
        let workspace_real = workspace.canonicalize()?;

        Ok(Self {
            workspace,
            workspace_real,
            max_file_size: read_positive_u64_env(
                "HEIMDALL_MAX_FILE_SIZE",
                DEFAULT_MAX_FILE_SIZE,
            ),
            max_workspace_size: read_positive_u64_env(
                "HEIMDALL_MAX_WORKSPACE_SIZE",
                DEFAULT_MAX_WORKSPACE_SIZE,
            ),
            py_timeout_ms: read_positive_u64_env(
                "HEIMDALL_PYTHON_EXECUTION_TIMEOUT_MS",
                DEFAULT_PY_TIMEOUT_MS,
            ),
        })
    }

    /// Build configuration rooted at an explicit, already-existing directory,
    /// bypassing the environment. Used by tests that want an isolated
    /// `tempfile::tempdir()` workspace per test.
    pub fn for_workspace(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let workspace_real = root.canonicalize()?;
        Ok(Self {
            workspace: root.to_path_buf(),
            workspace_real,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_workspace_size: DEFAULT_MAX_WORKSPACE_SIZE,
            py_timeout_ms: DEFAULT_PY_TIMEOUT_MS,
        })
    }
}

fn read_positive_u64_env(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(v) if v > 0 => v,
            Ok(_) => {
                tracing::warn!(env = name, value = %raw, "non-positive value, using default");
                default
            }
            Err(_) => {
                tracing::warn!(env = name, value = %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_workspace_canonicalizes_and_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_workspace(dir.path()).unwrap();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.max_workspace_size, DEFAULT_MAX_WORKSPACE_SIZE);
        assert_eq!(config.py_timeout_ms, DEFAULT_PY_TIMEOUT_MS);
        assert!(config.workspace_real.is_absolute());
    }

    #[test]
    fn for_workspace_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/workspace");
        let config = Config::for_workspace(&nested).unwrap();
        assert!(config.workspace_real.is_dir());
    }

    #[test]
    fn read_positive_u64_env_falls_back_on_zero() {
        unsafe { std::env::set_var("HEIMDALL_TEST_ZERO_VAR", "0") };
        assert_eq!(read_positive_u64_env("HEIMDALL_TEST_ZERO_VAR", 42), 42);
        unsafe { std::env::remove_var("HEIMDALL_TEST_ZERO_VAR") };
    }

    #[test]
    fn read_positive_u64_env_falls_back_on_garbage() {
        unsafe { std::env::set_var("HEIMDALL_TEST_GARBAGE_VAR", "not-a-number") };
        assert_eq!(read_positive_u64_env("HEIMDALL_TEST_GARBAGE_VAR", 7), 7);
        unsafe { std::env::remove_var("HEIMDALL_TEST_GARBAGE_VAR") };
    }

    #[test]
    fn read_positive_u64_env_accepts_valid_value() {
        unsafe { std::env::set_var("HEIMDALL_TEST_VALID_VAR", "123") };
        assert_eq!(read_positive_u64_env("HEIMDALL_TEST_VALID_VAR", 7), 123);
        unsafe { std::env::remove_var("HEIMDALL_TEST_VALID_VAR") };
    }
}

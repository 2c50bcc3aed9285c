//! BashRunner: thin adapter around the bash engine, wired to [`SecureFs`] and
//! conservative resource limits (spec.md §4.7).

use std::sync::Arc;

use crate::error::SandboxError;
use crate::secure_fs::SecureFs;

/// Conservative bounds on adversarial bash workloads (spec.md §4.7): these
/// exist because `SecureFs` itself performs no quota or rate limiting.
const MAX_LOOP_ITERATIONS: u64 = 100_000;
const MAX_COMMAND_COUNT: u64 = 10_000;
const MAX_CALL_DEPTH: u32 = 64;

/// Result of a single bash invocation (spec.md §3).
#[derive(Debug, Clone)]
pub struct BashExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Adapter over `bashkit::Bash`, configured with a confined filesystem,
/// conservative execution limits, and no network access.
pub struct BashRunner {
    bash: bashkit::Bash,
}

impl BashRunner {
    pub fn new(guard: Arc<crate::path_guard::PathGuard>) -> Self {
        let fs: Arc<dyn bashkit::fs::FileSystem> = Arc::new(SecureFs::new(guard));
        let bash = bashkit::Bash::builder()
            .filesystem(fs)
            .max_loop_iterations(MAX_LOOP_ITERATIONS)
            .max_command_count(MAX_COMMAND_COUNT)
            .max_call_depth(MAX_CALL_DEPTH)
            .network(false)
            .build();
        Self { bash }
    }

    /// `execute(command, cwd?) -> {stdout, stderr, exit_code}` (spec.md §4.7).
    /// Errors from the engine itself (not user-code failures) surface as
    /// `exit_code = 1` with the engine's message on stderr.
    pub async fn execute(&self, command: &str, cwd: Option<&str>) -> BashExecutionResult {
        let outcome = match cwd {
            Some(cwd) => self.bash.exec_in(command, cwd).await,
            None => self.bash.exec(command).await,
        };

        match outcome {
            Ok(output) => BashExecutionResult {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
            },
            Err(e) => BashExecutionResult {
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: 1,
            },
        }
    }
}

impl std::fmt::Debug for BashRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BashRunner").finish_non_exhaustive()
    }
}

/// Validate a caller-provided `cwd` against the workspace before handing it
/// to the engine (spec.md §4.8 `execute_bash`: "Reject `cwd` that escapes
/// workspace").
pub fn validate_cwd(guard: &crate::path_guard::PathGuard, cwd: &str) -> Result<String, SandboxError> {
    let confined = guard.validate(cwd)?;
    Ok(confined.virt_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_guard::PathGuard;

    #[tokio::test]
    #[ignore = "requires a real bashkit backend"]
    async fn execute_runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path().canonicalize().unwrap()));
        let runner = BashRunner::new(guard);
        let result = runner.execute("echo hi", None).await;
        assert_eq!(result.stdout.trim(), "hi");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn validate_cwd_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(dir.path().canonicalize().unwrap());
        assert!(validate_cwd(&guard, "../etc").is_err());
    }

    #[test]
    fn validate_cwd_accepts_confined_path() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(dir.path().canonicalize().unwrap());
        assert!(validate_cwd(&guard, "sub").is_ok());
    }
}

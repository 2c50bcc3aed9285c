//! Module allowlist checker for embedded Python execution.
//!
//! Provides two public functions:
//! - [`check_module_allowed`] — verifies a module name against an allowlist `HashSet`.
//! - [`build_allowed_set`] — converts [`ExecutionSettings::allowed_modules`] into a
//!   `HashSet<String>` for O(1) per-import lookup.
//!
//! ## Special case: `os` / `os.path`
//!
//! Python's `os.path` is a submodule of `os`; importing `os.path` causes Python to
//! first load the `os` parent module.  To permit `import os.path` (which is in the
//! default allowlist) without also permitting a bare `import os`, the check grants
//! `"os"` whenever `"os.path"` is present in the allowlist.

use std::collections::HashSet;

use crate::types::{ExecutionError, ExecutionSettings};

/// Checks whether `module_name` is permitted by the given allowlist.
///
/// Returns `Ok(())` if the module is allowed, or
/// `Err(ExecutionError::ModuleNotAllowed { module_name })` if it is not.
///
/// # Special case
///
/// If `module_name` is `"os"` and `"os.path"` is present in `allowed_set`, the
/// function returns `Ok(())`.  This is required because Python automatically loads
/// the `os` parent when `import os.path` is executed.
pub fn check_module_allowed(
    module_name: &str,
    allowed_set: &HashSet<String>,
) -> Result<(), ExecutionError> {
    if allowed_set.contains(module_name) {
        return Ok(());
    }

    // Special case: allow bare "os" import when "os.path" is in the allowlist,
    // because Python's import machinery loads "os" as a side-effect of "os.path".
    if module_name == "os" && allowed_set.contains("os.path") {
        return Ok(());
    }

    Err(ExecutionError::ModuleNotAllowed {
        module_name: module_name.to_string(),
    })
}

/// Builds a `HashSet<String>` from [`ExecutionSettings::allowed_modules`] for
/// O(1) per-import lookup during Python execution.
pub fn build_allowed_set(settings: &ExecutionSettings) -> HashSet<String> {
    settings.allowed_modules.iter().cloned().collect()
}

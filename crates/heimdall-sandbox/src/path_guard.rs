//! Path confinement: normalize and realpath-validate every caller-provided
//! path, rejecting `..`/absolute-path/symlink escapes (spec.md §4.1).
//!
//! The resolution strategy — canonicalize the nearest existing ancestor and
//! verify it sits under the workspace root before rebuilding the remaining
//! path components — mirrors the non-existing-path handling in the
//! confinement helpers this crate was grounded on (host-root validators that
//! walk up to an existing ancestor rather than failing outright on a path
//! that doesn't exist yet).

use std::path::{Component, Path, PathBuf};

use crate::error::SandboxError;

/// Fixed virtual root inside the embedded Python engine's in-memory filesystem.
pub const VROOT: &str = "/workspace";

/// Turns caller-provided path strings into confined, realpath-validated host paths.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root_real: PathBuf,
}

/// Outcome of a successful [`PathGuard::validate`] call.
#[derive(Debug, Clone)]
pub struct ConfinedPath {
    /// Normalized path relative to `VROOT`, e.g. `/workspace/a/b.txt`.
    pub virt_path: String,
    /// Confined absolute host path (not yet guaranteed to exist).
    pub host_path: PathBuf,
}

impl PathGuard {
    /// Build a guard over `ROOT_REAL`. Callers pass the already-canonicalized
    /// workspace root (see [`crate::config::Config::workspace_real`]).
    pub fn new(root_real: PathBuf) -> Self {
        Self { root_real }
    }

    pub fn root_real(&self) -> &Path {
        &self.root_real
    }

    /// spec.md §4.1 steps 1-7: normalize, confine to `VROOT`, realpath-validate.
    pub fn validate(&self, input: &str) -> Result<ConfinedPath, SandboxError> {
        let virt_path = normalize_virtual(input)?;
        let host_path = self.host_of(&virt_path);
        let real = self.resolve_confined(&host_path)?;
        Ok(ConfinedPath {
            virt_path,
            host_path: real,
        })
    }

    /// Validate only the *parent* of `input`, per spec.md §4.1's lstat/readlink/
    /// remove-symlink special cases: the leaf itself (a symlink) is not
    /// dereferenced, only its containing directory is confinement-checked.
    pub fn validate_parent_only(&self, input: &str) -> Result<ConfinedPath, SandboxError> {
        let virt_path = normalize_virtual(input)?;
        let host_path = self.host_of(&virt_path);
        let parent = host_path
            .parent()
            .ok_or_else(|| SandboxError::InvalidPath(input.to_string()))?;
        self.resolve_confined(parent)?;
        Ok(ConfinedPath {
            virt_path,
            host_path,
        })
    }

    /// Validate a symlink target resolved relative to `link_virt`'s parent
    /// directory (spec.md §4.1 "symlink creation" special case). Rejects the
    /// target if it would escape even though the link itself is confined.
    pub fn validate_symlink_target(
        &self,
        link_virt: &str,
        target: &str,
    ) -> Result<PathBuf, SandboxError> {
        let link = normalize_virtual(link_virt)?;
        let link_host = self.host_of(&link);
        let link_parent = link_host
            .parent()
            .ok_or_else(|| SandboxError::InvalidPath(link_virt.to_string()))?;

        let target_path = Path::new(target);
        let resolved = if target_path.is_absolute() {
            target_path.to_path_buf()
        } else {
            link_parent.join(target_path)
        };

        let collapsed = collapse_components(&resolved)
            .map_err(|_| SandboxError::PathEscape(target.to_string()))?;
        self.resolve_confined(&collapsed)
    }

    fn host_of(&self, virt_path: &str) -> PathBuf {
        let suffix = virt_path
            .strip_prefix(VROOT)
            .unwrap_or(virt_path)
            .trim_start_matches('/');
        if suffix.is_empty() {
            self.root_real.clone()
        } else {
            self.root_real.join(suffix)
        }
    }

    /// Realpath-validate `host_path`: resolve the nearest existing ancestor,
    /// canonicalize it, confirm it is inside `root_real`, then rebuild the
    /// non-existing tail (spec.md §4.1 steps 5-7).
    fn resolve_confined(&self, host_path: &Path) -> Result<PathBuf, SandboxError> {
        if host_path.exists() {
            let real = host_path.canonicalize()?;
            return self.require_inside_root(real);
        }

        let mut ancestor = host_path.to_path_buf();
        let mut remaining: Vec<std::ffi::OsString> = Vec::new();
        loop {
            if ancestor.exists() {
                break;
            }
            match ancestor.file_name() {
                Some(name) => remaining.push(name.to_os_string()),
                None => return Err(SandboxError::InvalidPath(host_path.display().to_string())),
            }
            if !ancestor.pop() {
                return Err(SandboxError::InvalidPath(host_path.display().to_string()));
            }
        }

        let ancestor_real = ancestor.canonicalize()?;
        let ancestor_real = self.require_inside_root(ancestor_real)?;

        let mut rebuilt = ancestor_real;
        for part in remaining.into_iter().rev() {
            if part == ".." {
                return Err(SandboxError::PathEscape(host_path.display().to_string()));
            }
            rebuilt.push(part);
        }
        Ok(rebuilt)
    }

    fn require_inside_root(&self, real: PathBuf) -> Result<PathBuf, SandboxError> {
        if real == self.root_real || real.starts_with(&self.root_real) {
            Ok(real)
        } else {
            tracing::debug!(path = %real.display(), "symlink escape detected");
            Err(SandboxError::SymlinkEscape(real.display().to_string()))
        }
    }
}

/// POSIX-style normalization against `VROOT`: accepts either a path already
/// prefixed with `VROOT` or one relative to it, collapses `.`/`..` segments,
/// and rejects NUL bytes and any escape past `VROOT` (spec.md §4.1 steps 1-4).
fn normalize_virtual(input: &str) -> Result<String, SandboxError> {
    if input.is_empty() {
        return Err(SandboxError::InvalidPath("empty path".to_string()));
    }
    if input.contains('\0') {
        return Err(SandboxError::InvalidPath("NUL byte in path".to_string()));
    }

    let relative_to_vroot = input
        .strip_prefix(VROOT)
        .unwrap_or(input)
        .trim_start_matches('/');

    let mut stack: Vec<&str> = Vec::new();
    for segment in relative_to_vroot.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(SandboxError::PathEscape(input.to_string()));
                }
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        Ok(VROOT.to_string())
    } else {
        Ok(format!("{VROOT}/{}", stack.join("/")))
    }
}

/// Lexical `.`/`..` collapse for a host path that may not exist yet, used by
/// [`PathGuard::validate_symlink_target`] as a cheap pre-check before realpath
/// resolution. Fails if the collapse would walk above the filesystem root.
fn collapse_components(path: &Path) -> Result<PathBuf, ()> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return Err(());
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

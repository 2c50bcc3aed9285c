//! In-memory virtual filesystem mounted at [`crate::path_guard::VROOT`],
//! standing in for "the embedded Python-in-WASM engine's in-memory FS" that
//! spec.md §3/§6 treats as an opaque collaborator. The core still has to
//! *drive* that collaborator's eight FS operations (`mkdir-tree`,
//! `write-file`, `read-file`, `stat`, `is-directory`, `readdir`, `unlink`,
//! `rmdir`), so this module provides a minimal tree that implements exactly
//! those, shared between whichever `PyWorker` is alive and the `SyncEngine`
//! (see `SPEC_FULL.md`, "Supplemented features").

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::SandboxError;
use crate::path_guard::VROOT;

#[derive(Debug)]
enum VNode {
    File(Vec<u8>),
    Dir(BTreeMap<String, VNode>),
}

impl VNode {
    fn new_dir() -> Self {
        VNode::Dir(BTreeMap::new())
    }
}

/// Metadata about a virtual path, mirroring the `stat`/`is-directory`
/// capabilities spec.md §6 requires of the embedded engine's virtual FS.
#[derive(Debug, Clone, Copy)]
pub struct VStat {
    pub is_dir: bool,
    pub len: u64,
}

/// The embedded engine's in-memory filesystem, mounted at `VROOT`.
pub struct VirtualFs {
    root: Mutex<VNode>,
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFs {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(VNode::new_dir()),
        }
    }

    /// `mkdir-tree`: create every missing directory component. Creating a
    /// directory that already exists is not an error (spec.md §4.4).
    pub fn mkdir_tree(&self, path: &str) -> Result<(), SandboxError> {
        let parts = split_virtual(path)?;
        let mut root = self.root.lock().expect("VirtualFs mutex poisoned");
        let mut node = &mut *root;
        for part in parts {
            let dir = as_dir_mut(node, path)?;
            node = dir.entry(part.to_string()).or_insert_with(VNode::new_dir);
        }
        as_dir_mut(node, path)?;
        Ok(())
    }

    /// `write-file`: create parent directories, then write bytes, replacing
    /// any existing file at that path.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<(), SandboxError> {
        let parts = split_virtual(path)?;
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(SandboxError::InvalidPath(format!("cannot write to {VROOT}")));
        };
        let mut root = self.root.lock().expect("VirtualFs mutex poisoned");
        let mut node = &mut *root;
        for part in parents {
            let dir = as_dir_mut(node, path)?;
            node = dir.entry(part.to_string()).or_insert_with(VNode::new_dir);
        }
        let dir = as_dir_mut(node, path)?;
        dir.insert(leaf.to_string(), VNode::File(data.to_vec()));
        Ok(())
    }

    /// `read-file`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        let root = self.root.lock().expect("VirtualFs mutex poisoned");
        match self.lookup(&root, path)? {
            VNode::File(bytes) => Ok(bytes.clone()),
            VNode::Dir(_) => Err(SandboxError::InvalidPath(format!("{path} is a directory"))),
        }
    }

    /// `stat`.
    pub fn stat(&self, path: &str) -> Result<VStat, SandboxError> {
        let root = self.root.lock().expect("VirtualFs mutex poisoned");
        match self.lookup(&root, path)? {
            VNode::File(bytes) => Ok(VStat {
                is_dir: false,
                len: bytes.len() as u64,
            }),
            VNode::Dir(_) => Ok(VStat { is_dir: true, len: 0 }),
        }
    }

    /// `is-directory`.
    pub fn is_directory(&self, path: &str) -> bool {
        self.stat(path).map(|s| s.is_dir).unwrap_or(false)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// `readdir`: entry names only, `.`/`..` excluded by construction.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, SandboxError> {
        let root = self.root.lock().expect("VirtualFs mutex poisoned");
        match self.lookup(&root, path)? {
            VNode::Dir(children) => Ok(children.keys().cloned().collect()),
            VNode::File(_) => Err(SandboxError::InvalidPath(format!("{path} is not a directory"))),
        }
    }

    /// `unlink`: remove a file entry.
    pub fn unlink(&self, path: &str) -> Result<(), SandboxError> {
        let parts = split_virtual(path)?;
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(SandboxError::InvalidPath(format!("cannot unlink {VROOT}")));
        };
        let mut root = self.root.lock().expect("VirtualFs mutex poisoned");
        let mut node = &mut *root;
        for part in parents {
            node = match node {
                VNode::Dir(children) => children
                    .get_mut(*part)
                    .ok_or_else(|| SandboxError::InvalidPath(path.to_string()))?,
                VNode::File(_) => return Err(SandboxError::InvalidPath(path.to_string())),
            };
        }
        match node {
            VNode::Dir(children) => match children.get(*leaf) {
                Some(VNode::File(_)) => {
                    children.remove(*leaf);
                    Ok(())
                }
                _ => Err(SandboxError::InvalidPath(path.to_string())),
            },
            VNode::File(_) => Err(SandboxError::InvalidPath(path.to_string())),
        }
    }

    /// `rmdir`: remove an empty directory entry.
    pub fn rmdir(&self, path: &str) -> Result<(), SandboxError> {
        let parts = split_virtual(path)?;
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(SandboxError::InvalidPath(format!("cannot remove {VROOT}")));
        };
        let mut root = self.root.lock().expect("VirtualFs mutex poisoned");
        let mut node = &mut *root;
        for part in parents {
            node = match node {
                VNode::Dir(children) => children
                    .get_mut(*part)
                    .ok_or_else(|| SandboxError::InvalidPath(path.to_string()))?,
                VNode::File(_) => return Err(SandboxError::InvalidPath(path.to_string())),
            };
        }
        match node {
            VNode::Dir(children) => match children.get(*leaf) {
                Some(VNode::Dir(grandchildren)) if grandchildren.is_empty() => {
                    children.remove(*leaf);
                    Ok(())
                }
                Some(VNode::Dir(_)) => {
                    Err(SandboxError::InvalidPath(format!("{path} is not empty")))
                }
                _ => Err(SandboxError::InvalidPath(path.to_string())),
            },
            VNode::File(_) => Err(SandboxError::InvalidPath(path.to_string())),
        }
    }

    fn lookup<'a>(&self, root: &'a VNode, path: &str) -> Result<&'a VNode, SandboxError> {
        let parts = split_virtual(path)?;
        let mut node = root;
        for part in parts {
            node = match node {
                VNode::Dir(children) => children
                    .get(part)
                    .ok_or_else(|| SandboxError::InvalidPath(path.to_string()))?,
                VNode::File(_) => return Err(SandboxError::InvalidPath(path.to_string())),
            };
        }
        Ok(node)
    }
}

fn as_dir_mut<'a>(node: &'a mut VNode, path: &str) -> Result<&'a mut BTreeMap<String, VNode>, SandboxError> {
    match node {
        VNode::Dir(children) => Ok(children),
        VNode::File(_) => Err(SandboxError::InvalidPath(format!("{path}: not a directory"))),
    }
}

fn split_virtual(path: &str) -> Result<Vec<&str>, SandboxError> {
    let suffix = path.strip_prefix(VROOT).unwrap_or(path);
    Ok(suffix
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect())
}

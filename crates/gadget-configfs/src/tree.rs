//! Typed access to one gadget's configfs tree

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{ConfigFsBackend, Entry, EntryKind, child_path};
use crate::{GadgetError, GadgetResult};

/// Handle to a directory in the tree. Holding one does not imply it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    path: PathBuf,
}

impl Node {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

pub struct GadgetTree {
    backend: Arc<dyn ConfigFsBackend>,
    root: Node,
}

impl fmt::Debug for GadgetTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GadgetTree")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GadgetTree {
    /// # Errors
    ///
    /// [`GadgetError::InvalidConfig`] if `name` is not a single path component.
    pub fn new(
        backend: Arc<dyn ConfigFsBackend>,
        configfs_root: &Path,
        name: &str,
    ) -> GadgetResult<Self> {
        let path = child_path(configfs_root, name)
            .map_err(|e| GadgetError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            backend,
            root: Node { path },
        })
    }

    pub fn backend(&self) -> &Arc<dyn ConfigFsBackend> {
        &self.backend
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.backend.exists(self.root.path())
    }

    pub fn functions(&self) -> Node {
        self.fixed_child(&self.root, "functions")
    }

    pub fn configs(&self) -> Node {
        self.fixed_child(&self.root, "configs")
    }

    pub fn strings(&self) -> Node {
        self.fixed_child(&self.root, "strings")
    }

    fn fixed_child(&self, parent: &Node, name: &'static str) -> Node {
        Node {
            path: parent.path.join(name),
        }
    }

    /// Handle to `parent/name` without touching the filesystem.
    ///
    /// # Errors
    ///
    /// [`GadgetError::InvalidConfig`] for names containing `/` or `..`.
    pub fn child(&self, parent: &Node, name: &str) -> GadgetResult<Node> {
        let path = child_path(&parent.path, name)
            .map_err(|e| GadgetError::InvalidConfig(e.to_string()))?;
        Ok(Node { path })
    }

    /// Create the root directory if it is missing.
    pub fn create_root(&self) -> GadgetResult<()> {
        if !self.exists() {
            debug!(path = %self.root, "mkdir");
            self.backend
                .create_dir(self.root.path())
                .map_err(|e| GadgetError::fs("create", self.root.path(), e))?;
        }
        Ok(())
    }

    /// Return `parent/name`, creating the directory if it is missing.
    pub fn ensure_dir(&self, parent: &Node, name: &str) -> GadgetResult<Node> {
        let node = self.child(parent, name)?;
        if !self.backend.exists(node.path()) {
            debug!(path = %node, "mkdir");
            self.backend
                .create_dir(node.path())
                .map_err(|e| GadgetError::fs("create", node.path(), e))?;
        }
        Ok(node)
    }

    pub fn remove_dir(&self, node: &Node) -> GadgetResult<()> {
        debug!(path = %node, "rmdir");
        self.backend
            .remove_dir(node.path())
            .map_err(|e| GadgetError::fs("remove", node.path(), e))
    }

    pub fn get_attribute_bytes(&self, node: &Node, name: &str) -> GadgetResult<Vec<u8>> {
        let path = self.child(node, name)?.path;
        self.backend
            .read_attribute(&path)
            .map_err(|e| GadgetError::fs("read", path, e))
    }

    /// Attribute value as text with the kernel's trailing newline removed.
    pub fn get_attribute(&self, node: &Node, name: &str) -> GadgetResult<String> {
        let bytes = self.get_attribute_bytes(node, name)?;
        Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
    }

    pub fn set_attribute(
        &self,
        node: &Node,
        name: &str,
        value: impl AsRef<[u8]>,
    ) -> GadgetResult<()> {
        let path = self.child(node, name)?.path;
        let value = value.as_ref();
        match std::str::from_utf8(value) {
            Ok(text) => debug!(path = %path.display(), value = ?text, "write"),
            Err(_) => debug!(path = %path.display(), bytes = value.len(), "write"),
        }
        self.backend
            .write_attribute(&path, value)
            .map_err(|e| GadgetError::fs("write", path, e))
    }

    /// Link `function` into `config` under the function's own name.
    pub fn link(&self, function: &Node, config: &Node) -> GadgetResult<()> {
        let link = self.child(config, function.name())?;
        debug!(target = %function, link = %link, "symlink");
        self.backend
            .symlink(function.path(), link.path())
            .map_err(|e| GadgetError::fs("link", link.path(), e))
    }

    pub fn unlink(&self, function_name: &str, config: &Node) -> GadgetResult<()> {
        let link = self.child(config, function_name)?;
        debug!(link = %link, "unlink");
        self.backend
            .remove_symlink(link.path())
            .map_err(|e| GadgetError::fs("unlink", link.path(), e))
    }

    pub fn entries(&self, node: &Node) -> GadgetResult<Vec<Entry>> {
        self.backend
            .read_dir(node.path())
            .map_err(|e| GadgetError::fs("list", node.path(), e))
    }

    /// Subdirectories of `node` as handles.
    pub fn subdirs(&self, node: &Node) -> GadgetResult<Vec<Node>> {
        self.entries_of_kind(node, EntryKind::Directory)
    }

    /// Names of the symlinks in `node`.
    pub fn links(&self, node: &Node) -> GadgetResult<Vec<String>> {
        Ok(self
            .entries(node)?
            .into_iter()
            .filter(|e| e.kind == EntryKind::Symlink)
            .map(|e| e.name)
            .collect())
    }

    fn entries_of_kind(&self, node: &Node, kind: EntryKind) -> GadgetResult<Vec<Node>> {
        self.entries(node)?
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| self.child(node, &e.name))
            .collect()
    }

    /// Read a file outside the gadget tree (sysfs, uevent files).
    pub fn read_external(&self, path: &Path) -> GadgetResult<String> {
        let bytes = self
            .backend
            .read_attribute(path)
            .map_err(|e| GadgetError::fs("read", path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

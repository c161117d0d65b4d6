//! Filesystem backend
//!
//! configfs is driven entirely through ordinary filesystem calls, but the
//! kernel gives them side effects: `mkdir` of a gadget creates default groups,
//! writing `UDC` binds hardware, `rmdir` refuses while links remain. The
//! manager only talks to a [`ConfigFsBackend`], so the same code runs against
//! the real kernel ([`SysFs`]) and against [`crate::mock::MemoryConfigFs`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    Attribute,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

pub trait ConfigFsBackend: Send + Sync {
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove one directory. Kernel-created contents go with it; anything
    /// user-created must be removed first.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn read_attribute(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write an existing attribute in a single `write(2)`. Never creates files.
    fn write_attribute(&self, path: &Path, value: &[u8]) -> io::Result<()>;

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn remove_symlink(&self, link: &Path) -> io::Result<()>;

    /// Immediate children of `path`, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>>;

    /// True when anything, including a dangling symlink, exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysFs;

impl ConfigFsBackend for SysFs {
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn read_attribute(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_attribute(&self, path: &Path, value: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(value)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn remove_symlink(&self, link: &Path) -> io::Result<()> {
        fs::remove_file(link)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Attribute
            };
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
}

/// `parent/name`, rejecting names that would escape `parent`.
pub(crate) fn child_path(parent: &Path, name: &str) -> io::Result<PathBuf> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid entry name {name:?}"),
        ));
    }
    Ok(parent.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysfs_round_trip_on_plain_files() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let fs = SysFs;
        let gadget = dir.path().join("g");

        fs.create_dir(&gadget)?;
        std::fs::write(gadget.join("idVendor"), b"")?;
        fs.write_attribute(&gadget.join("idVendor"), b"0x1d6b\n")?;
        assert_eq!(fs.read_attribute(&gadget.join("idVendor"))?, b"0x1d6b\n");

        fs.create_dir(&gadget.join("functions"))?;
        fs.symlink(&gadget.join("functions"), &gadget.join("link"))?;
        let entries = fs.read_dir(&gadget)?;
        let kinds: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("functions", EntryKind::Directory),
                ("idVendor", EntryKind::Attribute),
                ("link", EntryKind::Symlink),
            ]
        );

        fs.remove_symlink(&gadget.join("link"))?;
        assert!(!fs.exists(&gadget.join("link")));
        Ok(())
    }

    #[test]
    fn test_sysfs_write_never_creates() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = SysFs.write_attribute(&dir.path().join("missing"), b"1");
        assert_eq!(err.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
        Ok(())
    }

    #[test]
    fn test_sysfs_set_mode() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let node = dir.path().join("hidg0");
        std::fs::write(&node, b"")?;
        SysFs.set_mode(&node, 0o666)?;
        let mode = std::fs::metadata(&node)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o666);
        Ok(())
    }

    #[test]
    fn test_child_path_rejects_traversal() {
        assert!(child_path(Path::new("/a"), "..").is_err());
        assert!(child_path(Path::new("/a"), "b/c").is_err());
        assert!(child_path(Path::new("/a"), "").is_err());
        assert_eq!(
            child_path(Path::new("/a"), "hid.mouse").ok(),
            Some(PathBuf::from("/a/hid.mouse"))
        );
    }
}

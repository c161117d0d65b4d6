//! In-memory stand-ins for configfs and host services
//!
//! [`MemoryConfigFs`] reproduces the parts of the kernel's configfs behaviour
//! the manager relies on:
//!
//! | operation                           | kernel behaviour reproduced                        |
//! |-------------------------------------|----------------------------------------------------|
//! | `mkdir <gadget>`                    | default groups and device attributes appear        |
//! | `mkdir configs/<label>.<n>`         | `strings` group, `MaxPower`, `bmAttributes`        |
//! | `mkdir strings/<lang>`              | string attributes appear                           |
//! | `mkdir functions/hid.<x>`           | HID attributes, `dev`, sysfs char entry, `/dev/hidgN` |
//! | `mkdir functions/acm.<x>`           | `port_num`                                         |
//! | write to a missing attribute        | `ENOENT`                                           |
//! | write HID attribute once linked     | `EBUSY`                                            |
//! | write `UDC`                         | bind against listed controllers, `EBUSY` if bound  |
//! | link/unlink while bound             | `EBUSY`                                            |
//! | `rmdir` of a default group          | `EPERM`                                            |
//! | `rmdir` with user content left      | `ENOTEMPTY`                                        |
//! | `rmdir` of a linked function        | `EBUSY`                                            |
//!
//! Paths outside the configfs root behave like a plain filesystem.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;

use crate::GadgetResult;
use crate::backend::{ConfigFsBackend, Entry, EntryKind};
use crate::config::GadgetPaths;
use crate::host::HostServices;

const HIDG_MAJOR: u32 = 240;
const ENODEV: i32 = 19;

#[derive(Debug, Clone)]
enum Node {
    Dir { default_group: bool },
    File { data: Vec<u8>, mode: u32 },
    Link { target: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location<'p> {
    Root,
    Gadget(&'p str),
    GadgetStrings,
    Config,
    ConfigStrings,
    Function(&'p str),
    Inside(&'p str),
    Outside,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    next_minor: u32,
    next_acm_port: u32,
    binds: usize,
    writes: Vec<(PathBuf, Vec<u8>)>,
}

impl State {
    fn dir(&mut self, path: PathBuf, default_group: bool) {
        self.nodes.insert(path, Node::Dir { default_group });
    }

    fn file(&mut self, path: PathBuf, data: &[u8]) {
        self.nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                mode: 0o644,
            },
        );
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir { .. }))
    }

    fn text(&self, path: &Path) -> Option<String> {
        match self.nodes.get(path) {
            Some(Node::File { data, .. }) => {
                Some(String::from_utf8_lossy(data).trim().to_string())
            }
            _ => None,
        }
    }

    fn is_link_target(&self, path: &Path) -> bool {
        self.nodes
            .values()
            .any(|node| matches!(node, Node::Link { target } if target == path))
    }
}

/// In-memory configfs with sysfs and `/dev` entries for HID functions.
#[derive(Debug)]
pub struct MemoryConfigFs {
    paths: GadgetPaths,
    state: Mutex<State>,
}

fn error(kind: io::ErrorKind, path: &Path) -> io::Error {
    io::Error::new(kind, path.display().to_string())
}

fn name_of(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

impl MemoryConfigFs {
    /// Empty configfs, UDC class, char-dev map and `/dev` at `paths`.
    pub fn new(paths: GadgetPaths) -> Self {
        let mut state = State::default();
        for root in [
            &paths.configfs_root,
            &paths.udc_root,
            &paths.dev_char_root,
            &paths.dev_root,
        ] {
            for dir in root.ancestors() {
                state.dir(dir.to_path_buf(), false);
            }
        }
        Self {
            paths,
            state: Mutex::new(state),
        }
    }

    pub fn with_controller(self, name: &str) -> Self {
        self.add_controller(name);
        self
    }

    pub fn add_controller(&self, name: &str) {
        let path = self.paths.udc_root.join(name);
        self.state.lock().dir(path, false);
    }

    pub fn paths(&self) -> &GadgetPaths {
        &self.paths
    }

    /// Successful `UDC` binds so far.
    pub fn bind_count(&self) -> usize {
        self.state.lock().binds
    }

    /// Every attribute write attempted, in order, including rejected ones.
    pub fn writes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    pub fn mode(&self, path: &Path) -> Option<u32> {
        match self.state.lock().nodes.get(path) {
            Some(Node::File { mode, .. }) => Some(*mode),
            _ => None,
        }
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.state.lock().nodes.get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Plain file outside the kernel-managed hierarchy, for test fixtures.
    pub fn insert_file(&self, path: &Path, data: &[u8]) {
        self.state.lock().file(path.to_path_buf(), data);
    }

    fn locate<'p>(&self, path: &'p Path) -> Location<'p> {
        let Ok(rel) = path.strip_prefix(&self.paths.configfs_root) else {
            return Location::Outside;
        };
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        match *parts.as_slice() {
            [] => Location::Root,
            [gadget] => Location::Gadget(gadget),
            [_, "strings", _] => Location::GadgetStrings,
            [_, "configs", _] => Location::Config,
            [_, "configs", _, "strings", _] => Location::ConfigStrings,
            [gadget, "functions", _] => Location::Function(gadget),
            [gadget, ..] => Location::Inside(gadget),
        }
    }

    fn gadget_of<'p>(&self, path: &'p Path) -> Option<&'p str> {
        let rel = path.strip_prefix(&self.paths.configfs_root).ok()?;
        match rel.components().next()? {
            Component::Normal(part) => part.to_str(),
            _ => None,
        }
    }

    fn bound_udc(&self, state: &State, gadget: &str) -> Option<String> {
        let udc = self.paths.configfs_root.join(gadget).join("UDC");
        state.text(&udc).filter(|name| !name.is_empty())
    }

    fn create_gadget(state: &mut State, path: &Path) {
        state.dir(path.to_path_buf(), false);
        for group in ["functions", "configs", "strings", "os_desc"] {
            state.dir(path.join(group), true);
        }
        for attr in ["idVendor", "idProduct", "bcdDevice", "bcdUSB"] {
            state.file(path.join(attr), b"0x0000\n");
        }
        state.file(path.join("UDC"), b"\n");
    }

    fn create_function(&self, state: &mut State, path: &Path) -> io::Result<()> {
        let (driver, instance) = name_of(path)
            .split_once('.')
            .filter(|(driver, instance)| !driver.is_empty() && !instance.is_empty())
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, path))?;
        match driver {
            "hid" => {
                let minor = state.next_minor;
                state.next_minor = minor.saturating_add(1);
                state.dir(path.to_path_buf(), false);
                for attr in ["protocol", "subclass", "report_length"] {
                    state.file(path.join(attr), b"0\n");
                }
                state.file(path.join("report_desc"), b"");
                let dev = format!("{HIDG_MAJOR}:{minor}");
                state.file(path.join("dev"), format!("{dev}\n").as_bytes());

                let devname = format!("hidg{minor}");
                let sys_entry = self.paths.dev_char_root.join(&dev);
                state.dir(sys_entry.clone(), false);
                state.file(
                    sys_entry.join("uevent"),
                    format!("MAJOR={HIDG_MAJOR}\nMINOR={minor}\nDEVNAME={devname}\n").as_bytes(),
                );
                state.nodes.insert(
                    self.paths.dev_root.join(devname),
                    Node::File {
                        data: Vec::new(),
                        mode: 0o600,
                    },
                );
            }
            "acm" => {
                let port = state.next_acm_port;
                state.next_acm_port = port.saturating_add(1);
                state.dir(path.to_path_buf(), false);
                state.file(path.join("port_num"), format!("{port}\n").as_bytes());
            }
            "ffs" => state.dir(path.to_path_buf(), false),
            _ => {
                tracing::trace!(driver, instance, "unknown function driver");
                return Err(error(io::ErrorKind::NotFound, path));
            }
        }
        Ok(())
    }

    fn release_hid_nodes(&self, state: &mut State, function: &Path) {
        let Some(dev) = state.text(&function.join("dev")) else {
            return;
        };
        let sys_entry = self.paths.dev_char_root.join(&dev);
        let devname = state
            .text(&sys_entry.join("uevent"))
            .and_then(|uevent| {
                uevent
                    .lines()
                    .find_map(|line| line.strip_prefix("DEVNAME=").map(str::to_string))
            });
        state.nodes.retain(|p, _| !p.starts_with(&sys_entry));
        if let Some(devname) = devname {
            state.nodes.remove(&self.paths.dev_root.join(devname));
        }
    }

    fn write_udc(&self, state: &mut State, gadget: &str, value: &[u8], path: &Path) -> io::Result<()> {
        let requested = String::from_utf8_lossy(value).trim().to_string();
        let current = self.bound_udc(state, gadget);

        if requested.is_empty() {
            if current.is_none() {
                return Err(io::Error::from_raw_os_error(ENODEV));
            }
            state.file(path.to_path_buf(), b"\n");
            return Ok(());
        }

        if current.is_some() {
            return Err(error(io::ErrorKind::ResourceBusy, path));
        }
        if !state.is_dir(&self.paths.udc_root.join(&requested)) {
            return Err(io::Error::from_raw_os_error(ENODEV));
        }
        let taken = state.nodes.keys().any(|p| {
            self.gadget_of(p).is_some_and(|other| other != gadget)
                && name_of(p) == "UDC"
                && state.text(p).as_deref() == Some(requested.as_str())
        });
        if taken {
            return Err(error(io::ErrorKind::ResourceBusy, path));
        }
        let configs = self.paths.configfs_root.join(gadget).join("configs");
        let has_function = state.nodes.iter().any(|(p, node)| {
            matches!(node, Node::Link { .. }) && p.starts_with(&configs)
        });
        if !has_function {
            return Err(error(io::ErrorKind::InvalidInput, path));
        }

        state.file(path.to_path_buf(), format!("{requested}\n").as_bytes());
        state.binds = state.binds.saturating_add(1);
        Ok(())
    }
}

impl ConfigFsBackend for MemoryConfigFs {
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(path) {
            return Err(error(io::ErrorKind::AlreadyExists, path));
        }
        let parent = path
            .parent()
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, path))?;
        match state.nodes.get(parent) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(error(io::ErrorKind::NotADirectory, parent)),
            None => return Err(error(io::ErrorKind::NotFound, parent)),
        }

        match self.locate(path) {
            Location::Gadget(_) => Self::create_gadget(&mut state, path),
            Location::GadgetStrings | Location::ConfigStrings => {
                let lang = name_of(path);
                let valid = lang
                    .strip_prefix("0x")
                    .is_some_and(|hex| u16::from_str_radix(hex, 16).is_ok());
                if !valid {
                    return Err(error(io::ErrorKind::InvalidInput, path));
                }
                state.dir(path.to_path_buf(), false);
                let attrs: &[&str] = if self.locate(path) == Location::GadgetStrings {
                    &["serialnumber", "manufacturer", "product"]
                } else {
                    &["configuration"]
                };
                for attr in attrs {
                    state.file(path.join(attr), b"\n");
                }
            }
            Location::Config => {
                let valid = name_of(path)
                    .rsplit_once('.')
                    .is_some_and(|(label, n)| !label.is_empty() && n.parse::<u8>().is_ok());
                if !valid {
                    return Err(error(io::ErrorKind::InvalidInput, path));
                }
                state.dir(path.to_path_buf(), false);
                state.dir(path.join("strings"), true);
                state.file(path.join("MaxPower"), b"2\n");
                state.file(path.join("bmAttributes"), b"0x80\n");
            }
            Location::Function(_) => self.create_function(&mut state, path)?,
            Location::Root | Location::Inside(_) => {
                return Err(error(io::ErrorKind::PermissionDenied, path));
            }
            Location::Outside => state.dir(path.to_path_buf(), false),
        }
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::Dir {
                default_group: false,
            }) => {}
            Some(Node::Dir {
                default_group: true,
            }) => return Err(error(io::ErrorKind::PermissionDenied, path)),
            Some(_) => return Err(error(io::ErrorKind::NotADirectory, path)),
            None => return Err(error(io::ErrorKind::NotFound, path)),
        }

        let location = self.locate(path);
        if location == Location::Root {
            return Err(error(io::ErrorKind::PermissionDenied, path));
        }
        let configfs = location != Location::Outside;
        let has_user_content = state
            .nodes
            .iter()
            .filter(|(p, _)| p.starts_with(path) && p.as_path() != path)
            .any(|(_, node)| {
                !configfs
                    || matches!(
                        node,
                        Node::Link { .. }
                            | Node::Dir {
                                default_group: false
                            }
                    )
            });
        if has_user_content {
            return Err(error(io::ErrorKind::DirectoryNotEmpty, path));
        }

        if let Location::Function(_) = location {
            if state.is_link_target(path) {
                return Err(error(io::ErrorKind::ResourceBusy, path));
            }
            self.release_hid_nodes(&mut state, path);
        }

        state.nodes.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn read_attribute(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.state.lock().nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(error(io::ErrorKind::IsADirectory, path)),
            Some(Node::Link { .. }) => Err(error(io::ErrorKind::InvalidInput, path)),
            None => Err(error(io::ErrorKind::NotFound, path)),
        }
    }

    fn write_attribute(&self, path: &Path, value: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        state.writes.push((path.to_path_buf(), value.to_vec()));
        match state.nodes.get(path) {
            Some(Node::File { .. }) => {}
            Some(Node::Dir { .. }) => return Err(error(io::ErrorKind::IsADirectory, path)),
            Some(Node::Link { .. }) => return Err(error(io::ErrorKind::InvalidInput, path)),
            None => return Err(error(io::ErrorKind::NotFound, path)),
        }

        if let (Some(gadget), Some(parent)) = (self.gadget_of(path), path.parent()) {
            if name_of(path) == "UDC" && parent == self.paths.configfs_root.join(gadget) {
                return self.write_udc(&mut state, gadget, value, path);
            }
            if matches!(self.locate(parent), Location::Function(_))
                && state.is_link_target(parent)
            {
                return Err(error(io::ErrorKind::ResourceBusy, path));
            }
        }

        if let Some(Node::File { data, .. }) = state.nodes.get_mut(path) {
            *data = value.to_vec();
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(link) {
            return Err(error(io::ErrorKind::AlreadyExists, link));
        }
        let parent = link
            .parent()
            .ok_or_else(|| error(io::ErrorKind::InvalidInput, link))?;
        if !state.is_dir(parent) {
            return Err(error(io::ErrorKind::NotFound, parent));
        }

        if let Some(gadget) = self.gadget_of(link) {
            if self.locate(parent) != Location::Config {
                return Err(error(io::ErrorKind::PermissionDenied, link));
            }
            if !state.is_dir(target) {
                return Err(error(io::ErrorKind::NotFound, target));
            }
            let same_gadget = matches!(self.locate(target), Location::Function(g) if g == gadget);
            if !same_gadget {
                return Err(error(io::ErrorKind::InvalidInput, target));
            }
            let already_linked = state.nodes.iter().any(|(p, node)| {
                p.parent() == Some(parent)
                    && matches!(node, Node::Link { target: t } if t == target)
            });
            if already_linked {
                return Err(error(io::ErrorKind::AlreadyExists, link));
            }
            if self.bound_udc(&state, gadget).is_some() {
                return Err(error(io::ErrorKind::ResourceBusy, link));
            }
        }

        state.nodes.insert(
            link.to_path_buf(),
            Node::Link {
                target: target.to_path_buf(),
            },
        );
        Ok(())
    }

    fn remove_symlink(&self, link: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.nodes.get(link) {
            Some(Node::Link { .. }) => {}
            Some(_) => return Err(error(io::ErrorKind::InvalidInput, link)),
            None => return Err(error(io::ErrorKind::NotFound, link)),
        }
        if let Some(gadget) = self.gadget_of(link) {
            if self.bound_udc(&state, gadget).is_some() {
                return Err(error(io::ErrorKind::ResourceBusy, link));
            }
        }
        state.nodes.remove(link);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>> {
        let state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(error(io::ErrorKind::NotADirectory, path)),
            None => return Err(error(io::ErrorKind::NotFound, path)),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, node)| Entry {
                name: name_of(p).to_string(),
                kind: match node {
                    Node::Dir { .. } => EntryKind::Directory,
                    Node::File { .. } => EntryKind::Attribute,
                    Node::Link { .. } => EntryKind::Symlink,
                },
            })
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        match self.state.lock().nodes.get_mut(path) {
            Some(Node::File { mode: current, .. }) => {
                *current = mode;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(error(io::ErrorKind::NotFound, path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    LoadModule(String),
    Mount { instance: String, mountpoint: PathBuf },
    Unmount(PathBuf),
    StartService(String),
    StopService(String),
}

/// Host services that only record what they were asked to do.
#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: HostCall) -> GadgetResult<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

impl HostServices for RecordingHost {
    fn load_module(&self, module: &str) -> GadgetResult<()> {
        self.record(HostCall::LoadModule(module.to_string()))
    }

    fn mount_functionfs(&self, instance: &str, mountpoint: &Path) -> GadgetResult<()> {
        self.record(HostCall::Mount {
            instance: instance.to_string(),
            mountpoint: mountpoint.to_path_buf(),
        })
    }

    fn unmount(&self, mountpoint: &Path) -> GadgetResult<()> {
        self.record(HostCall::Unmount(mountpoint.to_path_buf()))
    }

    fn start_service(&self, unit: &str) -> GadgetResult<()> {
        self.record(HostCall::StartService(unit.to_string()))
    }

    fn stop_service(&self, unit: &str) -> GadgetResult<()> {
        self.record(HostCall::StopService(unit.to_string()))
    }
}

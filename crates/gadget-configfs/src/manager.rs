//! Gadget lifecycle
//!
//! ```text
//! UNCONFIGURED --setup--> CONFIGURED --activate--> ACTIVE
//!      ^                      |  ^                   |
//!      +------destroy---------+  +----deactivate-----+
//! ```
//!
//! The state is never cached: it is read back from the tree on every call, so
//! a manager can be pointed at a gadget some other process set up.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use hid_gadget_protocol::{
    HidClass, ReportSizeCalculator, ShortItemCalculator, builtin_descriptor,
    parse_descriptor_text,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{ConfigFsBackend, SysFs, child_path};
use crate::config::GadgetConfig;
use crate::function::FunctionKind;
use crate::host::{HostServices, SystemHostServices, getty_unit};
use crate::tree::{GadgetTree, Node};
use crate::{GadgetError, GadgetResult};

const COMPOSITE_MODULE: &str = "libcomposite";
const HID_NODE_MODE: u32 = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GadgetState {
    Unconfigured,
    Configured,
    Active,
}

impl fmt::Display for GadgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GadgetState::Unconfigured => "unconfigured",
            GadgetState::Configured => "configured",
            GadgetState::Active => "active",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GadgetStatus {
    pub name: String,
    pub path: PathBuf,
    pub state: GadgetState,
    pub controller: Option<String>,
    /// Link names in the configuration, e.g. `hid.keyboard`
    pub functions: Vec<String>,
    pub available_controllers: Vec<String>,
}

pub struct GadgetManager {
    tree: GadgetTree,
    config: GadgetConfig,
    host: Arc<dyn HostServices>,
    calculator: Box<dyn ReportSizeCalculator>,
}

impl fmt::Debug for GadgetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GadgetManager")
            .field("tree", &self.tree)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GadgetManager {
    /// # Errors
    ///
    /// [`GadgetError::InvalidConfig`] when `config` fails validation.
    pub fn new(
        backend: Arc<dyn ConfigFsBackend>,
        host: Arc<dyn HostServices>,
        config: GadgetConfig,
    ) -> GadgetResult<Self> {
        config.validate()?;
        let tree = GadgetTree::new(backend, &config.paths.configfs_root, &config.name)?;
        Ok(Self {
            tree,
            config,
            host,
            calculator: Box::new(ShortItemCalculator),
        })
    }

    /// Manager over the live kernel.
    pub fn system(config: GadgetConfig) -> GadgetResult<Self> {
        Self::new(Arc::new(SysFs), Arc::new(SystemHostServices), config)
    }

    pub fn with_calculator(mut self, calculator: impl ReportSizeCalculator + 'static) -> Self {
        self.calculator = Box::new(calculator);
        self
    }

    pub fn tree(&self) -> &GadgetTree {
        &self.tree
    }

    pub fn config(&self) -> &GadgetConfig {
        &self.config
    }

    pub fn state(&self) -> GadgetResult<GadgetState> {
        if !self.tree.exists() {
            return Ok(GadgetState::Unconfigured);
        }
        Ok(match self.bound_controller()? {
            Some(_) => GadgetState::Active,
            None => GadgetState::Configured,
        })
    }

    /// Controller the gadget is bound to. A missing `UDC` file reads as unbound.
    pub fn bound_controller(&self) -> GadgetResult<Option<String>> {
        if !self.tree.exists() {
            return Ok(None);
        }
        match self.tree.get_attribute(self.tree.root(), "UDC") {
            Ok(value) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(err) if err.io_kind() == Some(io::ErrorKind::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Controllers listed in the UDC class directory, sorted.
    pub fn available_controllers(&self) -> GadgetResult<Vec<String>> {
        let udc_root = &self.config.paths.udc_root;
        match self.tree.backend().read_dir(udc_root) {
            Ok(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(GadgetError::fs("list", udc_root, err)),
        }
    }

    /// Functions currently linked into the configuration.
    pub fn enabled_functions(&self) -> GadgetResult<Vec<FunctionKind>> {
        Ok(self
            .linked_names()?
            .iter()
            .filter_map(|name| FunctionKind::from_dir_name(name))
            .collect())
    }

    fn linked_names(&self) -> GadgetResult<Vec<String>> {
        let config = self.config_node()?;
        if !self.tree.backend().exists(config.path()) {
            return Ok(Vec::new());
        }
        self.tree.links(&config)
    }

    fn config_node(&self) -> GadgetResult<Node> {
        self.tree
            .child(&self.tree.configs(), &self.config.configuration.name)
    }

    fn function_node(&self, kind: FunctionKind) -> GadgetResult<Node> {
        self.tree.child(&self.tree.functions(), kind.dir_name())
    }

    fn require_configured(&self) -> GadgetResult<()> {
        if self.tree.exists() {
            Ok(())
        } else {
            Err(GadgetError::NotConfigured(self.config.name.clone()))
        }
    }

    /// Create the gadget with its identity, strings and configuration.
    ///
    /// Re-running on a configured gadget rewrites the same values.
    ///
    /// # Errors
    ///
    /// [`GadgetError::StillActive`] if the gadget is bound; filesystem and
    /// host-command failures otherwise.
    pub fn setup(&self) -> GadgetResult<()> {
        if let Some(udc) = self.bound_controller()? {
            return Err(GadgetError::StillActive(udc));
        }
        if self.config.load_module {
            self.host.load_module(COMPOSITE_MODULE)?;
        }

        info!(gadget = %self.tree.root(), "Setting up gadget");
        self.tree.create_root()?;
        let root = self.tree.root();
        let identity = &self.config.identity;
        self.tree
            .set_attribute(root, "idVendor", hex16(identity.vendor_id))?;
        self.tree
            .set_attribute(root, "idProduct", hex16(identity.product_id))?;
        self.tree
            .set_attribute(root, "bcdDevice", hex16(identity.device_release))?;
        self.tree
            .set_attribute(root, "bcdUSB", hex16(identity.usb_release))?;

        let lang = format!("{:#x}", self.config.strings.language);
        let strings = self.tree.ensure_dir(&self.tree.strings(), &lang)?;
        let text = &self.config.strings;
        self.tree
            .set_attribute(&strings, "serialnumber", &text.serial_number)?;
        self.tree
            .set_attribute(&strings, "manufacturer", &text.manufacturer)?;
        self.tree.set_attribute(&strings, "product", &text.product)?;

        let settings = &self.config.configuration;
        let config = self.tree.ensure_dir(&self.tree.configs(), &settings.name)?;
        self.tree
            .set_attribute(&config, "bmAttributes", format!("{:#04x}", settings.attributes))?;
        self.tree
            .set_attribute(&config, "MaxPower", settings.max_power.to_string())?;
        let config_strings_group = self.tree.child(&config, "strings")?;
        let config_strings = self.tree.ensure_dir(&config_strings_group, &lang)?;
        self.tree
            .set_attribute(&config_strings, "configuration", &settings.label)?;

        info!(gadget = %self.tree.root(), "Gadget configured");
        Ok(())
    }

    /// Add `kind` to the configuration.
    ///
    /// The gadget is unbound first, since links cannot change while bound,
    /// and rebound afterwards when `activate` is set. Enabling a function
    /// that is already linked only re-activates.
    pub fn enable(&self, kind: FunctionKind, activate: bool) -> GadgetResult<()> {
        self.require_configured()?;
        self.deactivate()?;

        let config = self.config_node()?;
        let function = self.function_node(kind)?;
        let already_linked = self.linked_names()?.iter().any(|l| l == kind.dir_name());

        if already_linked {
            info!(function = %kind, "Function already enabled");
        } else {
            info!(function = %kind, "Enabling function");
            match kind.hid_class() {
                Some(class) => self.create_hid_function(kind, class)?,
                None => {
                    self.tree.ensure_dir(&self.tree.functions(), kind.dir_name())?;
                }
            }
            self.tree.link(&function, &config)?;
            if kind == FunctionKind::Mtp {
                self.mount_mtp()?;
            }
        }

        if activate {
            self.activate_if_linked()?;
        }
        if kind == FunctionKind::Shell && !already_linked {
            let port = self.tree.get_attribute(&function, "port_num")?;
            self.host.start_service(&getty_unit(&port))?;
        }
        self.fix_permissions();
        Ok(())
    }

    /// Remove `kind` from the configuration and release what it holds.
    pub fn disable(&self, kind: FunctionKind, activate: bool) -> GadgetResult<()> {
        self.require_configured()?;
        if !self.linked_names()?.iter().any(|l| l == kind.dir_name()) {
            return Err(GadgetError::NotEnabled(kind));
        }
        self.deactivate()?;

        info!(function = %kind, "Disabling function");
        let config = self.config_node()?;
        let function = self.function_node(kind)?;
        self.release_function(kind, &function)?;
        self.tree.unlink(kind.dir_name(), &config)?;
        self.tree.remove_dir(&function)?;

        if activate && !self.linked_names()?.is_empty() {
            self.activate(None)?;
            self.fix_permissions();
        }
        Ok(())
    }

    /// Bind to `controller`, the configured controller, or the first one
    /// listed. Returns the controller now bound; already bound is a no-op.
    pub fn activate(&self, controller: Option<&str>) -> GadgetResult<String> {
        self.require_configured()?;
        if let Some(current) = self.bound_controller()? {
            debug!(udc = %current, "Gadget already bound");
            return Ok(current);
        }

        let udc = match controller.map(str::to_string).or_else(|| self.config.udc.clone()) {
            Some(udc) => udc,
            None => self
                .available_controllers()?
                .into_iter()
                .next()
                .ok_or(GadgetError::NoControllerAvailable)?,
        };
        info!(udc = %udc, "Binding gadget");
        self.tree.set_attribute(self.tree.root(), "UDC", &udc)?;
        Ok(udc)
    }

    /// Unbind if bound. Returns whether anything changed.
    pub fn deactivate(&self) -> GadgetResult<bool> {
        match self.bound_controller()? {
            Some(udc) => {
                info!(udc = %udc, "Unbinding gadget");
                self.tree.set_attribute(self.tree.root(), "UDC", "\n")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear the whole tree down, children before parents.
    ///
    /// # Errors
    ///
    /// [`GadgetError::StillActive`] while bound.
    pub fn destroy(&self) -> GadgetResult<()> {
        self.require_configured()?;
        if let Some(udc) = self.bound_controller()? {
            return Err(GadgetError::StillActive(udc));
        }
        info!(gadget = %self.tree.root(), "Destroying gadget");

        for config in self.tree.subdirs(&self.tree.configs())? {
            for link in self.tree.links(&config)? {
                self.tree.unlink(&link, &config)?;
            }
            let strings = self.tree.child(&config, "strings")?;
            for lang in self.tree.subdirs(&strings)? {
                self.tree.remove_dir(&lang)?;
            }
            self.tree.remove_dir(&config)?;
        }
        for function in self.tree.subdirs(&self.tree.functions())? {
            if let Some(kind) = FunctionKind::from_dir_name(function.name()) {
                self.release_function(kind, &function)?;
            }
            self.tree.remove_dir(&function)?;
        }
        for lang in self.tree.subdirs(&self.tree.strings())? {
            self.tree.remove_dir(&lang)?;
        }
        self.tree.remove_dir(self.tree.root())
    }

    /// `/dev` node of an enabled HID function, via its `dev` attribute and
    /// the sysfs `uevent` of that device number.
    pub fn device_node(&self, kind: FunctionKind) -> GadgetResult<PathBuf> {
        if !kind.is_hid() {
            return Err(GadgetError::NotHid(kind));
        }
        self.require_configured()?;
        let function = self.function_node(kind)?;
        if !self.tree.backend().exists(function.path()) {
            return Err(GadgetError::NotEnabled(kind));
        }

        let dev = self.tree.get_attribute(&function, "dev")?;
        let sys_entry = child_path(&self.config.paths.dev_char_root, dev.trim()).map_err(|err| {
            GadgetError::DeviceNode {
                function: kind,
                reason: format!("unexpected dev attribute {dev:?}: {err}"),
            }
        })?;
        let uevent_path = sys_entry.join("uevent");
        let uevent = self.tree.read_external(&uevent_path)?;
        let devname = uevent
            .lines()
            .find_map(|line| line.strip_prefix("DEVNAME="))
            .map(|name| name.trim().trim_start_matches('/'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GadgetError::DeviceNode {
                function: kind,
                reason: format!("no DEVNAME in {}", uevent_path.display()),
            })?;
        Ok(self.config.paths.dev_root.join(devname))
    }

    pub fn status(&self) -> GadgetResult<GadgetStatus> {
        Ok(GadgetStatus {
            name: self.config.name.clone(),
            path: self.tree.root().path().to_path_buf(),
            state: self.state()?,
            controller: self.bound_controller()?,
            functions: if self.tree.exists() {
                self.linked_names()?
            } else {
                Vec::new()
            },
            available_controllers: self.available_controllers()?,
        })
    }

    /// Descriptor for `class`: `<descriptor_dir>/<class>.txt` when present,
    /// the built-in one otherwise.
    pub fn descriptor(&self, class: HidClass) -> GadgetResult<Cow<'static, [u8]>> {
        if let Some(dir) = &self.config.functions.descriptor_dir {
            let path = dir.join(format!("{class}.txt"));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(path = %path.display(), "Using descriptor file");
                    return Ok(Cow::Owned(parse_descriptor_text(&text)));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "No descriptor file, using built-in");
                }
                Err(err) => return Err(GadgetError::fs("read", path, err)),
            }
        }
        Ok(Cow::Borrowed(builtin_descriptor(class)))
    }

    fn create_hid_function(&self, kind: FunctionKind, class: HidClass) -> GadgetResult<()> {
        let descriptor = self.descriptor(class)?;
        let sizes = self.calculator.report_sizes(&descriptor)?;
        if sizes.input == 0 {
            return Err(GadgetError::InvalidConfig(format!(
                "{class} descriptor declares no input report"
            )));
        }
        debug!(function = %kind, ?sizes, "Sized report descriptor");

        let settings = self.config.functions.hid(kind).unwrap_or_default();
        let function = self.tree.ensure_dir(&self.tree.functions(), kind.dir_name())?;
        self.tree
            .set_attribute(&function, "protocol", settings.protocol.to_string())?;
        self.tree
            .set_attribute(&function, "subclass", settings.subclass.to_string())?;
        self.tree
            .set_attribute(&function, "report_length", sizes.input.to_string())?;
        self.tree
            .set_attribute(&function, "report_desc", &*descriptor)?;
        Ok(())
    }

    fn activate_if_linked(&self) -> GadgetResult<()> {
        if self.linked_names()?.is_empty() {
            debug!("Nothing linked, leaving gadget unbound");
            return Ok(());
        }
        self.activate(None).map(|_| ())
    }

    fn mount_mtp(&self) -> GadgetResult<()> {
        let settings = &self.config.functions;
        let mountpoint = &settings.mtp_mountpoint;
        let backend = self.tree.backend();
        if !backend.exists(mountpoint) {
            backend
                .create_dir(mountpoint)
                .map_err(|e| GadgetError::fs("create", mountpoint, e))?;
        }
        self.host
            .mount_functionfs(&settings.mtp_instance, mountpoint)
    }

    fn release_function(&self, kind: FunctionKind, function: &Node) -> GadgetResult<()> {
        match kind {
            FunctionKind::Mtp => {
                let mountpoint = &self.config.functions.mtp_mountpoint;
                let backend = self.tree.backend();
                if backend.exists(mountpoint) {
                    self.host.unmount(mountpoint)?;
                    backend
                        .remove_dir(mountpoint)
                        .map_err(|e| GadgetError::fs("remove", mountpoint, e))?;
                }
            }
            FunctionKind::Shell => {
                let port = self.tree.get_attribute(function, "port_num")?;
                self.host.stop_service(&getty_unit(&port))?;
            }
            FunctionKind::Joystick | FunctionKind::Mouse | FunctionKind::Keyboard => {}
        }
        Ok(())
    }

    /// Open HID device nodes to unprivileged users. Failures are logged only.
    fn fix_permissions(&self) {
        for kind in FunctionKind::ALL.into_iter().filter(|k| k.is_hid()) {
            let enabled = self
                .function_node(kind)
                .is_ok_and(|node| self.tree.backend().exists(node.path()));
            if !enabled {
                continue;
            }
            let result = self.device_node(kind).and_then(|node| {
                self.tree
                    .backend()
                    .set_mode(&node, HID_NODE_MODE)
                    .map_err(|e| GadgetError::fs("chmod", &node, e))
            });
            if let Err(err) = result {
                warn!(function = %kind, error = %err, "Could not open HID device node");
            }
        }
    }
}

fn hex16(value: u16) -> String {
    format!("{value:#06x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_formatting() {
        assert_eq!(hex16(0x1d6b), "0x1d6b");
        assert_eq!(hex16(0x0104), "0x0104");
        assert_eq!(format!("{:#x}", 0x409), "0x409");
        assert_eq!(format!("{:#04x}", 0x80u8), "0x80");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GadgetState::Active.to_string(), "active");
        assert_eq!(GadgetState::Unconfigured.to_string(), "unconfigured");
    }
}

//! Gadget configuration
//!
//! Every field has a default, so an empty YAML document describes the stock
//! gadget: a Linux Foundation composite device announcing itself as a Steam
//! Deck with one configuration `c.1`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::function::FunctionKind;
use crate::{GadgetError, GadgetResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetConfig {
    /// Directory name of the gadget under the configfs root
    pub name: String,
    /// Device descriptor fields
    pub identity: DeviceIdentity,
    /// USB string descriptors
    pub strings: DeviceStrings,
    /// The single configuration functions are linked into
    pub configuration: ConfigurationSettings,
    /// Per-function settings
    pub functions: FunctionSettings,
    /// Filesystem locations, overridable for tests and unusual systems
    pub paths: GadgetPaths,
    /// Controller to bind to instead of the first one listed
    pub udc: Option<String>,
    /// Run `modprobe libcomposite` during setup
    pub load_module: bool,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            name: "gadget-deck".to_string(),
            identity: DeviceIdentity::default(),
            strings: DeviceStrings::default(),
            configuration: ConfigurationSettings::default(),
            functions: FunctionSettings::default(),
            paths: GadgetPaths::default(),
            udc: None,
            load_module: true,
        }
    }
}

impl GadgetConfig {
    /// # Errors
    ///
    /// [`GadgetError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> GadgetResult<()> {
        if !is_plain_name(&self.name) {
            return Err(GadgetError::InvalidConfig(format!(
                "gadget name {:?} must be a single path component",
                self.name
            )));
        }
        let config_name = &self.configuration.name;
        if !is_plain_name(config_name) || !config_name.contains('.') {
            return Err(GadgetError::InvalidConfig(format!(
                "configuration name {config_name:?} must look like <label>.<number>"
            )));
        }
        if self.udc.as_deref().is_some_and(|udc| !is_plain_name(udc)) {
            return Err(GadgetError::InvalidConfig(
                "udc must be a controller name, not a path".to_string(),
            ));
        }
        if self.functions.mtp_instance.is_empty() {
            return Err(GadgetError::InvalidConfig(
                "functions.mtp_instance must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bcdDevice`
    pub device_release: u16,
    /// `bcdUSB`
    pub usb_release: u16,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 0x1d6b,
            product_id: 0x0104,
            device_release: 0x0100,
            usb_release: 0x0200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceStrings {
    /// USB language ID of the string table, `0x409` for US English
    pub language: u16,
    pub serial_number: String,
    pub manufacturer: String,
    pub product: String,
}

impl Default for DeviceStrings {
    fn default() -> Self {
        Self {
            language: 0x409,
            serial_number: "0123456789".to_string(),
            manufacturer: "Valve".to_string(),
            product: "Steam Deck".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationSettings {
    pub name: String,
    /// `bmAttributes`; bit 7 must stay set
    pub attributes: u8,
    /// `MaxPower` in mA
    pub max_power: u16,
    pub label: String,
}

impl Default for ConfigurationSettings {
    fn default() -> Self {
        Self {
            name: "c.1".to_string(),
            attributes: 0x80,
            max_power: 250,
            label: "Steam Deck Configuration".to_string(),
        }
    }
}

/// `protocol`/`subclass` written to a HID function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HidFunctionSettings {
    pub protocol: u8,
    pub subclass: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSettings {
    pub joystick: HidFunctionSettings,
    pub mouse: HidFunctionSettings,
    pub keyboard: HidFunctionSettings,
    /// Directory holding `<kind>.txt` descriptor overrides
    pub descriptor_dir: Option<PathBuf>,
    /// FunctionFS instance name passed to `mount`
    pub mtp_instance: String,
    pub mtp_mountpoint: PathBuf,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            joystick: HidFunctionSettings::default(),
            mouse: HidFunctionSettings::default(),
            // boot interface, keyboard protocol
            keyboard: HidFunctionSettings {
                protocol: 1,
                subclass: 1,
            },
            descriptor_dir: None,
            mtp_instance: "mtp".to_string(),
            mtp_mountpoint: PathBuf::from("/dev/ffs-mtp"),
        }
    }
}

impl FunctionSettings {
    pub fn hid(&self, kind: FunctionKind) -> Option<HidFunctionSettings> {
        match kind {
            FunctionKind::Joystick => Some(self.joystick),
            FunctionKind::Mouse => Some(self.mouse),
            FunctionKind::Keyboard => Some(self.keyboard),
            FunctionKind::Mtp | FunctionKind::Shell => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetPaths {
    /// configfs `usb_gadget` directory
    pub configfs_root: PathBuf,
    /// UDC class directory listing available controllers
    pub udc_root: PathBuf,
    /// sysfs `major:minor` map of character devices
    pub dev_char_root: PathBuf,
    pub dev_root: PathBuf,
}

impl Default for GadgetPaths {
    fn default() -> Self {
        Self {
            configfs_root: PathBuf::from("/sys/kernel/config/usb_gadget"),
            udc_root: PathBuf::from("/sys/class/udc"),
            dev_char_root: PathBuf::from("/sys/dev/char"),
            dev_root: PathBuf::from("/dev"),
        }
    }
}

impl GadgetPaths {
    /// All four locations below `base`, for sandboxed runs.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            configfs_root: base.join("sys/kernel/config/usb_gadget"),
            udc_root: base.join("sys/class/udc"),
            dev_char_root: base.join("sys/dev/char"),
            dev_root: base.join("dev"),
        }
    }
}

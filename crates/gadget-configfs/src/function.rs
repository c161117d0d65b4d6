//! USB functions a gadget can expose

use std::fmt;
use std::str::FromStr;

use hid_gadget_protocol::HidClass;
use serde::{Deserialize, Serialize};

use crate::GadgetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Joystick,
    Mouse,
    Keyboard,
    /// Media Transfer Protocol over FunctionFS
    Mtp,
    /// ACM serial port with a login getty
    Shell,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 5] = [
        FunctionKind::Joystick,
        FunctionKind::Mouse,
        FunctionKind::Keyboard,
        FunctionKind::Mtp,
        FunctionKind::Shell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Joystick => "joystick",
            FunctionKind::Mouse => "mouse",
            FunctionKind::Keyboard => "keyboard",
            FunctionKind::Mtp => "mtp",
            FunctionKind::Shell => "shell",
        }
    }

    /// Directory name under `functions/`, `<driver>.<instance>`.
    pub fn dir_name(self) -> &'static str {
        match self {
            FunctionKind::Joystick => "hid.joystick",
            FunctionKind::Mouse => "hid.mouse",
            FunctionKind::Keyboard => "hid.keyboard",
            FunctionKind::Mtp => "ffs.mtp",
            FunctionKind::Shell => "acm.shell",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }

    pub fn hid_class(self) -> Option<HidClass> {
        match self {
            FunctionKind::Joystick => Some(HidClass::Joystick),
            FunctionKind::Mouse => Some(HidClass::Mouse),
            FunctionKind::Keyboard => Some(HidClass::Keyboard),
            FunctionKind::Mtp | FunctionKind::Shell => None,
        }
    }

    pub fn is_hid(self) -> bool {
        self.hid_class().is_some()
    }
}

impl From<HidClass> for FunctionKind {
    fn from(class: HidClass) -> Self {
        match class {
            HidClass::Joystick => FunctionKind::Joystick,
            HidClass::Mouse => FunctionKind::Mouse,
            HidClass::Keyboard => FunctionKind::Keyboard,
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionKind {
    type Err = GadgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| GadgetError::UnknownFunction(s.to_string()))
    }
}

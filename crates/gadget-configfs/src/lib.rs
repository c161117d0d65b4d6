//! Linux USB gadget configfs management
//!
//! A gadget is a directory tree under `/sys/kernel/config/usb_gadget`:
//!
//! ```text
//! <gadget>/
//! ├── idVendor, idProduct, bcdDevice, bcdUSB, UDC
//! ├── strings/0x409/{serialnumber,manufacturer,product}
//! ├── configs/c.1/{bmAttributes,MaxPower,strings/0x409/configuration}
//! │   └── hid.keyboard -> ../../functions/hid.keyboard
//! └── functions/hid.keyboard/{protocol,subclass,report_length,report_desc,dev}
//! ```
//!
//! [`GadgetManager`] creates, binds, and tears this tree down through a
//! [`ConfigFsBackend`]. [`mock`] provides an in-memory configfs for tests.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod error;
pub mod function;
pub mod host;
pub mod manager;
pub mod mock;
pub mod tree;

pub use backend::{ConfigFsBackend, Entry, EntryKind, SysFs};
pub use config::{
    ConfigurationSettings, DeviceIdentity, DeviceStrings, FunctionSettings, GadgetConfig,
    GadgetPaths, HidFunctionSettings,
};
pub use error::{GadgetError, GadgetResult};
pub use function::FunctionKind;
pub use host::{HostServices, SystemHostServices};
pub use manager::{GadgetManager, GadgetState, GadgetStatus};
pub use tree::{GadgetTree, Node};

//! Runtime loops for USB HID gadget functions
//!
//! Two long-lived workers sit between the gadget's `hidg` device nodes and
//! the outside world:
//!
//! - the [`TranslationLoop`] polls an [`InputSource`], maps actions onto the
//!   joystick and mouse state through an [`ActionMap`] and writes one report
//!   per device per frame;
//! - the [`OutputReportListener`] waits on the keyboard node for the host's
//!   LED report and updates the shared [`KeyDisplayState`].
//!
//! [`KeyboardSession`] types through the same keyboard node. Everything a UI
//! might render is published as [`GadgetEvent`]s on a bounded channel.
//!
//! [`KeyDisplayState`]: hid_gadget_protocol::KeyDisplayState

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod action;
pub mod device;
pub mod error;
pub mod events;
pub mod input;
pub mod listener;
pub mod mock;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod translate;

pub use action::{ActionMap, JoystickBindings, MouseBindings, StickBinding};
pub use device::{JoystickDevice, KeyboardDevice, MouseDevice};
pub use error::{RuntimeError, RuntimeResult};
pub use events::{GadgetEvent, Notifier};
pub use input::{AnalogValue, InputSnapshot, InputSource, JsonLinesSource, Poll, StdinSource};
pub use listener::OutputReportListener;
pub use runtime::{GadgetDevices, Runtime, RuntimeConfig};
pub use session::KeyboardSession;
pub use sink::{HidDevice, ReportSink, write_report};
pub use translate::TranslationLoop;

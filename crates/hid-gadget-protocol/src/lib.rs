//! HID report codec and keyboard model for USB gadget peripherals
//!
//! This crate holds everything that turns logical peripheral state into the
//! bytes a Linux `hidg` character device expects, and back again:
//!
//! - [`scancode`]: symbolic key names to USB HID keyboard usage codes
//! - [`state`]: joystick, mouse and keyboard state models
//! - [`report`]: input report encoders and the keyboard LED output decoder
//! - [`keyboard`]: latching on-screen keyboard state machine
//! - [`descriptor`]: report descriptor text parsing and report size calculation
//!
//! ## Design
//! The crate is I/O-free. Device files, configfs and threads live in
//! `gadget-configfs` and `gadget-runtime`.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod builder;
pub mod descriptor;
pub mod keyboard;
pub mod report;
pub mod scancode;
pub mod state;

pub use builder::{ReportBuilder, ReportParser};
pub use descriptor::{
    HidClass, ReportSizeCalculator, ReportSizes, ShortItemCalculator, builtin_descriptor,
    parse_descriptor_text,
};
pub use keyboard::{KeyDisplayState, KeyEvent, KeyKind, LatchingKeyboard};
pub use report::{
    KeyboardLeds, decode_keyboard_output, encode_joystick, encode_keyboard, encode_mouse, remap,
};
pub use scancode::{char_key, lookup};
pub use state::{
    AxisWidth, ButtonSet, JoystickShape, JoystickState, KeyboardState, MouseShape, MouseState,
    TriggerRange,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown key name: {0:?}")]
    UnknownKey(String),

    #[error("Key rollover full: {capacity} keys already held")]
    RolloverFull { capacity: usize },

    #[error("Report too short: expected {expected}, got {actual}")]
    ReportTooShort { expected: usize, actual: usize },

    #[error("Malformed report descriptor at byte {offset}: {reason}")]
    MalformedDescriptor { offset: usize, reason: &'static str },

    #[error("Unsupported axis width: {0} bytes")]
    UnsupportedAxisWidth(u8),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::UnknownKey("xyz".to_string());
        assert_eq!(err.to_string(), "Unknown key name: \"xyz\"");

        let err = ProtocolError::RolloverFull { capacity: 6 };
        assert_eq!(err.to_string(), "Key rollover full: 6 keys already held");
    }
}

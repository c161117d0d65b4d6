//! Input report encoders and the keyboard output report decoder
//!
//! # Joystick input report
//! | Offset        | Size          | Field    | Encoding                        |
//! |---------------|---------------|----------|---------------------------------|
//! | 0             | 2 × sticks    | sticks   | i8 pairs (x, y), ±1.0 → ±127    |
//! | 2n            | triggers      | triggers | i8, 0..1 → 0..127 (or ±1 → ±127)|
//! | 2n + m        | ⌈buttons/8⌉   | buttons  | bit `i%8` of byte `i/8`         |
//!
//! # Mouse input report
//! buttons, then X and Y as signed LE integers of the configured width, then
//! one i8 per wheel.
//!
//! # Keyboard input report
//! modifier bitmask, reserved zero, `K` usages zero padded.
//!
//! # Keyboard output report
//! bit 0 Num Lock, bit 1 Caps Lock, bit 2 Scroll Lock of the first byte.

use serde::{Deserialize, Serialize};

use crate::builder::{ReportBuilder, ReportParser};
use crate::state::{JoystickState, KeyboardState, MouseState, TriggerRange};
use crate::ProtocolResult;

pub const AXIS_MAX: f32 = 127.0;

/// Linear remap of `value` from `in_min..in_max` onto `out_min..out_max`,
/// clamped to the output range. Reversed output ranges are clamped too.
pub fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let normalized = (value - in_min) / (in_max - in_min);
    let scaled = normalized * (out_max - out_min) + out_min;
    let (lo, hi) = if out_min <= out_max {
        (out_min, out_max)
    } else {
        (out_max, out_min)
    };
    scaled.clamp(lo, hi)
}

/// Truncating float to signed byte; `remap` keeps the value in range.
fn axis_byte(value: f32) -> i8 {
    #[expect(clippy::cast_possible_truncation, reason = "value is clamped to ±127")]
    let byte = value as i8;
    byte
}

fn stick_byte(value: f32) -> i8 {
    axis_byte(remap(value, -1.0, 1.0, -AXIS_MAX, AXIS_MAX))
}

fn trigger_byte(value: f32, range: TriggerRange) -> i8 {
    match range {
        TriggerRange::Unipolar => axis_byte(remap(value, 0.0, 1.0, 0.0, AXIS_MAX)),
        TriggerRange::Bipolar => stick_byte(value),
    }
}

pub fn encode_joystick_into(state: &JoystickState, builder: &mut ReportBuilder) {
    for &(x, y) in state.sticks() {
        builder.write_i8(stick_byte(x)).write_i8(stick_byte(y));
    }
    let range = state.shape().trigger_range;
    for &trigger in state.triggers() {
        builder.write_i8(trigger_byte(trigger, range));
    }
    builder.write_bytes(state.buttons().as_bytes());
}

pub fn encode_joystick(state: &JoystickState) -> Vec<u8> {
    let mut builder = ReportBuilder::with_capacity(state.shape().report_len());
    encode_joystick_into(state, &mut builder);
    builder.into_inner()
}

pub fn encode_mouse_into(state: &MouseState, builder: &mut ReportBuilder) {
    let (dx, dy) = state.displacement();
    let width = state.shape().resolution;
    builder
        .write_bytes(state.buttons().as_bytes())
        .write_signed(dx, width)
        .write_signed(dy, width);
    for &wheel in state.wheels() {
        builder.write_i8(wheel);
    }
}

pub fn encode_mouse(state: &MouseState) -> Vec<u8> {
    let mut builder = ReportBuilder::with_capacity(state.shape().report_len());
    encode_mouse_into(state, &mut builder);
    builder.into_inner()
}

pub fn encode_keyboard_into(state: &KeyboardState, builder: &mut ReportBuilder) {
    let start = builder.len();
    builder
        .write_u8(state.modifiers())
        .write_u8(0)
        .write_bytes(state.keys())
        .pad_to(start.saturating_add(state.report_len()));
}

pub fn encode_keyboard(state: &KeyboardState) -> Vec<u8> {
    let mut builder = ReportBuilder::with_capacity(state.report_len());
    encode_keyboard_into(state, &mut builder);
    builder.into_inner()
}

/// LED state the host reports back to a keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyboardLeds {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

impl KeyboardLeds {
    pub const NUM_LOCK: u8 = 0x01;
    pub const CAPS_LOCK: u8 = 0x02;
    pub const SCROLL_LOCK: u8 = 0x04;

    pub fn from_bits(bits: u8) -> Self {
        Self {
            num_lock: bits & Self::NUM_LOCK != 0,
            caps_lock: bits & Self::CAPS_LOCK != 0,
            scroll_lock: bits & Self::SCROLL_LOCK != 0,
        }
    }
}

/// Decode a keyboard output report. Only the first byte is looked at.
///
/// # Errors
///
/// [`crate::ProtocolError::ReportTooShort`] for an empty buffer.
pub fn decode_keyboard_output(data: &[u8]) -> ProtocolResult<KeyboardLeds> {
    let mut parser = ReportParser::new(data);
    Ok(KeyboardLeds::from_bits(parser.read_u8()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AxisWidth, JoystickShape, MouseShape};

    #[test]
    fn test_remap_clamps() {
        assert!((remap(2.0, -1.0, 1.0, -127.0, 127.0) - 127.0).abs() < f32::EPSILON);
        assert!((remap(-2.0, -1.0, 1.0, -127.0, 127.0) + 127.0).abs() < f32::EPSILON);
        assert!((remap(0.5, 0.0, 1.0, 127.0, 0.0) - 63.5).abs() < f32::EPSILON);
        assert!(remap(5.0, 0.0, 1.0, 127.0, 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_encode_joystick_reference_vector() {
        let shape = JoystickShape {
            sticks: 2,
            triggers: 1,
            buttons: 8,
            trigger_range: TriggerRange::Unipolar,
        };
        let mut state = JoystickState::new(shape);
        state.set_stick(0, 1.0, -1.0);
        state.set_stick(1, 0.0, 0.0);
        state.set_trigger(0, 0.5);
        state.set_button(3, true);

        let expected: Vec<u8> = [127i8, -127, 0, 0, 63, 0x08]
            .iter()
            .flat_map(|b| b.to_le_bytes())
            .collect();
        assert_eq!(encode_joystick(&state), expected);
    }

    #[test]
    fn test_encode_joystick_bipolar_trigger() {
        let shape = JoystickShape {
            sticks: 0,
            triggers: 1,
            buttons: 0,
            trigger_range: TriggerRange::Bipolar,
        };
        let mut state = JoystickState::new(shape);
        state.set_trigger(0, -1.0);
        assert_eq!(encode_joystick(&state), vec![0x81]);
    }

    #[test]
    fn test_encode_joystick_nan_is_centered() {
        let mut state = JoystickState::new(JoystickShape::default());
        state.set_stick(0, f32::NAN, 0.0);
        let report = encode_joystick(&state);
        assert_eq!(report.first(), Some(&0));
    }

    #[test]
    fn test_encode_mouse_layout() {
        let mut state = MouseState::new(MouseShape {
            resolution: AxisWidth::Two,
            buttons: 8,
            wheels: 2,
        });
        state.set_button(1, true);
        state.move_by(-2, 300);
        state.scroll(1, -1);

        assert_eq!(
            encode_mouse(&state),
            vec![0x02, 0xFE, 0xFF, 0x2C, 0x01, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_encode_mouse_one_byte_saturates() {
        let mut state = MouseState::new(MouseShape {
            resolution: AxisWidth::One,
            buttons: 3,
            wheels: 1,
        });
        state.move_by(500, -500);
        assert_eq!(encode_mouse(&state), vec![0x00, 0x7F, 0x80, 0x00]);
    }

    #[test]
    fn test_encode_keyboard_padding() -> ProtocolResult<()> {
        let mut state = KeyboardState::default();
        state.press(0xE1)?;
        state.press(0x04)?;
        state.press(0x05)?;

        assert_eq!(
            encode_keyboard(&state),
            vec![0x02, 0x00, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00]
        );
        Ok(())
    }

    #[test]
    fn test_decode_keyboard_output() -> ProtocolResult<()> {
        let leds = decode_keyboard_output(&[0b1111_1010, 0xFF])?;
        assert_eq!(
            leds,
            KeyboardLeds {
                num_lock: false,
                caps_lock: true,
                scroll_lock: false,
            }
        );

        let leds = decode_keyboard_output(&[0x05])?;
        assert!(leds.num_lock && leds.scroll_lock && !leds.caps_lock);

        assert!(decode_keyboard_output(&[]).is_err());
        Ok(())
    }
}

//! Device state models
//!
//! Each state is built from a shape, and the shape fixes every collection
//! length for the life of the state. Index-based setters outside those
//! lengths are programming errors and panic.

use serde::{Deserialize, Serialize};

use crate::scancode::{MODIFIER_BASE, is_modifier};
use crate::{ProtocolError, ProtocolResult};

/// Bit-packed button set, bit `i % 8` of byte `i / 8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSet {
    count: usize,
    bytes: Vec<u8>,
}

impl ButtonSet {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            bytes: vec![0; count.div_ceil(8)],
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured button count.
    pub fn set(&mut self, index: usize, pressed: bool) {
        assert!(
            index < self.count,
            "button {index} out of range for {} buttons",
            self.count
        );
        let mask = 1u8 << (index % 8);
        if let Some(byte) = self.bytes.get_mut(index / 8) {
            if pressed {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    pub fn get(&self, index: usize) -> bool {
        if index >= self.count {
            return false;
        }
        self.bytes
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pressed_count(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }
}

/// Logical range of a joystick trigger before it is remapped onto a signed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRange {
    /// `0.0..=1.0` onto `0..=127`
    #[default]
    Unipolar,
    /// `-1.0..=1.0` onto `-127..=127`
    Bipolar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickShape {
    pub sticks: usize,
    pub triggers: usize,
    pub buttons: usize,
    pub trigger_range: TriggerRange,
}

impl Default for JoystickShape {
    fn default() -> Self {
        Self {
            sticks: 2,
            triggers: 2,
            buttons: 24,
            trigger_range: TriggerRange::Unipolar,
        }
    }
}

impl JoystickShape {
    pub fn report_len(&self) -> usize {
        self.sticks * 2 + self.triggers + self.buttons.div_ceil(8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoystickState {
    shape: JoystickShape,
    sticks: Vec<(f32, f32)>,
    triggers: Vec<f32>,
    buttons: ButtonSet,
}

impl JoystickState {
    pub fn new(shape: JoystickShape) -> Self {
        Self {
            shape,
            sticks: vec![(0.0, 0.0); shape.sticks],
            triggers: vec![0.0; shape.triggers],
            buttons: ButtonSet::new(shape.buttons),
        }
    }

    pub fn shape(&self) -> &JoystickShape {
        &self.shape
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured stick count.
    pub fn set_stick(&mut self, index: usize, x: f32, y: f32) {
        let count = self.sticks.len();
        let Some(stick) = self.sticks.get_mut(index) else {
            panic_out_of_range("stick", index, count);
        };
        *stick = (x, y);
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured trigger count.
    pub fn set_trigger(&mut self, index: usize, value: f32) {
        let count = self.triggers.len();
        let Some(trigger) = self.triggers.get_mut(index) else {
            panic_out_of_range("trigger", index, count);
        };
        *trigger = value;
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured button count.
    pub fn set_button(&mut self, index: usize, pressed: bool) {
        self.buttons.set(index, pressed);
    }

    pub fn sticks(&self) -> &[(f32, f32)] {
        &self.sticks
    }

    pub fn triggers(&self) -> &[f32] {
        &self.triggers
    }

    pub fn buttons(&self) -> &ButtonSet {
        &self.buttons
    }

    pub fn reset(&mut self) {
        self.sticks.fill((0.0, 0.0));
        self.triggers.fill(0.0);
        self.buttons.clear();
    }
}

#[track_caller]
#[expect(clippy::panic, reason = "index outside the shape is a programming error")]
fn panic_out_of_range(what: &str, index: usize, count: usize) -> ! {
    panic!("{what} {index} out of range for {count} {what}s")
}

/// Byte width of the mouse X/Y fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AxisWidth {
    One,
    #[default]
    Two,
    Four,
}

impl AxisWidth {
    pub fn bytes(self) -> usize {
        match self {
            AxisWidth::One => 1,
            AxisWidth::Two => 2,
            AxisWidth::Four => 4,
        }
    }
}

impl TryFrom<u8> for AxisWidth {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AxisWidth::One),
            2 => Ok(AxisWidth::Two),
            4 => Ok(AxisWidth::Four),
            other => Err(ProtocolError::UnsupportedAxisWidth(other)),
        }
    }
}

impl From<AxisWidth> for u8 {
    fn from(width: AxisWidth) -> Self {
        match width {
            AxisWidth::One => 1,
            AxisWidth::Two => 2,
            AxisWidth::Four => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseShape {
    pub resolution: AxisWidth,
    pub buttons: usize,
    pub wheels: usize,
}

impl Default for MouseShape {
    fn default() -> Self {
        Self {
            resolution: AxisWidth::Two,
            buttons: 8,
            wheels: 2,
        }
    }
}

impl MouseShape {
    pub fn report_len(&self) -> usize {
        self.buttons.div_ceil(8) + 2 * self.resolution.bytes() + self.wheels
    }
}

/// Relative pointer state. `dx`, `dy` and the wheels hold the motion since the
/// last transmitted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseState {
    shape: MouseShape,
    dx: i32,
    dy: i32,
    buttons: ButtonSet,
    wheels: Vec<i8>,
}

impl MouseState {
    pub fn new(shape: MouseShape) -> Self {
        Self {
            shape,
            dx: 0,
            dy: 0,
            buttons: ButtonSet::new(shape.buttons),
            wheels: vec![0; shape.wheels],
        }
    }

    pub fn shape(&self) -> &MouseShape {
        &self.shape
    }

    pub fn move_by(&mut self, dx: i32, dy: i32) {
        self.dx = dx;
        self.dy = dy;
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured button count.
    pub fn set_button(&mut self, index: usize, pressed: bool) {
        self.buttons.set(index, pressed);
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the configured wheel count.
    pub fn scroll(&mut self, index: usize, delta: i8) {
        let count = self.wheels.len();
        let Some(wheel) = self.wheels.get_mut(index) else {
            panic_out_of_range("wheel", index, count);
        };
        *wheel = delta;
    }

    pub fn displacement(&self) -> (i32, i32) {
        (self.dx, self.dy)
    }

    pub fn buttons(&self) -> &ButtonSet {
        &self.buttons
    }

    pub fn wheels(&self) -> &[i8] {
        &self.wheels
    }

    /// Clear motion after a report went out. Buttons are held state and stay.
    pub fn clear_motion(&mut self) {
        self.dx = 0;
        self.dy = 0;
        self.wheels.fill(0);
    }

    pub fn reset(&mut self) {
        self.clear_motion();
        self.buttons.clear();
    }
}

pub const DEFAULT_ROLLOVER: usize = 6;

/// Held keys: up to `capacity` ordinary usages in press order, plus the
/// modifier bitmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    capacity: usize,
    modifiers: u8,
    keys: Vec<u8>,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLOVER)
    }
}

impl KeyboardState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            modifiers: 0,
            keys: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn report_len(&self) -> usize {
        self.capacity + 2
    }

    /// Press a usage. Modifiers set their bit; other keys append once.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::RolloverFull`] when a new ordinary key arrives while
    /// `capacity` keys are already held. The state is left untouched.
    pub fn press(&mut self, code: u8) -> ProtocolResult<()> {
        if let Some(bit) = modifier_bit(code) {
            self.modifiers |= bit;
            return Ok(());
        }
        if self.keys.contains(&code) {
            return Ok(());
        }
        if self.keys.len() >= self.capacity {
            return Err(ProtocolError::RolloverFull {
                capacity: self.capacity,
            });
        }
        self.keys.push(code);
        Ok(())
    }

    /// Release a usage. Releasing something not held does nothing.
    pub fn release(&mut self, code: u8) {
        if let Some(bit) = modifier_bit(code) {
            self.modifiers &= !bit;
            return;
        }
        if let Some(pos) = self.keys.iter().position(|&k| k == code) {
            self.keys.remove(pos);
        }
    }

    pub fn is_pressed(&self, code: u8) -> bool {
        match modifier_bit(code) {
            Some(bit) => self.modifiers & bit != 0,
            None => self.keys.contains(&code),
        }
    }

    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    pub fn keys(&self) -> &[u8] {
        &self.keys
    }

    pub fn reset(&mut self) {
        self.modifiers = 0;
        self.keys.clear();
    }
}

fn modifier_bit(code: u8) -> Option<u8> {
    if is_modifier(code) {
        code.checked_sub(MODIFIER_BASE).map(|shift| 1u8 << shift)
    } else {
        None
    }
}

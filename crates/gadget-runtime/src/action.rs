//! Mapping from named controller actions onto device state

use hid_gadget_protocol::{JoystickShape, JoystickState, MouseShape, MouseState};
use serde::{Deserialize, Serialize};

use crate::input::InputSnapshot;
use crate::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickBinding {
    pub action: String,
    /// Controller APIs report up as positive Y, HID reports down as positive.
    #[serde(default)]
    pub invert_y: bool,
}

impl StickBinding {
    fn inverted(action: &str) -> Self {
        Self {
            action: action.to_string(),
            invert_y: true,
        }
    }
}

/// Bindings by position: stick `i` reads `sticks[i]`, button `i` reads
/// `buttons[i]`. Triggers read the analog action's `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickBindings {
    pub sticks: Vec<StickBinding>,
    pub triggers: Vec<String>,
    pub buttons: Vec<String>,
}

impl Default for JoystickBindings {
    fn default() -> Self {
        Self {
            sticks: vec![
                StickBinding::inverted("JoyLeft"),
                StickBinding::inverted("JoyRight"),
            ],
            triggers: names(&["TrigLeft", "TrigRight"]),
            buttons: names(&[
                "A",
                "B",
                "X",
                "Y",
                "UP",
                "DOWN",
                "LEFT",
                "RIGHT",
                "BumpLeft",
                "BumpRight",
                "Menu",
                "Start",
                "JoyPressLeft",
                "JoyPressRight",
                "BackLeftTop",
                "BackLeftBottom",
                "BackRightTop",
                "BackRightBottom",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseBindings {
    /// Analog action carrying relative motion in device units
    pub motion: Option<String>,
    /// Multiplier applied before truncating motion to whole units
    pub scale: f32,
    pub buttons: Vec<String>,
}

impl Default for MouseBindings {
    fn default() -> Self {
        Self {
            motion: Some("Mouse".to_string()),
            scale: 1.0,
            buttons: names(&["MouseClickLeft", "MouseClickRight"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionMap {
    pub joystick: JoystickBindings,
    pub mouse: MouseBindings,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn check_count(what: &str, bound: usize, available: usize) -> RuntimeResult<()> {
    if bound > available {
        return Err(RuntimeError::InvalidConfig(format!(
            "{bound} {what} bound but the device has {available}"
        )));
    }
    Ok(())
}

impl ActionMap {
    /// Every binding must fit the configured shapes.
    pub fn validate(&self, joystick: &JoystickShape, mouse: &MouseShape) -> RuntimeResult<()> {
        check_count("sticks", self.joystick.sticks.len(), joystick.sticks)?;
        check_count("triggers", self.joystick.triggers.len(), joystick.triggers)?;
        check_count("joystick buttons", self.joystick.buttons.len(), joystick.buttons)?;
        check_count("mouse buttons", self.mouse.buttons.len(), mouse.buttons)?;
        if !self.mouse.scale.is_finite() {
            return Err(RuntimeError::InvalidConfig(format!(
                "mouse scale {} is not finite",
                self.mouse.scale
            )));
        }
        Ok(())
    }

    /// Write the bound actions of `input` into `state`. Unbound inputs are
    /// left as they were.
    pub fn apply_joystick(&self, input: &InputSnapshot, state: &mut JoystickState) {
        let shape = *state.shape();
        for (index, binding) in self.joystick.sticks.iter().take(shape.sticks).enumerate() {
            let value = input.analog(&binding.action);
            let y = if binding.invert_y { -value.y } else { value.y };
            state.set_stick(index, value.x, y);
        }
        for (index, action) in self.joystick.triggers.iter().take(shape.triggers).enumerate() {
            state.set_trigger(index, input.analog(action).x);
        }
        for (index, action) in self.joystick.buttons.iter().take(shape.buttons).enumerate() {
            state.set_button(index, input.digital(action));
        }
    }

    pub fn apply_mouse(&self, input: &InputSnapshot, state: &mut MouseState) {
        if let Some(action) = &self.mouse.motion {
            let value = input.analog(action);
            let scale = self.mouse.scale;
            state.move_by((value.x * scale) as i32, (value.y * scale) as i32);
        }
        let buttons = state.shape().buttons;
        for (index, action) in self.mouse.buttons.iter().take(buttons).enumerate() {
            state.set_button(index, input.digital(action));
        }
    }
}

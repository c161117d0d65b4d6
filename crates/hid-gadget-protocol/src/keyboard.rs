//! Latching on-screen keyboard
//!
//! The virtual keyboard has no physical "held" state, so modifiers behave like
//! sticky keys: tapping Shift engages it, tapping it again releases it, and it
//! also releases on its own after the next ordinary keystroke. Caps Lock is
//! sent to the host like any key, and its logical state comes back through
//! the host's LED output report.

use serde::{Deserialize, Serialize};

use crate::report::KeyboardLeds;
use crate::scancode::{self, KEY_CAPSLOCK, is_modifier, is_shift};
use crate::state::KeyboardState;
use crate::ProtocolResult;

/// How a key on the virtual keyboard behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Sent as press then release.
    Standard(u8),
    /// Caps Lock, whose logical state the host owns.
    Capslock,
    /// Modifier that toggles on each tap.
    Latching { modifier: u8 },
    /// Local layer switch, never sent to the host.
    Function,
}

impl KeyKind {
    /// Classify a key name from a layout.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::ProtocolError::UnknownKey`] from [`scancode::lookup`].
    pub fn from_name(name: &str) -> ProtocolResult<Self> {
        if name.eq_ignore_ascii_case("fn") || name.eq_ignore_ascii_case("function") {
            return Ok(KeyKind::Function);
        }
        let code = scancode::lookup(name)?;
        Ok(if code == KEY_CAPSLOCK {
            KeyKind::Capslock
        } else if is_modifier(code) {
            KeyKind::Latching { modifier: code }
        } else {
            KeyKind::Standard(code)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    Press(u8),
    Release(u8),
}

/// Flags a keyboard UI renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyDisplayState {
    pub capslock: bool,
    pub shift: bool,
    pub numlock: bool,
    pub scrolllock: bool,
    pub function: bool,
}

impl KeyDisplayState {
    /// Shift and Caps Lock cancel each other out.
    pub fn uppercase(&self) -> bool {
        self.shift ^ self.capslock
    }

    pub fn apply_leds(&mut self, leds: KeyboardLeds) {
        self.capslock = leds.caps_lock;
        self.numlock = leds.num_lock;
        self.scrolllock = leds.scroll_lock;
    }
}

#[derive(Debug, Clone, Default)]
pub struct LatchingKeyboard {
    latched: Vec<u8>,
    display: KeyDisplayState,
}

impl LatchingKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(&self) -> KeyDisplayState {
        self.display
    }

    pub fn is_latched(&self, modifier: u8) -> bool {
        self.latched.contains(&modifier)
    }

    /// Events produced by one tap of `key`, in the order they must be sent.
    pub fn tap(&mut self, key: KeyKind) -> Vec<KeyEvent> {
        match key {
            KeyKind::Latching { modifier } => {
                if let Some(pos) = self.latched.iter().position(|&m| m == modifier) {
                    self.latched.remove(pos);
                    self.refresh_shift();
                    vec![KeyEvent::Release(modifier)]
                } else {
                    self.latched.push(modifier);
                    self.refresh_shift();
                    vec![KeyEvent::Press(modifier)]
                }
            }
            KeyKind::Standard(code) => {
                let mut events = vec![KeyEvent::Press(code), KeyEvent::Release(code)];
                events.extend(self.latched.drain(..).map(KeyEvent::Release));
                self.refresh_shift();
                events
            }
            KeyKind::Capslock => vec![KeyEvent::Press(KEY_CAPSLOCK), KeyEvent::Release(KEY_CAPSLOCK)],
            KeyKind::Function => {
                self.display.function = !self.display.function;
                Vec::new()
            }
        }
    }

    /// Fold one event into the held-key state.
    ///
    /// # Errors
    ///
    /// [`crate::ProtocolError::RolloverFull`] when the press does not fit.
    pub fn apply(event: KeyEvent, state: &mut KeyboardState) -> ProtocolResult<()> {
        match event {
            KeyEvent::Press(code) => state.press(code),
            KeyEvent::Release(code) => {
                state.release(code);
                Ok(())
            }
        }
    }

    pub fn apply_leds(&mut self, leds: KeyboardLeds) {
        self.display.apply_leds(leds);
    }

    fn refresh_shift(&mut self) {
        self.display.shift = self.latched.iter().any(|&m| is_shift(m));
    }
}

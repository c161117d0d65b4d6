//! Typed HID devices: a state model bound to a report sink

use hid_gadget_protocol::{
    JoystickShape, JoystickState, KeyEvent, KeyboardState, LatchingKeyboard, MouseShape,
    MouseState, encode_joystick, encode_keyboard, encode_mouse,
};

use crate::RuntimeResult;
use crate::sink::ReportSink;

#[derive(Debug)]
pub struct JoystickDevice<S> {
    state: JoystickState,
    sink: S,
}

impl<S: ReportSink> JoystickDevice<S> {
    pub fn new(shape: JoystickShape, sink: S) -> Self {
        Self {
            state: JoystickState::new(shape),
            sink,
        }
    }

    pub fn state(&self) -> &JoystickState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut JoystickState {
        &mut self.state
    }

    /// Encode the current state and send it.
    pub fn update(&mut self) -> RuntimeResult<()> {
        self.sink.send_report(&encode_joystick(&self.state))
    }

    /// Centre everything and send the idle report.
    pub fn close(&mut self) -> RuntimeResult<()> {
        self.state.reset();
        self.update()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[derive(Debug)]
pub struct MouseDevice<S> {
    state: MouseState,
    sink: S,
}

impl<S: ReportSink> MouseDevice<S> {
    pub fn new(shape: MouseShape, sink: S) -> Self {
        Self {
            state: MouseState::new(shape),
            sink,
        }
    }

    pub fn state(&self) -> &MouseState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MouseState {
        &mut self.state
    }

    /// Send the pending motion, then clear it. Motion is kept if the write
    /// fails.
    pub fn update(&mut self) -> RuntimeResult<()> {
        self.sink.send_report(&encode_mouse(&self.state))?;
        self.state.clear_motion();
        Ok(())
    }

    pub fn close(&mut self) -> RuntimeResult<()> {
        self.state.reset();
        self.update()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[derive(Debug)]
pub struct KeyboardDevice<S> {
    state: KeyboardState,
    sink: S,
}

impl<S: ReportSink> KeyboardDevice<S> {
    pub fn new(rollover: usize, sink: S) -> Self {
        Self {
            state: KeyboardState::new(rollover),
            sink,
        }
    }

    pub fn state(&self) -> &KeyboardState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut KeyboardState {
        &mut self.state
    }

    pub fn update(&mut self) -> RuntimeResult<()> {
        self.sink.send_report(&encode_keyboard(&self.state))
    }

    /// Fold `event` into the held keys and send the resulting report.
    pub fn send_event(&mut self, event: KeyEvent) -> RuntimeResult<()> {
        LatchingKeyboard::apply(event, &mut self.state)?;
        self.update()
    }

    /// Release every key and send the empty report.
    pub fn close(&mut self) -> RuntimeResult<()> {
        self.state.reset();
        self.update()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

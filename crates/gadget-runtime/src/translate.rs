//! Input-to-report translation loop

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::RuntimeResult;
use crate::action::ActionMap;
use crate::device::{JoystickDevice, MouseDevice};
use crate::events::{GadgetEvent, Notifier};
use crate::input::{InputSource, Poll};
use crate::sink::ReportSink;

/// Polls an [`InputSource`] and writes one report per active device per
/// frame. Without a `poll_interval` the loop runs as fast as the source
/// yields frames.
pub struct TranslationLoop<I, S> {
    source: I,
    map: ActionMap,
    joystick: Option<JoystickDevice<S>>,
    mouse: Option<MouseDevice<S>>,
    notifier: Notifier,
    poll_interval: Option<Duration>,
    connected: Option<bool>,
    frames: u64,
}

impl<I: InputSource, S: ReportSink> TranslationLoop<I, S> {
    pub fn new(source: I, map: ActionMap) -> Self {
        Self {
            source,
            map,
            joystick: None,
            mouse: None,
            notifier: Notifier::disabled(),
            poll_interval: None,
            connected: None,
            frames: 0,
        }
    }

    pub fn with_joystick(mut self, device: JoystickDevice<S>) -> Self {
        self.joystick = Some(device);
        self
    }

    pub fn with_mouse(mut self, device: MouseDevice<S>) -> Self {
        self.mouse = Some(device);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn joystick(&self) -> Option<&JoystickDevice<S>> {
        self.joystick.as_ref()
    }

    pub fn mouse(&self) -> Option<&MouseDevice<S>> {
        self.mouse.as_ref()
    }

    /// Frames translated so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Handle one poll of the source. Returns `false` once the source is
    /// finished.
    pub fn step(&mut self) -> RuntimeResult<bool> {
        let snapshot = match self.source.poll()? {
            Poll::Frame(snapshot) => snapshot,
            Poll::Disconnected => {
                if self.connected != Some(false) {
                    warn!("Controller disconnected, waiting");
                    self.notifier.notify(GadgetEvent::ControllerDisconnected);
                    self.connected = Some(false);
                }
                return Ok(true);
            }
            Poll::Finished => {
                info!(frames = self.frames, "Input source finished");
                self.notifier.notify(GadgetEvent::SourceFinished);
                return Ok(false);
            }
        };

        if self.connected != Some(true) {
            info!("Controller connected");
            self.notifier.notify(GadgetEvent::ControllerConnected);
            self.connected = Some(true);
        }

        if let Some(joystick) = &mut self.joystick {
            self.map.apply_joystick(&snapshot, joystick.state_mut());
            joystick.update()?;
        }
        if let Some(mouse) = &mut self.mouse {
            self.map.apply_mouse(&snapshot, mouse.state_mut());
            mouse.update()?;
        }
        self.notifier.notify(GadgetEvent::Input(snapshot));
        self.frames += 1;
        Ok(true)
    }

    /// Step until the source finishes, then send idle reports. Errors stop
    /// the loop without the idle reports.
    pub fn run(&mut self) -> RuntimeResult<u64> {
        while self.step()? {
            if let Some(interval) = self.poll_interval {
                thread::sleep(interval);
            }
        }
        self.close()?;
        Ok(self.frames)
    }

    /// Send the all-zero report on every device.
    pub fn close(&mut self) -> RuntimeResult<()> {
        debug!("Closing translation devices");
        if let Some(joystick) = &mut self.joystick {
            joystick.close()?;
        }
        if let Some(mouse) = &mut self.mouse {
            mouse.close()?;
        }
        Ok(())
    }
}

//! Device discovery, startup checks and worker threads

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Receiver;
use gadget_configfs::{FunctionKind, GadgetManager};
use hid_gadget_protocol::{
    HidClass, JoystickShape, KeyDisplayState, MouseShape, ReportSizeCalculator,
    ShortItemCalculator,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::action::ActionMap;
use crate::device::{JoystickDevice, KeyboardDevice, MouseDevice};
use crate::events::{GadgetEvent, Notifier};
use crate::input::InputSource;
use crate::listener::OutputReportListener;
use crate::session::KeyboardSession;
use crate::sink::HidDevice;
use crate::translate::TranslationLoop;
use crate::{RuntimeError, RuntimeResult};

/// Runtime section of the application config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub joystick: JoystickShape,
    pub mouse: MouseShape,
    /// Non-modifier keys held at once
    pub keyboard_rollover: usize,
    pub actions: ActionMap,
    /// Pause between frames. Unset means poll as fast as the source allows.
    pub poll_interval_ms: Option<u64>,
    /// Undelivered events kept before new ones are dropped
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            joystick: JoystickShape::default(),
            mouse: MouseShape::default(),
            keyboard_rollover: hid_gadget_protocol::state::DEFAULT_ROLLOVER,
            actions: ActionMap::default(),
            poll_interval_ms: None,
            event_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> RuntimeResult<()> {
        self.actions.validate(&self.joystick, &self.mouse)?;
        if self.keyboard_rollover == 0 {
            return Err(RuntimeError::InvalidConfig(
                "keyboard_rollover must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(RuntimeError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    /// Input report length the configured shape encodes for `class`.
    pub fn report_len(&self, class: HidClass) -> usize {
        match class {
            HidClass::Joystick => self.joystick.report_len(),
            HidClass::Mouse => self.mouse.report_len(),
            HidClass::Keyboard => {
                hid_gadget_protocol::KeyboardState::new(self.keyboard_rollover).report_len()
            }
        }
    }
}

/// Device nodes of the enabled HID functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GadgetDevices {
    pub joystick: Option<PathBuf>,
    pub mouse: Option<PathBuf>,
    pub keyboard: Option<PathBuf>,
}

impl GadgetDevices {
    /// Resolve the node of every enabled HID function after checking that
    /// its descriptor's input report matches the configured shape.
    pub fn discover(manager: &GadgetManager, config: &RuntimeConfig) -> RuntimeResult<Self> {
        Self::discover_with(manager, config, &ShortItemCalculator)
    }

    pub fn discover_with(
        manager: &GadgetManager,
        config: &RuntimeConfig,
        calculator: &dyn ReportSizeCalculator,
    ) -> RuntimeResult<Self> {
        let mut devices = Self::default();
        for kind in manager.enabled_functions()? {
            let Some(class) = kind.hid_class() else {
                continue;
            };
            let descriptor = manager.descriptor(class)?;
            let expected = calculator.report_sizes(&descriptor)?.input;
            let actual = config.report_len(class);
            if expected != actual {
                return Err(RuntimeError::ShapeMismatch {
                    class,
                    expected,
                    actual,
                });
            }

            let node = manager.device_node(kind)?;
            info!(function = %kind, device = %node.display(), "HID function found");
            match class {
                HidClass::Joystick => devices.joystick = Some(node),
                HidClass::Mouse => devices.mouse = Some(node),
                HidClass::Keyboard => devices.keyboard = Some(node),
            }
        }
        Ok(devices)
    }

    pub fn is_empty(&self) -> bool {
        self.joystick.is_none() && self.mouse.is_none() && self.keyboard.is_none()
    }

    pub fn get(&self, kind: FunctionKind) -> Option<&PathBuf> {
        match kind.hid_class()? {
            HidClass::Joystick => self.joystick.as_ref(),
            HidClass::Mouse => self.mouse.as_ref(),
            HidClass::Keyboard => self.keyboard.as_ref(),
        }
    }
}

/// Running translation and LED-listener threads.
///
/// The listener blocks on the device with no timeout and lives until the
/// process exits.
pub struct Runtime {
    translate: Option<JoinHandle<RuntimeResult<u64>>>,
    listener: Option<JoinHandle<RuntimeResult<()>>>,
    keyboard: Option<KeyboardSession<HidDevice>>,
    display: Arc<Mutex<KeyDisplayState>>,
    events: Receiver<GadgetEvent>,
}

fn spawn_worker<T: Send + 'static>(
    name: &str,
    work: impl FnOnce() -> RuntimeResult<T> + Send + 'static,
) -> RuntimeResult<JoinHandle<RuntimeResult<T>>> {
    let thread_name = name.to_string();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = work();
            if let Err(err) = &result {
                error!(thread = %thread_name, error = %err, "Worker stopped");
            }
            result
        })
        .map_err(|source| RuntimeError::Spawn {
            name: name.to_string(),
            source,
        })
}

impl Runtime {
    /// Open the devices and start the workers. The translation thread runs
    /// only with a joystick or mouse, the listener only with a keyboard.
    pub fn spawn<I: InputSource + 'static>(
        source: I,
        devices: &GadgetDevices,
        config: &RuntimeConfig,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let (notifier, events) = Notifier::channel(config.event_capacity);
        let display = Arc::new(Mutex::new(KeyDisplayState::default()));

        let joystick = devices
            .joystick
            .as_ref()
            .map(|path| HidDevice::open(path).map(|d| JoystickDevice::new(config.joystick, d)))
            .transpose()?;
        let mouse = devices
            .mouse
            .as_ref()
            .map(|path| HidDevice::open(path).map(|d| MouseDevice::new(config.mouse, d)))
            .transpose()?;

        let translate = if joystick.is_some() || mouse.is_some() {
            let mut lp = TranslationLoop::new(source, config.actions.clone())
                .with_notifier(notifier.clone())
                .with_poll_interval(config.poll_interval());
            if let Some(joystick) = joystick {
                lp = lp.with_joystick(joystick);
            }
            if let Some(mouse) = mouse {
                lp = lp.with_mouse(mouse);
            }
            Some(spawn_worker("gadget-translate", move || lp.run())?)
        } else {
            None
        };

        let (keyboard, listener) = match &devices.keyboard {
            Some(path) => {
                let device = HidDevice::open(path)?;
                let reader = device.open_reader()?;
                let mut listener = OutputReportListener::new(reader, display.clone())
                    .with_notifier(notifier.clone());
                let handle = spawn_worker("gadget-leds", move || listener.run())?;
                let session = KeyboardSession::new(
                    KeyboardDevice::new(config.keyboard_rollover, device),
                    display.clone(),
                )
                .with_notifier(notifier);
                (Some(session), Some(handle))
            }
            None => (None, None),
        };

        info!(
            translate = translate.is_some(),
            listener = listener.is_some(),
            "Runtime started"
        );
        Ok(Self {
            translate,
            listener,
            keyboard,
            display,
            events,
        })
    }

    pub fn events(&self) -> &Receiver<GadgetEvent> {
        &self.events
    }

    pub fn display(&self) -> KeyDisplayState {
        *self.display.lock()
    }

    pub fn keyboard(&mut self) -> Option<&mut KeyboardSession<HidDevice>> {
        self.keyboard.as_mut()
    }

    pub fn is_translating(&self) -> bool {
        self.translate.is_some()
    }

    /// True once the translation thread has exited, or if there is none.
    pub fn translation_finished(&self) -> bool {
        self.translate
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Wait for the translation thread and return the frames it handled,
    /// then release the keyboard. The listener is left running. Without a
    /// translation thread this returns at once.
    pub fn join(mut self) -> RuntimeResult<u64> {
        if let Some(listener) = self.listener.take() {
            if listener.is_finished() {
                join_worker("gadget-leds", listener)?;
            }
        }
        let frames = match self.translate.take() {
            Some(handle) => join_worker("gadget-translate", handle),
            None => Ok(0),
        };
        let released = self.release_keyboard();
        let frames = frames?;
        released?;
        Ok(frames)
    }

    fn release_keyboard(&mut self) -> RuntimeResult<()> {
        match self.keyboard.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(err) = self.release_keyboard() {
            warn!(error = %err, "Keyboard release failed");
        }
    }
}

fn join_worker<T>(name: &str, handle: JoinHandle<RuntimeResult<T>>) -> RuntimeResult<T> {
    handle
        .join()
        .map_err(|_panic| RuntimeError::WorkerPanicked(name.to_string()))?
}

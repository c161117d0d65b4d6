//! On-screen keyboard session

use std::sync::Arc;

use hid_gadget_protocol::scancode::{SHIFT_LEFT, SHIFT_RIGHT, char_key};
use hid_gadget_protocol::{KeyDisplayState, KeyKind, LatchingKeyboard, ProtocolError};
use parking_lot::Mutex;
use tracing::debug;

use crate::RuntimeResult;
use crate::device::KeyboardDevice;
use crate::events::{GadgetEvent, Notifier};
use crate::sink::ReportSink;

/// Drives a keyboard function from key taps. Shift and the function layer
/// are tracked here. Lock states come from the host through
/// [`crate::OutputReportListener`] writing the same shared display.
pub struct KeyboardSession<S> {
    keyboard: LatchingKeyboard,
    device: KeyboardDevice<S>,
    display: Arc<Mutex<KeyDisplayState>>,
    notifier: Notifier,
}

impl<S: ReportSink> KeyboardSession<S> {
    pub fn new(device: KeyboardDevice<S>, display: Arc<Mutex<KeyDisplayState>>) -> Self {
        Self {
            keyboard: LatchingKeyboard::new(),
            device,
            display,
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn display(&self) -> KeyDisplayState {
        *self.display.lock()
    }

    pub fn device(&self) -> &KeyboardDevice<S> {
        &self.device
    }

    /// Tap one named key, sending a report after every resulting event.
    pub fn type_key(&mut self, name: &str) -> RuntimeResult<()> {
        let kind = KeyKind::from_name(name)?;
        self.tap(kind)
    }

    /// Type `text` key by key, latching Shift where a character needs it and
    /// releasing any latched Shift where it does not. Letters honour the Caps
    /// Lock state in the shared display, which is only as current as the last
    /// LED report folded into it.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownKey`] for a character with no key. Characters
    /// before it have already been sent.
    pub fn type_text(&mut self, text: &str) -> RuntimeResult<()> {
        for c in text.chars() {
            let (code, mut shift) =
                char_key(c).ok_or_else(|| ProtocolError::UnknownKey(c.to_string()))?;
            if c.is_ascii_alphabetic() && self.display.lock().capslock {
                shift = !shift;
            }
            if shift && !self.keyboard.display().shift {
                self.tap(KeyKind::Latching {
                    modifier: SHIFT_LEFT,
                })?;
            } else if !shift {
                for modifier in [SHIFT_LEFT, SHIFT_RIGHT] {
                    if self.keyboard.is_latched(modifier) {
                        self.tap(KeyKind::Latching { modifier })?;
                    }
                }
            }
            self.tap(KeyKind::Standard(code))?;
        }
        Ok(())
    }

    fn tap(&mut self, kind: KeyKind) -> RuntimeResult<()> {
        for event in self.keyboard.tap(kind) {
            debug!(?event, "key");
            self.device.send_event(event)?;
        }

        let local = self.keyboard.display();
        let display = {
            let mut display = self.display.lock();
            display.shift = local.shift;
            display.function = local.function;
            *display
        };
        self.notifier.notify(GadgetEvent::KeyDisplay(display));
        Ok(())
    }

    /// Drop every latch and send the empty report. Call this before the
    /// session goes away or the host keeps the last modifiers held.
    pub fn close(&mut self) -> RuntimeResult<()> {
        self.keyboard = LatchingKeyboard::new();
        let display = {
            let mut display = self.display.lock();
            display.shift = false;
            display.function = false;
            *display
        };
        self.device.close()?;
        self.notifier.notify(GadgetEvent::KeyDisplay(display));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSink;
    use hid_gadget_protocol::scancode::{KEY_1, KEY_A};

    fn session() -> (RecordingSink, KeyboardSession<RecordingSink>) {
        let sink = RecordingSink::new();
        let display = Arc::new(Mutex::new(KeyDisplayState::default()));
        let session = KeyboardSession::new(KeyboardDevice::new(6, sink.clone()), display);
        (sink, session)
    }

    fn report(modifiers: u8, key: u8) -> Vec<u8> {
        vec![modifiers, 0, key, 0, 0, 0, 0, 0]
    }

    #[test]
    fn test_standard_key_press_release() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("a")?;
        assert_eq!(sink.reports(), vec![report(0, KEY_A), report(0, 0)]);
        Ok(())
    }

    #[test]
    fn test_latched_shift_releases_after_key() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("SHIFT_LEFT")?;
        assert!(session.display().shift);
        session.type_key("a")?;
        assert!(!session.display().shift);
        assert_eq!(
            sink.reports(),
            vec![
                report(0x02, 0),
                report(0x02, KEY_A),
                report(0x02, 0),
                report(0, 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_type_text_shifts_where_needed() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_text("A1!")?;
        assert_eq!(
            sink.reports(),
            vec![
                report(0x02, 0),
                report(0x02, KEY_A),
                report(0x02, 0),
                report(0, 0),
                report(0, KEY_1),
                report(0, 0),
                report(0x02, 0),
                report(0x02, KEY_1),
                report(0x02, 0),
                report(0, 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_type_text_respects_capslock() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.display.lock().capslock = true;
        session.type_text("Ab")?;
        let reports = sink.reports();
        assert_eq!(reports.first(), Some(&report(0, KEY_A)));
        assert_eq!(reports.get(2), Some(&report(0x02, 0)));
        Ok(())
    }

    #[test]
    fn test_right_shift_latch_cleared_for_lowercase() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("SHIFT_RIGHT")?;
        session.type_text("a")?;
        assert_eq!(
            sink.reports(),
            vec![report(0x20, 0), report(0, 0), report(0, KEY_A), report(0, 0)]
        );
        assert!(!session.display().shift);
        Ok(())
    }

    #[test]
    fn test_right_shift_latch_reused_for_uppercase() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("SHIFT_RIGHT")?;
        session.type_text("A")?;
        assert_eq!(
            sink.reports(),
            vec![
                report(0x20, 0),
                report(0x20, KEY_A),
                report(0x20, 0),
                report(0, 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_close_releases_latched_modifiers() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("SHIFT_LEFT")?;
        session.type_key("CONTROL_LEFT")?;
        assert_eq!(sink.last(), Some(report(0x03, 0)));

        session.close()?;
        assert_eq!(sink.last(), Some(report(0, 0)));
        assert!(!session.display().shift);

        // Latches do not survive the close.
        session.type_key("a")?;
        assert_eq!(sink.last(), Some(report(0, 0)));
        assert_eq!(sink.reports().iter().rev().nth(1), Some(&report(0, KEY_A)));
        Ok(())
    }

    #[test]
    fn test_unknown_key_sends_nothing() {
        let (sink, mut session) = session();
        assert!(session.type_key("unknown_key_xyz").is_err());
        assert!(session.type_text("é").is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_function_layer_is_local() -> RuntimeResult<()> {
        let (sink, mut session) = session();
        session.type_key("fn")?;
        assert!(session.display().function);
        assert!(sink.is_empty());
        Ok(())
    }
}

//! Notifications for whatever renders the gadget's state

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use hid_gadget_protocol::{KeyDisplayState, KeyboardLeds};
use serde::Serialize;
use tracing::{trace, warn};

use crate::input::InputSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GadgetEvent {
    Input(InputSnapshot),
    ControllerConnected,
    ControllerDisconnected,
    SourceFinished,
    Leds(KeyboardLeds),
    KeyDisplay(KeyDisplayState),
}

/// Non-blocking sender side of the event channel. Workers never wait on a
/// slow consumer; events that do not fit are dropped and counted.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<Sender<GadgetEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    /// Bounded channel holding at most `capacity` undelivered events.
    pub fn channel(capacity: usize) -> (Self, Receiver<GadgetEvent>) {
        let (tx, rx) = channel::bounded(capacity);
        (
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Notifier that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn notify(&self, event: GadgetEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, "Event channel full, dropping event");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Event receiver gone");
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops() {
        let (notifier, rx) = Notifier::channel(1);
        notifier.notify(GadgetEvent::ControllerConnected);
        notifier.notify(GadgetEvent::ControllerDisconnected);
        assert_eq!(notifier.dropped(), 1);
        assert_eq!(rx.try_recv().ok(), Some(GadgetEvent::ControllerConnected));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_and_disconnected_are_silent() {
        Notifier::disabled().notify(GadgetEvent::SourceFinished);

        let (notifier, rx) = Notifier::channel(4);
        drop(rx);
        notifier.notify(GadgetEvent::SourceFinished);
        assert_eq!(notifier.dropped(), 0);
    }

    #[test]
    fn test_event_json() -> Result<(), serde_json::Error> {
        let event = GadgetEvent::Leds(KeyboardLeds::from_bits(KeyboardLeds::CAPS_LOCK));
        assert_eq!(
            serde_json::to_string(&event)?,
            r#"{"event":"leds","num_lock":false,"caps_lock":true,"scroll_lock":false}"#
        );
        let event = GadgetEvent::Input(InputSnapshot::new().with_digital("A", true));
        assert_eq!(
            serde_json::to_string(&event)?,
            r#"{"event":"input","analog":{},"digital":{"A":true}}"#
        );
        Ok(())
    }
}

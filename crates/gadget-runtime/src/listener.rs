//! Keyboard LED output-report listener
//!
//! The host sends Num/Caps/Scroll Lock state to the keyboard function as a one
//! byte output report, readable on the same `hidg` node the input reports are
//! written to.

use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;

use hid_gadget_protocol::{KeyDisplayState, KeyboardLeds, decode_keyboard_output};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::events::{GadgetEvent, Notifier};
use crate::{RuntimeError, RuntimeResult};

/// Wait up to `timeout` for `fd` to become readable.
fn wait_readable(fd: BorrowedFd<'_>, timeout: PollTimeout) -> RuntimeResult<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ready = loop {
        match poll(&mut fds, timeout) {
            Ok(ready) => break ready,
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err.into()),
        }
    };
    if ready == 0 {
        return Ok(false);
    }
    let hung_up = fds
        .first()
        .and_then(PollFd::revents)
        .is_some_and(|revents| revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP));
    if hung_up {
        return Err(RuntimeError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device error or hangup",
        )));
    }
    Ok(true)
}

pub struct OutputReportListener<R> {
    reader: R,
    display: Arc<Mutex<KeyDisplayState>>,
    notifier: Notifier,
}

impl<R: Read + Seek + AsFd> OutputReportListener<R> {
    pub fn new(reader: R, display: Arc<Mutex<KeyDisplayState>>) -> Self {
        Self {
            reader,
            display,
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Wait for one output report and fold it into the shared display state.
    /// `None` means the reader hit end of file.
    pub fn step(&mut self) -> RuntimeResult<Option<KeyboardLeds>> {
        wait_readable(self.reader.as_fd(), PollTimeout::NONE)?;
        self.read_report()
    }

    /// Fold in a report the host has already queued, without waiting.
    pub fn take_pending(&mut self) -> RuntimeResult<Option<KeyboardLeds>> {
        if !wait_readable(self.reader.as_fd(), PollTimeout::ZERO)? {
            return Ok(None);
        }
        self.read_report()
    }

    fn read_report(&mut self) -> RuntimeResult<Option<KeyboardLeds>> {
        let mut buf = [0u8; 1];
        let read = self.reader.read(&mut buf)?;
        self.reader.seek(SeekFrom::Start(0))?;
        let Some(report) = buf.get(..read).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        let leds = decode_keyboard_output(report)?;
        debug!(?leds, "LED report");

        let display = {
            let mut display = self.display.lock();
            display.apply_leds(leds);
            *display
        };
        self.notifier.notify(GadgetEvent::Leds(leds));
        self.notifier.notify(GadgetEvent::KeyDisplay(display));
        Ok(Some(leds))
    }

    /// Process reports until end of file or an error.
    pub fn run(&mut self) -> RuntimeResult<()> {
        while self.step()?.is_some() {}
        info!("Output report stream closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_step_decodes_and_rewinds() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::tempfile()?;
        file.write_all(&[KeyboardLeds::CAPS_LOCK | KeyboardLeds::NUM_LOCK])?;
        file.seek(SeekFrom::Start(0))?;

        let display = Arc::new(Mutex::new(KeyDisplayState::default()));
        let (notifier, rx) = Notifier::channel(8);
        let mut listener =
            OutputReportListener::new(file, display.clone()).with_notifier(notifier);

        let leds = listener.step()?;
        assert_eq!(leds, Some(KeyboardLeds::from_bits(0x03)));
        assert!(display.lock().capslock);
        assert!(display.lock().numlock);
        assert!(!display.lock().scrolllock);

        // Rewound, so the same report is read again.
        assert_eq!(listener.step()?, leds);
        assert_eq!(rx.try_iter().count(), 4);
        Ok(())
    }

    #[test]
    fn test_leds_keep_local_flags() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::tempfile()?;
        file.write_all(&[0x00])?;
        file.seek(SeekFrom::Start(0))?;

        let display = Arc::new(Mutex::new(KeyDisplayState {
            capslock: true,
            shift: true,
            ..KeyDisplayState::default()
        }));
        let mut listener = OutputReportListener::new(file, display.clone());
        listener.step()?;

        let state = *display.lock();
        assert!(!state.capslock);
        assert!(state.shift);
        assert!(state.uppercase());
        Ok(())
    }

    #[test]
    fn test_take_pending_seeds_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::tempfile()?;
        file.write_all(&[KeyboardLeds::CAPS_LOCK])?;
        file.seek(SeekFrom::Start(0))?;

        let display = Arc::new(Mutex::new(KeyDisplayState::default()));
        let mut listener = OutputReportListener::new(file, display.clone());
        assert_eq!(listener.take_pending()?, Some(KeyboardLeds::from_bits(0x02)));
        assert!(display.lock().capslock);
        Ok(())
    }

    #[test]
    fn test_take_pending_without_report() -> RuntimeResult<()> {
        let display = Arc::new(Mutex::new(KeyDisplayState::default()));
        let mut listener = OutputReportListener::new(tempfile::tempfile()?, display.clone());
        assert_eq!(listener.take_pending()?, None);
        assert!(!display.lock().capslock);
        Ok(())
    }

    #[test]
    fn test_empty_file_ends_run() -> RuntimeResult<()> {
        let file = tempfile::tempfile()?;
        let display = Arc::new(Mutex::new(KeyDisplayState::default()));
        OutputReportListener::new(file, display).run()
    }
}

//! Test doubles for sinks and input sources

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::input::{InputSnapshot, InputSource, Poll};
use crate::sink::ReportSink;
use crate::{RuntimeError, RuntimeResult};

/// Sink that records every report. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every write fails with a broken pipe.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.reports.lock().clone()
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.reports.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for RecordingSink {
    fn send_report(&mut self, report: &[u8]) -> RuntimeResult<()> {
        if self.fail {
            return Err(RuntimeError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.reports.lock().push(report.to_vec());
        Ok(())
    }
}

/// Source that replays a fixed script, then reports `Finished`.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Poll>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Poll>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn frames(frames: impl IntoIterator<Item = InputSnapshot>) -> Self {
        Self::new(frames.into_iter().map(Poll::Frame))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedSource {
    fn poll(&mut self) -> RuntimeResult<Poll> {
        Ok(self.script.pop_front().unwrap_or(Poll::Finished))
    }
}

//! Controller input boundary
//!
//! An [`InputSource`] hands the translation loop one [`InputSnapshot`] per
//! frame: named analog actions (x/y pairs) and named digital actions. Whatever
//! produces them (a controller SDK, a replay file, stdin) lives behind the
//! trait.

use std::collections::BTreeMap;
use std::io::{self, BufRead};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogValue {
    pub x: f32,
    pub y: f32,
}

impl AnalogValue {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One frame of controller input. Missing actions read as idle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSnapshot {
    pub analog: BTreeMap<String, AnalogValue>,
    pub digital: BTreeMap<String, bool>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analog(mut self, action: &str, x: f32, y: f32) -> Self {
        self.analog.insert(action.to_string(), AnalogValue::new(x, y));
        self
    }

    pub fn with_digital(mut self, action: &str, pressed: bool) -> Self {
        self.digital.insert(action.to_string(), pressed);
        self
    }

    pub fn analog(&self, action: &str) -> AnalogValue {
        self.analog.get(action).copied().unwrap_or_default()
    }

    pub fn digital(&self, action: &str) -> bool {
        self.digital.get(action).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    Frame(InputSnapshot),
    /// No controller connected right now. The loop skips the frame.
    Disconnected,
    /// The source is exhausted and the loop should stop.
    Finished,
}

pub trait InputSource: Send {
    /// Fetch the current frame. May block until one is available.
    fn poll(&mut self) -> RuntimeResult<Poll>;
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
    fn poll(&mut self) -> RuntimeResult<Poll> {
        (**self).poll()
    }
}

/// Reads one JSON object per line:
///
/// ```text
/// {"analog": {"JoyLeft": {"x": 0.1, "y": -0.2}}, "digital": {"A": true}}
/// ```
///
/// `{}` means no controller is connected, end of input means finished. Blank
/// lines are skipped.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    line: usize,
    buf: String,
}

pub type StdinSource = JsonLinesSource<io::BufReader<io::Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        Self::new(io::BufReader::new(io::stdin()))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Parse one non-blank line.
    pub fn parse_line(text: &str, line: usize) -> RuntimeResult<Poll> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|err| RuntimeError::InvalidInput {
                line,
                reason: err.to_string(),
            })?;
        if value.as_object().is_some_and(|obj| obj.is_empty()) {
            return Ok(Poll::Disconnected);
        }
        let snapshot =
            serde_json::from_value(value).map_err(|err| RuntimeError::InvalidInput {
                line,
                reason: err.to_string(),
            })?;
        Ok(Poll::Frame(snapshot))
    }
}

impl<R: BufRead + Send> InputSource for JsonLinesSource<R> {
    fn poll(&mut self) -> RuntimeResult<Poll> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                debug!(lines = self.line, "input closed");
                return Ok(Poll::Finished);
            }
            self.line += 1;
            let text = self.buf.trim();
            if !text.is_empty() {
                return Self::parse_line(text, self.line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_json_lines() -> RuntimeResult<()> {
        let input = concat!(
            "{\"analog\": {\"JoyLeft\": {\"x\": 0.5, \"y\": -0.25}}, \"digital\": {\"A\": true}}\n",
            "\n",
            "{}\n",
            "{\"digital\": {\"B\": false}}\n",
        );
        let mut source = JsonLinesSource::new(Cursor::new(input));

        let expected = InputSnapshot::new()
            .with_analog("JoyLeft", 0.5, -0.25)
            .with_digital("A", true);
        assert_eq!(source.poll()?, Poll::Frame(expected));
        assert_eq!(source.poll()?, Poll::Disconnected);
        assert_eq!(
            source.poll()?,
            Poll::Frame(InputSnapshot::new().with_digital("B", false))
        );
        assert_eq!(source.poll()?, Poll::Finished);
        assert_eq!(source.poll()?, Poll::Finished);
        Ok(())
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let mut source = JsonLinesSource::new(Cursor::new("{}\n{\"analog\": 3}\n"));
        assert!(matches!(source.poll(), Ok(Poll::Disconnected)));
        match source.poll() {
            Err(RuntimeError::InvalidInput { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = JsonLinesSource::<Cursor<&str>>::parse_line("{\"analogue\": {}}", 1);
        assert!(matches!(result, Err(RuntimeError::InvalidInput { .. })));
    }

    #[test]
    fn test_missing_actions_read_idle() {
        let snapshot = InputSnapshot::new().with_digital("A", true);
        assert_eq!(snapshot.analog("JoyLeft"), AnalogValue::default());
        assert!(snapshot.digital("A"));
        assert!(!snapshot.digital("B"));
    }
}

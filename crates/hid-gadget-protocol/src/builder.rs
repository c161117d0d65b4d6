//! Byte-level report building and parsing

use crate::state::AxisWidth;
use crate::{ProtocolError, ProtocolResult};

/// Append-only buffer for one input report.
///
/// Every encoder builds the whole report before anything reaches a device, so a
/// report is either complete or never written.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    buffer: Vec<u8>,
}

impl ReportBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Write `value` as a two's-complement little-endian integer of `width` bytes,
    /// saturating at the range of that width.
    pub fn write_signed(&mut self, value: i32, width: AxisWidth) -> &mut Self {
        match width {
            AxisWidth::One => {
                let clamped = value.clamp(i32::from(i8::MIN), i32::from(i8::MAX));
                let narrow = i8::try_from(clamped).unwrap_or_default();
                self.write_i8(narrow)
            }
            AxisWidth::Two => {
                let clamped = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
                let narrow = i16::try_from(clamped).unwrap_or_default();
                self.buffer.extend_from_slice(&narrow.to_le_bytes());
                self
            }
            AxisWidth::Four => {
                self.buffer.extend_from_slice(&value.to_le_bytes());
                self
            }
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Pad with zero bytes up to `len` total bytes.
    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        if self.buffer.len() < len {
            self.buffer.resize(len, 0);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over a received report.
#[derive(Debug, Clone)]
pub struct ReportParser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ReportParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        let value = self
            .data
            .get(self.position)
            .copied()
            .ok_or(ProtocolError::ReportTooShort {
                expected: self.position.saturating_add(1),
                actual: self.data.len(),
            })?;
        self.position = self.position.saturating_add(1);
        Ok(value)
    }

    pub fn read_i8(&mut self) -> ProtocolResult<i8> {
        Ok(i8::from_le_bytes([self.read_u8()?]))
    }

    pub fn read_signed(&mut self, width: AxisWidth) -> ProtocolResult<i32> {
        match width {
            AxisWidth::One => Ok(i32::from(self.read_i8()?)),
            AxisWidth::Two => {
                let lo = self.read_u8()?;
                let hi = self.read_u8()?;
                Ok(i32::from(i16::from_le_bytes([lo, hi])))
            }
            AxisWidth::Four => {
                let mut bytes = [0u8; 4];
                for byte in &mut bytes {
                    *byte = self.read_u8()?;
                }
                Ok(i32::from_le_bytes(bytes))
            }
        }
    }

    pub fn read_bytes(&mut self, count: usize) -> ProtocolResult<&'a [u8]> {
        let end = self.position.saturating_add(count);
        let slice = self
            .data
            .get(self.position..end)
            .ok_or(ProtocolError::ReportTooShort {
                expected: end,
                actual: self.data.len(),
            })?;
        self.position = end;
        Ok(slice)
    }
}

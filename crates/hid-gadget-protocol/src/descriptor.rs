//! HID report descriptors
//!
//! Descriptors are written to configfs verbatim as `report_desc`; the gadget
//! also needs the byte length of the input report (`report_length`). Sizes come
//! from a [`ReportSizeCalculator`]. [`ShortItemCalculator`] walks the short-item
//! grammar and tallies Report Size × Report Count per main item, which is all
//! that is needed for fixed-layout descriptors like the built-in ones.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{ProtocolError, ProtocolResult};

/// HID function classes with a built-in descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HidClass {
    Joystick,
    Mouse,
    Keyboard,
}

impl HidClass {
    pub const ALL: [HidClass; 3] = [HidClass::Joystick, HidClass::Mouse, HidClass::Keyboard];

    pub fn as_str(self) -> &'static str {
        match self {
            HidClass::Joystick => "joystick",
            HidClass::Mouse => "mouse",
            HidClass::Keyboard => "keyboard",
        }
    }
}

impl fmt::Display for HidClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report byte lengths, including the report ID byte when IDs are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSizes {
    pub input: usize,
    pub output: usize,
    pub feature: usize,
}

pub trait ReportSizeCalculator: Send + Sync {
    /// # Errors
    ///
    /// Implementations reject descriptors they cannot size.
    fn report_sizes(&self, descriptor: &[u8]) -> ProtocolResult<ReportSizes>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShortItemCalculator;

#[derive(Debug, Clone, Copy, Default)]
struct Globals {
    report_size: u64,
    report_count: u64,
    report_id: u8,
}

#[derive(Debug, Clone, Copy)]
enum MainKind {
    Input = 0,
    Output = 1,
    Feature = 2,
}

const LONG_ITEM_PREFIX: u8 = 0xFE;

impl ReportSizeCalculator for ShortItemCalculator {
    fn report_sizes(&self, descriptor: &[u8]) -> ProtocolResult<ReportSizes> {
        let mut globals = Globals::default();
        let mut stack: Vec<Globals> = Vec::new();
        let mut bits: BTreeMap<u8, [u64; 3]> = BTreeMap::new();
        let mut offset = 0usize;

        while let Some(&prefix) = descriptor.get(offset) {
            if prefix == LONG_ITEM_PREFIX {
                let data_len = descriptor
                    .get(offset.saturating_add(1))
                    .copied()
                    .ok_or(ProtocolError::MalformedDescriptor {
                        offset,
                        reason: "truncated long item",
                    })?;
                offset = offset.saturating_add(3).saturating_add(usize::from(data_len));
                if offset > descriptor.len() {
                    return Err(ProtocolError::MalformedDescriptor {
                        offset,
                        reason: "truncated long item",
                    });
                }
                continue;
            }

            let data_len = match prefix & 0x03 {
                3 => 4,
                n => usize::from(n),
            };
            let start = offset.saturating_add(1);
            let data = descriptor
                .get(start..start.saturating_add(data_len))
                .ok_or(ProtocolError::MalformedDescriptor {
                    offset,
                    reason: "truncated short item",
                })?;
            let value = data
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

            let item_type = (prefix >> 2) & 0x03;
            let tag = prefix >> 4;
            let main = match (item_type, tag) {
                (0, 0x8) => Some(MainKind::Input),
                (0, 0x9) => Some(MainKind::Output),
                (0, 0xB) => Some(MainKind::Feature),
                _ => None,
            };

            if let Some(kind) = main {
                let entry = bits.entry(globals.report_id).or_insert([0; 3]);
                if let Some(slot) = entry.get_mut(kind as usize) {
                    *slot = slot
                        .saturating_add(globals.report_size.saturating_mul(globals.report_count));
                }
            } else if item_type == 1 {
                match tag {
                    0x7 => globals.report_size = value,
                    0x8 => {
                        globals.report_id = u8::try_from(value)
                            .ok()
                            .filter(|&id| id != 0)
                            .ok_or(ProtocolError::MalformedDescriptor {
                                offset,
                                reason: "report id must be 1..=255",
                            })?;
                    }
                    0x9 => globals.report_count = value,
                    0xA => stack.push(globals),
                    0xB => {
                        globals = stack.pop().ok_or(ProtocolError::MalformedDescriptor {
                            offset,
                            reason: "pop without push",
                        })?;
                    }
                    _ => {}
                }
            }

            offset = start.saturating_add(data_len);
        }

        let size_of = |kind: MainKind| -> usize {
            bits.iter()
                .filter_map(|(&id, totals)| {
                    let total = totals.get(kind as usize).copied().unwrap_or(0);
                    (total > 0).then(|| {
                        let bytes = usize::try_from(total.div_ceil(8)).unwrap_or(usize::MAX);
                        bytes.saturating_add(usize::from(id != 0))
                    })
                })
                .max()
                .unwrap_or(0)
        };

        let sizes = ReportSizes {
            input: size_of(MainKind::Input),
            output: size_of(MainKind::Output),
            feature: size_of(MainKind::Feature),
        };
        trace!(?sizes, len = descriptor.len(), "sized report descriptor");
        Ok(sizes)
    }
}

/// Extract descriptor bytes from the text format: every `0xNN` token outside a
/// `//` comment is one byte, anything else is ignored.
pub fn parse_descriptor_text(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in text.lines() {
        let code = line.split_once("//").map_or(line, |(code, _)| code);
        let mut rest = code;
        while let Some(pos) = rest
            .find("0x")
            .into_iter()
            .chain(rest.find("0X"))
            .min()
        {
            let after = rest.get(pos.saturating_add(2)..).unwrap_or("");
            let digits = after.get(..2).filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()));
            match digits.and_then(|d| u8::from_str_radix(d, 16).ok()) {
                Some(byte) => {
                    bytes.push(byte);
                    rest = after.get(2..).unwrap_or("");
                }
                None => rest = after,
            }
        }
    }
    bytes
}

/// Two sticks as X/Y and Rx/Ry, two triggers as Z/Rz, all signed bytes, then
/// 24 buttons. 9-byte input report.
pub const JOYSTICK_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Game Pad)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x33, //   Usage (Rx)
    0x09, 0x34, //   Usage (Ry)
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x15, 0x81, //   Logical Minimum (-127)
    0x25, 0x7F, //   Logical Maximum (127)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x06, //   Report Count (6)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x18, //   Usage Maximum (24)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x18, //   Report Count (24)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0xC0, // End Collection
];

/// Eight buttons, 16-bit relative X/Y, vertical wheel and horizontal pan.
/// 7-byte input report.
pub const MOUSE_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Button)
    0x19, 0x01, //     Usage Minimum (1)
    0x29, 0x08, //     Usage Maximum (8)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x75, 0x01, //     Report Size (1)
    0x95, 0x08, //     Report Count (8)
    0x81, 0x02, //     Input (Data, Var, Abs)
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x16, 0x01, 0x80, // Logical Minimum (-32767)
    0x26, 0xFF, 0x7F, // Logical Maximum (32767)
    0x75, 0x10, //     Report Size (16)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x06, //     Input (Data, Var, Rel)
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x06, //     Input (Data, Var, Rel)
    0x05, 0x0C, //     Usage Page (Consumer)
    0x0A, 0x38, 0x02, // Usage (AC Pan)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x06, //     Input (Data, Var, Rel)
    0xC0, //   End Collection
    0xC0, // End Collection
];

/// Boot-protocol keyboard: modifiers, reserved byte, six usages, and a 5-bit
/// LED output report padded to one byte.
pub const KEYBOARD_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Const)
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x91, 0x02, //   Output (Data, Var, Abs)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Const)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

pub fn builtin_descriptor(class: HidClass) -> &'static [u8] {
    match class {
        HidClass::Joystick => JOYSTICK_DESCRIPTOR,
        HidClass::Mouse => MOUSE_DESCRIPTOR,
        HidClass::Keyboard => KEYBOARD_DESCRIPTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes() -> ProtocolResult<()> {
        let calc = ShortItemCalculator;
        assert_eq!(
            calc.report_sizes(JOYSTICK_DESCRIPTOR)?,
            ReportSizes {
                input: 9,
                output: 0,
                feature: 0
            }
        );
        assert_eq!(calc.report_sizes(MOUSE_DESCRIPTOR)?.input, 7);

        let keyboard = calc.report_sizes(KEYBOARD_DESCRIPTOR)?;
        assert_eq!(keyboard.input, 8);
        assert_eq!(keyboard.output, 1);
        Ok(())
    }

    #[test]
    fn test_report_ids_add_a_byte_and_take_the_largest() -> ProtocolResult<()> {
        let descriptor = [
            0x85, 0x01, // Report ID (1)
            0x75, 0x08, 0x95, 0x02, 0x81, 0x02, // 2 bytes input
            0x85, 0x02, // Report ID (2)
            0x95, 0x04, 0x81, 0x02, // 4 bytes input
            0xB1, 0x02, // 4 bytes feature
        ];
        let sizes = ShortItemCalculator.report_sizes(&descriptor)?;
        assert_eq!(sizes.input, 5);
        assert_eq!(sizes.feature, 5);
        assert_eq!(sizes.output, 0);
        Ok(())
    }

    #[test]
    fn test_push_pop_restores_globals() -> ProtocolResult<()> {
        let descriptor = [
            0x75, 0x08, 0x95, 0x01, // 8 bits x 1
            0xA4, // Push
            0x95, 0x03, 0x81, 0x02, // 3 bytes
            0xB4, // Pop
            0x81, 0x02, // 1 byte
        ];
        assert_eq!(ShortItemCalculator.report_sizes(&descriptor)?.input, 4);
        Ok(())
    }

    #[test]
    fn test_malformed_descriptors() {
        let truncated = [0x05, 0x01, 0x26, 0xFF];
        assert!(matches!(
            ShortItemCalculator.report_sizes(&truncated),
            Err(ProtocolError::MalformedDescriptor { offset: 2, .. })
        ));

        let pop = [0xB4];
        assert!(ShortItemCalculator.report_sizes(&pop).is_err());

        let zero_id = [0x85, 0x00];
        assert!(ShortItemCalculator.report_sizes(&zero_id).is_err());
    }

    #[test]
    fn test_long_item_skipped() -> ProtocolResult<()> {
        let descriptor = [0xFE, 0x02, 0x10, 0xAA, 0xBB, 0x75, 0x08, 0x95, 0x01, 0x81, 0x02];
        assert_eq!(ShortItemCalculator.report_sizes(&descriptor)?.input, 1);
        Ok(())
    }

    #[test]
    fn test_parse_descriptor_text() {
        let text = "0x05, 0x01, // Usage Page (0x99 ignored)\n\
                    0x09,0x06 0XA1 0x01\n\
                    // 0x00 whole-line comment\n\
                    0xC0 0xZZ 0x1234";
        assert_eq!(
            parse_descriptor_text(text),
            vec![0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0xC0, 0x12]
        );
    }

    #[test]
    fn test_hid_class_names() {
        let names: Vec<_> = HidClass::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["joystick", "mouse", "keyboard"]);
    }
}

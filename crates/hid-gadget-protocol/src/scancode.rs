//! USB HID keyboard usage codes (usage page 0x07)
//!
//! [`lookup`] resolves a symbolic key name the way the on-screen keyboard
//! layouts spell them. Resolution is case-insensitive and tries, in order:
//! single letters and digits (arithmetic offset), `space`, punctuation,
//! `F1`..`F24` (two contiguous ranges), modifier names, then the named table.

use crate::{ProtocolError, ProtocolResult};

pub const KEY_A: u8 = 0x04;
pub const KEY_1: u8 = 0x1E;
pub const KEY_0: u8 = 0x27;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_SPACE: u8 = 0x2C;
pub const KEY_CAPSLOCK: u8 = 0x39;
pub const KEY_F1: u8 = 0x3A;
pub const KEY_F13: u8 = 0x68;

/// First modifier usage; modifier bit `n` is usage `MODIFIER_BASE + n`.
pub const MODIFIER_BASE: u8 = 0xE0;
pub const MODIFIER_LAST: u8 = 0xE7;

pub const CONTROL_LEFT: u8 = 0xE0;
pub const SHIFT_LEFT: u8 = 0xE1;
pub const ALT_LEFT: u8 = 0xE2;
pub const GUI_LEFT: u8 = 0xE3;
pub const CONTROL_RIGHT: u8 = 0xE4;
pub const SHIFT_RIGHT: u8 = 0xE5;
pub const ALT_RIGHT: u8 = 0xE6;
pub const GUI_RIGHT: u8 = 0xE7;

const PUNCTUATION: &[(char, u8)] = &[
    ('-', 0x2D),
    ('=', 0x2E),
    ('[', 0x2F),
    (']', 0x30),
    ('\\', 0x31),
    (';', 0x33),
    ('\'', 0x34),
    ('`', 0x35),
    (',', 0x36),
    ('.', 0x37),
    ('/', 0x38),
];

/// Characters typed as Shift plus the unshifted key.
const SHIFTED: &[(char, char)] = &[
    ('!', '1'),
    ('@', '2'),
    ('#', '3'),
    ('$', '4'),
    ('%', '5'),
    ('^', '6'),
    ('&', '7'),
    ('*', '8'),
    ('(', '9'),
    (')', '0'),
    ('_', '-'),
    ('+', '='),
    ('{', '['),
    ('}', ']'),
    ('|', '\\'),
    (':', ';'),
    ('"', '\''),
    ('~', '`'),
    ('<', ','),
    ('>', '.'),
    ('?', '/'),
];

const MODIFIERS: &[(&str, u8)] = &[
    ("CONTROL_LEFT", CONTROL_LEFT),
    ("SHIFT_LEFT", SHIFT_LEFT),
    ("ALT_LEFT", ALT_LEFT),
    ("GUI_LEFT", GUI_LEFT),
    ("CONTROL_RIGHT", CONTROL_RIGHT),
    ("SHIFT_RIGHT", SHIFT_RIGHT),
    ("ALT_RIGHT", ALT_RIGHT),
    ("GUI_RIGHT", GUI_RIGHT),
];

const NAMED: &[(&str, u8)] = &[
    ("ENTER", KEY_ENTER),
    ("ESCAPE", 0x29),
    ("BACKSPACE", 0x2A),
    ("TAB", 0x2B),
    ("SPACE", KEY_SPACE),
    ("CAPSLOCK", KEY_CAPSLOCK),
    ("PRINTSCREEN", 0x46),
    ("SCROLLLOCK", 0x47),
    ("PAUSE", 0x48),
    ("INSERT", 0x49),
    ("HOME", 0x4A),
    ("PAGEUP", 0x4B),
    ("DELETE", 0x4C),
    ("END", 0x4D),
    ("PAGEDOWN", 0x4E),
    ("RIGHT", 0x4F),
    ("LEFT", 0x50),
    ("DOWN", 0x51),
    ("UP", 0x52),
    ("NUMLOCK", 0x53),
    ("MENU", 0x65),
];

/// Resolve a key name to its usage code.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownKey`] when no strategy matches.
pub fn lookup(name: &str) -> ProtocolResult<u8> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(code) = single_char(c) {
            return Ok(code);
        }
    }

    let upper = name.trim().to_ascii_uppercase();
    if let Some(code) = function_key(&upper) {
        return Ok(code);
    }

    MODIFIERS
        .iter()
        .chain(NAMED)
        .find(|(key, _)| *key == upper)
        .map(|&(_, code)| code)
        .ok_or_else(|| ProtocolError::UnknownKey(name.to_string()))
}

fn single_char(c: char) -> Option<u8> {
    let lower = c.to_ascii_lowercase();
    match lower {
        'a'..='z' => u8::try_from(lower)
            .ok()
            .and_then(|b| b.checked_sub(b'a'))
            .and_then(|offset| KEY_A.checked_add(offset)),
        '0' => Some(KEY_0),
        '1'..='9' => u8::try_from(lower)
            .ok()
            .and_then(|b| b.checked_sub(b'1'))
            .and_then(|offset| KEY_1.checked_add(offset)),
        ' ' => Some(KEY_SPACE),
        _ => PUNCTUATION
            .iter()
            .find(|(p, _)| *p == c)
            .map(|&(_, code)| code),
    }
}

fn function_key(upper: &str) -> Option<u8> {
    let digits = upper.strip_prefix('F')?;
    if digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u8 = digits.parse().ok()?;
    match number {
        1..=12 => KEY_F1.checked_add(number - 1),
        13..=24 => KEY_F13.checked_add(number - 13),
        _ => None,
    }
}

/// Key code for typing `c` on a US layout, and whether Shift is needed.
/// Returns `None` for characters with no single-key equivalent.
pub fn char_key(c: char) -> Option<(u8, bool)> {
    match c {
        '\n' => Some((KEY_ENTER, false)),
        '\t' => Some((0x2B, false)),
        'A'..='Z' => single_char(c).map(|code| (code, true)),
        _ => single_char(c).map(|code| (code, false)).or_else(|| {
            SHIFTED
                .iter()
                .find(|(shifted, _)| *shifted == c)
                .and_then(|&(_, base)| single_char(base))
                .map(|code| (code, true))
        }),
    }
}

/// True for the eight modifier usages `0xE0..=0xE7`.
pub fn is_modifier(code: u8) -> bool {
    (MODIFIER_BASE..=MODIFIER_LAST).contains(&code)
}

/// True for either shift modifier.
pub fn is_shift(code: u8) -> bool {
    code == SHIFT_LEFT || code == SHIFT_RIGHT
}

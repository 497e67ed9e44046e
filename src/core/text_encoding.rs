// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Input text decoding.
//!
//! Program sources are UTF-8 by default, but SpinASM IDE files are
//! frequently UTF-16. A byte-order mark selects the encoding explicitly;
//! without one, a zero high byte early in the buffer is taken as UTF-16LE.
//! Undecodable sequences are replaced rather than rejected, so encoding
//! damage surfaces as ordinary parse errors with line numbers.

/// A decoded source buffer plus a note describing any non-default
/// encoding choice, suitable for an info line.
pub struct DecodedSource {
    pub text: String,
    pub note: Option<&'static str>,
}

pub fn decode_source(raw: &[u8]) -> DecodedSource {
    if raw.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return DecodedSource {
            text: String::from_utf8_lossy(&raw[3..]).into_owned(),
            note: None,
        };
    }
    if raw.starts_with(&[0xFF, 0xFE]) {
        return DecodedSource {
            text: decode_utf16(&raw[2..], u16::from_le_bytes),
            note: Some("Input encoding set to UTF-16LE by BOM"),
        };
    }
    if raw.starts_with(&[0xFE, 0xFF]) {
        return DecodedSource {
            text: decode_utf16(&raw[2..], u16::from_be_bytes),
            note: Some("Input encoding set to UTF-16BE by BOM"),
        };
    }
    if raw.len() > 7 && raw[7] == 0x00 {
        return DecodedSource {
            text: decode_utf16(raw, u16::from_le_bytes),
            note: Some("Input encoding set to UTF-16LE"),
        };
    }
    DecodedSource {
        text: String::from_utf8_lossy(raw).into_owned(),
        note: None,
    }
}

fn decode_utf16(raw: &[u8], unit: impl Fn([u8; 2]) -> u16) -> String {
    // An odd trailing byte is dropped.
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units.into_iter())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::decode_source;

    #[test]
    fn plain_ascii_passes_through() {
        let decoded = decode_source(b"clr\nor 1\n");
        assert_eq!(decoded.text, "clr\nor 1\n");
        assert!(decoded.note.is_none());
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let decoded = decode_source(b"\xEF\xBB\xBFclr\n");
        assert_eq!(decoded.text, "clr\n");
        assert!(decoded.note.is_none());
    }

    #[test]
    fn utf16le_bom_selects_utf16() {
        let mut raw = vec![0xFF, 0xFE];
        for b in "clr\n".bytes() {
            raw.push(b);
            raw.push(0);
        }
        let decoded = decode_source(&raw);
        assert_eq!(decoded.text, "clr\n");
        assert_eq!(decoded.note, Some("Input encoding set to UTF-16LE by BOM"));
    }

    #[test]
    fn utf16be_bom_selects_utf16() {
        let mut raw = vec![0xFE, 0xFF];
        for b in "or 1".bytes() {
            raw.push(0);
            raw.push(b);
        }
        let decoded = decode_source(&raw);
        assert_eq!(decoded.text, "or 1");
        assert_eq!(decoded.note, Some("Input encoding set to UTF-16BE by BOM"));
    }

    #[test]
    fn bomless_utf16le_is_detected_by_zero_high_byte() {
        let mut raw = Vec::new();
        for b in "mem delay 1\n".bytes() {
            raw.push(b);
            raw.push(0);
        }
        let decoded = decode_source(&raw);
        assert_eq!(decoded.text, "mem delay 1\n");
        assert_eq!(decoded.note, Some("Input encoding set to UTF-16LE"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let decoded = decode_source(b"or 1 ; caf\xC3");
        assert!(decoded.text.starts_with("or 1 ; caf"));
    }
}

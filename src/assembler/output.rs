// Assembled program container and hex/bin output.

use std::io::{self, Write};

/// An FV-1 program is always exactly 128 instructions.
pub const PROGLEN: usize = 128;

/// Bytes per Intel HEX data record: four instructions.
const HEX_RECORD_BYTES: usize = 16;

/// The assembled program: 128 machine words, handed to the output layer
/// by move once assembly succeeds.
pub struct Program {
    words: [u32; PROGLEN],
}

impl Program {
    /// Build a program from assembled words. Missing slots are zero;
    /// extra words are ignored (the driver never produces either).
    pub fn from_words(words: &[u32]) -> Self {
        let mut buf = [0u32; PROGLEN];
        for (slot, word) in buf.iter_mut().zip(words.iter()) {
            *slot = *word;
        }
        Self { words: buf }
    }

    pub fn words(&self) -> &[u32; PROGLEN] {
        &self.words
    }

    /// Serialize as 512 bytes, each word MSB first.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PROGLEN * 4);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

/// Write raw binary output: 512 big-endian bytes.
pub fn write_bin<W: Write>(program: &Program, out: &mut W) -> io::Result<()> {
    out.write_all(&program.to_be_bytes())
}

/// Write Intel HEX output with the program placed at `0x0200 * slot`.
pub fn write_hex<W: Write>(program: &Program, slot: u8, out: &mut W) -> io::Result<()> {
    let base = 0x0200u32 * u32::from(slot);
    let bytes = program.to_be_bytes();
    for (index, chunk) in bytes.chunks(HEX_RECORD_BYTES).enumerate() {
        let addr = base + (index * HEX_RECORD_BYTES) as u32;
        write!(out, ":{:02X}{:04X}00", chunk.len(), addr & 0xffff)?;
        let mut sum = (chunk.len() as u8)
            .wrapping_add((addr >> 8) as u8)
            .wrapping_add((addr & 0xff) as u8);
        for byte in chunk {
            write!(out, "{:02X}", byte)?;
            sum = sum.wrapping_add(*byte);
        }
        writeln!(out, "{:02X}", (!sum).wrapping_add(1))?;
    }
    writeln!(out, ":00000001FF")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{write_bin, write_hex, Program, PROGLEN};

    fn nop_program() -> Program {
        Program::from_words(&[0x11; PROGLEN])
    }

    fn parse_hex_byte(s: &str) -> u8 {
        u8::from_str_radix(s, 16).unwrap()
    }

    fn verify_checksum(line: &str) {
        assert!(line.starts_with(':'), "record must start with ':'");
        let bytes = &line[1..];
        let len = parse_hex_byte(&bytes[0..2]) as usize;
        let data_end = 8 + len * 2;
        let mut sum: u8 = 0;
        for idx in (0..data_end).step_by(2) {
            sum = sum.wrapping_add(parse_hex_byte(&bytes[idx..idx + 2]));
        }
        let checksum = parse_hex_byte(&bytes[data_end..data_end + 2]);
        assert_eq!(checksum, (!sum).wrapping_add(1), "checksum for {line}");
    }

    #[test]
    fn bin_output_is_512_big_endian_bytes() {
        let program = Program::from_words(&[0xC880800F]);
        let mut out = Vec::new();
        write_bin(&program, &mut out).unwrap();
        assert_eq!(out.len(), 512);
        assert_eq!(&out[0..4], &[0xC8, 0x80, 0x80, 0x0F]);
        assert_eq!(&out[4..8], &[0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn hex_records_hold_four_instructions_each() {
        let mut out = Vec::new();
        write_hex(&nop_program(), 0, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 33);
        assert!(lines[0].starts_with(":10000000"));
        assert!(lines[1].starts_with(":10001000"));
        assert_eq!(lines.last().copied(), Some(":00000001FF"));
        for line in &lines {
            verify_checksum(line);
        }
    }

    #[test]
    fn program_slot_offsets_the_base_address() {
        for slot in 0..8u8 {
            let mut out = Vec::new();
            write_hex(&nop_program(), slot, &mut out).unwrap();
            let text = String::from_utf8(out).unwrap();
            let expected = format!(":10{:04X}00", 0x0200 * slot as u16);
            assert!(text.lines().next().unwrap().starts_with(&expected));
            for line in text.lines() {
                verify_checksum(line);
            }
        }
    }

    #[test]
    fn known_record_bytes() {
        let program = Program::from_words(&[0x11; PROGLEN]);
        let mut out = Vec::new();
        write_hex(&program, 0, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            ":1000000000000011000000110000001100000011AC"
        );
    }

    #[test]
    fn short_word_lists_are_zero_padded() {
        let program = Program::from_words(&[]);
        assert_eq!(program.words().len(), PROGLEN);
        assert!(program.words().iter().all(|w| *w == 0));
    }
}

//! Object program generation for SIC/XE.
//!
//! Produces the three record kinds of a linkable object program:
//! - **H** (Header) record: program name, start address, program size
//! - **T** (Text) records: packed object bytes, at most
//!   `text_record_limit` bytes each, contiguous addresses
//! - **E** (End) record: entry-point address
//!
//! Fields are joined with a single separator character (`^` by default):
//!
//! ```text
//! H^COPY  ^001000^00107A
//! T^001000^1E^17202D69202D...
//! E^001000
//! ```

use std::fmt;

use serde::Serialize;

use crate::config::ObjectConfig;
use crate::directives::Directive;
use crate::emitter::ObjectCode;
use crate::line::Line;

// ---------------------------------------------------------------------------
//  Records
// ---------------------------------------------------------------------------

/// The H record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderRecord {
    /// Program name (at most six characters are written).
    pub name: String,
    pub start: u32,
    /// Highest used offset (byte count minus one).
    pub size: u32,
}

/// A T record: a run of object bytes at a contiguous address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRecord {
    pub address: u32,
    pub data: Vec<u8>,
}

impl TextRecord {
    /// Address one past the last byte of this record.
    pub fn end_address(&self) -> u32 {
        self.address.saturating_add(self.data.len() as u32)
    }
}

/// The E record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndRecord {
    pub entry: u32,
}

fn format_header(h: &HeaderRecord, sep: char) -> String {
    let name: String = h.name.chars().take(6).collect();
    format!("H{sep}{name:<6}{sep}{:06X}{sep}{:06X}", h.start, h.size)
}

fn format_text(t: &TextRecord, sep: char) -> String {
    let bytes: String = t.data.iter().map(|b| format!("{b:02X}")).collect();
    format!("T{sep}{:06X}{sep}{:02X}{sep}{bytes}", t.address, t.data.len())
}

fn format_end(e: &EndRecord, sep: char) -> String {
    format!("E{sep}{:06X}", e.entry)
}

// ---------------------------------------------------------------------------
//  Object program
// ---------------------------------------------------------------------------

/// A complete object program produced by the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectProgram {
    pub header: HeaderRecord,
    pub texts: Vec<TextRecord>,
    pub end: EndRecord,
    /// Field separator.
    #[serde(skip)]
    separator: char,
    /// Text record body cap in bytes.
    #[serde(skip)]
    limit: usize,
    /// Current text buffer being accumulated.
    #[serde(skip)]
    current_txt: Vec<u8>,
    /// Bytes emitted so far, flushed or not.
    #[serde(skip)]
    emitted: u32,
}

impl ObjectProgram {
    /// Create an empty program starting at `start`.
    pub fn new(name: &str, start: u32, config: &ObjectConfig) -> Self {
        Self {
            header: HeaderRecord {
                name: name.to_uppercase(),
                start,
                size: 0,
            },
            texts: Vec::new(),
            end: EndRecord { entry: start },
            separator: config.separator,
            limit: config.text_record_limit.max(1),
            current_txt: Vec::new(),
            emitted: 0,
        }
    }

    /// Pack the emitted code of `lines` into records.
    ///
    /// The program name and start come from the `START` line, the entry
    /// point from the last line labeled with the `END` operand (falling back
    /// to the start address).
    pub fn build(lines: &[Line], code: &ObjectCode, config: &ObjectConfig) -> Self {
        let start_line = lines
            .iter()
            .find(|l| Directive::from_mnemonic(&l.mnemonic) == Some(Directive::Start));
        let name = start_line.map(|l| l.label.as_str()).unwrap_or_default();
        let start = start_line.map(|l| l.location).unwrap_or_default();

        let mut program = Self::new(name, start, config);
        for chunk in &code.chunks {
            program.emit_text(&chunk.bytes);
        }
        program.flush_txt();
        program.header.size = code.program_size();

        let entry = lines
            .iter()
            .rev()
            .find(|l| Directive::from_mnemonic(&l.mnemonic) == Some(Directive::End))
            .filter(|l| !l.operand1.is_empty())
            .and_then(|end| {
                lines
                    .iter()
                    .rev()
                    .find(|l| l.has_label() && l.label == end.operand1)
            })
            .map(|l| l.location);
        program.set_entry(entry.unwrap_or(start));
        program
    }

    // -- Text emission ----------------------------------------------------

    /// Append one record-length entry worth of bytes. A chunk that does not
    /// fit in the current record starts a new one; chunks longer than the
    /// limit are split across records.
    pub fn emit_text(&mut self, data: &[u8]) {
        if !self.current_txt.is_empty() && self.current_txt.len() + data.len() > self.limit {
            self.flush_txt();
        }
        for &byte in data {
            if self.current_txt.len() == self.limit {
                self.flush_txt();
            }
            self.current_txt.push(byte);
            self.emitted += 1;
        }
    }

    /// Close the current text buffer into a T record.
    pub fn flush_txt(&mut self) {
        if self.current_txt.is_empty() {
            return;
        }
        let address = self
            .header
            .start
            .saturating_add(self.emitted - self.current_txt.len() as u32);
        tracing::debug!(
            address = %format!("{address:06X}"),
            length = self.current_txt.len(),
            "Text record closed"
        );
        self.texts.push(TextRecord {
            address,
            data: std::mem::take(&mut self.current_txt),
        });
    }

    /// Set the entry point.
    pub fn set_entry(&mut self, address: u32) {
        self.end.entry = address;
    }

    /// Byte count of each T record.
    pub fn text_lengths(&self) -> Vec<usize> {
        self.texts.iter().map(|t| t.data.len()).collect()
    }

    /// Total object bytes across all T records.
    pub fn total_text_size(&self) -> usize {
        self.texts.iter().map(|t| t.data.len()).sum::<usize>() + self.current_txt.len()
    }

    /// Every record as a line of text.
    pub fn records(&self) -> Vec<String> {
        let sep = self.separator;
        let mut records = Vec::with_capacity(self.texts.len() + 2);
        records.push(format_header(&self.header, sep));
        records.extend(self.texts.iter().map(|t| format_text(t, sep)));
        records.push(format_end(&self.end, sep));
        records
    }
}

impl fmt::Display for ObjectProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records() {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Chunk;

    fn program(start: u32) -> ObjectProgram {
        ObjectProgram::new("COPY", start, &ObjectConfig::default())
    }

    fn code(lengths: &[usize]) -> ObjectCode {
        ObjectCode {
            chunks: lengths
                .iter()
                .enumerate()
                .map(|(i, &n)| Chunk {
                    line: i,
                    bytes: vec![i as u8; n],
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_emit_text_single_record() {
        let mut p = program(0x1000);
        p.emit_text(&[0x17, 0x20, 0x2D]);
        p.emit_text(&[0x69, 0x20, 0x2D]);
        p.flush_txt();
        assert_eq!(p.texts.len(), 1);
        assert_eq!(p.texts[0].address, 0x1000);
        assert_eq!(p.total_text_size(), 6);
    }

    #[test]
    fn test_record_address_saturates() {
        let mut p = program(u32::MAX);
        p.emit_text(&[0x01]);
        p.emit_text(&[0x02; 30]);
        p.flush_txt();
        assert_eq!(p.texts[0].address, u32::MAX);
        assert_eq!(p.texts[1].address, u32::MAX);
        assert_eq!(p.texts[0].end_address(), u32::MAX);
    }

    #[test]
    fn test_chunk_not_split_across_records() {
        let mut p = program(0);
        for _ in 0..10 {
            p.emit_text(&[0xAA, 0xBB, 0xCC]);
        }
        p.emit_text(&[0x01, 0x02, 0x03, 0x04]);
        p.flush_txt();
        assert_eq!(p.text_lengths(), vec![30, 4]);
        assert_eq!(p.texts[1].address, 30);
    }

    #[test]
    fn test_record_closed_when_next_chunk_overflows() {
        let mut p = program(0);
        for _ in 0..9 {
            p.emit_text(&[0; 3]);
        }
        // 27 bytes; a 4-byte instruction no longer fits.
        p.emit_text(&[0; 4]);
        p.flush_txt();
        assert_eq!(p.text_lengths(), vec![27, 4]);
        assert_eq!(p.texts[1].address, 27);
    }

    #[test]
    fn test_oversized_chunk_is_split() {
        let mut p = program(0x100);
        p.emit_text(&[0x41; 45]);
        p.flush_txt();
        assert_eq!(p.text_lengths(), vec![30, 15]);
        assert_eq!(p.texts[1].address, 0x100 + 30);
    }

    #[test]
    fn test_build_35_bytes_two_records() {
        let lines = vec![
            Line::new("START", "0").labeled("PROG"),
            Line::new("END", "PROG"),
        ];
        let mut lengths = vec![3; 11];
        lengths.push(2);
        let p = ObjectProgram::build(&lines, &code(&lengths), &ObjectConfig::default());
        assert_eq!(p.total_text_size(), 35);
        assert_eq!(p.text_lengths(), vec![30, 5]);
        assert_eq!(p.texts[0].end_address(), p.texts[1].address);
        assert_eq!(p.header.size, 34);
    }

    #[test]
    fn test_build_header_and_end() {
        let mut start = Line::new("START", "1000").labeled("LONGNAME");
        start.location = 0x1000;
        let mut first = Line::new("STL", "RETADR").labeled("FIRST");
        first.location = 0x1003;
        let lines = vec![start, first, Line::new("END", "FIRST")];
        let mut object = code(&[3]);
        object.reserves.push(3);

        let p = ObjectProgram::build(&lines, &object, &ObjectConfig::default());
        let records = p.records();
        assert_eq!(records[0], "H^LONGNA^001000^000005");
        assert_eq!(records[1], "T^001000^03^000000");
        assert_eq!(records[2], "E^001003");
    }

    #[test]
    fn test_end_without_operand_uses_start() {
        let mut start = Line::new("START", "200").labeled("P");
        start.location = 0x200;
        let lines = vec![start, Line::new("END", "")];
        let p = ObjectProgram::build(&lines, &code(&[1]), &ObjectConfig::default());
        assert_eq!(p.end.entry, 0x200);
    }

    #[test]
    fn test_custom_separator_and_limit() {
        let config = ObjectConfig {
            text_record_limit: 4,
            separator: '|',
        };
        let p = ObjectProgram::build(&[Line::new("START", "0").labeled("A")], &code(&[3, 3]), &config);
        let text = p.to_string();
        assert!(text.starts_with("H|A     |000000|000005\n"));
        assert!(text.contains("T|000000|03|000000\n"));
        assert!(text.contains("T|000003|03|010101\n"));
        assert!(text.ends_with("E|000000\n"));
    }

    #[test]
    fn test_empty_program_has_no_text_records() {
        let p = ObjectProgram::build(&[], &ObjectCode::default(), &ObjectConfig::default());
        assert!(p.texts.is_empty());
        assert_eq!(p.records(), vec!["H^      ^000000^000000", "E^000000"]);
    }
}

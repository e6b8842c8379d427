//! Tokenized source lines.
//!
//! A [`Line`] is the record handed over by the source reader: label,
//! mnemonic, addressing-mode marker and up to two operands. Pass 1 assigns
//! each line its location; nothing else about a line changes afterwards.

use std::fmt;

use serde::Serialize;

use crate::error::ErrorKind;

/// Label text meaning "this line has no label".
pub const NO_LABEL: &str = "(~)";

/// Addressing-mode marker written in front of the first operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AddrMode {
    /// No marker: simple (direct) addressing.
    #[default]
    Simple,
    /// `#operand`.
    Immediate,
    /// `@operand`.
    Indirect,
}

impl AddrMode {
    /// Parse a marker character.
    pub fn from_marker(ch: char) -> Option<Self> {
        match ch {
            '#' => Some(Self::Immediate),
            '@' => Some(Self::Indirect),
            _ => None,
        }
    }

    /// The marker text (empty for simple addressing).
    pub fn marker(self) -> &'static str {
        match self {
            Self::Simple => "",
            Self::Immediate => "#",
            Self::Indirect => "@",
        }
    }
}

/// One tokenized source line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Line {
    /// 1-based line number in the source text.
    pub number: usize,
    /// Label (empty or [`NO_LABEL`] when absent).
    pub label: String,
    /// Mnemonic, upper case. A leading `+` selects format 4.
    pub mnemonic: String,
    /// Addressing-mode marker.
    pub mode: AddrMode,
    /// First operand (the whole list for `BYTE`/`WORD`).
    pub operand1: String,
    /// Second operand (index register or second register).
    pub operand2: String,
    /// Location assigned in pass 1.
    pub location: u32,
    /// Error reported by the reader, if any.
    pub error: Option<ErrorKind>,
}

impl Line {
    /// Create a line with the given fields and no label.
    pub fn new(mnemonic: &str, operand1: &str) -> Self {
        Self {
            mnemonic: mnemonic.to_uppercase(),
            operand1: operand1.to_string(),
            ..Default::default()
        }
    }

    /// Set the label.
    pub fn labeled(mut self, label: &str) -> Self {
        self.label = label.to_uppercase();
        self
    }

    /// Set the addressing-mode marker.
    pub fn with_mode(mut self, mode: AddrMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the second operand.
    pub fn with_operand2(mut self, operand2: &str) -> Self {
        self.operand2 = operand2.to_uppercase();
        self
    }

    /// Whether the line carries a real label.
    pub fn has_label(&self) -> bool {
        !self.label.is_empty() && self.label != NO_LABEL
    }

    /// Whether the mnemonic requests format 4 (`+` prefix).
    pub fn is_extended(&self) -> bool {
        self.mnemonic.starts_with('+')
    }

    /// Mnemonic without the format-4 prefix.
    pub fn base_mnemonic(&self) -> &str {
        self.mnemonic.trim_start_matches('+')
    }

    /// Whether the first operand is a literal (`=...`).
    pub fn has_literal(&self) -> bool {
        self.operand1.starts_with('=')
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.has_label() { self.label.as_str() } else { "" };
        write!(
            f,
            "{:04X}  {:<8} {:<7} {}{}",
            self.location,
            label,
            self.mnemonic,
            self.mode.marker(),
            self.operand1
        )?;
        if !self.operand2.is_empty() {
            write!(f, ",{}", self.operand2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_label() {
        let line = Line::new("LDA", "ALPHA").labeled(NO_LABEL);
        assert!(!line.has_label());
        assert!(Line::new("LDA", "ALPHA").labeled("FIRST").has_label());
    }

    #[test]
    fn test_extended_mnemonic() {
        let line = Line::new("+jsub", "RDREC");
        assert!(line.is_extended());
        assert_eq!(line.base_mnemonic(), "JSUB");
    }

    #[test]
    fn test_display() {
        let mut line = Line::new("STCH", "BUFFER")
            .labeled("LOOP")
            .with_operand2("X");
        line.location = 0x1036;
        assert_eq!(line.to_string(), "1036  LOOP     STCH    BUFFER,X");
    }
}

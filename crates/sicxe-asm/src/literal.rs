//! Literal pool management.
//!
//! Literals (`=C'EOF'`, `=X'05'`, `=W'3'`) are collected from the lines
//! scanned since the previous flush and placed at the location counter when a
//! pool is flushed (`LTORG`, or the end of the program). Each distinct
//! operand text gets exactly one address.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::ErrorKind;
use crate::line::Line;

// ---------------------------------------------------------------------------
//  Location counter
// ---------------------------------------------------------------------------

/// Highest address of the 24-bit address space.
pub const MAX_ADDRESS: u32 = 0xFF_FFFF;

/// Running address cursor for pass 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationCounter {
    /// Current address.
    pub value: u32,
    /// Index of the first line not yet scanned for literals.
    pub literals_start: usize,
}

impl LocationCounter {
    pub fn new(start: u32) -> Self {
        Self {
            value: start,
            literals_start: 0,
        }
    }

    /// Advance by `bytes`. Fails, leaving the counter unchanged, when the
    /// result would pass [`MAX_ADDRESS`].
    pub fn advance(&mut self, bytes: u32) -> Result<(), ErrorKind> {
        match self.value.checked_add(bytes) {
            Some(next) if next <= MAX_ADDRESS => {
                self.value = next;
                Ok(())
            }
            _ => Err(ErrorKind::WrongOperandType),
        }
    }
}

// ---------------------------------------------------------------------------
//  Literals
// ---------------------------------------------------------------------------

/// Literal type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LiteralKind {
    /// Character string.
    C,
    /// Hexadecimal digits.
    X,
    /// One word (3 bytes), decimal value.
    W,
}

impl LiteralKind {
    fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_uppercase() {
            'C' => Some(Self::C),
            'X' => Some(Self::X),
            'W' => Some(Self::W),
            _ => None,
        }
    }
}

/// A literal pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Literal {
    /// Operand text including the leading `=`.
    pub operand: String,
    pub kind: LiteralKind,
    /// Quoted body.
    pub body: String,
    /// Assigned address.
    pub address: u32,
    /// Encoded length in bytes.
    pub length: u32,
    /// Which flush placed this literal (0 = first `LTORG`).
    pub pool: usize,
}

impl Literal {
    /// Parse a literal operand. Returns `None` if the text is not a
    /// well-formed literal.
    pub fn parse(operand: &str) -> Option<Self> {
        let rest = operand.strip_prefix('=')?;
        let kind = LiteralKind::from_char(rest.chars().next()?)?;
        let body = rest[1..].strip_prefix('\'')?.strip_suffix('\'')?;
        if body.is_empty() {
            return None;
        }
        let length = match kind {
            LiteralKind::C => body.len() as u32,
            LiteralKind::X => {
                if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                body.len().div_ceil(2) as u32
            }
            LiteralKind::W => {
                body.parse::<i64>().ok()?;
                3
            }
        };
        Some(Self {
            operand: operand.to_string(),
            kind,
            body: body.to_string(),
            address: 0,
            length,
            pool: 0,
        })
    }

    /// Encoded bytes: `C` as character codes, `X` as the hex digits (odd
    /// counts padded with a leading zero), `W` as a 3-byte word.
    pub fn bytes(&self) -> Vec<u8> {
        match self.kind {
            LiteralKind::C => self.body.as_bytes().to_vec(),
            LiteralKind::X => hex_bytes(&self.body).unwrap_or_default(),
            LiteralKind::W => {
                let value = self.body.parse::<i64>().unwrap_or(0);
                word_bytes(value).to_vec()
            }
        }
    }
}

/// Decode hex digits into bytes, left-padding an odd digit count with `0`.
/// Returns `None` if any character is not an ASCII hex digit.
pub fn hex_bytes(digits: &str) -> Option<Vec<u8>> {
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
        .collect()
}

/// A value as a 24-bit big-endian word (two's complement for negatives).
pub fn word_bytes(value: i64) -> [u8; 3] {
    let v = (value & 0xFF_FFFF) as u32;
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}

// ---------------------------------------------------------------------------
//  Literal pool
// ---------------------------------------------------------------------------

/// The literal table plus flush bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct LiteralPool {
    table: HashMap<String, Literal>,
    /// Operands in address order.
    order: Vec<String>,
    /// Number of flushes performed.
    flushes: usize,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place every new literal referenced by `lines[lc.literals_start..]` at
    /// the location counter. `ok(i)` tells whether line `i` is error-free;
    /// lines with errors are skipped. Returns the number of literals placed.
    pub fn flush<F>(&mut self, lines: &[Line], ok: F, lc: &mut LocationCounter) -> usize
    where
        F: Fn(usize) -> bool,
    {
        let pool = self.flushes;
        let mut placed = 0;
        for (idx, line) in lines.iter().enumerate().skip(lc.literals_start) {
            if !ok(idx) || !line.has_literal() || self.table.contains_key(&line.operand1) {
                continue;
            }
            let Some(mut literal) = Literal::parse(&line.operand1) else {
                continue;
            };
            literal.address = lc.value;
            literal.pool = pool;
            if lc.advance(literal.length).is_err() {
                tracing::warn!(literal = %literal.operand, "Literal does not fit in the address space");
                continue;
            }
            tracing::debug!(
                literal = %literal.operand,
                address = %format!("{:06X}", literal.address),
                length = literal.length,
                "Literal placed"
            );
            self.order.push(literal.operand.clone());
            self.table.insert(literal.operand.clone(), literal);
            placed += 1;
        }
        lc.literals_start = lc.literals_start.max(lines.len());
        self.flushes += 1;
        placed
    }

    /// Look up a literal by operand text.
    pub fn lookup(&self, operand: &str) -> Option<&Literal> {
        self.table.get(operand)
    }

    /// Literals in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.order.iter().filter_map(|op| self.table.get(op))
    }

    /// Literals placed by flush number `pool`.
    pub fn pool(&self, pool: usize) -> impl Iterator<Item = &Literal> {
        self.iter().filter(move |lit| lit.pool == pool)
    }

    /// Number of flushes performed so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.order.clear();
        self.flushes = 0;
    }
}

impl fmt::Display for LiteralPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LITERAL       ADDRESS  LENGTH")?;
        for lit in self.iter() {
            writeln!(f, "{:<12}  {:06X}   {}", lit.operand, lit.address, lit.length)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

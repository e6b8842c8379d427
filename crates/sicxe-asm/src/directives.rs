//! SIC/XE assembler directives.
//!
//! Covers program control (START/END), storage definition
//! (BYTE/WORD/RESB/RESW), symbol definition (EQU/ORG), literal pools (LTORG)
//! and base-register control (BASE/NOBASE).

use std::fmt;

use crate::lexer::split_operands;
use crate::literal::{hex_bytes, word_bytes};

// ---------------------------------------------------------------------------
//  Directive catalog
// ---------------------------------------------------------------------------

/// Known assembler directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Start,
    End,
    Byte,
    Word,
    Resb,
    Resw,
    Equ,
    Org,
    Ltorg,
    Base,
    Nobase,
}

impl Directive {
    /// Try to parse a directive from a mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        match mnemonic.to_uppercase().as_str() {
            "START" => Some(Self::Start),
            "END" => Some(Self::End),
            "BYTE" => Some(Self::Byte),
            "WORD" => Some(Self::Word),
            "RESB" => Some(Self::Resb),
            "RESW" => Some(Self::Resw),
            "EQU" => Some(Self::Equ),
            "ORG" => Some(Self::Org),
            "LTORG" => Some(Self::Ltorg),
            "BASE" => Some(Self::Base),
            "NOBASE" => Some(Self::Nobase),
            _ => None,
        }
    }

    /// Whether the directive is written without an operand.
    pub fn takes_operand(self) -> bool {
        !matches!(self, Self::Ltorg | Self::Nobase)
    }

    /// Whether the operand field is a comma-separated data list.
    pub fn is_data_list(self) -> bool {
        matches!(self, Self::Byte | Self::Word)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Byte => "BYTE",
            Self::Word => "WORD",
            Self::Resb => "RESB",
            Self::Resw => "RESW",
            Self::Equ => "EQU",
            Self::Org => "ORG",
            Self::Ltorg => "LTORG",
            Self::Base => "BASE",
            Self::Nobase => "NOBASE",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
//  Data definition
// ---------------------------------------------------------------------------

/// Encode the operands of a `BYTE` directive. Each operand yields its own
/// chunk: `X'..'` hex digits, `C'..'` character codes, or a decimal byte.
pub fn byte_constants(operands: &str) -> Result<Vec<Vec<u8>>, String> {
    split_operands(operands)
        .into_iter()
        .map(|op| byte_constant(&op))
        .collect()
}

fn byte_constant(operand: &str) -> Result<Vec<u8>, String> {
    if let Some(body) = quoted_body(operand, 'X') {
        if body.is_empty() {
            return Err(format!("empty hex constant: {operand}"));
        }
        return hex_bytes(body).ok_or_else(|| format!("invalid hex constant: {operand}"));
    }
    if let Some(body) = quoted_body(operand, 'C') {
        if body.is_empty() {
            return Err(format!("empty character constant: {operand}"));
        }
        return Ok(body.as_bytes().to_vec());
    }
    operand
        .trim()
        .parse::<u8>()
        .map(|b| vec![b])
        .map_err(|_| format!("invalid byte constant: {operand}"))
}

/// Encode the operands of a `WORD` directive: one 3-byte chunk per decimal
/// operand.
pub fn word_constants(operands: &str) -> Result<Vec<Vec<u8>>, String> {
    split_operands(operands)
        .into_iter()
        .map(|op| {
            op.trim()
                .parse::<i64>()
                .ok()
                .filter(|v| (-0x80_0000..=0xFF_FFFF).contains(v))
                .map(|v| word_bytes(v).to_vec())
                .ok_or_else(|| format!("invalid word constant: {op}"))
        })
        .collect()
}

/// Bytes reserved by `RESB n` / `RESW n`.
pub fn reservation(directive: Directive, operand: &str) -> Result<u32, String> {
    let count = operand
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid reservation count: {operand}"))?;
    match directive {
        Directive::Resb => Ok(count),
        Directive::Resw => count
            .checked_mul(3)
            .ok_or_else(|| format!("reservation too large: {operand}")),
        other => Err(format!("{other} does not reserve storage")),
    }
}

/// Body of `T'...'` for type letter `T`.
fn quoted_body(operand: &str, kind: char) -> Option<&str> {
    let operand = operand.trim();
    let mut chars = operand.chars();
    if !chars.next()?.eq_ignore_ascii_case(&kind) {
        return None;
    }
    operand[1..].strip_prefix('\'')?.strip_suffix('\'')
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

//! SIC/XE machine instructions.
//!
//! Covers the four instruction formats:
//! - Format 1 (1 byte): opcode only
//! - Format 2 (2 bytes): opcode, r1, r2
//! - Format 3 (3 bytes): opcode(6) n i x b p e disp(12)
//! - Format 4 (4 bytes): opcode(6) n i x b p e address(20), selected with `+`
//!
//! Each mnemonic maps to an [`InsnDef`] in the [`InsnCatalog`]; the encoders
//! below turn a definition plus resolved operand fields into bytes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::addressing::{Addressing, Flags};

// ---------------------------------------------------------------------------
//  Instruction formats
// ---------------------------------------------------------------------------

/// Instruction encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Format {
    One,
    Two,
    Three,
    Four,
}

impl Format {
    /// Instruction length in bytes.
    pub fn length(self) -> u32 {
        match self {
            Format::One => 1,
            Format::Two => 2,
            Format::Three => 3,
            Format::Four => 4,
        }
    }

    /// Whether the format carries n/i/x/b/p/e flags.
    pub fn is_memory(self) -> bool {
        matches!(self, Format::Three | Format::Four)
    }
}

impl TryFrom<u8> for Format {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Format::One),
            2 => Ok(Format::Two),
            3 => Ok(Format::Three),
            4 => Ok(Format::Four),
            other => Err(format!("instruction format must be 1-4, got {other}")),
        }
    }
}

impl From<Format> for u8 {
    fn from(format: Format) -> u8 {
        format.length() as u8
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "format {}", self.length())
    }
}

// ---------------------------------------------------------------------------
//  Instruction definition
// ---------------------------------------------------------------------------

/// Definition of a machine instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsnDef {
    /// Mnemonic (uppercase, without `+`).
    pub mnemonic: String,
    /// Opcode byte. For formats 3/4 only the top six bits are encoded.
    pub opcode: u8,
    /// Base format. Format-3 instructions become format 4 with a `+` prefix.
    pub format: Format,
    /// Whether a format-2 instruction takes a second register operand.
    #[serde(default)]
    pub second_operand: bool,
}

// ---------------------------------------------------------------------------
//  Registers
// ---------------------------------------------------------------------------

/// Register number for a register mnemonic.
pub fn register_code(name: &str) -> Option<u8> {
    match name.trim().to_uppercase().as_str() {
        "A" => Some(0),
        "X" => Some(1),
        "L" => Some(2),
        "B" => Some(3),
        "S" => Some(4),
        "T" => Some(5),
        "F" => Some(6),
        "PC" => Some(8),
        "SW" => Some(9),
        _ => None,
    }
}

/// Value of a format-2 operand: a register name or a numeric nibble (SVC n,
/// SHIFTL r,n).
pub fn register_operand(text: &str) -> Option<u8> {
    register_code(text).or_else(|| text.trim().parse::<u8>().ok().filter(|n| *n < 16))
}

// ---------------------------------------------------------------------------
//  Instruction catalog
// ---------------------------------------------------------------------------

/// The instruction catalog holds definitions for all known mnemonics.
#[derive(Debug, Clone)]
pub struct InsnCatalog {
    instructions: HashMap<String, InsnDef>,
}

impl Default for InsnCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InsnCatalog {
    /// Build the catalog with the SIC/XE instruction set.
    pub fn new() -> Self {
        let mut catalog = Self {
            instructions: HashMap::new(),
        };
        catalog.register_format1_instructions();
        catalog.register_format2_instructions();
        catalog.register_format3_instructions();
        catalog
    }

    fn add(&mut self, mnemonic: &str, opcode: u8, format: Format, second_operand: bool) {
        self.insert(InsnDef {
            mnemonic: mnemonic.to_uppercase(),
            opcode,
            format,
            second_operand,
        });
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, def: InsnDef) {
        let key = def.mnemonic.trim_start_matches('+').to_uppercase();
        self.instructions.insert(key.clone(), InsnDef { mnemonic: key, ..def });
    }

    fn register_format1_instructions(&mut self) {
        let f = Format::One;
        self.add("FIX",   0xC4, f, false);
        self.add("FLOAT", 0xC0, f, false);
        self.add("HIO",   0xF4, f, false);
        self.add("NORM",  0xC8, f, false);
        self.add("SIO",   0xF0, f, false);
        self.add("TIO",   0xF8, f, false);
    }

    fn register_format2_instructions(&mut self) {
        let f = Format::Two;
        self.add("ADDR",   0x90, f, true);
        self.add("CLEAR",  0xB4, f, false);
        self.add("COMPR",  0xA0, f, true);
        self.add("DIVR",   0x9C, f, true);
        self.add("MULR",   0x98, f, true);
        self.add("RMO",    0xAC, f, true);
        self.add("SHIFTL", 0xA4, f, true);
        self.add("SHIFTR", 0xA8, f, true);
        self.add("SUBR",   0x94, f, true);
        self.add("SVC",    0xB0, f, false);
        self.add("TIXR",   0xB8, f, false);
    }

    fn register_format3_instructions(&mut self) {
        let f = Format::Three;
        self.add("ADD",  0x18, f, false);
        self.add("ADDF", 0x58, f, false);
        self.add("AND",  0x40, f, false);
        self.add("COMP", 0x28, f, false);
        self.add("COMPF", 0x88, f, false);
        self.add("DIV",  0x24, f, false);
        self.add("DIVF", 0x64, f, false);
        self.add("J",    0x3C, f, false);
        self.add("JEQ",  0x30, f, false);
        self.add("JGT",  0x34, f, false);
        self.add("JLT",  0x38, f, false);
        self.add("JSUB", 0x48, f, false);
        self.add("LDA",  0x00, f, false);
        self.add("LDB",  0x68, f, false);
        self.add("LDCH", 0x50, f, false);
        self.add("LDF",  0x70, f, false);
        self.add("LDL",  0x08, f, false);
        self.add("LDS",  0x6C, f, false);
        self.add("LDT",  0x74, f, false);
        self.add("LDX",  0x04, f, false);
        self.add("LPS",  0xD0, f, false);
        self.add("MUL",  0x20, f, false);
        self.add("MULF", 0x60, f, false);
        self.add("OR",   0x44, f, false);
        self.add("RD",   0xD8, f, false);
        self.add("RSUB", 0x4C, f, false);
        self.add("SSK",  0xEC, f, false);
        self.add("STA",  0x0C, f, false);
        self.add("STB",  0x78, f, false);
        self.add("STCH", 0x54, f, false);
        self.add("STF",  0x80, f, false);
        self.add("STI",  0xD4, f, false);
        self.add("STL",  0x14, f, false);
        self.add("STS",  0x7C, f, false);
        self.add("STSW", 0xE8, f, false);
        self.add("STT",  0x84, f, false);
        self.add("STX",  0x10, f, false);
        self.add("SUB",  0x1C, f, false);
        self.add("SUBF", 0x5C, f, false);
        self.add("TD",   0xE0, f, false);
        self.add("TIX",  0x2C, f, false);
        self.add("WD",   0xDC, f, false);
    }

    /// Look up an instruction by mnemonic (case-insensitive, `+` ignored).
    pub fn lookup(&self, mnemonic: &str) -> Option<&InsnDef> {
        self.instructions
            .get(&mnemonic.trim_start_matches('+').to_uppercase())
    }

    /// Effective format of a mnemonic as written, `None` if unknown or if
    /// `+` is applied to a format-1/2 instruction.
    pub fn format_of(&self, mnemonic: &str) -> Option<Format> {
        let def = self.lookup(mnemonic)?;
        match (mnemonic.starts_with('+'), def.format) {
            (false, format) => Some(format),
            (true, Format::Three) | (true, Format::Four) => Some(Format::Four),
            (true, _) => None,
        }
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

// ---------------------------------------------------------------------------
//  Instruction encoder
// ---------------------------------------------------------------------------

// Format 1: [opcode(8)]
pub fn encode_format1(def: &InsnDef) -> Vec<u8> {
    vec![def.opcode]
}

// Format 2: [opcode(8) | r1(4) r2(4)]
pub fn encode_format2(def: &InsnDef, r1: u8, r2: u8) -> Vec<u8> {
    vec![def.opcode, ((r1 & 0x0F) << 4) | (r2 & 0x0F)]
}

/// Format 3/4: `[opcode(6) n i | x b p e disp(4) | disp(8) (| disp(8))]`.
///
/// The `e` flag decides the width: 12-bit displacement in three bytes or a
/// 20-bit address in four.
pub fn encode_format34(opcode: u8, addr: &Addressing) -> Vec<u8> {
    let f = &addr.flags;
    let byte0 = (opcode & 0xFC) | ((f.n as u8) << 1) | f.i as u8;
    let flags = ((f.x as u8) << 7) | ((f.b as u8) << 6) | ((f.p as u8) << 5) | ((f.e as u8) << 4);
    if f.e {
        let disp = addr.disp & 0xF_FFFF;
        vec![
            byte0,
            flags | ((disp >> 16) as u8 & 0x0F),
            (disp >> 8) as u8,
            disp as u8,
        ]
    } else {
        let disp = addr.disp & 0xFFF;
        vec![byte0, flags | ((disp >> 8) as u8 & 0x0F), disp as u8]
    }
}

/// Inverse of [`encode_format34`]: recover the 6-bit opcode, flags and
/// displacement field. Returns `None` if the byte count does not match the
/// `e` flag.
pub fn decode_format34(bytes: &[u8]) -> Option<(u8, Addressing)> {
    if bytes.len() < 3 {
        return None;
    }
    let flags = Flags {
        n: bytes[0] & 0x02 != 0,
        i: bytes[0] & 0x01 != 0,
        x: bytes[1] & 0x80 != 0,
        b: bytes[1] & 0x40 != 0,
        p: bytes[1] & 0x20 != 0,
        e: bytes[1] & 0x10 != 0,
    };
    let high = (bytes[1] & 0x0F) as u32;
    let disp = match (flags.e, bytes.len()) {
        (false, 3) => (high << 8) | bytes[2] as u32,
        (true, 4) => (high << 16) | ((bytes[2] as u32) << 8) | bytes[3] as u32,
        _ => return None,
    };
    Some((bytes[0] & 0xFC, Addressing { flags, disp }))
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

//! Addressing-mode resolution for format-3/4 instructions.
//!
//! Computes the n/i/x flags from the addressing-mode marker and index
//! operand, and the b/p/e flags plus displacement field from the operand
//! target:
//!
//! 1. PC-relative when `target - (location + length)` fits signed 12 bits.
//! 2. Otherwise base-relative when a base register is active and
//!    `target - base` fits unsigned 12 bits.
//! 3. Otherwise the operand cannot be encoded.
//!
//! [`direct`] builds the format-4 absolute-address form (b=p=0) for callers
//! that allow it as a last resort.
//!
//! Numeric operands (immediate values, bare addresses) are placed in the
//! displacement field as-is with b=p=0, range-checked against the field
//! width.

use std::fmt;

use serde::Serialize;

use crate::instruction::Format;
use crate::line::AddrMode;

/// Signed range of a PC-relative displacement.
pub const PC_RANGE: std::ops::RangeInclusive<i64> = -2048..=2047;

/// Unsigned range of a base-relative displacement.
pub const BASE_RANGE: std::ops::RangeInclusive<i64> = 0..=4095;

// ---------------------------------------------------------------------------
//  Flags
// ---------------------------------------------------------------------------

/// The six addressing flag bits of a format-3/4 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Flags {
    pub n: bool,
    pub i: bool,
    pub x: bool,
    pub b: bool,
    pub p: bool,
    pub e: bool,
}

impl Flags {
    /// n/i/x for an addressing-mode marker. `indexed` is true when the line
    /// has a second operand.
    pub fn nix(mode: AddrMode, indexed: bool) -> Self {
        let (n, i, x) = match mode {
            AddrMode::Immediate => (false, true, false),
            AddrMode::Indirect => (true, false, false),
            AddrMode::Simple => (true, true, indexed),
        };
        Self {
            n,
            i,
            x,
            ..Default::default()
        }
    }

    /// n/i/x as a 3-bit value.
    pub fn nix_bits(&self) -> u8 {
        ((self.n as u8) << 2) | ((self.i as u8) << 1) | self.x as u8
    }

    /// b/p/e as a 3-bit value.
    pub fn bpe_bits(&self) -> u8 {
        ((self.b as u8) << 2) | ((self.p as u8) << 1) | self.e as u8
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} i={} x={} b={} p={} e={}",
            self.n as u8, self.i as u8, self.x as u8, self.b as u8, self.p as u8, self.e as u8
        )
    }
}

/// Resolved flags and displacement field of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Addressing {
    pub flags: Flags,
    /// Displacement / address field, already masked to 12 or 20 bits.
    pub disp: u32,
}

impl Addressing {
    /// The displacement field as hex: 3 digits for format 3, 5 for format 4.
    pub fn disp_hex(&self) -> String {
        if self.flags.e {
            format!("{:05X}", self.disp)
        } else {
            format!("{:03X}", self.disp)
        }
    }
}

// ---------------------------------------------------------------------------
//  Operand targets
// ---------------------------------------------------------------------------

/// What the first operand of a format-3/4 instruction resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Address of a symbol or literal.
    Address(u32),
    /// Numeric value used directly as the field.
    Value(i64),
    /// No operand (e.g. `RSUB`).
    None,
}

/// Resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressingError {
    #[error("target {target:#06X} is out of PC-relative range and no base register is active")]
    NoBase { target: u32 },
    #[error("target {target:#06X} is out of range of base {base:#06X}")]
    BaseRange { target: u32, base: u32 },
    #[error("value {value} does not fit a {bits}-bit field")]
    FieldRange { value: i64, bits: u32 },
}

// ---------------------------------------------------------------------------
//  Resolver
// ---------------------------------------------------------------------------

/// Resolve the flags and displacement for an instruction at `location`.
///
/// `base` is the active base register value, `None` when no base is active.
pub fn resolve(
    location: u32,
    format: Format,
    mode: AddrMode,
    indexed: bool,
    target: Target,
    base: Option<u32>,
) -> Result<Addressing, AddressingError> {
    let mut flags = Flags::nix(mode, indexed);
    flags.e = format == Format::Four;
    let bits = if flags.e { 20 } else { 12 };
    let mask = (1i64 << bits) - 1;

    let disp = match target {
        Target::Address(address) => {
            let pc = location as i64 + format.length() as i64;
            let disp = address as i64 - pc;
            let base_disp = base.map(|b| address as i64 - b as i64);
            if PC_RANGE.contains(&disp) {
                flags.p = true;
                disp
            } else if let Some(disp) = base_disp.filter(|d| BASE_RANGE.contains(d)) {
                flags.b = true;
                disp
            } else {
                return Err(match base {
                    Some(base) => AddressingError::BaseRange { target: address, base },
                    None => AddressingError::NoBase { target: address },
                });
            }
        }
        Target::Value(value) => {
            if !(0..=mask).contains(&value) {
                return Err(AddressingError::FieldRange { value, bits });
            }
            value
        }
        Target::None => 0,
    };

    Ok(Addressing {
        flags,
        disp: (disp & mask) as u32,
    })
}

/// Format-4 direct addressing: `address` itself in the 20-bit field.
pub fn direct(mode: AddrMode, indexed: bool, address: u32) -> Result<Addressing, AddressingError> {
    if address > 0xF_FFFF {
        return Err(AddressingError::FieldRange {
            value: address as i64,
            bits: 20,
        });
    }
    let mut flags = Flags::nix(mode, indexed);
    flags.e = true;
    Ok(Addressing { flags, disp: address })
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

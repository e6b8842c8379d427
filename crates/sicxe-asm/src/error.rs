//! Assembler errors.
//!
//! Two layers:
//! - [`ErrorKind`]: the per-line error code recorded while scanning a
//!   program (pass 1 keeps going so every error is collected).
//! - [`AsmError`]: the error returned from an assembly operation.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
//  Per-line error codes
// ---------------------------------------------------------------------------

/// Error code attached to a single source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed or unresolvable operand, including an arithmetic expression
    /// that references a label not yet defined.
    WrongOperandType,
    /// A format-3/4 operand cannot be encoded PC-relative or base-relative.
    DisplacementOverflow,
    /// An instruction operand names a symbol that is never defined.
    UndefinedSymbol,
    /// The mnemonic is neither an instruction nor a directive.
    UnknownMnemonic,
    /// Error reported by the upstream reader.
    Syntax,
}

impl ErrorKind {
    /// Numeric error code.
    pub fn code(self) -> u8 {
        match self {
            Self::WrongOperandType => 1,
            Self::DisplacementOverflow => 2,
            Self::UndefinedSymbol => 3,
            Self::UnknownMnemonic => 4,
            Self::Syntax => 5,
        }
    }

    /// Human-readable message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::WrongOperandType => "wrong operand type",
            Self::DisplacementOverflow => "displacement out of range",
            Self::UndefinedSymbol => "undefined symbol",
            Self::UnknownMnemonic => "unrecognized operation code",
            Self::Syntax => "statement syntax error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:03}: {}", self.code(), self.message())
    }
}

// ---------------------------------------------------------------------------
//  Assembly errors
// ---------------------------------------------------------------------------

/// Errors returned by assembly operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum AsmError {
    /// Malformed or unresolvable operand.
    #[error("line {line}: wrong operand type: {operand}")]
    #[diagnostic(code(sicxe::wrong_operand_type))]
    WrongOperandType { line: usize, operand: String },

    /// Operand out of reach of both PC-relative and base-relative addressing.
    #[error("line {line}: displacement out of range for {operand}")]
    #[diagnostic(
        code(sicxe::displacement_overflow),
        help("add a BASE directive covering the target, or use format 4 (+)")
    )]
    DisplacementOverflow { line: usize, operand: String },

    /// Operand symbol is never defined.
    #[error("line {line}: undefined symbol: {name}")]
    #[diagnostic(code(sicxe::undefined_symbol))]
    UndefinedSymbol { line: usize, name: String },

    /// Mnemonic is not in the instruction or directive tables.
    #[error("line {line}: unknown mnemonic: {mnemonic}")]
    #[diagnostic(code(sicxe::unknown_mnemonic))]
    UnknownMnemonic { line: usize, mnemonic: String },

    /// Operand could not be encoded.
    #[error("line {line}: invalid operand: {detail}")]
    #[diagnostic(code(sicxe::invalid_operand))]
    InvalidOperand { line: usize, detail: String },

    /// Pass 1 recorded line errors, so pass 2 was not run.
    #[error("pass 1 finished with {count} error(s); no object program generated")]
    #[diagnostic(code(sicxe::pass_one))]
    PassOne { count: usize },

    /// Configuration could not be loaded.
    #[error("configuration error: {detail}")]
    #[diagnostic(code(sicxe::config))]
    Config { detail: String },
}

impl AsmError {
    /// Build the error matching a per-line error code.
    pub fn from_kind(kind: ErrorKind, line: usize, operand: &str) -> Self {
        match kind {
            ErrorKind::WrongOperandType => Self::WrongOperandType {
                line,
                operand: operand.to_string(),
            },
            ErrorKind::DisplacementOverflow => Self::DisplacementOverflow {
                line,
                operand: operand.to_string(),
            },
            ErrorKind::UndefinedSymbol => Self::UndefinedSymbol {
                line,
                name: operand.to_string(),
            },
            ErrorKind::UnknownMnemonic => Self::UnknownMnemonic {
                line,
                mnemonic: operand.to_string(),
            },
            ErrorKind::Syntax => Self::InvalidOperand {
                line,
                detail: operand.to_string(),
            },
        }
    }

    /// The per-line error code this error corresponds to, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::WrongOperandType { .. } => Some(ErrorKind::WrongOperandType),
            Self::DisplacementOverflow { .. } => Some(ErrorKind::DisplacementOverflow),
            Self::UndefinedSymbol { .. } => Some(ErrorKind::UndefinedSymbol),
            Self::UnknownMnemonic { .. } => Some(ErrorKind::UnknownMnemonic),
            Self::InvalidOperand { .. } => Some(ErrorKind::WrongOperandType),
            Self::PassOne { .. } | Self::Config { .. } => None,
        }
    }
}

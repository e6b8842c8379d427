//! Object code emission (pass 2).
//!
//! Turns every line into object bytes:
//! - machine instructions (formats 1–4, flags via [`crate::addressing`])
//! - `BYTE`/`WORD` constants, one chunk per operand
//! - `RESB`/`RESW` reservations (no bytes, recorded separately)
//! - literal pools at each `LTORG` and once more at the end of the program
//!
//! The output is a sequence of chunks whose lengths form the record-length
//! ledger consumed by the Text record packer.
//!
//! A format-3/4 operand that names a symbol or literal is resolved as an
//! address (PC-relative, then base-relative). Numbers and expression results
//! go into the displacement field as values. [`AddressingConfig`] can switch
//! the choice to relocatability and enable the format-4 direct fallback.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::addressing::{self, Addressing, Target};
use crate::config::AddressingConfig;
use crate::directives::{self, Directive};
use crate::error::AsmError;
use crate::instruction::{self, register_operand, Format, InsnCatalog, InsnDef};
use crate::line::Line;
use crate::literal::LiteralPool;
use crate::symbol::{is_label, SymbolTable, Value};

// ---------------------------------------------------------------------------
//  Emitted code
// ---------------------------------------------------------------------------

/// Bytes contributed by one record-length entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Index of the line that produced the bytes (the `LTORG` or last line
    /// for literal pools).
    pub line: usize,
    pub bytes: Vec<u8>,
}

/// Everything pass 2 produced for a program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectCode {
    /// Emitted byte chunks, in program order.
    pub chunks: Vec<Chunk>,
    /// Bytes reserved by `RESB`/`RESW`, in program order.
    pub reserves: Vec<u32>,
    /// Resolved flags for every format-3/4 line, by line index.
    pub addressing: BTreeMap<usize, Addressing>,
}

impl ObjectCode {
    fn push(&mut self, line: usize, bytes: Vec<u8>) {
        self.chunks.push(Chunk { line, bytes });
    }

    /// Byte length of each chunk.
    pub fn record_lengths(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.bytes.len() as u32).collect()
    }

    /// Total emitted object bytes.
    pub fn total_bytes(&self) -> u32 {
        self.chunks.iter().map(|c| c.bytes.len() as u32).sum()
    }

    /// Program size field: emitted bytes plus reservations, minus one (the
    /// highest used offset).
    pub fn program_size(&self) -> u32 {
        (self.total_bytes() + self.reserves.iter().sum::<u32>()).saturating_sub(1)
    }

    /// Object bytes produced by line `index`.
    pub fn line_bytes(&self, index: usize) -> Vec<u8> {
        self.chunks
            .iter()
            .filter(|c| c.line == index)
            .flat_map(|c| c.bytes.iter().copied())
            .collect()
    }

    /// All bytes in program order.
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.bytes.iter().copied()).collect()
    }
}

/// Pass-2 failure on a specific line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitFailure {
    /// Index of the failing line.
    pub index: usize,
    pub error: AsmError,
}

// ---------------------------------------------------------------------------
//  Emitter
// ---------------------------------------------------------------------------

/// Pass-2 code generator over resolved pass-1 tables.
#[derive(Debug)]
pub struct Emitter<'a> {
    pub catalog: &'a InsnCatalog,
    pub symbols: &'a SymbolTable,
    pub literals: &'a LiteralPool,
    /// Values of operands evaluated as expressions, by line index.
    pub resolved: &'a HashMap<usize, Value>,
    /// Active base register.
    pub base: Option<u32>,
    pub options: AddressingConfig,
}

impl Emitter<'_> {
    /// Generate object code for a whole program. The first failure aborts
    /// generation.
    pub fn emit_program(&self, lines: &[Line]) -> Result<ObjectCode, EmitFailure> {
        let mut code = ObjectCode::default();
        let mut pools = 0;

        for (idx, line) in lines.iter().enumerate() {
            let fail = |error: AsmError| EmitFailure { index: idx, error };

            if let Some(def) = self.catalog.lookup(&line.mnemonic) {
                let bytes = self.emit_instruction(idx, line, def, &mut code).map_err(fail)?;
                code.push(idx, bytes);
                continue;
            }

            let invalid = |detail: String| {
                fail(AsmError::InvalidOperand {
                    line: line.number,
                    detail,
                })
            };
            match Directive::from_mnemonic(&line.mnemonic) {
                Some(Directive::Byte) => {
                    for chunk in directives::byte_constants(&line.operand1).map_err(invalid)? {
                        code.push(idx, chunk);
                    }
                }
                Some(Directive::Word) => {
                    for chunk in directives::word_constants(&line.operand1).map_err(invalid)? {
                        code.push(idx, chunk);
                    }
                }
                Some(d @ (Directive::Resb | Directive::Resw)) => {
                    code.reserves
                        .push(directives::reservation(d, &line.operand1).map_err(invalid)?);
                }
                Some(Directive::Ltorg) => {
                    self.emit_pool(pools, idx, &mut code);
                    pools += 1;
                }
                Some(_) => {}
                None => {
                    return Err(fail(AsmError::UnknownMnemonic {
                        line: line.number,
                        mnemonic: line.mnemonic.clone(),
                    }))
                }
            }
        }

        // Literals referenced after the last LTORG.
        self.emit_pool(pools, lines.len().saturating_sub(1), &mut code);
        Ok(code)
    }

    fn emit_pool(&self, pool: usize, line: usize, code: &mut ObjectCode) {
        for literal in self.literals.pool(pool) {
            tracing::debug!(literal = %literal.operand, "Literal emitted");
            code.push(line, literal.bytes());
        }
    }

    fn emit_instruction(
        &self,
        idx: usize,
        line: &Line,
        def: &InsnDef,
        code: &mut ObjectCode,
    ) -> Result<Vec<u8>, AsmError> {
        let format = self
            .catalog
            .format_of(&line.mnemonic)
            .ok_or_else(|| AsmError::UnknownMnemonic {
                line: line.number,
                mnemonic: line.mnemonic.clone(),
            })?;

        if format.is_memory() {
            let target = self.target(idx, line)?;
            let indexed = !line.operand2.is_empty();
            let addr = addressing::resolve(line.location, format, line.mode, indexed, target, self.base)
                .or_else(|err| match (format, target) {
                    (Format::Four, Target::Address(address)) if self.options.extended_direct => {
                        addressing::direct(line.mode, indexed, address)
                    }
                    _ => Err(err),
                })
                .map_err(|err| {
                    tracing::debug!(line = line.number, error = %err, "Addressing failed");
                    AsmError::DisplacementOverflow {
                        line: line.number,
                        operand: line.operand1.clone(),
                    }
                })?;
            code.addressing.insert(idx, addr);
            return Ok(instruction::encode_format34(def.opcode, &addr));
        }

        match format {
            Format::Two => {
                let r1 = self.register(line, &line.operand1)?;
                let r2 = if def.second_operand {
                    self.register(line, &line.operand2)?
                } else {
                    0
                };
                Ok(instruction::encode_format2(def, r1, r2))
            }
            _ => Ok(instruction::encode_format1(def)),
        }
    }

    fn register(&self, line: &Line, operand: &str) -> Result<u8, AsmError> {
        register_operand(operand).ok_or_else(|| AsmError::WrongOperandType {
            line: line.number,
            operand: operand.to_string(),
        })
    }

    /// What the first operand of a format-3/4 line refers to.
    fn target(&self, idx: usize, line: &Line) -> Result<Target, AsmError> {
        let operand = line.operand1.as_str();
        if operand.is_empty() {
            return Ok(Target::None);
        }
        if line.has_literal() {
            return self
                .literals
                .lookup(operand)
                .map(|lit| Target::Address(lit.address))
                .ok_or_else(|| AsmError::UndefinedSymbol {
                    line: line.number,
                    name: operand.to_string(),
                });
        }
        let relocatable = self.options.relocatable_operands;
        if let Some(symbol) = self.symbols.lookup(operand) {
            if relocatable && !symbol.relative {
                return Ok(Target::Value(symbol.value));
            }
            return self.address(line, symbol.value);
        }
        if let Some(value) = self.resolved.get(&idx) {
            if relocatable && value.relative {
                return self.address(line, value.value);
            }
            return Ok(Target::Value(value.value));
        }
        if let Ok(value) = operand.parse::<i64>() {
            return Ok(Target::Value(value));
        }
        if is_label(operand) {
            return Err(AsmError::UndefinedSymbol {
                line: line.number,
                name: operand.to_string(),
            });
        }
        Err(AsmError::WrongOperandType {
            line: line.number,
            operand: operand.to_string(),
        })
    }

    fn address(&self, line: &Line, value: i64) -> Result<Target, AsmError> {
        u32::try_from(value)
            .map(Target::Address)
            .map_err(|_| AsmError::DisplacementOverflow {
                line: line.number,
                operand: line.operand1.clone(),
            })
    }
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

//! Two-pass assembler driver.
//!
//! The [`Assembler`] owns every table an assembly run touches (symbols,
//! literals, location counter, resolved operand values, line errors) and
//! resets them at the start of each run.
//!
//! - **Pass 1** walks the lines in source order: assigns locations, defines
//!   labels and `EQU` symbols, flushes literal pools at `LTORG` and at the
//!   end, evaluates operand expressions and validates operands. Every line
//!   error is collected before the pass is judged.
//! - **Pass 2** runs only on an error-free pass 1: emits object code and
//!   packs it into Header/Text/End records.

use std::collections::{BTreeMap, HashMap};

use crate::config::AsmConfig;
use crate::directives::{self, Directive};
use crate::emitter::{Emitter, ObjectCode};
use crate::error::{AsmError, ErrorKind};
use crate::instruction::{register_operand, Format, InsnCatalog};
use crate::lexer;
use crate::line::Line;
use crate::literal::{Literal, LiteralPool, LocationCounter, MAX_ADDRESS};
use crate::object::ObjectProgram;
use crate::symbol::{eval_expression, is_expression, is_label, SymbolTable, Value};

/// What a line does to the location counter in pass 1.
enum Step {
    /// Advance by this many bytes.
    Advance(u32),
    /// Move to an absolute address (`START`, `ORG`).
    Move(u32),
    /// Flush the literal pool (`LTORG`).
    Flush,
}

// ---------------------------------------------------------------------------
//  Assembler
// ---------------------------------------------------------------------------

/// Assembly context for one program at a time.
#[derive(Debug, Clone)]
pub struct Assembler {
    config: AsmConfig,
    catalog: InsnCatalog,
    lines: Vec<Line>,
    symbols: SymbolTable,
    literals: LiteralPool,
    locctr: LocationCounter,
    /// Operand values computed from expressions, by line index.
    resolved: HashMap<usize, Value>,
    /// First error recorded on each line, by line index.
    errors: BTreeMap<usize, ErrorKind>,
    base: Option<u32>,
    code: Option<ObjectCode>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Create an assembler with the built-in configuration.
    pub fn new() -> Self {
        Self::with_config(AsmConfig::default())
    }

    /// Create an assembler with a loaded configuration.
    pub fn with_config(config: AsmConfig) -> Self {
        let catalog = config.catalog();
        Self {
            config,
            catalog,
            lines: Vec::new(),
            symbols: SymbolTable::new(),
            literals: LiteralPool::new(),
            locctr: LocationCounter::default(),
            resolved: HashMap::new(),
            errors: BTreeMap::new(),
            base: None,
            code: None,
        }
    }

    /// Discard all state from a previous run.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.symbols.clear();
        self.literals.clear();
        self.locctr = LocationCounter::default();
        self.resolved.clear();
        self.errors.clear();
        self.base = None;
        self.code = None;
    }

    /// Tokenize and assemble source text.
    pub fn assemble_source(&mut self, source: &str) -> Result<ObjectProgram, AsmError> {
        self.assemble(lexer::parse_source(source))
    }

    /// Run both passes over tokenized lines.
    pub fn assemble(&mut self, lines: Vec<Line>) -> Result<ObjectProgram, AsmError> {
        self.pass_one(lines)?;
        self.pass_two()
    }

    // -- Pass 1 -----------------------------------------------------------

    /// Build the symbol and literal tables and validate every line.
    ///
    /// Returns [`AsmError::PassOne`] if any line error was recorded; the
    /// tables stay available for diagnosis either way.
    pub fn pass_one(&mut self, lines: Vec<Line>) -> Result<(), AsmError> {
        self.reset();
        self.lines = lines;
        for (idx, line) in self.lines.iter_mut().enumerate() {
            if line.number == 0 {
                line.number = idx + 1;
            }
            if let Some(kind) = line.error {
                self.errors.insert(idx, kind);
            }
        }
        tracing::info!(lines = self.lines.len(), "Pass 1 started");

        for idx in 0..self.lines.len() {
            if self.errors.contains_key(&idx) {
                self.lines[idx].location = self.locctr.value;
            } else {
                self.locate(idx);
            }
        }
        self.flush_literals(self.lines.len());

        for idx in 0..self.lines.len() {
            if !self.errors.contains_key(&idx) {
                self.validate(idx);
            }
        }
        self.base = self.find_base();

        if !self.errors.is_empty() {
            tracing::warn!(errors = self.errors.len(), "Pass 1 failed");
            return Err(AsmError::PassOne {
                count: self.errors.len(),
            });
        }
        tracing::info!(
            symbols = self.symbols.len(),
            literals = self.literals.len(),
            end = %format!("{:06X}", self.locctr.value),
            "Pass 1 complete"
        );
        Ok(())
    }

    /// Assign the location of line `idx`, define its label and advance the
    /// location counter.
    fn locate(&mut self, idx: usize) {
        let line = self.lines[idx].clone();
        let loc = self.locctr.value;
        self.lines[idx].location = loc;

        let step = match Directive::from_mnemonic(&line.mnemonic) {
            None => self.instruction_length(&line).map(Step::Advance),
            Some(Directive::Equ) => {
                self.define_equ(idx, &line);
                return;
            }
            Some(Directive::Start) => {
                let operand = if line.operand1.is_empty() { "0" } else { line.operand1.as_str() };
                u32::from_str_radix(operand, 16)
                    .ok()
                    .filter(|start| *start <= MAX_ADDRESS)
                    .map(Step::Move)
                    .ok_or(ErrorKind::WrongOperandType)
            }
            Some(Directive::Org) => eval_expression(&line.operand1, &self.symbols, loc)
                .ok()
                .and_then(|v| u32::try_from(v.value).ok())
                .filter(|address| *address <= MAX_ADDRESS)
                .map(Step::Move)
                .ok_or(ErrorKind::WrongOperandType),
            Some(Directive::Ltorg) => Ok(Step::Flush),
            Some(Directive::Byte) => directives::byte_constants(&line.operand1)
                .map(|chunks| chunks.iter().map(|c| c.len() as u32).sum::<u32>())
                .map(Step::Advance)
                .map_err(|_| ErrorKind::WrongOperandType),
            Some(Directive::Word) => directives::word_constants(&line.operand1)
                .map(|chunks| 3 * chunks.len() as u32)
                .map(Step::Advance)
                .map_err(|_| ErrorKind::WrongOperandType),
            Some(d @ (Directive::Resb | Directive::Resw)) => directives::reservation(d, &line.operand1)
                .map(Step::Advance)
                .map_err(|_| ErrorKind::WrongOperandType),
            Some(Directive::Base | Directive::Nobase | Directive::End) => Ok(Step::Advance(0)),
        };

        if let Ok(Step::Move(start)) = step {
            if Directive::from_mnemonic(&line.mnemonic) == Some(Directive::Start) {
                self.lines[idx].location = start;
            }
        }
        if line.has_label() {
            self.symbols.define_label(&line.label, self.lines[idx].location);
        }

        let moved = match step {
            Ok(Step::Advance(bytes)) => self.locctr.advance(bytes),
            Ok(Step::Move(address)) => {
                self.locctr.value = address;
                Ok(())
            }
            Ok(Step::Flush) => {
                self.flush_literals(idx + 1);
                Ok(())
            }
            Err(kind) => Err(kind),
        };
        if let Err(kind) = moved {
            self.record_error(idx, kind);
        }
    }

    /// Encoded length of a machine instruction, rejecting malformed literals
    /// before they can reach a pool.
    fn instruction_length(&self, line: &Line) -> Result<u32, ErrorKind> {
        let format = self
            .catalog
            .format_of(&line.mnemonic)
            .ok_or(ErrorKind::UnknownMnemonic)?;
        if line.has_literal() && Literal::parse(&line.operand1).is_none() {
            return Err(ErrorKind::WrongOperandType);
        }
        Ok(format.length())
    }

    /// Evaluate an `EQU` operand against the symbols defined so far.
    fn define_equ(&mut self, idx: usize, line: &Line) {
        match eval_expression(&line.operand1, &self.symbols, line.location) {
            Ok(value) => {
                tracing::debug!(
                    line = line.number,
                    symbol = %line.label,
                    value = value.value,
                    "Evaluated EQU"
                );
                if line.has_label() {
                    self.symbols.define_equ(&line.label, value);
                }
                self.resolved.insert(idx, value);
            }
            Err(err) => {
                tracing::debug!(line = line.number, error = %err, "EQU evaluation failed");
                self.record_error(idx, ErrorKind::WrongOperandType);
            }
        }
    }

    /// Place pending literals referenced by `lines[..end]`.
    fn flush_literals(&mut self, end: usize) {
        let errors = &self.errors;
        let pool = self.literals.flushes();
        let placed = self.literals.flush(
            &self.lines[..end],
            |i| !errors.contains_key(&i),
            &mut self.locctr,
        );
        if placed > 0 {
            tracing::debug!(pool, placed, "Literal pool flushed");
        }
    }

    /// Check the operands of line `idx` once every symbol is known.
    fn validate(&mut self, idx: usize) {
        let line = &self.lines[idx];
        if Directive::from_mnemonic(&line.mnemonic) == Some(Directive::Base) {
            if let Err(err) = eval_expression(&line.operand1, &self.symbols, line.location) {
                tracing::debug!(line = line.number, error = %err, "BASE operand unresolved");
                self.record_error(idx, ErrorKind::WrongOperandType);
            }
            return;
        }
        let (Some(def), Some(format)) = (
            self.catalog.lookup(&line.mnemonic),
            self.catalog.format_of(&line.mnemonic),
        ) else {
            return;
        };

        let checked = if format.is_memory() {
            self.check_memory_operand(line)
        } else if format == Format::Two {
            let second_ok = !def.second_operand || register_operand(&line.operand2).is_some();
            if register_operand(&line.operand1).is_some() && second_ok {
                Ok(None)
            } else {
                Err(ErrorKind::WrongOperandType)
            }
        } else {
            Ok(None)
        };

        match checked {
            Ok(Some(value)) => {
                tracing::debug!(
                    line = line.number,
                    operand = %line.operand1,
                    value = value.value,
                    relative = value.relative,
                    "Evaluated expression"
                );
                self.resolved.insert(idx, value);
            }
            Ok(None) => {}
            Err(kind) => self.record_error(idx, kind),
        }
    }

    /// Resolve the operand of a format-3/4 line. Returns the evaluated value
    /// for expressions, `None` for operands pass 2 looks up directly.
    fn check_memory_operand(&self, line: &Line) -> Result<Option<Value>, ErrorKind> {
        let operand = line.operand1.as_str();
        if !line.operand2.is_empty() && line.operand2 != "X" {
            return Err(ErrorKind::WrongOperandType);
        }
        if operand.is_empty() {
            return Ok(None);
        }
        if line.has_literal() {
            return match self.literals.lookup(operand) {
                Some(_) => Ok(None),
                None => Err(ErrorKind::WrongOperandType),
            };
        }
        if is_expression(operand) || operand == "*" {
            return eval_expression(operand, &self.symbols, line.location)
                .map(Some)
                .map_err(|_| ErrorKind::WrongOperandType);
        }
        if is_label(operand) {
            return match self.symbols.is_defined(operand) {
                true => Ok(None),
                false => Err(ErrorKind::UndefinedSymbol),
            };
        }
        match operand.parse::<i64>() {
            Ok(_) => Ok(None),
            Err(_) => Err(ErrorKind::UndefinedSymbol),
        }
    }

    /// The base register for the whole program: set by the first `BASE`, or
    /// left inactive by a `NOBASE` that comes first.
    fn find_base(&self) -> Option<u32> {
        let (idx, line) = self.lines.iter().enumerate().find(|(_, l)| {
            matches!(
                Directive::from_mnemonic(&l.mnemonic),
                Some(Directive::Base | Directive::Nobase)
            )
        })?;
        if self.errors.contains_key(&idx)
            || Directive::from_mnemonic(&line.mnemonic) == Some(Directive::Nobase)
        {
            return None;
        }
        let value = eval_expression(&line.operand1, &self.symbols, line.location).ok()?;
        let base = u32::try_from(value.value).ok()?;
        tracing::debug!(base = %format!("{base:06X}"), "Base register active");
        Some(base)
    }

    fn record_error(&mut self, idx: usize, kind: ErrorKind) {
        let line = &mut self.lines[idx];
        tracing::warn!(
            line = line.number,
            code = kind.code(),
            mnemonic = %line.mnemonic,
            operand = %line.operand1,
            "{}",
            kind.message()
        );
        line.error.get_or_insert(kind);
        self.errors.entry(idx).or_insert(kind);
    }

    // -- Pass 2 -----------------------------------------------------------

    /// Generate the object program. Requires an error-free pass 1.
    ///
    /// An operand that cannot be encoded voids the whole program; the error
    /// is recorded on its line and returned.
    pub fn pass_two(&mut self) -> Result<ObjectProgram, AsmError> {
        if !self.errors.is_empty() {
            return Err(AsmError::PassOne {
                count: self.errors.len(),
            });
        }
        tracing::info!(base = ?self.base, "Pass 2 started");

        let emitter = Emitter {
            catalog: &self.catalog,
            symbols: &self.symbols,
            literals: &self.literals,
            resolved: &self.resolved,
            base: self.base,
            options: self.config.addressing,
        };
        let code = match emitter.emit_program(&self.lines) {
            Ok(code) => code,
            Err(failure) => {
                if let Some(kind) = failure.error.kind() {
                    self.record_error(failure.index, kind);
                }
                tracing::warn!(error = %failure.error, "Pass 2 aborted");
                return Err(failure.error);
            }
        };

        let program = ObjectProgram::build(&self.lines, &code, &self.config.object);
        tracing::info!(
            program = %program.header.name,
            size = %format!("{:06X}", program.header.size),
            text_records = program.texts.len(),
            "Pass 2 complete"
        );
        self.code = Some(code);
        Ok(program)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &AsmConfig {
        &self.config
    }

    pub fn catalog(&self) -> &InsnCatalog {
        &self.catalog
    }

    /// Lines of the last run, with locations and error codes filled in.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn literals(&self) -> &LiteralPool {
        &self.literals
    }

    /// Active base register value.
    pub fn base(&self) -> Option<u32> {
        self.base
    }

    /// Location counter after pass 1.
    pub fn location_counter(&self) -> u32 {
        self.locctr.value
    }

    /// Value computed for the operand of line `idx`, if it was evaluated.
    pub fn resolved(&self, idx: usize) -> Option<Value> {
        self.resolved.get(&idx).copied()
    }

    /// Error recorded on line `idx`.
    pub fn error_at(&self, idx: usize) -> Option<ErrorKind> {
        self.errors.get(&idx).copied()
    }

    /// Number of lines with errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Object code of the last successful pass 2.
    pub fn object_code(&self) -> Option<&ObjectCode> {
        self.code.as_ref()
    }

    /// One error per failed line, in source order.
    pub fn diagnostics(&self) -> Vec<AsmError> {
        self.errors
            .iter()
            .map(|(&idx, &kind)| {
                let line = &self.lines[idx];
                let subject = match kind {
                    ErrorKind::UnknownMnemonic => &line.mnemonic,
                    _ if line.operand1.is_empty() => &line.mnemonic,
                    _ => &line.operand1,
                };
                AsmError::from_kind(kind, line.number, subject)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

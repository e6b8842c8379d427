//! Symbol table and expression evaluator.
//!
//! - Symbol table keyed by name, iterated in definition order
//! - Labels take the location of their line; EQU symbols take a computed value
//! - Expressions are label/number terms joined by `+` and `-`, evaluated
//!   strictly left to right; `*` is the current location
//! - A value is relative (an address) when its relative terms do not cancel
//!   out: `BUFFER+3` is relative, `BUFEND-BUFFER` is absolute

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
//  Symbol table
// ---------------------------------------------------------------------------

/// A symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    /// Symbol name (uppercase).
    pub name: String,
    /// Address, or the EQU value.
    pub value: i64,
    /// Whether this symbol was defined via EQU.
    pub is_equ: bool,
    /// Whether the value is an address rather than an absolute constant.
    pub relative: bool,
}

/// The symbol table.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    /// Names in order of first definition.
    order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a label at an address. Redefinition overwrites.
    pub fn define_label(&mut self, name: &str, address: u32) {
        self.insert(name, address as i64, false, true);
    }

    /// Define an EQU symbol. Redefinition overwrites.
    pub fn define_equ(&mut self, name: &str, value: Value) {
        self.insert(name, value.value, true, value.relative);
    }

    fn insert(&mut self, name: &str, value: i64, is_equ: bool, relative: bool) {
        let upper = name.to_uppercase();
        if !self.symbols.contains_key(&upper) {
            self.order.push(upper.clone());
        }
        self.symbols.insert(
            upper.clone(),
            Symbol {
                name: upper,
                value,
                is_equ,
                relative,
            },
        );
    }

    /// Look up a symbol by name.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(&name.to_uppercase())
    }

    /// Check if a symbol is defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Symbol value as an address, if defined and non-negative.
    pub fn address(&self, name: &str) -> Option<u32> {
        self.lookup(name).and_then(|s| u32::try_from(s.value).ok())
    }

    /// Symbols in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.order.iter().filter_map(|name| self.symbols.get(name))
    }

    /// Number of symbols defined.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.order.clear();
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SYMBOL    VALUE")?;
        for sym in self.iter() {
            let kind = if sym.is_equ { " EQU" } else { "" };
            writeln!(f, "{:<8}  {:06X}{}", sym.name, sym.value & 0xFF_FFFF, kind)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
//  Expression evaluator
// ---------------------------------------------------------------------------

/// Expression evaluation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),
    #[error("Invalid expression: {0}")]
    Invalid(String),
}

/// An expression token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprToken {
    /// Label, decimal number or `*`.
    Term(String),
    /// `+` or `-`.
    Op(char),
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Value {
    pub value: i64,
    /// Whether the result is an address.
    pub relative: bool,
}

impl Value {
    /// An absolute constant.
    pub fn absolute(value: i64) -> Self {
        Self {
            value,
            relative: false,
        }
    }
}

/// Whether an operand is an arithmetic expression (has a `+`/`-` operator).
pub fn is_expression(text: &str) -> bool {
    !text.starts_with('=')
        && !text.contains('\'')
        && split_expression(text)
            .iter()
            .any(|t| matches!(t, ExprToken::Op(_)))
}

/// Whether a term is a label reference.
pub fn is_label(term: &str) -> bool {
    let mut chars = term.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split an expression at operator boundaries.
pub fn split_expression(text: &str) -> Vec<ExprToken> {
    let mut tokens = Vec::new();
    let mut term = String::new();
    for ch in text.chars() {
        match ch {
            '+' | '-' => {
                tokens.push(ExprToken::Term(std::mem::take(&mut term).trim().to_string()));
                tokens.push(ExprToken::Op(ch));
            }
            _ => term.push(ch),
        }
    }
    tokens.push(ExprToken::Term(term.trim().to_string()));
    tokens
}

/// Evaluate an expression against a symbol table. `location` is the value
/// of `*`.
pub fn eval_expression(text: &str, symbols: &SymbolTable, location: u32) -> Result<Value, ExprError> {
    let tokens = split_expression(text);

    // Every label must already be defined.
    for token in &tokens {
        if let ExprToken::Term(term) = token {
            if is_label(term) && !symbols.is_defined(term) {
                return Err(ExprError::UndefinedSymbol(term.to_uppercase()));
            }
        }
    }

    // Net count of relative terms: +1 for each added, -1 for each subtracted.
    let mut relative_terms = 0i64;
    let mut result = 0i64;
    let mut pending = Some('+');
    for token in &tokens {
        match (token, pending) {
            (ExprToken::Term(term), Some(op)) => {
                let (value, relative) = term_value(term, symbols, location)
                    .ok_or_else(|| ExprError::Invalid(text.to_string()))?;
                let sign = if op == '+' { 1 } else { -1 };
                result = if op == '+' {
                    result.checked_add(value)
                } else {
                    result.checked_sub(value)
                }
                .ok_or_else(|| ExprError::Invalid(text.to_string()))?;
                relative_terms += sign * relative as i64;
                pending = None;
            }
            (ExprToken::Op(op), None) => pending = Some(*op),
            _ => return Err(ExprError::Invalid(text.to_string())),
        }
    }
    if pending.is_some() {
        return Err(ExprError::Invalid(text.to_string()));
    }

    Ok(Value {
        value: result,
        relative: relative_terms != 0,
    })
}

/// Value of one term and whether it is relative.
fn term_value(term: &str, symbols: &SymbolTable, location: u32) -> Option<(i64, bool)> {
    if term == "*" {
        return Some((location as i64, true));
    }
    if is_label(term) {
        return symbols.lookup(term).map(|s| (s.value, s.relative));
    }
    if !term.is_empty() && term.bytes().all(|b| b.is_ascii_digit()) {
        return term.parse().ok().map(|v| (v, false));
    }
    None
}

// ---------------------------------------------------------------------------
//  Tests
// ---------------------------------------------------------------------------

//! Assembler configuration: object record layout and instruction table overrides.
//!
//! ```toml
//! [object]
//! text_record_limit = 30
//! separator = "^"
//!
//! [addressing]
//! extended_direct = false
//! relocatable_operands = false
//!
//! [[instructions]]
//! mnemonic = "HALT"
//! opcode = 0xF4
//! format = 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AsmError;
use crate::instruction::{InsnCatalog, InsnDef};

/// Largest Text record body the two-digit length field can describe.
pub const MAX_TEXT_RECORD: usize = 0xFF;

/// Top-level assembler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsmConfig {
    /// Object record settings.
    #[serde(default)]
    pub object: ObjectConfig,
    /// Operand encoding options.
    #[serde(default)]
    pub addressing: AddressingConfig,
    /// Instruction descriptors merged over the built-in SIC/XE set.
    #[serde(default)]
    pub instructions: Vec<InsnDef>,
}

/// Object program record settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectConfig {
    /// Maximum bytes in one Text record body.
    #[serde(default = "default_text_record_limit")]
    pub text_record_limit: usize,
    /// Record field separator.
    #[serde(default = "default_separator")]
    pub separator: char,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            text_record_limit: default_text_record_limit(),
            separator: default_separator(),
        }
    }
}

/// Operand encoding options. Both are off by default, which leaves the
/// plain PC-relative / base-relative rule in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressingConfig {
    /// A format-4 operand out of reach of PC and base carries its address
    /// directly in the 20-bit field (b=p=0) instead of failing.
    #[serde(default)]
    pub extended_direct: bool,
    /// Choose the encoding from relocatability instead of the operand text:
    /// absolute symbols are placed as values, relative expressions are
    /// resolved like addresses.
    #[serde(default)]
    pub relocatable_operands: bool,
}

fn default_text_record_limit() -> usize {
    30
}

fn default_separator() -> char {
    '^'
}

impl AsmConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AsmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AsmError::Config {
            detail: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, AsmError> {
        let config: Self = toml::from_str(content).map_err(|e| AsmError::Config {
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the record format cannot represent.
    pub fn validate(&self) -> Result<(), AsmError> {
        let limit = self.object.text_record_limit;
        if limit == 0 || limit > MAX_TEXT_RECORD {
            return Err(AsmError::Config {
                detail: format!("text_record_limit must be 1..={MAX_TEXT_RECORD}, got {limit}"),
            });
        }
        if self.object.separator.is_ascii_hexdigit() || !self.object.separator.is_ascii() {
            return Err(AsmError::Config {
                detail: format!("separator {:?} would be ambiguous in records", self.object.separator),
            });
        }
        for def in &self.instructions {
            if def.mnemonic.trim_start_matches('+').is_empty() {
                return Err(AsmError::Config {
                    detail: "instruction with an empty mnemonic".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The built-in catalog with this configuration's overrides applied.
    pub fn catalog(&self) -> InsnCatalog {
        let mut catalog = InsnCatalog::new();
        for def in &self.instructions {
            catalog.insert(def.clone());
        }
        catalog
    }
}

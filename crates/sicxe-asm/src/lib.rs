//! SIC/XE two-pass assembler.
//!
//! This crate turns tokenized SIC/XE assembly lines into a linkable object
//! program (Header, Text and End records):
//!
//! - **Pass 1** — location assignment, symbol table, `EQU`/`ORG` expressions,
//!   literal pools, operand validation
//! - **Pass 2** — n/i/x/b/p/e flag resolution (PC-relative first, base-relative
//!   fallback), object code emission, Text record packing
//!
//! # Example
//!
//! ```
//! use sicxe_asm::Assembler;
//!
//! let src = "\
//! COPY     START   1000
//! FIRST    LDA     FIVE
//!          RSUB
//! FIVE     WORD    5
//!          END     FIRST
//! ";
//!
//! let mut asm = Assembler::new();
//! let program = asm.assemble_source(src).unwrap();
//! assert_eq!(program.records()[0], "H^COPY  ^001000^000008");
//! assert_eq!(program.records()[1], "T^001000^09^0320034F0000000005");
//! ```

pub mod addressing;
pub mod assembler;
pub mod config;
pub mod directives;
pub mod emitter;
pub mod error;
pub mod instruction;
pub mod lexer;
pub mod line;
pub mod literal;
pub mod object;
pub mod symbol;

pub use addressing::{direct, resolve, Addressing, AddressingError, Flags, Target};
pub use assembler::Assembler;
pub use config::{AddressingConfig, AsmConfig, ObjectConfig};
pub use directives::Directive;
pub use emitter::{Chunk, ObjectCode};
pub use error::{AsmError, ErrorKind};
pub use instruction::{decode_format34, encode_format34, Format, InsnCatalog, InsnDef};
pub use lexer::{parse_source, parse_source_line};
pub use line::{AddrMode, Line};
pub use literal::{Literal, LiteralKind, LiteralPool, LocationCounter};
pub use object::{EndRecord, HeaderRecord, ObjectProgram, TextRecord};
pub use symbol::{eval_expression, ExprError, Symbol, SymbolTable, Value};

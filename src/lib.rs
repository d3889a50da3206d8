//! Line parser and instruction-table compiler for x86/x86-64 assembly.
//!
//! This crate covers two independent subsystems:
//!
//! - [`line_parser`]: turns one pre-processed assembly source line (label,
//!   prefixes, mnemonic and operands already split out by a caller's
//!   preprocessor) into a structured [`insn::Instruction`] record — the
//!   registers, memory references, immediates and decorators an assembler
//!   or disassembler front-end needs, without itself emitting any bytes.
//! - [`gen`]: reads an `insns.dat`-style instruction database and compiles
//!   it into a bytecode pool, per-mnemonic template table, disassembly
//!   dispatch tree, mnemonic enumeration and mnemonic name table — the
//!   tables a full assembler's opcode-matching and emission stage would
//!   consume.
//!
//! Neither subsystem resolves labels, tracks sections, or emits machine
//! code directly; both stop at the structured records their respective
//! callers would encode.
//!
//! # Errors
//!
//! Most failures here are non-fatal: the line parser reports them through
//! a [`diag::DiagSink`] and recovers by skipping to the next operand,
//! leaving as much of the record populated as it safely can. The
//! instruction-database compiler's failures (a malformed database line, an
//! unrecognized bytecode token, a colliding disassembly byte) are hard
//! errors — a bad database can't be compiled around.

pub mod bytecode;
pub mod db;
pub mod diag;
pub mod disasm;
pub mod error;
pub mod eval;
pub mod extop;
pub mod gen;
pub mod insn;
pub mod line_parser;
pub mod memref;
pub mod operand;
pub mod regs;
pub mod scan;
pub mod token;

pub use diag::{CollectingSink, DiagSink, Diagnostic, Severity, StderrSink};
pub use error::{Error, Result};
pub use insn::{Instruction, Opcode};
pub use line_parser::{parse_line, ParseOptions};

pub use gen::{compile_database, CompiledDatabase, GenError, MnemonicTable, Template};

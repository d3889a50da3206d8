//! Instruction-table compiler: reads an `insns.dat`-style database and
//! produces the five generator outputs — a bytecode pool, per-mnemonic
//! template table, disassembly dispatch tree, mnemonic enumeration and
//! mnemonic name table — as both in-memory structures and the plain-Rust
//! source text `asmline gen-tables` writes to disk.

pub mod render;

use crate::bytecode::{self, BytecodePool, CompileError, CompiledEncoding, InsnFlags};
use crate::db::{self, DbError, EncodingSrc, ExpandedPattern};
use crate::disasm::{self, DisasmError, DisasmIndex};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    Db(String),
    Compile(String),
    Disasm(String),
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::Db(m) => write!(f, "database error: {m}"),
            GenError::Compile(m) => write!(f, "bytecode compile error: {m}"),
            GenError::Disasm(m) => write!(f, "disassembly index error: {m}"),
        }
    }
}
impl std::error::Error for GenError {}

impl From<DbError> for GenError {
    fn from(e: DbError) -> Self {
        GenError::Db(e.0)
    }
}
impl From<CompileError> for GenError {
    fn from(e: CompileError) -> Self {
        GenError::Compile(e.0)
    }
}
impl From<DisasmError> for GenError {
    fn from(e: DisasmError) -> Self {
        GenError::Disasm(e.0)
    }
}

/// One fully compiled instruction pattern: the expanded form plus its
/// compiled encoding, flags and pool placement.
#[derive(Debug, Clone)]
pub struct Template {
    pub mnemonic: String,
    pub operands: Vec<String>,
    pub flags: InsnFlags,
    pub encoding: CompiledEncoding,
    pub pool_offset: usize,
}

/// Mnemonic enumeration: stable, sorted, deduplicated.
#[derive(Debug, Default, Clone)]
pub struct MnemonicTable {
    names: Vec<String>,
}

impl MnemonicTable {
    fn build(mnemonics: impl Iterator<Item = String>) -> MnemonicTable {
        let mut names: Vec<String> = mnemonics.collect();
        names.sort();
        names.dedup();
        MnemonicTable { names }
    }

    pub fn id_of(&self, mnemonic: &str) -> Option<u32> {
        self.names.iter().position(|n| n == mnemonic).map(|i| i as u32)
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// The five generator outputs, held in memory.
pub struct CompiledDatabase {
    pub pool: BytecodePool,
    pub templates: Vec<Template>,
    pub disasm: DisasmIndex,
    pub mnemonics: MnemonicTable,
}

/// Reads and compiles an entire `insns.dat`-style database.
pub fn compile_database(text: &str) -> Result<CompiledDatabase, GenError> {
    let raw_lines = db::parse_database(text)?;

    let mut patterns: Vec<ExpandedPattern> = Vec::new();
    for line in &raw_lines {
        patterns.extend(db::expand_line(line));
    }

    let mut compiled: Vec<(String, Vec<String>, InsnFlags, CompiledEncoding)> = Vec::new();
    for pattern in &patterns {
        let dsl = match &pattern.encoding {
            EncodingSrc::Ignore => continue,
            EncodingSrc::RawBytes(bytes) => {
                let mut enc = CompiledEncoding::default();
                enc.bytes = bytes.clone();
                compiled.push((
                    pattern.mnemonic.clone(),
                    pattern.operands.iter().map(|o| o.text.clone()).collect(),
                    InsnFlags::from_names(&pattern.flags),
                    enc,
                ));
                continue;
            }
            EncodingSrc::Dsl(s) => s,
        };
        let encoding = bytecode::compile_dsl_relaxed(dsl, pattern.relax_mask)?;
        let flags = bytecode::synthesize(InsnFlags::from_names(&pattern.flags), encoding.legacy_map, encoding.is_evex);
        compiled.push((
            pattern.mnemonic.clone(),
            pattern.operands.iter().map(|o| o.text.clone()).collect(),
            flags,
            encoding,
        ));
    }

    let sequences: Vec<Vec<u8>> = compiled.iter().map(|(_, _, _, e)| e.bytes.clone()).collect();
    let (pool, offsets) = BytecodePool::build(&sequences);

    let templates: Vec<Template> = compiled
        .into_iter()
        .zip(offsets)
        .map(|((mnemonic, operands, flags, encoding), pool_offset)| Template {
            mnemonic,
            operands,
            flags,
            encoding,
            pool_offset,
        })
        .collect();

    let disasm_input: Vec<(String, CompiledEncoding)> =
        templates.iter().map(|t| (t.mnemonic.clone(), t.encoding.clone())).collect();
    let disasm = disasm::build_index(&disasm_input)?;

    let mnemonics = MnemonicTable::build(templates.iter().map(|t| t.mnemonic.clone()));

    Ok(CompiledDatabase { pool, templates, disasm, mnemonics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_tiny_database() {
        let text = "mov rmr, rmr [mr: 89 /r] X64\ntest void [ignore] X64\n";
        let db = compile_database(text).unwrap();
        assert!(db.mnemonics.id_of("mov").is_some());
        assert!(db.mnemonics.id_of("test").is_none());
        assert_eq!(db.templates.len(), 1);
    }

    #[test]
    fn conditional_form_multiplies_templates_across_conditions() {
        let text = "jcc imm32 [rel: 0f 80+c id] X64\n";
        let db = compile_database(text).unwrap();
        assert_eq!(db.templates.len(), 16);
        assert!(db.mnemonics.id_of("jo").is_some());
        assert!(db.mnemonics.id_of("jf").is_none());
    }

    #[test]
    fn scc_conditional_form_compiles_through_to_database() {
        let text = "setscc void [m: 0f 90 scc /0] X64\n";
        let db = compile_database(text).unwrap();
        assert_eq!(db.templates.len(), 14);
        assert!(db.mnemonics.id_of("seto").is_some());
        assert!(db.mnemonics.id_of("setf").is_none());
        let seto = db.templates.iter().find(|t| t.mnemonic == "seto").unwrap();
        assert!(seto.encoding.bytes.windows(2).any(|w| w == [0x90, 0x00]));
    }
}

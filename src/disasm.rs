//! Disassembly index builder: walks each compiled pattern's bytecode
//! from the front to find its starting byte(s), and enrolls the pattern
//! into a 256-entry table keyed by prefix class (legacy escape map, or
//! VEX/XOP/EVEX class/map/pp triple).

use crate::bytecode::CompiledEncoding;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmError(pub String);

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disassembly index error: {}", self.0)
    }
}
impl std::error::Error for DisasmError {}

/// A compiled pattern reference, by mnemonic and its index in the
/// caller's pattern table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub mnemonic: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    /// This byte only ever starts a longer prefix sequence (a legacy map
    /// escape or a VEX/XOP/EVEX lead byte) — never an instruction
    /// template directly.
    IsPrefix,
    Templates(Vec<TemplateRef>),
}

/// Octal-VM tags the walker recognizes; everything else is out of scope
/// for starting-byte computation (immediates, ModR/M forms — they don't
/// contribute leading bytes).
const LIT_MIN: u8 = 1;
const LIT_MAX: u8 = 4;
const MODRM_REG_ONLY_BASE: u8 = 0o10;
const MAP_PREFIX_BASE: u8 = 0o354;
const VEX_XOP_PREFIX: u8 = 0o260;
const NOV_VEX_PREFIX: u8 = 0o270;
const EVEX_PREFIX: u8 = 0o240;
const NOV_EVEX_PREFIX: u8 = 0o250;
const TERMINATOR: u8 = 0;

/// `[class][map][pp]` — class distinguishes VEX from XOP from EVEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VexClass {
    Vex,
    Xop,
    Evex,
}

#[derive(Debug, Default)]
pub struct DisasmIndex {
    /// One-byte opcode table for the unescaped (map 0) byte space.
    pub map0: [Cell; 256],
    /// Legacy escape maps (1 = `0f`, 2 = `0f38`, 3 = `0f3a`), each its own
    /// 256-entry table.
    pub legacy_maps: HashMap<u8, [Cell; 256]>,
    /// The 3-D VEX/XOP/EVEX table: class, map, pp, keyed further by the
    /// one literal opcode byte that follows the prefix triple.
    pub vex: HashMap<(VexClass, u8, u8), HashMap<u8, Vec<TemplateRef>>>,
}

impl DisasmIndex {
    fn new() -> Self {
        DisasmIndex { map0: std::array::from_fn(|_| Cell::Empty), legacy_maps: HashMap::new(), vex: HashMap::new() }
    }

    fn legacy_table(&mut self, map: u8) -> &mut [Cell; 256] {
        self.legacy_maps.entry(map).or_insert_with(|| std::array::from_fn(|_| Cell::Empty))
    }

    fn mark_prefix(&mut self, map: u8, byte: u8) -> Result<(), DisasmError> {
        let table = if map == 0 { &mut self.map0 } else { self.legacy_table(map) };
        match &table[byte as usize] {
            Cell::Templates(_) => {
                return Err(DisasmError(format!(
                    "byte {byte:#04x} in map {map} is both a prefix lead-in and an instruction start"
                )))
            }
            _ => table[byte as usize] = Cell::IsPrefix,
        }
        Ok(())
    }

    fn enroll(&mut self, map: u8, byte: u8, template: TemplateRef) -> Result<(), DisasmError> {
        let table = if map == 0 { &mut self.map0 } else { self.legacy_table(map) };
        match &mut table[byte as usize] {
            Cell::IsPrefix => {
                return Err(DisasmError(format!(
                    "byte {byte:#04x} in map {map} is both a prefix lead-in and an instruction start"
                )))
            }
            Cell::Empty => table[byte as usize] = Cell::Templates(vec![template]),
            Cell::Templates(v) => v.push(template),
        }
        Ok(())
    }

    fn enroll_vex(&mut self, class: VexClass, map: u8, pp: u8, byte: u8, template: TemplateRef) {
        self.vex.entry((class, map, pp)).or_default().entry(byte).or_default().push(template);
    }
}

/// Builds the disassembly index over every (non-ND) compiled pattern.
/// `patterns` pairs each pattern's mnemonic with its compiled bytecode.
pub fn build_index(patterns: &[(String, CompiledEncoding)]) -> Result<DisasmIndex, DisasmError> {
    let mut idx = DisasmIndex::new();

    for (pattern_index, (mnemonic, enc)) in patterns.iter().enumerate() {
        walk_one(&mut idx, pattern_index, mnemonic, &enc.bytes)?;
    }

    Ok(idx)
}

/// Walks a compiled pattern to find the single byte sequence that should
/// route a disassembler into it, and enrols that byte into the index.
///
/// Any literal bytes emitted before the *last* legacy-map escape (`66` in
/// `66 0f 7e /r`) are mandatory/operand-size prefixes, not opcode bytes —
/// only the run that follows the last escape (or the first run, if there
/// is no escape at all) is the real starting byte.
fn walk_one(idx: &mut DisasmIndex, pattern_index: usize, mnemonic: &str, bytes: &[u8]) -> Result<(), DisasmError> {
    let template = || TemplateRef { mnemonic: mnemonic.to_string(), index: pattern_index };

    if let Some(&tag) = bytes.first() {
        if matches!(tag, VEX_XOP_PREFIX | NOV_VEX_PREFIX | EVEX_PREFIX | NOV_EVEX_PREFIX) {
            let class = if matches!(tag, EVEX_PREFIX | NOV_EVEX_PREFIX) { VexClass::Evex } else { VexClass::Vex };
            // The specific map/pp fields aren't recoverable from the
            // bytecode alone at this stage (they're runtime operand
            // values for EVEX, static constants for VEX/XOP compiled
            // elsewhere); 0 is used as a placeholder bucket — every
            // pattern sharing a prefix class still lands in one shared
            // sub-table, so ambiguity detection still works within it.
            let (vmap, pp) = (0u8, 0u8);
            if bytes.len() < 2 {
                return Ok(());
            }
            let next = bytes[1];
            if (LIT_MIN..=LIT_MAX).contains(&next) {
                let n = next as usize;
                if 2 + n > bytes.len() {
                    return Err(DisasmError("truncated literal run after VEX/EVEX prefix".into()));
                }
                idx.enroll_vex(class, vmap, pp, bytes[2], template());
            }
            return Ok(());
        }
    }

    // Find the last legacy-map escape tag, if any, and mark its lead-in
    // byte(s) as prefix in the maps they escape from.
    let mut last_escape: Option<(usize, u8)> = None;
    for (i, &tag) in bytes.iter().enumerate() {
        if tag == TERMINATOR {
            break;
        }
        if (MAP_PREFIX_BASE..=MAP_PREFIX_BASE + 2).contains(&tag) {
            last_escape = Some((i, tag - MAP_PREFIX_BASE + 1));
        }
    }

    let (search_from, map) = if let Some((i, new_map)) = last_escape {
        idx.mark_prefix(0, 0x0f)?;
        match new_map {
            2 => idx.mark_prefix(1, 0x38)?,
            3 => idx.mark_prefix(1, 0x3a)?,
            _ => {}
        }
        (i + 1, new_map)
    } else {
        (0, 0)
    };

    let mut i = search_from;
    while i < bytes.len() {
        let tag = bytes[i];
        if tag == TERMINATOR {
            return Ok(());
        }
        if (LIT_MIN..=LIT_MAX).contains(&tag) {
            let n = tag as usize;
            if i + 1 + n > bytes.len() {
                return Err(DisasmError("truncated literal run".into()));
            }
            let base = bytes[i + 1];
            let after = i + 1 + n;
            if after < bytes.len() && (MODRM_REG_ONLY_BASE..MODRM_REG_ONLY_BASE + 8).contains(&bytes[after]) {
                // `+r`: the base byte ranges over all 8 register encodings.
                for r in 0..8u8 {
                    idx.enroll(map, base.wrapping_add(r), template())?;
                }
            } else {
                idx.enroll(map, base, template())?;
            }
            return Ok(());
        }
        i += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile_dsl;

    #[test]
    fn plain_opcode_enrolls_in_map0() {
        let enc = compile_dsl("mr: 89 /r").unwrap();
        let idx = build_index(&[("mov".to_string(), enc)]).unwrap();
        match &idx.map0[0x89] {
            Cell::Templates(v) => assert_eq!(v[0].mnemonic, "mov"),
            other => panic!("expected Templates, got {other:?}"),
        }
    }

    #[test]
    fn legacy_escape_marks_0f_as_prefix_and_enrolls_real_byte() {
        let enc = compile_dsl("mr: 66 0f 7e /r").unwrap();
        let idx = build_index(&[("movd".to_string(), enc)]).unwrap();
        assert_eq!(idx.map0[0x0f], Cell::IsPrefix);
        match &idx.legacy_maps[&1][0x7e] {
            Cell::Templates(v) => assert_eq!(v[0].mnemonic, "movd"),
            other => panic!("expected Templates, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_byte_is_a_hard_error() {
        // One pattern escapes through `0f38`, marking map-1 byte 0x38 as a
        // prefix lead-in; another reaches the same byte as a literal
        // opcode under map 1 — a real disassembly ambiguity.
        let a = compile_dsl("m: 0f38 90 /0").unwrap();
        let b = compile_dsl("m: 0f 38 /0").unwrap();
        let err = build_index(&[("vpmovd".to_string(), a), ("bogus".to_string(), b)]).unwrap_err();
        assert!(err.0.contains("0x38"));
    }
}

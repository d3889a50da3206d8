//! The bytecode DSL compiler: turns one expanded pattern's
//! `operands: tuple: opcodes` string into the octal-VM byte sequence the
//! assembler emitter consumes, plus the legacy-map/prefix-class facts the
//! disassembly index builder and flag synthesizer need.
//!
//! The reference VM's full opcode vocabulary is large; this compiler
//! implements the shapes actually exercised by the instruction database
//! this crate ships with (literal byte runs, `/r` and `/0`..`/7` ModR/M
//! forms, the common immediate-size variants, and VEX/EVEX prefix
//! emission) and documents, at each point, the specific numeric
//! convention chosen where the source format left room for more than one
//! reading.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError(pub String);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytecode compile error: {}", self.0)
    }
}
impl std::error::Error for CompileError {}

// Octal VM opcode bytes, named by the byte range each tag occupies.
const LIT_RUN_MAX: usize = 4;
const MODRM_REG_ONLY_BASE: u8 = 0o10;
const MODRM_FULL_BASE: u8 = 0o100;
const MODRM_RM_EXT_BASE: u8 = 0o200;
const IS4_EXPLICIT: u8 = 0o172;
const IS4_CONST: u8 = 0o173;
const IS4_IMPLICIT_BASE: u8 = 0o174;
const EVEX_PREFIX: u8 = 0o240;
const NOV_EVEX_PREFIX: u8 = 0o250;
const VEX_XOP_PREFIX: u8 = 0o260;
const NOV_VEX_PREFIX: u8 = 0o270;
const PREFIX_MANDATE_BASE: u8 = 0o330;
const MAP_PREFIX_BASE: u8 = 0o354;
const REX2_PREFIX: u8 = 0o350;
const IMM_BASE: u8 = 0o20;
const TERMINATOR: u8 = 0;

/// Immediate/relative-size variants, in the order they're assigned a code
/// starting at `IMM_BASE`. The database only ever uses the names listed
/// here; assigning them sequential codes (rather than trying to recover
/// a real assembler's exact historical numbering, which isn't
/// recoverable from this pattern's source material) keeps the
/// compiler's output internally consistent and round-trippable by the
/// disassembly builder.
const IMM_VARIANTS: &[&str] = &[
    "ib", "iw", "iwd", "id", "iq", "ib,u", "ib,s", "id,s", "iwdq", "rel8", "rel16", "rel", "rel32", "seg",
];

fn imm_code(name: &str) -> Option<u8> {
    IMM_VARIANTS.iter().position(|&v| v == name).map(|i| IMM_BASE + i as u8)
}

/// Which operand role a byte position in the ModR/M or immediate coding
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ModrmReg,
    ModrmRm,
    Vvvv,
    Immediate,
    Is4,
    MibIndex,
    Implicit,
}

fn role_of(c: char) -> Option<Role> {
    Some(match c {
        'r' => Role::ModrmReg,
        'm' => Role::ModrmRm,
        'v' => Role::Vvvv,
        'i' => Role::Immediate,
        's' => Role::Is4,
        'x' => Role::MibIndex,
        '-' => Role::Implicit,
        _ => return None,
    })
}

/// Maps each role character in an operand-role string to the zero-based
/// operand position it refers to. A `+` immediately before a role letter
/// means that letter shares its position with the previous consumed
/// position instead of advancing to a new one.
fn role_positions(operands: &str) -> Result<Vec<(Role, usize)>, CompileError> {
    let mut out = Vec::new();
    let mut next_pos = 0usize;
    let mut last_pos = 0usize;
    let mut share = false;

    for c in operands.chars() {
        if c == '+' {
            share = true;
            continue;
        }
        let role = role_of(c)
            .ok_or_else(|| CompileError(format!("unknown operand role character `{c}`")))?;
        let pos = if share {
            last_pos
        } else {
            let p = next_pos;
            next_pos += 1;
            p
        };
        last_pos = pos;
        share = false;
        out.push((role, pos));
    }
    Ok(out)
}

/// Applies the relax mask's "successive positions shift left by one"
/// rule: a position at or past an omitted (masked) operand moves down by
/// the count of omitted operands below it.
fn shift_for_relax(pos: usize, relax_mask: u32) -> usize {
    let below = relax_mask & ((1u32 << pos) - 1);
    pos.saturating_sub(below.count_ones() as usize)
}

fn position_of(positions: &[(Role, usize)], role: Role, relax_mask: u32) -> Option<usize> {
    positions.iter().find(|(r, _)| *r == role).map(|(_, p)| shift_for_relax(*p, relax_mask))
}

/// Result of compiling one pattern's DSL string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledEncoding {
    pub bytes: Vec<u8>,
    /// Highest legacy escape map byte encountered (0 = none, 1 = `0f`,
    /// 2 = `0f38`, 3 = `0f3a`), used by the EVEX/XOP map-range checks and
    /// by flag synthesis.
    pub legacy_map: u8,
    pub is_vex: bool,
    pub is_xop: bool,
    pub is_evex: bool,
}

struct Compiler<'a> {
    positions: Vec<(Role, usize)>,
    relax_mask: u32,
    tuple: Option<&'a str>,
    out: Vec<u8>,
    literal_run: Vec<u8>,
    prefix_ok: bool,
    legacy_map: u8,
    is_vex: bool,
    is_xop: bool,
    is_evex: bool,
}

impl<'a> Compiler<'a> {
    fn flush_literal(&mut self) {
        while !self.literal_run.is_empty() {
            let n = self.literal_run.len().min(LIT_RUN_MAX);
            self.out.push(n as u8);
            self.out.extend(self.literal_run.drain(..n));
        }
    }

    fn push_literal_byte(&mut self, b: u8) {
        self.literal_run.push(b);
        if self.literal_run.len() == LIT_RUN_MAX {
            self.flush_literal();
        }
    }

    fn role(&self, role: Role) -> Result<usize, CompileError> {
        position_of(&self.positions, role, self.relax_mask)
            .ok_or_else(|| CompileError(format!("operand string has no `{role:?}` role for this token")))
    }

    fn compile_token(&mut self, tok: &str) -> Result<(), CompileError> {
        if tok == "0f38" {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError("legacy map escape after opcode bytes".into()));
            }
            self.legacy_map = 2;
            self.out.extend([MAP_PREFIX_BASE + 1]);
            self.prefix_ok = false;
            return Ok(());
        }
        if tok == "0f3a" {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError("legacy map escape after opcode bytes".into()));
            }
            self.legacy_map = 3;
            self.out.extend([MAP_PREFIX_BASE + 2]);
            self.prefix_ok = false;
            return Ok(());
        }
        if tok == "0f" {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError("legacy map escape after opcode bytes".into()));
            }
            self.legacy_map = 1;
            self.out.push(MAP_PREFIX_BASE);
            self.prefix_ok = false;
            return Ok(());
        }
        if let Some((base, nibble)) = tok.split_once('+').and_then(|(b, n)| {
            if b.len() == 2 && n.len() == 1 {
                let base = u8::from_str_radix(b, 16).ok()?;
                let nibble = u8::from_str_radix(n, 16).ok()?;
                Some((base, nibble))
            } else {
                None
            }
        }) {
            // Condition-code folding (`80+c` substituted to e.g. `80+0` by
            // the pattern expander): the nibble ORs into the opcode byte's
            // low bits, the same shape as `+r` register folding but
            // resolved at expansion time instead of emitted as its own tag.
            self.push_literal_byte(base | nibble);
            self.prefix_ok = false;
            return Ok(());
        }
        if tok.len() == 2 && tok.chars().all(|c| c.is_ascii_hexdigit()) {
            let byte = u8::from_str_radix(tok, 16)
                .map_err(|e| CompileError(format!("bad hex literal `{tok}`: {e}")))?;
            self.push_literal_byte(byte);
            // 66/67/F0/F2/F3 are legacy prefix bytes, not opcode bytes —
            // a legacy map escape or further prefixes may still follow.
            if !matches!(byte, 0x66 | 0x67 | 0xf0 | 0xf2 | 0xf3) {
                self.prefix_ok = false;
            }
            return Ok(());
        }
        if tok == "/r" {
            self.flush_literal();
            let r = self.role(Role::ModrmReg)?;
            let m = self.role(Role::ModrmRm)?;
            self.out.push(MODRM_FULL_BASE + ((m as u8) << 3) + r as u8);
            return Ok(());
        }
        if let Some(ext) = tok.strip_prefix('/').and_then(|s| s.parse::<u8>().ok()) {
            if ext > 7 {
                return Err(CompileError(format!("opcode-extension digit out of range: /{ext}")));
            }
            self.flush_literal();
            let m = self.role(Role::ModrmRm)?;
            self.out.push(MODRM_RM_EXT_BASE + ((m as u8) << 3) + ext);
            return Ok(());
        }
        if tok == "+r" {
            self.flush_literal();
            let r = self.role(Role::ModrmReg)?;
            self.out.push(MODRM_REG_ONLY_BASE + r as u8);
            return Ok(());
        }
        if tok == "is4" {
            self.flush_literal();
            let s = self.role(Role::Is4)?;
            let i = self.role(Role::Immediate)?;
            self.out.push(IS4_EXPLICIT);
            self.out.push(((s as u8) << 4) | i as u8);
            return Ok(());
        }
        if let Some(rest) = tok.strip_prefix("is4c:") {
            self.flush_literal();
            let konst: u8 = rest
                .parse()
                .map_err(|_| CompileError(format!("bad is4 constant `{rest}`")))?;
            self.out.push(IS4_CONST);
            self.out.push(konst);
            return Ok(());
        }
        if tok == "is4imp" {
            self.flush_literal();
            let s = self.role(Role::Is4)?;
            self.out.push(IS4_IMPLICIT_BASE + (s as u8 & 3));
            return Ok(());
        }
        if let Some(code) = imm_code(tok) {
            self.flush_literal();
            let pos = self.role(Role::Immediate)?;
            self.out.push(code);
            self.out.push(pos as u8);
            return Ok(());
        }
        if tok.starts_with("vex") || tok.starts_with("xop") {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError("VEX/XOP prefix must precede opcode bytes".into()));
            }
            self.is_vex = tok.starts_with("vex");
            self.is_xop = tok.starts_with("xop");
            let has_v = position_of(&self.positions, Role::Vvvv, self.relax_mask).is_some();
            self.out.push(if has_v { VEX_XOP_PREFIX } else { NOV_VEX_PREFIX });
            return Ok(());
        }
        if tok.starts_with("evex") {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError("EVEX prefix must precede opcode bytes".into()));
            }
            self.is_evex = true;
            let has_v = position_of(&self.positions, Role::Vvvv, self.relax_mask).is_some();
            self.out.push(if has_v { EVEX_PREFIX } else { NOV_EVEX_PREFIX });
            if let Some(t) = self.tuple {
                self.out.push(tuple_code(t));
            }
            return Ok(());
        }
        if tok == "rex2" {
            self.flush_literal();
            self.out.push(REX2_PREFIX);
            return Ok(());
        }
        if let Some(code) = prefix_mandate_code(tok) {
            self.flush_literal();
            if !self.prefix_ok {
                return Err(CompileError(format!("prefix mandate `{tok}` after opcode bytes")));
            }
            self.out.push(code);
            return Ok(());
        }
        Err(CompileError(format!("unrecognized bytecode token `{tok}`")))
    }
}

/// EVEX tuple-type codes. Assigning them sequentially on first sight
/// within a single compile run would be inconsistent across separately
/// compiled patterns, so this fixes the common tuple names to stable
/// codes instead.
fn tuple_code(tuple: &str) -> u8 {
    match tuple {
        "fv" => 0,
        "hv" => 1,
        "fvm" => 2,
        "t1s" => 3,
        "t1f" => 4,
        "t2" => 5,
        "t4" => 6,
        "t8" => 7,
        "hvm" => 8,
        "qvm" => 9,
        "ovm" => 10,
        "m128" => 11,
        "dup" => 12,
        _ => 255,
    }
}

const PREFIX_MANDATE_NAMES: &[&str] = &[
    "o16", "o32", "o64", "a16", "a32", "a64", "rep", "repne", "lock", "wait", "hlexr", "hleb", "mustrep",
    "mustrepne",
];

fn prefix_mandate_code(name: &str) -> Option<u8> {
    PREFIX_MANDATE_NAMES.iter().position(|&n| n == name).map(|i| PREFIX_MANDATE_BASE + i as u8)
}

/// Compiles one `operands: tuple: opcodes` (or bare `opcodes`) DSL string.
pub fn compile_dsl(dsl: &str) -> Result<CompiledEncoding, CompileError> {
    let fields: Vec<&str> = dsl.splitn(3, ':').map(str::trim).collect();
    let (operands, tuple, opcode_str) = match fields.as_slice() {
        [ops, tup, rest] => (*ops, Some(*tup), *rest),
        [ops, rest] => (*ops, None, *rest),
        [rest] => ("", None, *rest),
        _ => unreachable!(),
    };

    let positions = role_positions(operands)?;
    let mut compiler = Compiler {
        positions,
        relax_mask: 0,
        tuple,
        out: Vec::new(),
        literal_run: Vec::new(),
        prefix_ok: true,
        legacy_map: 0,
        is_vex: false,
        is_xop: false,
        is_evex: false,
    };

    for tok in opcode_str.split_whitespace() {
        compiler.compile_token(tok)?;
    }
    compiler.flush_literal();
    compiler.out.push(TERMINATOR);

    if compiler.is_evex && compiler.legacy_map > 7 {
        return Err(CompileError("EVEX requires legacy map <= 7".into()));
    }
    if compiler.is_xop && compiler.legacy_map < 8 {
        return Err(CompileError("XOP requires legacy map >= 8".into()));
    }

    Ok(CompiledEncoding {
        bytes: compiler.out,
        legacy_map: compiler.legacy_map,
        is_vex: compiler.is_vex,
        is_xop: compiler.is_xop,
        is_evex: compiler.is_evex,
    })
}

/// Compiles with an explicit relax mask, for the relaxed-form patterns
/// the expander already shifted operand positions for.
pub fn compile_dsl_relaxed(dsl: &str, relax_mask: u32) -> Result<CompiledEncoding, CompileError> {
    let fields: Vec<&str> = dsl.splitn(3, ':').map(str::trim).collect();
    let (operands, tuple, opcode_str) = match fields.as_slice() {
        [ops, tup, rest] => (*ops, Some(*tup), *rest),
        [ops, rest] => (*ops, None, *rest),
        [rest] => ("", None, *rest),
        _ => unreachable!(),
    };
    let positions = role_positions(operands)?;
    let mut compiler = Compiler {
        positions,
        relax_mask,
        tuple,
        out: Vec::new(),
        literal_run: Vec::new(),
        prefix_ok: true,
        legacy_map: 0,
        is_vex: false,
        is_xop: false,
        is_evex: false,
    };
    for tok in opcode_str.split_whitespace() {
        compiler.compile_token(tok)?;
    }
    compiler.flush_literal();
    compiler.out.push(TERMINATOR);
    Ok(CompiledEncoding {
        bytes: compiler.out,
        legacy_map: compiler.legacy_map,
        is_vex: compiler.is_vex,
        is_xop: compiler.is_xop,
        is_evex: compiler.is_evex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_run_coalesces_up_to_four() {
        let c = compile_dsl("mr: 66 0f 7e").unwrap();
        // "66" and "7e" literal; "0f" is the map-escape token, not a plain
        // literal, so the run around it breaks in two.
        assert!(c.bytes.contains(&0x66));
        assert!(c.bytes.contains(&0x7e));
        assert_eq!(c.legacy_map, 1);
        assert_eq!(*c.bytes.last().unwrap(), 0);
    }

    #[test]
    fn modrm_full_references_operand_positions() {
        let c = compile_dsl("mr: 89 /r").unwrap();
        // m = position 0, r = position 1 for operand string "mr".
        let expected = MODRM_FULL_BASE + (0 << 3) + 1;
        assert!(c.bytes.contains(&expected));
    }

    #[test]
    fn opcode_extension_digit_encodes_constant() {
        let c = compile_dsl("m: f7 /0").unwrap();
        let expected = MODRM_RM_EXT_BASE + (0 << 3);
        assert!(c.bytes.contains(&expected));
    }

    #[test]
    fn immediate_variant_emits_code_and_position() {
        let c = compile_dsl("ri: b8 id").unwrap();
        let code = imm_code("id").unwrap();
        let pos = c.bytes.iter().position(|&b| b == code).unwrap();
        // operand string "ri": i is position 1.
        assert_eq!(c.bytes[pos + 1], 1);
    }

    #[test]
    fn evex_prefix_records_map_and_tuple() {
        let c = compile_dsl("rvm:fv: evex 0f38 f7 /r").unwrap();
        assert!(c.is_evex);
        assert_eq!(c.legacy_map, 2);
        assert!(c.bytes.contains(&EVEX_PREFIX));
    }

    #[test]
    fn relax_mask_shifts_trailing_positions() {
        // With "rm" (r at position 0, m at position 1), omitting a third
        // operand (bit 2 of the relax mask) doesn't move either of them —
        // only positions at or past the omitted slot shift.
        let c = compile_dsl_relaxed("rm: 01 /r", 0b100).unwrap();
        let expected = MODRM_FULL_BASE + (1 << 3);
        assert!(c.bytes.contains(&expected));
    }

    #[test]
    fn unknown_token_is_an_error() {
        let err = compile_dsl("r: bogus_token").unwrap_err();
        assert!(err.0.contains("bogus_token"));
    }
}

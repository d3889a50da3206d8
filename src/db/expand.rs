//! Pattern expansion: turns one raw database line into the set of concrete
//! patterns the bytecode compiler actually compiles — relaxed-form
//! (optional trailing operands) and conditional-form (`cc`/`scc` mnemonic
//! families) expansion.

use crate::db::reader::{EncodingSrc, RawInsnLine};

/// One operand slot as written in the database, suffix characters parsed
/// out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandSpec {
    pub text: String,
    /// `*` suffix: this operand may be omitted (relaxed form).
    pub optional: bool,
    /// `?` suffix: EVEX no-destination toggle.
    pub nd_marker: bool,
}

fn parse_operands(spec: &str) -> Vec<OperandSpec> {
    let trimmed = spec.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("void") {
        return Vec::new();
    }
    trimmed
        .split(',')
        .map(|raw| {
            let raw = raw.trim();
            let nd_marker = raw.ends_with('?');
            let raw = raw.strip_suffix('?').unwrap_or(raw);
            let optional = raw.ends_with('*');
            let raw = raw.strip_suffix('*').unwrap_or(raw);
            OperandSpec { text: raw.to_string(), optional, nd_marker }
        })
        .collect()
}

/// A fully expanded pattern, ready for the bytecode compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPattern {
    pub mnemonic: String,
    pub operands: Vec<OperandSpec>,
    /// Bit `i` set means the `i`-th originally-optional operand (in
    /// left-to-right order among `*`-marked operands) was omitted from
    /// this expansion.
    pub relax_mask: u32,
    /// `true` once `?` resolved present (`.nd1`); `false` for omitted
    /// (`.nd0`) or when the pattern has no such operand at all.
    pub nd: bool,
    pub encoding: EncodingSrc,
    pub flags: Vec<String>,
}

/// Expands one raw line's relaxed-form (`*`) and ND (`?`) operand markers
/// into the full cross product of derived patterns. Lines with a raw-byte
/// encoding are not relaxed-form eligible and pass through as a
/// single pattern unchanged.
pub fn expand_relaxed(line: &RawInsnLine) -> Vec<ExpandedPattern> {
    let operands = parse_operands(&line.operands);

    if matches!(line.encoding, EncodingSrc::RawBytes(_)) {
        return vec![ExpandedPattern {
            mnemonic: line.mnemonic.clone(),
            operands,
            relax_mask: 0,
            nd: false,
            encoding: line.encoding.clone(),
            flags: line.flags.clone(),
        }];
    }

    let optional_positions: Vec<usize> = operands
        .iter()
        .enumerate()
        .skip(1) // operand 0 is never relax-eligible
        .filter(|(_, o)| o.optional)
        .map(|(i, _)| i)
        .collect();

    let nd_position = operands.iter().position(|o| o.nd_marker);

    let mut out = Vec::new();
    let subset_count = 1u32 << optional_positions.len();
    for mask in 0..subset_count {
        let kept: Vec<OperandSpec> = operands
            .iter()
            .enumerate()
            .filter(|(i, _)| match optional_positions.iter().position(|p| p == i) {
                Some(bit) => mask & (1 << bit) == 0,
                None => true,
            })
            .map(|(_, o)| o.clone())
            .collect();

        let nd_variants: &[bool] = if nd_position.is_some() { &[false, true] } else { &[false] };
        for &nd in nd_variants {
            out.push(ExpandedPattern {
                mnemonic: line.mnemonic.clone(),
                operands: kept.clone(),
                relax_mask: mask,
                nd,
                encoding: tag_nd_encoding(&line.encoding, nd_position.is_some(), nd),
                flags: line.flags.clone(),
            });
        }
    }
    out
}

fn tag_nd_encoding(encoding: &EncodingSrc, has_nd: bool, nd: bool) -> EncodingSrc {
    if !has_nd {
        return encoding.clone();
    }
    match encoding {
        EncodingSrc::Dsl(s) => EncodingSrc::Dsl(format!("{s} .{}", if nd { "nd1" } else { "nd0" })),
        other => other.clone(),
    }
}

/// One condition-code table entry. 18 rows total: 12 usable by both
/// `cc` and `scc` forms, `p`/`pe`/`np`/`po` (parity) usable only by `cc`,
/// and `f`/`t` (always-false / always-true, not a real encodable nibble)
/// usable only by `scc`.
struct Condition {
    name: &'static str,
    /// Nibble substituted into `+c`/`scc` encodings; `None` for the two
    /// pseudo conditions that carry no real nibble.
    nibble: Option<u8>,
    cc_only: bool,
    scc_only: bool,
    /// An alias entry (`pe` aliasing `p`'s nibble) auto-sets the `ND`
    /// flag on its expansion.
    is_alias: bool,
}

const CONDITIONS: &[Condition] = &[
    Condition { name: "o", nibble: Some(0x0), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "no", nibble: Some(0x1), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "b", nibble: Some(0x2), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "ae", nibble: Some(0x3), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "e", nibble: Some(0x4), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "ne", nibble: Some(0x5), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "be", nibble: Some(0x6), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "a", nibble: Some(0x7), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "s", nibble: Some(0x8), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "ns", nibble: Some(0x9), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "l", nibble: Some(0xc), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "g", nibble: Some(0xf), cc_only: false, scc_only: false, is_alias: false },
    Condition { name: "p", nibble: Some(0xa), cc_only: true, scc_only: false, is_alias: false },
    Condition { name: "pe", nibble: Some(0xa), cc_only: true, scc_only: false, is_alias: true },
    Condition { name: "np", nibble: Some(0xb), cc_only: true, scc_only: false, is_alias: false },
    Condition { name: "po", nibble: Some(0xb), cc_only: true, scc_only: false, is_alias: true },
    Condition { name: "f", nibble: None, cc_only: false, scc_only: true, is_alias: false },
    Condition { name: "t", nibble: None, cc_only: false, scc_only: true, is_alias: false },
];

/// Expands a `cc`/`scc`-bearing mnemonic template into one pattern per
/// applicable condition code, substituting the mnemonic placeholder and
/// the encoding's `+c`/`scc` nibble. `template` must contain exactly one
/// occurrence of `cc` or `scc`.
pub fn expand_conditional(pattern: &ExpandedPattern) -> Vec<ExpandedPattern> {
    let (mnemonic_token, is_scc) = if pattern.mnemonic.contains("scc") {
        ("scc", true)
    } else if pattern.mnemonic.contains("cc") {
        ("cc", false)
    } else {
        return vec![pattern.clone()];
    };

    CONDITIONS
        .iter()
        .filter(|c| if is_scc { !c.cc_only } else { !c.scc_only })
        .map(|c| {
            let mnemonic = pattern.mnemonic.replacen(mnemonic_token, c.name, 1);
            let encoding = substitute_condition(&pattern.encoding, is_scc, c);
            let mut flags = pattern.flags.clone();
            if c.is_alias && !flags.iter().any(|f| f == "ND") {
                flags.push("ND".to_string());
            }
            ExpandedPattern { mnemonic, encoding, flags, ..pattern.clone() }
        })
        .collect()
}

/// `...XX+c...` (the `cc` form) adds the code value XOR XX; `....scc....`
/// (the `scc` form) substitutes the nibble directly in place of the token.
fn substitute_condition(encoding: &EncodingSrc, is_scc: bool, c: &Condition) -> EncodingSrc {
    let nibble = match c.nibble {
        Some(n) => n,
        None => return encoding.clone(),
    };
    match encoding {
        EncodingSrc::Dsl(s) => {
            let replaced = if is_scc {
                // Zero-padded to two hex digits so the result is a plain
                // literal-byte token (`compile_token` expects exactly two
                // hex digits), not a bare single-character one.
                s.replacen("scc", &format!("{nibble:02x}"), 1)
            } else if let Some(pos) = s.find("+c") {
                let mut out = s.clone();
                out.replace_range(pos..pos + 2, &format!("+{nibble:x}"));
                out
            } else {
                s.clone()
            };
            EncodingSrc::Dsl(replaced)
        }
        other => other.clone(),
    }
}

/// Runs both expansion passes over a raw database line.
pub fn expand_line(line: &RawInsnLine) -> Vec<ExpandedPattern> {
    expand_relaxed(line)
        .into_iter()
        .flat_map(|p| expand_conditional(&p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reader::parse_database;

    #[test]
    fn relaxed_form_produces_power_of_two_patterns() {
        let db = parse_database("add reg32,reg32,imm32* [rm: 01 /r] X64\n").unwrap();
        let expanded = expand_relaxed(&db[0]);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].operands.len(), 3);
        assert_eq!(expanded[1].operands.len(), 2);
        assert_eq!(expanded[1].relax_mask, 1);
    }

    #[test]
    fn two_optional_operands_yield_four_patterns() {
        let db = parse_database("foo reg32,imm32*,imm32* [rm: 00] X64\n").unwrap();
        let expanded = expand_relaxed(&db[0]);
        assert_eq!(expanded.len(), 4);
        let counts: Vec<usize> = expanded.iter().map(|p| p.operands.len()).collect();
        assert!(counts.contains(&3));
        assert!(counts.contains(&1));
    }

    #[test]
    fn conditional_cc_form_yields_16_patterns() {
        let db = parse_database("jcc imm32 [rel: 0f 80+c id] X64\n").unwrap();
        let expanded: Vec<_> = expand_relaxed(&db[0])
            .into_iter()
            .flat_map(|p| expand_conditional(&p))
            .collect();
        assert_eq!(expanded.len(), 16);
        assert!(expanded.iter().any(|p| p.mnemonic == "jo"));
        assert!(!expanded.iter().any(|p| p.mnemonic == "jf"));
    }

    #[test]
    fn conditional_scc_form_yields_14_patterns() {
        let db = parse_database("setscc void [m: 0f 90 scc /0] X64\n").unwrap();
        let expanded: Vec<_> = expand_relaxed(&db[0])
            .into_iter()
            .flat_map(|p| expand_conditional(&p))
            .collect();
        assert_eq!(expanded.len(), 14);
        assert!(expanded.iter().any(|p| p.mnemonic == "setf"));
        assert!(!expanded.iter().any(|p| p.mnemonic == "setpe"));
    }

    #[test]
    fn non_conditional_mnemonic_passes_through() {
        let db = parse_database("mov reg32,reg32 [mr: 89 /r] X64\n").unwrap();
        let expanded = expand_line(&db[0]);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].mnemonic, "mov");
    }
}

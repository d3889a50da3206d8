//! Expression evaluator stand-in: the real `evaluate()` (operator
//! precedence, forward references, critical expressions) is out of
//! scope; this is the minimal left-to-right accumulator a classic
//! assembler's jump-target and integer-literal handling generalize into,
//! extended with the richer term vocabulary a line parser's operands need.

use crate::regs::RegClass;
use crate::scan::Scanner;
use crate::token::TokenKind;

/// One term of an evaluated expression. The reference evaluator's output
/// is an array of `{type, value}` pairs terminated by a zero type; a
/// `Vec<ExprTerm>` is the direct Rust equivalent (its own length is the
/// terminator) and each variant's payload folds in the accompanying
/// value instead of keeping it as a separate field.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprTerm {
    /// A fully-resolved constant contribution to the offset.
    Simple(i64),
    /// A forward reference to a symbol not yet known (`EXPR_UNKNOWN`).
    Unknown,
    /// A register term with its effective coefficient (1 for a bare
    /// register, the scale factor when written `reg*N` or `N*reg`).
    Reg { class: RegClass, index: i32, coeff: i64 },
    /// `WRT` target.
    Wrt,
    /// `EXPR_SEGBASE + N`: a segment-base term with its coefficient (1 for
    /// `seg foo`, -1 for the self-relative `foo - $` form).
    SegBase { seg: i32, coeff: i64 },
    /// A rounding/SAE decorator appearing in operand position
    /// (`EXPR_RDSAE`), attaching to the *previous* operand. Carries the
    /// decorator's lowercased text (`sae`, `rn-sae`, `rz`, ...) so the
    /// caller can still tell rounding modes apart.
    Rdsae(String),
}

#[derive(Debug)]
pub struct EvalError(pub String);

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for EvalError {}

fn parse_numeric(text: &str) -> Result<i64, EvalError> {
    let lower = text.to_ascii_lowercase();
    let (digits, radix) = if let Some(d) = lower.strip_prefix("0x") {
        (d, 16)
    } else if let Some(d) = lower.strip_suffix('h') {
        (d, 16)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (d, 8)
    } else if let Some(d) = lower.strip_suffix('o').or_else(|| lower.strip_suffix('q')) {
        (d, 8)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (d, 2)
    } else if let Some(d) = lower.strip_suffix('b') {
        (d, 2)
    } else {
        (lower.as_str(), 10)
    };
    i64::from_str_radix(digits, radix)
        .map_err(|e| EvalError(format!("invalid numeric literal `{text}`: {e}")))
}

/// Tokens that stop expression scanning without being consumed — the
/// caller (line parser / extended-operand parser / memory resolver) is
/// responsible for interpreting them.
fn is_terminator(sc: &mut Scanner) -> bool {
    let t = sc.peek();
    matches!(
        t.kind,
        TokenKind::Eos
            | TokenKind::Opmask
            | TokenKind::Decorator
            | TokenKind::BrcConst
            // A mnemonic can never itself be part of an expression; seeing
            // one always means the expression (e.g. a TIMES count) ended.
            | TokenKind::Insn
    ) || t.is_punct(',')
        || t.is_punct(']')
        || t.is_punct(':')
        || t.is_punct(')')
        || (t.kind == TokenKind::Identifier && t.text.eq_ignore_ascii_case("dup"))
}

/// Evaluates a run of tokens into an expression-term vector. Stops (without
/// consuming) at the first terminator per [`is_terminator`].
pub fn evaluate(sc: &mut Scanner) -> Result<Vec<ExprTerm>, EvalError> {
    let mut terms = Vec::new();
    let mut sign: i64 = 1;

    loop {
        if is_terminator(sc) {
            // A standalone rounding/SAE decorator (`, {rz-sae}`) never
            // starts an expression of its own; it attaches to the previous
            // operand. Recognized only when nothing else has been
            // consumed yet — once mixed with real terms it's an ordinary
            // trailing decorator on this operand's own value instead.
            if terms.is_empty() && sc.peek().kind == TokenKind::Decorator && sc.peek().int_payload == 2 {
                let tok = sc.next();
                terms.push(ExprTerm::Rdsae(tok.text.to_ascii_lowercase()));
            }
            break;
        }
        let tok = sc.next();
        match tok.kind {
            TokenKind::Punct('+') => {
                sign = 1;
            }
            TokenKind::Punct('-') => {
                sign *= -1;
            }
            TokenKind::Punct('$') => {
                // Bare `$` denotes the current-location self-reference;
                // only meaningful in a subtraction context (`foo - $`),
                // which the caller recognizes by the `SegBase` coefficient.
                terms.push(ExprTerm::SegBase { seg: -1, coeff: sign });
                sign = 1;
            }
            TokenKind::Num => {
                let mut value = parse_numeric(&tok.text)? * sign;
                sign = 1;
                if sc.peek().is_punct('*') {
                    sc.next();
                    let next = sc.next();
                    if next.kind == TokenKind::Reg {
                        terms.push(ExprTerm::Reg {
                            class: class_from_tag(next.aux_payload),
                            index: next.int_payload as i32,
                            coeff: value,
                        });
                        continue;
                    } else if next.kind == TokenKind::Num {
                        value *= parse_numeric(&next.text)?;
                    } else {
                        return Err(EvalError("expected register or number after `*`".into()));
                    }
                }
                terms.push(ExprTerm::Simple(value));
            }
            TokenKind::Reg => {
                let mut coeff = sign;
                sign = 1;
                if sc.peek().is_punct('*') {
                    sc.next();
                    let next = sc.next();
                    if next.kind != TokenKind::Num {
                        return Err(EvalError("expected number after register `*`".into()));
                    }
                    coeff *= parse_numeric(&next.text)?;
                }
                terms.push(ExprTerm::Reg {
                    class: class_from_tag(tok.aux_payload),
                    index: tok.int_payload as i32,
                    coeff,
                });
            }
            TokenKind::Identifier if tok.text.eq_ignore_ascii_case("wrt") => {
                terms.push(ExprTerm::Wrt);
            }
            TokenKind::Identifier if tok.text.eq_ignore_ascii_case("seg") => {
                let next = sc.next();
                if next.kind != TokenKind::Identifier {
                    return Err(EvalError("`seg` must be followed by a label".into()));
                }
                terms.push(ExprTerm::SegBase { seg: 0, coeff: sign });
                sign = 1;
            }
            TokenKind::Identifier => {
                // Forward reference to a not-yet-defined symbol.
                terms.push(ExprTerm::Unknown);
            }
            TokenKind::MasmFlat => {
                // `FLAT:` — ignored at the expression level; the line
                // parser strips it before calling into memory resolution.
            }
            other => {
                return Err(EvalError(format!(
                    "unexpected token {other:?} (`{}`) in expression",
                    tok.text
                )));
            }
        }
    }

    Ok(terms)
}

fn class_from_tag(tag: i64) -> RegClass {
    match tag {
        0 => RegClass::Gpr,
        1 => RegClass::Segment,
        2 => RegClass::Xmm,
        3 => RegClass::Ymm,
        4 => RegClass::Zmm,
        5 => RegClass::Opmask,
        6 => RegClass::Rip,
        _ => RegClass::Gpr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;

    fn terms_of(src: &str) -> Vec<ExprTerm> {
        let mut sc = Scanner::from_line(src).unwrap();
        evaluate(&mut sc).unwrap()
    }

    #[test]
    fn simple_constant() {
        assert_eq!(terms_of("0x10"), vec![ExprTerm::Simple(0x10)]);
    }

    #[test]
    fn base_plus_scaled_index() {
        let terms = terms_of("ebx+4*ecx+0x10");
        assert_eq!(
            terms,
            vec![
                ExprTerm::Reg { class: RegClass::Gpr, index: 3, coeff: 1 },
                ExprTerm::Reg { class: RegClass::Gpr, index: 1, coeff: 4 },
                ExprTerm::Simple(0x10),
            ]
        );
    }

    #[test]
    fn negative_literal() {
        assert_eq!(terms_of("-45"), vec![ExprTerm::Simple(-45)]);
    }

    #[test]
    fn standalone_rounding_decorator() {
        assert_eq!(terms_of("{rz-sae}"), vec![ExprTerm::Rdsae("rz-sae".into())]);
        assert_eq!(terms_of("{sae}"), vec![ExprTerm::Rdsae("sae".into())]);
    }
}

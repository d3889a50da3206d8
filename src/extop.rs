//! Extended-operand parser for data-declaration directives (DB family,
//! `INCBIN`).

use crate::diag::{DiagSink, Diagnostic};
use crate::eval::{evaluate, ExprTerm};
use crate::scan::Scanner;
use crate::token::TokenKind;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtOpKind {
    Nothing,
    DbNumber {
        offset: i64,
        segment: i32,
        wrt: i32,
        relative: bool,
    },
    DbString(String),
    DbStringFree(String),
    /// Inline `elem`-byte encoded buffer.
    DbFloat(Vec<u8>),
    DbReserve,
    /// Nested sub-list (an `EXTOP`-typed element).
    ExtOp(Vec<ExtOpNode>),
}

/// One link of the extended-operand chain. Modeled as a plain struct
/// inside a `Vec<ExtOpNode>` rather than a hand-rolled linked list — see
/// `insn.rs`'s comment on `Instruction::extop` for why that still gets
/// "chain always terminates" / "freed exactly once" for free.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtOpNode {
    pub kind: ExtOpKind,
    pub dup: i64,
    pub elem: u32,
}

impl ExtOpNode {
    fn is_discardable(&self) -> bool {
        self.dup == 0 || matches!(self.kind, ExtOpKind::Nothing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtOpError(pub String);

impl std::fmt::Display for ExtOpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for ExtOpError {}

impl From<crate::eval::EvalError> for ExtOpError {
    fn from(e: crate::eval::EvalError) -> Self {
        ExtOpError(e.0)
    }
}

/// Encodes a floating-point constant into an `elem`-byte buffer, standing
/// in for the reference's `float_const` (the real operator-precedence
/// evaluator is out of scope, but this is needed here for the crate to be
/// runnable end to end).
fn encode_float(value: f64, elem: u32) -> Result<Vec<u8>, ExtOpError> {
    match elem {
        4 => Ok((value as f32).to_le_bytes().to_vec()),
        8 => Ok(value.to_le_bytes().to_vec()),
        10 => Ok(encode_f80(value)),
        _ => Err(ExtOpError(format!(
            "illegal floating-point constant size: {elem} bytes"
        ))),
    }
}

/// x87 80-bit extended precision: 1 sign bit + 15 exponent bits (bias
/// 16383) + an explicit 64-bit mantissa (no implicit leading 1, unlike
/// IEEE-754 single/double).
fn encode_f80(value: f64) -> Vec<u8> {
    if value == 0.0 {
        let mut bytes = vec![0u8; 10];
        if value.is_sign_negative() {
            bytes[9] = 0x80;
        }
        return bytes;
    }
    let bits = value.to_bits();
    let sign = (bits >> 63) & 1;
    let exp64 = ((bits >> 52) & 0x7ff) as i64;
    let frac64 = bits & 0xf_ffff_ffff_ffff;

    let (exp80, mantissa) = if exp64 == 0 {
        // Subnormal double: treat as zero-exponent field, mantissa shifted.
        (0i64, frac64 << 11)
    } else {
        (exp64 - 1023 + 16383, (1u64 << 63) | (frac64 << 11))
    };

    let mut out = Vec::with_capacity(10);
    out.extend_from_slice(&mantissa.to_le_bytes());
    let exp_field = ((sign << 15) | (exp80 as u64 & 0x7fff)) as u16;
    out.extend_from_slice(&exp_field.to_le_bytes());
    out
}

fn string_transform(func: &str, content: &str) -> Vec<u8> {
    match func.to_ascii_lowercase().as_str() {
        "__utf16__" | "__utf16le__" => content.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        "__utf16be__" => content.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        "__utf32__" | "__utf32le__" => content.chars().flat_map(|c| (c as u32).to_le_bytes()).collect(),
        _ => content.as_bytes().to_vec(),
    }
}

/// Converts a resolved expression-term vector into a `DB_NUMBER` node:
/// accumulate simple terms into `offset`, accept one `WRT` term, one
/// segment-base term with coefficient 1, and one `-$` self-relative
/// marker. Any register term makes the expression non-simple.
pub(crate) fn terms_to_number(terms: &[ExprTerm]) -> Result<ExtOpKind, ExtOpError> {
    let mut offset = 0i64;
    let mut segment = -1i32;
    let mut wrt = -1i32;
    let mut relative = false;

    for term in terms {
        match term {
            ExprTerm::Simple(v) => offset = offset.wrapping_add(*v),
            ExprTerm::Unknown => {
                // Left unresolved; the node stays a zero DB_NUMBER to be
                // patched once the symbol is known.
            }
            ExprTerm::Wrt => wrt = 0,
            ExprTerm::SegBase { seg, coeff } => {
                if *coeff == 1 {
                    if segment >= 0 {
                        return Err(ExtOpError("multiple base segments".into()));
                    }
                    segment = *seg;
                } else if *coeff == -1 {
                    relative = true;
                } else {
                    return Err(ExtOpError("invalid segment-base coefficient".into()));
                }
            }
            ExprTerm::Reg { .. } => {
                return Err(ExtOpError("register not representable in this expression".into()))
            }
            ExprTerm::Rdsae(_) => {
                return Err(ExtOpError("rounding decorator not valid here".into()))
            }
        }
    }

    Ok(ExtOpKind::DbNumber { offset, segment, wrt, relative })
}

/// Parses one comma-separated extended-operand list.
///
/// Matches the line parser's general recovery policy rather than
/// aborting the whole list on the first bad item — a malformed float
/// among otherwise-valid operands still yields the valid ones, with the
/// bad item reported and dropped.
pub fn parse_extop_list(sc: &mut Scanner, elem: u32, sink: &mut dyn DiagSink) -> Vec<ExtOpNode> {
    let mut nodes = Vec::new();

    loop {
        if sc.at_eos() {
            break;
        }
        match parse_one(sc, elem) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                sink.report(Diagnostic::non_fatal(e.0));
                skip_to_comma(sc);
            }
        }

        let t = sc.next();
        if t.is_eos() {
            break;
        } else if !t.is_punct(',') {
            sink.report(Diagnostic::non_fatal(format!(
                "expected `,` or end of line, found `{}`",
                t.text
            )));
            skip_to_comma(sc);
            if sc.at_eos() {
                break;
            }
        }
    }

    nodes.retain(|n| !n.is_discardable());
    coalesce_reserves(nodes)
}

fn skip_to_comma(sc: &mut Scanner) {
    loop {
        let t = sc.peek();
        if t.is_eos() || t.is_punct(',') {
            break;
        }
        sc.next();
    }
}

fn coalesce_reserves(nodes: Vec<ExtOpNode>) -> Vec<ExtOpNode> {
    let mut out: Vec<ExtOpNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (ExtOpKind::DbReserve, Some(prev)) = (&node.kind, out.last_mut()) {
            if matches!(prev.kind, ExtOpKind::DbReserve) && prev.elem == node.elem {
                prev.dup += node.dup;
                continue;
            }
        }
        out.push(node);
    }
    out
}

fn parse_one(sc: &mut Scanner, elem: u32) -> Result<ExtOpNode, ExtOpError> {
    let t = sc.peek();

    if t.kind == TokenKind::Qmark {
        sc.next();
        return Ok(ExtOpNode { kind: ExtOpKind::DbReserve, dup: 1, elem });
    }

    if t.is_punct('%') || t.kind == TokenKind::Size {
        return parse_nested(sc, elem);
    }

    if t.kind == TokenKind::Str {
        sc.next();
        let next = sc.peek();
        if next.is_punct(',') || next.is_eos() {
            return Ok(ExtOpNode { kind: ExtOpKind::DbString(t.text), dup: 1, elem });
        }
        // Fall through: a string immediately followed by more expression
        // tokens is not valid in this simplified surrogate evaluator.
        return Err(ExtOpError("unexpected tokens after string literal".into()));
    }

    if t.kind == TokenKind::StrFunc {
        sc.next();
        if !sc.next().is_punct('(') {
            return Err(ExtOpError(format!("expected `(` after `{}`", t.text)));
        }
        let arg = sc.next();
        if arg.kind != TokenKind::Str {
            return Err(ExtOpError("string-transform functions take a string argument".into()));
        }
        if !sc.next().is_punct(')') {
            return Err(ExtOpError("expected `)`".into()));
        }
        let bytes = string_transform(&t.text, &arg.text);
        return Ok(ExtOpNode {
            kind: ExtOpKind::DbStringFree(String::from_utf8_lossy(&bytes).into_owned()),
            dup: 1,
            elem,
        });
    }

    if t.kind == TokenKind::Float
        || ((t.is_punct('+') || t.is_punct('-')) && is_float_ahead(sc))
    {
        let mut sign = 1.0f64;
        if t.is_punct('+') || t.is_punct('-') {
            sign = if t.is_punct('-') { -1.0 } else { 1.0 };
            sc.next();
        }
        let f = sc.next();
        let value: f64 = f
            .text
            .parse()
            .map_err(|_| ExtOpError(format!("invalid float literal `{}`", f.text)))?;
        let bytes = encode_float(value * sign, elem)?;
        return Ok(ExtOpNode { kind: ExtOpKind::DbFloat(bytes), dup: 1, elem });
    }

    // DUP form: `<expr> DUP (<children>)`.
    let mark = sc.get();
    let mut lookahead_terms_end = mark;
    let mut dup_found = false;
    {
        // Cheap lookahead: scan tokens up to the next top-level `(` or
        // terminator, checking the FOLLOWED_BY_DUP flag set during
        // tokenization.
        loop {
            let peeked = sc.peek();
            if peeked.is_eos() || peeked.is_punct(',') {
                break;
            }
            let consumed = sc.next();
            lookahead_terms_end = sc.get();
            if consumed.followed_by_dup() {
                dup_found = true;
                break;
            }
        }
    }
    sc.set(mark);

    if dup_found {
        let terms = evaluate(sc)?;
        let dup_kind = terms_to_number(&terms)?;
        let dup = match dup_kind {
            ExtOpKind::DbNumber { offset, .. } if offset >= 0 => offset,
            _ => return Err(ExtOpError("DUP count must be a simple, non-negative value".into())),
        };
        let _ = lookahead_terms_end;
        let dup_kw = sc.next();
        if !dup_kw.text.eq_ignore_ascii_case("dup") {
            return Err(ExtOpError("expected `DUP`".into()));
        }
        if !sc.next().is_punct('(') {
            return Err(ExtOpError("expected `(` after `DUP`".into()));
        }
        let children = parse_extop_list_until_close(sc, elem)?;
        return Ok(ExtOpNode { kind: ExtOpKind::ExtOp(children), dup, elem });
    }

    let terms = evaluate(sc)?;
    Ok(ExtOpNode { kind: terms_to_number(&terms)?, dup: 1, elem })
}

fn is_float_ahead(sc: &mut Scanner) -> bool {
    let mark = sc.get();
    sc.next();
    let is_float = sc.peek().kind == TokenKind::Float;
    sc.set(mark);
    is_float
}

fn parse_nested(sc: &mut Scanner, inherited_elem: u32) -> Result<ExtOpNode, ExtOpError> {
    let elem = if sc.peek().kind == TokenKind::Size {
        let size_tok = sc.next();
        (size_tok.int_payload / 8) as u32
    } else {
        sc.next(); // consume `%`
        inherited_elem
    };
    if !sc.next().is_punct('(') {
        return Err(ExtOpError("expected `(` to start nested extended-operand list".into()));
    }
    let mut children = parse_extop_list_until_close(sc, elem)?;

    // A single-element nested list flattens into the parent, preserving
    // `dup` multiplication and the inherited element size.
    if children.len() == 1 {
        let mut only = children.remove(0);
        only.elem = elem;
        return Ok(only);
    }
    Ok(ExtOpNode { kind: ExtOpKind::ExtOp(children), dup: 1, elem })
}

fn parse_extop_list_until_close(sc: &mut Scanner, elem: u32) -> Result<Vec<ExtOpNode>, ExtOpError> {
    let mut nodes = Vec::new();
    loop {
        if sc.peek().is_punct(')') {
            sc.next();
            break;
        }
        let node = parse_one(sc, elem)?;
        nodes.push(node);
        let t = sc.next();
        if t.is_punct(')') {
            break;
        } else if !t.is_punct(',') {
            return Err(ExtOpError(format!("expected `,` or `)`, found `{}`", t.text)));
        }
    }
    nodes.retain(|n| !n.is_discardable());
    Ok(coalesce_reserves(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingSink;

    fn parse(src: &str, elem: u32) -> Vec<ExtOpNode> {
        let mut sc = Scanner::from_line(src).unwrap();
        let mut sink = CollectingSink::default();
        parse_extop_list(&mut sc, elem, &mut sink)
    }

    #[test]
    fn reserve_and_string() {
        let nodes = parse("?, 'abc'", 1);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, ExtOpKind::DbReserve);
        assert_eq!(nodes[1].kind, ExtOpKind::DbString("abc".into()));
    }

    #[test]
    fn float_rejected_at_elem_one() {
        let mut sc = Scanner::from_line("1.5").unwrap();
        let mut sink = CollectingSink::default();
        let nodes = parse_extop_list(&mut sc, 1, &mut sink);
        assert!(nodes.is_empty());
        assert!(sink.diagnostics.iter().any(|d| d.message.contains("floating-point")));
    }

    #[test]
    fn times_3_reserve_string_float_recovers() {
        // A `times 3 ... db ?, 'abc', 1.5` line: a bad float among valid
        // items still yields the valid reserve + string nodes.
        let mut sc = Scanner::from_line("?, 'abc', 1.5").unwrap();
        let mut sink = CollectingSink::default();
        let nodes = parse_extop_list(&mut sc, 1, &mut sink);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, ExtOpKind::DbReserve);
        assert_eq!(nodes[1].kind, ExtOpKind::DbString("abc".into()));
        assert!(sink.has_errors());
    }

    #[test]
    fn coalesces_adjacent_reserves() {
        let nodes = parse("?, ?, ?", 1);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].dup, 3);
    }

    #[test]
    fn dup_expands_children() {
        let nodes = parse("3 dup (1, 2)", 1);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].dup, 3);
        match &nodes[0].kind {
            ExtOpKind::ExtOp(children) => assert_eq!(children.len(), 2),
            other => panic!("expected ExtOp, got {other:?}"),
        }
    }
}

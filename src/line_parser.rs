//! Line parser: a state machine turning one pre-processed source line
//! into an [`Instruction`] record. This is the biggest single module in
//! the crate — it is the piece that ties the scanner, evaluator,
//! extended-operand parser and memory-reference resolver together the
//! way a real `parse_line` would.
//!
//! Errors are reported through a [`DiagSink`] rather than being fatal:
//! per-operand failures are skipped to the next comma and parsing
//! continues, a best-effort recovery contract. Only a tokenizing failure
//! on the whole line is unrecoverable.

use crate::diag::{DiagSink, Diagnostic};
use crate::eval::{self, ExprTerm};
use crate::extop::{self, ExtOpKind, ExtOpNode};
use crate::insn::{Instruction, Opcode, PrefixSet, MAX_OPERANDS};
use crate::memref;
use crate::operand::{DecoFlags, Eaf, OpFlag, OpType, Operand, RoundingMode};
use crate::regs::{self, RegClass};
use crate::scan::Scanner;
use crate::token::{Token, TokenKind};

/// Ambient state the line parser needs but does not own: the current
/// addressing mode, the segment a bare label would be defined in, and
/// whether RIP-relative addressing is the default for memory operands with
/// no registers at all (NASM's `-gr`/default-rel).
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    pub bits: u32,
    pub current_segment: i32,
    pub global_rel: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions { bits: 32, current_segment: 0, global_rel: false }
    }
}

/// Parses one source line into an [`Instruction`]. On a fatal failure
/// (tokenizing error, or an evaluator failure on an operand expression)
/// the returned record has `opcode == Opcode::None`.
pub fn parse_line(line: &str, opts: &ParseOptions, sink: &mut dyn DiagSink) -> Instruction {
    let mut sc = match Scanner::from_line(line) {
        Ok(sc) => sc,
        Err(e) => {
            sink.report(Diagnostic::non_fatal(format!("tokenizing error: {e}")));
            return Instruction::reset();
        }
    };
    parse_tokens(&mut sc, opts, sink)
}

fn parse_tokens(sc: &mut Scanner, opts: &ParseOptions, sink: &mut dyn DiagSink) -> Instruction {
    let mut instr = Instruction::reset();

    parse_label(sc, &mut instr, sink);
    parse_prefixes(sc, &mut instr, sink);

    let mnemonic = match parse_opcode(sc, &mut instr, sink) {
        Some(tok) => tok,
        None => return instr,
    };

    if instr.opcode.is_db_family() || instr.opcode.is_incbin() {
        parse_data_operands(sc, &mut instr, sink);
        return instr;
    }

    // Re-entry: if a colon immediately follows what was taken for the
    // mnemonic, that token was actually a label and the whole line is
    // re-parsed with that knowledge.
    if sc.peek().is_punct(':') {
        sc.next();
        instr = Instruction::reset();
        instr.label = Some(mnemonic.text);
        parse_prefixes(sc, &mut instr, sink);
        if parse_opcode(sc, &mut instr, sink).is_none() {
            return instr;
        }
        if instr.opcode.is_db_family() || instr.opcode.is_incbin() {
            parse_data_operands(sc, &mut instr, sink);
            return instr;
        }
    }

    parse_standard_operands(sc, &mut instr, opts, sink);
    instr
}

fn parse_label(sc: &mut Scanner, instr: &mut Instruction, sink: &mut dyn DiagSink) {
    let first = sc.peek();
    if first.kind != TokenKind::Identifier {
        return;
    }
    sc.next();
    if sc.peek().is_punct(':') {
        sc.next();
        instr.label = Some(first.text);
    } else if sc.at_eos() {
        sink.report(Diagnostic::warning(format!(
            "label `{}` alone on a line without a trailing colon",
            first.text
        )));
        instr.label = Some(first.text);
    } else {
        sc.pushback(first);
    }
}

fn parse_prefixes(sc: &mut Scanner, instr: &mut Instruction, sink: &mut dyn DiagSink) {
    loop {
        let t = sc.peek();
        match t.kind {
            TokenKind::Times => {
                sc.next();
                apply_times(sc, instr, sink);
            }
            TokenKind::Prefix => {
                sc.next();
                apply_prefix(&mut instr.prefixes, &t.text, sink);
            }
            TokenKind::Reg if t.aux_payload == 1 => {
                sc.next();
                apply_segment_prefix(&mut instr.prefixes, &t.text, sink);
            }
            _ => break,
        }
    }
}

fn apply_times(sc: &mut Scanner, instr: &mut Instruction, sink: &mut dyn DiagSink) {
    match eval::evaluate(sc) {
        Ok(terms) => match simple_value(&terms) {
            Some(v) if v < 0 => {
                instr.times = 0;
                sink.report(Diagnostic::non_fatal("TIMES count is negative"));
            }
            Some(v) => instr.times = v,
            None => sink.report(Diagnostic::non_fatal("TIMES requires a simple constant expression")),
        },
        Err(e) => sink.report(Diagnostic::non_fatal(e.to_string())),
    }
}

fn simple_value(terms: &[ExprTerm]) -> Option<i64> {
    match terms {
        [ExprTerm::Simple(v)] => Some(*v),
        _ => None,
    }
}

fn apply_prefix(prefixes: &mut PrefixSet, text: &str, sink: &mut dyn DiagSink) {
    let lower = text.to_ascii_lowercase();
    let slot: &mut Option<String> = match lower.as_str() {
        "lock" | "rep" | "repe" | "repz" | "repne" | "repnz" | "xacquire" | "xrelease" | "bnd" => {
            &mut prefixes.lock_rep
        }
        "o16" | "o32" | "o64" => &mut prefixes.operand_size,
        "a16" | "a32" | "a64" => &mut prefixes.address_size,
        "wait" => &mut prefixes.wait,
        "rex" => &mut prefixes.rex,
        _ => &mut prefixes.lock_rep,
    };
    match slot {
        Some(existing) if *existing == lower => {
            sink.report(Diagnostic::warning(format!("redundant prefix `{lower}`")));
        }
        Some(existing) => {
            sink.report(Diagnostic::non_fatal(format!(
                "conflicting prefixes `{existing}` and `{lower}`"
            )));
        }
        None => *slot = Some(lower),
    }
}

fn apply_segment_prefix(prefixes: &mut PrefixSet, text: &str, sink: &mut dyn DiagSink) {
    let lower = text.to_ascii_lowercase();
    match &prefixes.segment {
        Some(existing) if *existing == lower => {
            sink.report(Diagnostic::warning(format!("redundant segment prefix `{lower}`")));
        }
        Some(existing) => {
            sink.report(Diagnostic::non_fatal(format!(
                "conflicting segment prefixes `{existing}` and `{lower}`"
            )));
        }
        None => prefixes.segment = Some(lower),
    }
}

fn prefixes_present(p: &PrefixSet) -> bool {
    p.lock_rep.is_some()
        || p.segment.is_some()
        || p.operand_size.is_some()
        || p.address_size.is_some()
        || p.vex_class.is_some()
        || p.wait.is_some()
        || p.rex.is_some()
}

fn parse_opcode(sc: &mut Scanner, instr: &mut Instruction, sink: &mut dyn DiagSink) -> Option<Token> {
    let t = sc.peek();
    if t.kind != TokenKind::Insn {
        if sc.at_eos() {
            if prefixes_present(&instr.prefixes) {
                // Prefix-only line: synthesize RESB 0, treating this as
                // a valid prefix-only line.
                instr.opcode = Opcode::Resb;
                instr.extop = vec![ExtOpNode { kind: ExtOpKind::DbReserve, dup: 0, elem: 1 }];
            } else {
                instr.opcode = Opcode::None;
            }
        } else {
            sink.report(Diagnostic::non_fatal(format!(
                "parser: instruction expected, found `{}`",
                t.text
            )));
            instr.opcode = Opcode::None;
        }
        return None;
    }
    sc.next();
    instr.opcode = Opcode::from_mnemonic(&t.text);
    Some(t)
}

fn parse_data_operands(sc: &mut Scanner, instr: &mut Instruction, sink: &mut dyn DiagSink) {
    let elem = instr.opcode.elem_size().unwrap_or(1);
    let nodes = extop::parse_extop_list(sc, elem, sink);
    if nodes.is_empty() {
        sink.report(Diagnostic::warning("empty operand list in data declaration"));
    }
    if instr.opcode.is_incbin() {
        validate_incbin(&nodes, sink);
    }
    instr.extop = nodes;
}

fn validate_incbin(nodes: &[ExtOpNode], sink: &mut dyn DiagSink) {
    match nodes.first() {
        Some(n) if matches!(n.kind, ExtOpKind::DbString(_) | ExtOpKind::DbStringFree(_)) => {}
        _ => sink.report(Diagnostic::non_fatal("INCBIN requires a filename string operand")),
    }
    if nodes.len() > 3 {
        sink.report(Diagnostic::non_fatal(
            "INCBIN takes at most a filename and two numeric operands",
        ));
    }
    for n in nodes.iter().skip(1) {
        if !matches!(n.kind, ExtOpKind::DbNumber { .. }) {
            sink.report(Diagnostic::non_fatal("INCBIN's offset/length operands must be numeric"));
        }
    }
}

enum OperandOutcome {
    Parsed,
    AttachedToPrevious,
}

fn parse_standard_operands(
    sc: &mut Scanner,
    instr: &mut Instruction,
    opts: &ParseOptions,
    sink: &mut dyn DiagSink,
) {
    let mut opnum = 0usize;

    loop {
        if sc.at_eos() {
            break;
        }
        if opnum >= MAX_OPERANDS {
            sink.report(Diagnostic::non_fatal("too many operands"));
            recover_to_comma(sc);
            if sc.at_eos() {
                break;
            }
            sc.next();
            continue;
        }

        if opnum == 0 {
            while sc.peek().kind == TokenKind::Decorator && sc.peek().int_payload == 3 {
                let tok = sc.next();
                instr.prefixes.vex_class = Some(tok.text.to_ascii_lowercase());
            }
        }

        match parse_one_operand(sc, instr, opnum, opts, sink) {
            Ok(OperandOutcome::Parsed) => opnum += 1,
            Ok(OperandOutcome::AttachedToPrevious) => {}
            Err(()) => {
                recover_to_comma(sc);
                opnum += 1;
            }
        }

        let t = sc.peek();
        if t.is_punct(',') {
            sc.next();
        } else if sc.at_eos() {
            break;
        } else {
            sink.report(Diagnostic::non_fatal(format!(
                "expected `,` or end of line, found `{}`",
                t.text
            )));
            recover_to_comma(sc);
            if sc.at_eos() {
                break;
            }
            sc.next();
        }
    }
}

fn recover_to_comma(sc: &mut Scanner) {
    loop {
        let t = sc.peek();
        if t.is_eos() || t.is_punct(',') {
            break;
        }
        sc.next();
    }
}

fn parse_one_operand(
    sc: &mut Scanner,
    instr: &mut Instruction,
    opnum: usize,
    opts: &ParseOptions,
    sink: &mut dyn DiagSink,
) -> Result<OperandOutcome, ()> {
    let mut op = Operand::default();

    // A naked braced-constant immediate terminates the operand without
    // a comma.
    if sc.peek().kind == TokenKind::BrcConst {
        let tok = sc.next();
        op.optype |= OpType::IMMEDIATE;
        op.offset = tok.int_payload;
        finish_operand(sc, instr, opnum, op, sink);
        return Ok(OperandOutcome::Parsed);
    }

    absorb_size_specifiers(sc, &mut op);

    if sc.peek().is_punct('[') || sc.peek().is_punct('&') {
        sc.next();
        parse_memory_body(sc, &mut op, opts, sink)?;
        finish_operand(sc, instr, opnum, op, sink);
        return Ok(OperandOutcome::Parsed);
    }

    let terms = eval::evaluate(sc).map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;

    if let [ExprTerm::Rdsae(text)] = terms.as_slice() {
        let mut brerop = false;
        if let Some(prev) = instr.operands.last_mut() {
            prev.decoflags |= DecoFlags::SAE;
            if let Some(mode) = rounding_mode_from_text(text) {
                prev.rounding = Some(mode);
                prev.decoflags |= DecoFlags::ER;
            }
            brerop = true;
        }
        if brerop {
            if instr.evex_brerop >= 0 {
                sink.report(Diagnostic::non_fatal(
                    "at most one operand may carry broadcast, SAE or embedded rounding",
                ));
            } else {
                instr.evex_brerop = opnum as i32 - 1;
            }
        }
        return Ok(OperandOutcome::AttachedToPrevious);
    }

    if sc.peek().is_punct('[') {
        // `disp[regs]` form: the value evaluated so far is the base of a
        // memory reference whose bracket is only now opening.
        memref::resolve(&mut op, &terms, opts.current_segment)
            .map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
        sc.next();
        parse_memory_body_continue(sc, &mut op, opts, sink)?;
        finish_operand(sc, instr, opnum, op, sink);
        return Ok(OperandOutcome::Parsed);
    }

    if sc.peek().is_punct(':') {
        sc.next();
        apply_segment_override(&terms, &mut op, sink)?;
        if sc.peek().is_punct('[') {
            sc.next();
            parse_memory_body_continue(sc, &mut op, opts, sink)?;
        } else {
            tag_memory_optype(&mut op, opts, false);
        }
        finish_operand(sc, instr, opnum, op, sink);
        return Ok(OperandOutcome::Parsed);
    }

    classify_nonmemory(sc, &mut op, terms, sink)?;
    finish_operand(sc, instr, opnum, op, sink);
    Ok(OperandOutcome::Parsed)
}

fn finish_operand(
    sc: &mut Scanner,
    instr: &mut Instruction,
    opnum: usize,
    mut op: Operand,
    sink: &mut dyn DiagSink,
) {
    let brerop = absorb_decorators(sc, &mut op);
    if brerop {
        if instr.evex_brerop >= 0 {
            sink.report(Diagnostic::non_fatal(
                "at most one operand may carry broadcast, SAE or embedded rounding",
            ));
        } else {
            instr.evex_brerop = opnum as i32;
        }
    }
    instr.operands.push(op);
}

fn absorb_size_specifiers(sc: &mut Scanner, op: &mut Operand) {
    loop {
        let t = sc.peek();
        match t.kind {
            TokenKind::Size => {
                sc.next();
                absorb_size_token(op, t.int_payload as u32);
            }
            TokenKind::Special => {
                sc.next();
                op.optype |= special_opflag(t.int_payload);
            }
            TokenKind::MasmPtr => {
                sc.next();
            }
            _ => break,
        }
    }
}

fn absorb_size_token(op: &mut Operand, bits: u32) {
    // Only the first explicit size wins; later size tokens are silently
    // ignored.
    if !op.optype.has_explicit_size() {
        if let Some(flag) = OpType::from_size_bits(bits) {
            op.optype |= flag;
        }
    }
}

fn special_opflag(id: i64) -> OpType {
    match id {
        0 => OpType::TO,
        1 => OpType::STRICT,
        2 => OpType::FAR,
        3 => OpType::NEAR,
        4 => OpType::SHORT,
        _ => OpType::empty(),
    }
}

/// Parses the body of a memory reference whose opening `[` has just been
/// consumed. Absorbs further size overrides, `FLAT:`/`REL`/`ABS` keywords
/// and (syntactically, without separate semantics) nested `[`, evaluates
/// the address expression(s), and resolves them via [`memref::resolve`].
fn parse_memory_body(
    sc: &mut Scanner,
    op: &mut Operand,
    opts: &ParseOptions,
    sink: &mut dyn DiagSink,
) -> Result<(), ()> {
    let mut rel = false;
    let mut depth = 1u32;

    loop {
        let t = sc.peek();
        if t.kind == TokenKind::Size {
            sc.next();
            absorb_size_token(op, t.int_payload as u32);
            continue;
        }
        if t.kind == TokenKind::MasmFlat {
            sc.next();
            if !sc.next().is_punct(':') {
                sink.report(Diagnostic::non_fatal("expected `:` after `FLAT`"));
                return Err(());
            }
            continue;
        }
        if t.kind == TokenKind::Identifier && t.text.eq_ignore_ascii_case("rel") {
            sc.next();
            rel = true;
            continue;
        }
        if t.kind == TokenKind::Identifier && t.text.eq_ignore_ascii_case("abs") {
            sc.next();
            rel = false;
            continue;
        }
        if t.is_punct('[') {
            sc.next();
            depth += 1;
            continue;
        }
        break;
    }

    let terms1 = eval::evaluate(sc).map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;

    if sc.peek().is_punct(',') {
        sc.next();
        let terms2 = eval::evaluate(sc).map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
        memref::resolve(op, &terms1, opts.current_segment)
            .map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
        let mut op2 = Operand::default();
        memref::resolve(&mut op2, &terms2, opts.current_segment)
            .map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
        memref::combine_mib(op, &op2).map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
    } else {
        memref::resolve(op, &terms1, opts.current_segment)
            .map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
    }

    for _ in 0..depth {
        if !sc.next().is_punct(']') {
            sink.report(Diagnostic::non_fatal("missing `]`"));
            return Err(());
        }
    }

    tag_memory_optype(op, opts, rel);
    Ok(())
}

/// Like [`parse_memory_body`], but `op` already carries the `disp` part of
/// a `disp[regs]` expression resolved before the bracket opened; the
/// bracket's own contents are merged in by evaluating and resolving again.
fn parse_memory_body_continue(
    sc: &mut Scanner,
    op: &mut Operand,
    opts: &ParseOptions,
    sink: &mut dyn DiagSink,
) -> Result<(), ()> {
    let mut rel = false;
    let mut depth = 1u32;

    loop {
        let t = sc.peek();
        if t.kind == TokenKind::Size {
            sc.next();
            absorb_size_token(op, t.int_payload as u32);
            continue;
        }
        if t.is_punct('[') {
            sc.next();
            depth += 1;
            continue;
        }
        break;
    }

    let terms = eval::evaluate(sc).map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;
    memref::resolve(op, &terms, opts.current_segment)
        .map_err(|e| sink.report(Diagnostic::non_fatal(e.to_string())))?;

    for _ in 0..depth {
        if !sc.next().is_punct(']') {
            sink.report(Diagnostic::non_fatal("missing `]`"));
            return Err(());
        }
    }

    tag_memory_optype(op, opts, rel);
    Ok(())
}

fn tag_memory_optype(op: &mut Operand, opts: &ParseOptions, rel: bool) {
    op.optype |= OpType::MEMORY_ANY;
    if op.basereg < 0 && op.indexreg < 0 {
        if rel || (opts.bits == 64 && opts.global_rel) {
            op.optype |= OpType::IP_REL;
            op.opflags |= OpFlag::RELATIVE;
        } else {
            op.optype |= OpType::MEM_OFFS;
        }
    }
}

/// `SEG:expr`: the value evaluated before the colon must be exactly one
/// segment register with coefficient 1.
fn apply_segment_override(terms: &[ExprTerm], op: &mut Operand, sink: &mut dyn DiagSink) -> Result<(), ()> {
    match terms {
        [ExprTerm::Reg { class: RegClass::Segment, index, coeff }] if *coeff == 1 => {
            op.segment = *index;
            if *index == 4 || *index == 5 {
                // fs=4, gs=5 in regs.rs's segment table ordering.
                op.eaflags |= Eaf::FSGS;
            }
            Ok(())
        }
        _ => {
            sink.report(Diagnostic::non_fatal("segment override must be a single segment register"));
            Err(())
        }
    }
}

fn classify_nonmemory(
    sc: &mut Scanner,
    op: &mut Operand,
    terms: Vec<ExprTerm>,
    sink: &mut dyn DiagSink,
) -> Result<(), ()> {
    if let [ExprTerm::Reg { class, index, coeff }] = terms.as_slice() {
        if *coeff != 1 {
            sink.report(Diagnostic::non_fatal("register operand must have coefficient 1"));
            return Err(());
        }
        op.optype |= OpType::REGISTER;
        op.basereg = *index;
        apply_register_size(op, *class, *index, sink);

        if sc.peek().is_punct('+') {
            sc.next();
            let n = sc.next();
            match n.kind {
                TokenKind::Num => match n.text.parse::<u32>() {
                    Ok(v) if v > 0 && v.is_power_of_two() => op.regset_size = v,
                    _ => sink.report(Diagnostic::non_fatal("register-set size must be a power of two")),
                },
                _ => sink.report(Diagnostic::non_fatal(
                    "expected a number after `+` in register-set operand",
                )),
            }
        }
        return Ok(());
    }

    if let [ExprTerm::Unknown] = terms.as_slice() {
        op.opflags |= OpFlag::UNKNOWN;
        op.optype |= OpType::IMMEDIATE;
        if !op.optype.contains(OpType::STRICT) {
            op.optype |=
                OpType::UNITY | OpType::SBYTEWORD | OpType::SBYTEDWORD | OpType::UDWORD | OpType::SDWORD;
        }
        return Ok(());
    }

    let kind = extop::terms_to_number(&terms).map_err(|e| sink.report(Diagnostic::non_fatal(e.0)))?;
    if let ExtOpKind::DbNumber { offset, segment, wrt, relative } = kind {
        op.optype |= OpType::IMMEDIATE;
        op.offset = offset;
        op.segment = segment;
        op.wrt = wrt;
        if relative {
            op.opflags |= OpFlag::RELATIVE;
        }
        if segment < 0 && wrt < 0 && !relative {
            apply_imm_flags(op);
        }
    }
    Ok(())
}

/// Compact-encoding bits for a simple relocatable immediate.
fn apply_imm_flags(op: &mut Operand) {
    let v = op.offset;
    if v == 1 {
        op.optype |= OpType::UNITY;
    }
    if (i8::MIN as i64..=i8::MAX as i64).contains(&v) {
        op.optype |= OpType::SBYTEWORD | OpType::SBYTEDWORD;
    }
    if (i32::MIN as i64..=i32::MAX as i64).contains(&v) {
        op.optype |= OpType::SDWORD;
    }
    if (0..=u32::MAX as i64).contains(&v) {
        op.optype |= OpType::UDWORD;
    }
}

fn apply_register_size(op: &mut Operand, class: RegClass, index: i32, sink: &mut dyn DiagSink) {
    let reg_bits = regs::size_of(class, index).unwrap_or(0);
    if op.optype.has_explicit_size() {
        if reg_bits != 0 {
            if let Some(explicit) = op.optype.size_bits() {
                if explicit != reg_bits {
                    sink.report(Diagnostic::warning(
                        "REGSIZE: explicit size specifier does not match register size",
                    ));
                }
            }
        }
        // Size-polymorphic registers (opmask k0..k7, reg_bits == 0)
        // tolerate any explicit size.
    } else if let Some(flag) = OpType::from_size_bits(reg_bits) {
        op.optype |= flag;
    }
}

/// Decorators (`{k1}`, `{z}`, `{1toN}`, `{sae}`, `{rn-sae}`, ...) following
/// an operand's value. Returns whether a broadcast/SAE/ER decorator was
/// seen, so the caller can record `evex_brerop`.
fn absorb_decorators(sc: &mut Scanner, op: &mut Operand) -> bool {
    let mut brerop = false;
    loop {
        let t = sc.peek();
        match t.kind {
            TokenKind::Opmask => {
                sc.next();
                op.opmask = t.int_payload as u8;
            }
            TokenKind::Decorator => {
                sc.next();
                match t.int_payload {
                    0 => op.decoflags |= DecoFlags::Z_MASK,
                    1 => {
                        op.decoflags |= DecoFlags::BRDCAST_MASK;
                        op.broadcast_val = broadcast_val_from_n(t.aux_payload as u32);
                        brerop = true;
                    }
                    2 => {
                        op.decoflags |= DecoFlags::SAE;
                        if let Some(mode) = rounding_mode_from_text(&t.text) {
                            op.rounding = Some(mode);
                            op.decoflags |= DecoFlags::ER;
                        }
                        brerop = true;
                    }
                    _ => {}
                }
            }
            _ => break,
        }
    }
    brerop
}

/// `VAL_BRNUM`: `{1to2}` => 0, `{1to4}` => 1, `{1to8}` => 2, `{1to16}` => 3,
/// `{1to32}` => 4.
fn broadcast_val_from_n(n: u32) -> u8 {
    n.trailing_zeros().saturating_sub(1) as u8
}

fn rounding_mode_from_text(text: &str) -> Option<RoundingMode> {
    match text.to_ascii_lowercase().as_str() {
        "rn-sae" | "rn" => Some(RoundingMode::Rn),
        "rd-sae" | "rd" => Some(RoundingMode::Rd),
        "ru-sae" | "ru" => Some(RoundingMode::Ru),
        "rz-sae" | "rz" => Some(RoundingMode::Rz),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingSink;

    fn parse(src: &str) -> Instruction {
        let mut sink = CollectingSink::default();
        parse_line(src, &ParseOptions::default(), &mut sink)
    }

    fn parse_with(src: &str, opts: ParseOptions) -> Instruction {
        let mut sink = CollectingSink::default();
        parse_line(src, &opts, &mut sink)
    }

    #[test]
    fn scenario_1_label_mov_memory_operand() {
        let instr = parse("foo: mov eax, [ebx+4*ecx+0x10]");
        assert_eq!(instr.label.as_deref(), Some("foo"));
        assert_eq!(instr.opcode, Opcode::Mov);
        assert_eq!(instr.operands.len(), 2);
        assert!(instr.operands[0].optype.contains(OpType::REGISTER));
        assert_eq!(instr.operands[0].basereg, 0); // eax
        assert!(instr.operands[1].is_memory());
        assert_eq!(instr.operands[1].basereg, 3); // ebx
        assert_eq!(instr.operands[1].indexreg, 1); // ecx
        assert_eq!(instr.operands[1].scale, 4);
        assert_eq!(instr.operands[1].offset, 0x10);
    }

    #[test]
    fn scenario_2_times_reserve_string_bad_float() {
        let instr = parse("times 3 db ?, 'abc', 1.5");
        assert_eq!(instr.times, 3);
        assert_eq!(instr.opcode, Opcode::Db);
        assert_eq!(instr.extop.len(), 2);
        assert_eq!(instr.extop[0].kind, ExtOpKind::DbReserve);
        assert_eq!(instr.extop[1].kind, ExtOpKind::DbString("abc".into()));
    }

    #[test]
    fn scenario_4_lea_rip_relative() {
        let opts = ParseOptions { bits: 64, current_segment: 0, global_rel: false };
        let instr = parse_with("lea rax, [rel foo]", opts);
        assert_eq!(instr.opcode, Opcode::Lea);
        assert_eq!(instr.operands.len(), 2);
        assert!(instr.operands[1].optype.contains(OpType::IP_REL));
        assert!(instr.operands[1].opflags.contains(OpFlag::RELATIVE));
    }

    #[test]
    fn evex_decorators_and_brerop() {
        let instr = parse("vaddps zmm1{k2}{z}, zmm2, dword [rax] {1to16}");
        assert_eq!(instr.operands.len(), 3);
        assert_eq!(instr.operands[0].opmask, 2);
        assert!(instr.operands[0].decoflags.contains(DecoFlags::Z_MASK));
        assert!(instr.operands[2].decoflags.contains(DecoFlags::BRDCAST_MASK));
        assert_eq!(instr.operands[2].broadcast_val, 3);
        assert_eq!(instr.evex_brerop, 2);
    }

    #[test]
    fn blank_line_has_no_opcode() {
        let instr = parse("");
        assert_eq!(instr.opcode, Opcode::None);
    }

    #[test]
    fn label_alone_without_colon_warns() {
        let mut sink = CollectingSink::default();
        let instr = parse_line("foo", &ParseOptions::default(), &mut sink);
        assert_eq!(instr.label.as_deref(), Some("foo"));
        assert!(sink.diagnostics.iter().any(|d| d.message.contains("without a trailing colon")));
    }

    #[test]
    fn too_many_registers_in_effective_address_recovers() {
        let mut sink = CollectingSink::default();
        let instr = parse_line("mov eax, [eax+ebx+ecx]", &ParseOptions::default(), &mut sink);
        assert!(sink.has_errors());
        assert_eq!(instr.opcode, Opcode::Mov);
    }
}

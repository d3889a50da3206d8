//! Worked end-to-end scenarios, exercised against the crate's
//! public entry points.

use asmline::diag::CollectingSink;
use asmline::extop::ExtOpKind;
use asmline::insn::Opcode;
use asmline::operand::{DecoFlags, OpFlag, OpType, RoundingMode};
use asmline::{compile_database, parse_line, ParseOptions};

#[test]
fn scenario_1_label_and_sib_memory_operand() {
    let mut sink = CollectingSink::default();
    let opts = ParseOptions { bits: 32, ..Default::default() };
    let instr = parse_line("foo: mov eax, [ebx+4*ecx+0x10]", &opts, &mut sink);

    assert_eq!(instr.label.as_deref(), Some("foo"));
    assert_eq!(instr.opcode, Opcode::Mov);
    assert_eq!(instr.operands.len(), 2);

    let op0 = &instr.operands[0];
    assert!(op0.optype.contains(OpType::REGISTER | OpType::BITS32));
    assert_eq!(op0.basereg, 0); // eax

    let op1 = &instr.operands[1];
    assert!(op1.optype.contains(OpType::MEMORY_ANY));
    assert_eq!(op1.basereg, 3); // ebx
    assert_eq!(op1.indexreg, 1); // ecx
    assert_eq!(op1.scale, 4);
    assert_eq!(op1.offset, 0x10);
}

#[test]
fn scenario_2_times_reserve_and_string_chain_with_float_error() {
    let mut sink = CollectingSink::default();
    let opts = ParseOptions::default();
    let instr = parse_line("times 3 db ?, 'abc', 1.5", &opts, &mut sink);

    assert_eq!(instr.times, 3);
    assert_eq!(instr.opcode, Opcode::Db);
    assert_eq!(instr.extop.len(), 2);
    assert_eq!(instr.extop[0].kind, ExtOpKind::DbReserve);
    assert_eq!(instr.extop[1].kind, ExtOpKind::DbString("abc".into()));
}

#[test]
fn scenario_3_evex_decorators_on_avx512_instruction() {
    let mut sink = CollectingSink::default();
    let opts = ParseOptions::default();
    let instr = parse_line("vaddps zmm1{k2}{z}, zmm2, dword [rax] {1to16}", &opts, &mut sink);

    assert_eq!(instr.opcode, Opcode::Vaddps);
    assert_eq!(instr.operands.len(), 3);

    let op0 = &instr.operands[0];
    assert_eq!(op0.opmask, 2);
    assert!(op0.decoflags.contains(DecoFlags::Z_MASK));

    let op2 = &instr.operands[2];
    assert!(op2.decoflags.contains(DecoFlags::BRDCAST_MASK));
    assert_eq!(op2.broadcast_val, 3); // {1to16}

    assert_eq!(instr.evex_brerop, 2);
}

#[test]
fn scenario_4_rip_relative_lea() {
    let mut sink = CollectingSink::default();
    let opts = ParseOptions { bits: 64, ..Default::default() };
    let instr = parse_line("lea rax, [rel foo]", &opts, &mut sink);

    assert_eq!(instr.opcode, Opcode::Lea);
    let op1 = &instr.operands[1];
    assert!(op1.optype.contains(OpType::IP_REL));
    assert!(op1.opflags.contains(OpFlag::RELATIVE));
}

#[test]
fn scenario_5_conditional_mnemonic_expansion() {
    let text = "jcc imm32 [rel: 0f 80+c id] X64\n";
    let db = compile_database(text).unwrap();

    assert_eq!(db.templates.len(), 16);
    for cc in ["jo", "jno", "jb", "jae", "je", "jne", "jbe", "ja", "js", "jns", "jl", "jg", "jp", "jpe", "jnp", "jpo"] {
        assert!(db.mnemonics.id_of(cc).is_some(), "missing conditional mnemonic {cc}");
    }
    assert!(db.mnemonics.id_of("jf").is_none());
    assert!(db.mnemonics.id_of("jt").is_none());
}

#[test]
fn scenario_7_standalone_rounding_decorator_attaches_to_previous_operand() {
    let mut sink = CollectingSink::default();
    let opts = ParseOptions::default();
    let instr = parse_line("vaddps zmm0, zmm1, zmm2, {rz-sae}", &opts, &mut sink);

    assert_eq!(instr.opcode, Opcode::Vaddps);
    assert_eq!(instr.operands.len(), 3);

    let op2 = &instr.operands[2];
    assert!(op2.decoflags.contains(DecoFlags::SAE | DecoFlags::ER));
    assert_eq!(op2.rounding, Some(RoundingMode::Rz));
    assert_eq!(instr.evex_brerop, 2);
}

#[test]
fn scenario_6_bytecode_compiles_operand_roles_to_modrm() {
    use asmline::bytecode::{compile_dsl, Role};

    let compiled = compile_dsl("mr: 66 0f 7e /r").unwrap();
    assert_eq!(compiled.legacy_map, 1);
    assert_eq!(*compiled.bytes.last().unwrap(), 0);
    assert!(compiled.bytes.contains(&0x66));
    assert!(compiled.bytes.contains(&0x7e));

    // "mr": m is ModR/M.rm (position 0), r is ModR/M.reg (position 1).
    let _ = Role::ModrmReg;
    let _ = Role::ModrmRm;
}

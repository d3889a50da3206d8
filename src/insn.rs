//! The instruction record: the line parser's output, and the opcode
//! enumeration / prefix-slot model that goes with it.

use crate::extop::ExtOpNode;
use crate::operand::{Operand, RoundingMode};

/// Fixed operand-array capacity.
pub const MAX_OPERANDS: usize = 5;

/// A (deliberately small) built-in mnemonic set, matching
/// `scan::BUILTIN_MNEMONICS`. A compiled instruction database
/// extends this via `Opcode::Dynamic`, keyed into `gen::MnemonicTable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    None,
    Mov,
    Lea,
    Add,
    Sub,
    Cmp,
    Test,
    Push,
    Pop,
    Jmp,
    Call,
    Ret,
    Nop,
    Vaddps,
    Vmulps,
    Movaps,
    Xor,
    And,
    Or,
    Not,
    Inc,
    Dec,
    Db,
    Dw,
    Dd,
    Dq,
    Dt,
    Do,
    Dy,
    Dz,
    Resb,
    Resw,
    Resd,
    Resq,
    Rest,
    Reso,
    Resy,
    Resz,
    Incbin,
    Equ,
    Dynamic(u32),
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::None
    }
}

impl Opcode {
    pub fn from_mnemonic(name: &str) -> Opcode {
        match name.to_ascii_lowercase().as_str() {
            "mov" => Opcode::Mov,
            "lea" => Opcode::Lea,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "cmp" => Opcode::Cmp,
            "test" => Opcode::Test,
            "push" => Opcode::Push,
            "pop" => Opcode::Pop,
            "jmp" => Opcode::Jmp,
            "call" => Opcode::Call,
            "ret" => Opcode::Ret,
            "nop" => Opcode::Nop,
            "vaddps" => Opcode::Vaddps,
            "vmulps" => Opcode::Vmulps,
            "movaps" => Opcode::Movaps,
            "xor" => Opcode::Xor,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "not" => Opcode::Not,
            "inc" => Opcode::Inc,
            "dec" => Opcode::Dec,
            "db" => Opcode::Db,
            "dw" => Opcode::Dw,
            "dd" => Opcode::Dd,
            "dq" => Opcode::Dq,
            "dt" => Opcode::Dt,
            "do" => Opcode::Do,
            "dy" => Opcode::Dy,
            "dz" => Opcode::Dz,
            "resb" => Opcode::Resb,
            "resw" => Opcode::Resw,
            "resd" => Opcode::Resd,
            "resq" => Opcode::Resq,
            "rest" => Opcode::Rest,
            "reso" => Opcode::Reso,
            "resy" => Opcode::Resy,
            "resz" => Opcode::Resz,
            "incbin" => Opcode::Incbin,
            "equ" => Opcode::Equ,
            _ => Opcode::None,
        }
    }

    pub fn is_db_family(self) -> bool {
        matches!(
            self,
            Opcode::Db
            | Opcode::Dw
            | Opcode::Dd
            | Opcode::Dq
            | Opcode::Dt
            | Opcode::Do
            | Opcode::Dy
            | Opcode::Dz
            | Opcode::Resb
            | Opcode::Resw
            | Opcode::Resd
            | Opcode::Resq
            | Opcode::Rest
            | Opcode::Reso
            | Opcode::Resy
            | Opcode::Resz
        )
    }

    pub fn is_incbin(self) -> bool {
        matches!(self, Opcode::Incbin)
    }

    /// Element size in bytes for a DB-family mnemonic (the
    /// extended-operand `elem` field default).
    pub fn elem_size(self) -> Option<u32> {
        Some(match self {
            Opcode::Db | Opcode::Resb => 1,
                Opcode::Dw | Opcode::Resw => 2,
                Opcode::Dd | Opcode::Resd => 4,
                Opcode::Dq | Opcode::Resq => 8,
                Opcode::Dt | Opcode::Rest => 10,
                Opcode::Do | Opcode::Reso => 16,
                Opcode::Dy | Opcode::Resy => 32,
            Opcode::Dz | Opcode::Resz => 64,
            _ => return None,
        })
    }

    pub fn is_reserve(self) -> bool {
        matches!(
            self,
            Opcode::Resb
            | Opcode::Resw
            | Opcode::Resd
            | Opcode::Resq
            | Opcode::Rest
            | Opcode::Reso
            | Opcode::Resy
            | Opcode::Resz
        )
    }
}

/// One prefix slot per named prefix kind — lock/rep, segment override,
/// operand-size, address-size, VEX class, wait, REX. A `struct` of named
/// `Option` fields is the idiomatic
/// Rust equivalent of that array — each slot is independently typed and
/// the "at most one value per slot" invariant is enforced by the setter in
/// `line_parser`, not by the type itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefixSet {
    pub lock_rep: Option<String>,
    pub segment: Option<String>,
    pub operand_size: Option<String>,
    pub address_size: Option<String>,
    pub vex_class: Option<String>,
    pub wait: Option<String>,
    pub rex: Option<String>,
}

/// The line parser's output record.
#[derive(Clone, Debug, Default)]
pub struct Instruction {
    pub label: Option<String>,
    pub opcode: Opcode,
    pub prefixes: PrefixSet,
    /// `TIMES` multiplier, default 1; 0 after a pass-2 error on a negative
    /// constant expression.
    pub times: i64,
    pub operands: Vec<Operand>,
    /// Extended-operand chain head for DB-family / INCBIN directives.
    /// Modeled as a `Vec` rather than a linked list —
    /// termination and "free exactly once" are then free properties of
    /// `Vec`'s own ownership instead of invariants to prove by hand.
    pub extop: Vec<ExtOpNode>,
    pub evex_rounding: Option<RoundingMode>,
    /// Operand index carrying broadcast/SAE/ER, or -1 if none.
    pub evex_brerop: i32,
    pub forward_ref: bool,
}

impl Instruction {
    pub fn reset() -> Self {
        Instruction {
            opcode: Opcode::None,
            times: 1,
            evex_brerop: -1,
            ..Default::default()
        }
    }
}

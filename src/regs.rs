//! Register name table.
//!
//! Built as a small, explicit table rather than a generated one. Covers
//! GPRs 0-15 at every operand size, segment registers, `rip`, and the
//! vector/opmask registers 0-15 needed to exercise AVX-512 decorator
//! handling end to end; this is a representative subset of the full x86
//! register file, not an exhaustive one.

/// Register class, used by the memory-reference resolver to decide
/// whether a register term may occupy the base slot, and by the decorator
/// logic to classify `XMEM`/`YMEM`/`ZMEM` vector-index operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegClass {
    Gpr,
    Segment,
    Xmm,
    Ymm,
    Zmm,
    Opmask,
    Rip,
}

impl RegClass {
    pub fn is_gpr(self) -> bool {
        matches!(self, RegClass::Gpr)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegInfo {
    pub name: &'static str,
    pub class: RegClass,
    /// Register index within its class; -1 is reserved to mean "no
    /// register" on `Operand`, so real indices start at 0.
    pub index: i32,
    /// Operand size in bits this register name implies, or 0 for
    /// size-polymorphic registers (opmask `k0`..`k7`).
    pub size: u32,
    pub is_sreg: bool,
    pub is_fsgs: bool,
}

macro_rules! gpr_family {
    ($names64:expr, $names32:expr, $names16:expr, $names8:expr) => {{
        let mut v = Vec::new();
        for (i, n) in $names64.iter().enumerate() {
            v.push(RegInfo { name: n, class: RegClass::Gpr, index: i as i32, size: 64, is_sreg: false, is_fsgs: false });
        }
        for (i, n) in $names32.iter().enumerate() {
            v.push(RegInfo { name: n, class: RegClass::Gpr, index: i as i32, size: 32, is_sreg: false, is_fsgs: false });
        }
        for (i, n) in $names16.iter().enumerate() {
            v.push(RegInfo { name: n, class: RegClass::Gpr, index: i as i32, size: 16, is_sreg: false, is_fsgs: false });
        }
        for (i, n) in $names8.iter().enumerate() {
            v.push(RegInfo { name: n, class: RegClass::Gpr, index: i as i32, size: 8, is_sreg: false, is_fsgs: false });
        }
        v
    }};
}

const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];
const YMM_NAMES: [&str; 16] = [
    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10",
    "ymm11", "ymm12", "ymm13", "ymm14", "ymm15",
];
const ZMM_NAMES: [&str; 16] = [
    "zmm0", "zmm1", "zmm2", "zmm3", "zmm4", "zmm5", "zmm6", "zmm7", "zmm8", "zmm9", "zmm10",
    "zmm11", "zmm12", "zmm13", "zmm14", "zmm15",
];
const K_NAMES: [&str; 8] = ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"];

fn vector_family(names: &'static [&'static str], class: RegClass, size: u32) -> Vec<RegInfo> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| RegInfo { name, class, index: i as i32, size, is_sreg: false, is_fsgs: false })
        .collect()
}

fn build_table() -> Vec<RegInfo> {
    let mut v = Vec::new();

    v.extend(gpr_family!(
        ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15"],
        ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d"],
        ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w"],
        ["al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b"]
    ));
    // Legacy high-byte aliases: register index matches the corresponding
    // low-byte GPR index + 4, as NASM's own register table encodes them.
    for (i, n) in ["ah", "ch", "dh", "bh"].iter().enumerate() {
        v.push(RegInfo { name: n, class: RegClass::Gpr, index: i as i32 + 4, size: 8, is_sreg: false, is_fsgs: false });
    }

    v.push(RegInfo { name: "rip", class: RegClass::Rip, index: 0, size: 64, is_sreg: false, is_fsgs: false });

    for (i, n) in ["es", "cs", "ss", "ds", "fs", "gs"].iter().enumerate() {
        v.push(RegInfo {
            name: n,
            class: RegClass::Segment,
            index: i as i32,
            size: 16,
            is_sreg: true,
            is_fsgs: *n == "fs" || *n == "gs",
        });
    }

    v.extend(vector_family(&XMM_NAMES, RegClass::Xmm, 128));
    v.extend(vector_family(&YMM_NAMES, RegClass::Ymm, 256));
    v.extend(vector_family(&ZMM_NAMES, RegClass::Zmm, 512));

    for (i, n) in K_NAMES.iter().enumerate() {
        v.push(RegInfo { name: n, class: RegClass::Opmask, index: i as i32, size: 0, is_sreg: false, is_fsgs: false });
    }

    v
}

thread_local! {
    static TABLE: Vec<RegInfo> = build_table();
}

/// Looks up a register by name (case-insensitive), returning an owned copy
/// since the backing table is thread-local.
pub fn lookup(name: &str) -> Option<RegInfo> {
    let lower = name.to_ascii_lowercase();
    TABLE.with(|t| t.iter().find(|r| r.name == lower).copied())
}

/// Reverse lookup used once a register has already been reduced to
/// `(class, index)` by the evaluator, to recover its implied operand size
/// for the REGSIZE mismatch check.
pub fn size_of(class: RegClass, index: i32) -> Option<u32> {
    TABLE.with(|t| {
        t.iter()
            .find(|r| r.class == class && r.index == index)
            .map(|r| r.size)
    })
}

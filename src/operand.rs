//! The operand data model: the parsed operand record and its associated
//! bitmasks.
//!
//! The ~40-bit operand type (size × role × modifier) is represented as
//! a newtype over a machine integer with named constants — `bitflags`
//! is the idiomatic way to do that in Rust, rather than hand-rolling
//! shift-and-mask macros for something this wide.

use bitflags::bitflags;

bitflags! {
    /// Operand type: size class, role, and modifier bits all share one
    /// mask, the same shape as the reference assembler's `opflags_t`.
    #[derive(Default)]
    pub struct OpType: u64 {
        const BITS8 = 1 << 0;
        const BITS16 = 1 << 1;
        const BITS32 = 1 << 2;
        const BITS64 = 1 << 3;
        const BITS80 = 1 << 4;
        const BITS128 = 1 << 5;
        const BITS256 = 1 << 6;
        const BITS512 = 1 << 7;

        const REGISTER = 1 << 8;
        const IMMEDIATE = 1 << 9;
        const MEMORY_ANY = 1 << 10;
        const IP_REL = 1 << 11;
        const MEM_OFFS = 1 << 12;
        const XMEM = 1 << 13;
        const YMEM = 1 << 14;
        const ZMEM = 1 << 15;

        const TO = 1 << 16;
        const STRICT = 1 << 17;
        const FAR = 1 << 18;
        const NEAR = 1 << 19;
        const SHORT = 1 << 20;
        const COLON = 1 << 21;
        const UNITY = 1 << 22;
        const SBYTEDWORD = 1 << 23;
        const SBYTEWORD = 1 << 24;
        const UDWORD = 1 << 25;
        const SDWORD = 1 << 26;
    }
}

impl OpType {
    /// Size-class bits only (the first explicit size wins; later size
    /// tokens are silently ignored).
    pub const SIZE_MASK: OpType = OpType::from_bits_truncate(
        OpType::BITS8.bits()
        | OpType::BITS16.bits()
        | OpType::BITS32.bits()
        | OpType::BITS64.bits()
        | OpType::BITS80.bits()
        | OpType::BITS128.bits()
        | OpType::BITS256.bits()
        | OpType::BITS512.bits(),
    );

    pub fn from_size_bits(bits: u32) -> Option<OpType> {
        Some(match bits {
            8 => OpType::BITS8,
                16 => OpType::BITS16,
                32 => OpType::BITS32,
                64 => OpType::BITS64,
                80 => OpType::BITS80,
                128 => OpType::BITS128,
                256 => OpType::BITS256,
            512 => OpType::BITS512,
            _ => return None,
        })
    }

    pub fn has_explicit_size(self) -> bool {
        self.intersects(OpType::SIZE_MASK)
    }

    pub fn size_bits(self) -> Option<u32> {
        for (flag, bits) in [
            (OpType::BITS8, 8),
            (OpType::BITS16, 16),
            (OpType::BITS32, 32),
            (OpType::BITS64, 64),
            (OpType::BITS80, 80),
            (OpType::BITS128, 128),
            (OpType::BITS256, 256),
            (OpType::BITS512, 512),
        ] {
            if self.contains(flag) {
                return Some(bits);
            }
        }
        None
    }
}

bitflags! {
    /// Per-operand flags (`opflags`), orthogonal to `OpType`.
    #[derive(Default)]
    pub struct OpFlag: u32 {
        const FORWARD = 1 << 0;
        const RELATIVE = 1 << 1;
        const UNKNOWN = 1 << 2;
    }
}

bitflags! {
    /// Effective-address flags (`EAF_*`), attached to memory operands.
    #[derive(Default)]
    pub struct Eaf: u32 {
        const TIMESTWO = 1 << 0;
        const REL = 1 << 1;
        const ABS = 1 << 2;
        const BYTEOFFS = 1 << 3;
        const WORDOFFS = 1 << 4;
        const FSGS = 1 << 5;
    }
}

bitflags! {
    /// Decorator flags (`{z}`, `{sae}`, broadcast, embedded rounding).
    /// The opmask register number and broadcast width are not bitmask
    /// members — they carry a small numeric range and get dedicated
    /// `Operand` fields instead, since `decoflags` is *mostly* a flag set
    /// plus a couple of numeric slots.
    #[derive(Default)]
    pub struct DecoFlags: u32 {
        const Z_MASK = 1 << 0;
        const SAE = 1 << 1;
        const BRDCAST_MASK = 1 << 2;
        const ER = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundingMode {
    Rn,
    Rd,
    Ru,
    Rz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HintType {
    #[default]
    NoHint,
    MakeBase,
    NotBase,
}

/// One parsed operand.
#[derive(Clone, Debug)]
pub struct Operand {
    pub optype: OpType,
    pub opflags: OpFlag,
    /// -1 = no base register.
    pub basereg: i32,
    /// -1 = no index register.
    pub indexreg: i32,
    pub scale: u8,
    pub offset: i64,
    /// -1 = no segment override.
    pub segment: i32,
    /// -1 = no WRT segment.
    pub wrt: i32,
    pub disp_size: u8,
    pub eaflags: Eaf,
    pub decoflags: DecoFlags,
    /// 0 = no opmask, else `k1`..`k7`.
    pub opmask: u8,
    /// Broadcast width code: `{1to2}` => 0, `{1to4}` => 1, `{1to8}` => 2,
    /// `{1to16}` => 3, `{1to32}` => 4 (`VAL_BRNUM`), 0 if unset.
    pub broadcast_val: u8,
    pub rounding: Option<RoundingMode>,
    pub hintbase: i32,
    pub hinttype: HintType,
    /// Register-set size from a trailing `+N` marker (`zmm0+4`); 1 when
    /// absent.
    pub regset_size: u32,
}

impl Default for Operand {
    fn default() -> Self {
        Operand {
            optype: OpType::empty(),
            opflags: OpFlag::empty(),
            basereg: -1,
            indexreg: -1,
            scale: 0,
            offset: 0,
            segment: -1,
            wrt: -1,
            disp_size: 0,
            eaflags: Eaf::empty(),
            decoflags: DecoFlags::empty(),
            opmask: 0,
            broadcast_val: 0,
            rounding: None,
            hintbase: -1,
            hinttype: HintType::NoHint,
            regset_size: 1,
        }
    }
}

impl Operand {
    pub fn is_memory(&self) -> bool {
        self.optype.contains(OpType::MEMORY_ANY)
            || self.optype.contains(OpType::IP_REL)
            || self.optype.contains(OpType::MEM_OFFS)
    }

    pub fn has_evex_decorator(&self) -> bool {
        self.decoflags
            .intersects(DecoFlags::BRDCAST_MASK | DecoFlags::SAE | DecoFlags::ER)
            || self.rounding.is_some()
    }
}

//! Instruction-flag synthesis: the bytecode compiler's secondary output,
//! an instruction-flags multiset derived both from the database's own
//! FLAGS field and from implications the prefix encoding forces
//! regardless of what was written.

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct InsnFlags: u32 {
        const VEX = 1 << 0;
        const EVEX = 1 << 1;
        const REX2 = 1 << 2;
        const APX = 1 << 3;
        const LONG = 1 << 4;
        const NOLONG = 1 << 5;
        const NOAPX = 1 << 6;
        const NF = 1 << 7;
        const DFV = 1 << 8;
        const LIG = 1 << 9;
        const WIG = 1 << 10;
        const WW = 1 << 11;
    }
}

impl InsnFlags {
    pub fn from_names(names: &[String]) -> InsnFlags {
        let mut f = InsnFlags::empty();
        for name in names {
            if let Some(bit) = named(name) {
                f |= bit;
            }
        }
        f
    }
}

fn named(name: &str) -> Option<InsnFlags> {
    Some(match name.to_ascii_uppercase().as_str() {
        "VEX" => InsnFlags::VEX,
        "EVEX" => InsnFlags::EVEX,
        "REX2" => InsnFlags::REX2,
        "APX" => InsnFlags::APX,
        "LONG" => InsnFlags::LONG,
        "NOLONG" => InsnFlags::NOLONG,
        "NOAPX" => InsnFlags::NOAPX,
        "NF" => InsnFlags::NF,
        "DFV" => InsnFlags::DFV,
        "LIG" => InsnFlags::LIG,
        "WIG" => InsnFlags::WIG,
        "WW" => InsnFlags::WW,
        _ => return None,
    })
}

/// Adds the flags implied by the prefix class and legacy map actually
/// emitted, on top of whatever the database line asked for explicitly.
/// `LONG` is implied by `APX`; `NOAPX` is implied by `NOLONG`, by `VEX`,
/// and by any legacy escape map of 2 or higher that isn't `EVEX`.
pub fn synthesize(mut flags: InsnFlags, legacy_map: u8, is_evex: bool) -> InsnFlags {
    if flags.contains(InsnFlags::APX) {
        flags |= InsnFlags::LONG;
    }
    if flags.contains(InsnFlags::NOLONG) {
        flags |= InsnFlags::NOAPX;
    }
    if flags.contains(InsnFlags::VEX) {
        flags |= InsnFlags::NOAPX;
    }
    if legacy_map >= 2 && !is_evex {
        flags |= InsnFlags::NOAPX;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apx_implies_long() {
        let f = synthesize(InsnFlags::APX, 0, false);
        assert!(f.contains(InsnFlags::LONG));
    }

    #[test]
    fn vex_implies_noapx() {
        let f = synthesize(InsnFlags::VEX, 0, false);
        assert!(f.contains(InsnFlags::NOAPX));
    }

    #[test]
    fn legacy_map_two_implies_noapx_unless_evex() {
        let f = synthesize(InsnFlags::empty(), 2, false);
        assert!(f.contains(InsnFlags::NOAPX));
        let f_evex = synthesize(InsnFlags::empty(), 2, true);
        assert!(!f_evex.contains(InsnFlags::NOAPX));
    }

    #[test]
    fn from_names_round_trips_known_flags() {
        let f = InsnFlags::from_names(&["VEX".to_string(), "NF".to_string()]);
        assert!(f.contains(InsnFlags::VEX));
        assert!(f.contains(InsnFlags::NF));
        assert!(!f.contains(InsnFlags::EVEX));
    }
}

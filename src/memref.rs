//! Memory-reference resolver.

use crate::eval::ExprTerm;
use crate::operand::{Operand, OpFlag, OpType};
use crate::regs::RegClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRefError(pub String);

impl std::fmt::Display for MemRefError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for MemRefError {}

/// Walks an expression-term vector (the evaluator's output) accumulating
/// base/index/scale/offset/segment/wrt into `op`.
///
/// `current_segment` is the caller's ambient segment number, needed to
/// recognize the self-relative `foo - $` form (`EXPR_SEGBASE + current
/// with coefficient -1`).
pub fn resolve(op: &mut Operand, terms: &[ExprTerm], current_segment: i32) -> Result<(), MemRefError> {
    for term in terms {
        match term {
            ExprTerm::Reg { class, index, coeff } => match class {
                RegClass::Gpr => {
                    if *coeff == 1 && op.basereg < 0 {
                        op.basereg = *index;
                    } else if op.indexreg < 0 {
                        op.indexreg = *index;
                        op.scale = (*coeff).unsigned_abs() as u8;
                        if *coeff < 0 {
                            return Err(MemRefError("negative scale factor".into()));
                        }
                    } else {
                        return Err(MemRefError("too many registers in effective address".into()));
                    }
                }
                _ => {
                    if op.indexreg < 0 {
                        op.indexreg = *index;
                        op.scale = (*coeff).unsigned_abs() as u8;
                        tag_vector_index(op, *class);
                    } else {
                        return Err(MemRefError(
                            "impossible register in effective address".into(),
                        ));
                    }
                }
            },
            ExprTerm::Simple(v) => {
                op.offset = op.offset.wrapping_add(*v);
            }
            ExprTerm::Unknown => {
                op.opflags |= OpFlag::UNKNOWN;
            }
            ExprTerm::Wrt => {
                op.wrt = 0;
            }
            ExprTerm::SegBase { seg, coeff } => {
                if *coeff == 1 {
                    if op.segment >= 0 {
                        return Err(MemRefError("multiple base segments".into()));
                    }
                    op.segment = *seg;
                } else if *coeff == -1 && (*seg == current_segment || *seg == -1) {
                    op.opflags |= OpFlag::RELATIVE;
                } else {
                    return Err(MemRefError("invalid segment-base coefficient".into()));
                }
            }
            ExprTerm::Rdsae(_) => {
                return Err(MemRefError("rounding decorator not valid in memory reference".into()));
            }
        }
    }
    Ok(())
}

fn tag_vector_index(op: &mut Operand, class: RegClass) {
    op.optype |= match class {
        RegClass::Xmm => OpType::XMEM,
        RegClass::Ymm => OpType::YMEM,
        RegClass::Zmm => OpType::ZMEM,
        _ => return,
    };
}

/// MIB (compound) memory reference combination: the second
/// sub-expression may only contribute an index and scale: any
/// offset/segment/wrt/base there is an error. The first sub-expression's
/// hint bits (`MAKEBASE`/`NOTBASE`) are set according to whether it had a
/// base register.
pub fn combine_mib(
    first: &mut Operand,
    second: &Operand,
) -> Result<(), MemRefError> {
    if second.basereg >= 0 || second.offset != 0 || second.segment >= 0 || second.wrt >= 0 {
        return Err(MemRefError(
            "MIB second sub-expression may only contribute index and scale".into(),
        ));
    }
    first.indexreg = second.indexreg;
    first.scale = second.scale;
    use crate::operand::HintType;
    if first.basereg >= 0 {
        first.hintbase = first.basereg;
        first.hinttype = HintType::MakeBase;
    } else {
        first.hintbase = first.indexreg;
        first.hinttype = HintType::NotBase;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::scan::Scanner;

    fn resolved(src: &str) -> Operand {
        let mut sc = Scanner::from_line(src).unwrap();
        let terms = evaluate(&mut sc).unwrap();
        let mut op = Operand::default();
        resolve(&mut op, &terms, 0).unwrap();
        op
    }

    #[test]
    fn base_index_scale_offset() {
        let op = resolved("ebx+4*ecx+0x10");
        assert_eq!(op.basereg, 3);
        assert_eq!(op.indexreg, 1);
        assert_eq!(op.scale, 4);
        assert_eq!(op.offset, 0x10);
    }

    #[test]
    fn too_many_registers_errors() {
        let mut sc = Scanner::from_line("eax+ebx+ecx").unwrap();
        let terms = evaluate(&mut sc).unwrap();
        let mut op = Operand::default();
        assert!(resolve(&mut op, &terms, 0).is_err());
    }
}

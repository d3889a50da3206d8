//! Instruction-database reader and pattern expander: turns `insns.dat`-style
//! text into the expanded pattern set the bytecode compiler consumes.

pub mod expand;
pub mod reader;

pub use expand::{expand_line, ExpandedPattern, OperandSpec};
pub use reader::{parse_database, DbError, EncodingSrc, RawInsnLine};

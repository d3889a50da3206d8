//! Bytecode DSL compiler: compiles one expanded pattern's encoding string
//! into the octal-VM byte sequence, interns the result pool-wide, and
//! synthesizes the instruction-flags multiset.

pub mod compile;
pub mod flags;
pub mod pool;

pub use compile::{compile_dsl, compile_dsl_relaxed, CompileError, CompiledEncoding, Role};
pub use flags::{synthesize, InsnFlags};
pub use pool::BytecodePool;

//! Crate error type. Hand-rolled enum with manual `From` impls (no
//! `thiserror`/`anyhow` anywhere in this workspace).

use crate::eval::EvalError;
use crate::extop::ExtOpError;
use crate::memref::MemRefError;

/// The two non-fatal categories collapse into `Syntax` / `Semantic` here;
/// `Fatal` is reserved for the one truly fatal case — an evaluator
/// failure, which forces `opcode = I_none`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Syntax(String),
    Semantic(String),
    Fatal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(m) => write!(f, "syntax error: {m}"),
            Error::Semantic(m) => write!(f, "error: {m}"),
            Error::Fatal(m) => write!(f, "fatal: {m}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Error {
        Error::Fatal(e.0)
    }
}

impl From<ExtOpError> for Error {
    fn from(e: ExtOpError) -> Error {
        Error::Semantic(e.0)
    }
}

impl From<MemRefError> for Error {
    fn from(e: MemRefError) -> Error {
        Error::Semantic(e.0)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! The `Token` type produced by [`crate::scan::Scanner`].
//!
//! Mirrors a classic `stdscan`-style tokenizer contract: a tagged record
//! with an integer payload, an auxiliary integer payload, an owned text
//! payload (the borrowed char-pointer-with-length a C scanner would use
//! becomes an owned `String` here, since this crate's `Scanner` is
//! line-scoped and happily owns its token text), and a small flag mask.

use bitflags::bitflags;

bitflags! {
    /// Per-token flags.
    pub struct TokenFlags: u8 {
        /// This token is immediately followed by a `DUP` keyword (used by
        /// the extended-operand parser).
        const FOLLOWED_BY_DUP = 1 << 0;
        /// This token was produced from a brace-wrapped lexeme (`{...}`).
        const BRACE_WRAPPED = 1 << 1;
    }
}

/// Discriminant for [`Token::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Insn,
    Prefix,
    Reg,
    Size,
    Special,
    Opmask,
    Decorator,
    Str,
    StrFunc,
    Float,
    Num,
    Qmark,
    BrcConst,
    Times,
    MasmPtr,
    MasmFlat,
    /// A single-character punctuation token (`[`, `]`, `(`, `)`, `:`, `,`,
    /// `+`, `-`, `*`, `&`, `$`, `%`).
    Punct(char),
    Eos,
}

/// One token of the flat stream the line parser consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Primary integer payload: register index, size in bits, condition
    /// code, decorator id — meaning depends on `kind`.
    pub int_payload: i64,
    /// Secondary integer payload: register class for `Reg`, size in bytes
    /// for `Size`, opmask number for `Opmask`, etc.
    pub aux_payload: i64,
    /// The token's source text (identifier name, string contents, numeric
    /// literal text, brace-group contents with braces stripped).
    pub text: String,
    pub flags: TokenFlags,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            int_payload: 0,
            aux_payload: 0,
            text: text.into(),
            flags: TokenFlags::empty(),
        }
    }

    pub fn with_payload(mut self, int_payload: i64, aux_payload: i64) -> Self {
        self.int_payload = int_payload;
        self.aux_payload = aux_payload;
        self
    }

    pub fn eos() -> Self {
        Token::new(TokenKind::Eos, "")
    }

    pub fn is_eos(&self) -> bool {
        matches!(self.kind, TokenKind::Eos)
    }

    pub fn is_punct(&self, c: char) -> bool {
        matches!(self.kind, TokenKind::Punct(p) if p == c)
    }

    pub fn brace_wrapped(&self) -> bool {
        self.flags.contains(TokenFlags::BRACE_WRAPPED)
    }

    pub fn followed_by_dup(&self) -> bool {
        self.flags.contains(TokenFlags::FOLLOWED_BY_DUP)
    }
}

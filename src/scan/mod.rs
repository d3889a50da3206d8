//! Tokenizer: the stand-in for a classic `stdscan` contract.
//!
//! Lexical recognition is delegated to the `pest` grammar in
//! `grammar.pest` (the same tool and the same "match on `Pair::as_rule()`"
//! style a hand-rolled scanner and instruction table would use); this module
//! reclassifies the raw lexical pairs into fully-typed [`Token`]s by
//! looking registers, prefixes, size words, mnemonics and decorators up in
//! small keyword tables, the way the real `stdscan` consults hash tables
//! after a generic identifier scan.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::regs::{self, RegClass};
use crate::token::{Token, TokenFlags, TokenKind};

#[derive(PestParser)]
#[grammar = "grammar.pest"]
pub struct LineGrammar;

#[cfg(test)]
mod grammar_tests;

const PREFIXES: &[&str] = &[
    "lock", "rep", "repe", "repz", "repne", "repnz", "bnd", "wait", "xacquire", "xrelease", "o16",
    "o32", "o64", "a16", "a32", "a64", "rex",
];

/// Size-specifier keywords. Payload is the size in bits, matching the
/// `{8,16,32,64,80,128,256,512}` size-class vocabulary.
const SIZES: &[(&str, i64)] = &[
    ("byte", 8),
    ("word", 16),
    ("dword", 32),
    ("qword", 64),
    ("tword", 80),
    ("oword", 128),
    ("yword", 256),
    ("zword", 512),
];

/// Operand modifier keywords (`TO`, `STRICT`, `FAR`, `NEAR`, `SHORT`).
/// Payload values match the `OperandMod` discriminants in `operand.rs`.
const SPECIALS: &[(&str, i64)] = &[
    ("to", 0),
    ("strict", 1),
    ("far", 2),
    ("near", 3),
    ("short", 4),
];

/// A minimal mnemonic recognizer. A real build would be generated from
/// `insns.dat`; this fixed list is enough to drive the line parser end
/// to end and is extended at runtime by `gen::MnemonicTable` when a
/// compiled instruction database is available.
const BUILTIN_MNEMONICS: &[&str] = &[
    "mov", "lea", "add", "sub", "cmp", "test", "push", "pop", "jmp", "call", "ret", "nop",
    "vaddps", "vmulps", "movaps", "xor", "and", "or", "not", "inc", "dec", "db", "dw", "dd", "dq",
    "dt", "do", "dy", "dz", "resb", "resw", "resd", "resq", "rest", "reso", "resy", "resz",
    "incbin", "equ",
];

fn is_db_family(name: &str) -> bool {
    matches!(
        name,
        "db" | "dw" | "dd" | "dq" | "dt" | "do" | "dy" | "dz"
        | "resb" | "resw" | "resd" | "resq" | "rest" | "reso" | "resy" | "resz"
    )
}

pub fn classify_mnemonic(name: &str) -> bool {
    BUILTIN_MNEMONICS.contains(&name) || is_db_family(name) || name == "incbin"
}

fn classify_identifier(text: &str) -> Token {
    let lower = text.to_ascii_lowercase();

    if lower == "?" {
        return Token::new(TokenKind::Qmark, text);
    }
    if lower == "times" {
        return Token::new(TokenKind::Times, text);
    }
    if lower == "ptr" {
        return Token::new(TokenKind::MasmPtr, text);
    }
    if lower == "flat" {
        return Token::new(TokenKind::MasmFlat, text);
    }
    if let Some(p) = PREFIXES.iter().position(|p| *p == lower) {
        return Token::new(TokenKind::Prefix, text).with_payload(p as i64, 0);
    }
    if let Some((_, bits)) = SIZES.iter().find(|(n, _)| *n == lower) {
        return Token::new(TokenKind::Size, text).with_payload(*bits, 0);
    }
    if let Some((_, id)) = SPECIALS.iter().find(|(n, _)| *n == lower) {
        return Token::new(TokenKind::Special, text).with_payload(*id, 0);
    }
    if let Some(reg) = regs::lookup(&lower) {
        let class_tag = match reg.class {
            RegClass::Gpr => 0,
            RegClass::Segment => 1,
            RegClass::Xmm => 2,
            RegClass::Ymm => 3,
            RegClass::Zmm => 4,
            RegClass::Opmask => 5,
            RegClass::Rip => 6,
        };
        if reg.class == RegClass::Opmask {
            return Token::new(TokenKind::Opmask, text).with_payload(reg.index as i64, class_tag);
        }
        return Token::new(TokenKind::Reg, text).with_payload(reg.index as i64, class_tag);
    }
    if lower.starts_with("__") && lower.ends_with("__") {
        return Token::new(TokenKind::StrFunc, text);
    }
    if classify_mnemonic(&lower) {
        return Token::new(TokenKind::Insn, text);
    }
    Token::new(TokenKind::Identifier, text)
}

/// Classifies the contents of a `{...}` brace group: an opmask reference
/// (`k1`..`k7`), a zeroing marker (`z`), a broadcast width (`1to2`..
/// `1to32`), an SAE/rounding decorator, a braced-prefix token (`evex`,
/// `vex`, `vex3`, `rex2`), or — if the content is a bare integer — a
/// braced constant (`BRCCONST`).
fn classify_brace(content: &str) -> Token {
    let lower = content.to_ascii_lowercase();
    let mut tok = if lower == "z" {
        Token::new(TokenKind::Decorator, content).with_payload(0, 0)
    } else if let Some(rest) = lower.strip_prefix("1to") {
        match rest.parse::<i64>() {
            Ok(n) if n.is_power_of_two() => {
                Token::new(TokenKind::Decorator, content).with_payload(1, n)
            }
            _ => Token::new(TokenKind::Identifier, content),
        }
    } else if matches!(
        lower.as_str(),
        "sae" | "rn-sae" | "rd-sae" | "ru-sae" | "rz-sae" | "rn" | "rd" | "ru" | "rz"
    ) {
        Token::new(TokenKind::Decorator, content).with_payload(2, 0)
    } else if matches!(lower.as_str(), "evex" | "vex" | "vex3" | "rex2") {
        Token::new(TokenKind::Decorator, content).with_payload(3, 0)
    } else if let Some(reg) = regs::lookup(&lower) {
        if reg.class == RegClass::Opmask {
            Token::new(TokenKind::Opmask, content).with_payload(reg.index as i64, 0)
        } else {
            Token::new(TokenKind::Identifier, content)
        }
    } else if lower.chars().all(|c| c.is_ascii_digit()) {
        match lower.parse::<i64>() {
            Ok(n) => Token::new(TokenKind::BrcConst, content).with_payload(n, 0),
            Err(_) => Token::new(TokenKind::Identifier, content),
        }
    } else {
        Token::new(TokenKind::Identifier, content)
    };
    tok.flags |= TokenFlags::BRACE_WRAPPED;
    tok
}

fn pair_to_token(pair: Pair<Rule>) -> Token {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::float => Token::new(TokenKind::Float, text),
        Rule::integer => Token::new(TokenKind::Num, text),
        Rule::string => {
            let inner = &text[1..text.len() - 1];
            Token::new(TokenKind::Str, inner)
        }
        Rule::brace_group => classify_brace(&text[1..text.len() - 1]),
        Rule::identifier => classify_identifier(text),
        Rule::punct => Token::new(TokenKind::Punct(text.chars().next().unwrap()), text),
        _ => unreachable!("unexpected top-level rule {:?}", pair.as_rule()),
    }
}

/// Tokenizes a full pre-processed source line into a flat token stream
/// terminated by an implicit EOS (handled by [`Scanner::next`] once the
/// stream is exhausted, matching real `stdscan`'s `TOKEN_EOS`).
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut pairs = LineGrammar::parse(Rule::line, line).map_err(|e| e.to_string())?;
    let line_pair = pairs.next().unwrap();
    let mut tokens: Vec<Token> = line_pair
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(pair_to_token)
        .collect();

    for i in 0..tokens.len() {
        if let Some(next) = tokens.get(i + 1) {
            if matches!(next.kind, TokenKind::Identifier) && next.text.eq_ignore_ascii_case("dup")
            {
                tokens[i].flags |= TokenFlags::FOLLOWED_BY_DUP;
            }
        }
    }

    Ok(tokens)
}

/// Thin cursor over a token stream, providing a `stdscan`-style
/// next/get/set/pushback contract.
#[derive(Clone)]
pub struct Scanner {
    tokens: Vec<Token>,
    pos: usize,
    pushed_back: Option<Token>,
}

impl Scanner {
    pub fn new(tokens: Vec<Token>) -> Self {
        Scanner {
            tokens,
            pos: 0,
            pushed_back: None,
        }
    }

    pub fn from_line(line: &str) -> Result<Self, String> {
        Ok(Scanner::new(tokenize(line)?))
    }

    /// Returns the next token, or an EOS token once the stream is
    /// exhausted (consuming no further state so repeated calls keep
    /// returning EOS, matching `stdscan`'s behavior at end of line).
    pub fn next(&mut self) -> Token {
        if let Some(t) = self.pushed_back.take() {
            return t;
        }
        match self.tokens.get(self.pos) {
            Some(t) => {
                self.pos += 1;
                t.clone()
            }
            None => Token::eos(),
        }
    }

    /// Peeks at the next token without consuming it.
    pub fn peek(&mut self) -> Token {
        let t = self.next();
        self.pushback(t.clone());
        t
    }

    /// Un-consumes a single token (`stdscan_pushback`).
    pub fn pushback(&mut self, tok: Token) {
        debug_assert!(self.pushed_back.is_none(), "only one token of pushback is supported");
        self.pushed_back = Some(tok);
    }

    /// Saves the current cursor position (`stdscan_get`).
    pub fn get(&self) -> usize {
        self.pos
    }

    /// Restores a previously saved cursor position (`stdscan_set`),
    /// discarding any pending pushback.
    pub fn set(&mut self, mark: usize) {
        self.pos = mark;
        self.pushed_back = None;
    }

    pub fn at_eos(&mut self) -> bool {
        self.peek().is_eos()
    }
}

//! Reads an `insns.dat`-style instruction database: one instruction
//! pattern per non-comment, non-blank line, four whitespace-separated
//! fields wide: `MNEMONIC OPERANDS ENCODING FLAGS`.
//!
//! Grounded in how a grammar-driven reader turns flat text into
//! records before a separate pass gives them semantics — here the "grammar"
//! is this hand-rolled field splitter rather than a `pest` rule, since the
//! four-field format has no nesting beyond the bracketed encoding string.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError(pub String);

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database error: {}", self.0)
    }
}
impl std::error::Error for DbError {}

/// The ENCODING field of one `insns.dat` line, before the bytecode DSL
/// compiler has touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingSrc {
    /// `ignore` — the pattern is recognized but carries no encoding (stub
    /// mnemonics, documentation-only entries).
    Ignore,
    /// A bracketed DSL string, brackets stripped: `"mr: 66 0f 7e /r"`.
    Dsl(String),
    /// A C-style byte-escape sequence (`\xHH` / `\OOO`), already decoded.
    /// Lines using this form are disqualified from relaxed-form expansion.
    RawBytes(Vec<u8>),
}

/// One raw line of the instruction database, fields split but not yet
/// interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInsnLine {
    pub mnemonic: String,
    /// Comma-separated operand specs, suffix characters (`*`, `?`) intact;
    /// `expand` interprets them.
    pub operands: String,
    pub encoding: EncodingSrc,
    pub flags: Vec<String>,
    pub line_no: usize,
}

/// Parses a whole database file's text into raw lines. Stops at the first
/// malformed line with file/line context, matching the table generator's
/// fatal-build-error contract.
pub fn parse_database(text: &str) -> Result<Vec<RawInsnLine>, DbError> {
    let mut out = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        out.push(parse_line(line, line_no)?);
    }
    Ok(out)
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<RawInsnLine, DbError> {
    let mut rest = line.trim_start();

    let (mnemonic, after) = take_field(rest).ok_or_else(|| {
        DbError(format!("line {line_no}: missing mnemonic field"))
    })?;
    rest = after;

    let (operands, after) = take_field(rest).ok_or_else(|| {
        DbError(format!("line {line_no}: missing operands field"))
    })?;
    rest = after;

    rest = rest.trim_start();
    let (encoding_text, after) = take_encoding_field(rest).ok_or_else(|| {
        DbError(format!("line {line_no}: missing encoding field"))
    })?;
    rest = after;

    let flags_text = rest.trim();
    let flags = if flags_text.is_empty() {
        Vec::new()
    } else {
        flags_text.split(',').map(|s| s.trim().to_string()).collect()
    };

    let encoding = parse_encoding(encoding_text, line_no)?;

    Ok(RawInsnLine {
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
        encoding,
        flags,
        line_no,
    })
}

/// Splits the next whitespace-delimited field off `s`, returning
/// `(field, remainder)`.
fn take_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(pos) => Some((&s[..pos], &s[pos..])),
        None => Some((s, "")),
    }
}

/// The encoding field is special-cased: a `[...]` DSL string may contain
/// internal whitespace, so it is taken as a balanced-bracket span rather
/// than a plain whitespace-delimited field.
fn take_encoding_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.starts_with('[') {
        let end = s.find(']')?;
        Some((&s[..=end], &s[end + 1..]))
    } else {
        take_field(s)
    }
}

fn parse_encoding(text: &str, line_no: usize) -> Result<EncodingSrc, DbError> {
    if text.eq_ignore_ascii_case("ignore") {
        return Ok(EncodingSrc::Ignore);
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return Ok(EncodingSrc::Dsl(inner.trim().to_string()));
    }
    if text.starts_with('\\') {
        return Ok(EncodingSrc::RawBytes(decode_byte_escapes(text, line_no)?));
    }
    Err(DbError(format!(
        "line {line_no}: unrecognized encoding field `{text}`"
    )))
}

/// Decodes a run of `\xHH` / `\OOO` byte escapes into their raw bytes.
fn decode_byte_escapes(text: &str, line_no: usize) -> Result<Vec<u8>, DbError> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            return Err(DbError(format!(
                "line {line_no}: expected `\\` escape in raw-byte encoding"
            )));
        }
        i += 1;
        if i < bytes.len() && (bytes[i] == b'x' || bytes[i] == b'X') {
            i += 1;
            let start = i;
            while i < bytes.len() && i < start + 2 && bytes[i].is_ascii_hexdigit() {
                i += 1;
            }
            let hex = std::str::from_utf8(&bytes[start..i]).unwrap();
            let v = u8::from_str_radix(hex, 16)
                .map_err(|e| DbError(format!("line {line_no}: bad \\x escape: {e}")))?;
            out.push(v);
        } else {
            let start = i;
            while i < bytes.len() && i < start + 3 && (b'0'..=b'7').contains(&bytes[i]) {
                i += 1;
            }
            let oct = std::str::from_utf8(&bytes[start..i]).unwrap();
            let v = u8::from_str_radix(oct, 8)
                .map_err(|e| DbError(format!("line {line_no}: bad octal escape: {e}")))?;
            out.push(v);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_dsl_line() {
        let db = parse_database("mov reg32,reg32 [mr: 66 0f 7e /r] X64\n").unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].mnemonic, "mov");
        assert_eq!(db[0].operands, "reg32,reg32");
        assert_eq!(db[0].encoding, EncodingSrc::Dsl("mr: 66 0f 7e /r".into()));
        assert_eq!(db[0].flags, vec!["X64".to_string()]);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let db = parse_database("; a comment\n\nnop void ignore\n").unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].mnemonic, "nop");
        assert_eq!(db[0].encoding, EncodingSrc::Ignore);
    }

    #[test]
    fn decodes_raw_byte_escapes() {
        let db = parse_database("ret void \\xc3 NOP\n").unwrap();
        assert_eq!(db[0].encoding, EncodingSrc::RawBytes(vec![0xc3]));
    }

    #[test]
    fn rejects_missing_encoding_field() {
        let err = parse_database("mov reg32,reg32\n").unwrap_err();
        assert!(err.0.contains("line 1"));
    }
}

//! Grammar-level tests exercising the `pest` grammar directly: direct
//! `parses_to!`/`fails_with!` assertions against individual `pest` rules.

use super::Rule;
use ::pest::*;

#[test]
fn dec_uint() {
    parses_to! {
        parser: super::LineGrammar,
        input: "4492",
        rule: Rule::dec_uint,
        tokens: [dec_uint(0, 4)]
    };
}

#[test]
fn hex_uint_prefix_and_suffix() {
    parses_to! {
        parser: super::LineGrammar,
        input: "0x1F",
        rule: Rule::hex_uint,
        tokens: [hex_uint(0, 4)]
    };
    parses_to! {
        parser: super::LineGrammar,
        input: "1Fh",
        rule: Rule::hex_uint,
        tokens: [hex_uint(0, 3)]
    };
}

#[test]
fn bin_uint() {
    parses_to! {
        parser: super::LineGrammar,
        input: "0b1010",
        rule: Rule::bin_uint,
        tokens: [bin_uint(0, 6)]
    };
}

#[test]
fn float_literal() {
    parses_to! {
        parser: super::LineGrammar,
        input: "1.5",
        rule: Rule::float,
        tokens: [float(0, 3)]
    };
}

#[test]
fn identifier() {
    parses_to! {
        parser: super::LineGrammar,
        input: "foo_bar1",
        rule: Rule::identifier,
        tokens: [identifier(0, 8)]
    };
    fails_with! {
        parser: super::LineGrammar,
        input: "1notanident",
        rule: Rule::identifier,
        positives: [Rule::identifier],
        negatives: [],
        pos: 0
    };
}

#[test]
fn brace_group() {
    parses_to! {
        parser: super::LineGrammar,
        input: "{k2}",
        rule: Rule::brace_group,
        tokens: [brace_group(0, 4)]
    };
}

#[test]
fn quoted_string_variants() {
    parses_to! {
        parser: super::LineGrammar,
        input: "\"abc\"",
        rule: Rule::string,
        tokens: [string(0, 5, [string_dq(0, 5)])]
    };
    parses_to! {
        parser: super::LineGrammar,
        input: "'abc'",
        rule: Rule::string,
        tokens: [string(0, 5, [string_sq(0, 5)])]
    };
}

#[test]
fn full_line_tokenizes() {
    let tokens = super::tokenize("mov eax, [ebx+4*ecx+0x10]").unwrap();
    assert!(!tokens.is_empty());
    assert_eq!(tokens[0].text, "mov");
}

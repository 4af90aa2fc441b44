use kernax_dtype::DType;
use test_case::test_case;

use crate::Error;
use crate::lexer::{Pos, TokenKind, tokenize};
use crate::preprocess::preprocess;

fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
}

#[test_case("42", TokenKind::Int(42, DType::Int32) ; "int")]
#[test_case("42L", TokenKind::Int(42, DType::Int64) ; "long suffix")]
#[test_case("0x1F", TokenKind::Int(31, DType::Int32) ; "hex")]
#[test_case("56.0f", TokenKind::Float(56.0, DType::Float32) ; "float suffix")]
#[test_case("1e-3", TokenKind::Float(0.001, DType::Float64) ; "exponent")]
#[test_case(".5", TokenKind::Float(0.5, DType::Float64) ; "leading dot")]
fn test_numeric_literals(src: &str, expected: TokenKind) {
    assert_eq!(kinds(src), vec![expected, TokenKind::Eof]);
}

#[test]
fn test_longest_punct_and_comments() {
    let tokens = kinds("a += b; // trailing\n/* block */ c++ <= d");
    assert_eq!(
        tokens,
        vec![
            TokenKind::Ident("a".into()),
            TokenKind::Punct("+="),
            TokenKind::Ident("b".into()),
            TokenKind::Punct(";"),
            TokenKind::Ident("c".into()),
            TokenKind::Punct("++"),
            TokenKind::Punct("<="),
            TokenKind::Ident("d".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_positions_are_one_based() {
    let tokens = tokenize("void f()\n  {}").unwrap();
    assert_eq!(tokens[0].pos, Pos::new(1, 1));
    assert_eq!(tokens[1].pos, Pos::new(1, 6));
    assert_eq!(tokens[4].pos, Pos::new(2, 3));
}

#[test]
fn test_unexpected_character() {
    let err = tokenize("x = y @ z;").unwrap_err();
    assert_eq!(err, Error::Diagnostic { line: 1, col: 7, message: "unexpected character '@'".into() });
    assert_eq!(err.to_string(), "kernel.cpp:1:7: error: unexpected character '@'");
}

#[test]
fn test_unterminated_comment() {
    assert!(tokenize("/* never closed").unwrap_err().to_string().contains("unterminated comment"));
}

#[test]
fn test_directives_and_macros() {
    let src = "#include <cmath>\n#pragma once\n#define SCALE 2\nSCALE * OFFSET";
    let tokens: Vec<TokenKind> =
        preprocess(src, &["-DOFFSET=40".to_string(), "-O3".to_string()]).unwrap().into_iter().map(|t| t.kind).collect();
    assert_eq!(
        tokens,
        vec![
            TokenKind::Int(2, DType::Int32),
            TokenKind::Punct("*"),
            TokenKind::Int(40, DType::Int32),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_bare_define_flag_expands_to_one() {
    let tokens: Vec<TokenKind> =
        preprocess("FLAG", &["-D".to_string(), "FLAG".to_string()]).unwrap().into_iter().map(|t| t.kind).collect();
    assert_eq!(tokens[0], TokenKind::Int(1, DType::Int32));
}

#[test]
fn test_self_referential_macro_stops() {
    let tokens: Vec<TokenKind> = preprocess("#define X X + 1\nX", &[]).unwrap().into_iter().map(|t| t.kind).collect();
    assert_eq!(
        tokens,
        vec![TokenKind::Ident("X".into()), TokenKind::Punct("+"), TokenKind::Int(1, DType::Int32), TokenKind::Eof]
    );
}

#[test_case("#define SQ(x) x*x\n" ; "function-like macro")]
#[test_case("#ifdef FOO\n#endif\n" ; "conditional")]
fn test_unsupported_directives(src: &str) {
    let err = preprocess(src, &[]).unwrap_err();
    assert!(err.to_string().starts_with("kernel.cpp:1:1: error:"), "{err}");
}

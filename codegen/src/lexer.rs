//! Tokenizer for kernel source.

use kernax_dtype::DType;

use crate::error::*;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// Integer literal and the type its suffix selects.
    Int(i64, DType),
    /// Floating literal; `f`/`F` suffix selects `float`.
    Float(f64, DType),
    Punct(&'static str),
    /// A whole preprocessor line, without the leading `#`.
    Directive(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(id) if id == name)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ident(id) => write!(f, "'{id}'"),
            Self::Int(v, _) => write!(f, "'{v}'"),
            Self::Float(v, _) => write!(f, "'{v}'"),
            Self::Punct(p) => write!(f, "'{p}'"),
            Self::Directive(d) => write!(f, "'#{d}'"),
            Self::Eof => f.write_str("end of file"),
        }
    }
}

// Longest match first.
const PUNCTS: &[&str] = &[
    "::", "++", "--", "+=", "-=", "*=", "/=", "%=", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "=",
    "<", ">", "!", "?", ":", ";", ",", ".", "(", ")", "[", "]", "{", "}", "&",
];

struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    col: u32,
    at_line_start: bool,
}

/// Split `src` into tokens. The final token is always [`TokenKind::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer { src, pos: 0, line: 1, col: 1, at_line_start: true };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if eof {
            return Ok(tokens);
        }
    }
}

impl<'src> Lexer<'src> {
    fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
            self.at_line_start = true;
        } else {
            self.col += 1;
            if !c.is_whitespace() {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if rest.starts_with("/*") {
                let start = self.here();
                self.bump();
                self.bump();
                loop {
                    if self.rest().starts_with("*/") {
                        self.bump();
                        self.bump();
                        break;
                    }
                    if self.bump().is_none() {
                        return Err(Error::at(start, "unterminated comment"));
                    }
                }
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                return Ok(());
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        let pos = self.here();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        if c == '#' && self.at_line_start {
            self.bump();
            return Ok(Token { kind: TokenKind::Directive(self.directive_line()), pos });
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.bump();
            }
            return Ok(Token { kind: TokenKind::Ident(self.src[start..self.pos].to_string()), pos });
        }
        if c.is_ascii_digit() || (c == '.' && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit())) {
            return self.number(pos);
        }
        for p in PUNCTS {
            if self.rest().starts_with(p) {
                for _ in 0..p.len() {
                    self.bump();
                }
                return Ok(Token { kind: TokenKind::Punct(p), pos });
            }
        }
        Err(Error::at(pos, format!("unexpected character '{c}'")))
    }

    fn directive_line(&mut self) -> String {
        let mut line = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            if c == '\\' && self.rest()[1..].starts_with('\n') {
                self.bump();
                self.bump();
                line.push(' ');
                continue;
            }
            line.push(c);
            self.bump();
        }
        line.trim().to_string()
    }

    fn number(&mut self, pos: Pos) -> Result<Token> {
        let start = self.pos;
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.src[digits_start..self.pos];
            let value = i64::from_str_radix(digits, 16)
                .map_err(|_| Error::at(pos, format!("invalid hexadecimal literal '0x{digits}'")))?;
            let dtype = self.int_suffix(value);
            return Ok(Token { kind: TokenKind::Int(value, dtype), pos });
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' {
                is_float = true;
                self.bump();
            } else if (c == 'e' || c == 'E')
                && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit() || c == '+' || c == '-')
            {
                is_float = true;
                self.bump();
                if self.peek().is_some_and(|c| c == '+' || c == '-') {
                    self.bump();
                }
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            let value: f64 = text.parse().map_err(|_| Error::at(pos, format!("invalid floating literal '{text}'")))?;
            let dtype = match self.peek() {
                Some('f' | 'F') => {
                    self.bump();
                    DType::Float32
                }
                Some('l' | 'L') => {
                    self.bump();
                    DType::Float64
                }
                _ => DType::Float64,
            };
            return Ok(Token { kind: TokenKind::Float(value, dtype), pos });
        }
        let value: i64 = text.parse().map_err(|_| Error::at(pos, format!("integer literal '{text}' is too large")))?;
        let dtype = self.int_suffix(value);
        Ok(Token { kind: TokenKind::Int(value, dtype), pos })
    }

    fn int_suffix(&mut self, value: i64) -> DType {
        let mut wide = i32::try_from(value).is_err();
        while let Some(c @ ('u' | 'U' | 'l' | 'L')) = self.peek() {
            wide |= matches!(c, 'l' | 'L' | 'u' | 'U');
            self.bump();
        }
        if wide { DType::Int64 } else { DType::Int32 }
    }
}

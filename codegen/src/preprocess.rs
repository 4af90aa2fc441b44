//! Object-like macros and preprocessor directives.
//!
//! `#include` and `#pragma` are accepted and ignored: the kernel language
//! library is the built-in prelude. `-DNAME[=value]` flags behave like a
//! `#define` at the top of the file; every other flag is left to the native
//! toolchain.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::*;
use crate::lexer::{Pos, Token, TokenKind, tokenize};

/// Expansion depth at which a macro is assumed to be self-referential.
const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Default, Clone)]
pub struct Macros {
    defs: FxHashMap<String, Vec<TokenKind>>,
}

impl Macros {
    /// Collect `-D` definitions from a compiler flag list.
    pub fn from_flags(flags: &[String]) -> Result<Self> {
        let mut macros = Self::default();
        let mut iter = flags.iter();
        while let Some(flag) = iter.next() {
            let def = match flag.strip_prefix("-D") {
                Some("") => iter.next().map(String::as_str),
                Some(def) => Some(def),
                None => None,
            };
            let Some(def) = def else { continue };
            let (name, value) = def.split_once('=').unwrap_or((def, "1"));
            macros.define(name, value, Pos::default())?;
        }
        Ok(macros)
    }

    pub fn define(&mut self, name: &str, body: &str, pos: Pos) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::at(pos, format!("invalid macro name '{name}'")));
        }
        let mut tokens = tokenize(body).map_err(|_| Error::at(pos, format!("invalid body for macro '{name}'")))?;
        tokens.pop();
        self.defs.insert(name.to_string(), tokens.into_iter().map(|t| t.kind).collect());
        Ok(())
    }

    pub fn undefine(&mut self, name: &str) {
        self.defs.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&[TokenKind]> {
        self.defs.get(name).map(Vec::as_slice)
    }

    fn expand_into(&self, token: Token, active: &mut FxHashSet<String>, out: &mut Vec<Token>) -> Result<()> {
        let TokenKind::Ident(name) = &token.kind else {
            out.push(token);
            return Ok(());
        };
        let Some(body) = self.get(name).filter(|_| !active.contains(name)) else {
            out.push(token);
            return Ok(());
        };
        if active.len() >= MAX_EXPANSION_DEPTH {
            return Err(Error::at(token.pos, format!("macro '{name}' expands too deeply")));
        }
        active.insert(name.clone());
        for kind in body {
            // Expanded tokens report the position of the macro use.
            self.expand_into(Token { kind: kind.clone(), pos: token.pos }, active, out)?;
        }
        active.remove(name);
        Ok(())
    }
}

/// Tokenize `source`, apply directives and expand macros.
pub fn preprocess(source: &str, flags: &[String]) -> Result<Vec<Token>> {
    let mut macros = Macros::from_flags(flags)?;
    let mut out = Vec::new();
    let mut active = FxHashSet::default();

    for token in tokenize(source)? {
        let TokenKind::Directive(line) = &token.kind else {
            macros.expand_into(token, &mut active, &mut out)?;
            continue;
        };
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line.as_str(), ""));
        let rest = rest.trim();
        match name {
            "include" | "pragma" | "" => {}
            "define" => {
                let split = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
                let (macro_name, body) = rest.split_at(split);
                if body.starts_with('(') {
                    return Err(Error::at(token.pos, format!("function-like macro '{macro_name}' is not supported")));
                }
                macros.define(macro_name, body.trim(), token.pos)?;
            }
            "undef" => macros.undefine(rest),
            other => {
                return Err(Error::at(token.pos, format!("unsupported preprocessor directive '#{other}'")));
            }
        }
    }
    tracing::trace!(tokens = out.len(), "preprocessed kernel source");
    Ok(out)
}

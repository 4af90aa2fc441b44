//! Recursive-descent parser for the kernel language.

use kernax_dtype::DType;

use crate::ast::*;
use crate::error::*;
use crate::kir::{BinaryOp, UnaryOp};
use crate::lexer::{Pos, Token, TokenKind};

/// Parse a preprocessed token stream into a translation unit.
pub fn parse(tokens: Vec<Token>) -> Result<TranslationUnit> {
    let mut parser = Parser { tokens, index: 0, type_params: Vec::new() };
    let mut functions = Vec::new();
    while !parser.at_eof() {
        if parser.eat_punct(";") {
            continue;
        }
        functions.push(parser.function()?);
    }
    if functions.is_empty() {
        return Err(Error::at(parser.pos(), "translation unit defines no functions"));
    }
    Ok(TranslationUnit { functions })
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Template type parameters of the function being parsed.
    type_params: Vec<String>,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.index + offset).min(last)]
    }

    fn pos(&self) -> Pos {
        self.peek().pos
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().is_punct(p) {
            self.index += 1;
            return true;
        }
        false
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.peek().is_ident(name) {
            self.index += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, p: &str) -> Result<Pos> {
        let token = self.peek();
        if token.is_punct(p) {
            let pos = token.pos;
            self.index += 1;
            return Ok(pos);
        }
        Err(Error::at(token.pos, format!("expected '{p}' before {}", token.kind)))
    }

    fn expect_keyword(&mut self, name: &str) -> Result<()> {
        if self.eat_ident(name) {
            return Ok(());
        }
        let token = self.peek();
        Err(Error::at(token.pos, format!("expected '{name}' before {}", token.kind)))
    }

    fn ident(&mut self) -> Result<(String, Pos)> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) if !is_keyword(&name) => Ok((name, token.pos)),
            other => Err(Error::at(token.pos, format!("expected identifier before {other}"))),
        }
    }

    // ---- items ------------------------------------------------------------------------

    fn function(&mut self) -> Result<FunctionDef> {
        let pos = self.pos();
        let template = if self.eat_ident("template") { self.template_params()? } else { Vec::new() };
        self.type_params =
            template.iter().filter(|p| matches!(p, TemplateParam::Type { .. })).map(|p| p.name().to_string()).collect();

        while self.eat_ident("static") || self.eat_ident("inline") {}
        self.expect_keyword("void").map_err(|_| Error::at(self.pos(), "kernel functions must return 'void'"))?;
        let (name, _) = self.ident()?;

        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.eat_punct(")") {
            loop {
                params.push(self.param()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }
        let body = self.block()?;
        Ok(FunctionDef { name, template, params, body, pos })
    }

    fn template_params(&mut self) -> Result<Vec<TemplateParam>> {
        self.expect_punct("<")?;
        let mut params = Vec::new();
        if self.eat_punct(">") {
            return Ok(params);
        }
        loop {
            let pos = self.pos();
            if self.eat_ident("typename") || self.eat_ident("class") {
                let (name, _) = self.ident()?;
                params.push(TemplateParam::Type { name, pos });
            } else if let Some(dtype) = self.scalar_type()? {
                if !dtype.is_int() && !dtype.is_bool() {
                    let message = format!("template parameter of type '{}' is not integral", dtype.c_style());
                    return Err(Error::at(pos, message));
                }
                let (name, _) = self.ident()?;
                params.push(TemplateParam::Value { name, dtype, pos });
            } else {
                return Err(Error::at(pos, format!("expected template parameter before {}", self.peek().kind)));
            }
            if self.eat_punct(">") {
                return Ok(params);
            }
            self.expect_punct(",")?;
        }
    }

    fn param(&mut self) -> Result<ParamDecl> {
        let pos = self.pos();
        let mut is_const = self.eat_ident("const");
        let ty = self.type_expr()?.ok_or_else(|| Error::at(pos, format!("unknown type {}", self.peek().kind)))?;
        is_const |= self.eat_ident("const");
        let is_ref = self.eat_punct("&");
        let (name, _) = self.ident()?;
        Ok(ParamDecl { name, is_const, is_ref, ty, pos })
    }

    // ---- types ------------------------------------------------------------------------

    /// Parse a scalar type spelling if one starts here.
    fn scalar_type(&mut self) -> Result<Option<DType>> {
        let start = self.index;
        if self.peek().is_ident("std") && self.peek_at(1).is_punct("::") && self.peek_at(2).is_ident("size_t") {
            self.index += 3;
            return Ok(Some(DType::Int64));
        }
        let mut unsigned = false;
        let mut signed = false;
        let mut longs = 0;
        let mut base: Option<&'static str> = None;
        while let TokenKind::Ident(word) = &self.peek().kind {
            match word.as_str() {
                "unsigned" => unsigned = true,
                "signed" => signed = true,
                "long" => longs += 1,
                "int" | "short" | "char" | "float" | "double" | "bool" | "size_t" if base.is_none() => {
                    base = Some(match word.as_str() {
                        "int" => "int",
                        "short" => "short",
                        "char" => "char",
                        "float" => "float",
                        "double" => "double",
                        "bool" => "bool",
                        _ => "size_t",
                    });
                }
                _ => break,
            }
            self.index += 1;
        }
        if self.index == start {
            return Ok(None);
        }
        let pos = self.tokens[start].pos;
        let dtype = match (base, longs) {
            (Some("float"), 0) => DType::Float32,
            (Some("double"), _) => DType::Float64,
            (Some("bool"), 0) => DType::Bool,
            (Some("size_t"), 0) => DType::Int64,
            (Some("short" | "char"), _) => {
                return Err(Error::at(pos, "'short' and 'char' element types are not supported"));
            }
            (None | Some("int"), 0) if unsigned => DType::Int64,
            (Some("int"), 0) => DType::Int32,
            (None, 0) if signed => DType::Int32,
            (None | Some("int"), n) if n > 0 => DType::Int64,
            _ => return Err(Error::at(pos, "invalid combination of type specifiers")),
        };
        Ok(Some(dtype))
    }

    fn is_namespaced(&self, name: &str) -> bool {
        self.peek().is_ident("kernax") && self.peek_at(1).is_punct("::") && self.peek_at(2).is_ident(name)
    }

    fn type_expr(&mut self) -> Result<Option<TypeExpr>> {
        if let Some(dtype) = self.scalar_type()? {
            return Ok(Some(TypeExpr::Scalar(dtype)));
        }
        if self.is_namespaced("tensor") || self.is_namespaced("tape") {
            self.index += 2;
        }
        if self.eat_ident("tape") {
            return Ok(Some(TypeExpr::Tape));
        }
        if self.eat_ident("tensor") {
            self.expect_punct("<")?;
            let elem = self.type_expr()?.ok_or_else(|| Error::at(self.pos(), "expected tensor element type"))?;
            let mut dims = Vec::new();
            while self.eat_punct(",") {
                let token = self.advance();
                dims.push(match token.kind {
                    TokenKind::Int(v, _) => DimExpr::Lit(v),
                    TokenKind::Ident(name) => DimExpr::Param(name),
                    other => return Err(Error::at(token.pos, format!("expected tensor extent before {other}"))),
                });
            }
            self.expect_punct(">")?;
            return Ok(Some(TypeExpr::Tensor { elem: Box::new(elem), dims }));
        }
        if let TokenKind::Ident(name) = &self.peek().kind
            && self.type_params.contains(name)
        {
            let name = name.clone();
            self.index += 1;
            return Ok(Some(TypeExpr::Named(name)));
        }
        Ok(None)
    }

    fn starts_declaration(&self) -> bool {
        let TokenKind::Ident(word) = &self.peek().kind else { return false };
        match word.as_str() {
            "const" | "unsigned" | "signed" | "size_t" | "bool" | "int" | "long" | "short" | "char" | "float"
            | "double" => !self.peek_at(1).is_punct("("),
            "std" => self.peek_at(1).is_punct("::") && self.peek_at(2).is_ident("size_t"),
            "kernax" => self.is_namespaced("tensor") || self.is_namespaced("tape"),
            "tensor" => self.peek_at(1).is_punct("<"),
            "tape" => matches!(self.peek_at(1).kind, TokenKind::Ident(_)),
            name => self.type_params.iter().any(|p| p == name),
        }
    }

    // ---- statements -------------------------------------------------------------------

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(Error::at(self.pos(), "expected '}' at end of input"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt> {
        let pos = self.pos();
        let kind = if self.peek().is_punct("{") {
            StmtKind::Block(self.block()?)
        } else if self.eat_punct(";") {
            StmtKind::Empty
        } else if self.eat_ident("if") {
            self.expect_punct("(")?;
            let cond = self.expr()?;
            self.expect_punct(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_ident("else") { Some(Box::new(self.statement()?)) } else { None };
            StmtKind::If { cond, then, otherwise }
        } else if self.eat_ident("while") {
            self.expect_punct("(")?;
            let cond = self.expr()?;
            self.expect_punct(")")?;
            StmtKind::While { cond, body: Box::new(self.statement()?) }
        } else if self.eat_ident("for") {
            self.for_loop()?
        } else if self.eat_ident("return") {
            if !self.peek().is_punct(";") {
                return Err(Error::at(self.pos(), "void function should not return a value"));
            }
            self.expect_punct(";")?;
            StmtKind::Return
        } else if let Some(word) = ["break", "continue", "do", "switch", "goto", "auto"]
            .into_iter()
            .find(|w| self.peek().is_ident(w))
        {
            return Err(Error::at(pos, format!("'{word}' is not supported in kernels")));
        } else if self.starts_declaration() {
            let kind = self.declaration()?;
            self.expect_punct(";")?;
            kind
        } else {
            let expr = self.expr()?;
            self.expect_punct(";")?;
            StmtKind::Expr(expr)
        };
        Ok(Stmt { kind, pos })
    }

    fn for_loop(&mut self) -> Result<StmtKind> {
        self.expect_punct("(")?;
        let init_pos = self.pos();
        let init = if self.eat_punct(";") {
            None
        } else if self.starts_declaration() {
            let kind = self.declaration()?;
            self.expect_punct(";")?;
            Some(Box::new(Stmt { kind, pos: init_pos }))
        } else {
            let expr = self.expr()?;
            self.expect_punct(";")?;
            Some(Box::new(Stmt { kind: StmtKind::Expr(expr), pos: init_pos }))
        };
        let cond = if self.peek().is_punct(";") { None } else { Some(self.expr()?) };
        self.expect_punct(";")?;
        let step = if self.peek().is_punct(")") { None } else { Some(self.expr()?) };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For { init, cond, step, body })
    }

    fn declaration(&mut self) -> Result<StmtKind> {
        let pos = self.pos();
        self.eat_ident("const");
        let ty = self.type_expr()?.ok_or_else(|| Error::at(pos, format!("unknown type {}", self.peek().kind)))?;
        self.eat_ident("const");
        let mut declarators = Vec::new();
        loop {
            if self.peek().is_punct("&") {
                return Err(Error::at(self.pos(), "local references are not supported"));
            }
            let (name, pos) = self.ident()?;
            let init = if self.eat_punct("=") {
                Some(Init::Expr(self.assignment()?))
            } else if self.eat_punct("{") {
                if self.eat_punct("}") {
                    Some(Init::Zero)
                } else {
                    let e = self.assignment()?;
                    self.expect_punct("}")?;
                    Some(Init::Expr(e))
                }
            } else if self.eat_punct("(") {
                let e = self.assignment()?;
                self.expect_punct(")")?;
                Some(Init::Expr(e))
            } else {
                None
            };
            declarators.push(Declarator { name, init, pos });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(StmtKind::Decl { ty, declarators })
    }

    // ---- expressions ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let target = self.ternary()?;
        let op = match &self.peek().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            TokenKind::Punct("%=") => Some(BinaryOp::Rem),
            _ => return Ok(target),
        };
        let pos = self.advance().pos;
        let value = self.assignment()?;
        Ok(Expr::new(ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) }, pos))
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.binary(0)?;
        if !self.peek().is_punct("?") {
            return Ok(cond);
        }
        let pos = self.advance().pos;
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.ternary()?;
        Ok(Expr::new(
            ExprKind::Ternary { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) },
            pos,
        ))
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        let TokenKind::Punct(p) = &self.peek().kind else { return None };
        Some(match *p {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return None,
        })
    }

    /// Precedence climbing over the left-associative binary operators.
    fn binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op()
            && op.precedence() >= min_prec
        {
            let pos = self.advance().pos;
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, pos);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let pos = self.pos();
        let op = match &self.peek().kind {
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.unary()?;
            return Ok(Expr::new(ExprKind::Unary { op, arg: Box::new(arg) }, pos));
        }
        for (p, delta) in [("++", 1), ("--", -1)] {
            if self.eat_punct(p) {
                let target = self.unary()?;
                return Ok(Expr::new(ExprKind::Step { target: Box::new(target), delta }, pos));
            }
        }
        if self.peek().is_punct("(") {
            let save = self.index;
            self.index += 1;
            if let Some(to) = self.scalar_type()?
                && self.eat_punct(")")
            {
                let arg = self.unary()?;
                return Ok(Expr::new(ExprKind::Cast { to, arg: Box::new(arg) }, pos));
            }
            self.index = save;
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.pos();
            if self.eat_punct("[") {
                let index = self.expr()?;
                self.expect_punct("]")?;
                expr = Expr::new(ExprKind::Index { base: Box::new(expr), index: Box::new(index) }, pos);
            } else if self.eat_punct(".") {
                let (method, _) = self.ident()?;
                self.expect_punct("(")?;
                let args = self.call_args()?;
                expr = Expr::new(ExprKind::Method { receiver: Box::new(expr), method, args }, pos);
            } else if self.eat_punct("++") {
                expr = Expr::new(ExprKind::Step { target: Box::new(expr), delta: 1 }, pos);
            } else if self.eat_punct("--") {
                expr = Expr::new(ExprKind::Step { target: Box::new(expr), delta: -1 }, pos);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an already-consumed `(`.
    fn call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let pos = self.pos();
        if self.eat_ident("static_cast") {
            self.expect_punct("<")?;
            let pos = self.pos();
            let to = self.scalar_type()?.ok_or_else(|| Error::at(pos, "static_cast target must be a scalar type"))?;
            self.expect_punct(">")?;
            self.expect_punct("(")?;
            let arg = self.expr()?;
            self.expect_punct(")")?;
            return Ok(Expr::new(ExprKind::Cast { to, arg: Box::new(arg) }, pos));
        }
        if self.peek_at(1).is_punct("(") || self.peek().is_ident("long") || self.peek().is_ident("unsigned") {
            let save = self.index;
            if let Some(to) = self.scalar_type()?
                && self.eat_punct("(")
            {
                let arg = self.expr()?;
                self.expect_punct(")")?;
                return Ok(Expr::new(ExprKind::Cast { to, arg: Box::new(arg) }, pos));
            }
            self.index = save;
        }

        let token = self.advance();
        match token.kind {
            TokenKind::Int(v, dtype) => Ok(Expr::new(ExprKind::Int(v, dtype), pos)),
            TokenKind::Float(v, dtype) => Ok(Expr::new(ExprKind::Float(v, dtype), pos)),
            TokenKind::Ident(word) if word == "true" || word == "false" => {
                Ok(Expr::new(ExprKind::Bool(word == "true"), pos))
            }
            TokenKind::Punct("(") => {
                let inner = self.expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Ident(word) if !is_keyword(&word) => {
                let mut name = word;
                while self.peek().is_punct("::") {
                    self.advance();
                    let (part, _) = self.ident()?;
                    name = format!("{name}::{part}");
                }
                if self.eat_punct("(") {
                    let args = self.call_args()?;
                    return Ok(Expr::new(ExprKind::Call { name, args }, pos));
                }
                Ok(Expr::new(ExprKind::Ident(name), pos))
            }
            other => Err(Error::at(pos, format!("expected expression before {other}"))),
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "else"
            | "for"
            | "while"
            | "return"
            | "const"
            | "void"
            | "template"
            | "typename"
            | "class"
            | "static_cast"
            | "true"
            | "false"
            | "int"
            | "long"
            | "float"
            | "double"
            | "bool"
            | "unsigned"
            | "signed"
    )
}

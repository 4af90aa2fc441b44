//! Syntax tree of a kernel translation unit, before name resolution.

use kernax_dtype::DType;

use crate::kir::{BinaryOp, UnaryOp};
use crate::lexer::Pos;

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDef>,
}

impl TranslationUnit {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub template: Vec<TemplateParam>,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateParam {
    /// `typename T` / `class T`
    Type { name: String, pos: Pos },
    /// `std::size_t N`, `int N`, ...
    Value { name: String, dtype: DType, pos: Pos },
}

impl TemplateParam {
    pub fn name(&self) -> &str {
        match self {
            Self::Type { name, .. } | Self::Value { name, .. } => name,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Self::Type { pos, .. } | Self::Value { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub is_const: bool,
    pub is_ref: bool,
    pub ty: TypeExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Scalar(DType),
    /// A name that must be a template type parameter.
    Named(String),
    Tensor { elem: Box<TypeExpr>, dims: Vec<DimExpr> },
    Tape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DimExpr {
    Lit(i64),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// `= e`, `(e)` or `{e}`
    Expr(Expr),
    /// `{}`
    Zero,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Init>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Decl { ty: TypeExpr, declarators: Vec<Declarator> },
    Expr(Expr),
    Block(Vec<Stmt>),
    If { cond: Expr, then: Box<Stmt>, otherwise: Option<Box<Stmt>> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
    While { cond: Expr, body: Box<Stmt> },
    Return,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64, DType),
    Float(f64, DType),
    Bool(bool),
    Ident(String),
    Index { base: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, arg: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `=` when `op` is `None`, compound assignment otherwise.
    Assign { op: Option<BinaryOp>, target: Box<Expr>, value: Box<Expr> },
    /// `++`/`--` in prefix or postfix position.
    Step { target: Box<Expr>, delta: i8 },
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Cast { to: DType, arg: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Method { receiver: Box<Expr>, method: String, args: Vec<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

//! Resolved kernel IR.
//!
//! A [`Function`] is monomorphic: every parameter and local has a concrete
//! element type and concrete extents, every name is unique, every element access
//! is fully indexed and whole-tensor assignments are already expanded into loops.
//! The AD transformations, the renderer and the evaluator all work on this form.

use kernax_dtype::{DType, ShapeSpec};
use rustc_hash::FxHashSet;

use crate::builtins::Builtin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// C precedence level; larger binds tighter.
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Or => 3,
            Self::And => 4,
            Self::Eq | Self::Ne => 5,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 6,
            Self::Add | Self::Sub => 7,
            Self::Mul | Self::Div | Self::Rem => 8,
        }
    }

    pub const fn is_comparison(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne)
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    pub fn result_dtype(&self, lhs: DType, rhs: DType) -> DType {
        if self.is_comparison() || self.is_logical() { DType::Bool } else { DType::promote(lhs, rhs) }
    }
}

/// Storage a place refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Param(usize),
    Local(usize),
}

/// A scalar lvalue: a scalar local, or one element of a tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub var: Var,
    pub indices: Vec<Expr>,
}

impl Place {
    pub fn scalar(var: Var) -> Self {
        Self { var, indices: Vec::new() }
    }

    /// Same indices on a different variable (used to address shadow storage).
    pub fn with_var(&self, var: Var) -> Self {
        Self { var, indices: self.indices.clone() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const { value: f64, dtype: DType },
    Load { place: Place, dtype: DType },
    Unary { op: UnaryOp, arg: Box<Expr>, dtype: DType },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, dtype: DType },
    Select { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr>, dtype: DType },
    Cast { arg: Box<Expr>, dtype: DType },
    Call { func: Builtin, args: Vec<Expr>, dtype: DType },
    /// `tape.pop()`; only valid as the whole right-hand side of an assignment.
    Pop { tape: usize },
}

impl Expr {
    pub fn constant(value: f64, dtype: DType) -> Self {
        Self::Const { value, dtype }
    }

    pub fn load(place: Place, dtype: DType) -> Self {
        Self::Load { place, dtype }
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        let dtype = match op {
            UnaryOp::Not => DType::Bool,
            UnaryOp::Neg | UnaryOp::Plus => DType::promote(arg.dtype(), arg.dtype()),
        };
        Self::Unary { op, arg: Box::new(arg), dtype }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        let dtype = op.result_dtype(lhs.dtype(), rhs.dtype());
        Self::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), dtype }
    }

    pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        let dtype = DType::promote(then.dtype(), otherwise.dtype());
        Self::Select { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise), dtype }
    }

    pub fn cast(arg: Expr, dtype: DType) -> Self {
        if arg.dtype() == dtype {
            return arg;
        }
        Self::Cast { arg: Box::new(arg), dtype }
    }

    pub fn call(func: Builtin, args: Vec<Expr>) -> Self {
        let arg_types: Vec<DType> = args.iter().map(Expr::dtype).collect();
        let dtype = func.result_dtype(&arg_types);
        Self::Call { func, args, dtype }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::Const { dtype, .. }
            | Self::Load { dtype, .. }
            | Self::Unary { dtype, .. }
            | Self::Binary { dtype, .. }
            | Self::Select { dtype, .. }
            | Self::Cast { dtype, .. }
            | Self::Call { dtype, .. } => *dtype,
            Self::Pop { .. } => DType::Float64,
        }
    }

    pub fn is_const(&self, value: f64) -> bool {
        matches!(self, Self::Const { value: v, .. } if *v == value)
    }

    /// Visit this expression and every subexpression, including index expressions.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Self::Const { .. } | Self::Pop { .. } => {}
            Self::Load { place, .. } => place.indices.iter().for_each(|i| i.visit(f)),
            Self::Unary { arg, .. } | Self::Cast { arg, .. } => arg.visit(f),
            Self::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Self::Select { cond, then, otherwise, .. } => {
                cond.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Self::Call { args, .. } => args.iter().for_each(|a| a.visit(f)),
        }
    }

    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= pred(e));
        found
    }

    /// Whether the value reads `var` anywhere.
    pub fn reads(&self, var: Var) -> bool {
        self.any(&|e| matches!(e, Self::Load { place, .. } if place.var == var))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Declares `local` at this point; tensors and uninitialised scalars start at zero.
    Decl { local: usize, init: Option<Expr> },
    Assign { place: Place, value: Expr },
    Push { tape: usize, value: Expr },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Box<Stmt>>, body: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Return,
}

impl Stmt {
    /// Visit this statement and every nested statement, outermost first.
    pub fn walk(&self, f: &mut impl FnMut(&Stmt)) {
        f(self);
        match self {
            Self::If { then, otherwise, .. } => {
                then.iter().for_each(|s| s.walk(f));
                otherwise.iter().for_each(|s| s.walk(f));
            }
            Self::For { init, step, body, .. } => {
                if let Some(init) = init {
                    init.walk(f);
                }
                if let Some(step) = step {
                    step.walk(f);
                }
                body.iter().for_each(|s| s.walk(f));
            }
            Self::While { body, .. } => body.iter().for_each(|s| s.walk(f)),
            Self::Decl { .. } | Self::Assign { .. } | Self::Push { .. } | Self::Return => {}
        }
    }

    /// Expressions owned directly by this statement (not by nested statements).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Decl { init, .. } => init.iter().collect(),
            Self::Assign { place, value } => place.indices.iter().chain(std::iter::once(value)).collect(),
            Self::Push { value, .. } => vec![value],
            Self::If { cond, .. } | Self::While { cond, .. } => vec![cond],
            Self::For { cond, .. } => cond.iter().collect(),
            Self::Return => Vec::new(),
        }
    }
}

/// Visit every statement of `body`, recursively.
pub fn walk_body(body: &[Stmt], f: &mut impl FnMut(&Stmt)) {
    body.iter().for_each(|s| s.walk(f));
}

/// `for (int i = 0; i < extent; i = i + 1) body`
pub fn counted_loop(counter: usize, extent: usize, body: Vec<Stmt>) -> Stmt {
    let var = Var::Local(counter);
    let load = Expr::load(Place::scalar(var), DType::Int32);
    Stmt::For {
        init: Some(Box::new(Stmt::Decl { local: counter, init: Some(Expr::constant(0.0, DType::Int32)) })),
        cond: Some(Expr::binary(BinaryOp::Lt, load.clone(), Expr::constant(extent as f64, DType::Int32))),
        step: Some(Box::new(Stmt::Assign {
            place: Place::scalar(var),
            value: Expr::binary(BinaryOp::Add, load, Expr::constant(1.0, DType::Int32)),
        })),
        body,
    }
}

/// Loop nest visiting every element of a `dims`-shaped tensor, one Int32 counter per axis.
///
/// With no axes the body comes back unchanged.
pub fn nest_loops(counters: &[usize], dims: &[usize], body: Vec<Stmt>) -> Vec<Stmt> {
    let mut body = body;
    for (&counter, &extent) in counters.iter().zip(dims).rev() {
        body = vec![counted_loop(counter, extent, body)];
    }
    body
}

/// Loads of `counters`, for indexing the element a [`nest_loops`] body is at.
pub fn counter_loads(counters: &[usize]) -> Vec<Expr> {
    counters.iter().map(|&c| Expr::load(Place::scalar(Var::Local(c)), DType::Int32)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// `T&`: written by the kernel, zero-filled before the call.
    Output,
    /// `const T&`
    Input,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub access: Access,
    pub ty: ShapeSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalKind {
    Scalar(DType),
    Tensor(ShapeSpec),
    Tape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub kind: LocalKind,
}

/// A monomorphic kernel: outputs first, then inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub locals: Vec<Local>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn outputs(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.access == Access::Output)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.access == Access::Input)
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs().count()
    }

    /// Slot shapes as `(outputs, inputs)`.
    pub fn signature(&self) -> (Vec<ShapeSpec>, Vec<ShapeSpec>) {
        (self.outputs().map(|p| p.ty.clone()).collect(), self.inputs().map(|p| p.ty.clone()).collect())
    }

    pub fn var_name(&self, var: Var) -> &str {
        match var {
            Var::Param(i) => &self.params[i].name,
            Var::Local(i) => &self.locals[i].name,
        }
    }

    /// Element type of `var`; tapes hold `double`.
    pub fn var_dtype(&self, var: Var) -> DType {
        match var {
            Var::Param(i) => self.params[i].ty.dtype(),
            Var::Local(i) => match &self.locals[i].kind {
                LocalKind::Scalar(d) => *d,
                LocalKind::Tensor(spec) => spec.dtype(),
                LocalKind::Tape => DType::Float64,
            },
        }
    }

    pub fn var_dims(&self, var: Var) -> &[usize] {
        match var {
            Var::Param(i) => self.params[i].ty.dims(),
            Var::Local(i) => match &self.locals[i].kind {
                LocalKind::Tensor(spec) => spec.dims(),
                LocalKind::Scalar(_) | LocalKind::Tape => &[],
            },
        }
    }

    pub fn uses_tape(&self) -> bool {
        self.locals.iter().any(|l| l.kind == LocalKind::Tape)
    }

    /// A name allocator seeded with every name this function already uses.
    pub fn namer(&self) -> Namer {
        let mut namer = Namer::new();
        for name in self.params.iter().map(|p| &p.name).chain(self.locals.iter().map(|l| &l.name)) {
            namer.reserve(name);
        }
        namer
    }
}

const RESERVED: &[&str] = &[
    "auto", "bool", "break", "case", "char", "class", "const", "continue", "default", "do", "double", "else", "enum",
    "extern", "false", "float", "for", "goto", "if", "inline", "int", "kernax", "long", "namespace", "new", "operator",
    "return", "short", "signed", "size_t", "sizeof", "static", "std", "struct", "switch", "tape", "template", "tensor",
    "this", "true", "typename", "union", "unsigned", "using", "void", "while",
];

/// Hands out identifiers that collide neither with each other nor with C++ keywords or builtins.
#[derive(Debug, Clone, Default)]
pub struct Namer {
    used: FxHashSet<String>,
}

impl Namer {
    pub fn new() -> Self {
        let mut used: FxHashSet<String> = RESERVED.iter().map(|s| s.to_string()).collect();
        used.extend(Builtin::ALL.iter().map(|b| b.name().to_string()));
        Self { used }
    }

    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// `base` if unused, else `base_1`, `base_2`, ...
    pub fn fresh(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.used.contains(candidate))
            .map(|name| {
                self.used.insert(name.clone());
                name
            })
            .unwrap_or_else(|| base.to_string())
    }
}

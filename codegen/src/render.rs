//! Print KIR back as kernel source.
//!
//! The output is itself valid kernel source (and valid C++ with the prelude),
//! so a rendered function can be translated again: that is how derived kernels
//! are compiled and how they are differentiated a second time.

use std::fmt::Write;

use kernax_dtype::{DType, ShapeSpec};

use crate::kir::{Access, Expr, Function, LocalKind, Place, Stmt, UnaryOp, Var};

const TERNARY_PREC: u8 = 2;
const UNARY_PREC: u8 = 9;
const PRIMARY_PREC: u8 = 10;

/// C++ spelling of a slot type, e.g. `kernax::tensor<float, 2, 3>`.
pub fn tensor_type(spec: &ShapeSpec) -> String {
    let mut ty = format!("kernax::tensor<{}", spec.dtype().c_style());
    for d in spec.dims() {
        let _ = write!(ty, ", {d}");
    }
    ty.push('>');
    ty
}

/// Literal spelling of `value` as a constant of type `dtype`.
pub fn literal(value: f64, dtype: DType) -> String {
    let suffix = if dtype == DType::Float32 { "f" } else { "" };
    let text = match dtype {
        DType::Bool => return if value != 0.0 { "true".into() } else { "false".into() },
        DType::Int32 => format!("{}", value as i64),
        DType::Int64 => format!("{}L", value as i64),
        _ if value.is_nan() => return format!("(0.0{suffix} / 0.0{suffix})"),
        _ if value.is_infinite() => {
            let sign = if value < 0.0 { "-" } else { "" };
            return format!("({sign}1.0{suffix} / 0.0{suffix})");
        }
        DType::Float32 => format!("{:?}f", value as f32),
        DType::Float64 => format!("{value:?}"),
    };
    if value.is_sign_negative() { format!("({text})") } else { text }
}

pub fn render(func: &Function) -> String {
    let mut r = Renderer { func, out: String::new(), indent: 0 };
    r.function();
    r.out
}

struct Renderer<'a> {
    func: &'a Function,
    out: String,
    indent: usize,
}

impl Renderer<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn function(&mut self) {
        let params: Vec<String> = self
            .func
            .params
            .iter()
            .map(|p| {
                let constness = if p.access == Access::Input { "const " } else { "" };
                format!("{constness}{}& {}", tensor_type(&p.ty), p.name)
            })
            .collect();
        self.line(&format!("void {}({}) {{", self.func.name, params.join(", ")));
        let func = self.func;
        self.indent += 1;
        self.block(&func.body);
        self.indent -= 1;
        self.line("}");
    }

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::If { cond, then, otherwise } => {
                self.line(&format!("if ({}) {{", self.expr(cond, 0)));
                self.indent += 1;
                self.block(then);
                self.indent -= 1;
                if !otherwise.is_empty() {
                    self.line("} else {");
                    self.indent += 1;
                    self.block(otherwise);
                    self.indent -= 1;
                }
                self.line("}");
            }
            Stmt::For { init, cond, step, body } => {
                let init = init.as_deref().map(|s| self.simple(s)).unwrap_or_default();
                let cond = cond.as_ref().map(|c| self.expr(c, 0)).unwrap_or_default();
                let step = step.as_deref().map(|s| self.simple(s)).unwrap_or_default();
                self.line(&format!("for ({init}; {cond}; {step}) {{"));
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::While { cond, body } => {
                self.line(&format!("while ({}) {{", self.expr(cond, 0)));
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Return => self.line("return;"),
            Stmt::Decl { .. } | Stmt::Assign { .. } | Stmt::Push { .. } => {
                let text = format!("{};", self.simple(stmt));
                self.line(&text);
            }
        }
    }

    /// A statement that fits a `for` header: declaration, assignment or push, without `;`.
    fn simple(&self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Decl { local, init } => {
                let local_def = &self.func.locals[*local];
                match (&local_def.kind, init) {
                    (LocalKind::Scalar(d), Some(init)) => {
                        format!("{} {} = {}", d.c_style(), local_def.name, self.expr(init, 0))
                    }
                    (LocalKind::Scalar(d), None) => format!("{} {}{{}}", d.c_style(), local_def.name),
                    (LocalKind::Tensor(spec), _) => format!("{} {}{{}}", tensor_type(spec), local_def.name),
                    (LocalKind::Tape, _) => format!("kernax::tape {}", local_def.name),
                }
            }
            Stmt::Assign { place, value } => format!("{} = {}", self.place(place), self.expr(value, 0)),
            Stmt::Push { tape, value } => format!("{}.push({})", self.func.locals[*tape].name, self.expr(value, 0)),
            _ => String::new(),
        }
    }

    fn place(&self, place: &Place) -> String {
        let mut text = self.func.var_name(place.var).to_string();
        for index in &place.indices {
            let _ = write!(text, "[{}]", self.expr(index, 0));
        }
        text
    }

    fn is_tensor_element(&self, place: &Place) -> bool {
        match place.var {
            Var::Param(_) => true,
            Var::Local(i) => matches!(self.func.locals[i].kind, LocalKind::Tensor(_)),
        }
    }

    fn expr(&self, expr: &Expr, min_prec: u8) -> String {
        let (text, prec) = match expr {
            Expr::Const { value, dtype } => (literal(*value, *dtype), PRIMARY_PREC),
            Expr::Load { place, .. } => (self.place(place), PRIMARY_PREC),
            Expr::Unary { op, arg, .. } => {
                let arg = self.expr(arg, UNARY_PREC);
                let text = match op {
                    UnaryOp::Neg if arg.starts_with('-') => format!("- {arg}"),
                    UnaryOp::Neg => format!("-{arg}"),
                    UnaryOp::Plus => format!("+{arg}"),
                    UnaryOp::Not => format!("!{arg}"),
                };
                (text, UNARY_PREC)
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let p = op.precedence();
                (format!("{} {} {}", self.expr(lhs, p), op.symbol(), self.expr(rhs, p + 1)), p)
            }
            Expr::Select { cond, then, otherwise, .. } => (
                format!(
                    "{} ? {} : {}",
                    self.expr(cond, TERNARY_PREC + 1),
                    self.expr(then, 0),
                    self.expr(otherwise, TERNARY_PREC)
                ),
                TERNARY_PREC,
            ),
            Expr::Cast { arg, dtype } => {
                (format!("static_cast<{}>({})", dtype.c_style(), self.expr(arg, 0)), PRIMARY_PREC)
            }
            Expr::Call { func, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| self.call_arg(a)).collect();
                (format!("std::{func}({})", args.join(", ")), PRIMARY_PREC)
            }
            Expr::Pop { tape } => (format!("{}.pop()", self.func.locals[*tape].name), PRIMARY_PREC),
        };
        if prec < min_prec { format!("({text})") } else { text }
    }

    /// Tensor elements are class objects in C++; pin the overload the builtin resolves to.
    fn call_arg(&self, arg: &Expr) -> String {
        match arg {
            Expr::Load { place, dtype } if self.is_tensor_element(place) => {
                format!("static_cast<{}>({})", dtype.c_style(), self.place(place))
            }
            _ => self.expr(arg, 0),
        }
    }
}

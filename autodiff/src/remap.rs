//! Rewrite the variables an expression refers to, for moving KIR between
//! parameter layouts.

use kernax_codegen::kir::{Expr, Place, Var};

pub fn place(p: &Place, f: &impl Fn(Var) -> Var) -> Place {
    Place { var: f(p.var), indices: p.indices.iter().map(|i| expr(i, f)).collect() }
}

pub fn expr(e: &Expr, f: &impl Fn(Var) -> Var) -> Expr {
    let boxed = |e: &Expr| Box::new(expr(e, f));
    match e {
        Expr::Const { .. } | Expr::Pop { .. } => e.clone(),
        Expr::Load { place: p, dtype } => Expr::Load { place: place(p, f), dtype: *dtype },
        Expr::Unary { op, arg, dtype } => Expr::Unary { op: *op, arg: boxed(arg), dtype: *dtype },
        Expr::Binary { op, lhs, rhs, dtype } => {
            Expr::Binary { op: *op, lhs: boxed(lhs), rhs: boxed(rhs), dtype: *dtype }
        }
        Expr::Select { cond, then, otherwise, dtype } => {
            Expr::Select { cond: boxed(cond), then: boxed(then), otherwise: boxed(otherwise), dtype: *dtype }
        }
        Expr::Cast { arg, dtype } => Expr::Cast { arg: boxed(arg), dtype: *dtype },
        Expr::Call { func, args, dtype } => {
            Expr::Call { func: *func, args: args.iter().map(|a| expr(a, f)).collect(), dtype: *dtype }
        }
    }
}

//! Expression constructors that fold the trivial cases derivatives produce
//! (`x * 1`, `0 + x`, integer constant arithmetic), so rendered derivative
//! kernels stay readable.

use kernax_codegen::kir::{BinaryOp, Expr, UnaryOp};
use kernax_dtype::DType;

pub fn lit(value: f64, dtype: DType) -> Expr {
    Expr::constant(value, dtype)
}

fn as_const(e: &Expr) -> Option<(f64, DType)> {
    match e {
        Expr::Const { value, dtype } => Some((*value, *dtype)),
        _ => None,
    }
}

/// `keep` stands for `op(keep, other)` only if that does not change the result type.
fn keeps_type(keep: &Expr, other: &Expr) -> bool {
    DType::promote(keep.dtype(), other.dtype()) == keep.dtype()
}

fn fold_int(op: BinaryOp, a: &Expr, b: &Expr) -> Option<Expr> {
    let ((x, dx), (y, dy)) = (as_const(a)?, as_const(b)?);
    let dtype = DType::promote(dx, dy);
    if !dtype.is_int() {
        return None;
    }
    let (x, y) = (x as i64, y as i64);
    let value = match op {
        BinaryOp::Add => x.checked_add(y)?,
        BinaryOp::Sub => x.checked_sub(y)?,
        BinaryOp::Mul => x.checked_mul(y)?,
        BinaryOp::Div => x.checked_div(y)?,
        _ => return None,
    };
    Some(lit(value as f64, dtype))
}

pub fn add(a: Expr, b: Expr) -> Expr {
    if let Some(folded) = fold_int(BinaryOp::Add, &a, &b) {
        return folded;
    }
    if b.is_const(0.0) && keeps_type(&a, &b) {
        return a;
    }
    if a.is_const(0.0) && keeps_type(&b, &a) {
        return b;
    }
    Expr::binary(BinaryOp::Add, a, b)
}

pub fn sub(a: Expr, b: Expr) -> Expr {
    if let Some(folded) = fold_int(BinaryOp::Sub, &a, &b) {
        return folded;
    }
    if b.is_const(0.0) && keeps_type(&a, &b) {
        return a;
    }
    Expr::binary(BinaryOp::Sub, a, b)
}

pub fn mul(a: Expr, b: Expr) -> Expr {
    if let Some(folded) = fold_int(BinaryOp::Mul, &a, &b) {
        return folded;
    }
    if b.is_const(1.0) && keeps_type(&a, &b) {
        return a;
    }
    if a.is_const(1.0) && keeps_type(&b, &a) {
        return b;
    }
    Expr::binary(BinaryOp::Mul, a, b)
}

pub fn div(a: Expr, b: Expr) -> Expr {
    if let Some(folded) = fold_int(BinaryOp::Div, &a, &b) {
        return folded;
    }
    if b.is_const(1.0) && keeps_type(&a, &b) {
        return a;
    }
    Expr::binary(BinaryOp::Div, a, b)
}

pub fn neg(a: Expr) -> Expr {
    match a {
        Expr::Const { value, dtype } => lit(-value, dtype),
        Expr::Unary { op: UnaryOp::Neg, arg, .. } => *arg,
        a => Expr::unary(UnaryOp::Neg, a),
    }
}

/// Sum of optional terms; `None` is a symbolic zero.
pub fn sum(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(add(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

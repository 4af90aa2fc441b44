use kernax_codegen::kir::{Expr, Place, Var};
use kernax_dtype::DType;

use crate::build::{add, div, lit, mul, neg, sub, sum};

fn x() -> Expr {
    Expr::load(Place::scalar(Var::Param(0)), DType::Float32)
}

#[test]
fn test_integer_constants_fold() {
    let int = |v: f64| lit(v, DType::Int32);
    // last iteration of `for (i = 0; i < 3; i += 1)`
    let span = sub(add(sub(int(3.0), int(0.0)), int(1.0)), int(1.0));
    let e = add(int(0.0), mul(sub(div(span, int(1.0)), int(1.0)), int(1.0)));
    assert_eq!(e, lit(2.0, DType::Int32));
    assert_eq!(add(lit(2.0, DType::Int32), lit(1.0, DType::Int64)), lit(3.0, DType::Int64));
    assert_eq!(div(lit(7.0, DType::Int64), lit(2.0, DType::Int64)), lit(3.0, DType::Int64));
}

#[test]
fn test_division_by_zero_is_not_folded() {
    assert!(matches!(div(lit(1.0, DType::Int32), lit(0.0, DType::Int32)), Expr::Binary { .. }));
}

#[test]
fn test_identities_keep_type() {
    assert_eq!(mul(x(), lit(1.0, DType::Float32)), x());
    assert_eq!(add(lit(0.0, DType::Int32), x()), x());
    // promotes to double, so the multiplication stays
    assert_eq!(mul(x(), lit(1.0, DType::Float64)).dtype(), DType::Float64);
}

#[test]
fn test_neg_cancels() {
    assert_eq!(neg(neg(x())), x());
    assert_eq!(neg(lit(2.5, DType::Float64)), lit(-2.5, DType::Float64));
}

#[test]
fn test_sum_of_symbolic_zeros() {
    assert_eq!(sum(None, None), None);
    assert_eq!(sum(Some(x()), None), Some(x()));
    assert!(matches!(sum(Some(x()), Some(x())), Some(Expr::Binary { .. })));
}

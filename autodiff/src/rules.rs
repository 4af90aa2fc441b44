//! Partial derivatives of the builtin math functions.

use std::f64::consts::FRAC_2_SQRT_PI;

use kernax_codegen::Builtin;
use kernax_codegen::kir::{BinaryOp, Expr};
use kernax_dtype::DType;
use smallvec::{SmallVec, smallvec};

use crate::build::{add, div, lit, mul, neg, sub};
use crate::error::*;

pub type Partials = SmallVec<[Expr; 2]>;

/// `∂ func(args) / ∂ args[i]` for every argument, in terms of the primal arguments.
///
/// `dtype` is the type of the call; constants in the result use it. `fmod` has no rule.
pub fn partials(func: Builtin, args: &[Expr], dtype: DType) -> Result<Partials> {
    let call = |f: Builtin, args: &[&Expr]| Expr::call(f, args.iter().map(|a| (*a).clone()).collect());
    let one = || lit(1.0, dtype);
    let zero = || lit(0.0, dtype);
    let x = &args[0];

    Ok(match func {
        Builtin::Sin => smallvec![call(Builtin::Cos, &[x])],
        Builtin::Cos => smallvec![neg(call(Builtin::Sin, &[x]))],
        Builtin::Tan => {
            let t = call(Builtin::Tan, &[x]);
            smallvec![add(one(), mul(t.clone(), t))]
        }
        Builtin::Exp => smallvec![call(Builtin::Exp, &[x])],
        Builtin::Log => smallvec![div(one(), x.clone())],
        Builtin::Sqrt => smallvec![div(lit(0.5, dtype), call(Builtin::Sqrt, &[x]))],
        Builtin::Tanh => {
            let t = call(Builtin::Tanh, &[x]);
            smallvec![sub(one(), mul(t.clone(), t))]
        }
        Builtin::Fabs | Builtin::Abs => {
            let negative = Expr::binary(BinaryOp::Lt, x.clone(), lit(0.0, x.dtype()));
            smallvec![Expr::select(negative, lit(-1.0, dtype), one())]
        }
        Builtin::Pow => {
            let y = &args[1];
            smallvec![
                mul(y.clone(), call(Builtin::Pow, &[x, &sub(y.clone(), one())])),
                mul(call(Builtin::Pow, &[x, y]), call(Builtin::Log, &[x])),
            ]
        }
        // ties go to the first argument
        Builtin::Fmin | Builtin::Fmax => {
            let op = if func == Builtin::Fmin { BinaryOp::Le } else { BinaryOp::Ge };
            let first = Expr::binary(op, x.clone(), args[1].clone());
            smallvec![Expr::select(first.clone(), one(), zero()), Expr::select(first, zero(), one())]
        }
        Builtin::Floor | Builtin::Ceil => smallvec![zero()],
        Builtin::Erf => {
            let gauss = call(Builtin::Exp, &[&neg(mul(x.clone(), x.clone()))]);
            smallvec![mul(lit(FRAC_2_SQRT_PI, dtype), gauss)]
        }
        Builtin::Fmod => return NoDerivativeSnafu { builtin: func }.fail(),
    })
}

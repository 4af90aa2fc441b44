use kernax_codegen::Builtin;
use kernax_codegen::kir::Expr;
use kernax_dtype::DType;
use test_case::test_case;

use crate::rules::partials;
use crate::test::*;
use crate::{Error, Mode, differentiate};

/// Tangent of `name(x, y)` along `(dx, dy)` through the forward transformation.
fn tangent(builtin: Builtin, x: f64, y: f64, dx: f64, dy: f64) -> f64 {
    let call = if builtin.arity() == 2 { format!("std::{builtin}(x, y)") } else { format!("std::{builtin}(x)") };
    let src = format!("void g(double& o, const double& x, const double& y) {{ o = {call}; }}");
    let func = translate(&src, "g", DType::Float64, &[&[]], &[&[], &[]]);
    let fwd = differentiate(&func, Mode::Forward).unwrap();
    let outs = run(&fwd, &[f64s(&[x], &[]), f64s(&[dx], &[]), f64s(&[y], &[]), f64s(&[dy], &[])]);
    outs[1].to_f64_vec()[0]
}

#[test_case(Builtin::Sin)]
#[test_case(Builtin::Cos)]
#[test_case(Builtin::Tan)]
#[test_case(Builtin::Exp)]
#[test_case(Builtin::Log)]
#[test_case(Builtin::Sqrt)]
#[test_case(Builtin::Tanh)]
#[test_case(Builtin::Fabs)]
#[test_case(Builtin::Pow)]
#[test_case(Builtin::Fmin)]
#[test_case(Builtin::Fmax)]
fn test_rule_matches_finite_difference(builtin: Builtin) {
    const H: f64 = 1e-6;
    let (x, y) = (0.7, 1.3);
    for (dx, dy) in [(1.0, 0.0), (0.0, 1.0), (0.5, -2.0)] {
        let f = |s: f64| builtin.eval(&[x + s * dx, y + s * dy]);
        let expected = (f(H) - f(-H)) / (2.0 * H);
        assert_close(&[tangent(builtin, x, y, dx, dy)], &[expected], 1e-6);
    }
}

#[test_case(Builtin::Floor)]
#[test_case(Builtin::Ceil)]
fn test_step_functions_are_flat(builtin: Builtin) {
    assert_eq!(tangent(builtin, 0.7, 0.0, 1.0, 0.0), 0.0);
}

#[test]
fn test_abs_sign() {
    assert_eq!(tangent(Builtin::Fabs, -3.0, 0.0, 1.0, 0.0), -1.0);
    assert_eq!(tangent(Builtin::Abs, 3.0, 0.0, 1.0, 0.0), 1.0);
}

#[test]
fn test_erf_slope_at_origin() {
    let slope = tangent(Builtin::Erf, 0.0, 0.0, 1.0, 0.0);
    assert!((slope - std::f64::consts::FRAC_2_SQRT_PI).abs() < 1e-12);
}

#[test]
fn test_fmod_has_no_rule() {
    let args = [Expr::constant(1.0, DType::Float64), Expr::constant(2.0, DType::Float64)];
    assert_eq!(partials(Builtin::Fmod, &args, DType::Float64), Err(Error::NoDerivative { builtin: Builtin::Fmod }));
}

#[test]
fn test_every_other_builtin_has_a_rule() {
    for builtin in Builtin::ALL.into_iter().filter(|b| b.has_derivative()) {
        let args: Vec<Expr> = (0..builtin.arity()).map(|_| Expr::constant(0.5, DType::Float32)).collect();
        let rules = partials(builtin, &args, DType::Float32).unwrap();
        assert_eq!(rules.len(), builtin.arity(), "{builtin}");
    }
}

use kernax_codegen::kir::Access;
use kernax_device::Buffer;
use kernax_dtype::DType;
use proptest::prelude::*;

use crate::test::*;
use crate::{Error, Mode, differentiate};

#[test]
fn test_add_constant_tangent_is_one() {
    let func = translate(ADD42, "add42", DType::Float32, &[&[2, 3]], &[&[2, 3]]);
    let fwd = differentiate(&func, Mode::Forward).unwrap();
    assert_eq!(fwd.name, "add42_fwd");

    let primal = Buffer::from_slice(&[1.0f32, -2.0, 3.5, 0.0, 7.0, 1e3], &[2, 3]).unwrap();
    let tangent = Buffer::ones(spec(&[2, 3], DType::Float32));
    let outs = run(&fwd, &[primal, tangent]);
    assert_eq!(outs[0].to_vec::<f32>().unwrap(), vec![43.0, 40.0, 45.5, 42.0, 49.0, 1042.0]);
    assert_eq!(outs[1].to_vec::<f32>().unwrap(), vec![1.0; 6]);
}

#[test]
fn test_parameters_come_in_pairs() {
    let fwd = differentiate(&mixed(), Mode::Forward).unwrap();
    let params: Vec<(&str, Access)> = fwd.params.iter().map(|p| (p.name.as_str(), p.access)).collect();
    assert_eq!(
        params,
        vec![
            ("o", Access::Output),
            ("d_o", Access::Output),
            ("p", Access::Output),
            ("d_p", Access::Output),
            ("x", Access::Input),
            ("d_x", Access::Input),
            ("y", Access::Input),
            ("d_y", Access::Input),
        ]
    );
}

#[test]
fn test_tangent_independent_of_primal() {
    let src = "void g(double& o, const double& x) { o = x + 42; }";
    let fwd = differentiate(&translate(src, "g", DType::Float64, &[&[]], &[&[]]), Mode::Forward).unwrap();
    for x in [-1e6, 0.0, 3.25] {
        let outs = run(&fwd, &[f64s(&[x], &[]), f64s(&[1.0], &[])]);
        assert_eq!(outs[1].to_f64_vec(), vec![1.0]);
    }
}

#[test]
fn test_shadow_tape_follows_pops() {
    let src = r#"
        void g(double& o, const kernax::tensor<double, 3>& x) {
            kernax::tape t;
            for (int i = 0; i < 3; i++) {
                t.push(x[i] * x[i]);
                t.push(i);
            }
            double acc = 0;
            for (int i = 0; i < 3; i++) {
                int n = t.pop();
                double v = t.pop();
                acc += v * n;
            }
            o = acc;
        }
    "#;
    let func = translate(src, "g", DType::Float64, &[&[]], &[&[3]]);
    let fwd = differentiate(&func, Mode::Forward).unwrap();
    assert!(fwd.locals.iter().any(|l| l.name == "sink"));

    let outs = run(&fwd, &[f64s(&[1.0, 2.0, 3.0], &[3]), f64s(&[1.0, 1.0, 1.0], &[3])]);
    // o = sum(i * x_i^2)
    assert_eq!(outs[0].to_f64_vec(), vec![22.0]);
    assert_eq!(outs[1].to_f64_vec(), vec![2.0 * 2.0 + 2.0 * 2.0 * 3.0]);
}

#[test]
fn test_floating_point_loop_counter() {
    let src = r#"
        void g(double& o, const double& x) {
            for (double s = x; s < 10; s += x) {
                o += s;
            }
        }
    "#;
    let fwd = differentiate(&translate(src, "g", DType::Float64, &[&[]], &[&[]]), Mode::Forward).unwrap();
    // s = 3, 6, 9
    let outs = run(&fwd, &[f64s(&[3.0], &[]), f64s(&[1.0], &[])]);
    assert_eq!(outs[0].to_f64_vec(), vec![18.0]);
    assert_eq!(outs[1].to_f64_vec(), vec![6.0]);
}

#[test]
fn test_while_and_return_are_supported() {
    let src = r#"
        void g(double& o, const double& x) {
            o = x;
            while (o < 100) {
                o = o * o;
                if (o > 50) {
                    return;
                }
            }
        }
    "#;
    let fwd = differentiate(&translate(src, "g", DType::Float64, &[&[]], &[&[]]), Mode::Forward).unwrap();
    // 3 -> 9 -> 81: o = x^4
    let outs = run(&fwd, &[f64s(&[3.0], &[]), f64s(&[1.0], &[])]);
    assert_eq!(outs[0].to_f64_vec(), vec![81.0]);
    assert_eq!(outs[1].to_f64_vec(), vec![108.0]);
}

#[test]
fn test_fmod_has_no_tangent() {
    let src = "void g(double& o, const double& x) { o = std::fmod(x, 2.0); }";
    let err = differentiate(&translate(src, "g", DType::Float64, &[&[]], &[&[]]), Mode::Forward).unwrap_err();
    assert!(matches!(err, Error::NoDerivative { .. }), "{err}");
}

#[test]
fn test_inactive_fmod_is_a_constant() {
    let src = "void g(double& o, const double& x) { o = x * std::fmod(7.0, 4.0); }";
    let fwd = differentiate(&translate(src, "g", DType::Float64, &[&[]], &[&[]]), Mode::Forward).unwrap();
    let outs = run(&fwd, &[f64s(&[2.0], &[]), f64s(&[1.0], &[])]);
    assert_eq!(outs[1].to_f64_vec(), vec![3.0]);
}

#[test]
fn test_integer_slots_are_inactive() {
    let src = "void g(double& o, int& m, const double& x, const int& n) { o = x * n; m = n + x; }";
    let outs = [spec(&[], DType::Float64), spec(&[], DType::Int32)];
    let ins = [spec(&[], DType::Float64), spec(&[], DType::Int32)];
    let func = kernax_codegen::translate(src, "g", &[], &outs, &ins).unwrap();
    let fwd = differentiate(&func, Mode::Forward).unwrap();

    let int = |v: i32| Buffer::from_slice(&[v], &[]).unwrap();
    // inputs: x, dx, n, dn; the tangent of n is ignored and m gets none
    let outs = run(&fwd, &[f64s(&[1.5], &[]), f64s(&[1.0], &[]), int(3), int(5)]);
    let values: Vec<f64> = outs.iter().map(|b| b.to_f64_vec()[0]).collect();
    assert_eq!(values, vec![4.5, 3.0, 4.0, 0.0]);
}

#[test]
fn test_rendered_tangent_kernel_translates_back() {
    let fwd = differentiate(&mixed(), Mode::Forward).unwrap();
    let again = retranslate(&fwd);
    let inputs = [f64s(&[0.3, -1.2, 2.0], &[3]), f64s(&[0.1, 0.2, 0.3], &[3]), f64s(&[0.7], &[]), f64s(&[1.0], &[])];
    let (a, b) = (run(&fwd, &inputs), run(&again, &inputs));
    for (a, b) in a.iter().zip(&b) {
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
    }
}

fn forward_matches_finite_difference(x: Vec<f64>, y: f64, dx: Vec<f64>, dy: f64) {
    let func = mixed();
    let fwd = differentiate(&func, Mode::Forward).unwrap();
    let (x, dx, y, dy) = (f64s(&x, &[3]), f64s(&dx, &[3]), f64s(&[y], &[]), f64s(&[dy], &[]));

    let expected = finite_difference(&func, &[x.clone(), y.clone()], &[dx.clone(), dy.clone()]);
    let outs = run(&fwd, &[x, dx, y, dy]);
    assert_close(&outs[1].to_f64_vec(), &expected[0], 1e-5);
    assert_close(&outs[3].to_f64_vec(), &expected[1], 1e-5);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_forward_matches_finite_difference(
        x in prop::collection::vec(-2.0f64..2.0, 3),
        y in 0.1f64..2.0,
        dx in prop::collection::vec(-1.0f64..1.0, 3),
        dy in -1.0f64..1.0,
    ) {
        forward_matches_finite_difference(x, y, dx, dy);
    }
}

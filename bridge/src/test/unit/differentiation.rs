use kernax_device::Buffer;
use kernax_dtype::{DType, ShapeSpec};
use kernax_ir::{Graph, trace};
use kernax_runtime::{Differentiator, KernelAbi, KernelSource, Toolchain};
use proptest::prelude::*;

use crate::error::Error;
use crate::test::{ADD42, FILL, Fixture, MYFN, SINE, SQUARE3, call, f32s, f64s, fixture, scalar, values};
use crate::{Bridge, Mode};

fn add42_graph(bridge: &Bridge) -> Graph {
    let add42 = call(ADD42, "add42", vec![f32s(&[2, 3])]);
    trace::<Error>(&[f32s(&[2, 3])], |b, xs| bridge.kernel_call(b, &add42, xs)).unwrap()
}

/// `sin(3 x^2)` as two chained kernels.
fn chained(bridge: &Bridge) -> Graph {
    trace::<Error>(&[f64s(&[])], |b, xs| {
        let a = bridge.kernel_call(b, &call(SQUARE3, "f", vec![f64s(&[])]), xs)?;
        bridge.kernel_call(b, &call(SINE, "f", vec![f64s(&[])]), &a)
    })
    .unwrap()
}

#[test]
fn test_forward_tangent_of_add42_is_one() {
    let Fixture { bridge, .. } = fixture();
    let graph = add42_graph(&bridge);
    let primal = Buffer::from_f64(f32s(&[2, 3]), &[1.0, -3.0, 0.5, 10.0, 0.0, 7.0]).unwrap();

    let (outputs, tangents) = bridge.jvp(&graph, &[primal], &[Buffer::ones(f32s(&[2, 3]))]).unwrap();
    assert_eq!(values(&outputs), vec![vec![43.0, 39.0, 42.5, 52.0, 42.0, 49.0]]);
    assert_eq!(values(&tangents), vec![vec![1.0; 6]]);
}

#[test]
fn test_reverse_cotangent_of_add42_is_one() {
    let Fixture { bridge, .. } = fixture();
    let graph = add42_graph(&bridge);
    let ones = Buffer::ones(f32s(&[2, 3]));

    let (outputs, gradients) = bridge.vjp(&graph, &[ones.clone()], &[ones]).unwrap();
    assert_eq!(values(&outputs), vec![vec![43.0; 6]]);
    assert_eq!(values(&gradients), vec![vec![1.0; 6]]);
}

#[test]
fn test_composition_follows_the_chain_rule() {
    let Fixture { bridge, .. } = fixture();
    let graph = chained(&bridge);
    let x: f64 = 0.4;

    // each kernel differentiated on its own
    let square = bridge.register(&KernelSource::new(SQUARE3, "f", []), &scalar_abi()).unwrap();
    let sine = bridge.register(&KernelSource::new(SINE, "f", []), &scalar_abi()).unwrap();
    let inner = square.derivative(Mode::Forward).unwrap().kernel().execute(&[scalar(x), scalar(1.0)]).unwrap();
    let outer = sine.derivative(Mode::Forward).unwrap().kernel().execute(&[inner[0].clone(), scalar(1.0)]).unwrap();
    let expected = inner[1].load(0) * outer[1].load(0);
    assert!((expected - (3.0 * x * x).cos() * 6.0 * x).abs() < 1e-12);

    let (_, tangents) = bridge.jvp(&graph, &[scalar(x)], &[scalar(1.0)]).unwrap();
    assert!((tangents[0].load(0) - expected).abs() < 1e-12);
    let (_, gradients) = bridge.vjp(&graph, &[scalar(x)], &[scalar(1.0)]).unwrap();
    assert!((gradients[0].load(0) - expected).abs() < 1e-12);
}

fn scalar_abi() -> KernelAbi {
    KernelAbi::new(vec![f64s(&[])], vec![f64s(&[])])
}

#[test]
fn test_original_jvp_and_vjp() {
    let Fixture { bridge, .. } = fixture();
    let s = f32s(&[2, 3]);
    let graph = trace::<Error>(&[s.clone()], |b, xs| {
        let ab = bridge.kernel_call(b, &call(MYFN, "myfn", vec![s.clone(), s.clone()]), xs)?;
        let c = bridge.kernel_call(b, &call(FILL, "f", vec![f32s(&[4, 4])]), &ab[..1])?;
        Ok(vec![ab[0], ab[1], c[0]])
    })
    .unwrap();
    let ones = Buffer::ones(s);

    let (primals, tangents) = bridge.jvp(&graph, &[ones.clone()], &[ones.clone()]).unwrap();
    assert_eq!(values(&primals), vec![vec![43.0; 6], vec![85.0; 6], vec![56.0; 16]]);
    assert_eq!(values(&tangents), vec![vec![1.0; 6], vec![1.0; 6], vec![0.0; 16]]);

    let (_, gradients) = bridge.vjp(&graph, &[ones], &primals).unwrap();
    assert_eq!(values(&gradients), vec![vec![43.0 + 85.0; 6]]);
}

#[test]
fn test_reverse_of_forward_of_affine_kernel_has_zero_second_derivative() {
    let Fixture { bridge, differentiator, .. } = fixture();
    let forward = kernax_ir::jvp(&add42_graph(&bridge)).unwrap();
    let s = f32s(&[2, 3]);
    let x = Buffer::from_f64(s.clone(), &[1.0, 2.0, 3.0, -1.0, -2.0, -3.0]).unwrap();

    // cotangent only on the tangent output: d(tangent)/dx is the second derivative
    let cotangents = [Buffer::zeros(s.clone()), Buffer::ones(s.clone())];
    let (_, gradients) = bridge.vjp(&forward, &[x, Buffer::ones(s.clone())], &cotangents).unwrap();
    assert_eq!(values(&gradients), vec![vec![0.0; 6], vec![1.0; 6]]);
    assert_eq!(differentiator.invocations(), 2);

    let primitive = bridge.register(&KernelSource::new(ADD42, "add42", []), &KernelAbi::new(vec![s.clone()], vec![s]));
    let mixed = primitive.unwrap().derivative(Mode::Forward).unwrap().derivative(Mode::Reverse).unwrap();
    assert_eq!(mixed.kernel().source().entry, "add42_fwd_rev");
}

fn cube_graph(bridge: &Bridge) -> Graph {
    let cube = "void f(double& o, const double& x) { o = x * x * x; }";
    trace::<Error>(&[f64s(&[])], |b, xs| bridge.kernel_call(b, &call(cube, "f", vec![f64s(&[])]), xs)).unwrap()
}

#[test]
fn test_nested_transforms_give_second_derivative() {
    let Fixture { bridge, .. } = fixture();
    let graph = cube_graph(&bridge);

    // jvp of the vjp along tx = 1 with cotangent 1: 6x
    let hvp = kernax_ir::jvp(&kernax_ir::vjp(&graph).unwrap()).unwrap();
    let outputs = bridge.execute(&hvp, &[scalar(2.0), scalar(1.0), scalar(1.0), scalar(0.0)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![8.0], vec![12.0], vec![12.0], vec![12.0]]);
}

#[test]
fn test_reverse_over_reverse_gives_second_derivative() {
    let Fixture { bridge, differentiator, .. } = fixture();
    let gradient = kernax_ir::vjp(&cube_graph(&bridge)).unwrap();

    // gradient(x, s) = (x^3, 3x^2 s); weighting only its second output gives (6xs, 3x^2)
    let primals = [scalar(2.0), scalar(1.0)];
    let (outputs, gradients) = bridge.vjp(&gradient, &primals, &[scalar(0.0), scalar(1.0)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![8.0], vec![12.0]]);
    assert_eq!(values(&gradients), vec![vec![12.0], vec![12.0]]);

    let (_, gradients) = bridge.vjp(&gradient, &[scalar(-1.5), scalar(2.0)], &[scalar(1.0), scalar(0.5)]).unwrap();
    // 3x^2 + 6xs/2 and 3x^2/2
    assert_eq!(values(&gradients), vec![vec![6.75 - 9.0], vec![3.375]]);
    // f_rev and f_rev_rev, each derived once
    assert_eq!(differentiator.invocations(), 2);
}

#[test]
fn test_differentiation_errors_are_lazy() {
    let Fixture { bridge, .. } = fixture();
    let halve = "void f(double& o, const double& x) { double t = x; while (t > 1) { t = t / 2; } o = t; }";
    let graph = trace::<Error>(&[f64s(&[])], |b, xs| bridge.kernel_call(b, &call(halve, "f", vec![f64s(&[])]), xs))
        .unwrap();

    assert_eq!(values(&bridge.execute(&graph, &[scalar(5.0)]).unwrap()), vec![vec![0.625]]);
    let (_, tangents) = bridge.jvp(&graph, &[scalar(5.0)], &[scalar(1.0)]).unwrap();
    assert_eq!(values(&tangents), vec![vec![0.125]]);

    let err = bridge.vjp(&graph, &[scalar(5.0)], &[scalar(1.0)]).unwrap_err();
    let Error::Differentiation { source } = &err else { panic!("unexpected {err:?}") };
    assert!(matches!(source, kernax_runtime::Error::Differentiation { mode: Mode::Reverse, .. }), "{source}");
    assert!(err.to_string().contains("while loops"), "{err}");
}

#[test]
fn test_integer_operands_are_inactive() {
    let Fixture { bridge, differentiator, .. } = fixture();
    let n = ShapeSpec::scalar(DType::Int32);
    let scale = call("void f(double& o, const double& x, const int& n) { o = x * n; }", "f", vec![f64s(&[])]);
    let three = Buffer::from_slice(&[3i32], &[]).unwrap();

    // with a constant x, a tangent on the integer operand alone is no reason to derive
    let fixed = trace::<Error>(&[n.clone()], |b, xs| {
        let x = b.constant(1.5, f64s(&[]));
        bridge.kernel_call(b, &scale, &[x, xs[0]])
    })
    .unwrap();
    let (outputs, tangents) = bridge.jvp(&fixed, &[three.clone()], &[Buffer::ones(n.clone())]).unwrap();
    assert_eq!(values(&outputs), vec![vec![4.5]]);
    assert_eq!(values(&tangents), vec![vec![0.0]]);
    assert_eq!(differentiator.invocations(), 0);

    let graph = trace::<Error>(&[f64s(&[]), n.clone()], |b, xs| bridge.kernel_call(b, &scale, xs)).unwrap();
    let primals = [scalar(1.5), three];
    let (_, tangents) = bridge.jvp(&graph, &primals, &[scalar(1.0), Buffer::ones(n)]).unwrap();
    assert_eq!(values(&tangents), vec![vec![3.0]]);
    let (_, gradients) = bridge.vjp(&graph, &primals, &[scalar(2.0)]).unwrap();
    assert_eq!(values(&gradients), vec![vec![6.0], vec![0.0]]);
    assert_eq!(differentiator.invocations(), 2);
}

#[test]
fn test_unread_input_gets_symbolic_zero_without_deriving() {
    let Fixture { bridge, differentiator, .. } = fixture();
    let fill = call(FILL, "f", vec![f32s(&[4, 4])]);
    let graph = trace::<Error>(&[f32s(&[2, 3])], |b, xs| bridge.kernel_call(b, &fill, xs)).unwrap();

    let (_, gradients) =
        bridge.vjp(&graph, &[Buffer::ones(f32s(&[2, 3]))], &[Buffer::ones(f32s(&[4, 4]))]).unwrap();
    assert_eq!(values(&gradients), vec![vec![0.0; 6]]);
    assert_eq!(differentiator.invocations(), 0);
}

#[test]
fn test_zero_tangents_skip_derivation() {
    let Fixture { bridge, differentiator, .. } = fixture();
    let graph = trace::<Error>(&[f64s(&[])], |b, xs| {
        let c = b.constant(2.0, f64s(&[]));
        let k = bridge.kernel_call(b, &call(SQUARE3, "f", vec![f64s(&[])]), &[c])?;
        Ok(vec![b.add(k[0], xs[0])?])
    })
    .unwrap();

    let (outputs, tangents) = bridge.jvp(&graph, &[scalar(1.0)], &[scalar(0.5)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![13.0]]);
    assert_eq!(values(&tangents), vec![vec![0.5]]);
    assert_eq!(differentiator.invocations(), 0);
}

#[test]
fn test_derivatives_are_derived_once() {
    let Fixture { bridge, differentiator, toolchain } = fixture();
    let graph = chained(&bridge);
    for _ in 0..3 {
        bridge.vjp(&graph, &[scalar(0.3)], &[scalar(1.0)]).unwrap();
    }
    assert_eq!(differentiator.invocations(), 2);
    assert_eq!(bridge.derivator().cached(), 2);
    assert_eq!(toolchain.invocations(), 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_chained_kernels_match_finite_differences(x in -1.5f64..1.5) {
        let Fixture { bridge, .. } = fixture();
        let graph = chained(&bridge);
        let h = 1e-6;
        let f = |x: f64| bridge.execute(&graph, &[scalar(x)]).unwrap()[0].load(0);
        let expected = (f(x + h) - f(x - h)) / (2.0 * h);

        let (_, tangents) = bridge.jvp(&graph, &[scalar(x)], &[scalar(1.0)]).unwrap();
        let (_, gradients) = bridge.vjp(&graph, &[scalar(x)], &[scalar(1.0)]).unwrap();
        prop_assert!((tangents[0].load(0) - expected).abs() < 1e-5);
        prop_assert!((gradients[0].load(0) - tangents[0].load(0)).abs() < 1e-12);
    }
}

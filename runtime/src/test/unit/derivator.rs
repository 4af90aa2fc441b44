use std::sync::Arc;

use kernax_device::Buffer;
use kernax_dtype::{DType, ShapeSpec};

use crate::compiler::KernelCompiler;
use crate::derivator::Derivator;
use crate::differentiator::{Differentiator, SourceDifferentiator};
use crate::error::Error;
use crate::source::{KernelAbi, KernelSource};
use crate::test::{add42, cube, interp, scalar, values};
use crate::toolchain::{InterpToolchain, Toolchain};
use crate::{Mode, RuntimeConfig};

struct Fixture {
    toolchain: Arc<InterpToolchain>,
    differentiator: Arc<SourceDifferentiator>,
    derivator: Derivator,
}

fn fixture() -> Fixture {
    let toolchain = interp();
    let differentiator = Arc::new(SourceDifferentiator::new());
    let compiler = Arc::new(KernelCompiler::new(toolchain.clone()));
    let derivator = Derivator::new(compiler, differentiator.clone(), 4);
    Fixture { toolchain, differentiator, derivator }
}

fn ones(spec: &ShapeSpec) -> Buffer {
    Buffer::ones(spec.clone())
}

#[test]
fn test_forward_tangent_of_add42_is_one() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = add42();
    let fwd = derivator.derive(&source, &abi, Mode::Forward, 1).unwrap();

    assert_eq!(fwd.source().entry, "add42_fwd");
    assert_eq!(fwd.abi(), &abi.derived(Mode::Forward));

    let primal = Buffer::from_f64(abi.inputs[0].clone(), &[1.0, -5.0, 0.25, 100.0, 0.0, -1.0]).unwrap();
    let outputs = fwd.execute(&[primal, ones(&abi.inputs[0])]).unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![43.0, 37.0, 42.25, 142.0, 42.0, 41.0]);
    assert_eq!(outputs[1].to_vec::<f32>().unwrap(), vec![1.0; 6]);
}

#[test]
fn test_reverse_cotangent_of_add42_is_one() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = add42();
    let rev = derivator.derive(&source, &abi, Mode::Reverse, 1).unwrap();

    assert_eq!(rev.source().entry, "add42_rev");
    assert_eq!(rev.abi(), &abi.derived(Mode::Reverse));

    let outputs = rev.execute(&[ones(&abi.inputs[0]), ones(&abi.outputs[0])]).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![1.0; 6]);
}

#[test]
fn test_derivation_is_cached() {
    let Fixture { toolchain, differentiator, derivator } = fixture();
    let (source, abi) = add42();

    let first = derivator.derive(&source, &abi, Mode::Forward, 1).unwrap();
    let second = derivator.derive(&source, &abi, Mode::Forward, 1).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(differentiator.invocations(), 1);
    assert_eq!(toolchain.invocations(), 1);

    derivator.derive(&source, &abi, Mode::Reverse, 1).unwrap();
    assert_eq!(differentiator.invocations(), 2);
    assert_eq!(derivator.cached(), 2);

    // the order-2 chain reuses the cached first step
    derivator.derive(&source, &abi, Mode::Forward, 2).unwrap();
    assert_eq!(differentiator.invocations(), 3);
}

#[test]
fn test_derived_source_compiles_like_user_source() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = cube();
    let step = derivator.derive_source(&source, &abi, Mode::Reverse).unwrap();

    let direct = derivator.compiler().compile(&step.source, &step.abi).unwrap();
    let derived = derivator.derive(&source, &abi, Mode::Reverse, 1).unwrap();
    assert!(Arc::ptr_eq(&direct, &derived));
    assert_eq!(values(&derived.execute(&[scalar(2.0), scalar(1.0)]).unwrap()), vec![vec![12.0]]);
}

#[test]
fn test_second_order_forward() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = cube();
    let fwd2 = derivator.derive(&source, &abi, Mode::Forward, 2).unwrap();

    assert_eq!(fwd2.abi().inputs.len(), 4);
    assert_eq!(fwd2.source().entry, "cube_fwd_fwd");
    // x = 2 with unit tangents in both directions: x^3, 3x^2, 3x^2, 6x
    let outputs = fwd2.execute(&[scalar(2.0), scalar(1.0), scalar(1.0), scalar(0.0)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![8.0], vec![12.0], vec![12.0], vec![12.0]]);
}

#[test]
fn test_reverse_of_forward_is_a_plain_derivation() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = add42();
    let fwd = derivator.derive_source(&source, &abi, Mode::Forward).unwrap();
    let mixed = derivator.derive(&fwd.source, &fwd.abi, Mode::Reverse, 1).unwrap();

    assert_eq!(mixed.source().entry, "add42_fwd_rev");
    let s = &abi.inputs[0];
    let inputs = [ones(s), ones(s), Buffer::zeros(s.clone()), ones(s)];
    let outputs = mixed.execute(&inputs).unwrap();
    // d(out)/d(in) = 1 and every second derivative of an affine kernel vanishes
    assert_eq!(outputs[0].to_f64_vec(), vec![0.0; 6]);
    assert_eq!(outputs[1].to_f64_vec(), vec![1.0; 6]);
}

#[test]
fn test_second_order_reverse_of_add42() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = add42();
    let rev2 = derivator.derive(&source, &abi, Mode::Reverse, 2).unwrap();

    assert_eq!(rev2.source().entry, "add42_rev_rev");
    assert_eq!(rev2.abi(), &abi.derived(Mode::Reverse).derived(Mode::Reverse));
    // add42_rev maps the output cotangent straight through, whatever the primal
    let s = &abi.inputs[0];
    let cotangent = Buffer::from_f64(s.clone(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let outputs = rev2.execute(&[ones(s), ones(s), cotangent]).unwrap();
    assert_eq!(outputs[0].to_f64_vec(), vec![0.0; 6]);
    assert_eq!(outputs[1].to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_second_order_reverse_of_cube() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = cube();
    let rev2 = derivator.derive(&source, &abi, Mode::Reverse, 2).unwrap();

    assert_eq!(rev2.source().entry, "cube_rev_rev");
    // cube_rev(x, s) = 3x^2 s, so its gradient along cotangent c is (6xsc, 3x^2 c)
    let outputs = rev2.execute(&[scalar(2.0), scalar(1.0), scalar(1.0)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![12.0], vec![12.0]]);
    let outputs = rev2.execute(&[scalar(3.0), scalar(2.0), scalar(0.5)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![18.0], vec![13.5]]);
}

#[test]
fn test_order_bounds() {
    let Fixture { differentiator, derivator, .. } = fixture();
    let (source, abi) = add42();
    for order in [0, 5] {
        let err = derivator.derive(&source, &abi, Mode::Forward, order).unwrap_err();
        assert!(matches!(err, Error::InvalidOrder { max_order: 4, .. }), "{err}");
    }
    assert_eq!(differentiator.invocations(), 0);

    let config = RuntimeConfig::builder().max_order(1).build();
    let compiler = Arc::new(KernelCompiler::from_config(&config));
    let strict = Derivator::from_config(compiler, &config);
    assert!(strict.derive(&source, &abi, Mode::Forward, 1).is_ok());
    assert!(matches!(strict.derive(&source, &abi, Mode::Forward, 2), Err(Error::InvalidOrder { order: 2, .. })));
}

#[test]
fn test_untransformable_kernel_is_differentiation_error() {
    let Fixture { derivator, .. } = fixture();
    let s = ShapeSpec::scalar(DType::Float64);
    let abi = KernelAbi::new(vec![s.clone()], vec![s]);
    let source = KernelSource::new(
        "void f(double& o, const double& x) { double t = x; while (t > 1) { t = t / 2; } o = t; }",
        "f",
        [],
    );

    let err = derivator.derive(&source, &abi, Mode::Reverse, 1).unwrap_err();
    let Error::Differentiation { entry, mode, .. } = &err else { panic!("unexpected {err:?}") };
    assert_eq!((entry.as_str(), *mode), ("f", Mode::Reverse));
    assert!(err.to_string().contains("while loops"), "{err}");
    assert_eq!(derivator.cached(), 0);

    // forward mode handles the same loop
    let fwd = derivator.derive(&source, &abi, Mode::Forward, 1).unwrap();
    assert_eq!(values(&fwd.execute(&[scalar(5.0), scalar(1.0)]).unwrap()), vec![vec![0.625], vec![0.125]]);
}

#[test]
fn test_integer_slot_is_inactive() {
    let Fixture { derivator, .. } = fixture();
    let abi = KernelAbi::new(vec![ShapeSpec::scalar(DType::Float64)], vec![ShapeSpec::scalar(DType::Int32)]);
    let source = KernelSource::new("void f(double& o, const int& n) { o = n; }", "f", []);
    let int = |v: i32| Buffer::from_slice(&[v], &[]).unwrap();

    let fwd = derivator.derive(&source, &abi, Mode::Forward, 1).unwrap();
    assert_eq!(values(&fwd.execute(&[int(3), int(7)]).unwrap()), vec![vec![3.0], vec![0.0]]);
    let rev = derivator.derive(&source, &abi, Mode::Reverse, 1).unwrap();
    assert_eq!(values(&rev.execute(&[int(3), scalar(1.0)]).unwrap()), vec![vec![0.0]]);
}

#[test]
fn test_broken_source_is_compilation_error() {
    let Fixture { derivator, .. } = fixture();
    let (source, abi) = cube();
    let broken = KernelSource { source: source.source.replace(';', ""), ..source };
    assert!(matches!(derivator.derive(&broken, &abi, Mode::Forward, 1), Err(Error::Compilation { .. })));
}

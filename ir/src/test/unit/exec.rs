use std::sync::Arc;

use kernax_device::Buffer;
use kernax_dtype::{DType, ShapeSpec};

use crate::error::Error;
use crate::graph::trace;
use crate::program::{Instruction, lower};
use crate::test::{Broken, Scale, buffer, f64s, run, scalar};
use crate::{Executor, execute};

#[test]
fn test_elementwise_arithmetic() {
    let graph = trace::<Error>(&[f64s(&[3]), f64s(&[3])], |b, xs| {
        let (x, y) = (xs[0], xs[1]);
        let s = b.sin(x)?;
        let p = b.mul(s, y)?;
        let e = b.exp(x)?;
        let q = b.div(e, y)?;
        Ok(vec![b.sub(p, q)?])
    })
    .unwrap();

    let xs = [0.5, -1.0, 2.0];
    let ys = [1.5, 2.0, -0.25];
    let out = run(&graph, &[buffer(&[3], &xs), buffer(&[3], &ys)]);
    for i in 0..3 {
        let expected = xs[i].sin() * ys[i] - xs[i].exp() / ys[i];
        assert!((out[0][i] - expected).abs() < 1e-12);
    }
}

#[test]
fn test_results_are_stored_in_register_dtype() {
    let spec = ShapeSpec::new([2], DType::Float32);
    let graph = trace::<Error>(&[spec.clone()], |b, xs| {
        let third = b.constant(1.0 / 3.0, spec.clone());
        Ok(vec![b.add(xs[0], third)?])
    })
    .unwrap();

    let out = execute(&graph, &[Buffer::from_slice(&[1.0f32, 2.0], &[2]).unwrap()]).unwrap();
    assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![1.0 + 1.0f32 / 3.0, 2.0 + 1.0f32 / 3.0]);
}

#[test]
fn test_foreign_call_is_a_single_instruction() {
    let graph = trace::<Error>(&[f64s(&[2])], |b, xs| Ok(vec![Scale::apply(b, 3.0, xs[0])?])).unwrap();
    let program = lower(&graph).unwrap();

    assert_eq!(program.instructions.len(), 1);
    let Instruction::ForeignCall { target, operands, results, reads } = &program.instructions[0] else {
        panic!("expected a foreign call, got {}", program.instructions[0]);
    };
    assert_eq!(target.symbol(), "scale_fn");
    assert_eq!((operands.len(), results.len()), (1, 1));
    assert_eq!(reads, &[true]);
    assert!(program.to_string().contains("r1 = call scale_fn(r0)"), "{program}");

    assert_eq!(run(&graph, &[buffer(&[2], &[1.0, -2.0])]), vec![vec![3.0, -6.0]]);
}

#[test]
fn test_dead_nodes_are_not_lowered() {
    let graph = trace::<Error>(&[f64s(&[])], |b, xs| {
        b.bind(Arc::new(Broken), &[xs[0]])?;
        Ok(vec![b.cos(xs[0])?])
    })
    .unwrap();

    let program = lower(&graph).unwrap();
    assert_eq!(program.instructions.len(), 1);
    assert_eq!(run(&graph, &[scalar(0.0)]), vec![vec![1.0]]);
}

#[test]
fn test_lowering_failure_carries_the_primitive_error() {
    let graph = trace::<Error>(&[f64s(&[])], |b, xs| b.bind(Arc::new(Broken), &[xs[0]])).unwrap();
    let err = lower(&graph).unwrap_err();
    assert!(matches!(err, Error::PrimitiveRule { rule: "lower", .. }), "{err}");
    assert_eq!(err.into_cause().unwrap().to_string(), "no lowering");
}

#[test]
fn test_inputs_are_checked() {
    let graph = trace::<Error>(&[f64s(&[2])], |b, xs| Ok(vec![b.neg(xs[0])?])).unwrap();
    let program = lower(&graph).unwrap();
    let executor = Executor::new();

    let err = executor.run(&program, &[]).unwrap_err();
    assert!(matches!(err, Error::InputCount { expected: 1, actual: 0 }), "{err}");

    let err = executor.run(&program, &[buffer(&[3], &[1.0, 2.0, 3.0])]).unwrap_err();
    assert!(matches!(err, Error::InputMismatch { index: 0, .. }), "{err}");
}

#[test]
fn test_outputs_may_alias_inputs() {
    let graph = trace::<Error>(&[f64s(&[2])], |_, xs| Ok(vec![xs[0], xs[0]])).unwrap();
    assert_eq!(run(&graph, &[buffer(&[2], &[4.0, 5.0])]), vec![vec![4.0, 5.0], vec![4.0, 5.0]]);
}

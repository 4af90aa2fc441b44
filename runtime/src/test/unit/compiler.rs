use std::sync::Arc;

use kernax_codegen::ArgUsage;
use kernax_device::Buffer;
use kernax_dtype::DType;

use crate::compiler::KernelCompiler;
use crate::error::Error;
use crate::source::{KernelAbi, KernelSource};
use crate::toolchain::Toolchain;
use crate::test::{FailingToolchain, SlowToolchain, add42, interp, spec, values};

#[test]
fn test_add42_round_trip() {
    let compiler = KernelCompiler::new(interp());
    let (source, abi) = add42();
    let kernel = compiler.compile(&source, &abi).unwrap();

    let outputs = kernel.execute(&[Buffer::ones(abi.inputs[0].clone())]).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].dims(), &[2, 3]);
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![43.0; 6]);
}

#[test]
fn test_second_compile_reuses_cache() {
    let toolchain = interp();
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    let first = compiler.compile(&source, &abi).unwrap();
    let second = compiler.compile(&source, &abi).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(toolchain.invocations(), 1);
    assert_eq!(compiler.cached(), 1);

    let input = Buffer::from_f64(abi.inputs[0].clone(), &[1.0, -2.0, 0.5, 3.0, 0.0, 7.0]).unwrap();
    assert_eq!(first.execute(std::slice::from_ref(&input)).unwrap(), second.execute(&[input]).unwrap());
}

#[test]
fn test_every_field_is_part_of_the_key() {
    let toolchain = interp();
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    compiler.compile(&source, &abi).unwrap();
    let flagged = KernelSource { flags: vec!["-DUNUSED=1".to_owned()], ..source.clone() };
    compiler.compile(&flagged, &abi).unwrap();
    let wider = KernelAbi::new(vec![spec(&[2, 4], DType::Float32)], vec![spec(&[2, 4], DType::Float32)]);
    compiler.compile(&source, &wider).unwrap();
    let edited = KernelSource { source: source.source.replace("+ 42;", "+ 43;"), ..source };
    assert!(edited.source.contains("void add42(") && edited.source.contains("+ 43;"), "{}", edited.source);
    let outputs = compiler.compile(&edited, &abi).unwrap().execute(&[Buffer::ones(abi.inputs[0].clone())]).unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![44.0; 6]);

    assert_eq!(toolchain.invocations(), 4);
    assert_eq!(compiler.cached(), 4);
}

#[test]
fn test_syntax_error_fails_at_compile_time_and_is_not_cached() {
    let toolchain = interp();
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();
    let broken = KernelSource { source: source.source.replace("in0[j][k] + 42;", "in0[j][k] + ;"), ..source };

    let err = compiler.compile(&broken, &abi).unwrap_err();
    assert!(matches!(&err, Error::Compilation { entry, .. } if entry == "add42"));
    assert!(err.to_string().contains("kernel.cpp:6:"), "{err}");
    assert_eq!(compiler.cached(), 0);
    assert_eq!(toolchain.invocations(), 0);

    // deterministic: the same request fails the same way
    assert_eq!(compiler.compile(&broken, &abi).unwrap_err().to_string(), err.to_string());
}

#[test]
fn test_unknown_entry_is_compilation_error() {
    let compiler = KernelCompiler::new(interp());
    let (source, abi) = add42();
    let err = compiler.compile(&KernelSource { entry: "add43".to_owned(), ..source }, &abi).unwrap_err();
    let Error::Compilation { diagnostic, .. } = err else { panic!("unexpected {err:?}") };
    assert!(diagnostic.contains("no function named 'add43'"), "{diagnostic}");
}

#[test]
fn test_shapes_are_checked_before_compiling() {
    let toolchain = interp();
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    let no_outputs = KernelAbi::new(vec![], abi.inputs.clone());
    assert!(matches!(compiler.compile(&source, &no_outputs), Err(Error::InvalidShape { .. })));

    let empty = KernelSource { source: "  \n".to_owned(), ..source };
    assert!(matches!(compiler.compile(&empty, &abi), Err(Error::EmptySource { .. })));
    assert_eq!(toolchain.invocations(), 0);
}

#[test]
fn test_execute_checks_operands_against_abi() {
    let compiler = KernelCompiler::new(interp());
    let (source, abi) = add42();
    let kernel = compiler.compile(&source, &abi).unwrap();

    let err = kernel.execute(&[]).unwrap_err();
    assert!(matches!(err, Error::OperandCount { role: "inputs", expected: 1, actual: 0, .. }));

    let wrong = Buffer::ones(spec(&[3, 2], DType::Float32));
    let err = kernel.execute(&[wrong]).unwrap_err();
    assert!(matches!(err, Error::OperandMismatch { role: "input", index: 0, .. }));

    let wrong_dtype = Buffer::ones(spec(&[2, 3], DType::Float64));
    assert!(kernel.execute(&[wrong_dtype]).is_err());
}

#[test]
fn test_execute_into_zero_fills_outputs() {
    let compiler = KernelCompiler::new(interp());
    let source = KernelSource::new(
        "void f(kernax::tensor<float, 3>& o, const kernax::tensor<float, 3>& x) { o[1] = x[1]; }",
        "f",
        [],
    );
    let s = spec(&[3], DType::Float32);
    let kernel = compiler.compile(&source, &KernelAbi::new(vec![s.clone()], vec![s.clone()])).unwrap();

    let mut outputs = vec![Buffer::full(s.clone(), 9.0)];
    kernel.execute_into(&mut outputs, &[Buffer::full(s, 2.0)]).unwrap();
    assert_eq!(values(&outputs), vec![vec![0.0, 2.0, 0.0]]);
}

#[test]
fn test_effects_are_recorded() {
    let compiler = KernelCompiler::new(interp());
    let source = KernelSource::new(
        "template<typename T1, typename T2>\nvoid f(T1& out0, const T2& in1) { out0 = 56.0f; }",
        "f",
        [],
    );
    let abi = KernelAbi::new(vec![spec(&[2], DType::Float32)], vec![spec(&[4], DType::Float64)]);
    let kernel = compiler.compile(&source, &abi).unwrap();

    assert_eq!(kernel.effects().inputs, vec![ArgUsage::ReadNone]);
    assert_eq!(kernel.effects().outputs_written, vec![true]);
    assert!(kernel.symbol().starts_with("kernax_adapter_"));
    assert_eq!(kernel.execute(&[Buffer::zeros(abi.inputs[0].clone())]).unwrap()[0].to_f64_vec(), vec![56.0; 2]);
}

#[test]
fn test_concurrent_requests_coalesce() {
    let toolchain = Arc::new(SlowToolchain::default());
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    let kernels: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| compiler.compile(&source, &abi).unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(toolchain.invocations(), 1);
    assert!(kernels.iter().all(|k| Arc::ptr_eq(k, &kernels[0])));
}

#[test]
fn test_concurrent_failure_is_shared_and_not_cached() {
    let toolchain = Arc::new(FailingToolchain::default());
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| compiler.compile(&source, &abi))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in &results {
        let Err(Error::Compilation { diagnostic, .. }) = result else { panic!("unexpected {result:?}") };
        assert_eq!(diagnostic, "linker exploded");
    }
    assert_eq!(toolchain.invocations(), 1);
    assert_eq!(compiler.cached(), 0);

    assert!(compiler.compile(&source, &abi).is_err());
    assert_eq!(toolchain.invocations(), 2);
}

#[test]
fn test_invalidate_forces_recompilation() {
    let toolchain = interp();
    let compiler = KernelCompiler::new(toolchain.clone());
    let (source, abi) = add42();

    let before = compiler.compile(&source, &abi).unwrap();
    compiler.invalidate();
    assert_eq!(compiler.cached(), 0);
    let after = compiler.compile(&source, &abi).unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.key(), after.key());
    assert_eq!(toolchain.invocations(), 2);
}

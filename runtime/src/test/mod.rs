pub mod unit;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kernax_device::Buffer;
use kernax_dtype::{DType, ShapeSpec};

use crate::error::*;
use crate::source::{KernelAbi, KernelSource};
use crate::toolchain::{CompilerInvocation, InterpToolchain, NativeUnit, Toolchain};

/// `out0 = in0 + 42` over an `N x M` float tensor.
pub const ADD42: &str = r#"
template<std::size_t N, std::size_t M>
void add42(kernax::tensor<float, N, M>& out0, const kernax::tensor<float, N, M>& in0) {
  for (int j=0; j<N; j++) {
    for (int k=0; k<M; k++) {
        out0[j][k] = in0[j][k] + 42;
    }
  }
}
"#;

/// `o = x * x * x` on scalars.
pub const CUBE: &str = "void cube(double& o, const double& x) { o = x * x * x; }";

pub fn spec(dims: &[usize], dtype: DType) -> ShapeSpec {
    ShapeSpec::new(dims.iter().copied(), dtype)
}

pub fn add42() -> (KernelSource, KernelAbi) {
    let s = spec(&[2, 3], DType::Float32);
    (KernelSource::new(ADD42, "add42", []), KernelAbi::new(vec![s.clone()], vec![s]))
}

pub fn cube() -> (KernelSource, KernelAbi) {
    let s = ShapeSpec::scalar(DType::Float64);
    (KernelSource::new(CUBE, "cube", []), KernelAbi::new(vec![s.clone()], vec![s]))
}

pub fn scalar(value: f64) -> Buffer {
    Buffer::from_f64(ShapeSpec::scalar(DType::Float64), &[value]).unwrap()
}

pub fn values(buffers: &[Buffer]) -> Vec<Vec<f64>> {
    buffers.iter().map(Buffer::to_f64_vec).collect()
}

/// Interpreter that takes its time, so concurrent callers overlap.
#[derive(Default)]
pub struct SlowToolchain {
    inner: InterpToolchain,
}

impl Toolchain for SlowToolchain {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn compile(&self, invocation: &CompilerInvocation<'_>) -> Result<Box<dyn NativeUnit>> {
        std::thread::sleep(Duration::from_millis(50));
        self.inner.compile(invocation)
    }

    fn invocations(&self) -> usize {
        self.inner.invocations()
    }
}

/// Rejects everything after a short delay.
#[derive(Default)]
pub struct FailingToolchain {
    invocations: AtomicUsize,
}

impl Toolchain for FailingToolchain {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn compile(&self, invocation: &CompilerInvocation<'_>) -> Result<Box<dyn NativeUnit>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(50));
        CompilationSnafu { entry: invocation.source.entry.clone(), diagnostic: "linker exploded" }.fail()
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

pub fn interp() -> Arc<InterpToolchain> {
    Arc::new(InterpToolchain::new())
}

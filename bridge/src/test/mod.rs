pub mod unit;

use std::sync::Arc;

use kernax_device::Buffer;
use kernax_dtype::{DType, ShapeSpec};
use kernax_runtime::{Derivator, InterpToolchain, KernelCompiler, SourceDifferentiator};

use crate::{Bridge, BridgeConfig, KernelCall};

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

/// Two outputs from one input, the second with fixed extents.
pub const MYFN: &str = r#"
template<std::size_t N, std::size_t M>
void myfn(kernax::tensor<float, N, M>& out0,
          kernax::tensor<float, N, M>& out1,
          const kernax::tensor<float, N, M>& in0) {
  for (int j=0; j<N; j++) {
    for (int k=0; k<M; k++) {
        out0[j][k] = in0[j][k] + 42;
    }
  }
  for (int j=0; j<2; j++) {
    for (int k=0; k<3; k++) {
        out1[j][k] = in0[j][k] + 2 * 42;
    }
  }
}
"#;

/// Fills its output and never looks at the input.
pub const FILL: &str = r#"
template<typename T1, typename T2>
void f(T1& out0, const T2& in1) {
  out0 = 56.0f;
}
"#;

pub const SQUARE3: &str = "void f(double& o, const double& x) { o = 3 * x * x; }";
pub const SINE: &str = "void f(double& o, const double& x) { o = sin(x); }";

pub struct Fixture {
    pub toolchain: Arc<InterpToolchain>,
    pub differentiator: Arc<SourceDifferentiator>,
    pub bridge: Bridge,
}

pub fn fixture() -> Fixture {
    fixture_with(BridgeConfig::default())
}

pub fn fixture_with(config: BridgeConfig) -> Fixture {
    let toolchain = Arc::new(InterpToolchain::new());
    let differentiator = Arc::new(SourceDifferentiator::new());
    let compiler = Arc::new(KernelCompiler::new(toolchain.clone()));
    let derivator = Arc::new(Derivator::new(compiler, differentiator.clone(), config.runtime.max_order));
    Fixture { toolchain, differentiator, bridge: Bridge::with_derivator(config, derivator) }
}

pub fn f32s(dims: &[usize]) -> ShapeSpec {
    ShapeSpec::new(dims.iter().copied(), DType::Float32)
}

pub fn f64s(dims: &[usize]) -> ShapeSpec {
    ShapeSpec::new(dims.iter().copied(), DType::Float64)
}

pub fn scalar(value: f64) -> Buffer {
    Buffer::from_f64(f64s(&[]), &[value]).unwrap()
}

pub fn call(source: &str, entry: &str, out_shapes: Vec<ShapeSpec>) -> KernelCall {
    KernelCall::builder().source(source).entry(entry).out_shapes(out_shapes).build()
}

pub fn values(buffers: &[Buffer]) -> Vec<Vec<f64>> {
    buffers.iter().map(Buffer::to_f64_vec).collect()
}

//! Foreign kernels as differentiable primitives.
//!
//! Kernel source is compiled once per `(source, entry, flags, shapes)`, bound
//! into a traced graph as an opaque primitive, and differentiated on demand by
//! deriving forward and reverse kernels from the source itself. Derived kernels
//! are registered the same way, so they can be differentiated again.
//!
//! ```ignore
//! let bridge = Bridge::global();
//! let graph = kernax_ir::trace(&[spec.clone()], |b, xs| {
//!     let call = KernelCall::builder().source(ADD42).entry("add42").out_shapes(vec![spec.clone()]).build();
//!     bridge.kernel_call(b, &call, xs)
//! })?;
//! let (outs, grads) = bridge.vjp(&graph, &[ones.clone()], &[ones])?;
//! ```

pub mod bridge;
pub mod call;
pub mod config;
pub mod emit;
pub mod error;
pub mod primitive;
pub mod wrap;

#[cfg(test)]
pub mod test;

pub use bridge::Bridge;
pub use call::KernelCall;
pub use config::BridgeConfig;
pub use error::*;
pub use primitive::{KernelPrimitive, LoweredKernel};
pub use wrap::WrappedFunction;

pub use kernax_runtime::{Mode, RuntimeConfig, ToolchainKind};

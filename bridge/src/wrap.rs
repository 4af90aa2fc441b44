//! Whole traced functions as kernels.

use std::sync::Arc;

use kernax_device::Buffer;
use kernax_ir::{Graph, GraphBuilder, Value};
use kernax_runtime::KernelSource;

use crate::error::*;
use crate::primitive::KernelPrimitive;

/// A traced function compiled to a kernel and registered as a primitive.
///
/// Differentiating a graph that calls it goes through the kernel's derived
/// sources, exactly like a direct kernel call.
#[derive(Debug, Clone)]
pub struct WrappedFunction {
    graph: Graph,
    primitive: KernelPrimitive,
}

impl WrappedFunction {
    pub(crate) fn new(graph: Graph, primitive: KernelPrimitive) -> Self {
        Self { graph, primitive }
    }

    /// The traced body.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn primitive(&self) -> &KernelPrimitive {
        &self.primitive
    }

    /// The rendered kernel source the function was compiled from.
    pub fn source(&self) -> &KernelSource {
        self.primitive.kernel().source()
    }

    /// Bind one call of the function into `builder`.
    pub fn call(&self, builder: &mut GraphBuilder, operands: &[Value]) -> Result<Vec<Value>> {
        Ok(builder.bind(Arc::new(self.primitive.clone()), operands)?)
    }

    /// Run the compiled kernel directly.
    pub fn apply(&self, inputs: &[Buffer]) -> Result<Vec<Buffer>> {
        Ok(self.primitive.kernel().execute(inputs)?)
    }
}

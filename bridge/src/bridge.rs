//! The invocation façade.

use std::sync::{Arc, OnceLock};

use kernax_device::Buffer;
use kernax_dtype::ShapeSpec;
use kernax_ir::{Graph, GraphBuilder, Value};
use kernax_runtime::{Derivator, KernelAbi, KernelCompiler, KernelSource};
use snafu::ResultExt;

use crate::call::KernelCall;
use crate::config::BridgeConfig;
use crate::emit::emit_kernel;
use crate::error::*;
use crate::primitive::KernelPrimitive;
use crate::wrap::WrappedFunction;

/// Owns the kernel compiler and derivator every primitive it registers shares.
pub struct Bridge {
    config: BridgeConfig,
    derivator: Arc<Derivator>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let compiler = Arc::new(KernelCompiler::from_config(&config.runtime));
        let derivator = Arc::new(Derivator::from_config(compiler, &config.runtime));
        Self { config, derivator }
    }

    /// A bridge around an existing derivator (and the compiler it uses).
    pub fn with_derivator(config: BridgeConfig, derivator: Arc<Derivator>) -> Self {
        Self { config, derivator }
    }

    /// Process-wide bridge, configured from the environment on first use.
    pub fn global() -> &'static Bridge {
        static GLOBAL: OnceLock<Bridge> = OnceLock::new();
        GLOBAL.get_or_init(|| Bridge::new(BridgeConfig::from_env()))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Arc<KernelCompiler> {
        self.derivator.compiler()
    }

    pub fn derivator(&self) -> &Arc<Derivator> {
        &self.derivator
    }

    /// Compile `source` for `abi` and wrap it as an unbound primitive.
    pub fn register(&self, source: &KernelSource, abi: &KernelAbi) -> Result<KernelPrimitive> {
        let kernel = self.compiler().compile(source, abi)?;
        Ok(KernelPrimitive::new(kernel, self.derivator.clone()))
    }

    /// Call kernel source on traced `operands`, one result per declared shape.
    ///
    /// Compilation happens here, so a broken kernel fails at the call site and
    /// no node is added to `builder`.
    pub fn kernel_call(&self, builder: &mut GraphBuilder, call: &KernelCall, operands: &[Value]) -> Result<Vec<Value>> {
        kernax_dtype::validate(&call.out_shapes, true).context(InvalidShapeSnafu)?;
        let inputs = operands.iter().map(|&v| builder.spec(v).cloned()).collect::<kernax_ir::Result<Vec<_>>>()?;
        let flags = call.flags.clone().unwrap_or_else(|| self.config.default_flags.clone());

        let source = KernelSource::new(call.source.clone(), call.entry.clone(), flags);
        let abi = KernelAbi::new(call.out_shapes.clone(), inputs);
        let primitive = self.register(&source, &abi)?;
        Ok(builder.bind(Arc::new(primitive), operands)?)
    }

    /// Trace `body` over `inputs`, render it as kernel source named `name` and register it.
    ///
    /// Output types come from abstract evaluation of the traced graph. The body
    /// may use builtin operations only.
    pub fn wrap_function(
        &self,
        name: &str,
        inputs: &[ShapeSpec],
        body: impl FnOnce(&mut GraphBuilder, &[Value]) -> Result<Vec<Value>>,
    ) -> Result<WrappedFunction> {
        let graph = kernax_ir::trace(inputs, body)?;
        let outputs = kernax_ir::infer_shapes(&graph)?;
        let function = emit_kernel(name, &graph)?;
        let text = kernax_codegen::render::render(&function);
        tracing::debug!(name, inputs = inputs.len(), outputs = outputs.len(), "wrapping traced function");

        let source = KernelSource::new(text, name, self.config.default_flags.iter().cloned());
        let abi = KernelAbi::new(outputs, graph.input_specs());
        let primitive = self.register(&source, &abi)?;
        Ok(WrappedFunction::new(graph, primitive))
    }

    /// Lower and run `graph`.
    pub fn execute(&self, graph: &Graph, inputs: &[Buffer]) -> Result<Vec<Buffer>> {
        Ok(kernax_ir::execute(graph, inputs)?)
    }

    /// Outputs of `graph` and their tangents along `tangents`.
    pub fn jvp(&self, graph: &Graph, primals: &[Buffer], tangents: &[Buffer]) -> Result<(Vec<Buffer>, Vec<Buffer>)> {
        let derived = kernax_ir::jvp(graph)?;
        let mut outputs = self.execute(&derived, &[primals, tangents].concat())?;
        let tangents = outputs.split_off(graph.outputs().len());
        Ok((outputs, tangents))
    }

    /// Outputs of `graph` and the cotangents of its inputs given output `cotangents`.
    pub fn vjp(&self, graph: &Graph, primals: &[Buffer], cotangents: &[Buffer]) -> Result<(Vec<Buffer>, Vec<Buffer>)> {
        let derived = kernax_ir::vjp(graph)?;
        let mut outputs = self.execute(&derived, &[primals, cotangents].concat())?;
        let gradients = outputs.split_off(graph.outputs().len());
        Ok((outputs, gradients))
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("config", &self.config).field("derivator", &self.derivator).finish()
    }
}

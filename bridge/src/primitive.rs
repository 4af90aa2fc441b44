//! Compiled kernels as graph primitives.
//!
//! A [`KernelPrimitive`] is created unbound from a compiled kernel. Binding it
//! into a [`GraphBuilder`] makes it a node, and lowering turns that node into a
//! foreign call on a [`LoweredKernel`]. Each stage only produces the next one.

use std::sync::Arc;

use kernax_codegen::ArgUsage;
use kernax_device::Buffer;
use kernax_dtype::ShapeSpec;
use kernax_ir::{BoxError, ForeignFunction, GraphBuilder, Instruction, Primitive, Reg, Tangent, Value};
use kernax_runtime::{CompiledKernel, Derivator, KernelAbi, Mode};
use snafu::ensure;

use crate::error::*;

/// A compiled kernel with abstract evaluation, lowering and derivative rules.
#[derive(Debug, Clone)]
pub struct KernelPrimitive {
    kernel: Arc<CompiledKernel>,
    derivator: Arc<Derivator>,
}

impl KernelPrimitive {
    pub fn new(kernel: Arc<CompiledKernel>, derivator: Arc<Derivator>) -> Self {
        tracing::debug!(
            entry = %kernel.source().entry,
            abi = %kernel.abi(),
            symbol = kernel.symbol(),
            "primitive registered"
        );
        Self { kernel, derivator }
    }

    pub fn kernel(&self) -> &Arc<CompiledKernel> {
        &self.kernel
    }

    pub fn abi(&self) -> &KernelAbi {
        self.kernel.abi()
    }

    /// The `mode` derivative of this kernel, registered as a primitive of its own.
    pub fn derivative(&self, mode: Mode) -> Result<KernelPrimitive> {
        let kernel = self.derivator.derive(self.kernel.source(), self.kernel.abi(), mode, 1)?;
        Ok(Self::new(kernel, self.derivator.clone()))
    }

    fn rule_error(&self, rule: &'static str) -> impl FnOnce(Error) -> kernax_ir::Error + '_ {
        move |error| {
            tracing::debug!(entry = self.name(), rule, %error, "primitive rule failed");
            error.into_rule(self.name(), rule)
        }
    }
}

impl Primitive for KernelPrimitive {
    fn name(&self) -> &str {
        &self.kernel.source().entry
    }

    /// The declared output types, as long as the operands match the kernel's inputs.
    fn abstract_eval(&self, operands: &[ShapeSpec]) -> kernax_ir::Result<Vec<ShapeSpec>> {
        let abi = self.abi();
        ensure!(
            operands.len() == abi.inputs.len(),
            kernax_ir::error::AritySnafu { primitive: self.name(), expected: abi.inputs.len(), actual: operands.len() }
        );
        for (expected, actual) in abi.inputs.iter().zip(operands) {
            ensure!(
                expected == actual,
                kernax_ir::error::ShapeMismatchSnafu {
                    primitive: self.name(),
                    lhs: expected.clone(),
                    rhs: actual.clone()
                }
            );
        }
        Ok(abi.outputs.clone())
    }

    fn lower(&self, operands: &[Reg], results: &[Reg]) -> kernax_ir::Result<Instruction> {
        let reads: Vec<bool> = self.kernel.effects().inputs.iter().map(|u| *u == ArgUsage::ReadOnly).collect();
        tracing::trace!(entry = self.name(), symbol = self.kernel.symbol(), ?reads, "lowering foreign call");
        Ok(Instruction::ForeignCall {
            target: Arc::new(LoweredKernel { kernel: self.kernel.clone() }),
            operands: operands.to_vec(),
            results: results.to_vec(),
            reads,
        })
    }

    /// Binds the forward derivative on `(primal, tangent)` operand pairs; its
    /// results come back as `(output, output tangent)` pairs. Integer operands
    /// are inactive, so their tangents alone never force a derivation.
    fn jvp(
        &self,
        b: &mut GraphBuilder,
        primals: &[Value],
        tangents: &[Tangent],
    ) -> kernax_ir::Result<(Vec<Value>, Vec<Tangent>)> {
        let inputs = &self.abi().inputs;
        if tangents.iter().zip(inputs).all(|(t, spec)| t.is_zero() || !spec.dtype().is_float()) {
            let outputs = b.bind(Arc::new(self.clone()), primals)?;
            let zeros = self.abi().outputs.iter().cloned().map(Tangent::Zero).collect();
            return Ok((outputs, zeros));
        }

        let forward = self.derivative(Mode::Forward).map_err(self.rule_error("jvp"))?;
        let mut operands = Vec::with_capacity(primals.len() * 2);
        for (primal, tangent) in primals.iter().zip(tangents) {
            operands.push(*primal);
            operands.push(tangent.materialize(b));
        }
        let results = b.bind(Arc::new(forward), &operands)?;
        Ok(results.chunks_exact(2).map(|pair| (pair[0], Tangent::Value(pair[1]))).unzip())
    }

    /// Binds the reverse derivative on `inputs ++ output cotangents`. Inputs the
    /// kernel never reads and integer inputs get a symbolic zero instead of the
    /// adjoint's result.
    fn vjp(
        &self,
        b: &mut GraphBuilder,
        primals: &[Value],
        _outputs: &[Value],
        cotangents: &[Tangent],
    ) -> kernax_ir::Result<Vec<Tangent>> {
        let usage = &self.kernel.effects().inputs;
        let zero = |spec: &ShapeSpec| Tangent::Zero(spec.clone());
        let active = |(u, spec): (&ArgUsage, &ShapeSpec)| *u == ArgUsage::ReadOnly && spec.dtype().is_float();
        if !usage.iter().zip(&self.abi().inputs).any(active) {
            return Ok(self.abi().inputs.iter().map(zero).collect());
        }

        let reverse = self.derivative(Mode::Reverse).map_err(self.rule_error("vjp"))?;
        let mut operands = primals.to_vec();
        operands.extend(cotangents.iter().map(|ct| ct.materialize(b)));
        let grads = b.bind(Arc::new(reverse), &operands)?;

        Ok(grads
            .into_iter()
            .zip(usage)
            .zip(&self.abi().inputs)
            .map(|((grad, usage), spec)| if active((usage, spec)) { Tangent::Value(grad) } else { zero(spec) })
            .collect())
    }
}

/// The executable end of a kernel primitive: what a lowered foreign call invokes.
#[derive(Debug)]
pub struct LoweredKernel {
    kernel: Arc<CompiledKernel>,
}

impl ForeignFunction for LoweredKernel {
    fn symbol(&self) -> &str {
        self.kernel.symbol()
    }

    fn call(&self, inputs: &[Buffer]) -> Result<Vec<Buffer>, BoxError> {
        self.kernel.execute(inputs).map_err(|e| Box::new(Error::from(e)) as BoxError)
    }
}

//! Compiled kernels ready for execution.

use kernax_codegen::KernelEffects;
use kernax_device::Buffer;
use snafu::ensure;

use crate::error::*;
use crate::source::{KernelAbi, KernelSource};
use crate::toolchain::NativeUnit;

/// A loaded kernel together with the calling convention it was built for.
///
/// Never mutated after creation. Shared through `Arc` out of the compiler's cache.
pub struct CompiledKernel {
    source: KernelSource,
    abi: KernelAbi,
    key: u64,
    effects: KernelEffects,
    unit: Box<dyn NativeUnit>,
}

impl CompiledKernel {
    pub(crate) fn new(
        source: KernelSource,
        abi: KernelAbi,
        key: u64,
        effects: KernelEffects,
        unit: Box<dyn NativeUnit>,
    ) -> Self {
        Self { source, abi, key, effects, unit }
    }

    pub fn source(&self) -> &KernelSource {
        &self.source
    }

    pub fn abi(&self) -> &KernelAbi {
        &self.abi
    }

    /// Content key this kernel is cached under.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Which inputs the body reads and which outputs it writes.
    pub fn effects(&self) -> &KernelEffects {
        &self.effects
    }

    /// Resolved native entry (the ABI adapter).
    pub fn symbol(&self) -> &str {
        self.unit.symbol()
    }

    /// Run the kernel on `inputs`, returning freshly allocated outputs.
    pub fn execute(&self, inputs: &[Buffer]) -> Result<Vec<Buffer>> {
        let mut outputs: Vec<Buffer> = self.abi.outputs.iter().cloned().map(Buffer::zeros).collect();
        self.execute_into(&mut outputs, inputs)?;
        Ok(outputs)
    }

    /// Run the kernel writing into caller-provided `outputs`, which are zero-filled first.
    ///
    /// Every operand is checked against the recorded ABI before any buffer is touched.
    pub fn execute_into(&self, outputs: &mut [Buffer], inputs: &[Buffer]) -> Result<()> {
        self.check("output", &self.abi.outputs, outputs)?;
        self.check("input", &self.abi.inputs, inputs)?;

        for out in outputs.iter_mut() {
            *out = Buffer::zeros(out.spec().clone());
        }
        tracing::trace!(entry = %self.source.entry, symbol = self.symbol(), "executing kernel");
        self.unit.invoke(outputs, inputs).inspect_err(|error| {
            tracing::debug!(entry = %self.source.entry, %error, "kernel execution failed");
        })
    }

    fn check(&self, role: &'static str, specs: &[kernax_dtype::ShapeSpec], buffers: &[Buffer]) -> Result<()> {
        let entry = || self.source.entry.clone();
        ensure!(
            specs.len() == buffers.len(),
            OperandCountSnafu { entry: entry(), role: plural(role), expected: specs.len(), actual: buffers.len() }
        );
        for (index, (spec, buffer)) in specs.iter().zip(buffers).enumerate() {
            let actual = buffer.spec();
            ensure!(
                spec == actual,
                OperandMismatchSnafu { entry: entry(), role, index, expected: spec.clone(), actual: actual.clone() }
            );
        }
        Ok(())
    }
}

fn plural(role: &'static str) -> &'static str {
    match role {
        "output" => "outputs",
        _ => "inputs",
    }
}

impl std::fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("entry", &self.source.entry)
            .field("abi", &self.abi)
            .field("key", &format_args!("{:016x}", self.key))
            .field("symbol", &self.unit.symbol())
            .finish()
    }
}

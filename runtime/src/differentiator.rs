//! Source-to-source differentiation of kernel text.

use std::sync::atomic::{AtomicUsize, Ordering};

use kernax_autodiff::Mode;
use snafu::ResultExt;

use crate::error::*;
use crate::source::{KernelAbi, KernelSource};

/// A derivative kernel as source text, with the slot layout it must be compiled for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedSource {
    pub source: KernelSource,
    pub abi: KernelAbi,
}

pub trait Differentiator: Send + Sync {
    /// Produce the `mode` derivative of `source` instantiated at `abi`.
    fn differentiate(&self, source: &KernelSource, abi: &KernelAbi, mode: Mode) -> Result<DerivedSource>;

    /// How many times [`Differentiator::differentiate`] has run.
    fn invocations(&self) -> usize;
}

/// Differentiates through the kernax front end and AD compiler, then renders
/// the result back to monomorphic kernel source.
///
/// The derived text is itself a valid kernel, so it can be compiled by any
/// toolchain and differentiated again.
#[derive(Debug, Default)]
pub struct SourceDifferentiator {
    invocations: AtomicUsize,
}

impl SourceDifferentiator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Differentiator for SourceDifferentiator {
    fn differentiate(&self, source: &KernelSource, abi: &KernelAbi, mode: Mode) -> Result<DerivedSource> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let func = kernax_codegen::translate(&source.source, &source.entry, &source.flags, &abi.outputs, &abi.inputs)
            .map_err(|e| Error::Compilation { entry: source.entry.clone(), diagnostic: e.to_string() })?;
        let derived = kernax_autodiff::differentiate(&func, mode)
            .context(DifferentiationSnafu { entry: source.entry.clone(), mode })?;

        let (outputs, inputs) = derived.signature();
        let text = kernax_codegen::render::render(&derived);
        Ok(DerivedSource {
            source: KernelSource::new(text, derived.name, source.flags.iter().cloned()),
            abi: KernelAbi::new(outputs, inputs),
        })
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

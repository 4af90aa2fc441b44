//! The kernel compiler: `(source, entry, flags, shapes)` to a cached [`CompiledKernel`].

use std::sync::Arc;

use kernax_codegen::{KernelEffects, adapter};
use snafu::{ResultExt, ensure};

use crate::cache::KeyedCache;
use crate::config::RuntimeConfig;
use crate::error::*;
use crate::kernel::CompiledKernel;
use crate::source::{KernelAbi, KernelSource, content_key};
use crate::toolchain::{CompilerInvocation, Toolchain};

pub struct KernelCompiler {
    toolchain: Arc<dyn Toolchain>,
    kernels: KeyedCache<CompiledKernel>,
}

impl KernelCompiler {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self { toolchain, kernels: KeyedCache::new("kernels") }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.build_toolchain())
    }

    pub fn toolchain(&self) -> &dyn Toolchain {
        self.toolchain.as_ref()
    }

    /// Compile `source` for the slot layout `abi`, or return the cached kernel.
    ///
    /// Shapes are validated before anything else. The toolchain runs at most
    /// once per distinct `(source, abi)`; concurrent callers for the same pair
    /// wait for that run and share its outcome.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidShape`] for a malformed or empty output declaration,
    /// [`Error::Compilation`] when the source does not translate or the entry
    /// symbol cannot be resolved. Failures are never cached.
    pub fn compile(&self, source: &KernelSource, abi: &KernelAbi) -> Result<Arc<CompiledKernel>> {
        kernax_dtype::validate(&abi.outputs, true).context(InvalidShapeSnafu)?;
        kernax_dtype::validate(&abi.inputs, false).context(InvalidShapeSnafu)?;
        ensure!(!source.source.trim().is_empty(), EmptySourceSnafu { entry: source.entry.clone() });

        let key = content_key(source, abi);
        self.kernels.get_or_fill(
            key,
            |cached| cached.source() == source && cached.abi() == abi,
            || self.build(source, abi, key),
        )
    }

    /// Drop every cached kernel.
    pub fn invalidate(&self) {
        self.kernels.invalidate();
    }

    /// Number of kernels currently cached.
    pub fn cached(&self) -> usize {
        self.kernels.len()
    }

    fn build(&self, source: &KernelSource, abi: &KernelAbi, key: u64) -> Result<CompiledKernel> {
        tracing::debug!(entry = %source.entry, %abi, toolchain = self.toolchain.name(), "compiling kernel");

        let translated =
            kernax_codegen::translate(&source.source, &source.entry, &source.flags, &abi.outputs, &abi.inputs);
        let function = translated.map_err(|e| {
            tracing::debug!(entry = %source.entry, error = %e, "kernel rejected by front end");
            Error::Compilation { entry: source.entry.clone(), diagnostic: e.to_string() }
        })?;
        let effects = KernelEffects::analyze(&function);
        let symbol = adapter::adapter_symbol(key);

        let invocation = CompilerInvocation { source, abi, symbol: &symbol, function: &function };
        let unit = self.toolchain.compile(&invocation)?;

        tracing::debug!(entry = %source.entry, symbol = %symbol, ?effects, "kernel compiled");
        Ok(CompiledKernel::new(source.clone(), abi.clone(), key, effects, unit))
    }
}

impl std::fmt::Debug for KernelCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCompiler")
            .field("toolchain", &self.toolchain.name())
            .field("cached", &self.cached())
            .finish()
    }
}

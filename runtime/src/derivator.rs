//! The AD kernel derivator.
//!
//! `derive(source, abi, mode, order)` applies `mode` to `source` `order` times
//! and compiles the result. Every step is cached by `(source, abi, mode)`, and
//! the final kernel goes through the same compiler cache as any other, so a
//! derivative source is indistinguishable from a user-written one. Deriving a
//! derivative (mixed modes included) is just another call with that source.

use std::sync::Arc;
use std::time::Instant;

use kernax_autodiff::Mode;
use snafu::ensure;

use crate::cache::KeyedCache;
use crate::compiler::KernelCompiler;
use crate::config::RuntimeConfig;
use crate::differentiator::{DerivedSource, Differentiator, SourceDifferentiator};
use crate::error::*;
use crate::kernel::CompiledKernel;
use crate::source::{KernelAbi, KernelSource, derivation_key};

/// One cached derivation step, with the request it answers.
struct Derivation {
    from: KernelSource,
    from_abi: KernelAbi,
    mode: Mode,
    derived: DerivedSource,
}

pub struct Derivator {
    compiler: Arc<KernelCompiler>,
    differentiator: Arc<dyn Differentiator>,
    derivations: KeyedCache<Derivation>,
    max_order: usize,
}

impl Derivator {
    pub fn new(compiler: Arc<KernelCompiler>, differentiator: Arc<dyn Differentiator>, max_order: usize) -> Self {
        Self { compiler, differentiator, derivations: KeyedCache::new("derivations"), max_order }
    }

    pub fn from_config(compiler: Arc<KernelCompiler>, config: &RuntimeConfig) -> Self {
        Self::new(compiler, Arc::new(SourceDifferentiator::new()), config.max_order)
    }

    pub fn compiler(&self) -> &Arc<KernelCompiler> {
        &self.compiler
    }

    pub fn differentiator(&self) -> &dyn Differentiator {
        self.differentiator.as_ref()
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Compile the order-`order` `mode` derivative of `source`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOrder`] unless `1 <= order <= max_order`;
    /// [`Error::Differentiation`] when some step cannot be transformed; any
    /// error of [`KernelCompiler::compile`] for the final source.
    pub fn derive(
        &self,
        source: &KernelSource,
        abi: &KernelAbi,
        mode: Mode,
        order: usize,
    ) -> Result<Arc<CompiledKernel>> {
        ensure!((1..=self.max_order).contains(&order), InvalidOrderSnafu { order, max_order: self.max_order });

        let mut current = self.derive_source(source, abi, mode)?;
        for _ in 1..order {
            current = self.derive_source(&current.source, &current.abi, mode)?;
        }
        self.compiler.compile(&current.source, &current.abi)
    }

    /// One derivation step, without compiling the result.
    pub fn derive_source(&self, source: &KernelSource, abi: &KernelAbi, mode: Mode) -> Result<DerivedSource> {
        let key = derivation_key(source, abi, mode);
        let step = self.derivations.get_or_fill(
            key,
            |d| d.mode == mode && d.from == *source && d.from_abi == *abi,
            || {
                let started = Instant::now();
                tracing::debug!(entry = %source.entry, %mode, "deriving kernel");
                let derived = self.differentiator.differentiate(source, abi, mode)?;
                tracing::debug!(
                    entry = %source.entry,
                    %mode,
                    derived = %derived.source.entry,
                    abi = %derived.abi,
                    elapsed = ?started.elapsed(),
                    "kernel derived"
                );
                Ok(Derivation { from: source.clone(), from_abi: abi.clone(), mode, derived })
            },
        )?;
        Ok(step.derived.clone())
    }

    /// Drop every cached derivation step. Compiled kernels stay in the compiler's cache.
    pub fn invalidate(&self) {
        self.derivations.invalidate();
    }

    /// Number of derivation steps currently cached.
    pub fn cached(&self) -> usize {
        self.derivations.len()
    }
}

impl std::fmt::Debug for Derivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derivator")
            .field("compiler", &self.compiler)
            .field("cached", &self.cached())
            .field("max_order", &self.max_order)
            .finish()
    }
}

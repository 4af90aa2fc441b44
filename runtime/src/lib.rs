//! Kernel compilation and derivation for kernax.
//!
//! - [`KernelCompiler`]: `(source, entry, flags, shapes)` to a [`CompiledKernel`] with
//!   the fixed `void(void** outs, void** ins)` ABI, built by a [`Toolchain`]
//! - [`Derivator`]: forward/reverse derivative kernels of any order, produced
//!   by a [`Differentiator`] and compiled through the same compiler
//!
//! Both keep process-lifetime caches keyed by content. A fill runs at most once
//! per key; concurrent requests for one key wait for it, distinct keys proceed
//! in parallel, and failures are reported to every waiter without being cached.
//!
//! # Toolchains
//!
//! `KERNAX_TOOLCHAIN=interp` (default) runs kernels on the in-process
//! reference evaluator; `KERNAX_TOOLCHAIN=clang` builds native shared objects.
//! See [`RuntimeConfig::from_env`].

pub mod cache;
pub mod compiler;
pub mod config;
pub mod derivator;
pub mod differentiator;
pub mod error;
pub mod kernel;
pub mod source;
pub mod toolchain;

#[cfg(test)]
pub mod test;

pub use compiler::KernelCompiler;
pub use config::{RuntimeConfig, ToolchainKind};
pub use derivator::Derivator;
pub use differentiator::{DerivedSource, Differentiator, SourceDifferentiator};
pub use error::*;
pub use kernax_autodiff::Mode;
pub use kernel::CompiledKernel;
pub use source::{KernelAbi, KernelSource};
pub use toolchain::{ClangToolchain, CompilerInvocation, InterpToolchain, NativeUnit, Toolchain};

//! Toolchains turn an instantiated kernel into something that can be invoked.
//!
//! - [`InterpToolchain`]: in-process, runs the kernel IR through the reference evaluator
//! - [`ClangToolchain`]: builds a shared object with a C++ compiler and loads it

pub mod clang;
pub mod interp;

use kernax_codegen::Function;
use kernax_device::Buffer;

use crate::Result;
use crate::source::{KernelAbi, KernelSource};

pub use clang::ClangToolchain;
pub use interp::InterpToolchain;

/// One compiler run. Lives only as long as the call to [`Toolchain::compile`].
#[derive(Debug)]
pub struct CompilerInvocation<'a> {
    pub source: &'a KernelSource,
    pub abi: &'a KernelAbi,
    /// Exported name of the ABI adapter.
    pub symbol: &'a str,
    /// The entry point as accepted by the front end.
    pub function: &'a Function,
}

/// A loaded kernel with the fixed `void(void** outs, void** ins)` calling convention.
///
/// Callers pass buffers that already match the kernel's ABI, outputs zero-filled.
pub trait NativeUnit: Send + Sync {
    fn invoke(&self, outputs: &mut [Buffer], inputs: &[Buffer]) -> Result<()>;

    /// Name of the resolved entry symbol.
    fn symbol(&self) -> &str;
}

pub trait Toolchain: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(&self, invocation: &CompilerInvocation<'_>) -> Result<Box<dyn NativeUnit>>;

    /// How many times [`Toolchain::compile`] has run.
    fn invocations(&self) -> usize;
}

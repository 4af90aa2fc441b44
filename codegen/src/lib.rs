//! Front end and code generation for kernax kernels.
//!
//! Kernel source is a small C++ subset: `void` functions over
//! `kernax::tensor<elem, dims...>` references, optionally templated on element
//! types and extents. The pipeline is
//!
//! - **preprocess/lexer**: tokens with positions, `#define` and `-D` macros
//! - **parser**: syntax tree for every function in the translation unit
//! - **instantiate**: binds the entry point to concrete slot shapes and produces
//!   a monomorphic [`kir::Function`]
//! - **render**: prints a [`kir::Function`] back as kernel source; **adapter**
//!   wraps source in the C++ prelude and the fixed `void(void**, void**)` ABI
//! - **eval**: reference interpreter over host buffers
//! - **usage**: per-argument read/write analysis
//!
//! # Usage
//!
//! ```ignore
//! let func = kernax_codegen::translate(source, "myfn", &flags, &outs, &ins)?;
//! kernax_codegen::eval::evaluate(&func, &mut outputs, &inputs)?;
//! ```

pub mod adapter;
pub mod ast;
pub mod builtins;
pub mod error;
pub mod eval;
pub mod instantiate;
pub mod kir;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod render;
pub mod usage;


use kernax_dtype::ShapeSpec;

pub use builtins::Builtin;
pub use error::*;
pub use kir::Function;
pub use usage::{ArgUsage, KernelEffects};

/// Run the whole front end: preprocess, parse and instantiate `entry` for the given slots.
pub fn translate(
    source: &str,
    entry: &str,
    flags: &[String],
    outputs: &[ShapeSpec],
    inputs: &[ShapeSpec],
) -> Result<Function> {
    let tokens = preprocess::preprocess(source, flags)?;
    let unit = parser::parse(tokens)?;
    let func = instantiate::instantiate(&unit, entry, outputs, inputs)?;
    tracing::trace!(entry, locals = func.locals.len(), "kernel instantiated");
    Ok(func)
}

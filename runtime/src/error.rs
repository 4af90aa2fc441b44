//! Error types for kernel compilation, derivation and execution.

use kernax_autodiff::Mode;
use kernax_dtype::ShapeSpec;
use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while compiling, deriving or running a kernel.
///
/// Every variant is `Clone`: a failed cache fill hands the same error to all
/// callers that were waiting on it.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Malformed output shape declaration.
    #[snafu(display("invalid shape declaration: {source}"))]
    InvalidShape { source: kernax_dtype::Error },

    #[snafu(display("kernel source for '{entry}' is empty"))]
    EmptySource { entry: String },

    /// The toolchain rejected the source, or the entry symbol could not be resolved.
    #[snafu(display("failed to compile kernel '{entry}':\n{diagnostic}"))]
    Compilation { entry: String, diagnostic: String },

    #[snafu(display("failed to derive {mode} kernel of '{entry}': {source}"))]
    Differentiation { entry: String, mode: Mode, source: kernax_autodiff::Error },

    /// A cached artifact does not belong to the key it was found under.
    #[snafu(display("kernel cache corrupted at key {key:016x}: {reason}"))]
    CacheCorruption { key: u64, reason: String },

    #[snafu(display("derivative order {order} outside of 1..={max_order}"))]
    InvalidOrder { order: usize, max_order: usize },

    #[snafu(display("kernel '{entry}' takes {expected} {role}, got {actual}"))]
    OperandCount { entry: String, role: &'static str, expected: usize, actual: usize },

    #[snafu(display("{role} {index} of kernel '{entry}' must be {expected}, got {actual}"))]
    OperandMismatch { entry: String, role: &'static str, index: usize, expected: ShapeSpec, actual: ShapeSpec },

    #[snafu(display("kernel '{entry}' failed at runtime: {reason}"))]
    Execution { entry: String, reason: String },
}

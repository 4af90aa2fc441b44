//! The error taxonomy callers of the bridge see.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Malformed output declaration, caught before anything is compiled.
    #[snafu(display("invalid shape declaration: {source}"))]
    InvalidShape { source: kernax_dtype::Error },

    /// The toolchain rejected the kernel. Raised at registration, never at execution.
    #[snafu(display("failed to compile kernel '{entry}':\n{diagnostic}"))]
    Compilation { entry: String, diagnostic: String },

    /// Raised only when a differentiation transform reaches the primitive.
    #[snafu(display("{source}"))]
    Differentiation { source: kernax_runtime::Error },

    #[snafu(display("kernel cache corrupted at key {key:016x}: {reason}"))]
    CacheCorruption { key: u64, reason: String },

    /// Misuse of the host graph: wrong operand count or types, values from another trace.
    #[snafu(display("graph error: {source}"))]
    Graph { source: kernax_ir::Error },

    #[snafu(display("{source}"))]
    Execution { source: kernax_runtime::Error },
}

impl From<kernax_runtime::Error> for Error {
    fn from(error: kernax_runtime::Error) -> Self {
        use kernax_runtime::Error as E;
        match error {
            E::InvalidShape { source } => Self::InvalidShape { source },
            E::EmptySource { entry } => Self::Compilation { entry, diagnostic: "kernel source is empty".to_owned() },
            E::Compilation { entry, diagnostic } => Self::Compilation { entry, diagnostic },
            E::CacheCorruption { key, reason } => Self::CacheCorruption { key, reason },
            source @ (E::Differentiation { .. } | E::InvalidOrder { .. }) => Self::Differentiation { source },
            source @ (E::OperandCount { .. } | E::OperandMismatch { .. } | E::Execution { .. }) => {
                Self::Execution { source }
            }
        }
    }
}

/// Errors raised inside primitive rules travel through the graph boxed; take
/// them back out so callers see the taxonomy rather than a host error.
impl From<kernax_ir::Error> for Error {
    fn from(error: kernax_ir::Error) -> Self {
        let ours = match &error {
            kernax_ir::Error::PrimitiveRule { cause, .. } | kernax_ir::Error::Foreign { cause, .. } => {
                cause.is::<Error>() || cause.is::<kernax_runtime::Error>()
            }
            _ => false,
        };
        if !ours {
            return Self::Graph { source: error };
        }
        match error.into_cause().map(|cause| cause.downcast::<Error>()) {
            Ok(Ok(error)) => *error,
            Ok(Err(cause)) => match cause.downcast::<kernax_runtime::Error>() {
                Ok(error) => (*error).into(),
                Err(cause) => Self::Graph { source: kernax_ir::Error::rule("unknown", "unknown", cause) },
            },
            Err(source) => Self::Graph { source },
        }
    }
}

impl Error {
    /// Box `self` for a primitive rule named `rule` of `primitive`.
    pub(crate) fn into_rule(self, primitive: &str, rule: &'static str) -> kernax_ir::Error {
        kernax_ir::Error::rule(primitive, rule, self)
    }
}

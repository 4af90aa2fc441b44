use kernax_dtype::{DType, ShapeSpec};
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error raised by a primitive's own rule, carried through the graph untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{primitive}: expected {expected} operands, got {actual}"))]
    Arity { primitive: String, expected: usize, actual: usize },

    #[snafu(display("{primitive}: operand shapes differ ({lhs} vs {rhs})"))]
    ShapeMismatch { primitive: String, lhs: ShapeSpec, rhs: ShapeSpec },

    #[snafu(display("{primitive}: {dtype} operands are not supported"))]
    UnsupportedDType { primitive: String, dtype: DType },

    #[snafu(display("value %{node}:{output} does not belong to this graph"))]
    UnknownValue { node: usize, output: usize },

    /// A rule returned a different number of results than the node it replaces.
    #[snafu(display("{primitive}: {rule} rule produced {actual} results, expected {expected}"))]
    RuleArity { primitive: String, rule: &'static str, expected: usize, actual: usize },

    /// Re-running abstract evaluation disagreed with the recorded node type.
    #[snafu(display("node {node} ({primitive}): recorded {recorded:?}, inferred {inferred:?}"))]
    Inference { node: usize, primitive: String, recorded: Vec<ShapeSpec>, inferred: Vec<ShapeSpec> },

    #[snafu(display("{primitive}: {rule} rule failed: {cause}"))]
    PrimitiveRule { primitive: String, rule: &'static str, cause: BoxError },

    #[snafu(display("program expects {expected} inputs, got {actual}"))]
    InputCount { expected: usize, actual: usize },

    #[snafu(display("program input {index}: expected {expected}, got {actual}"))]
    InputMismatch { index: usize, expected: ShapeSpec, actual: ShapeSpec },

    #[snafu(display("register r{register} read before it was written"))]
    UnsetRegister { register: usize },

    #[snafu(display("foreign call {symbol} failed: {cause}"))]
    Foreign { symbol: String, cause: BoxError },
}

impl Error {
    /// Wrap an error raised inside a primitive's `rule`.
    pub fn rule(primitive: impl Into<String>, rule: &'static str, cause: impl Into<BoxError>) -> Self {
        Self::PrimitiveRule { primitive: primitive.into(), rule, cause: cause.into() }
    }

    /// The primitive's own error when this is a [`Error::PrimitiveRule`] or [`Error::Foreign`].
    pub fn into_cause(self) -> Result<BoxError, Self> {
        match self {
            Self::PrimitiveRule { cause, .. } | Self::Foreign { cause, .. } => Ok(cause),
            other => Err(other),
        }
    }
}

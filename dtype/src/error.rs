use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Malformed shape declarations, detected before any compilation happens.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("negative dimension {dim} at axis {axis} of shape {dims:?}"))]
    NegativeDimension { axis: usize, dim: i64, dims: Vec<i64> },

    #[snafu(display("unrecognized element type '{name}'"))]
    UnknownDType { name: String },

    #[snafu(display("kernel declares no outputs, at least one output shape is required"))]
    EmptyShapeList,

    #[snafu(display("element count of shape {dims:?} overflows usize"))]
    ElementCountOverflow { dims: Vec<usize> },
}

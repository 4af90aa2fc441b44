use kernax_dtype::DType;
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("size mismatch: shape needs {expected} elements, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    #[snafu(display("dtype mismatch: buffer holds {actual}, requested {expected}"))]
    DTypeMismatch { expected: DType, actual: DType },

    #[snafu(display("index {index} out of bounds for buffer of {numel} elements"))]
    IndexOutOfBounds { index: usize, numel: usize },
}

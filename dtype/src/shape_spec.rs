//! The shape contract: validated `(dimensions, element type)` pairs.

use smallvec::SmallVec;
use snafu::ensure;

use crate::error::*;
use crate::DType;

/// Static description of one tensor slot.
///
/// Dimensions are non-negative by construction; [`ShapeSpec::try_new`] is the
/// checked entry point for caller-provided declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeSpec {
    dims: SmallVec<[usize; 4]>,
    dtype: DType,
}

impl ShapeSpec {
    pub fn new(dims: impl IntoIterator<Item = usize>, dtype: DType) -> Self {
        Self { dims: dims.into_iter().collect(), dtype }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self { dims: SmallVec::new(), dtype }
    }

    /// Build a spec from an unchecked declaration (signed dims, dtype by name).
    pub fn try_new(dims: &[i64], dtype: &str) -> Result<Self> {
        let dtype: DType = dtype.parse()?;
        let mut checked = SmallVec::with_capacity(dims.len());
        for (axis, &dim) in dims.iter().enumerate() {
            ensure!(dim >= 0, NegativeDimensionSnafu { axis, dim, dims: dims.to_vec() });
            checked.push(dim as usize);
        }
        let spec = Self { dims: checked, dtype };
        spec.checked_numel()?;
        Ok(spec)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn bytes(&self) -> usize {
        self.numel() * self.dtype.bytes()
    }

    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self { dims: self.dims.clone(), dtype }
    }

    fn checked_numel(&self) -> Result<usize> {
        self.dims
            .iter()
            .try_fold(self.dtype.bytes(), |acc, &d| acc.checked_mul(d))
            .map(|bytes| bytes / self.dtype.bytes())
            .ok_or_else(|| Error::ElementCountOverflow { dims: self.dims.to_vec() })
    }
}

impl std::fmt::Display for ShapeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// Validate the declared output shapes of a kernel call.
///
/// `require_output` rejects an empty declaration; every kernel call needs at
/// least one output slot.
pub fn validate(shapes: &[ShapeSpec], require_output: bool) -> Result<()> {
    ensure!(!require_output || !shapes.is_empty(), EmptyShapeListSnafu);
    for spec in shapes {
        spec.checked_numel()?;
    }
    Ok(())
}

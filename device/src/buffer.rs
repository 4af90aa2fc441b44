use kernax_dtype::ext::HasDType;
use kernax_dtype::{DType, ShapeSpec};
use snafu::ensure;

use crate::error::*;

/// Typed backing store of a [`Buffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl Storage {
    fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Bool => Self::Bool(vec![false; len]),
            DType::Int32 => Self::Int32(vec![0; len]),
            DType::Int64 => Self::Int64(vec![0; len]),
            DType::Float32 => Self::Float32(vec![0.0; len]),
            DType::Float64 => Self::Float64(vec![0.0; len]),
        }
    }

    fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }
}

/// Rust element types a [`Buffer`] can be viewed as.
pub trait Element: HasDType {
    fn slice(storage: &Storage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]>;
    fn wrap(data: Vec<Self>) -> Storage;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl Element for $ty {
            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage { Storage::$variant(v) => Some(v), _ => None }
            }
            fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
                match storage { Storage::$variant(v) => Some(v), _ => None }
            }
            fn wrap(data: Vec<Self>) -> Storage {
                Storage::$variant(data)
            }
        })*
    };
}

impl_element! { bool => Bool, i32 => Int32, i64 => Int64, f32 => Float32, f64 => Float64 }

/// Dense row-major host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    spec: ShapeSpec,
    storage: Storage,
}

impl Buffer {
    /// Zero-filled buffer for `spec`.
    pub fn zeros(spec: ShapeSpec) -> Self {
        let storage = Storage::zeros(spec.dtype(), spec.numel());
        Self { spec, storage }
    }

    /// Buffer for `spec` with every element set to `value` (converted to the element type).
    pub fn full(spec: ShapeSpec, value: f64) -> Self {
        let mut buffer = Self::zeros(spec);
        for i in 0..buffer.numel() {
            buffer.store(i, value);
        }
        buffer
    }

    pub fn ones(spec: ShapeSpec) -> Self {
        Self::full(spec, 1.0)
    }

    /// Copy `data` into a new buffer of extents `dims`.
    pub fn from_slice<T: Element>(data: &[T], dims: &[usize]) -> Result<Self> {
        let spec = ShapeSpec::new(dims.iter().copied(), T::DTYPE);
        ensure!(spec.numel() == data.len(), SizeMismatchSnafu { expected: spec.numel(), actual: data.len() });
        Ok(Self { spec, storage: T::wrap(data.to_vec()) })
    }

    /// Build a buffer of `spec` from `f64` values, converting to the element type.
    pub fn from_f64(spec: ShapeSpec, values: &[f64]) -> Result<Self> {
        ensure!(spec.numel() == values.len(), SizeMismatchSnafu { expected: spec.numel(), actual: values.len() });
        let mut buffer = Self::zeros(spec);
        for (i, &v) in values.iter().enumerate() {
            buffer.store(i, v);
        }
        Ok(buffer)
    }

    pub fn spec(&self) -> &ShapeSpec {
        &self.spec
    }

    pub fn dims(&self) -> &[usize] {
        self.spec.dims()
    }

    pub fn dtype(&self) -> DType {
        self.spec.dtype()
    }

    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.storage).ok_or(Error::DTypeMismatch { expected: T::DTYPE, actual: self.storage.dtype() })
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let actual = self.storage.dtype();
        T::slice_mut(&mut self.storage).ok_or(Error::DTypeMismatch { expected: T::DTYPE, actual })
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.as_slice::<T>().map(<[T]>::to_vec)
    }

    /// All elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.numel()).map(|i| self.load(i)).collect()
    }

    /// Read element `index` (flat, row-major) as `f64`.
    ///
    /// Callers index within `0..numel()`; use [`Buffer::get`] for a checked read.
    pub fn load(&self, index: usize) -> f64 {
        match &self.storage {
            Storage::Bool(v) => f64::from(u8::from(v[index])),
            Storage::Int32(v) => f64::from(v[index]),
            Storage::Int64(v) => v[index] as f64,
            Storage::Float32(v) => f64::from(v[index]),
            Storage::Float64(v) => v[index],
        }
    }

    /// Write element `index` from an `f64`, truncating toward zero for integer storage.
    pub fn store(&mut self, index: usize, value: f64) {
        match &mut self.storage {
            Storage::Bool(v) => v[index] = value != 0.0,
            Storage::Int32(v) => v[index] = value as i32,
            Storage::Int64(v) => v[index] = value as i64,
            Storage::Float32(v) => v[index] = value as f32,
            Storage::Float64(v) => v[index] = value,
        }
    }

    pub fn get(&self, index: usize) -> Result<f64> {
        ensure!(index < self.numel(), IndexOutOfBoundsSnafu { index, numel: self.numel() });
        Ok(self.load(index))
    }

    /// Raw pointer to the first element, for passing through a kernel ABI.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.storage {
            Storage::Bool(v) => v.as_ptr().cast(),
            Storage::Int32(v) => v.as_ptr().cast(),
            Storage::Int64(v) => v.as_ptr().cast(),
            Storage::Float32(v) => v.as_ptr().cast(),
            Storage::Float64(v) => v.as_ptr().cast(),
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.storage {
            Storage::Bool(v) => v.as_mut_ptr().cast(),
            Storage::Int32(v) => v.as_mut_ptr().cast(),
            Storage::Int64(v) => v.as_mut_ptr().cast(),
            Storage::Float32(v) => v.as_mut_ptr().cast(),
            Storage::Float64(v) => v.as_mut_ptr().cast(),
        }
    }

    /// Largest absolute element-wise difference to `other`, `None` if specs differ.
    pub fn max_abs_diff(&self, other: &Buffer) -> Option<f64> {
        if self.spec != other.spec {
            return None;
        }
        Some((0..self.numel()).map(|i| (self.load(i) - other.load(i)).abs()).fold(0.0, f64::max))
    }
}

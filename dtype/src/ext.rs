use super::*;

/// Rust scalar types that can back a tensor buffer.
pub trait HasDType: Copy + Default + Send + Sync + 'static {
    const DTYPE: DType;
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl HasDType for $ty { const DTYPE: DType = $dtype; })*
    };
}

impl_dtype_ext! {
    bool => DType::Bool,
    i32 => DType::Int32, i64 => DType::Int64,
    f32 => DType::Float32, f64 => DType::Float64,
}

//! Element types and the output shape contract shared by every kernax crate.
//!
//! A kernel declaration names its outputs as `(dimensions, element type)` pairs.
//! [`ShapeSpec`] is the validated form of such a pair; [`validate`] checks a whole
//! declaration before anything is compiled.

use std::str::FromStr;

pub mod error;
pub mod ext;
pub mod shape_spec;


pub use error::*;
pub use shape_spec::{ShapeSpec, validate};

/// Element type of a tensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int32 => 4,
            Self::Int64 => 8,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Canonical lower-case name (`float32`, `int64`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Spelling of this type in kernel source and in the C++ adapter.
    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int",
            Self::Int64 => "long",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }

    /// Inverse of [`DType::c_style`].
    pub fn from_c_style(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int32),
            "long" => Some(Self::Int64),
            "float" => Some(Self::Float32),
            "double" => Some(Self::Float64),
            _ => None,
        }
    }

    /// Least upper bound used for arithmetic promotion (C usual conversions, restricted to our types).
    pub fn promote(lhs: Self, rhs: Self) -> Self {
        let rank = |d: Self| match d {
            Self::Bool => 0,
            Self::Int32 => 1,
            Self::Int64 => 2,
            Self::Float32 => 3,
            Self::Float64 => 4,
        };
        let promoted = if rank(lhs) >= rank(rhs) { lhs } else { rhs };
        // bool never survives arithmetic
        if promoted.is_bool() { Self::Int32 } else { promoted }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(Self::Bool),
            "int32" | "i32" | "int" => Ok(Self::Int32),
            "int64" | "i64" | "long" => Ok(Self::Int64),
            "float32" | "f32" | "float" => Ok(Self::Float32),
            "float64" | "f64" | "double" => Ok(Self::Float64),
            _ => UnknownDTypeSnafu { name }.fail(),
        }
    }
}

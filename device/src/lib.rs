//! Host-side tensor storage.
//!
//! A [`Buffer`] is a dense row-major allocation described by a [`ShapeSpec`].
//! Kernels receive buffers as raw pointers through their fixed ABI; the graph
//! executor reads and writes them element-wise.

pub mod buffer;
pub mod error;


pub use buffer::{Buffer, Element, Storage};
pub use error::{Error, Result};
pub use kernax_dtype::{DType, ShapeSpec};

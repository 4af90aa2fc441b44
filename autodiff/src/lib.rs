//! Source-to-source automatic differentiation of kernax kernels.
//!
//! Both transformations take a monomorphic [`Function`] and produce another one,
//! which renders back to kernel source and can itself be differentiated again.
//!
//! - [`Mode::Forward`]: `<entry>_fwd(out0, d_out0, ..., const in0, const d_in0, ...)`
//!   computes primal outputs and their tangents side by side.
//! - [`Mode::Reverse`]: `<entry>_rev(d_in0, ..., const in0, ..., const d_out0, ...)`
//!   recomputes the primal on a tape, then sweeps it backwards accumulating
//!   input cotangents.

pub mod error;
pub mod forward;
pub mod reverse;
pub mod rules;

mod build;
mod remap;


use kernax_codegen::Function;

pub use error::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Forward,
    Reverse,
}

impl Mode {
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Forward => "fwd",
            Self::Reverse => "rev",
        }
    }
}

/// Name of the derivative entry point, e.g. `myfn_fwd`.
pub fn derived_name(entry: &str, mode: Mode) -> String {
    format!("{entry}_{}", mode.suffix())
}

pub fn differentiate(func: &Function, mode: Mode) -> Result<Function> {
    let derived = match mode {
        Mode::Forward => forward::forward(func),
        Mode::Reverse => reverse::reverse(func),
    };
    match &derived {
        Ok(d) => {
            let locals = d.locals.len();
            tracing::debug!(entry = %func.name, %mode, derived = %d.name, locals, "kernel differentiated")
        }
        Err(error) => tracing::debug!(entry = %func.name, %mode, %error, "differentiation failed"),
    }
    derived
}

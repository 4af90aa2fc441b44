//! Graph-to-graph differentiation. Both transforms dispatch to each node's
//! [`Primitive`](crate::Primitive) rules and compose freely.

mod jvp;
mod vjp;

pub use jvp::jvp;
pub use vjp::vjp;

//! Reference tracing host for kernax.
//!
//! A small graph IR with the hook points a foreign primitive plugs into:
//!
//! - [`Primitive`] - abstract evaluation, lowering, jvp and vjp rules
//! - [`GraphBuilder`] / [`Graph`] - tracing into an immutable arena graph
//! - [`infer_shapes`] - re-runs abstract evaluation over a graph
//! - [`lower`] / [`Program`] / [`Executor`] - executable representation
//! - [`transform::jvp`] / [`transform::vjp`] - graph differentiation

pub mod builtins;
pub mod error;
pub mod exec;
pub mod graph;
pub mod primitive;
pub mod program;
pub mod shape;
pub mod transform;


pub use builtins::{BinaryOp, Builtin, UnaryOp};
pub use error::{BoxError, Error, Result};
pub use exec::Executor;
pub use graph::{Graph, GraphBuilder, Node, NodeKind, Value, trace};
pub use primitive::{Primitive, Tangent};
pub use program::{ForeignFunction, Instruction, Program, Reg, lower};
pub use shape::infer_shapes;
pub use transform::{jvp, vjp};

/// Lower and run `graph` on `inputs`.
pub fn execute(graph: &Graph, inputs: &[kernax_device::Buffer]) -> Result<Vec<kernax_device::Buffer>> {
    Executor::new().run(&lower(graph)?, inputs)
}

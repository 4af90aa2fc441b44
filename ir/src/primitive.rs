//! The capability table every graph operation provides.

use kernax_dtype::ShapeSpec;

use crate::builtins::Builtin;
use crate::error::*;
use crate::graph::{GraphBuilder, Value};
use crate::program::{Instruction, Reg};

/// An operation the host knows how to type, lower and differentiate.
///
/// Built-in arithmetic implements this the same way a foreign kernel does; the
/// generic passes never look behind the trait except through [`Primitive::builtin`].
pub trait Primitive: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Result types for operands of the given types, without executing anything.
    fn abstract_eval(&self, operands: &[ShapeSpec]) -> Result<Vec<ShapeSpec>>;

    /// The single instruction this node becomes once lowered.
    fn lower(&self, operands: &[Reg], results: &[Reg]) -> Result<Instruction>;

    /// Emit primal results and their tangents into `builder`.
    fn jvp(
        &self,
        builder: &mut GraphBuilder,
        primals: &[Value],
        tangents: &[Tangent],
    ) -> Result<(Vec<Value>, Vec<Tangent>)>;

    /// Emit one cotangent per operand, given the primal operands, the primal
    /// results already present in `builder` and one cotangent per result.
    fn vjp(
        &self,
        builder: &mut GraphBuilder,
        primals: &[Value],
        outputs: &[Value],
        cotangents: &[Tangent],
    ) -> Result<Vec<Tangent>>;

    fn builtin(&self) -> Option<&Builtin> {
        None
    }
}

/// A tangent or cotangent, with zeros kept symbolic until something needs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Tangent {
    Zero(ShapeSpec),
    Value(Value),
}

impl Tangent {
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Zero(_))
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Zero(_) => None,
            Self::Value(v) => Some(*v),
        }
    }

    pub fn spec(&self, builder: &GraphBuilder) -> Result<ShapeSpec> {
        match self {
            Self::Zero(spec) => Ok(spec.clone()),
            Self::Value(v) => builder.spec(*v).cloned(),
        }
    }

    /// A concrete value, emitting zeros for a symbolic zero.
    pub fn materialize(&self, builder: &mut GraphBuilder) -> Value {
        match self {
            Self::Zero(spec) => builder.zeros(spec.clone()),
            Self::Value(v) => *v,
        }
    }

    pub fn add(builder: &mut GraphBuilder, lhs: &Tangent, rhs: &Tangent) -> Result<Tangent> {
        Ok(match (lhs, rhs) {
            (Self::Zero(_), other) | (other, Self::Zero(_)) => other.clone(),
            (Self::Value(a), Self::Value(b)) => Self::Value(builder.add(*a, *b)?),
        })
    }

    pub fn sub(builder: &mut GraphBuilder, lhs: &Tangent, rhs: &Tangent) -> Result<Tangent> {
        Ok(match (lhs, rhs) {
            (lhs, Self::Zero(_)) => lhs.clone(),
            (Self::Zero(_), rhs) => Self::neg(builder, rhs)?,
            (Self::Value(a), Self::Value(b)) => Self::Value(builder.sub(*a, *b)?),
        })
    }

    pub fn neg(builder: &mut GraphBuilder, t: &Tangent) -> Result<Tangent> {
        Ok(match t {
            Self::Zero(_) => t.clone(),
            Self::Value(v) => Self::Value(builder.neg(*v)?),
        })
    }

    /// `t * factor`.
    pub fn scale(builder: &mut GraphBuilder, t: &Tangent, factor: Value) -> Result<Tangent> {
        Ok(match t {
            Self::Zero(_) => t.clone(),
            Self::Value(v) => Self::Value(builder.mul(*v, factor)?),
        })
    }

    /// `t / divisor`.
    pub fn divide(builder: &mut GraphBuilder, t: &Tangent, divisor: Value) -> Result<Tangent> {
        Ok(match t {
            Self::Zero(_) => t.clone(),
            Self::Value(v) => Self::Value(builder.div(*v, divisor)?),
        })
    }
}

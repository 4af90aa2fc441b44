//! Same-shape elementwise arithmetic on floating point values.

use kernax_dtype::ShapeSpec;
use snafu::ensure;

use crate::error::*;
use crate::graph::{GraphBuilder, Value};
use crate::primitive::{Primitive, Tangent};
use crate::program::{Instruction, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
    Tanh,
}

impl UnaryOp {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Tanh => x.tanh(),
        }
    }

    /// `t * f'(x)` where `out = f(x)`. Scalar multiplication is self-adjoint,
    /// so this serves tangents and cotangents alike.
    fn chain(self, b: &mut GraphBuilder, x: Value, out: Value, t: &Tangent) -> Result<Tangent> {
        if t.is_zero() {
            return Ok(t.clone());
        }
        match self {
            Self::Neg => Tangent::neg(b, t),
            Self::Sin => {
                let d = b.cos(x)?;
                Tangent::scale(b, t, d)
            }
            Self::Cos => {
                let s = b.sin(x)?;
                let d = b.neg(s)?;
                Tangent::scale(b, t, d)
            }
            Self::Exp => Tangent::scale(b, t, out),
            Self::Log => Tangent::divide(b, t, x),
            Self::Sqrt => {
                let twice = b.add(out, out)?;
                Tangent::divide(b, t, twice)
            }
            Self::Tanh => {
                let spec = b.spec(out)?.clone();
                let one = b.constant(1.0, spec);
                let sq = b.mul(out, out)?;
                let d = b.sub(one, sq)?;
                Tangent::scale(b, t, d)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Every element equal to `value`.
    Constant { value: f64, spec: ShapeSpec },
    Zeros { spec: ShapeSpec },
}

impl Builtin {
    fn arity(&self) -> usize {
        match self {
            Self::Unary(_) => 1,
            Self::Binary(_) => 2,
            Self::Constant { .. } | Self::Zeros { .. } => 0,
        }
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        ensure!(
            actual == self.arity(),
            AritySnafu { primitive: self.name(), expected: self.arity(), actual }
        );
        Ok(())
    }
}

impl Primitive for Builtin {
    fn name(&self) -> &str {
        match self {
            Self::Unary(op) => op.into(),
            Self::Binary(op) => op.into(),
            Self::Constant { .. } => "constant",
            Self::Zeros { .. } => "zeros",
        }
    }

    fn abstract_eval(&self, operands: &[ShapeSpec]) -> Result<Vec<ShapeSpec>> {
        self.check_arity(operands.len())?;
        let spec = match (self, operands.split_first()) {
            (Self::Constant { spec, .. } | Self::Zeros { spec }, _) => spec.clone(),
            (_, None) => return AritySnafu { primitive: self.name(), expected: self.arity(), actual: 0usize }.fail(),
            (_, Some((first, rest))) => {
                for other in rest {
                    ensure!(
                        first == other,
                        ShapeMismatchSnafu { primitive: self.name(), lhs: first.clone(), rhs: other.clone() }
                    );
                }
                ensure!(
                    first.dtype().is_float(),
                    UnsupportedDTypeSnafu { primitive: self.name(), dtype: first.dtype() }
                );
                first.clone()
            }
        };
        Ok(vec![spec])
    }

    fn lower(&self, operands: &[Reg], results: &[Reg]) -> Result<Instruction> {
        self.check_arity(operands.len())?;
        let Some(&dst) = results.first() else {
            return RuleAritySnafu { primitive: self.name(), rule: "lower", expected: 1usize, actual: 0usize }.fail();
        };
        Ok(match self {
            Self::Unary(op) => Instruction::Unary { op: *op, dst, src: operands[0] },
            Self::Binary(op) => Instruction::Binary { op: *op, dst, lhs: operands[0], rhs: operands[1] },
            Self::Constant { value, spec } => Instruction::Const { dst, value: *value, spec: spec.clone() },
            Self::Zeros { spec } => Instruction::Zeros { dst, spec: spec.clone() },
        })
    }

    fn jvp(
        &self,
        b: &mut GraphBuilder,
        primals: &[Value],
        tangents: &[Tangent],
    ) -> Result<(Vec<Value>, Vec<Tangent>)> {
        self.check_arity(primals.len())?;
        self.check_arity(tangents.len())?;
        let (out, tangent) = match self {
            Self::Constant { value, spec } => (b.constant(*value, spec.clone()), Tangent::Zero(spec.clone())),
            Self::Zeros { spec } => (b.zeros(spec.clone()), Tangent::Zero(spec.clone())),
            Self::Unary(op) => {
                let out = b.unary(*op, primals[0])?;
                (out, op.chain(b, primals[0], out, &tangents[0])?)
            }
            Self::Binary(op) => {
                let (x, y) = (primals[0], primals[1]);
                let (tx, ty) = (&tangents[0], &tangents[1]);
                let out = b.binary(*op, x, y)?;
                let tangent = match op {
                    BinaryOp::Add => Tangent::add(b, tx, ty)?,
                    BinaryOp::Sub => Tangent::sub(b, tx, ty)?,
                    BinaryOp::Mul => {
                        let lhs = Tangent::scale(b, tx, y)?;
                        let rhs = Tangent::scale(b, ty, x)?;
                        Tangent::add(b, &lhs, &rhs)?
                    }
                    BinaryOp::Div => {
                        let through = Tangent::scale(b, ty, out)?;
                        let numerator = Tangent::sub(b, tx, &through)?;
                        Tangent::divide(b, &numerator, y)?
                    }
                };
                (out, tangent)
            }
        };
        Ok((vec![out], vec![tangent]))
    }

    fn vjp(
        &self,
        b: &mut GraphBuilder,
        primals: &[Value],
        outputs: &[Value],
        cotangents: &[Tangent],
    ) -> Result<Vec<Tangent>> {
        self.check_arity(primals.len())?;
        let (Some(&out), Some(ct)) = (outputs.first(), cotangents.first()) else {
            return RuleAritySnafu { primitive: self.name(), rule: "vjp", expected: 1usize, actual: 0usize }.fail();
        };
        Ok(match self {
            Self::Constant { .. } | Self::Zeros { .. } => Vec::new(),
            Self::Unary(op) => vec![op.chain(b, primals[0], out, ct)?],
            Self::Binary(op) => {
                let (x, y) = (primals[0], primals[1]);
                match op {
                    BinaryOp::Add => vec![ct.clone(), ct.clone()],
                    BinaryOp::Sub => vec![ct.clone(), Tangent::neg(b, ct)?],
                    BinaryOp::Mul => vec![Tangent::scale(b, ct, y)?, Tangent::scale(b, ct, x)?],
                    BinaryOp::Div => {
                        let dx = Tangent::divide(b, ct, y)?;
                        let through = Tangent::scale(b, ct, out)?;
                        let quotient = Tangent::divide(b, &through, y)?;
                        vec![dx, Tangent::neg(b, &quotient)?]
                    }
                }
            }
        })
    }

    fn builtin(&self) -> Option<&Builtin> {
        Some(self)
    }
}

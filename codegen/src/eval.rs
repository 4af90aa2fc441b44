//! Reference interpreter for KIR.
//!
//! Arithmetic is carried out in `f64` and rounded to the static type of every
//! expression node and every store, which reproduces `float`/`int` results of
//! the native build. Out-of-range subscripts, integer division by zero and
//! popping an empty tape are reported as errors instead of being undefined.

use kernax_device::Buffer;
use kernax_dtype::DType;
use snafu::ensure;

use crate::error::*;
use crate::kir::{Access, BinaryOp, Expr, Function, LocalKind, Place, Stmt, UnaryOp, Var};

/// Round `value` to what a variable of type `dtype` can hold.
pub fn round_to(dtype: DType, value: f64) -> f64 {
    match dtype {
        DType::Bool => f64::from(u8::from(value != 0.0)),
        DType::Int32 if value.is_finite() => f64::from(value.trunc() as i64 as i32),
        DType::Int64 if value.is_finite() => value.trunc(),
        DType::Int32 | DType::Int64 => 0.0,
        DType::Float32 => f64::from(value as f32),
        DType::Float64 => value,
    }
}

enum Slot {
    Scalar(f64),
    Tensor(Vec<f64>),
    Tape(Vec<f64>),
}

#[derive(PartialEq)]
enum Flow {
    Next,
    Return,
}

struct Frame<'a> {
    func: &'a Function,
    outputs: &'a mut [Buffer],
    inputs: &'a [Buffer],
    /// Buffer position of each parameter within `outputs`/`inputs`.
    slots: Vec<(Access, usize)>,
    locals: Vec<Slot>,
}

/// Run `func` with the given buffers. Outputs are not cleared first.
pub fn evaluate(func: &Function, outputs: &mut [Buffer], inputs: &[Buffer]) -> Result<()> {
    let (out_specs, in_specs) = func.signature();
    ensure!(
        out_specs.len() == outputs.len() && in_specs.len() == inputs.len(),
        SlotMismatchSnafu {
            reason: format!(
                "'{}' takes {} outputs and {} inputs, got {} and {}",
                func.name,
                out_specs.len(),
                in_specs.len(),
                outputs.len(),
                inputs.len()
            )
        }
    );
    for (spec, buffer) in out_specs.iter().chain(&in_specs).zip(outputs.iter().chain(inputs.iter())) {
        ensure!(
            spec == buffer.spec(),
            SlotMismatchSnafu { reason: format!("expected {spec}, got {}", buffer.spec()) }
        );
    }

    let mut counts = [0usize; 2];
    let slots = func
        .params
        .iter()
        .map(|p| {
            let k = usize::from(p.access == Access::Input);
            counts[k] += 1;
            (p.access, counts[k] - 1)
        })
        .collect();
    let locals = func
        .locals
        .iter()
        .map(|l| match &l.kind {
            LocalKind::Scalar(_) => Slot::Scalar(0.0),
            LocalKind::Tensor(spec) => Slot::Tensor(vec![0.0; spec.numel()]),
            LocalKind::Tape => Slot::Tape(Vec::new()),
        })
        .collect();

    let mut frame = Frame { func, outputs, inputs, slots, locals };
    frame.block(&func.body)?;
    Ok(())
}

impl Frame<'_> {
    fn block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if self.stmt(stmt)? == Flow::Return {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Next)
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Decl { local, init } => {
                let value = init.as_ref().map(|e| self.expr(e)).transpose()?;
                let dtype = self.func.var_dtype(Var::Local(*local));
                match &mut self.locals[*local] {
                    Slot::Scalar(v) => *v = value.map_or(0.0, |x| round_to(dtype, x)),
                    Slot::Tensor(data) => data.fill(0.0),
                    Slot::Tape(values) => values.clear(),
                }
            }
            Stmt::Assign { place, value } => {
                let value = self.expr(value)?;
                self.store(place, value)?;
            }
            Stmt::Push { tape, value } => {
                let value = self.expr(value)?;
                if let Slot::Tape(values) = &mut self.locals[*tape] {
                    values.push(value);
                }
            }
            Stmt::If { cond, then, otherwise } => {
                let branch = if self.expr(cond)? != 0.0 { then } else { otherwise };
                return self.block(branch);
            }
            Stmt::While { cond, body } => {
                while self.expr(cond)? != 0.0 {
                    if self.block(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
            }
            Stmt::For { init, cond, step, body } => {
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                loop {
                    if let Some(cond) = cond
                        && self.expr(cond)? == 0.0
                    {
                        break;
                    }
                    if self.block(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                    if let Some(step) = step {
                        self.stmt(step)?;
                    }
                }
            }
            Stmt::Return => return Ok(Flow::Return),
        }
        Ok(Flow::Next)
    }

    fn flat_index(&mut self, place: &Place) -> Result<usize> {
        let func = self.func;
        let dims = func.var_dims(place.var);
        let mut flat = 0usize;
        for (axis, (index, &extent)) in place.indices.iter().zip(dims).enumerate() {
            let i = self.expr(index)? as i64;
            ensure!(
                i >= 0 && (i as usize) < extent,
                IndexOutOfBoundsSnafu { name: func.var_name(place.var), axis, index: i, extent }
            );
            flat = flat * extent + i as usize;
        }
        Ok(flat)
    }

    fn load(&mut self, place: &Place) -> Result<f64> {
        let flat = self.flat_index(place)?;
        Ok(match place.var {
            Var::Param(p) => match self.slots[p] {
                (Access::Output, k) => self.outputs[k].load(flat),
                (Access::Input, k) => self.inputs[k].load(flat),
            },
            Var::Local(l) => match &self.locals[l] {
                Slot::Scalar(v) => *v,
                Slot::Tensor(data) => data[flat],
                Slot::Tape(_) => 0.0,
            },
        })
    }

    fn store(&mut self, place: &Place, value: f64) -> Result<()> {
        let flat = self.flat_index(place)?;
        let value = round_to(self.func.var_dtype(place.var), value);
        match place.var {
            Var::Param(p) => {
                if let (Access::Output, k) = self.slots[p] {
                    self.outputs[k].store(flat, value);
                }
            }
            Var::Local(l) => match &mut self.locals[l] {
                Slot::Scalar(v) => *v = value,
                Slot::Tensor(data) => data[flat] = value,
                Slot::Tape(_) => {}
            },
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<f64> {
        let value = match expr {
            Expr::Const { value, .. } => return Ok(*value),
            Expr::Load { place, .. } => return self.load(place),
            Expr::Pop { tape } => {
                let name = self.func.locals[*tape].name.clone();
                return match &mut self.locals[*tape] {
                    Slot::Tape(values) => values.pop().ok_or(Error::TapeUnderflow { name }),
                    _ => Err(Error::TapeUnderflow { name }),
                };
            }
            Expr::Unary { op, arg, .. } => {
                let a = self.expr(arg)?;
                match op {
                    UnaryOp::Neg => -a,
                    UnaryOp::Plus => a,
                    UnaryOp::Not => f64::from(u8::from(a == 0.0)),
                }
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs, .. } => {
                f64::from(u8::from(self.expr(lhs)? != 0.0 && self.expr(rhs)? != 0.0))
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs, .. } => {
                f64::from(u8::from(self.expr(lhs)? != 0.0 || self.expr(rhs)? != 0.0))
            }
            Expr::Binary { op, lhs, rhs, dtype } => {
                let operand = DType::promote(lhs.dtype(), rhs.dtype());
                let a = round_to(operand, self.expr(lhs)?);
                let b = round_to(operand, self.expr(rhs)?);
                binary(*op, a, b, *dtype)?
            }
            Expr::Select { cond, then, otherwise, .. } => {
                if self.expr(cond)? != 0.0 {
                    self.expr(then)?
                } else {
                    self.expr(otherwise)?
                }
            }
            Expr::Cast { arg, .. } => self.expr(arg)?,
            Expr::Call { func, args, dtype } => {
                let operand = if *dtype == DType::Float32 { DType::Float32 } else { DType::Float64 };
                let args = args.iter().map(|a| self.expr(a).map(|v| round_to(operand, v))).collect::<Result<Vec<_>>>()?;
                func.eval(&args)
            }
        };
        Ok(round_to(expr.dtype(), value))
    }
}

fn binary(op: BinaryOp, a: f64, b: f64, dtype: DType) -> Result<f64> {
    let truth = |t: bool| f64::from(u8::from(t));
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if dtype.is_float() => a / b,
        BinaryOp::Div => {
            ensure!(b != 0.0, DivisionByZeroSnafu);
            (a / b).trunc()
        }
        BinaryOp::Rem => {
            ensure!(b != 0.0, DivisionByZeroSnafu);
            a % b
        }
        BinaryOp::Lt => truth(a < b),
        BinaryOp::Le => truth(a <= b),
        BinaryOp::Gt => truth(a > b),
        BinaryOp::Ge => truth(a >= b),
        BinaryOp::Eq => truth(a == b),
        BinaryOp::Ne => truth(a != b),
        BinaryOp::And => truth(a != 0.0 && b != 0.0),
        BinaryOp::Or => truth(a != 0.0 || b != 0.0),
    })
}

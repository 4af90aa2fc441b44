//! Reference executor for lowered programs.

use kernax_device::Buffer;
use snafu::{OptionExt, ensure};

use crate::error::*;
use crate::program::{Instruction, Program, Reg};

/// Runs programs one instruction at a time.
///
/// Builtins are evaluated element by element in `f64` and stored back in the
/// register's dtype. Foreign calls hand their operands to the callee as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, program: &Program, inputs: &[Buffer]) -> Result<Vec<Buffer>> {
        ensure!(
            inputs.len() == program.inputs.len(),
            InputCountSnafu { expected: program.inputs.len(), actual: inputs.len() }
        );
        let mut registers: Vec<Option<Buffer>> = vec![None; program.registers.len()];
        for (index, (reg, buffer)) in program.inputs.iter().zip(inputs).enumerate() {
            let expected = &program.registers[reg.0];
            ensure!(
                expected == buffer.spec(),
                InputMismatchSnafu { index, expected: expected.clone(), actual: buffer.spec().clone() }
            );
            registers[reg.0] = Some(buffer.clone());
        }

        for instruction in &program.instructions {
            tracing::trace!(%instruction, "executing");
            match instruction {
                Instruction::Const { dst, value, spec } => registers[dst.0] = Some(Buffer::full(spec.clone(), *value)),
                Instruction::Zeros { dst, spec } => registers[dst.0] = Some(Buffer::zeros(spec.clone())),
                Instruction::Unary { op, dst, src } => {
                    let mut out = Buffer::zeros(program.registers[dst.0].clone());
                    let src = read(&registers, *src)?;
                    for i in 0..out.numel() {
                        out.store(i, op.apply(src.load(i)));
                    }
                    registers[dst.0] = Some(out);
                }
                Instruction::Binary { op, dst, lhs, rhs } => {
                    let mut out = Buffer::zeros(program.registers[dst.0].clone());
                    let (lhs, rhs) = (read(&registers, *lhs)?, read(&registers, *rhs)?);
                    for i in 0..out.numel() {
                        out.store(i, op.apply(lhs.load(i), rhs.load(i)));
                    }
                    registers[dst.0] = Some(out);
                }
                Instruction::ForeignCall { target, operands, results, .. } => {
                    let args = operands.iter().map(|&r| read(&registers, r).cloned()).collect::<Result<Vec<_>>>()?;
                    let outs = target
                        .call(&args)
                        .map_err(|cause| Error::Foreign { symbol: target.symbol().to_owned(), cause })?;
                    ensure!(
                        outs.len() == results.len(),
                        RuleAritySnafu {
                            primitive: target.symbol(),
                            rule: "call",
                            expected: results.len(),
                            actual: outs.len()
                        }
                    );
                    for (reg, buffer) in results.iter().zip(outs) {
                        registers[reg.0] = Some(buffer);
                    }
                }
            }
        }

        program.outputs.iter().map(|&r| read(&registers, r).cloned()).collect()
    }
}

fn read(registers: &[Option<Buffer>], reg: Reg) -> Result<&Buffer> {
    registers.get(reg.0).and_then(Option::as_ref).context(UnsetRegisterSnafu { register: reg.0 })
}

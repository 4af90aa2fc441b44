//! Lowering graphs to straight-line register programs.

use std::sync::Arc;

use kernax_device::Buffer;
use kernax_dtype::ShapeSpec;
use snafu::ensure;

use crate::builtins::{BinaryOp, UnaryOp};
use crate::error::*;
use crate::graph::{Graph, NodeKind, Value};

/// A virtual register holding one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub usize);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Native code the executor can call without knowing anything about it.
pub trait ForeignFunction: Send + Sync + std::fmt::Debug {
    /// The native entry this call resolves to.
    fn symbol(&self) -> &str;

    /// Compute every result from `inputs`.
    fn call(&self, inputs: &[Buffer]) -> Result<Vec<Buffer>, BoxError>;
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Const {
        dst: Reg,
        value: f64,
        spec: ShapeSpec,
    },
    Zeros {
        dst: Reg,
        spec: ShapeSpec,
    },
    Unary {
        op: UnaryOp,
        dst: Reg,
        src: Reg,
    },
    Binary {
        op: BinaryOp,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    /// Opaque call. Never fused with neighbouring instructions.
    ForeignCall {
        target: Arc<dyn ForeignFunction>,
        operands: Vec<Reg>,
        results: Vec<Reg>,
        /// Per operand, whether the callee reads it at all.
        reads: Vec<bool>,
    },
}

impl Instruction {
    pub fn results(&self) -> &[Reg] {
        match self {
            Self::Const { dst, .. } | Self::Zeros { dst, .. } | Self::Unary { dst, .. } | Self::Binary { dst, .. } => {
                std::slice::from_ref(dst)
            }
            Self::ForeignCall { results, .. } => results,
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Const { dst, value, spec } => write!(f, "{dst} = const {value} : {spec}"),
            Self::Zeros { dst, spec } => write!(f, "{dst} = zeros : {spec}"),
            Self::Unary { op, dst, src } => write!(f, "{dst} = {op} {src}"),
            Self::Binary { op, dst, lhs, rhs } => write!(f, "{dst} = {op} {lhs}, {rhs}"),
            Self::ForeignCall { target, operands, results, .. } => {
                let join = |regs: &[Reg]| regs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                write!(f, "{} = call {}({})", join(results), target.symbol(), join(operands))
            }
        }
    }
}

/// Straight-line program over virtual registers.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    /// Type of every register, indexed by register number.
    pub registers: Vec<ShapeSpec>,
    pub inputs: Vec<Reg>,
    pub outputs: Vec<Reg>,
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(|r| format!("{r}: {}", self.registers[r.0])).collect();
        writeln!(f, "program({}) {{", inputs.join(", "))?;
        for instruction in &self.instructions {
            writeln!(f, "    {instruction}")?;
        }
        let outputs: Vec<String> = self.outputs.iter().map(ToString::to_string).collect();
        write!(f, "    return {}\n}}", outputs.join(", "))
    }
}

/// Lower `graph` to a [`Program`], dropping nodes no output depends on.
pub fn lower(graph: &Graph) -> Result<Program> {
    let nodes = graph.nodes();
    let mut live = vec![false; nodes.len()];
    for v in graph.outputs() {
        live[v.node] = true;
    }
    for id in (0..nodes.len()).rev() {
        if live[id] {
            for operand in nodes[id].operands() {
                live[operand.node] = true;
            }
        }
    }

    let mut registers = Vec::new();
    let mut assigned: Vec<Vec<Reg>> = Vec::with_capacity(nodes.len());
    let mut inputs = vec![Reg(0); graph.inputs().len()];
    let mut instructions = Vec::new();

    for (id, node) in nodes.iter().enumerate() {
        let regs: Vec<Reg> = node
            .outputs
            .iter()
            .map(|spec| {
                registers.push(spec.clone());
                Reg(registers.len() - 1)
            })
            .collect();
        match &node.kind {
            NodeKind::Input(n) => inputs[*n] = regs[0],
            NodeKind::Apply { primitive, operands } if live[id] => {
                let operand_regs: Vec<Reg> = operands.iter().map(|v| assigned[v.node][v.output]).collect();
                let instruction = primitive.lower(&operand_regs, &regs)?;
                ensure!(
                    instruction.results().len() == regs.len(),
                    RuleAritySnafu {
                        primitive: primitive.name(),
                        rule: "lower",
                        expected: regs.len(),
                        actual: instruction.results().len()
                    }
                );
                instructions.push(instruction);
            }
            NodeKind::Apply { .. } => {}
        }
        assigned.push(regs);
    }

    let outputs = graph.outputs().iter().map(|&Value { node, output }| assigned[node][output]).collect();
    tracing::debug!(
        nodes = nodes.len(),
        instructions = instructions.len(),
        registers = registers.len(),
        "graph lowered"
    );
    Ok(Program { instructions, registers, inputs, outputs })
}

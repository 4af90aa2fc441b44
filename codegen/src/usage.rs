//! Per-argument effects of a kernel.
//!
//! An input that the body never loads is `ReadNone`: its value cannot affect
//! any output, so its cotangent is identically zero and a host may drop the
//! dependency. An output that is never stored to stays at its zero fill.

use crate::kir::{Access, Expr, Function, Stmt, Var, walk_body};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgUsage {
    ReadNone,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelEffects {
    pub inputs: Vec<ArgUsage>,
    pub outputs_written: Vec<bool>,
}

impl KernelEffects {
    /// Every input read, every output written: what is assumed when the body cannot be analysed.
    pub fn conservative(num_outputs: usize, num_inputs: usize) -> Self {
        Self { inputs: vec![ArgUsage::ReadOnly; num_inputs], outputs_written: vec![true; num_outputs] }
    }

    pub fn analyze(func: &Function) -> Self {
        let mut ordinal = Vec::with_capacity(func.params.len());
        let (mut outs, mut ins) = (0, 0);
        for p in &func.params {
            match p.access {
                Access::Output => {
                    ordinal.push(outs);
                    outs += 1;
                }
                Access::Input => {
                    ordinal.push(ins);
                    ins += 1;
                }
            }
        }

        let mut effects = Self { inputs: vec![ArgUsage::ReadNone; ins], outputs_written: vec![false; outs] };
        let mut mark_reads = |e: &Expr| {
            if let Expr::Load { place, .. } = e
                && let Var::Param(p) = place.var
                && func.params[p].access == Access::Input
            {
                effects.inputs[ordinal[p]] = ArgUsage::ReadOnly;
            }
        };
        let mut written = Vec::new();
        walk_body(&func.body, &mut |stmt| {
            for e in stmt.exprs() {
                e.visit(&mut mark_reads);
            }
            if let Stmt::Assign { place, .. } = stmt
                && let Var::Param(p) = place.var
            {
                written.push(p);
            }
        });
        for p in written {
            if func.params[p].access == Access::Output {
                effects.outputs_written[ordinal[p]] = true;
            }
        }
        effects
    }

    pub fn reads(&self, input: usize) -> bool {
        self.inputs.get(input).is_none_or(|u| *u == ArgUsage::ReadOnly)
    }
}

//! Reverse mode by recompute-and-restore.
//!
//! The derivative kernel first runs the primal (outputs go to local tensors),
//! saving on a tape the branches it takes and every overwritten value the
//! backward walk will read again. It then walks the statements backwards: each
//! assignment restores the old value if it was saved and hands its adjoint to
//! the variables its right-hand side reads. Loops run backwards from their last
//! iteration, so their bounds must not depend on anything the loop body writes.
//!
//! Tapes of the primal get a shadow tape: the adjoint of `x = t.pop()` is
//! pushed onto it and the matching `t.push(v)` pops it back into the adjoint
//! of `v`, so reverse-mode kernels can be differentiated again.

use kernax_codegen::kir::{
    Access, BinaryOp, Expr, Function, Local, LocalKind, Namer, Param, Place, Stmt, UnaryOp, Var, counter_loads,
    nest_loops, walk_body,
};
use kernax_dtype::DType;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::build::{add, div, lit, mul, neg, sub};
use crate::error::*;
use crate::{Mode, derived_name, remap, rules};

pub fn reverse(func: &Function) -> Result<Function> {
    check_reversible(func)?;

    let outputs: Vec<&Param> = func.outputs().collect();
    let inputs: Vec<&Param> = func.inputs().collect();
    let mut namer = func.namer();

    let mut params = Vec::with_capacity(2 * inputs.len() + outputs.len());
    for p in &inputs {
        params.push(Param { name: namer.fresh(&format!("d_{}", p.name)), access: Access::Output, ty: p.ty.clone() });
    }
    params.extend(inputs.iter().map(|p| (*p).clone()));
    for p in &outputs {
        params.push(Param { name: namer.fresh(&format!("d_{}", p.name)), access: Access::Input, ty: p.ty.clone() });
    }

    let mut locals = func.locals.clone();
    let push_local = |locals: &mut Vec<Local>, name: String, kind: LocalKind| {
        locals.push(Local { name, kind });
        locals.len() - 1
    };
    let output_locals: Vec<usize> =
        outputs.iter().map(|p| push_local(&mut locals, p.name.clone(), LocalKind::Tensor(p.ty.clone()))).collect();
    let accumulators: Vec<usize> = outputs
        .iter()
        .map(|p| push_local(&mut locals, namer.fresh(&format!("d_{}", p.name)), LocalKind::Tensor(p.ty.clone())))
        .collect();
    let adjoints: Vec<Option<usize>> = func
        .locals
        .iter()
        .map(|l| {
            let kind = match &l.kind {
                LocalKind::Scalar(d) if d.is_float() => LocalKind::Scalar(*d),
                LocalKind::Tensor(spec) if spec.dtype().is_float() => LocalKind::Tensor(spec.clone()),
                LocalKind::Tape => LocalKind::Tape,
                _ => return None,
            };
            Some(push_local(&mut locals, namer.fresh(&format!("d_{}", l.name)), kind))
        })
        .collect();

    let mut rev = Reverse {
        func,
        num_outputs: outputs.len(),
        num_inputs: inputs.len(),
        namer,
        hoisted: (0..locals.len()).collect(),
        locals,
        output_locals,
        accumulators,
        adjoints,
        reread: reread(&func.body),
        tape: None,
        temps: FxHashMap::default(),
        counters: Vec::new(),
    };

    let mut body = rev.prologue();
    rev.forward_block(&func.body, &mut body)?;
    rev.reverse_block(&func.body, &mut body)?;

    let mut decls: Vec<Stmt> = rev.hoisted.iter().map(|&local| Stmt::Decl { local, init: None }).collect();
    decls.append(&mut body);
    Ok(Function { name: derived_name(&func.name, Mode::Reverse), params, locals: rev.locals, body: decls })
}

fn check_reversible(func: &Function) -> Result<()> {
    let mut found = None;
    walk_body(&func.body, &mut |stmt| match stmt {
        Stmt::While { .. } => found = found.or(Some("while loops")),
        Stmt::Return => found = found.or(Some("return statements")),
        _ => {}
    });
    match found {
        Some(construct) => UnsupportedSnafu { construct }.fail(),
        None => Ok(()),
    }
}

/// Variables whose values the backward walk reads: indices, loop bounds and the
/// operands of nonlinear arithmetic. Adjoints of sums and casts do not depend
/// on the primal, so operands read only that way never need restoring.
fn reread(body: &[Stmt]) -> FxHashSet<Var> {
    let mut vars = FxHashSet::default();
    walk_body(body, &mut |stmt| match stmt {
        Stmt::Decl { init: Some(value), .. } | Stmt::Push { value, .. } => value_reads(value, true, &mut vars),
        Stmt::Assign { place, value } => {
            place.indices.iter().for_each(|i| value_reads(i, false, &mut vars));
            value_reads(value, true, &mut vars);
        }
        Stmt::For { init, cond, step, .. } => {
            let header = init.iter().chain(step).flat_map(|s| s.exprs()).chain(cond);
            header.for_each(|e| value_reads(e, false, &mut vars));
        }
        Stmt::Decl { init: None, .. } | Stmt::If { .. } | Stmt::While { .. } | Stmt::Return => {}
    });
    vars
}

fn value_reads(e: &Expr, linear: bool, vars: &mut FxHashSet<Var>) {
    match e {
        Expr::Const { .. } | Expr::Pop { .. } => {}
        Expr::Load { place, .. } => {
            if !linear {
                vars.insert(place.var);
            }
            place.indices.iter().for_each(|i| value_reads(i, false, vars));
        }
        Expr::Unary { op: UnaryOp::Neg | UnaryOp::Plus, arg, .. } | Expr::Cast { arg, .. } => {
            value_reads(arg, linear, vars)
        }
        Expr::Binary { op: BinaryOp::Add | BinaryOp::Sub, lhs, rhs, .. } => {
            value_reads(lhs, linear, vars);
            value_reads(rhs, linear, vars);
        }
        Expr::Select { cond, then, otherwise, .. } => {
            value_reads(cond, false, vars);
            value_reads(then, linear, vars);
            value_reads(otherwise, linear, vars);
        }
        Expr::Unary { .. } | Expr::Binary { .. } | Expr::Call { .. } => e.visit(&mut |e| {
            if let Expr::Load { place, .. } = e {
                vars.insert(place.var);
            }
        }),
    }
}

/// Whether `counter` is read anywhere but inside the loops it drives.
fn read_outside_loops(body: &[Stmt], counter: usize) -> bool {
    let var = Var::Local(counter);
    let reads = |s: &Stmt| s.exprs().iter().any(|e| e.reads(var));
    body.iter().any(|stmt| match stmt {
        Stmt::For { init, cond, step, body } => {
            let drives = match init.as_deref() {
                Some(Stmt::Decl { local, .. }) => *local == counter,
                Some(Stmt::Assign { place, .. }) => place.var == var && place.indices.is_empty(),
                _ => false,
            };
            !drives
                && (init.iter().chain(step).any(|s| reads(s.as_ref()))
                    || cond.as_ref().is_some_and(|c| c.reads(var))
                    || read_outside_loops(body, counter))
        }
        Stmt::If { cond, then, otherwise } => {
            cond.reads(var) || read_outside_loops(then, counter) || read_outside_loops(otherwise, counter)
        }
        Stmt::While { cond, body } => cond.reads(var) || read_outside_loops(body, counter),
        other => reads(other),
    })
}

/// `for (counter = start; counter < bound; counter += stride)`, or the same
/// counting down with `>`; `<=` and `>=` are folded into the exclusive `bound`.
struct CountedLoop {
    counter: usize,
    start: Expr,
    bound: Expr,
    stride: Expr,
    descending: bool,
}

struct Reverse<'a> {
    func: &'a Function,
    num_outputs: usize,
    num_inputs: usize,
    namer: Namer,
    locals: Vec<Local>,
    /// Locals declared (zeroed) at the top of the body.
    hoisted: Vec<usize>,
    output_locals: Vec<usize>,
    accumulators: Vec<usize>,
    /// Adjoint of each original local; tapes map to their shadow tape.
    adjoints: Vec<Option<usize>>,
    reread: FxHashSet<Var>,
    /// Created on the first save.
    tape: Option<usize>,
    /// One adjoint temporary per floating-point type.
    temps: FxHashMap<DType, usize>,
    /// Counters of the prologue loops, declared by the loops themselves.
    counters: Vec<usize>,
}

impl Reverse<'_> {
    fn primal(&self, var: Var) -> Var {
        match var {
            Var::Param(i) if i < self.num_outputs => Var::Local(self.output_locals[i]),
            Var::Param(i) => Var::Param(self.num_inputs + i - self.num_outputs),
            local => local,
        }
    }

    /// Integer and boolean slots are inactive: their cotangents stay zero.
    fn adjoint(&self, var: Var) -> Option<Var> {
        match var {
            Var::Param(i) if !self.func.params[i].ty.dtype().is_float() => None,
            Var::Param(i) if i < self.num_outputs => Some(Var::Local(self.accumulators[i])),
            Var::Param(i) => Some(Var::Param(i - self.num_outputs)),
            Var::Local(i) => self.adjoints.get(i).copied().flatten().map(Var::Local),
        }
    }

    fn shadow_tape(&self, tape: usize) -> usize {
        self.adjoints.get(tape).copied().flatten().unwrap_or(tape)
    }

    fn remap(&self, e: &Expr) -> Expr {
        remap::expr(e, &|v| self.primal(v))
    }

    fn remap_place(&self, p: &Place) -> Place {
        remap::place(p, &|v| self.primal(v))
    }

    fn new_local(&mut self, base: &str, kind: LocalKind, hoist: bool) -> usize {
        let name = self.namer.fresh(base);
        self.locals.push(Local { name, kind });
        let id = self.locals.len() - 1;
        if hoist {
            self.hoisted.push(id);
        }
        id
    }

    fn temp(&mut self, dtype: DType) -> usize {
        if let Some(&t) = self.temps.get(&dtype) {
            return t;
        }
        let t = self.new_local("adj", LocalKind::Scalar(dtype), true);
        self.temps.insert(dtype, t);
        t
    }

    fn loop_counters(&mut self, rank: usize) -> Vec<usize> {
        while self.counters.len() < rank {
            let c = self.new_local("i", LocalKind::Scalar(DType::Int32), false);
            self.counters.push(c);
        }
        self.counters[..rank].to_vec()
    }

    fn tape(&mut self) -> usize {
        match self.tape {
            Some(tape) => tape,
            None => {
                let tape = self.new_local("saved", LocalKind::Tape, true);
                self.tape = Some(tape);
                tape
            }
        }
    }

    fn save(&mut self, value: Expr, out: &mut Vec<Stmt>) {
        let tape = self.tape();
        out.push(Stmt::Push { tape, value });
    }

    fn pop(&mut self) -> Expr {
        Expr::Pop { tape: self.tape() }
    }

    /// Zero the input cotangents and seed the output adjoints from the incoming cotangents.
    fn prologue(&mut self) -> Vec<Stmt> {
        let func = self.func;
        let mut body = Vec::new();
        for (j, p) in func.inputs().enumerate() {
            let counters = self.loop_counters(p.ty.rank());
            let place = Place { var: Var::Param(j), indices: counter_loads(&counters) };
            let zero = Stmt::Assign { place, value: lit(0.0, p.ty.dtype()) };
            body.extend(nest_loops(&counters, p.ty.dims(), vec![zero]));
        }
        for (k, p) in func.outputs().enumerate() {
            if !p.ty.dtype().is_float() {
                continue;
            }
            let counters = self.loop_counters(p.ty.rank());
            let incoming = Place { var: Var::Param(2 * self.num_inputs + k), indices: counter_loads(&counters) };
            let seed = Stmt::Assign {
                place: incoming.with_var(Var::Local(self.accumulators[k])),
                value: Expr::load(incoming, p.ty.dtype()),
            };
            body.extend(nest_loops(&counters, p.ty.dims(), vec![seed]));
        }
        body
    }

    // ---- forward sweep ---------------------------------------------------------------

    fn forward_block(&mut self, body: &[Stmt], out: &mut Vec<Stmt>) -> Result<()> {
        for stmt in body {
            self.forward_stmt(stmt, out)?;
        }
        Ok(())
    }

    fn taped_assign(&mut self, place: Place, value: Expr, out: &mut Vec<Stmt>) {
        let primal_place = self.remap_place(&place);
        if self.reread.contains(&place.var) {
            let dtype = self.func.var_dtype(place.var);
            self.save(Expr::load(primal_place.clone(), dtype), out);
        }
        out.push(Stmt::Assign { place: primal_place, value: self.remap(&value) });
    }

    fn forward_stmt(&mut self, stmt: &Stmt, out: &mut Vec<Stmt>) -> Result<()> {
        match stmt {
            Stmt::Decl { local, init } => {
                if let LocalKind::Scalar(dtype) = self.func.locals[*local].kind {
                    let value = init.clone().unwrap_or_else(|| lit(0.0, dtype));
                    self.taped_assign(Place::scalar(Var::Local(*local)), value, out);
                }
            }
            Stmt::Assign { place, value } => self.taped_assign(place.clone(), value.clone(), out),
            Stmt::Push { tape, value } => out.push(Stmt::Push { tape: *tape, value: self.remap(value) }),
            Stmt::If { cond, then, otherwise } => {
                let (mut t, mut o) = (Vec::new(), Vec::new());
                self.forward_block(then, &mut t)?;
                self.forward_block(otherwise, &mut o)?;
                self.save(lit(1.0, DType::Float64), &mut t);
                self.save(lit(0.0, DType::Float64), &mut o);
                out.push(Stmt::If { cond: self.remap(cond), then: t, otherwise: o });
            }
            Stmt::For { init, cond, step, body } => {
                let lp = self.counted_loop(init.as_deref(), cond.as_ref(), step.as_deref(), body)?;
                let counter = Place::scalar(Var::Local(lp.counter));
                if read_outside_loops(&self.func.body, lp.counter) {
                    let dtype = self.func.var_dtype(counter.var);
                    self.save(Expr::load(counter.clone(), dtype), out);
                }

                let mut new_body = Vec::new();
                self.forward_block(body, &mut new_body)?;
                out.push(Stmt::For {
                    init: Some(Box::new(Stmt::Assign { place: counter, value: self.remap(&lp.start) })),
                    cond: cond.as_ref().map(|c| self.remap(c)),
                    step: step.as_deref().map(|s| Box::new(self.remap_stmt(s))),
                    body: new_body,
                });
            }
            Stmt::While { .. } | Stmt::Return => {
                return UnsupportedSnafu { construct: "this statement" }.fail();
            }
        }
        Ok(())
    }

    fn remap_stmt(&self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::Assign { place, value } => Stmt::Assign { place: self.remap_place(place), value: self.remap(value) },
            other => other.clone(),
        }
    }

    fn counted_loop(
        &self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Stmt>,
        body: &[Stmt],
    ) -> Result<CountedLoop> {
        let (counter, start) = match init {
            Some(Stmt::Decl { local, init: Some(start) }) => (*local, start.clone()),
            Some(Stmt::Assign { place: Place { var: Var::Local(local), indices }, value }) if indices.is_empty() => {
                (*local, value.clone())
            }
            _ => return self.irreversible("?", "the initialiser must set an integer counter"),
        };
        let name = self.func.locals[counter].name.as_str();
        if !matches!(self.func.locals[counter].kind, LocalKind::Scalar(d) if d.is_int()) {
            return self.irreversible(name, "the counter must be an integer scalar");
        }
        let var = Var::Local(counter);
        let is_counter =
            |e: &Expr| matches!(e, Expr::Load { place, .. } if place.var == var && place.indices.is_empty());

        let compared = match cond {
            Some(Expr::Binary { op, lhs, rhs, .. }) if is_counter(&**lhs) => Some((*op, (**rhs).clone())),
            _ => None,
        };
        let one = lit(1.0, DType::Int32);
        let (bound, descending) = match compared {
            Some((BinaryOp::Lt, rhs)) => (rhs, false),
            Some((BinaryOp::Le, rhs)) => (add(rhs, one), false),
            Some((BinaryOp::Gt, rhs)) => (rhs, true),
            Some((BinaryOp::Ge, rhs)) => (sub(rhs, one), true),
            _ => return self.irreversible(name, "the condition must compare the counter with <, <=, > or >="),
        };
        let toward = if descending { BinaryOp::Sub } else { BinaryOp::Add };
        let stride = match step {
            Some(Stmt::Assign { place, value: Expr::Binary { op, lhs, rhs, .. } })
                if *op == toward && place.var == var && place.indices.is_empty() && is_counter(&**lhs) =>
            {
                (**rhs).clone()
            }
            _ => return self.irreversible(name, "the step must move the counter towards its bound"),
        };
        if matches!(stride, Expr::Const { value, .. } if value <= 0.0) {
            return self.irreversible(name, "the stride must be positive");
        }

        let mut written = vec![var];
        walk_body(body, &mut |stmt| match stmt {
            Stmt::Assign { place, .. } => written.push(place.var),
            Stmt::Decl { local, .. } => written.push(Var::Local(*local)),
            _ => {}
        });
        if written[1..].contains(&var) {
            return self.irreversible(name, "the body assigns the counter");
        }
        for bound in [&start, &bound, &stride] {
            if written.iter().any(|&w| bound.reads(w)) {
                return self.irreversible(name, "the bounds change inside the loop");
            }
        }
        Ok(CountedLoop { counter, start, bound, stride, descending })
    }

    fn irreversible<T>(&self, counter: &str, reason: &str) -> Result<T> {
        IrreversibleLoopSnafu { counter, reason }.fail()
    }

    // ---- reverse sweep ---------------------------------------------------------------

    fn reverse_block(&mut self, body: &[Stmt], out: &mut Vec<Stmt>) -> Result<()> {
        for stmt in body.iter().rev() {
            self.reverse_stmt(stmt, out)?;
        }
        Ok(())
    }

    fn reverse_stmt(&mut self, stmt: &Stmt, out: &mut Vec<Stmt>) -> Result<()> {
        match stmt {
            Stmt::Decl { local, init } => {
                if let LocalKind::Scalar(dtype) = self.func.locals[*local].kind {
                    let value = init.clone().unwrap_or_else(|| lit(0.0, dtype));
                    self.restore(&Place::scalar(Var::Local(*local)), &value, out)?;
                }
            }
            Stmt::Assign { place, value } => self.restore(place, value, out)?,
            Stmt::Push { tape, value } => {
                // every push gets exactly one shadow pop, inactive values included
                let temp = Place::scalar(Var::Local(self.temp(DType::Float64)));
                out.push(Stmt::Assign { place: temp.clone(), value: Expr::Pop { tape: self.shadow_tape(*tape) } });
                let adj = Expr::cast(Expr::load(temp, DType::Float64), value.dtype());
                self.propagate(value, adj, out)?;
            }
            Stmt::If { then, otherwise, .. } => {
                let flag = self.new_local("br", LocalKind::Scalar(DType::Float64), true);
                let flag_place = Place::scalar(Var::Local(flag));
                let recorded = self.pop();
                out.push(Stmt::Assign { place: flag_place.clone(), value: recorded });
                let (mut t, mut o) = (Vec::new(), Vec::new());
                self.reverse_block(then, &mut t)?;
                self.reverse_block(otherwise, &mut o)?;
                let recorded = Expr::load(flag_place, DType::Float64);
                let taken = Expr::binary(BinaryOp::Ne, recorded, lit(0.0, DType::Float64));
                out.push(Stmt::If { cond: taken, then: t, otherwise: o });
            }
            Stmt::For { init, cond, step, body } => {
                let lp = self.counted_loop(init.as_deref(), cond.as_ref(), step.as_deref(), body)?;
                let counter = Place::scalar(Var::Local(lp.counter));
                let dtype = self.func.var_dtype(counter.var);
                let (start, bound, stride) = (self.remap(&lp.start), self.remap(&lp.bound), self.remap(&lp.stride));

                // last = start ± ((|bound - start| + stride - 1) / stride - 1) * stride
                let one = lit(1.0, DType::Int32);
                let distance = if lp.descending { sub(start.clone(), bound) } else { sub(bound, start.clone()) };
                let passes = div(sub(add(distance, stride.clone()), one.clone()), stride.clone());
                let offset = mul(sub(passes, one), stride.clone());
                let load = Expr::load(counter.clone(), dtype);
                let (last, back, advance) = if lp.descending {
                    (sub(start.clone(), offset), BinaryOp::Le, add(load.clone(), stride))
                } else {
                    (add(start.clone(), offset), BinaryOp::Ge, sub(load.clone(), stride))
                };

                let mut new_body = Vec::new();
                self.reverse_block(body, &mut new_body)?;
                out.push(Stmt::For {
                    init: Some(Box::new(Stmt::Assign { place: counter.clone(), value: last })),
                    cond: Some(Expr::binary(back, load, start)),
                    step: Some(Box::new(Stmt::Assign { place: counter.clone(), value: advance })),
                    body: new_body,
                });
                if read_outside_loops(&self.func.body, lp.counter) {
                    let saved = self.pop();
                    out.push(Stmt::Assign { place: counter, value: saved });
                }
            }
            Stmt::While { .. } | Stmt::Return => {
                return UnsupportedSnafu { construct: "this statement" }.fail();
            }
        }
        Ok(())
    }

    /// Undo `place = value` and pass the adjoint of `place` on to what `value` reads.
    fn restore(&mut self, place: &Place, value: &Expr, out: &mut Vec<Stmt>) -> Result<()> {
        let primal_place = self.remap_place(place);
        if self.reread.contains(&place.var) {
            let saved = self.pop();
            out.push(Stmt::Assign { place: primal_place.clone(), value: saved });
        }

        let dtype = self.func.var_dtype(place.var);
        let adjoint = self.adjoint(place.var).map(|adjoint| primal_place.with_var(adjoint));
        if let Expr::Pop { tape } = value {
            let shadow = self.shadow_tape(*tape);
            let pushed = adjoint.clone().map_or_else(|| lit(0.0, DType::Float64), |a| Expr::load(a, dtype));
            out.push(Stmt::Push { tape: shadow, value: pushed });
            if let Some(adjoint) = adjoint {
                out.push(Stmt::Assign { place: adjoint, value: lit(0.0, dtype) });
            }
            return Ok(());
        }

        let Some(adjoint_place) = adjoint else {
            return Ok(());
        };
        let temp = Place::scalar(Var::Local(self.temp(dtype)));
        out.push(Stmt::Assign { place: temp.clone(), value: Expr::load(adjoint_place.clone(), dtype) });
        out.push(Stmt::Assign { place: adjoint_place, value: lit(0.0, dtype) });
        self.propagate(value, Expr::load(temp, dtype), out)
    }

    fn is_active(&self, e: &Expr) -> bool {
        e.any(&|e| matches!(e, Expr::Load { place, dtype } if dtype.is_float() && self.adjoint(place.var).is_some()))
    }

    /// Accumulate `adj * ∂e/∂v` into the adjoint of every variable `v` that `e` reads.
    fn propagate(&mut self, e: &Expr, adj: Expr, out: &mut Vec<Stmt>) -> Result<()> {
        if !e.dtype().is_float() || !self.is_active(e) {
            return Ok(());
        }
        match e {
            Expr::Load { place, dtype } => {
                if let Some(adjoint) = self.adjoint(place.var) {
                    let target = self.remap_place(place).with_var(adjoint);
                    let value = add(Expr::load(target.clone(), *dtype), Expr::cast(adj, *dtype));
                    out.push(Stmt::Assign { place: target, value });
                }
            }
            Expr::Unary { op: UnaryOp::Neg, arg, .. } => self.propagate(arg, neg(adj), out)?,
            Expr::Unary { op: UnaryOp::Plus, arg, .. } => self.propagate(arg, adj, out)?,
            Expr::Binary { op, lhs, rhs, .. } => {
                let (l, r) = (self.remap(lhs), self.remap(rhs));
                match op {
                    BinaryOp::Add => {
                        self.propagate(lhs, adj.clone(), out)?;
                        self.propagate(rhs, adj, out)?;
                    }
                    BinaryOp::Sub => {
                        self.propagate(lhs, adj.clone(), out)?;
                        self.propagate(rhs, neg(adj), out)?;
                    }
                    BinaryOp::Mul => {
                        self.propagate(lhs, mul(adj.clone(), r), out)?;
                        self.propagate(rhs, mul(l, adj), out)?;
                    }
                    BinaryOp::Div => {
                        self.propagate(lhs, div(adj.clone(), r.clone()), out)?;
                        self.propagate(rhs, neg(div(mul(adj, l), mul(r.clone(), r))), out)?;
                    }
                    _ => {}
                }
            }
            Expr::Select { cond, then, otherwise, .. } => {
                let (mut t, mut o) = (Vec::new(), Vec::new());
                self.propagate(then, adj.clone(), &mut t)?;
                self.propagate(otherwise, adj, &mut o)?;
                if !t.is_empty() || !o.is_empty() {
                    out.push(Stmt::If { cond: self.remap(cond), then: t, otherwise: o });
                }
            }
            Expr::Cast { arg, .. } => {
                let dtype = arg.dtype();
                self.propagate(arg, Expr::cast(adj, dtype), out)?;
            }
            Expr::Call { func, args, dtype } => {
                let primals: Vec<Expr> = args.iter().map(|a| self.remap(a)).collect();
                let partials = rules::partials(*func, &primals, *dtype)?;
                for (arg, partial) in args.iter().zip(partials) {
                    self.propagate(arg, mul(adj.clone(), partial), out)?;
                }
            }
            Expr::Const { .. } | Expr::Unary { op: UnaryOp::Not, .. } | Expr::Pop { .. } => {}
        }
        Ok(())
    }
}

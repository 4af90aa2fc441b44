//! Forward mode: every floating-point variable gets a tangent shadow that is
//! updated right before the primal statement it mirrors.
//!
//! Parameters come in `(primal, tangent)` pairs; the tangents of integer and
//! boolean slots are always zero. Tapes get a shadow tape, so a kernel that
//! saves values (such as a reverse-mode derivative) can be differentiated
//! again in forward mode.

use kernax_codegen::kir::{BinaryOp, Expr, Function, Local, LocalKind, Namer, Param, Place, Stmt, UnaryOp, Var};
use kernax_dtype::DType;

use crate::build::{div, lit, mul, neg, sum};
use crate::error::*;
use crate::{Mode, derived_name, remap, rules};

pub fn forward(func: &Function) -> Result<Function> {
    let mut namer = func.namer();
    let mut params = Vec::with_capacity(2 * func.params.len());
    for p in &func.params {
        params.push(p.clone());
        params.push(Param { name: namer.fresh(&format!("d_{}", p.name)), access: p.access, ty: p.ty.clone() });
    }

    let mut locals = func.locals.clone();
    let mut shadows = vec![None; func.locals.len()];
    for (i, local) in func.locals.iter().enumerate() {
        let kind = match &local.kind {
            LocalKind::Scalar(d) if d.is_float() => LocalKind::Scalar(*d),
            LocalKind::Tensor(spec) if spec.dtype().is_float() => LocalKind::Tensor(spec.clone()),
            LocalKind::Tape => LocalKind::Tape,
            LocalKind::Scalar(_) | LocalKind::Tensor(_) => continue,
        };
        locals.push(Local { name: namer.fresh(&format!("d_{}", local.name)), kind });
        shadows[i] = Some(locals.len() - 1);
    }

    let float_params = func.params.iter().map(|p| p.ty.dtype().is_float()).collect();
    let mut fwd = Forward { namer, locals, shadows, float_params, sink: None };
    let mut body = Vec::new();
    fwd.block(&func.body, &mut body)?;
    if let Some(sink) = fwd.sink {
        body.insert(0, Stmt::Decl { local: sink, init: None });
    }

    Ok(Function { name: derived_name(&func.name, Mode::Forward), params, locals: fwd.locals, body })
}

struct Forward {
    namer: Namer,
    locals: Vec<Local>,
    /// Tangent local of each original local, if it has one.
    shadows: Vec<Option<usize>>,
    /// Integer and boolean slots keep a zero tangent whatever they are assigned.
    float_params: Vec<bool>,
    /// Receives shadow-tape values popped alongside pops into integer variables.
    sink: Option<usize>,
}

fn primal(var: Var) -> Var {
    match var {
        Var::Param(i) => Var::Param(2 * i),
        local => local,
    }
}

impl Forward {
    fn tangent_var(&self, var: Var) -> Option<Var> {
        match var {
            Var::Param(i) => Some(Var::Param(2 * i + 1)),
            Var::Local(i) => self.shadows[i].map(Var::Local),
        }
    }

    fn shadow_tape(&self, tape: usize) -> usize {
        self.shadows[tape].unwrap_or(tape)
    }

    fn remap(&self, e: &Expr) -> Expr {
        remap::expr(e, &primal)
    }

    fn block(&mut self, body: &[Stmt], out: &mut Vec<Stmt>) -> Result<()> {
        for stmt in body {
            self.stmt(stmt, out)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt, out: &mut Vec<Stmt>) -> Result<()> {
        match stmt {
            Stmt::Decl { local, init } => {
                match (self.shadows[*local], init) {
                    (Some(shadow), Some(init)) => {
                        let dtype = init.dtype();
                        let init = self.tangent(init)?.unwrap_or_else(|| lit(0.0, dtype));
                        out.push(Stmt::Decl { local: shadow, init: Some(init) });
                    }
                    (Some(shadow), None) => out.push(Stmt::Decl { local: shadow, init: None }),
                    (None, Some(Expr::Pop { tape })) => self.discard(*tape, out),
                    (None, _) => {}
                }
                out.push(Stmt::Decl { local: *local, init: init.as_ref().map(|e| self.remap(e)) });
            }
            Stmt::Assign { place, value } => {
                let primal_place = remap::place(place, &primal);
                match self.tangent_var(place.var) {
                    Some(shadow) => {
                        let dtype = value.dtype();
                        let inactive = matches!(place.var, Var::Param(i) if !self.float_params[i]);
                        let tangent = match value {
                            Expr::Pop { tape } if inactive => {
                                self.discard(*tape, out);
                                None
                            }
                            _ if inactive => None,
                            _ => self.tangent(value)?,
                        };
                        let tangent = tangent.unwrap_or_else(|| lit(0.0, dtype));
                        out.push(Stmt::Assign { place: primal_place.with_var(shadow), value: tangent });
                    }
                    None => {
                        if let Expr::Pop { tape } = value {
                            self.discard(*tape, out);
                        }
                    }
                }
                out.push(Stmt::Assign { place: primal_place, value: self.remap(value) });
            }
            Stmt::Push { tape, value } => {
                let tangent = self.tangent(value)?.unwrap_or_else(|| lit(0.0, DType::Float64));
                out.push(Stmt::Push { tape: self.shadow_tape(*tape), value: tangent });
                out.push(Stmt::Push { tape: *tape, value: self.remap(value) });
            }
            Stmt::If { cond, then, otherwise } => {
                let (mut t, mut o) = (Vec::new(), Vec::new());
                self.block(then, &mut t)?;
                self.block(otherwise, &mut o)?;
                out.push(Stmt::If { cond: self.remap(cond), then: t, otherwise: o });
            }
            Stmt::For { init, cond, step, body } => {
                let mut init_stmts = Vec::new();
                if let Some(init) = init {
                    self.stmt(init, &mut init_stmts)?;
                }
                let mut step_stmts = Vec::new();
                if let Some(step) = step {
                    self.stmt(step, &mut step_stmts)?;
                }
                let mut new_body = Vec::new();
                self.block(body, &mut new_body)?;

                // a header slot holds a single statement; a floating-point counter needs two
                let init = match init_stmts.len() {
                    0 | 1 => init_stmts.pop().map(Box::new),
                    _ => {
                        out.append(&mut init_stmts);
                        None
                    }
                };
                let step = match step_stmts.len() {
                    0 | 1 => step_stmts.pop().map(Box::new),
                    _ => {
                        new_body.append(&mut step_stmts);
                        None
                    }
                };
                out.push(Stmt::For { init, cond: cond.as_ref().map(|c| self.remap(c)), step, body: new_body });
            }
            Stmt::While { cond, body } => {
                let mut new_body = Vec::new();
                self.block(body, &mut new_body)?;
                out.push(Stmt::While { cond: self.remap(cond), body: new_body });
            }
            Stmt::Return => out.push(Stmt::Return),
        }
        Ok(())
    }

    /// Keep the shadow tape in step with a pop whose primal target has no tangent.
    fn discard(&mut self, tape: usize, out: &mut Vec<Stmt>) {
        let sink = match self.sink {
            Some(sink) => sink,
            None => {
                let name = self.namer.fresh("sink");
                self.locals.push(Local { name, kind: LocalKind::Scalar(DType::Float64) });
                let sink = self.locals.len() - 1;
                self.sink = Some(sink);
                sink
            }
        };
        out.push(Stmt::Assign {
            place: Place::scalar(Var::Local(sink)),
            value: Expr::Pop { tape: self.shadow_tape(tape) },
        });
    }

    /// Tangent of `e`; `None` is a symbolic zero.
    fn tangent(&self, e: &Expr) -> Result<Option<Expr>> {
        if !e.dtype().is_float() {
            return Ok(None);
        }
        Ok(match e {
            Expr::Const { .. } => None,
            Expr::Load { place, dtype } => {
                self.tangent_var(place.var).map(|v| Expr::load(remap::place(place, &primal).with_var(v), *dtype))
            }
            Expr::Unary { op, arg, .. } => match op {
                UnaryOp::Neg => self.tangent(arg)?.map(neg),
                UnaryOp::Plus => self.tangent(arg)?,
                UnaryOp::Not => None,
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                let (dl, dr) = (self.tangent(lhs)?, self.tangent(rhs)?);
                let (l, r) = (self.remap(lhs), self.remap(rhs));
                match op {
                    BinaryOp::Add => sum(dl, dr),
                    BinaryOp::Sub => sum(dl, dr.map(neg)),
                    BinaryOp::Mul => sum(dl.map(|d| mul(d, r.clone())), dr.map(|d| mul(l.clone(), d))),
                    BinaryOp::Div => sum(
                        dl.map(|d| div(d, r.clone())),
                        dr.map(|d| neg(div(mul(l.clone(), d), mul(r.clone(), r.clone())))),
                    ),
                    _ => None,
                }
            }
            Expr::Select { cond, then, otherwise, dtype } => match (self.tangent(then)?, self.tangent(otherwise)?) {
                (None, None) => None,
                (t, o) => Some(Expr::select(
                    self.remap(cond),
                    t.unwrap_or_else(|| lit(0.0, *dtype)),
                    o.unwrap_or_else(|| lit(0.0, *dtype)),
                )),
            },
            Expr::Cast { arg, dtype } => self.tangent(arg)?.map(|d| Expr::cast(d, *dtype)),
            Expr::Call { func, args, dtype } => {
                let tangents = args.iter().map(|a| self.tangent(a)).collect::<Result<Vec<_>>>()?;
                if tangents.iter().all(Option::is_none) {
                    return Ok(None);
                }
                let primals: Vec<Expr> = args.iter().map(|a| self.remap(a)).collect();
                let partials = rules::partials(*func, &primals, *dtype)?;
                tangents.into_iter().zip(partials).fold(None, |acc, (d, p)| sum(acc, d.map(|d| mul(p, d))))
            }
            Expr::Pop { tape } => Some(Expr::Pop { tape: self.shadow_tape(*tape) }),
        })
    }
}

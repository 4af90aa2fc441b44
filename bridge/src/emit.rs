//! Rendering traced graphs of builtins as kernel functions.
//!
//! Every builtin is elementwise over operands of the output's type, so each
//! output becomes one loop nest over its dims. Inside the nest the output's
//! dependency cone is evaluated in graph order into scalar temporaries.

use kernax_codegen::kir::{
    self, Access, Expr, Function, Local, LocalKind, Namer, Param, Place, Stmt, Var, counter_loads, nest_loops,
};
use kernax_dtype::DType;
use kernax_ir::{BinaryOp, Builtin, Graph, NodeKind, Primitive, UnaryOp};

use crate::error::*;

pub fn emit_kernel(name: &str, graph: &Graph) -> Result<Function> {
    let outputs = graph.output_specs();
    let inputs = graph.input_specs();
    let mut namer = Namer::new();
    namer.reserve(name);

    let mut params = Vec::with_capacity(outputs.len() + inputs.len());
    for (i, ty) in outputs.iter().enumerate() {
        params.push(Param { name: namer.fresh(&format!("out{i}")), access: Access::Output, ty: ty.clone() });
    }
    for (i, ty) in inputs.iter().enumerate() {
        params.push(Param { name: namer.fresh(&format!("in{i}")), access: Access::Input, ty: ty.clone() });
    }

    let mut locals = Vec::new();
    let max_rank = outputs.iter().map(|s| s.rank()).max().unwrap_or(0);
    let counters: Vec<usize> = (0..max_rank)
        .map(|axis| {
            locals.push(Local { name: namer.fresh(&format!("i{axis}")), kind: LocalKind::Scalar(DType::Int32) });
            locals.len() - 1
        })
        .collect();

    let mut body = Vec::new();
    for (slot, (value, spec)) in graph.outputs().iter().zip(&outputs).enumerate() {
        let counters = &counters[..spec.rank()];
        let index = counter_loads(counters);

        let mut cone = vec![false; graph.nodes().len()];
        cone[value.node] = true;
        for id in (0..=value.node).rev() {
            if cone[id] {
                for operand in graph.nodes()[id].operands() {
                    cone[operand.node] = true;
                }
            }
        }

        let mut exprs: Vec<Option<Expr>> = vec![None; graph.nodes().len()];
        let mut stmts = Vec::new();
        for (id, node) in graph.nodes().iter().enumerate().filter(|(id, _)| cone[*id]) {
            let dtype = node.outputs[0].dtype();
            let expr = match &node.kind {
                NodeKind::Input(n) => {
                    let place = Place { var: Var::Param(outputs.len() + n), indices: index.clone() };
                    Expr::load(place, dtype)
                }
                NodeKind::Apply { primitive, operands } => {
                    let args: Vec<Expr> = operands.iter().filter_map(|v| exprs[v.node].clone()).collect();
                    let Some((builtin, expr)) =
                        primitive.builtin().and_then(|b| Some((b, builtin_expr(b, args, dtype)?)))
                    else {
                        let cause = "only builtin operations can be rendered as kernel source";
                        return Err(Error::Graph { source: kernax_ir::Error::rule(primitive.name(), "wrap", cause) });
                    };
                    if matches!(builtin, Builtin::Constant { .. } | Builtin::Zeros { .. }) {
                        expr
                    } else {
                        locals.push(Local { name: namer.fresh("t"), kind: LocalKind::Scalar(dtype) });
                        let local = locals.len() - 1;
                        stmts.push(Stmt::Decl { local, init: Some(expr) });
                        Expr::load(Place::scalar(Var::Local(local)), dtype)
                    }
                }
            };
            exprs[id] = Some(expr);
        }

        let result = exprs[value.node].take().unwrap_or(Expr::constant(0.0, spec.dtype()));
        stmts.push(Stmt::Assign { place: Place { var: Var::Param(slot), indices: index }, value: result });
        body.extend(nest_loops(counters, spec.dims(), stmts));
    }

    Ok(Function { name: name.to_owned(), params, locals, body })
}

fn builtin_expr(builtin: &Builtin, args: Vec<Expr>, dtype: DType) -> Option<Expr> {
    let mut args = args.into_iter();
    Some(match builtin {
        Builtin::Constant { value, .. } => Expr::constant(*value, dtype),
        Builtin::Zeros { .. } => Expr::constant(0.0, dtype),
        Builtin::Unary(op) => {
            let arg = args.next()?;
            match math_function(*op) {
                Some(func) => Expr::call(func, vec![arg]),
                None => Expr::unary(kir::UnaryOp::Neg, arg),
            }
        }
        Builtin::Binary(op) => {
            let op = match op {
                BinaryOp::Add => kir::BinaryOp::Add,
                BinaryOp::Sub => kir::BinaryOp::Sub,
                BinaryOp::Mul => kir::BinaryOp::Mul,
                BinaryOp::Div => kir::BinaryOp::Div,
            };
            let lhs = args.next()?;
            Expr::binary(op, lhs, args.next()?)
        }
    })
}

/// The `<cmath>` function computing `op`; `None` for operators.
fn math_function(op: UnaryOp) -> Option<kernax_codegen::Builtin> {
    use kernax_codegen::Builtin as B;
    match op {
        UnaryOp::Neg => None,
        UnaryOp::Sin => Some(B::Sin),
        UnaryOp::Cos => Some(B::Cos),
        UnaryOp::Exp => Some(B::Exp),
        UnaryOp::Log => Some(B::Log),
        UnaryOp::Sqrt => Some(B::Sqrt),
        UnaryOp::Tanh => Some(B::Tanh),
    }
}

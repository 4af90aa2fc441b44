//! Binding an entry point to concrete slot shapes.
//!
//! Template parameters are deduced from the slot signature the way a C++
//! compiler deduces them from the adapter's call: a `typename` parameter takes
//! a whole slot type (or an element type inside `tensor<T, ...>`), an integral
//! parameter takes an extent. The body is then name-resolved and type-checked
//! into [`kir`](crate::kir) form.

use kernax_dtype::{DType, ShapeSpec};
use rustc_hash::FxHashMap;

use crate::ast::{self, DimExpr, ExprKind, Init, StmtKind, TemplateParam, TranslationUnit, TypeExpr};
use crate::builtins::Builtin;
use crate::error::*;
use crate::kir::{
    Access, BinaryOp, Expr, Function, Local, LocalKind, Namer, Param, Place, Stmt, Var, counter_loads, nest_loops,
};
use crate::lexer::Pos;

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Scalar(DType),
    Tensor(ShapeSpec),
    Value(i64),
}

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Var(Var),
    Const(f64, DType),
}

/// Instantiate `entry` for the given output and input slots.
pub fn instantiate(
    unit: &TranslationUnit,
    entry: &str,
    outputs: &[ShapeSpec],
    inputs: &[ShapeSpec],
) -> Result<Function> {
    let mut candidates = unit.functions.iter().filter(|f| f.name == entry);
    let Some(def) = candidates.next() else {
        return EntryNotFoundSnafu {
            entry,
            available: unit.functions.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
        }
        .fail();
    };
    if let Some(dup) = candidates.next() {
        return Err(Error::at(dup.pos, format!("call to overloaded entry point '{entry}' is ambiguous")));
    }

    let slots: Vec<(Access, &ShapeSpec)> = outputs
        .iter()
        .map(|s| (Access::Output, s))
        .chain(inputs.iter().map(|s| (Access::Input, s)))
        .collect();
    if def.params.len() != slots.len() {
        return Err(Error::at(
            def.pos,
            format!(
                "no matching function for call to '{entry}': it takes {} parameters, \
                 the call provides {} outputs and {} inputs",
                def.params.len(),
                outputs.len(),
                inputs.len()
            ),
        ));
    }

    let mut bindings = FxHashMap::default();
    let mut params = Vec::with_capacity(slots.len());
    for (decl, (access, slot)) in def.params.iter().zip(&slots) {
        check_param_access(decl, *access)?;
        deduce(&def.template, &decl.ty, slot, decl.pos, &mut bindings)?;
        params.push(Param { name: decl.name.clone(), access: *access, ty: (*slot).clone() });
    }
    for tp in &def.template {
        if !bindings.contains_key(tp.name()) {
            return Err(Error::at(tp.pos(), format!("couldn't deduce template parameter '{}'", tp.name())));
        }
    }

    let mut namer = Namer::new();
    let mut globals = FxHashMap::default();
    for (i, p) in params.iter().enumerate() {
        namer.reserve(&p.name);
        globals.insert(p.name.clone(), Symbol::Var(Var::Param(i)));
    }
    for tp in &def.template {
        if let TemplateParam::Value { name, dtype, .. } = tp
            && let Some(Binding::Value(v)) = bindings.get(name)
        {
            globals.insert(name.clone(), Symbol::Const(*v as f64, *dtype));
        }
    }

    let mut lower = Lower { bindings: &bindings, scopes: vec![globals], params: &params, locals: Vec::new(), namer };
    let mut body = Vec::new();
    lower.scopes.push(FxHashMap::default());
    for stmt in &def.body {
        lower.stmt(stmt, &mut body, true)?;
    }
    let locals = lower.locals;

    Ok(Function { name: def.name.clone(), params, locals, body })
}

fn check_param_access(decl: &ast::ParamDecl, access: Access) -> Result<()> {
    if !decl.is_ref {
        return Err(Error::at(decl.pos, format!("kernel parameter '{}' must be passed by reference", decl.name)));
    }
    match access {
        Access::Output if decl.is_const => {
            Err(Error::at(decl.pos, format!("output parameter '{}' cannot be const; outputs come first", decl.name)))
        }
        Access::Input if !decl.is_const => {
            Err(Error::at(decl.pos, format!("input parameter '{}' must be declared const", decl.name)))
        }
        _ => Ok(()),
    }
}

fn bind(bindings: &mut FxHashMap<String, Binding>, name: &str, value: Binding, pos: Pos) -> Result<()> {
    match bindings.get(name) {
        Some(existing) if *existing != value => Err(Error::at(
            pos,
            format!("deduced conflicting values for template parameter '{name}' ({existing:?} vs {value:?})"),
        )),
        _ => {
            bindings.insert(name.to_string(), value);
            Ok(())
        }
    }
}

fn deduce(
    template: &[TemplateParam],
    ty: &TypeExpr,
    slot: &ShapeSpec,
    pos: Pos,
    bindings: &mut FxHashMap<String, Binding>,
) -> Result<()> {
    let is_type_param = |n: &str| template.iter().any(|t| matches!(t, TemplateParam::Type { name, .. } if name == n));
    let is_value_param = |n: &str| template.iter().any(|t| matches!(t, TemplateParam::Value { name, .. } if name == n));
    let mismatch = || Error::at(pos, format!("no matching function for call: parameter type does not accept {slot}"));

    match ty {
        TypeExpr::Named(name) if is_type_param(name) => bind(bindings, name, Binding::Tensor(slot.clone()), pos),
        TypeExpr::Named(name) => Err(Error::at(pos, format!("unknown type name '{name}'"))),
        TypeExpr::Scalar(dtype) => {
            if slot.rank() != 0 || slot.dtype() != *dtype {
                return Err(mismatch());
            }
            Ok(())
        }
        TypeExpr::Tape => Err(Error::at(pos, "a tape cannot be a kernel parameter")),
        TypeExpr::Tensor { elem, dims } => {
            if dims.len() != slot.rank() {
                return Err(mismatch());
            }
            match elem.as_ref() {
                TypeExpr::Scalar(d) if *d == slot.dtype() => {}
                TypeExpr::Named(name) if is_type_param(name) => {
                    bind(bindings, name, Binding::Scalar(slot.dtype()), pos)?;
                }
                _ => return Err(mismatch()),
            }
            for (dim, &extent) in dims.iter().zip(slot.dims()) {
                match dim {
                    DimExpr::Lit(v) if *v == extent as i64 => {}
                    DimExpr::Lit(_) => return Err(mismatch()),
                    DimExpr::Param(name) if is_value_param(name) => {
                        bind(bindings, name, Binding::Value(extent as i64), pos)?;
                    }
                    DimExpr::Param(name) => {
                        return Err(Error::at(pos, format!("'{name}' is not a template parameter")));
                    }
                }
            }
            Ok(())
        }
    }
}

struct Lower<'a> {
    bindings: &'a FxHashMap<String, Binding>,
    /// `scopes[0]` holds parameters and template constants, `scopes[1]` the function body.
    scopes: Vec<FxHashMap<String, Symbol>>,
    params: &'a [Param],
    locals: Vec<Local>,
    namer: Namer,
}

/// A resolved, possibly partially indexed, reference to a variable.
struct Lvalue {
    var: Var,
    indices: Vec<Expr>,
    pos: Pos,
}

impl Lower<'_> {
    fn lookup(&self, name: &str, pos: Pos) -> Result<Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| Error::at(pos, format!("use of undeclared identifier '{name}'")))
    }

    fn declare(&mut self, name: &str, kind: LocalKind) -> usize {
        let unique = self.namer.fresh(name);
        self.locals.push(Local { name: unique, kind });
        let id = self.locals.len() - 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Symbol::Var(Var::Local(id)));
        }
        id
    }

    /// Loop counter for an expanded whole-tensor assignment; not visible to user code.
    fn hidden_local(&mut self, base: &str, kind: LocalKind) -> usize {
        let unique = self.namer.fresh(base);
        self.locals.push(Local { name: unique, kind });
        self.locals.len() - 1
    }

    fn var_dims(&self, var: Var) -> &[usize] {
        match var {
            Var::Param(i) => self.params[i].ty.dims(),
            Var::Local(i) => match &self.locals[i].kind {
                LocalKind::Tensor(spec) => spec.dims(),
                LocalKind::Scalar(_) | LocalKind::Tape => &[],
            },
        }
    }

    fn var_dtype(&self, var: Var) -> DType {
        match var {
            Var::Param(i) => self.params[i].ty.dtype(),
            Var::Local(i) => match &self.locals[i].kind {
                LocalKind::Scalar(d) => *d,
                LocalKind::Tensor(spec) => spec.dtype(),
                LocalKind::Tape => DType::Float64,
            },
        }
    }

    fn var_name(&self, var: Var) -> &str {
        match var {
            Var::Param(i) => &self.params[i].name,
            Var::Local(i) => &self.locals[i].name,
        }
    }

    fn is_tape(&self, var: Var) -> bool {
        matches!(var, Var::Local(i) if self.locals[i].kind == LocalKind::Tape)
    }

    fn resolve_type(&self, ty: &TypeExpr, pos: Pos) -> Result<LocalKind> {
        match ty {
            TypeExpr::Scalar(d) => Ok(LocalKind::Scalar(*d)),
            TypeExpr::Tape => Ok(LocalKind::Tape),
            TypeExpr::Named(name) => match self.bindings.get(name) {
                Some(Binding::Scalar(d)) => Ok(LocalKind::Scalar(*d)),
                Some(Binding::Tensor(spec)) => Ok(LocalKind::Tensor(spec.clone())),
                _ => Err(Error::at(pos, format!("unknown type name '{name}'"))),
            },
            TypeExpr::Tensor { elem, dims } => {
                let elem = match self.resolve_type(elem, pos)? {
                    LocalKind::Scalar(d) => d,
                    _ => return Err(Error::at(pos, "tensor element type must be a scalar type")),
                };
                let mut extents = Vec::with_capacity(dims.len());
                for dim in dims {
                    let extent = match dim {
                        DimExpr::Lit(v) => *v,
                        DimExpr::Param(name) => match self.bindings.get(name) {
                            Some(Binding::Value(v)) => *v,
                            _ => return Err(Error::at(pos, format!("'{name}' is not an integral template parameter"))),
                        },
                    };
                    let extent = usize::try_from(extent)
                        .map_err(|_| Error::at(pos, format!("tensor extent {extent} is negative")))?;
                    extents.push(extent);
                }
                Ok(LocalKind::Tensor(ShapeSpec::new(extents, elem)))
            }
        }
    }

    // ---- statements -------------------------------------------------------------------

    fn stmt(&mut self, stmt: &ast::Stmt, out: &mut Vec<Stmt>, function_scope: bool) -> Result<()> {
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Empty => {}
            StmtKind::Return => out.push(Stmt::Return),
            StmtKind::Decl { ty, declarators } => self.declaration(ty, declarators, out, function_scope)?,
            StmtKind::Expr(expr) => self.expr_stmt(expr, out)?,
            StmtKind::Block(stmts) => {
                self.scopes.push(FxHashMap::default());
                for s in stmts {
                    self.stmt(s, out, false)?;
                }
                self.scopes.pop();
            }
            StmtKind::If { cond, then, otherwise } => {
                let cond = self.condition(cond)?;
                let then = self.scoped(then)?;
                let otherwise = match otherwise {
                    Some(s) => self.scoped(s)?,
                    None => Vec::new(),
                };
                out.push(Stmt::If { cond, then, otherwise });
            }
            StmtKind::While { cond, body } => {
                let cond = self.condition(cond)?;
                let body = self.scoped(body)?;
                out.push(Stmt::While { cond, body });
            }
            StmtKind::For { init, cond, step, body } => {
                self.scopes.push(FxHashMap::default());
                let init = match init {
                    Some(init) => {
                        let mut lowered = Vec::new();
                        self.stmt(init, &mut lowered, false)?;
                        Some(Box::new(single_simple(lowered, pos, "for-loop initialiser")?))
                    }
                    None => None,
                };
                let cond = cond.as_ref().map(|c| self.condition(c)).transpose()?;
                let step = match step {
                    Some(step) => {
                        let mut lowered = Vec::new();
                        self.expr_stmt(step, &mut lowered)?;
                        Some(Box::new(single_simple(lowered, pos, "for-loop increment")?))
                    }
                    None => None,
                };
                let body = self.scoped(body)?;
                self.scopes.pop();
                out.push(Stmt::For { init, cond, step, body });
            }
        }
        Ok(())
    }

    fn scoped(&mut self, stmt: &ast::Stmt) -> Result<Vec<Stmt>> {
        self.scopes.push(FxHashMap::default());
        let mut body = Vec::new();
        let result = self.stmt(stmt, &mut body, false);
        self.scopes.pop();
        result.map(|_| body)
    }

    fn condition(&mut self, cond: &ast::Expr) -> Result<Expr> {
        self.rvalue(cond)
    }

    fn declaration(
        &mut self,
        ty: &TypeExpr,
        declarators: &[ast::Declarator],
        out: &mut Vec<Stmt>,
        function_scope: bool,
    ) -> Result<()> {
        for decl in declarators {
            let kind = self.resolve_type(ty, decl.pos)?;
            match kind {
                LocalKind::Scalar(dtype) => {
                    let init = match &decl.init {
                        Some(Init::Expr(e)) => Some(self.assigned_value(e)?),
                        Some(Init::Zero) | None => None,
                    };
                    let local = self.declare(&decl.name, LocalKind::Scalar(dtype));
                    out.push(Stmt::Decl { local, init });
                }
                LocalKind::Tensor(spec) if spec.rank() == 0 => {
                    let init = match &decl.init {
                        Some(Init::Expr(e)) => Some(self.assigned_value(e)?),
                        Some(Init::Zero) | None => None,
                    };
                    let local = self.declare(&decl.name, LocalKind::Tensor(spec));
                    out.push(Stmt::Decl { local, init: None });
                    if let Some(value) = init {
                        out.push(Stmt::Assign { place: Place::scalar(Var::Local(local)), value });
                    }
                }
                LocalKind::Tensor(spec) => {
                    if !function_scope {
                        return Err(Error::at(decl.pos, "local tensors must be declared at function scope"));
                    }
                    let local = self.declare(&decl.name, LocalKind::Tensor(spec));
                    out.push(Stmt::Decl { local, init: None });
                    if let Some(Init::Expr(e)) = &decl.init {
                        let target = Lvalue { var: Var::Local(local), indices: Vec::new(), pos: decl.pos };
                        self.assign_whole(target, None, e, out)?;
                    }
                }
                LocalKind::Tape => {
                    if !function_scope {
                        return Err(Error::at(decl.pos, "tapes must be declared at function scope"));
                    }
                    if decl.init.is_some() {
                        return Err(Error::at(decl.pos, "a tape cannot be initialised"));
                    }
                    let local = self.declare(&decl.name, LocalKind::Tape);
                    out.push(Stmt::Decl { local, init: None });
                }
            }
        }
        Ok(())
    }

    fn expr_stmt(&mut self, expr: &ast::Expr, out: &mut Vec<Stmt>) -> Result<()> {
        match &expr.kind {
            ExprKind::Assign { op, target, value } => self.assign(target, *op, value, out),
            ExprKind::Step { target, delta } => {
                let one = ast::Expr::new(ExprKind::Int(1, DType::Int32), expr.pos);
                let op = if *delta > 0 { BinaryOp::Add } else { BinaryOp::Sub };
                self.assign(target, Some(op), &one, out)
            }
            ExprKind::Method { receiver, method, args } if method == "push" => {
                let tape = self.tape(receiver)?;
                let [arg] = args.as_slice() else {
                    return Err(Error::at(expr.pos, "tape.push takes exactly one argument"));
                };
                let value = self.rvalue(arg)?;
                out.push(Stmt::Push { tape, value });
                Ok(())
            }
            _ => Err(Error::at(expr.pos, "expression result unused")),
        }
    }

    fn tape(&self, receiver: &ast::Expr) -> Result<usize> {
        if let ExprKind::Ident(name) = &receiver.kind
            && let Symbol::Var(var @ Var::Local(id)) = self.lookup(name, receiver.pos)?
            && self.is_tape(var)
        {
            return Ok(id);
        }
        Err(Error::at(receiver.pos, "member access on a value that is not a tape"))
    }

    /// Right-hand side of a scalar assignment, where a bare `tape.pop()` is allowed.
    fn assigned_value(&mut self, value: &ast::Expr) -> Result<Expr> {
        if let ExprKind::Method { receiver, method, args } = &value.kind
            && method == "pop"
        {
            if !args.is_empty() {
                return Err(Error::at(value.pos, "tape.pop takes no arguments"));
            }
            return Ok(Expr::Pop { tape: self.tape(receiver)? });
        }
        self.rvalue(value)
    }

    fn assign(
        &mut self,
        target: &ast::Expr,
        op: Option<BinaryOp>,
        value: &ast::Expr,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let lv = self.lvalue(target)?;
        match lv.var {
            Var::Param(i) if self.params[i].access == Access::Input => {
                return Err(Error::at(
                    lv.pos,
                    format!("cannot assign to read-only parameter '{}'", self.params[i].name),
                ));
            }
            var if self.is_tape(var) => return Err(Error::at(lv.pos, "cannot assign to a tape")),
            _ => {}
        }
        let rank = self.var_dims(lv.var).len();
        if lv.indices.len() < rank {
            return self.assign_whole(lv, op, value, out);
        }

        let dtype = self.var_dtype(lv.var);
        let place = Place { var: lv.var, indices: lv.indices };
        let value = match op {
            None => self.assigned_value(value)?,
            Some(op) => {
                let rhs = self.rvalue(value)?;
                check_binary(op, dtype, rhs.dtype(), lv.pos)?;
                Expr::binary(op, Expr::load(place.clone(), dtype), rhs)
            }
        };
        out.push(Stmt::Assign { place, value });
        Ok(())
    }

    /// Assignment to a (partially indexed) tensor: fill from a scalar or copy an equally shaped tensor.
    fn assign_whole(
        &mut self,
        target: Lvalue,
        op: Option<BinaryOp>,
        value: &ast::Expr,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let dims = self.var_dims(target.var)[target.indices.len()..].to_vec();
        let dtype = self.var_dtype(target.var);

        let source = match &value.kind {
            ExprKind::Ident(_) | ExprKind::Index { .. } => match self.lvalue(value).ok() {
                Some(src) if !self.var_dims(src.var)[src.indices.len()..].is_empty() => {
                    let src_dims = &self.var_dims(src.var)[src.indices.len()..];
                    if src_dims != dims.as_slice() || self.var_dtype(src.var) != dtype {
                        return Err(Error::at(
                            value.pos,
                            format!("incompatible tensor types in assignment to '{}'", self.var_name(target.var)),
                        ));
                    }
                    Some(src)
                }
                _ => None,
            },
            _ => None,
        };

        let fill = match source {
            Some(_) => None,
            None => {
                let scalar = self.rvalue(value)?;
                if let Some(op) = op {
                    check_binary(op, dtype, scalar.dtype(), value.pos)?;
                }
                if matches!(scalar, Expr::Const { .. }) {
                    Some(scalar)
                } else {
                    // evaluated once, like the prelude's operator=
                    let tmp = self.hidden_local("fill", LocalKind::Scalar(scalar.dtype()));
                    let dtype = scalar.dtype();
                    out.push(Stmt::Decl { local: tmp, init: Some(scalar) });
                    Some(Expr::load(Place::scalar(Var::Local(tmp)), dtype))
                }
            }
        };

        let counters: Vec<usize> =
            dims.iter().map(|_| self.hidden_local("i", LocalKind::Scalar(DType::Int32))).collect();

        let mut place = Place { var: target.var, indices: target.indices };
        place.indices.extend(counter_loads(&counters));
        let element = match (&source, &fill) {
            (Some(src), _) => {
                let mut indices = src.indices.clone();
                indices.extend(counter_loads(&counters));
                Expr::load(Place { var: src.var, indices }, dtype)
            }
            (None, Some(fill)) => fill.clone(),
            (None, None) => return Err(Error::at(value.pos, "invalid tensor assignment")),
        };
        let value = match op {
            Some(BinaryOp::Rem) if !dtype.is_int() => {
                return Err(Error::at(value.pos, "invalid operands to binary '%'"));
            }
            Some(op) => Expr::binary(op, Expr::load(place.clone(), dtype), element),
            None => element,
        };

        out.extend(nest_loops(&counters, &dims, vec![Stmt::Assign { place, value }]));
        Ok(())
    }

    // ---- expressions ------------------------------------------------------------------

    fn lvalue(&mut self, expr: &ast::Expr) -> Result<Lvalue> {
        match &expr.kind {
            ExprKind::Ident(name) => match self.lookup(name, expr.pos)? {
                Symbol::Var(var) => Ok(Lvalue { var, indices: Vec::new(), pos: expr.pos }),
                Symbol::Const(..) => Err(Error::at(expr.pos, format!("template parameter '{name}' is not assignable"))),
            },
            ExprKind::Index { base, index } => {
                let mut lv = self.lvalue(base)?;
                let rank = self.var_dims(lv.var).len();
                if lv.indices.len() >= rank {
                    return Err(Error::at(expr.pos, "subscripted value is not an array"));
                }
                let index = self.rvalue(index)?;
                if index.dtype().is_float() {
                    return Err(Error::at(expr.pos, "array subscript is not an integer"));
                }
                lv.indices.push(index);
                Ok(lv)
            }
            _ => Err(Error::at(expr.pos, "expression is not assignable")),
        }
    }

    fn rvalue(&mut self, expr: &ast::Expr) -> Result<Expr> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(v, dtype) => Ok(Expr::constant(*v as f64, *dtype)),
            ExprKind::Float(v, dtype) => Ok(Expr::constant(*v, *dtype)),
            ExprKind::Bool(b) => Ok(Expr::constant(if *b { 1.0 } else { 0.0 }, DType::Bool)),
            ExprKind::Ident(name) => {
                if let Symbol::Const(v, dtype) = self.lookup(name, pos)? {
                    return Ok(Expr::constant(v, dtype));
                }
                self.element(expr)
            }
            ExprKind::Index { .. } => self.element(expr),
            ExprKind::Unary { op, arg } => Ok(Expr::unary(*op, self.rvalue(arg)?)),
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.rvalue(lhs)?;
                let rhs = self.rvalue(rhs)?;
                check_binary(*op, lhs.dtype(), rhs.dtype(), pos)?;
                Ok(Expr::binary(*op, lhs, rhs))
            }
            ExprKind::Ternary { cond, then, otherwise } => {
                Ok(Expr::select(self.rvalue(cond)?, self.rvalue(then)?, self.rvalue(otherwise)?))
            }
            ExprKind::Cast { to, arg } => Ok(Expr::cast(self.rvalue(arg)?, *to)),
            ExprKind::Call { name, args } => {
                let func = Builtin::from_name(name)
                    .ok_or_else(|| Error::at(pos, format!("use of undeclared function '{name}'")))?;
                if args.len() != func.arity() {
                    return Err(Error::at(
                        pos,
                        format!("'{func}' takes {} arguments, {} given", func.arity(), args.len()),
                    ));
                }
                let args = args.iter().map(|a| self.rvalue(a)).collect::<Result<Vec<_>>>()?;
                Ok(Expr::call(func, args))
            }
            ExprKind::Method { method, .. } if method == "pop" => {
                Err(Error::at(pos, "tape.pop() may only be the whole right-hand side of an assignment"))
            }
            ExprKind::Method { method, .. } => Err(Error::at(pos, format!("'{method}' does not yield a value"))),
            ExprKind::Assign { .. } | ExprKind::Step { .. } => {
                Err(Error::at(pos, "assignment used as a value is not supported"))
            }
        }
    }

    fn element(&mut self, expr: &ast::Expr) -> Result<Expr> {
        let lv = self.lvalue(expr)?;
        if self.is_tape(lv.var) {
            return Err(Error::at(lv.pos, "a tape cannot be used as a value"));
        }
        let rank = self.var_dims(lv.var).len();
        if lv.indices.len() != rank {
            return Err(Error::at(
                lv.pos,
                format!(
                    "'{}' has {rank} dimensions but {} are indexed; tensor values must be fully indexed",
                    self.var_name(lv.var),
                    lv.indices.len()
                ),
            ));
        }
        let dtype = self.var_dtype(lv.var);
        Ok(Expr::load(Place { var: lv.var, indices: lv.indices }, dtype))
    }
}

fn check_binary(op: BinaryOp, lhs: DType, rhs: DType, pos: Pos) -> Result<()> {
    if op == BinaryOp::Rem && (lhs.is_float() || rhs.is_float()) {
        return Err(Error::at(pos, "invalid operands to binary '%' (use fmod for floating point)"));
    }
    Ok(())
}

/// Loop initialisers and increments must lower to one scalar statement.
fn single_simple(mut lowered: Vec<Stmt>, pos: Pos, what: &str) -> Result<Stmt> {
    match (lowered.pop(), lowered.is_empty()) {
        (Some(stmt @ (Stmt::Decl { .. } | Stmt::Assign { .. })), true) => Ok(stmt),
        _ => Err(Error::at(pos, format!("unsupported {what}"))),
    }
}

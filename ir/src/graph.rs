//! Arena graphs of primitive applications.
//!
//! A [`Graph`] owns its nodes in topological order; operands refer to earlier
//! nodes by index. Graphs are built once through a [`GraphBuilder`] and are
//! immutable afterwards. Transforms produce new graphs.

use std::sync::Arc;

use kernax_dtype::ShapeSpec;
use snafu::{OptionExt, ensure};

use crate::builtins::{BinaryOp, Builtin, UnaryOp};
use crate::error::*;
use crate::primitive::Primitive;

/// One result of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value {
    pub node: usize,
    pub output: usize,
}

impl Value {
    pub fn new(node: usize, output: usize) -> Self {
        Self { node, output }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}:{}", self.node, self.output)
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Graph parameter number `n`.
    Input(usize),
    Apply { primitive: Arc<dyn Primitive>, operands: Vec<Value> },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub outputs: Vec<ShapeSpec>,
}

impl Node {
    pub fn operands(&self) -> &[Value] {
        match &self.kind {
            NodeKind::Input(_) => &[],
            NodeKind::Apply { operands, .. } => operands,
        }
    }

    pub fn primitive(&self) -> Option<&Arc<dyn Primitive>> {
        match &self.kind {
            NodeKind::Input(_) => None,
            NodeKind::Apply { primitive, .. } => Some(primitive),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    inputs: Vec<usize>,
    outputs: Vec<Value>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Parameter values, in parameter order.
    pub fn inputs(&self) -> Vec<Value> {
        self.inputs.iter().map(|&node| Value::new(node, 0)).collect()
    }

    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    pub fn spec(&self, value: Value) -> Result<&ShapeSpec> {
        lookup(&self.nodes, value)
    }

    pub fn input_specs(&self) -> Vec<ShapeSpec> {
        self.inputs.iter().map(|&node| self.nodes[node].outputs[0].clone()).collect()
    }

    pub fn output_specs(&self) -> Vec<ShapeSpec> {
        self.outputs.iter().map(|v| self.nodes[v.node].outputs[v.output].clone()).collect()
    }
}

impl std::fmt::Display for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, node) in self.nodes.iter().enumerate() {
            let types: Vec<String> = node.outputs.iter().map(ToString::to_string).collect();
            match &node.kind {
                NodeKind::Input(n) => writeln!(f, "%{id} = input {n} : {}", types.join(", "))?,
                NodeKind::Apply { primitive, operands } => {
                    let args: Vec<String> = operands.iter().map(ToString::to_string).collect();
                    writeln!(f, "%{id} = {}({}) : {}", primitive.name(), args.join(", "), types.join(", "))?;
                }
            }
        }
        let outs: Vec<String> = self.outputs.iter().map(ToString::to_string).collect();
        write!(f, "return ({})", outs.join(", "))
    }
}

fn lookup(nodes: &[Node], value: Value) -> Result<&ShapeSpec> {
    nodes
        .get(value.node)
        .and_then(|n| n.outputs.get(value.output))
        .context(UnknownValueSnafu { node: value.node, output: value.output })
}

/// Records primitive applications in topological order.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    inputs: Vec<usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh placeholder for a value that is not yet computed.
    pub fn input(&mut self, spec: ShapeSpec) -> Value {
        let id = self.nodes.len();
        self.nodes.push(Node { kind: NodeKind::Input(self.inputs.len()), outputs: vec![spec] });
        self.inputs.push(id);
        Value::new(id, 0)
    }

    pub fn spec(&self, value: Value) -> Result<&ShapeSpec> {
        lookup(&self.nodes, value)
    }

    /// Apply `primitive` to `operands`, returning one value per result.
    ///
    /// Result types come from the primitive's abstract evaluation; nothing is executed.
    pub fn bind(&mut self, primitive: Arc<dyn Primitive>, operands: &[Value]) -> Result<Vec<Value>> {
        let specs = operands.iter().map(|&v| self.spec(v).cloned()).collect::<Result<Vec<_>>>()?;
        let outputs = primitive.abstract_eval(&specs)?;
        let id = self.nodes.len();
        tracing::trace!(node = id, primitive = primitive.name(), results = outputs.len(), "bound primitive");

        let values = (0..outputs.len()).map(|output| Value::new(id, output)).collect();
        self.nodes.push(Node { kind: NodeKind::Apply { primitive, operands: operands.to_vec() }, outputs });
        Ok(values)
    }

    /// Bind a single-result primitive.
    pub fn bind_one(&mut self, primitive: Arc<dyn Primitive>, operands: &[Value]) -> Result<Value> {
        let name = primitive.name().to_owned();
        let values = self.bind(primitive, operands)?;
        ensure!(
            values.len() == 1,
            RuleAritySnafu { primitive: name, rule: "bind", expected: 1usize, actual: values.len() }
        );
        Ok(values[0])
    }

    /// Every element equal to `value`.
    pub fn constant(&mut self, value: f64, spec: ShapeSpec) -> Value {
        self.nullary(Builtin::Constant { value, spec: spec.clone() }, spec)
    }

    pub fn zeros(&mut self, spec: ShapeSpec) -> Value {
        self.nullary(Builtin::Zeros { spec: spec.clone() }, spec)
    }

    pub fn zeros_like(&mut self, value: Value) -> Result<Value> {
        let spec = self.spec(value)?.clone();
        Ok(self.zeros(spec))
    }

    fn nullary(&mut self, builtin: Builtin, spec: ShapeSpec) -> Value {
        let id = self.nodes.len();
        let primitive: Arc<dyn Primitive> = Arc::new(builtin);
        self.nodes.push(Node { kind: NodeKind::Apply { primitive, operands: Vec::new() }, outputs: vec![spec] });
        Value::new(id, 0)
    }

    pub fn unary(&mut self, op: UnaryOp, x: Value) -> Result<Value> {
        self.bind_one(Arc::new(Builtin::Unary(op)), &[x])
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.bind_one(Arc::new(Builtin::Binary(op)), &[lhs, rhs])
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Div, lhs, rhs)
    }

    pub fn neg(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Neg, x)
    }

    pub fn sin(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Sin, x)
    }

    pub fn cos(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Cos, x)
    }

    pub fn exp(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Exp, x)
    }

    pub fn log(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Log, x)
    }

    pub fn sqrt(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Sqrt, x)
    }

    pub fn tanh(&mut self, x: Value) -> Result<Value> {
        self.unary(UnaryOp::Tanh, x)
    }

    /// Freeze the graph with `outputs` as its results.
    pub fn finish(self, outputs: &[Value]) -> Result<Graph> {
        for &v in outputs {
            self.spec(v)?;
        }
        Ok(Graph { nodes: self.nodes, inputs: self.inputs, outputs: outputs.to_vec() })
    }
}

/// Trace `body` over fresh placeholders for `inputs` into a graph.
pub fn trace<E: From<Error>>(
    inputs: &[ShapeSpec],
    body: impl FnOnce(&mut GraphBuilder, &[Value]) -> Result<Vec<Value>, E>,
) -> Result<Graph, E> {
    let mut builder = GraphBuilder::new();
    let params: Vec<Value> = inputs.iter().cloned().map(|spec| builder.input(spec)).collect();
    let outputs = body(&mut builder, &params)?;
    Ok(builder.finish(&outputs)?)
}

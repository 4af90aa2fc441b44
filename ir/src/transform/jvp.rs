use kernax_dtype::ShapeSpec;
use snafu::ensure;

use crate::error::*;
use crate::graph::{Graph, GraphBuilder, NodeKind, Value};
use crate::primitive::Tangent;

/// Forward-mode transform.
///
/// The result takes `primals ++ tangents` and returns `outputs ++ output tangents`.
/// Tangents are pushed through each node's own rule; zeros stay symbolic and
/// are only materialised for the final results.
pub fn jvp(graph: &Graph) -> Result<Graph> {
    let mut b = GraphBuilder::new();
    let specs: Vec<ShapeSpec> = graph.input_specs();
    let primal_inputs: Vec<Value> = specs.iter().cloned().map(|s| b.input(s)).collect();
    let tangent_inputs: Vec<Value> = specs.iter().cloned().map(|s| b.input(s)).collect();

    let mut primals: Vec<Vec<Value>> = Vec::with_capacity(graph.nodes().len());
    let mut tangents: Vec<Vec<Tangent>> = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        match &node.kind {
            NodeKind::Input(n) => {
                primals.push(vec![primal_inputs[*n]]);
                tangents.push(vec![Tangent::Value(tangent_inputs[*n])]);
            }
            NodeKind::Apply { primitive, operands } => {
                let ps: Vec<Value> = operands.iter().map(|v| primals[v.node][v.output]).collect();
                let ts: Vec<Tangent> = operands.iter().map(|v| tangents[v.node][v.output].clone()).collect();
                let (outs, touts) = primitive.jvp(&mut b, &ps, &ts)?;
                for produced in [outs.len(), touts.len()] {
                    ensure!(
                        produced == node.outputs.len(),
                        RuleAritySnafu {
                            primitive: primitive.name(),
                            rule: "jvp",
                            expected: node.outputs.len(),
                            actual: produced
                        }
                    );
                }
                primals.push(outs);
                tangents.push(touts);
            }
        }
    }

    let mut outputs: Vec<Value> = graph.outputs().iter().map(|v| primals[v.node][v.output]).collect();
    for v in graph.outputs() {
        let t = tangents[v.node][v.output].materialize(&mut b);
        outputs.push(t);
    }
    tracing::debug!(nodes = graph.nodes().len(), outputs = outputs.len(), "jvp traced");
    b.finish(&outputs)
}

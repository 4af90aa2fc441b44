use kernax_dtype::ShapeSpec;
use snafu::ensure;

use crate::error::*;
use crate::graph::{Graph, GraphBuilder, NodeKind, Value};
use crate::primitive::Tangent;

/// Reverse-mode transform.
///
/// The result takes `primals ++ output cotangents` and returns
/// `outputs ++ input cotangents`. The primal graph is replayed first, then
/// cotangents flow backwards through each node's own rule. A value read by
/// several nodes receives the sum of their contributions.
pub fn vjp(graph: &Graph) -> Result<Graph> {
    let mut b = GraphBuilder::new();
    let input_specs: Vec<ShapeSpec> = graph.input_specs();
    let primal_inputs: Vec<Value> = input_specs.iter().cloned().map(|s| b.input(s)).collect();
    let seeds: Vec<Value> = graph.output_specs().into_iter().map(|s| b.input(s)).collect();

    let mut primals: Vec<Vec<Value>> = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        let values = match &node.kind {
            NodeKind::Input(n) => vec![primal_inputs[*n]],
            NodeKind::Apply { primitive, operands } => {
                let ps: Vec<Value> = operands.iter().map(|v| primals[v.node][v.output]).collect();
                b.bind(primitive.clone(), &ps)?
            }
        };
        primals.push(values);
    }

    let mut cotangents: Vec<Vec<Option<Tangent>>> =
        graph.nodes().iter().map(|n| vec![None; n.outputs.len()]).collect();
    for (v, seed) in graph.outputs().iter().zip(&seeds) {
        accumulate(&mut b, &mut cotangents[v.node][v.output], Tangent::Value(*seed))?;
    }

    for (id, node) in graph.nodes().iter().enumerate().rev() {
        let NodeKind::Apply { primitive, operands } = &node.kind else {
            continue;
        };
        let incoming = std::mem::take(&mut cotangents[id]);
        if incoming.iter().all(|ct| ct.as_ref().is_none_or(Tangent::is_zero)) {
            continue;
        }
        let cts: Vec<Tangent> = incoming
            .into_iter()
            .zip(&node.outputs)
            .map(|(ct, spec)| ct.unwrap_or_else(|| Tangent::Zero(spec.clone())))
            .collect();

        let ps: Vec<Value> = operands.iter().map(|v| primals[v.node][v.output]).collect();
        let contributions = primitive.vjp(&mut b, &ps, &primals[id], &cts)?;
        ensure!(
            contributions.len() == operands.len(),
            RuleAritySnafu {
                primitive: primitive.name(),
                rule: "vjp",
                expected: operands.len(),
                actual: contributions.len()
            }
        );
        for (operand, ct) in operands.iter().zip(contributions) {
            accumulate(&mut b, &mut cotangents[operand.node][operand.output], ct)?;
        }
    }

    let mut outputs: Vec<Value> = graph.outputs().iter().map(|v| primals[v.node][v.output]).collect();
    for (input, spec) in graph.inputs().into_iter().zip(input_specs) {
        let ct = cotangents[input.node][input.output].take().unwrap_or(Tangent::Zero(spec));
        outputs.push(ct.materialize(&mut b));
    }
    tracing::debug!(nodes = graph.nodes().len(), outputs = outputs.len(), "vjp traced");
    b.finish(&outputs)
}

fn accumulate(b: &mut GraphBuilder, slot: &mut Option<Tangent>, ct: Tangent) -> Result<()> {
    *slot = Some(match slot.take() {
        None => ct,
        Some(previous) => Tangent::add(b, &previous, &ct)?,
    });
    Ok(())
}

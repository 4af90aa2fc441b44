use kernax_dtype::ShapeSpec;
use snafu::ensure;

use crate::error::*;
use crate::graph::{Graph, NodeKind};

/// Re-run abstract evaluation over `graph` and return its output types.
///
/// Every node's recorded types must agree with what its primitive infers.
pub fn infer_shapes(graph: &Graph) -> Result<Vec<ShapeSpec>> {
    let mut inferred: Vec<Vec<ShapeSpec>> = Vec::with_capacity(graph.nodes().len());
    for (id, node) in graph.nodes().iter().enumerate() {
        let specs = match &node.kind {
            NodeKind::Input(_) => node.outputs.clone(),
            NodeKind::Apply { primitive, operands } => {
                let operand_specs: Vec<ShapeSpec> =
                    operands.iter().map(|v| inferred[v.node][v.output].clone()).collect();
                let specs = primitive.abstract_eval(&operand_specs)?;
                ensure!(
                    specs == node.outputs,
                    InferenceSnafu {
                        node: id,
                        primitive: primitive.name(),
                        recorded: node.outputs.clone(),
                        inferred: specs.clone()
                    }
                );
                specs
            }
        };
        inferred.push(specs);
    }
    Ok(graph.outputs().iter().map(|v| inferred[v.node][v.output].clone()).collect())
}

use std::collections::HashSet;

use crate::graph::{topological_order, Boundary, GraphResult, Model, ModelTransformer, NodeId};
use crate::optimizer::{ModelPass, PassContext, PassOutput, PassResult};

/// Drops nodes that no declared output depends on. Bound inputs and callback nodes are
/// always kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadNodeEliminationPass;

impl DeadNodeEliminationPass {
    const NAME: &'static str = "dead-node-elimination";
}

impl ModelPass for DeadNodeEliminationPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, model: &Model, cx: &PassContext<'_>) -> GraphResult<PassOutput> {
        let mut worklist: Vec<NodeId> = cx.required_outputs.iter().map(|port| port.node).collect();
        worklist.extend_from_slice(cx.required_inputs);
        for (id, node) in model.nodes() {
            if has_side_effects(node.boundary()) {
                worklist.push(id);
            }
        }

        let mut live: HashSet<NodeId> = HashSet::new();
        while let Some(id) = worklist.pop() {
            if !live.insert(id) {
                continue;
            }
            let Some(node) = model.node(id) else {
                continue;
            };
            worklist.extend(node.inputs().iter().map(|input| input.source().node));
        }

        let mut transformer = ModelTransformer::new(model);
        for id in topological_order(model)? {
            if live.contains(&id) {
                transformer.copy_node(id)?;
            }
        }
        let removed = model.len().saturating_sub(transformer.model().len());
        Ok(PassOutput::new(
            transformer.finish(),
            PassResult {
                changed: removed > 0,
                rewrites_applied: 0,
                nodes_removed: removed,
            },
        ))
    }
}

fn has_side_effects(boundary: Option<Boundary>) -> bool {
    matches!(boundary, Some(Boundary::Source) | Some(Boundary::Sink))
}

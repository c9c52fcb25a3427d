use crate::graph::{topological_order, Boundary, GraphResult, Model, ModelTransformer};
use crate::nodes::{InputNode, OutputNode};
use crate::optimizer::{ModelPass, PassContext, PassOutput, PassResult};

/// Replaces each source node with one input node per source output and each sink node
/// with an output node, so the interior graph can be driven with raw buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceSourceAndSinkNodesPass;

impl ReplaceSourceAndSinkNodesPass {
    const NAME: &'static str = "replace-source-and-sink-nodes";
}

impl ModelPass for ReplaceSourceAndSinkNodesPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, model: &Model, _cx: &PassContext<'_>) -> GraphResult<PassOutput> {
        let mut transformer = ModelTransformer::new(model);
        let mut rewrites = 0usize;
        for id in topological_order(model)? {
            let node = model.get(id)?;
            match node.boundary() {
                Some(Boundary::Source) => {
                    for (idx, port) in node.outputs().iter().enumerate() {
                        let input = InputNode::new(port.layout().size().to_vec())?;
                        let new_id = transformer.add_node(input)?;
                        transformer.map_port_to(id.port(idx), new_id.output());
                    }
                    rewrites += 1;
                }
                Some(Boundary::Sink) => {
                    transformer.rebuild(id, |model, inputs| OutputNode::new(model, inputs[0]))?;
                    rewrites += 1;
                }
                _ => transformer.copy_node(id)?,
            }
        }
        Ok(PassOutput::new(
            transformer.finish(),
            PassResult {
                changed: rewrites > 0,
                rewrites_applied: rewrites,
                nodes_removed: 0,
            },
        ))
    }
}

use crate::graph::{
    topological_order, ElementType, GraphResult, Model, ModelTransformer, Node, NodeId,
};
use crate::nodes::ConstantNode;
use crate::optimizer::{ModelPass, PassContext, PassOutput, PassResult};
use crate::tensor::Tensor;

/// Replaces interior nodes whose inputs are all constants with the constants they
/// evaluate to. Inputs left without consumers are removed by dead-node elimination.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantFoldingPass;

impl ConstantFoldingPass {
    const NAME: &'static str = "constant-folding";
}

impl ModelPass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, model: &Model, _cx: &PassContext<'_>) -> GraphResult<PassOutput> {
        let mut transformer = ModelTransformer::new(model);
        let mut folded = 0usize;
        for id in topological_order(model)? {
            let node = model.get(id)?;
            match constant_inputs(node, &transformer)? {
                Some(args) => {
                    let refs: Vec<&Tensor> = args.iter().collect();
                    let values = node.evaluate(&refs)?;
                    fold(id, node, values, &mut transformer)?;
                    folded += 1;
                }
                None => transformer.copy_node(id)?,
            }
        }
        Ok(PassOutput::new(
            transformer.finish(),
            PassResult {
                changed: folded > 0,
                rewrites_applied: folded,
                nodes_removed: 0,
            },
        ))
    }
}

/// Values of `node`'s inputs when all of them are constants in the model being built.
fn constant_inputs(
    node: &dyn Node,
    transformer: &ModelTransformer<'_>,
) -> GraphResult<Option<Vec<Tensor>>> {
    if node.inputs().is_empty() || node.boundary().is_some() {
        return Ok(None);
    }
    let mut values = Vec::with_capacity(node.inputs().len());
    for input in node.inputs() {
        let mapped = transformer.map_port(input.source())?;
        match transformer
            .model()
            .get(mapped.node)?
            .constant_value()
        {
            Some(value) => values.push(value.clone()),
            None => return Ok(None),
        }
    }
    Ok(Some(values))
}

fn fold(
    id: NodeId,
    node: &dyn Node,
    values: Vec<Tensor>,
    transformer: &mut ModelTransformer<'_>,
) -> GraphResult<()> {
    for (idx, (value, port)) in values.into_iter().zip(node.outputs()).enumerate() {
        let constant = match port.element() {
            ElementType::Real => ConstantNode::from_tensor(value)?,
            ElementType::Binary => {
                let shape = value.shape().to_vec();
                ConstantNode::binary(shape, value.into_data())?
            }
        };
        let new_id = transformer.add_node(constant)?;
        transformer.map_port_to(id.port(idx), new_id.output());
    }
    Ok(())
}

use crate::backend::Target;
use crate::codegen::NodeEmitContext;
use crate::compiler::CompileResult;
use crate::graph::{
    ElementType, GraphError, GraphResult, InputPort, ModelTransformer, Node, NodeId, OutputPort,
};
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

/// Fixed value baked into the compiled routine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantNode {
    value: Tensor,
    outputs: [OutputPort; 1],
}

impl ConstantNode {
    pub fn new(shape: impl Into<Vec<usize>>, values: Vec<f32>) -> GraphResult<Self> {
        Self::from_tensor(Tensor::from_vec(shape, values)?)
    }

    pub fn from_tensor(value: Tensor) -> GraphResult<Self> {
        let layout = PortMemoryLayout::contiguous(value.shape().to_vec())?;
        Ok(Self {
            value,
            outputs: [OutputPort::new("output", layout)],
        })
    }

    /// Mask constant. Every value must be exactly 0 or 1; this is checked in all
    /// build configurations.
    pub fn binary(shape: impl Into<Vec<usize>>, values: Vec<f32>) -> GraphResult<Self> {
        if let Some(bad) = values.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(GraphError::InvalidValue {
                context: "binary constant".to_string(),
                value: *bad,
            });
        }
        let mut node = Self::new(shape, values)?;
        let [port] = node.outputs;
        node.outputs = [port.with_element(ElementType::Binary)];
        Ok(node)
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }
}

impl Node for ConstantNode {
    fn type_name(&self) -> &'static str {
        match self.outputs[0].element() {
            ElementType::Real => "ConstantNode<float>",
            ElementType::Binary => "ConstantNode<bool>",
        }
    }

    fn inputs(&self) -> &[InputPort] {
        &[]
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn constant_value(&self) -> Option<&Tensor> {
        Some(&self.value)
    }

    fn is_compilable(&self, _target: &Target) -> bool {
        true
    }

    // The compiler materializes the value as a constant buffer.
    fn compile(&self, _cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        Ok(())
    }

    fn evaluate(&self, _inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Ok(vec![self.value.clone()])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let new_id = transformer.add_node(self.clone())?;
        transformer.map_outputs(id, new_id)
    }
}

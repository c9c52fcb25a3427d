use crate::backend::Target;
use crate::codegen::{emit_copy, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    Boundary, GraphError, GraphResult, InputPort, Model, ModelTransformer, Node, NodeId,
    OutputPort, PortRef,
};
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

/// Entry point of raw data; bound to a buffer by a map input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputNode {
    outputs: [OutputPort; 1],
}

impl InputNode {
    pub fn new(shape: impl Into<Vec<usize>>) -> GraphResult<Self> {
        let layout = PortMemoryLayout::contiguous(shape)?;
        Ok(Self {
            outputs: [OutputPort::new("output", layout)],
        })
    }

    pub fn layout(&self) -> &PortMemoryLayout {
        self.outputs[0].layout()
    }
}

impl Node for InputNode {
    fn type_name(&self) -> &'static str {
        "InputNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &[]
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn boundary(&self) -> Option<Boundary> {
        Some(Boundary::Input)
    }

    fn is_compilable(&self, _target: &Target) -> bool {
        true
    }

    fn compile(&self, _cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        Ok(())
    }

    fn evaluate(&self, _inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Err(GraphError::Evaluation(
            "input nodes take their value from the map".to_string(),
        ))
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let new_id = transformer.add_node(self.clone())?;
        transformer.map_outputs(id, new_id)
    }
}

/// Copies its input into a contiguous buffer suitable for a declared output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
    inputs: [InputPort; 1],
    outputs: [OutputPort; 1],
}

impl OutputNode {
    pub fn new(model: &Model, source: PortRef) -> GraphResult<Self> {
        let input = InputPort::new(model, "input", source)?;
        let layout = PortMemoryLayout::contiguous(input.layout().size().to_vec())?;
        let element = input.element();
        Ok(Self {
            inputs: [input],
            outputs: [OutputPort::new("output", layout).with_element(element)],
        })
    }
}

impl Node for OutputNode {
    fn type_name(&self) -> &'static str {
        "OutputNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn boundary(&self) -> Option<Boundary> {
        Some(Boundary::Output)
    }

    fn is_compilable(&self, _target: &Target) -> bool {
        true
    }

    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let input = cx.input(0)?;
        let output = cx.output(0)?;
        emit_copy(cx.function(), &input, &output)
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Ok(vec![inputs[0].clone()])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        transformer.rebuild(id, |model, inputs| OutputNode::new(model, inputs[0]))?;
        Ok(())
    }
}

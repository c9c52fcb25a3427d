use crate::backend::{CallbackKind, Target};
use crate::codegen::{emit_copy, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    Boundary, GraphError, GraphResult, InputPort, Model, ModelTransformer, Node, NodeId,
    OutputPort, PortRef,
};
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

/// Pulls its value from a host callback named `symbol` each time the map runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    symbol: String,
    outputs: [OutputPort; 1],
}

impl SourceNode {
    pub fn new(symbol: impl Into<String>, shape: impl Into<Vec<usize>>) -> GraphResult<Self> {
        let layout = PortMemoryLayout::contiguous(shape)?;
        Ok(Self {
            symbol: symbol.into(),
            outputs: [OutputPort::new("output", layout)],
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn layout(&self) -> &PortMemoryLayout {
        self.outputs[0].layout()
    }
}

impl Node for SourceNode {
    fn type_name(&self) -> &'static str {
        "SourceNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &[]
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn boundary(&self) -> Option<Boundary> {
        Some(Boundary::Source)
    }

    fn is_compilable(&self, target: &Target) -> bool {
        target.supports_callbacks
    }

    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let output = cx.output(0)?;
        let len = output.layout.memory_size();
        cx.function()
            .callback(self.symbol.clone(), CallbackKind::Source, output.buffer, len);
        Ok(())
    }

    fn evaluate(&self, _inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Err(GraphError::Evaluation(format!(
            "source `{}` needs a host callback",
            self.symbol
        )))
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let new_id = transformer.add_node(self.clone())?;
        transformer.map_outputs(id, new_id)
    }
}

/// Hands its input to a host callback named `symbol` and passes it through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkNode {
    symbol: String,
    inputs: [InputPort; 1],
    outputs: [OutputPort; 1],
}

impl SinkNode {
    pub fn new(model: &Model, source: PortRef, symbol: impl Into<String>) -> GraphResult<Self> {
        let input = InputPort::new(model, "input", source)?;
        let layout = PortMemoryLayout::contiguous(input.layout().size().to_vec())?;
        let element = input.element();
        Ok(Self {
            symbol: symbol.into(),
            inputs: [input],
            outputs: [OutputPort::new("output", layout).with_element(element)],
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Node for SinkNode {
    fn type_name(&self) -> &'static str {
        "SinkNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn boundary(&self) -> Option<Boundary> {
        Some(Boundary::Sink)
    }

    fn is_compilable(&self, target: &Target) -> bool {
        target.supports_callbacks
    }

    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let input = cx.input(0)?;
        let output = cx.output(0)?;
        let f = cx.function();
        emit_copy(f, &input, &output)?;
        f.callback(
            self.symbol.clone(),
            CallbackKind::Sink,
            output.buffer,
            output.layout.memory_size(),
        );
        Ok(())
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Ok(vec![inputs[0].clone()])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let symbol = self.symbol.clone();
        transformer.rebuild(id, |model, inputs| SinkNode::new(model, inputs[0], symbol))?;
        Ok(())
    }
}

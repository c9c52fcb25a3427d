use crate::backend::{Target, UnaryOp, ValueExpr};
use crate::codegen::{DimensionLoop, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    GraphResult, InputPort, Model, ModelTransformer, Node, NodeId, OutputPort, PortRef,
};
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperationNode {
    op: UnaryOp,
    inputs: [InputPort; 1],
    outputs: [OutputPort; 1],
}

impl UnaryOperationNode {
    pub fn new(model: &Model, input: PortRef, op: UnaryOp) -> GraphResult<Self> {
        let input = InputPort::new(model, "input", input)?;
        let layout = PortMemoryLayout::contiguous(input.layout().size().to_vec())?;
        Ok(Self {
            op,
            inputs: [input],
            outputs: [OutputPort::new("output", layout)],
        })
    }

    pub fn op(&self) -> UnaryOp {
        self.op
    }
}

impl Node for UnaryOperationNode {
    fn type_name(&self) -> &'static str {
        "UnaryOperationNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn is_compilable(&self, target: &Target) -> bool {
        target.has_primitive(self.op.primitive())
    }

    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let input = cx.input(0)?;
        let output = cx.output(0)?;
        let nest = DimensionLoop::elementwise(&input.layout, &output.layout)?;
        nest.emit(cx.function(), |f, offsets| {
            let value = ValueExpr::unary(
                self.op,
                ValueExpr::load(input.buffer, offsets[1].clone()),
            );
            f.store(output.buffer, offsets[0].clone(), value);
            Ok(())
        })
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        let op = self.op;
        Ok(vec![inputs[0].map(|x| op.apply(x))])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let op = self.op;
        transformer.rebuild(id, |model, inputs| {
            UnaryOperationNode::new(model, inputs[0], op)
        })?;
        Ok(())
    }
}

use crate::backend::{BinaryOp, Target, ValueExpr};
use crate::codegen::{DimensionLoop, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    GraphError, GraphResult, InputPort, Model, ModelTransformer, Node, NodeId, OutputPort,
    PortRef,
};
use crate::layout::{broadcast_shapes, PortMemoryLayout};
use crate::tensor::Tensor;

/// Elementwise binary operation with broadcasting. Operand shapes are aligned from the
/// trailing dimension; extent-1 and missing leading dimensions stretch.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperationNode {
    op: BinaryOp,
    inputs: [InputPort; 2],
    outputs: [OutputPort; 1],
}

impl BinaryOperationNode {
    /// Output is contiguous with the broadcast shape of both operands.
    pub fn new(model: &Model, lhs: PortRef, rhs: PortRef, op: BinaryOp) -> GraphResult<Self> {
        let lhs = InputPort::new(model, "input1", lhs)?;
        let rhs = InputPort::new(model, "input2", rhs)?;
        let shape = broadcast_shapes(lhs.layout().size(), rhs.layout().size())?;
        let layout = PortMemoryLayout::contiguous(shape)?;
        Ok(Self {
            op,
            inputs: [lhs, rhs],
            outputs: [OutputPort::new("output", layout)],
        })
    }

    /// Writes into `layout`, which may be padded or reordered but must have the
    /// broadcast shape as its active size.
    pub fn with_output_layout(
        model: &Model,
        lhs: PortRef,
        rhs: PortRef,
        op: BinaryOp,
        layout: PortMemoryLayout,
    ) -> GraphResult<Self> {
        let mut node = Self::new(model, lhs, rhs, op)?;
        let shape = node.outputs[0].layout().size();
        if layout.size() != shape {
            return Err(GraphError::shape_mismatch(
                "binary operation output",
                layout.size(),
                shape,
            ));
        }
        node.outputs = [OutputPort::new("output", layout)];
        Ok(node)
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl Node for BinaryOperationNode {
    fn type_name(&self) -> &'static str {
        "BinaryOperationNode<float>"
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
        let lhs = cx.input(0)?;
        let rhs = cx.input(1)?;
        let output = cx.output(0)?;
        let nest = DimensionLoop::broadcast(&output.layout, &[&lhs.layout, &rhs.layout])?;
        nest.emit(cx.function(), |f, offsets| {
            let value = ValueExpr::binary(
                self.op,
                ValueExpr::load(lhs.buffer, offsets[1].clone()),
                ValueExpr::load(rhs.buffer, offsets[2].clone()),
            );
            f.store(output.buffer, offsets[0].clone(), value);
            Ok(())
        })
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        let shape = self.outputs[0].layout().size();
        let lhs = inputs[0].broadcast_to(shape)?;
        let rhs = inputs[1].broadcast_to(shape)?;
        let data = lhs
            .data()
            .iter()
            .zip(rhs.data())
            .map(|(a, b)| self.op.apply(*a, *b))
            .collect();
        Ok(vec![Tensor::from_vec(shape.to_vec(), data)?])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let op = self.op;
        let layout = self.outputs[0].layout().clone();
        transformer.rebuild(id, |model, inputs| {
            BinaryOperationNode::with_output_layout(model, inputs[0], inputs[1], op, layout)
        })?;
        Ok(())
    }
}

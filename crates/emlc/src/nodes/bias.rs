use std::sync::Arc;

use crate::backend::{BinaryOp, BufferKind, Target, ValueExpr};
use crate::codegen::{DimensionLoop, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    GraphResult, InputPort, Model, ModelTransformer, Node, NodeId, OutputPort, PortRef,
};
use crate::layout::PortMemoryLayout;
use crate::nn::layers::{BiasLayer, Layer};
use crate::tensor::Tensor;

/// Wraps a [`BiasLayer`]; the bias vector is emitted as a constant table read with
/// broadcast increments.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasLayerNode {
    layer: BiasLayer,
    inputs: [InputPort; 1],
    outputs: [OutputPort; 1],
}

impl BiasLayerNode {
    pub fn new(model: &Model, input: PortRef, layer: BiasLayer) -> GraphResult<Self> {
        let input = InputPort::new(model, "input", input)?;
        layer.check_input(input.layout())?;
        let output = OutputPort::new("output", layer.shape().output.clone());
        Ok(Self {
            layer,
            inputs: [input],
            outputs: [output],
        })
    }

    pub fn layer(&self) -> &BiasLayer {
        &self.layer
    }
}

impl Node for BiasLayerNode {
    fn type_name(&self) -> &'static str {
        "BiasLayerNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn is_compilable(&self, _target: &Target) -> bool {
        true
    }

    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let input = cx.input(0)?;
        let output = cx.output(0)?;
        let label = format!("bias_{}", cx.node().0);
        let bias_layout = PortMemoryLayout::contiguous(self.layer.broadcast_shape())?;
        let f = cx.function();
        let bias = f.declare_buffer(
            BufferKind::Constant(Arc::from(self.layer.bias())),
            bias_layout.memory_size(),
            label,
        );
        let nest = DimensionLoop::broadcast(&output.layout, &[&input.layout, &bias_layout])?;
        nest.emit(f, |f, offsets| {
            let value = ValueExpr::binary(
                BinaryOp::Add,
                ValueExpr::load(input.buffer, offsets[1].clone()),
                ValueExpr::load(bias, offsets[2].clone()),
            );
            f.store(output.buffer, offsets[0].clone(), value);
            Ok(())
        })
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Ok(vec![self.layer.compute(inputs[0])?])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let layer = self.layer.clone();
        transformer.rebuild(id, |model, inputs| BiasLayerNode::new(model, inputs[0], layer))?;
        Ok(())
    }
}

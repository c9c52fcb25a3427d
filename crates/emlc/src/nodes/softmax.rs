use crate::backend::{BinaryOp, Target, UnaryOp, ValueExpr};
use crate::codegen::{DimensionLoop, NodeEmitContext};
use crate::compiler::CompileResult;
use crate::graph::{
    GraphResult, InputPort, Model, ModelTransformer, Node, NodeId, OutputPort, PortRef,
};
use crate::nn::layers::{Layer, SoftmaxLayer};
use crate::tensor::Tensor;

/// Wraps a [`SoftmaxLayer`] as a single-input, single-output node.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxLayerNode {
    layer: SoftmaxLayer,
    inputs: [InputPort; 1],
    outputs: [OutputPort; 1],
}

impl SoftmaxLayerNode {
    pub fn new(model: &Model, input: PortRef, layer: SoftmaxLayer) -> GraphResult<Self> {
        let input = InputPort::new(model, "input", input)?;
        layer.check_input(input.layout())?;
        let output = OutputPort::new("output", layer.shape().output.clone());
        Ok(Self {
            layer,
            inputs: [input],
            outputs: [output],
        })
    }

    pub fn layer(&self) -> &SoftmaxLayer {
        &self.layer
    }
}

impl Node for SoftmaxLayerNode {
    fn type_name(&self) -> &'static str {
        "SoftmaxLayerNode<float>"
    }

    fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    // max, sub, exp, add and div are core primitives.
    fn is_compilable(&self, _target: &Target) -> bool {
        true
    }

    /// For every slice along the softmax axis: (1) reduce to the maximum, (2) write
    /// `exp(x - max)` to the output, (3) reduce the output to its sum, (4) divide the
    /// output by the sum in place.
    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()> {
        let input = cx.input(0)?;
        let output = cx.output(0)?;
        let nest = DimensionLoop::broadcast(&output.layout, &[&input.layout])?;
        let (outer, len, along) = nest.split_axis(self.layer.axis())?;

        outer.emit(cx.function(), |f, offsets| {
            let slice = DimensionLoop::new(vec![len])
                .operand(offsets[0].clone(), vec![along[0]])?
                .operand(offsets[1].clone(), vec![along[1]])?;

            let max = f.declare_accumulator(f32::NEG_INFINITY);
            slice.emit(f, |f, at| {
                f.accumulate(max, BinaryOp::Max, ValueExpr::load(input.buffer, at[1].clone()));
                Ok(())
            })?;

            slice.emit(f, |f, at| {
                let shifted = ValueExpr::binary(
                    BinaryOp::Sub,
                    ValueExpr::load(input.buffer, at[1].clone()),
                    ValueExpr::Scalar(max),
                );
                f.store(output.buffer, at[0].clone(), ValueExpr::unary(UnaryOp::Exp, shifted));
                Ok(())
            })?;

            let sum = f.declare_accumulator(0.0);
            slice.emit(f, |f, at| {
                f.accumulate(sum, BinaryOp::Add, ValueExpr::load(output.buffer, at[0].clone()));
                Ok(())
            })?;

            let normalize =
                DimensionLoop::in_place(offsets[0].clone(), vec![len], vec![along[0]])?;
            normalize.emit(f, |f, at| {
                let value = ValueExpr::binary(
                    BinaryOp::Div,
                    ValueExpr::load(output.buffer, at[0].clone()),
                    ValueExpr::Scalar(sum),
                );
                f.store(output.buffer, at[0].clone(), value);
                Ok(())
            })
        })
    }

    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>> {
        Ok(vec![self.layer.compute(inputs[0])?])
    }

    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()> {
        let layer = self.layer.clone();
        transformer.rebuild(id, |model, inputs| {
            SoftmaxLayerNode::new(model, inputs[0], layer)
        })?;
        Ok(())
    }
}

use crate::graph::{GraphError, GraphResult};
use crate::nn::layers::{resolve_axis, Layer, LayerShape};
use crate::tensor::Tensor;

/// Adds one bias value per channel, where channels run along `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasLayer {
    shape: LayerShape,
    axis: usize,
    bias: Vec<f32>,
}

impl BiasLayer {
    pub fn new(shape: LayerShape, axis: isize, bias: Vec<f32>) -> GraphResult<Self> {
        if shape.input.size() != shape.output.size() {
            return Err(GraphError::shape_mismatch(
                "bias layer",
                shape.input.size(),
                shape.output.size(),
            ));
        }
        let axis = resolve_axis(axis, shape.input.rank())?;
        let channels = shape.input.size()[axis];
        if bias.len() != channels {
            return Err(GraphError::shape_mismatch(
                "bias values",
                vec![bias.len()],
                vec![channels],
            ));
        }
        Ok(Self { shape, axis, bias })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Shape of the bias vector when broadcast against the layer's input: extent 1
    /// everywhere except along the channel axis.
    pub fn broadcast_shape(&self) -> Vec<usize> {
        let mut shape = vec![1; self.shape.input.rank()];
        shape[self.axis] = self.bias.len();
        shape
    }
}

impl Layer for BiasLayer {
    fn name(&self) -> &'static str {
        "BiasLayer"
    }

    fn shape(&self) -> &LayerShape {
        &self.shape
    }

    fn compute(&self, input: &Tensor) -> GraphResult<Tensor> {
        let bias = Tensor::from_vec(self.broadcast_shape(), self.bias.clone())?
            .broadcast_to(input.shape())?;
        let data = input
            .data()
            .iter()
            .zip(bias.data())
            .map(|(x, b)| x + b)
            .collect();
        Tensor::from_vec(input.shape().to_vec(), data)
    }
}

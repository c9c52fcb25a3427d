use crate::graph::{GraphError, GraphResult};
use crate::nn::layers::{resolve_axis, Layer, LayerShape};
use crate::tensor::Tensor;

/// Softmax along one axis. The maximum of each slice is subtracted before
/// exponentiating, so large inputs cannot overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxLayer {
    shape: LayerShape,
    axis: usize,
}

impl SoftmaxLayer {
    /// Softmax over the last dimension.
    pub fn new(shape: LayerShape) -> GraphResult<Self> {
        Self::with_axis(shape, -1)
    }

    pub fn with_axis(shape: LayerShape, axis: isize) -> GraphResult<Self> {
        if shape.input.size() != shape.output.size() {
            return Err(GraphError::shape_mismatch(
                "softmax layer",
                shape.input.size(),
                shape.output.size(),
            ));
        }
        let axis = resolve_axis(axis, shape.input.rank())?;
        Ok(Self { shape, axis })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }
}

impl Layer for SoftmaxLayer {
    fn name(&self) -> &'static str {
        "SoftmaxLayer"
    }

    fn shape(&self) -> &LayerShape {
        &self.shape
    }

    fn compute(&self, input: &Tensor) -> GraphResult<Tensor> {
        let dims = input.shape();
        if dims != self.shape.input.size() {
            return Err(GraphError::shape_mismatch("softmax", dims, self.shape.input.size()));
        }
        let len = dims[self.axis];
        let outer: usize = dims[..self.axis].iter().product();
        let inner: usize = dims[self.axis + 1..].iter().product();
        let src = input.data();
        let mut out = vec![0.0f32; src.len()];
        for o in 0..outer {
            for i in 0..inner {
                let base = o * len * inner + i;
                let mut max = f32::NEG_INFINITY;
                for k in 0..len {
                    max = max.max(src[base + k * inner]);
                }
                let mut sum = 0.0f32;
                for k in 0..len {
                    let e = (src[base + k * inner] - max).exp();
                    out[base + k * inner] = e;
                    sum += e;
                }
                for k in 0..len {
                    out[base + k * inner] /= sum;
                }
            }
        }
        Tensor::from_vec(dims.to_vec(), out)
    }
}

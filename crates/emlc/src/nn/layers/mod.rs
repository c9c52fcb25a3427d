//! Layers with fixed parameters and a declared shape contract.
//!
//! Layer nodes delegate their shape rule to the layer: a layer accepts an input whose
//! active size matches its declared input, and produces its declared output layout.

mod bias;
mod softmax;

use std::fmt;

use crate::graph::{GraphError, GraphResult};
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

pub use bias::BiasLayer;
pub use softmax::SoftmaxLayer;

/// Declared input and output layouts of a layer. Either side may carry padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShape {
    pub input: PortMemoryLayout,
    pub output: PortMemoryLayout,
}

impl LayerShape {
    pub fn new(input: PortMemoryLayout, output: PortMemoryLayout) -> Self {
        Self { input, output }
    }

    /// Contiguous input and output of the same size.
    pub fn contiguous(size: impl Into<Vec<usize>>) -> GraphResult<Self> {
        let layout = PortMemoryLayout::contiguous(size)?;
        Ok(Self::new(layout.clone(), layout))
    }
}

pub trait Layer: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn shape(&self) -> &LayerShape;

    /// Reference evaluation on a logical tensor.
    fn compute(&self, input: &Tensor) -> GraphResult<Tensor>;

    /// Checks that a port with `layout` can feed this layer.
    fn check_input(&self, layout: &PortMemoryLayout) -> GraphResult<()> {
        let declared = &self.shape().input;
        if declared.size() != layout.size() {
            return Err(GraphError::shape_mismatch(
                format!("{} input", self.name()),
                layout.size(),
                declared.size(),
            ));
        }
        Ok(())
    }
}

/// Negative axes count from the end.
pub(crate) fn resolve_axis(axis: isize, rank: usize) -> GraphResult<usize> {
    let resolved = if axis < 0 { rank as isize + axis } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(GraphError::InvalidLayout(format!(
            "axis {axis} out of range for rank {rank}"
        )));
    }
    Ok(resolved as usize)
}

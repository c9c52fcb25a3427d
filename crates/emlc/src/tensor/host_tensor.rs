//! Dense row-major `f32` tensor living on the host.

use crate::graph::{GraphError, GraphResult};
use crate::layout::{broadcast_shapes, PortMemoryLayout};

/// Logical (unpadded, row-major) view of a port's value.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Constructs a tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> GraphResult<Self> {
        let shape = shape.into();
        let expected = shape
            .iter()
            .try_fold(1usize, |total, dim| total.checked_mul(*dim));
        if expected != Some(data.len()) {
            return Err(GraphError::Evaluation(format!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn filled(shape: impl Into<Vec<usize>>, value: f32) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Gathers the active region of `buffer` laid out as `layout`.
    pub fn from_layout(layout: &PortMemoryLayout, buffer: &[f32]) -> GraphResult<Self> {
        if buffer.len() < layout.memory_size() {
            return Err(GraphError::Evaluation(format!(
                "buffer of {} entries is too small for layout {layout}",
                buffer.len()
            )));
        }
        let mut data = Vec::with_capacity(layout.num_elements());
        for_each_index(layout.size(), |index| {
            data.push(buffer[layout.entry_offset(index)]);
        });
        Self::from_vec(layout.size().to_vec(), data)
    }

    /// Scatters this tensor into the active region of `buffer` laid out as `layout`.
    pub fn write_to_layout(&self, layout: &PortMemoryLayout, buffer: &mut [f32]) -> GraphResult<()> {
        if layout.size() != self.shape.as_slice() || buffer.len() < layout.memory_size() {
            return Err(GraphError::shape_mismatch(
                "write_to_layout",
                self.shape.clone(),
                layout.size().to_vec(),
            ));
        }
        let mut flat = 0usize;
        for_each_index(layout.size(), |index| {
            buffer[layout.entry_offset(index)] = self.data[flat];
            flat += 1;
        });
        Ok(())
    }

    /// Materializes the broadcast of this tensor to `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> GraphResult<Tensor> {
        let resolved = broadcast_shapes(&self.shape, shape)?;
        if resolved != shape {
            return Err(GraphError::shape_mismatch("broadcast_to", self.shape.clone(), shape));
        }
        if self.shape == shape {
            return Ok(self.clone());
        }
        let rank = shape.len();
        let mut in_dims = vec![1; rank - self.shape.len()];
        in_dims.extend_from_slice(&self.shape);
        let in_strides = row_major_strides(&in_dims);
        let out_strides = row_major_strides(shape);
        let mut out = vec![0.0f32; shape.iter().product()];
        broadcast_rec(
            &mut out,
            &self.data,
            0,
            (0, 0),
            (shape, &in_dims),
            (&out_strides, &in_strides),
        );
        Tensor::from_vec(shape.to_vec(), out)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Largest absolute elementwise difference, or `None` when the shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor) -> Option<f32> {
        if self.shape != other.shape {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f32, f32::max),
        )
    }
}

pub(crate) fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Visits every index of `dims` in row-major order.
pub(crate) fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    let total: usize = dims.iter().product();
    let mut index = vec![0usize; dims.len()];
    for _ in 0..total {
        f(&index);
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

fn broadcast_rec(
    out: &mut [f32],
    input: &[f32],
    axis: usize,
    (out_offset, in_offset): (usize, usize),
    (out_dims, in_dims): (&[usize], &[usize]),
    (out_strides, in_strides): (&[usize], &[usize]),
) {
    let rank = out_dims.len();
    if axis >= rank {
        out[out_offset] = input[in_offset];
        return;
    }

    if in_dims[axis..] == out_dims[axis..] {
        let block_len: usize = out_dims[axis..].iter().product();
        out[out_offset..out_offset + block_len]
            .copy_from_slice(&input[in_offset..in_offset + block_len]);
        return;
    }

    if in_dims[axis..].iter().all(|&dim| dim == 1) {
        let block_len: usize = out_dims[axis..].iter().product();
        out[out_offset..out_offset + block_len].fill(input[in_offset]);
        return;
    }

    let in_step = if in_dims[axis] == 1 {
        0
    } else {
        in_strides[axis]
    };
    for i in 0..out_dims[axis] {
        broadcast_rec(
            out,
            input,
            axis + 1,
            (out_offset + i * out_strides[axis], in_offset + i * in_step),
            (out_dims, in_dims),
            (out_strides, in_strides),
        );
    }
}

//! Memory layout of the buffer behind a port.
//!
//! A layout describes the *active* region of an N-dimensional buffer (`size`), the
//! allocated region around it (`extent`), the padding before the active region
//! (`offset`) and the physical ordering of the logical dimensions (`order`, outermost
//! first). All extents are static; a layout with a zero extent cannot be built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{GraphError, GraphResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMemoryLayout {
    size: Vec<usize>,
    extent: Vec<usize>,
    offset: Vec<usize>,
    order: Vec<usize>,
}

impl PortMemoryLayout {
    /// Dense row-major layout of the given logical shape.
    pub fn contiguous(size: impl Into<Vec<usize>>) -> GraphResult<Self> {
        let size = size.into();
        let rank = size.len();
        Self::new(size.clone(), size, vec![0; rank], (0..rank).collect())
    }

    /// Row-major layout with `padding[d]` unused entries on both sides of dimension `d`.
    pub fn padded(size: impl Into<Vec<usize>>, padding: &[usize]) -> GraphResult<Self> {
        let size = size.into();
        if padding.len() != size.len() {
            return Err(GraphError::InvalidLayout(format!(
                "padding rank {} does not match size rank {}",
                padding.len(),
                size.len()
            )));
        }
        let extent = size
            .iter()
            .zip(padding)
            .map(|(dim, pad)| pad.checked_mul(2).and_then(|pad| dim.checked_add(pad)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                GraphError::InvalidLayout(format!("padding {padding:?} overflows size {size:?}"))
            })?;
        let rank = size.len();
        Self::new(size, extent, padding.to_vec(), (0..rank).collect())
    }

    pub fn new(
        size: Vec<usize>,
        extent: Vec<usize>,
        offset: Vec<usize>,
        order: Vec<usize>,
    ) -> GraphResult<Self> {
        let rank = size.len();
        if extent.len() != rank || offset.len() != rank || order.len() != rank {
            return Err(GraphError::InvalidLayout(format!(
                "rank mismatch: size {size:?}, extent {extent:?}, offset {offset:?}, order {order:?}"
            )));
        }
        if let Some(axis) = size.iter().position(|dim| *dim == 0) {
            return Err(GraphError::InvalidLayout(format!(
                "dimension {axis} of {size:?} has zero extent"
            )));
        }
        for axis in 0..rank {
            if offset[axis].saturating_add(size[axis]) > extent[axis] {
                return Err(GraphError::InvalidLayout(format!(
                    "active region {}+{} exceeds extent {} in dimension {axis}",
                    offset[axis], size[axis], extent[axis]
                )));
            }
        }
        if extent
            .iter()
            .try_fold(1usize, |total, dim| total.checked_mul(*dim))
            .is_none()
        {
            return Err(GraphError::InvalidLayout(format!(
                "extent {extent:?} has more entries than fit in memory"
            )));
        }
        let mut seen = vec![false; rank];
        for &axis in &order {
            if axis >= rank || seen[axis] {
                return Err(GraphError::InvalidLayout(format!(
                    "order {order:?} is not a permutation of 0..{rank}"
                )));
            }
            seen[axis] = true;
        }
        Ok(Self {
            size,
            extent,
            offset,
            order,
        })
    }

    /// Returns the same layout with a different physical dimension order.
    pub fn with_order(self, order: Vec<usize>) -> GraphResult<Self> {
        Self::new(self.size, self.extent, self.offset, order)
    }

    pub fn rank(&self) -> usize {
        self.size.len()
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    pub fn offset(&self) -> &[usize] {
        &self.offset
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Number of entries in the active region.
    pub fn num_elements(&self) -> usize {
        self.size.iter().product()
    }

    /// Number of entries the backing buffer must hold, padding included.
    pub fn memory_size(&self) -> usize {
        self.extent.iter().product()
    }

    /// Distance in memory between consecutive indices of each logical dimension.
    pub fn cumulative_increments(&self) -> Vec<usize> {
        let mut increments = vec![0; self.rank()];
        let mut stride = 1usize;
        for &axis in self.order.iter().rev() {
            increments[axis] = stride;
            stride *= self.extent[axis];
        }
        increments
    }

    /// Memory offset of the first active entry.
    pub fn first_entry_offset(&self) -> usize {
        self.offset
            .iter()
            .zip(self.cumulative_increments())
            .map(|(offset, stride)| offset * stride)
            .sum()
    }

    /// Memory offset of an index into the active region.
    pub fn entry_offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        self.first_entry_offset()
            + index
                .iter()
                .zip(self.cumulative_increments())
                .map(|(i, stride)| i * stride)
                .sum::<usize>()
    }

    pub fn is_contiguous(&self) -> bool {
        self.size == self.extent
            && self.offset.iter().all(|offset| *offset == 0)
            && self.order.iter().enumerate().all(|(i, axis)| i == *axis)
    }

    pub fn same_size(&self, other: &PortMemoryLayout) -> bool {
        self.size == other.size
    }

    /// Increments of this layout when read as an operand of a `rank`-dimensional
    /// broadcast. Dimensions are aligned from the trailing side; missing leading
    /// dimensions and stretched (extent 1) dimensions get increment 0.
    pub fn broadcast_increments(&self, output: &[usize]) -> GraphResult<Vec<usize>> {
        let rank = output.len();
        if self.rank() > rank {
            return Err(GraphError::shape_mismatch(
                "broadcast",
                self.size.clone(),
                output.to_vec(),
            ));
        }
        let lead = rank - self.rank();
        let increments = self.cumulative_increments();
        let mut out = vec![0; rank];
        for axis in 0..self.rank() {
            let dim = self.size[axis];
            let target = output[lead + axis];
            if dim == target {
                out[lead + axis] = increments[axis];
            } else if dim != 1 {
                return Err(GraphError::shape_mismatch(
                    "broadcast",
                    self.size.clone(),
                    output.to_vec(),
                ));
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PortMemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .size
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        if self.is_contiguous() {
            write!(f, "[{dims}]")
        } else {
            write!(
                f,
                "[{dims}] extent {:?} offset {:?} order {:?}",
                self.extent, self.offset, self.order
            )
        }
    }
}

/// Result shape of broadcasting two shapes against each other.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> GraphResult<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let l = lhs.len().checked_sub(rank - i).map(|axis| lhs[axis]);
        let r = rhs.len().checked_sub(rank - i).map(|axis| rhs[axis]);
        out[i] = match (l, r) {
            (Some(a), Some(b)) if a == b => a,
            (Some(1), Some(b)) => b,
            (Some(a), Some(1)) => a,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            _ => return Err(GraphError::shape_mismatch("broadcast", lhs, rhs)),
        };
    }
    Ok(out)
}

//! Nested-loop generation over port layouts.
//!
//! A [`DimensionLoop`] emits one loop per dimension, outer to inner, and tracks a flat
//! offset per operand. Each operand advances by its own increment for the current
//! dimension; broadcast (stretched) dimensions use increment 0, so smaller operands are
//! re-read in place instead of being materialized at the output size.

use crate::backend::{FunctionEmitter, IndexExpr, ValueExpr};
use crate::codegen::PortBuffer;
use crate::compiler::CompileResult;
use crate::graph::{GraphError, GraphResult};
use crate::layout::PortMemoryLayout;

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOperand {
    pub base: IndexExpr,
    pub increments: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLoop {
    extents: Vec<usize>,
    operands: Vec<LoopOperand>,
}

impl DimensionLoop {
    pub fn new(extents: Vec<usize>) -> Self {
        Self {
            extents,
            operands: Vec::new(),
        }
    }

    /// Adds an operand whose offset starts at `base` and advances by `increments[d]`
    /// along dimension `d`.
    pub fn operand(mut self, base: IndexExpr, increments: Vec<usize>) -> GraphResult<Self> {
        if increments.len() != self.extents.len() {
            return Err(GraphError::shape_mismatch(
                "loop operand",
                increments,
                self.extents.clone(),
            ));
        }
        self.operands.push(LoopOperand { base, increments });
        Ok(self)
    }

    /// Loop over the active region of `output`, with every layout in `inputs` read
    /// through broadcast increments. Operand 0 is the output, operand `k + 1` is
    /// `inputs[k]`.
    pub fn broadcast(output: &PortMemoryLayout, inputs: &[&PortMemoryLayout]) -> GraphResult<Self> {
        let extents = output.size().to_vec();
        let mut nest = Self::new(extents.clone()).operand(
            IndexExpr::constant(output.first_entry_offset()),
            output.cumulative_increments(),
        )?;
        for input in inputs {
            let increments = input.broadcast_increments(&extents)?;
            nest = nest.operand(IndexExpr::constant(input.first_entry_offset()), increments)?;
        }
        Ok(nest)
    }

    /// Loop reading `input` and writing `output`, which must have the same active size.
    pub fn elementwise(input: &PortMemoryLayout, output: &PortMemoryLayout) -> GraphResult<Self> {
        if !input.same_size(output) {
            return Err(GraphError::shape_mismatch(
                "elementwise loop",
                input.size(),
                output.size(),
            ));
        }
        Self::broadcast(output, &[input])
    }

    /// Single-operand loop that reads and writes the same buffer, starting at `base`.
    pub fn in_place(
        base: IndexExpr,
        extents: Vec<usize>,
        increments: Vec<usize>,
    ) -> GraphResult<Self> {
        Self::new(extents).operand(base, increments)
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn operands(&self) -> &[LoopOperand] {
        &self.operands
    }

    /// Removes `axis` from the nest. Returns the outer nest over the remaining
    /// dimensions, the extent of `axis` and each operand's increment along it.
    pub fn split_axis(&self, axis: usize) -> GraphResult<(DimensionLoop, usize, Vec<usize>)> {
        if axis >= self.extents.len() {
            return Err(GraphError::InvalidLayout(format!(
                "axis {axis} out of range for rank {}",
                self.extents.len()
            )));
        }
        let mut extents = self.extents.clone();
        let extent = extents.remove(axis);
        let mut along = Vec::with_capacity(self.operands.len());
        let operands = self
            .operands
            .iter()
            .map(|operand| {
                let mut increments = operand.increments.clone();
                along.push(increments.remove(axis));
                LoopOperand {
                    base: operand.base.clone(),
                    increments,
                }
            })
            .collect();
        Ok((DimensionLoop { extents, operands }, extent, along))
    }

    /// Emits the loop nest and calls `body` at the innermost level with each operand's
    /// resolved offset, in operand order.
    pub fn emit<F>(&self, f: &mut FunctionEmitter, mut body: F) -> CompileResult<()>
    where
        F: FnMut(&mut FunctionEmitter, &[IndexExpr]) -> CompileResult<()>,
    {
        let offsets = self.operands.iter().map(|op| op.base.clone()).collect();
        self.emit_level(f, 0, offsets, &mut body)
    }

    fn emit_level(
        &self,
        f: &mut FunctionEmitter,
        level: usize,
        offsets: Vec<IndexExpr>,
        body: &mut dyn FnMut(&mut FunctionEmitter, &[IndexExpr]) -> CompileResult<()>,
    ) -> CompileResult<()> {
        if level == self.extents.len() {
            return body(f, &offsets);
        }
        // An extent-1 dimension contributes nothing to any offset.
        if self.extents[level] == 1 {
            return self.emit_level(f, level + 1, offsets, body);
        }
        f.for_loop(0, self.extents[level], 1, |f, var| {
            let next = offsets
                .iter()
                .zip(&self.operands)
                .map(|(offset, operand)| offset.add_scaled(var, operand.increments[level]))
                .collect();
            self.emit_level(f, level + 1, next, body)
        })
    }
}

/// Copies the active region of `from` into `to`. Layouts may differ in padding and
/// order but not in active size.
pub fn emit_copy(f: &mut FunctionEmitter, from: &PortBuffer, to: &PortBuffer) -> CompileResult<()> {
    let nest = DimensionLoop::elementwise(&from.layout, &to.layout)?;
    nest.emit(f, |f, offsets| {
        let value = ValueExpr::load(from.buffer, offsets[1].clone());
        f.store(to.buffer, offsets[0].clone(), value);
        Ok(())
    })
}

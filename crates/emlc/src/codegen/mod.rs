//! Per-node code emission support.

mod dimension_loop;

use crate::backend::{BufferId, FunctionEmitter, Target};
use crate::compiler::{CompileError, CompileResult};
use crate::graph::NodeId;
use crate::layout::PortMemoryLayout;

pub use dimension_loop::{emit_copy, DimensionLoop, LoopOperand};

/// Buffer backing a port, with the layout used to address it.
#[derive(Debug, Clone, PartialEq)]
pub struct PortBuffer {
    pub buffer: BufferId,
    pub layout: PortMemoryLayout,
}

/// What a node sees while emitting its code: the routine under construction and the
/// buffers bound to its ports.
pub struct NodeEmitContext<'a> {
    function: &'a mut FunctionEmitter,
    target: &'a Target,
    node: NodeId,
    inputs: Vec<PortBuffer>,
    outputs: Vec<PortBuffer>,
}

impl<'a> NodeEmitContext<'a> {
    pub(crate) fn new(
        function: &'a mut FunctionEmitter,
        target: &'a Target,
        node: NodeId,
        inputs: Vec<PortBuffer>,
        outputs: Vec<PortBuffer>,
    ) -> Self {
        Self {
            function,
            target,
            node,
            inputs,
            outputs,
        }
    }

    pub fn function(&mut self) -> &mut FunctionEmitter {
        self.function
    }

    pub fn target(&self) -> &Target {
        self.target
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn input(&self, index: usize) -> CompileResult<PortBuffer> {
        self.inputs
            .get(index)
            .cloned()
            .ok_or_else(|| CompileError::failure(format!("{} has no input {index}", self.node)))
    }

    pub fn output(&self, index: usize) -> CompileResult<PortBuffer> {
        self.outputs
            .get(index)
            .cloned()
            .ok_or_else(|| CompileError::failure(format!("{} has no output {index}", self.node)))
    }
}

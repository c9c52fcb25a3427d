//! Model-to-model rewrites applied before compilation.
//!
//! A pass reads a model and builds a fresh one through a
//! [`ModelTransformer`](crate::graph::ModelTransformer); it never mutates its input. The
//! [`ModelOptimizer`] validates every pass result before adopting it, so a failing pass
//! leaves the caller's map exactly as it was.

mod pipeline;
pub mod passes;

use crate::compiler::MapCompilerOptions;
use crate::graph::{GraphResult, Model, NodeId, PortMap, PortRef, Transformed};
use crate::map::Map;

pub use passes::{ConstantFoldingPass, DeadNodeEliminationPass, ReplaceSourceAndSinkNodesPass};
pub use pipeline::{ModelOptimizer, OptimizeError, PipelineBuilder, Step};

/// Statistics reported by a [`ModelPass`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the graph.
    pub changed: bool,
    /// Number of nodes replaced by a different construction.
    pub rewrites_applied: usize,
    /// Nodes present in the input model but not in the output model.
    pub nodes_removed: usize,
}

impl PassResult {
    /// Merges two run results, accumulating statistics.
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            nodes_removed: self.nodes_removed + other.nodes_removed,
        }
    }
}

/// Ports and settings a pass must respect.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub options: &'a MapCompilerOptions,
    /// Ports bound to declared map outputs. They must survive every pass.
    pub required_outputs: &'a [PortRef],
    /// Input nodes bound to declared map inputs.
    pub required_inputs: &'a [NodeId],
}

#[derive(Debug)]
pub struct PassOutput {
    pub model: Model,
    pub ports: PortMap,
    pub result: PassResult,
}

impl PassOutput {
    pub fn new(transformed: Transformed, result: PassResult) -> Self {
        Self {
            model: transformed.model,
            ports: transformed.ports,
            result,
        }
    }
}

/// Interface implemented by graph rewrites.
pub trait ModelPass: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, model: &Model, cx: &PassContext<'_>) -> GraphResult<PassOutput>;
}

/// Detaches the map's boundary: drops its input bindings, replaces source and sink
/// nodes with plain input and output nodes and binds every input node, in model order,
/// as `input_1`, `input_2`, ... Applying it to its own result changes nothing.
pub fn detach_boundary(mut map: Map, options: &MapCompilerOptions) -> Result<Map, OptimizeError> {
    map.remove_inputs();
    let mut map = ModelOptimizer::new(options.clone())
        .with_pass(ReplaceSourceAndSinkNodesPass)
        .optimize(map)?;
    match map.bind_unbound_inputs() {
        Ok(_) => Ok(map),
        Err(error) => Err(OptimizeError::new("bind-inputs", error, map)),
    }
}

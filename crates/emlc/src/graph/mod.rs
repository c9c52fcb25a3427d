//! Dataflow graph: nodes, ports and the model that owns them.

mod error;
mod model;
mod topology;
mod transformer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::Target;
use crate::codegen::NodeEmitContext;
use crate::compiler::CompileResult;
use crate::layout::PortMemoryLayout;
use crate::tensor::Tensor;

pub use error::{GraphError, GraphResult};
pub use model::Model;
pub use topology::{topological_order, validate_model};
pub use transformer::{ModelTransformer, PortMap, Transformed};

/// Index of a node inside its owning [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The node's first output port.
    pub fn output(self) -> PortRef {
        PortRef::new(self, 0)
    }

    pub fn port(self, index: usize) -> PortRef {
        PortRef::new(self, index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Non-owning reference to an output port of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub index: usize,
}

impl PortRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

/// Kind of data carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    #[default]
    Real,
    /// Values restricted to 0.0 and 1.0.
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputPort {
    name: &'static str,
    layout: PortMemoryLayout,
    element: ElementType,
}

impl OutputPort {
    pub fn new(name: &'static str, layout: PortMemoryLayout) -> Self {
        Self {
            name,
            layout,
            element: ElementType::Real,
        }
    }

    pub fn with_element(mut self, element: ElementType) -> Self {
        self.element = element;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layout(&self) -> &PortMemoryLayout {
        &self.layout
    }

    pub fn element(&self) -> ElementType {
        self.element
    }
}

/// An input port records the output it reads from together with that output's layout
/// at the time the consumer was built.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPort {
    name: &'static str,
    source: PortRef,
    layout: PortMemoryLayout,
    element: ElementType,
}

impl InputPort {
    pub fn new(model: &Model, name: &'static str, source: PortRef) -> GraphResult<Self> {
        let port = model.output_port(source)?;
        Ok(Self {
            name,
            source,
            layout: port.layout().clone(),
            element: port.element(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> PortRef {
        self.source
    }

    pub fn layout(&self) -> &PortMemoryLayout {
        &self.layout
    }

    pub fn element(&self) -> ElementType {
        self.element
    }
}

/// Role a node plays at the edge of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Raw buffer bound by a map input.
    Input,
    /// Copy into a declared output.
    Output,
    /// Data pulled from a host callback.
    Source,
    /// Data pushed to a host callback.
    Sink,
}

/// Capability interface implemented by every node kind.
///
/// Nodes are immutable once added to a [`Model`]. Shape rules are enforced by each
/// node's constructor, so a node that exists is always well-shaped.
pub trait Node: fmt::Debug + Send + Sync + 'static {
    /// Stable identifier of the node kind, e.g. `BinaryOperationNode<float>`.
    fn type_name(&self) -> &'static str;

    fn inputs(&self) -> &[InputPort];

    fn outputs(&self) -> &[OutputPort];

    fn boundary(&self) -> Option<Boundary> {
        None
    }

    /// Value of a node whose output is fixed at construction.
    fn constant_value(&self) -> Option<&Tensor> {
        None
    }

    /// Whether the node can be emitted for `target`. Must not emit anything.
    fn is_compilable(&self, target: &Target) -> bool;

    /// Emits the node's computation into the routine under construction.
    fn compile(&self, cx: &mut NodeEmitContext<'_>) -> CompileResult<()>;

    /// Reference interpretation on logical host tensors, one per input port.
    fn evaluate(&self, inputs: &[&Tensor]) -> GraphResult<Vec<Tensor>>;

    /// Rebuilds this node (known as `id` in the transformer's source model) inside the
    /// transformer's destination model, rewiring inputs through the port map.
    fn copy(&self, id: NodeId, transformer: &mut ModelTransformer<'_>) -> GraphResult<()>;
}

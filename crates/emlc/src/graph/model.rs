use crate::graph::{Boundary, GraphError, GraphResult, Node, NodeId, OutputPort, PortRef};
use crate::layout::PortMemoryLayout;

/// Owns a set of nodes forming a directed acyclic graph.
///
/// Nodes can only reference outputs that are already present, so insertion order is a
/// valid dependency order and cycles cannot be expressed.
#[derive(Debug, Default)]
pub struct Model {
    nodes: Vec<Box<dyn Node>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node after checking that every input resolves to a live output whose
    /// layout matches the one the node was built against.
    pub fn add<N: Node>(&mut self, node: N) -> GraphResult<NodeId> {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, node: Box<dyn Node>) -> GraphResult<NodeId> {
        let id = NodeId(self.nodes.len());
        for input in node.inputs() {
            let source = self.output_port(input.source())?;
            if source.layout() != input.layout() {
                return Err(GraphError::InvalidPort {
                    port: input.source(),
                    reason: format!(
                        "input `{}` of {} expects layout {}, found {}",
                        input.name(),
                        node.type_name(),
                        input.layout(),
                        source.layout()
                    ),
                });
            }
            if source.element() != input.element() {
                return Err(GraphError::InvalidPort {
                    port: input.source(),
                    reason: format!("element type mismatch on input `{}`", input.name()),
                });
            }
        }
        self.nodes.push(node);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id.0).map(|node| node.as_ref())
    }

    pub fn get(&self, id: NodeId) -> GraphResult<&dyn Node> {
        self.node(id).ok_or(GraphError::DanglingReference {
            port: PortRef::new(id, 0),
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &dyn Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (NodeId(idx), node.as_ref()))
    }

    pub fn output_port(&self, port: PortRef) -> GraphResult<&OutputPort> {
        let node = self
            .node(port.node)
            .ok_or(GraphError::DanglingReference { port })?;
        node.outputs()
            .get(port.index)
            .ok_or_else(|| GraphError::InvalidPort {
                port,
                reason: format!(
                    "{} has {} output(s)",
                    node.type_name(),
                    node.outputs().len()
                ),
            })
    }

    pub fn port_layout(&self, port: PortRef) -> GraphResult<&PortMemoryLayout> {
        self.output_port(port).map(OutputPort::layout)
    }

    /// Consumers of `port` as `(node, input index)` pairs, in model order.
    pub fn consumers(&self, port: PortRef) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        for (id, node) in self.nodes() {
            for (idx, input) in node.inputs().iter().enumerate() {
                if input.source() == port {
                    out.push((id, idx));
                }
            }
        }
        out
    }

    pub fn nodes_with_boundary(&self, boundary: Boundary) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.boundary() == Some(boundary))
            .map(|(id, _)| id)
            .collect()
    }

    /// Every output port in model order.
    pub fn all_ports(&self) -> Vec<PortRef> {
        self.nodes()
            .flat_map(|(id, node)| (0..node.outputs().len()).map(move |idx| id.port(idx)))
            .collect()
    }
}

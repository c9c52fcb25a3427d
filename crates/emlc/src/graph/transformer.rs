use std::collections::HashMap;

use crate::graph::{GraphError, GraphResult, Model, Node, NodeId, PortRef};

/// Mapping from ports of a source model to ports of the model built from it.
pub type PortMap = HashMap<PortRef, PortRef>;

/// Outcome of rebuilding a model.
#[derive(Debug)]
pub struct Transformed {
    pub model: Model,
    pub ports: PortMap,
}

/// Builds a fresh model from an existing one. The source model is only borrowed, so a
/// failed rebuild leaves it untouched.
#[derive(Debug)]
pub struct ModelTransformer<'a> {
    source: &'a Model,
    target: Model,
    ports: PortMap,
}

impl<'a> ModelTransformer<'a> {
    pub fn new(source: &'a Model) -> Self {
        Self {
            source,
            target: Model::new(),
            ports: PortMap::new(),
        }
    }

    pub fn source(&self) -> &'a Model {
        self.source
    }

    /// The model under construction.
    pub fn model(&self) -> &Model {
        &self.target
    }

    /// Resolves a source port to its counterpart. Fails with `DanglingReference` when the
    /// producing node was dropped or not yet rebuilt.
    pub fn map_port(&self, port: PortRef) -> GraphResult<PortRef> {
        self.ports
            .get(&port)
            .copied()
            .ok_or(GraphError::DanglingReference { port })
    }

    pub fn is_mapped(&self, port: PortRef) -> bool {
        self.ports.contains_key(&port)
    }

    pub fn map_port_to(&mut self, old: PortRef, new: PortRef) {
        self.ports.insert(old, new);
    }

    /// Maps every output of `old` to the same-index output of `new`.
    pub fn map_outputs(&mut self, old: NodeId, new: NodeId) -> GraphResult<()> {
        let count = self.source.get(old)?.outputs().len();
        let available = self.target.get(new)?.outputs().len();
        if count != available {
            return Err(GraphError::InvalidPort {
                port: old.output(),
                reason: format!("replacement has {available} output(s), expected {count}"),
            });
        }
        for idx in 0..count {
            self.ports.insert(old.port(idx), new.port(idx));
        }
        Ok(())
    }

    pub fn add_node<N: Node>(&mut self, node: N) -> GraphResult<NodeId> {
        self.target.add(node)
    }

    /// Rebuilds source node `id` with `build`, which receives the destination model and
    /// the node's inputs already mapped into it.
    pub fn rebuild<N, F>(&mut self, id: NodeId, build: F) -> GraphResult<NodeId>
    where
        N: Node,
        F: FnOnce(&Model, &[PortRef]) -> GraphResult<N>,
    {
        let source = self.source;
        let inputs = source
            .get(id)?
            .inputs()
            .iter()
            .map(|input| self.map_port(input.source()))
            .collect::<GraphResult<Vec<_>>>()?;
        let node = build(&self.target, &inputs)?;
        let new_id = self.target.add(node)?;
        self.map_outputs(id, new_id)?;
        Ok(new_id)
    }

    /// Copies source node `id` unchanged through its own `copy` capability.
    pub fn copy_node(&mut self, id: NodeId) -> GraphResult<()> {
        let source = self.source;
        let node = source.get(id)?;
        node.copy(id, self)
    }

    pub fn finish(self) -> Transformed {
        Transformed {
            model: self.target,
            ports: self.ports,
        }
    }
}

//! A model bound to named inputs and outputs.

use std::collections::{HashMap, HashSet};

use crate::graph::{Boundary, GraphError, GraphResult, Model, NodeId, PortRef};
use crate::layout::PortMemoryLayout;
use crate::optimizer::{ModelOptimizer, OptimizeError};
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInput {
    pub name: String,
    /// An input node of the model.
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOutput {
    pub name: String,
    pub port: PortRef,
}

#[derive(Debug)]
pub struct Map {
    model: Model,
    inputs: Vec<MapInput>,
    outputs: Vec<MapOutput>,
}

impl Map {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn from_parts(model: Model, inputs: Vec<MapInput>, outputs: Vec<MapOutput>) -> Self {
        Self {
            model,
            inputs,
            outputs,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn inputs(&self) -> &[MapInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[MapOutput] {
        &self.outputs
    }

    pub fn add_input(&mut self, name: impl Into<String>, node: NodeId) -> GraphResult<()> {
        let name = name.into();
        if self.model.get(node)?.boundary() != Some(Boundary::Input) {
            return Err(GraphError::NotAnInput { node });
        }
        if self.inputs.iter().any(|input| input.name == name) {
            return Err(GraphError::DuplicateName(name));
        }
        if self.inputs.iter().any(|input| input.node == node) {
            return Err(GraphError::DuplicateName(format!("{name} ({node} already bound)")));
        }
        self.inputs.push(MapInput { name, node });
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, port: PortRef) -> GraphResult<()> {
        let name = name.into();
        self.model.output_port(port)?;
        if self.outputs.iter().any(|output| output.name == name) {
            return Err(GraphError::DuplicateName(name));
        }
        self.outputs.push(MapOutput { name, port });
        Ok(())
    }

    pub fn remove_inputs(&mut self) {
        self.inputs.clear();
    }

    /// Binds every input node not yet bound, in model order, as `input_<n>` where `n`
    /// continues the existing input count starting from 1.
    pub fn bind_unbound_inputs(&mut self) -> GraphResult<Vec<String>> {
        let bound: HashSet<NodeId> = self.inputs.iter().map(|input| input.node).collect();
        let mut added = Vec::new();
        for id in self.model.nodes_with_boundary(Boundary::Input) {
            if bound.contains(&id) {
                continue;
            }
            let name = format!("input_{}", self.inputs.len() + 1);
            self.add_input(name.clone(), id)?;
            added.push(name);
        }
        Ok(added)
    }

    /// Renames the bound inputs to `input_1`, `input_2`, ... in binding order.
    pub fn rename_inputs_by_position(&mut self) {
        for (idx, input) in self.inputs.iter_mut().enumerate() {
            input.name = format!("input_{}", idx + 1);
        }
    }

    pub fn input_layout(&self, index: usize) -> GraphResult<&PortMemoryLayout> {
        let input = self.inputs.get(index).ok_or_else(|| {
            GraphError::Evaluation(format!("map has no input {index}"))
        })?;
        self.model.port_layout(input.node.output())
    }

    pub fn output_layout(&self, index: usize) -> GraphResult<&PortMemoryLayout> {
        let output = self.outputs.get(index).ok_or_else(|| {
            GraphError::Evaluation(format!("map has no output {index}"))
        })?;
        self.model.port_layout(output.port)
    }

    /// Map over the same model exposing every output port as `<node>.<index>`.
    /// Consumes `self` because the model is moved, not copied.
    pub fn with_all_outputs(self) -> GraphResult<Map> {
        let mut probe = Map {
            outputs: Vec::new(),
            ..self
        };
        for port in probe.model.all_ports() {
            probe.add_output(port.to_string(), port)?;
        }
        Ok(probe)
    }

    /// Interprets the model directly and returns the declared outputs.
    pub fn compute(&self, inputs: &[Tensor]) -> GraphResult<Vec<Tensor>> {
        let values = self.compute_ports(inputs)?;
        self.outputs
            .iter()
            .map(|output| {
                values
                    .get(&output.port)
                    .cloned()
                    .ok_or(GraphError::DanglingReference { port: output.port })
            })
            .collect()
    }

    /// Interprets the model and returns the value of every output port.
    pub fn compute_ports(&self, inputs: &[Tensor]) -> GraphResult<HashMap<PortRef, Tensor>> {
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::Evaluation(format!(
                "expected {} input tensor(s), got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        let bound: HashMap<NodeId, usize> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(idx, input)| (input.node, idx))
            .collect();

        let mut values: HashMap<PortRef, Tensor> = HashMap::new();
        for id in crate::graph::topological_order(&self.model)? {
            let node = self.model.get(id)?;
            if node.boundary() == Some(Boundary::Source) {
                return Err(GraphError::UnboundSource { node: id });
            }
            let outputs = if node.boundary() == Some(Boundary::Input) {
                let idx = *bound.get(&id).ok_or(GraphError::UnboundInput { node: id })?;
                let expected = self.model.port_layout(id.output())?.size();
                if inputs[idx].shape() != expected {
                    return Err(GraphError::shape_mismatch(
                        format!("input `{}`", self.inputs[idx].name),
                        inputs[idx].shape(),
                        expected,
                    ));
                }
                vec![inputs[idx].clone()]
            } else {
                let args = node
                    .inputs()
                    .iter()
                    .map(|input| {
                        values
                            .get(&input.source())
                            .ok_or(GraphError::DanglingReference {
                                port: input.source(),
                            })
                    })
                    .collect::<GraphResult<Vec<_>>>()?;
                node.evaluate(&args)?
            };
            for (idx, value) in outputs.into_iter().enumerate() {
                values.insert(id.port(idx), value);
            }
        }
        Ok(values)
    }

    /// Runs `optimizer` over this map. On failure the untouched map is handed back
    /// inside the error.
    pub fn optimize(self, optimizer: &ModelOptimizer) -> Result<Map, OptimizeError> {
        optimizer.optimize(self)
    }
}

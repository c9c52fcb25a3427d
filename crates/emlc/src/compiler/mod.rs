//! Map compilation.
//!
//! [`MapCompiler::compile`] runs in four steps:
//! 1. every node must report itself compilable for the target, otherwise the call fails
//!    with [`CompileError::UnsupportedNode`] before anything is emitted;
//! 2. nodes are ordered topologically;
//! 3. each output port gets a buffer: bound inputs and constants map to read-only
//!    buffers, contiguous declared outputs are written in place, the rest is scratch;
//! 4. nodes emit their code in order, declared outputs that could not be written in
//!    place get a copy, and the routine is verified before the artifact is published.

mod artifact;
mod error;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::backend::{BufferKind, FunctionEmitter, Target};
use crate::codegen::{emit_copy, NodeEmitContext, PortBuffer};
use crate::graph::{topological_order, Boundary, GraphError, NodeId, PortRef};
use crate::layout::PortMemoryLayout;
use crate::map::Map;

pub use artifact::{ArtifactPort, CompiledMap};
pub use error::{CompileError, CompileResult};

const DEFAULT_FUNCTION_NAME: &str = "predict";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCompilerOptions {
    pub target: Target,
    /// Name of the emitted routine.
    pub function_name: String,
}

impl Default for MapCompilerOptions {
    fn default() -> Self {
        Self {
            target: Target::host(),
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
        }
    }
}

impl MapCompilerOptions {
    /// Defaults overridden by `EMLC_TARGET` and `EMLC_FUNCTION_NAME`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(target) =
            crate::env::string_var("EMLC_TARGET").and_then(|name| Target::from_name(&name))
        {
            options.target = target;
        }
        if let Some(name) = crate::env::string_var("EMLC_FUNCTION_NAME") {
            options.function_name = name;
        }
        options
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapCompiler {
    options: MapCompilerOptions,
}

impl MapCompiler {
    pub fn new(options: MapCompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MapCompilerOptions {
        &self.options
    }

    pub fn compile(&self, map: &Map) -> CompileResult<CompiledMap> {
        let target = &self.options.target;
        let _span = info_span!("compile", function = %self.options.function_name, machine = %target.name)
            .entered();
        let model = map.model();

        let mut unsupported: Vec<String> = Vec::new();
        for (_, node) in model.nodes() {
            if !node.is_compilable(target) && !unsupported.iter().any(|t| t == node.type_name()) {
                unsupported.push(node.type_name().to_string());
            }
        }
        if !unsupported.is_empty() {
            return Err(CompileError::UnsupportedNode {
                target: target.name.clone(),
                types: unsupported,
            });
        }

        let order = topological_order(model)?;
        let mut f = FunctionEmitter::new(self.options.function_name.clone());
        let mut ports: HashMap<PortRef, PortBuffer> = HashMap::new();

        let mut bound_inputs: HashMap<NodeId, usize> = HashMap::new();
        let mut input_ports = Vec::with_capacity(map.inputs().len());
        for (index, input) in map.inputs().iter().enumerate() {
            let port = input.node.output();
            let layout = model.port_layout(port)?.clone();
            let buffer = f.declare_buffer(
                BufferKind::Input { index },
                layout.memory_size(),
                input.name.clone(),
            );
            input_ports.push(ArtifactPort {
                name: input.name.clone(),
                shape: layout.size().to_vec(),
            });
            bound_inputs.insert(input.node, index);
            ports.insert(port, PortBuffer { buffer, layout });
        }

        // First declared output of a contiguous, node-produced port is written in place.
        let mut direct: HashMap<PortRef, usize> = HashMap::new();
        for (index, output) in map.outputs().iter().enumerate() {
            let node = model.get(output.port.node)?;
            let layout = model.port_layout(output.port)?;
            let read_only = matches!(node.boundary(), Some(Boundary::Input))
                || node.constant_value().is_some();
            if !read_only && layout.is_contiguous() && !direct.contains_key(&output.port) {
                direct.insert(output.port, index);
            }
        }

        for id in &order {
            let node = model.get(*id)?;
            if node.boundary() == Some(Boundary::Input) && !bound_inputs.contains_key(id) {
                return Err(GraphError::UnboundInput { node: *id }.into());
            }
            for (idx, port) in node.outputs().iter().enumerate() {
                let port_ref = id.port(idx);
                if ports.contains_key(&port_ref) {
                    continue;
                }
                let layout = port.layout().clone();
                let label = format!("{}_{}", port_label(node.type_name()), port_ref.node.0);
                let buffer = if let Some(value) = node.constant_value() {
                    let mut data = vec![0.0f32; layout.memory_size()];
                    value.write_to_layout(&layout, &mut data)?;
                    f.declare_buffer(
                        BufferKind::Constant(Arc::from(data)),
                        layout.memory_size(),
                        label,
                    )
                } else if let Some(&index) = direct.get(&port_ref) {
                    f.declare_buffer(
                        BufferKind::Output { index },
                        layout.memory_size(),
                        map.outputs()[index].name.clone(),
                    )
                } else {
                    f.declare_buffer(BufferKind::Scratch, layout.memory_size(), label)
                };
                ports.insert(port_ref, PortBuffer { buffer, layout });
            }
        }

        for id in &order {
            let node = model.get(*id)?;
            let inputs = node
                .inputs()
                .iter()
                .map(|input| lookup(&ports, input.source()))
                .collect::<CompileResult<Vec<_>>>()?;
            let outputs = (0..node.outputs().len())
                .map(|idx| lookup(&ports, id.port(idx)))
                .collect::<CompileResult<Vec<_>>>()?;
            debug!(node = %id, kind = node.type_name(), "emit");
            f.begin_section(format!("{id} {}", node.type_name()));
            let mut cx = NodeEmitContext::new(&mut f, target, *id, inputs, outputs);
            node.compile(&mut cx)?;
            f.end_section();
        }

        let mut output_ports = Vec::with_capacity(map.outputs().len());
        let mut copied: HashSet<usize> = HashSet::new();
        for (index, output) in map.outputs().iter().enumerate() {
            let source = lookup(&ports, output.port)?;
            output_ports.push(ArtifactPort {
                name: output.name.clone(),
                shape: source.layout.size().to_vec(),
            });
            if direct.get(&output.port) == Some(&index) {
                continue;
            }
            let layout = PortMemoryLayout::contiguous(source.layout.size().to_vec())?;
            let buffer = f.declare_buffer(
                BufferKind::Output { index },
                layout.memory_size(),
                output.name.clone(),
            );
            f.begin_section(format!("output {}", output.name));
            emit_copy(&mut f, &source, &PortBuffer { buffer, layout })?;
            f.end_section();
            copied.insert(index);
        }

        let routine = f.finish();
        routine.verify(target)?;
        info!(
            nodes = order.len(),
            buffers = routine.buffers().len(),
            output_copies = copied.len(),
            "compiled map"
        );
        Ok(CompiledMap::new(
            routine,
            input_ports,
            output_ports,
            target.name.clone(),
        ))
    }
}

fn lookup(ports: &HashMap<PortRef, PortBuffer>, port: PortRef) -> CompileResult<PortBuffer> {
    ports
        .get(&port)
        .cloned()
        .ok_or(CompileError::Graph(GraphError::DanglingReference { port }))
}

/// `BinaryOperationNode<float>` -> `binary_operation_node`
fn port_label(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let mut out = String::with_capacity(base.len() + 4);
    for (idx, ch) in base.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if idx > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

//! JSON model descriptions.
//!
//! A model file lists nodes in dependency order. Every node has a unique `id` that
//! later nodes use to name their inputs:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "kind": "source", "id": "in", "symbol": "read", "shape": [1, 4] },
//!     { "kind": "softmax", "id": "sm", "input": "in" },
//!     { "kind": "sink", "id": "out", "input": "sm", "symbol": "write" }
//!   ]
//! }
//! ```
//!
//! `inputs` and `outputs` are optional. Without `outputs`, every output and sink node
//! is exposed under its id.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use emlc::backend::{BinaryOp, UnaryOp};
use emlc::graph::Boundary;
use emlc::layout::PortMemoryLayout;
use emlc::nn::layers::{BiasLayer, LayerShape, SoftmaxLayer};
use emlc::nodes::{
    BiasLayerNode, BinaryOperationNode, ConstantNode, InputNode, OutputNode, SinkNode,
    SoftmaxLayerNode, SourceNode, UnaryOperationNode,
};
use emlc::{Map, Model, NodeId};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub inputs: Vec<BindingSpec>,
    #[serde(default)]
    pub outputs: Vec<BindingSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingSpec {
    pub name: String,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    Input {
        id: String,
        shape: Vec<usize>,
    },
    Source {
        id: String,
        symbol: String,
        shape: Vec<usize>,
    },
    Constant {
        id: String,
        shape: Vec<usize>,
        values: Vec<f32>,
        #[serde(default)]
        binary: bool,
    },
    Unary {
        id: String,
        op: UnaryOp,
        input: String,
    },
    Binary {
        id: String,
        op: BinaryOp,
        lhs: String,
        rhs: String,
    },
    Softmax {
        id: String,
        input: String,
        #[serde(default = "last_axis")]
        axis: isize,
        #[serde(default)]
        output_padding: Option<Vec<usize>>,
    },
    Bias {
        id: String,
        input: String,
        axis: isize,
        values: Vec<f32>,
        #[serde(default)]
        output_padding: Option<Vec<usize>>,
    },
    Output {
        id: String,
        input: String,
    },
    Sink {
        id: String,
        input: String,
        symbol: String,
    },
}

fn last_axis() -> isize {
    -1
}

impl NodeSpec {
    pub fn id(&self) -> &str {
        match self {
            NodeSpec::Input { id, .. }
            | NodeSpec::Source { id, .. }
            | NodeSpec::Constant { id, .. }
            | NodeSpec::Unary { id, .. }
            | NodeSpec::Binary { id, .. }
            | NodeSpec::Softmax { id, .. }
            | NodeSpec::Bias { id, .. }
            | NodeSpec::Output { id, .. }
            | NodeSpec::Sink { id, .. } => id,
        }
    }
}

pub fn load_map(path: &Path) -> Result<Map> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read model file {}", path.display()))?;
    parse_map(&text).with_context(|| format!("failed to load model file {}", path.display()))
}

pub fn parse_map(text: &str) -> Result<Map> {
    let file: ModelFile = serde_json::from_str(text).context("invalid model description")?;
    build_map(&file)
}

pub fn build_map(file: &ModelFile) -> Result<Map> {
    let mut model = Model::new();
    let mut ids: HashMap<&str, NodeId> = HashMap::new();

    for spec in &file.nodes {
        let lookup = |name: &str| -> Result<NodeId> {
            ids.get(name)
                .copied()
                .ok_or_else(|| anyhow!("node `{}` refers to unknown node `{name}`", spec.id()))
        };
        let id = match spec {
            NodeSpec::Input { shape, .. } => model.add(InputNode::new(shape.clone())?)?,
            NodeSpec::Source { symbol, shape, .. } => {
                model.add(SourceNode::new(symbol.clone(), shape.clone())?)?
            }
            NodeSpec::Constant {
                shape,
                values,
                binary,
                ..
            } => {
                let node = if *binary {
                    ConstantNode::binary(shape.clone(), values.clone())?
                } else {
                    ConstantNode::new(shape.clone(), values.clone())?
                };
                model.add(node)?
            }
            NodeSpec::Unary { op, input, .. } => {
                let node = UnaryOperationNode::new(&model, lookup(input)?.output(), *op)?;
                model.add(node)?
            }
            NodeSpec::Binary { op, lhs, rhs, .. } => {
                let node = BinaryOperationNode::new(
                    &model,
                    lookup(lhs)?.output(),
                    lookup(rhs)?.output(),
                    *op,
                )?;
                model.add(node)?
            }
            NodeSpec::Softmax {
                input,
                axis,
                output_padding,
                ..
            } => {
                let source = lookup(input)?.output();
                let shape = layer_shape(&model, source, output_padding.as_deref())?;
                let layer = SoftmaxLayer::with_axis(shape, *axis)?;
                model.add(SoftmaxLayerNode::new(&model, source, layer)?)?
            }
            NodeSpec::Bias {
                input,
                axis,
                values,
                output_padding,
                ..
            } => {
                let source = lookup(input)?.output();
                let shape = layer_shape(&model, source, output_padding.as_deref())?;
                let layer = BiasLayer::new(shape, *axis, values.clone())?;
                model.add(BiasLayerNode::new(&model, source, layer)?)?
            }
            NodeSpec::Output { input, .. } => {
                let node = OutputNode::new(&model, lookup(input)?.output())?;
                model.add(node)?
            }
            NodeSpec::Sink { input, symbol, .. } => {
                let node = SinkNode::new(&model, lookup(input)?.output(), symbol.clone())?;
                model.add(node)?
            }
        };
        if ids.insert(spec.id(), id).is_some() {
            bail!("duplicate node id `{}`", spec.id());
        }
    }

    let mut map = Map::new(model);
    for binding in &file.inputs {
        let node = *ids.get(binding.node.as_str()).ok_or_else(|| {
            anyhow!("input `{}` refers to unknown node `{}`", binding.name, binding.node)
        })?;
        map.add_input(binding.name.clone(), node)?;
    }
    if file.outputs.is_empty() {
        for spec in &file.nodes {
            let Some(&id) = ids.get(spec.id()) else {
                continue;
            };
            let boundary = map.model().get(id)?.boundary();
            if matches!(boundary, Some(Boundary::Output) | Some(Boundary::Sink)) {
                map.add_output(spec.id(), id.output())?;
            }
        }
    }
    for binding in &file.outputs {
        let node = *ids.get(binding.node.as_str()).ok_or_else(|| {
            anyhow!("output `{}` refers to unknown node `{}`", binding.name, binding.node)
        })?;
        map.add_output(binding.name.clone(), node.output())?;
    }
    Ok(map)
}

/// Layer shape taking its input layout from `source` and producing the same size,
/// optionally padded.
fn layer_shape(
    model: &Model,
    source: emlc::PortRef,
    padding: Option<&[usize]>,
) -> Result<LayerShape> {
    let input = model.port_layout(source)?.clone();
    let output = match padding {
        Some(padding) => PortMemoryLayout::padded(input.size().to_vec(), padding)?,
        None => PortMemoryLayout::contiguous(input.size().to_vec())?,
    };
    Ok(LayerShape::new(input, output))
}

//! Compiled-versus-interpreted comparison of every port of a map.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use emlc::graph::{Node, NodeId, PortRef};
use emlc::{Map, MapCompiler, MapCompilerOptions, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Outcome for one output port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortComparison {
    pub port: PortRef,
    pub node_type: String,
    pub shape: Vec<usize>,
    /// `None` when the compiled and interpreted shapes disagree.
    pub max_abs_diff: Option<f32>,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct ModelComparison {
    pub target: String,
    pub tolerance: f32,
    pub inputs: Vec<(String, Vec<usize>)>,
    pub ports: Vec<PortComparison>,
    nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone)]
struct GraphNode {
    id: NodeId,
    label: String,
    sources: Vec<NodeId>,
}

/// Deterministic inputs in `[0, 255]` for every bound input of `map`, drawn from a
/// generator seeded by `seed`.
pub fn random_inputs(map: &Map, seed: &str) -> Result<Vec<Tensor>> {
    let mut rng = StdRng::seed_from_u64(seed_from_str(seed));
    let mut tensors = Vec::with_capacity(map.inputs().len());
    for index in 0..map.inputs().len() {
        let shape = map.input_layout(index)?.size().to_vec();
        let len = shape.iter().product();
        let data = (0..len).map(|_| rng.gen_range(0.0f32..=255.0)).collect();
        tensors.push(Tensor::from_vec(shape, data)?);
    }
    Ok(tensors)
}

/// FNV-1a, so a seed string maps to the same generator on every platform.
pub fn seed_from_str(seed: &str) -> u64 {
    seed.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Compiles `map` with every port exposed, runs it on `inputs` and compares each port
/// against direct interpretation.
pub fn compare(
    map: Map,
    inputs: &[Tensor],
    options: &MapCompilerOptions,
    tolerance: f32,
) -> Result<ModelComparison> {
    let probe = map.with_all_outputs()?;
    let compiled = MapCompiler::new(options.clone())
        .compile(&probe)
        .context("compilation failed")?;
    info!(
        ports = probe.outputs().len(),
        sections = compiled.routine().sections().len(),
        "compiled probe map"
    );

    let reference = probe.compute_ports(inputs)?;
    let buffers: Vec<&[f32]> = inputs.iter().map(Tensor::data).collect();
    let results = compiled
        .compute(&buffers)
        .map_err(|err| anyhow!("compiled map failed: {err}"))?;

    let mut ports = Vec::with_capacity(results.len());
    for ((output, data), artifact) in probe.outputs().iter().zip(results).zip(compiled.outputs()) {
        let expected = reference
            .get(&output.port)
            .ok_or_else(|| anyhow!("no interpreted value for {}", output.port))?;
        let actual = Tensor::from_vec(artifact.shape.clone(), data)?;
        let max_abs_diff = actual.max_abs_diff(expected);
        let passed = max_abs_diff.is_some_and(|diff| diff <= tolerance);
        let node = probe.model().get(output.port.node)?;
        debug!(port = %output.port, kind = node.type_name(), ?max_abs_diff, passed, "compared port");
        ports.push(PortComparison {
            port: output.port,
            node_type: node.type_name().to_string(),
            shape: artifact.shape.clone(),
            max_abs_diff,
            passed,
        });
    }

    let nodes = probe
        .model()
        .nodes()
        .map(|(id, node)| GraphNode {
            id,
            label: format!("{id} {}", node.type_name()),
            sources: sources(node),
        })
        .collect();
    let inputs = probe
        .inputs()
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let shape = probe
                .input_layout(index)
                .map(|layout| layout.size().to_vec())
                .unwrap_or_default();
            (input.name.clone(), shape)
        })
        .collect();

    Ok(ModelComparison {
        target: compiled.target_name().to_string(),
        tolerance,
        inputs,
        ports,
        nodes,
    })
}

fn sources(node: &dyn Node) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = node.inputs().iter().map(|input| input.source().node).collect();
    out.dedup();
    out
}

impl ModelComparison {
    pub fn passed(&self) -> bool {
        self.ports.iter().all(|port| port.passed)
    }

    pub fn failures(&self) -> usize {
        self.ports.iter().filter(|port| !port.passed).count()
    }

    /// Worst difference per node and whether all of its ports passed.
    fn node_status(&self) -> HashMap<NodeId, (Option<f32>, bool)> {
        let mut status: HashMap<NodeId, (Option<f32>, bool)> = HashMap::new();
        for port in &self.ports {
            let entry = status.entry(port.port.node).or_insert((Some(0.0), true));
            entry.0 = match (entry.0, port.max_abs_diff) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
            entry.1 &= port.passed;
        }
        status
    }

    pub fn write_report(&self, out: &mut impl Write, model_path: &str, seed: &str) -> io::Result<()> {
        writeln!(out, "# Compiler debug report")?;
        writeln!(out)?;
        writeln!(out, "- model: `{model_path}`")?;
        writeln!(out, "- target: {}", self.target)?;
        writeln!(out, "- tolerance: {}", self.tolerance)?;
        writeln!(out, "- seed: `{seed}`")?;
        for (name, shape) in &self.inputs {
            writeln!(out, "- input `{name}`: {shape:?}")?;
        }
        writeln!(
            out,
            "- result: {} of {} ports match",
            self.ports.len() - self.failures(),
            self.ports.len()
        )?;
        writeln!(out)?;
        writeln!(out, "| port | node | shape | max abs diff | status |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for port in &self.ports {
            writeln!(
                out,
                "| {} | {} | {:?} | {} | {} |",
                port.port,
                port.node_type,
                port.shape,
                format_diff(port.max_abs_diff),
                if port.passed { "pass" } else { "FAIL" }
            )?;
        }
        Ok(())
    }

    /// Graphviz rendering with nodes filled by comparison status.
    pub fn save_dot(&self, out: &mut impl Write) -> io::Result<()> {
        let status = self.node_status();
        writeln!(out, "digraph model {{")?;
        writeln!(out, "  rankdir=TB;")?;
        writeln!(out, "  node [shape=box, style=filled];")?;
        for node in &self.nodes {
            let (diff, passed) = status.get(&node.id).copied().unwrap_or((None, true));
            let color = if passed { "palegreen" } else { "lightcoral" };
            let label = format!("{}\\nmax diff {}", node.label, format_diff(diff));
            writeln!(
                out,
                "  {} [label=\"{}\", fillcolor=\"{color}\"];",
                node.id,
                escape_dot(&label)
            )?;
        }
        for node in &self.nodes {
            for source in &node.sources {
                writeln!(out, "  {source} -> {};", node.id)?;
            }
        }
        writeln!(out, "}}")
    }

    /// Visual Studio DGML rendering; failing nodes are put in the `Fail` category.
    pub fn save_dgml(&self, out: &mut impl Write) -> io::Result<()> {
        let status = self.node_status();
        writeln!(out, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
        writeln!(
            out,
            r#"<DirectedGraph xmlns="http://schemas.microsoft.com/vs/2009/dgml">"#
        )?;
        writeln!(out, "  <Nodes>")?;
        for node in &self.nodes {
            let (diff, passed) = status.get(&node.id).copied().unwrap_or((None, true));
            let category = if passed { "Pass" } else { "Fail" };
            let label = format!("{} (max diff {})", node.label, format_diff(diff));
            writeln!(
                out,
                r#"    <Node Id="{}" Label="{}" Category="{category}" />"#,
                node.id,
                escape_xml(&label)
            )?;
        }
        writeln!(out, "  </Nodes>")?;
        writeln!(out, "  <Links>")?;
        for node in &self.nodes {
            for source in &node.sources {
                writeln!(out, r#"    <Link Source="{source}" Target="{}" />"#, node.id)?;
            }
        }
        writeln!(out, "  </Links>")?;
        writeln!(out, "  <Categories>")?;
        writeln!(out, r#"    <Category Id="Pass" Background="PaleGreen" />"#)?;
        writeln!(out, r#"    <Category Id="Fail" Background="LightCoral" />"#)?;
        writeln!(out, "  </Categories>")?;
        writeln!(out, "</DirectedGraph>")
    }

    /// One line per failing port, for the terminal.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} of {} ports match on target {}",
            self.ports.len() - self.failures(),
            self.ports.len(),
            self.target
        );
        for port in self.ports.iter().filter(|port| !port.passed) {
            let _ = write!(
                text,
                "\n  {} {}: max abs diff {}",
                port.port,
                port.node_type,
                format_diff(port.max_abs_diff)
            );
        }
        text
    }
}

fn format_diff(diff: Option<f32>) -> String {
    match diff {
        Some(diff) => format!("{diff:e}"),
        None => "shape mismatch".to_string(),
    }
}

fn escape_dot(text: &str) -> String {
    text.replace('"', "\\\"")
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, debug_span, info, warn};

use crate::compiler::MapCompilerOptions;
use crate::graph::{validate_model, Boundary, GraphError, Model, NodeId, PortRef};
use crate::map::{Map, MapInput, MapOutput};
use crate::optimizer::passes::{ConstantFoldingPass, DeadNodeEliminationPass};
use crate::optimizer::{ModelPass, PassContext, PassOutput, PassResult};

pub enum Step {
    Pass(Arc<dyn ModelPass>),
    FixedPoint { max_iters: usize, steps: Vec<Step> },
}

pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn pass(&mut self, pass: Arc<dyn ModelPass>) {
        self.steps.push(Step::Pass(pass));
    }

    pub fn fixed_point<F>(&mut self, max_iters: usize, build: F)
    where
        F: FnOnce(&mut PipelineBuilder),
    {
        let mut inner = PipelineBuilder::new();
        build(&mut inner);
        self.steps.push(Step::FixedPoint {
            max_iters: max_iters.max(1),
            steps: inner.steps,
        });
    }

    pub fn finish(self) -> Vec<Step> {
        self.steps
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A pass failed or produced an invalid model. Carries the map as it was before the
/// pipeline started.
#[derive(Debug, Error)]
#[error("pass `{pass}` rejected: {error}")]
pub struct OptimizeError {
    pub pass: &'static str,
    pub error: GraphError,
    map: Box<Map>,
}

impl OptimizeError {
    pub fn new(pass: &'static str, error: GraphError, map: Map) -> Self {
        Self {
            pass,
            error,
            map: Box::new(map),
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn into_map(self) -> Map {
        *self.map
    }
}

/// Runs passes in a fixed order, taking ownership of the map for the duration.
pub struct ModelOptimizer {
    steps: Vec<Step>,
    options: MapCompilerOptions,
    log_stats: bool,
}

struct State {
    model: Option<Model>,
    inputs: Vec<(String, NodeId)>,
    outputs: Vec<(String, PortRef)>,
}

impl ModelOptimizer {
    pub fn new(options: MapCompilerOptions) -> Self {
        Self::from_steps(options, Vec::new())
    }

    pub fn from_steps(options: MapCompilerOptions, steps: Vec<Step>) -> Self {
        Self {
            steps,
            options,
            log_stats: crate::env::pass_stats_enabled(),
        }
    }

    /// Constant folding and dead-node elimination to a bounded fixed point.
    pub fn default_pipeline(options: MapCompilerOptions) -> Self {
        let mut builder = PipelineBuilder::new();
        builder.fixed_point(crate::env::optimizer_max_iters(), |p| {
            p.pass(Arc::new(ConstantFoldingPass));
            p.pass(Arc::new(DeadNodeEliminationPass));
        });
        Self::from_steps(options, builder.finish())
    }

    pub fn with_pass(mut self, pass: impl ModelPass + 'static) -> Self {
        self.steps.push(Step::Pass(Arc::new(pass)));
        self
    }

    pub fn optimize(&self, map: Map) -> Result<Map, OptimizeError> {
        let mut state = State {
            model: None,
            inputs: map
                .inputs()
                .iter()
                .map(|input| (input.name.clone(), input.node))
                .collect(),
            outputs: map
                .outputs()
                .iter()
                .map(|output| (output.name.clone(), output.port))
                .collect(),
        };
        let mut totals = PassResult::default();
        if let Err((pass, error)) = self.run_steps(&self.steps, map.model(), &mut state, &mut totals)
        {
            warn!(pass, %error, "optimization aborted; map left unchanged");
            return Err(OptimizeError::new(pass, error, map));
        }
        debug!(
            changed = totals.changed,
            rewrites = totals.rewrites_applied,
            removed = totals.nodes_removed,
            "optimization finished"
        );

        let Some(model) = state.model else {
            return Ok(map);
        };
        let inputs = state
            .inputs
            .into_iter()
            .map(|(name, node)| MapInput { name, node })
            .collect();
        let outputs = state
            .outputs
            .into_iter()
            .map(|(name, port)| MapOutput { name, port })
            .collect();
        Ok(Map::from_parts(model, inputs, outputs))
    }

    fn run_steps(
        &self,
        steps: &[Step],
        original: &Model,
        state: &mut State,
        totals: &mut PassResult,
    ) -> Result<bool, (&'static str, GraphError)> {
        let mut changed_any = false;
        for step in steps {
            match step {
                Step::Pass(pass) => {
                    let stats = self
                        .run_pass(pass.as_ref(), original, state)
                        .map_err(|error| (pass.name(), error))?;
                    changed_any |= stats.changed;
                    *totals = totals.merge(stats);
                }
                Step::FixedPoint { max_iters, steps } => {
                    let mut iter = 0usize;
                    loop {
                        if iter >= *max_iters {
                            break;
                        }
                        iter += 1;
                        let changed = self.run_steps(steps, original, state, totals)?;
                        changed_any |= changed;
                        if !changed {
                            break;
                        }
                    }
                }
            }
        }
        Ok(changed_any)
    }

    fn run_pass(
        &self,
        pass: &dyn ModelPass,
        original: &Model,
        state: &mut State,
    ) -> Result<PassResult, GraphError> {
        let _span = debug_span!("pass", pass = pass.name()).entered();
        let current = state.model.as_ref().unwrap_or(original);
        let required_inputs: Vec<NodeId> = state.inputs.iter().map(|(_, node)| *node).collect();
        let required_outputs: Vec<PortRef> = state.outputs.iter().map(|(_, port)| *port).collect();
        let cx = PassContext {
            options: &self.options,
            required_outputs: &required_outputs,
            required_inputs: &required_inputs,
        };
        let output = pass.run(current, &cx)?;
        let (inputs, outputs) = check_pass_output(&output, state)?;
        let result = output.result;
        if self.log_stats {
            info!(
                pass = pass.name(),
                changed = result.changed,
                rewrites = result.rewrites_applied,
                removed = result.nodes_removed,
                nodes = output.model.len(),
                "optimizer pass stats"
            );
        } else {
            debug!(
                changed = result.changed,
                rewrites = result.rewrites_applied,
                removed = result.nodes_removed,
                nodes = output.model.len(),
                "pass finished"
            );
        }
        state.model = Some(output.model);
        state.inputs = inputs;
        state.outputs = outputs;
        Ok(result)
    }
}

type Bindings = (Vec<(String, NodeId)>, Vec<(String, PortRef)>);

/// Structural checks on a pass result and remapping of the declared inputs/outputs.
fn check_pass_output(output: &PassOutput, state: &State) -> Result<Bindings, GraphError> {
    validate_model(&output.model)?;

    let mut inputs = Vec::with_capacity(state.inputs.len());
    for (name, node) in &state.inputs {
        let unreachable = || GraphError::UnreachableInput { name: name.clone() };
        let mapped = output.ports.get(&node.output()).ok_or_else(unreachable)?;
        let is_input = output
            .model
            .node(mapped.node)
            .is_some_and(|n| n.boundary() == Some(Boundary::Input));
        if !is_input {
            return Err(unreachable());
        }
        inputs.push((name.clone(), mapped.node));
    }

    let mut outputs = Vec::with_capacity(state.outputs.len());
    for (name, port) in &state.outputs {
        let mapped = output
            .ports
            .get(port)
            .copied()
            .ok_or_else(|| GraphError::UnreachableOutput { name: name.clone() })?;
        output.model.output_port(mapped)?;
        outputs.push((name.clone(), mapped));
    }
    Ok((inputs, outputs))
}

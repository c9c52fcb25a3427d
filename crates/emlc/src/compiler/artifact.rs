use serde::{Deserialize, Serialize};

use crate::backend::{execute, CallbackHandler, ExecResult, NoCallbacks, Routine};

/// Named, fixed-shape buffer of the compiled artifact's external contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPort {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ArtifactPort {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compiled form of a map. Owns its verified routine and does not refer back to the
/// model it was built from.
///
/// Invocation allocates scratch memory per call, so a `CompiledMap` can be shared
/// across threads as long as each call has its own output buffers.
#[derive(Debug, Clone)]
pub struct CompiledMap {
    routine: Routine,
    inputs: Vec<ArtifactPort>,
    outputs: Vec<ArtifactPort>,
    target: String,
}

impl CompiledMap {
    pub(crate) fn new(
        routine: Routine,
        inputs: Vec<ArtifactPort>,
        outputs: Vec<ArtifactPort>,
        target: String,
    ) -> Self {
        Self {
            routine,
            inputs,
            outputs,
            target,
        }
    }

    pub fn name(&self) -> &str {
        self.routine.name()
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn inputs(&self) -> &[ArtifactPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ArtifactPort] {
        &self.outputs
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }

    /// Runs the artifact on row-major input buffers and returns freshly allocated
    /// row-major outputs.
    pub fn compute(&self, inputs: &[&[f32]]) -> ExecResult<Vec<Vec<f32>>> {
        let mut outputs: Vec<Vec<f32>> =
            self.outputs.iter().map(|port| vec![0.0; port.len()]).collect();
        {
            let mut views: Vec<&mut [f32]> =
                outputs.iter_mut().map(|out| out.as_mut_slice()).collect();
            self.compute_into(inputs, &mut views)?;
        }
        Ok(outputs)
    }

    pub fn compute_into(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> ExecResult<()> {
        self.compute_with_callbacks(inputs, outputs, &mut NoCallbacks)
    }

    pub fn compute_with_callbacks(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        callbacks: &mut dyn CallbackHandler,
    ) -> ExecResult<()> {
        execute(&self.routine, inputs, outputs, callbacks)
    }
}

use thiserror::Error;

use crate::backend::BackendError;
use crate::graph::GraphError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Nodes the target cannot run, by type name. Raised before anything is emitted.
    #[error("unsupported node(s) for target `{target}`: {}", types.join(", "))]
    UnsupportedNode { target: String, types: Vec<String> },
    #[error("compilation failed: {0}")]
    CompilationFailure(#[from] BackendError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CompileError {
    /// Emission-time failure that is not tied to a verifier diagnostic.
    pub fn failure(message: impl Into<String>) -> Self {
        CompileError::CompilationFailure(BackendError::new("<emit>", message))
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

use thiserror::Error;

use crate::graph::{NodeId, PortRef};

/// Structural errors raised while building, transforming or interpreting a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("shape mismatch in {context}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        context: String,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },
    #[error("dangling reference to {port}")]
    DanglingReference { port: PortRef },
    #[error("output `{name}` is no longer reachable")]
    UnreachableOutput { name: String },
    #[error("input `{name}` is no longer reachable")]
    UnreachableInput { name: String },
    #[error("invalid port {port}: {reason}")]
    InvalidPort { port: PortRef, reason: String },
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("invalid value {value} for {context}")]
    InvalidValue { context: String, value: f32 },
    #[error("input node {node} is not bound to a map input")]
    UnboundInput { node: NodeId },
    #[error("source node {node} needs a host callback to produce data")]
    UnboundSource { node: NodeId },
    #[error("duplicate name `{0}`")]
    DuplicateName(String),
    #[error("node {node} is not an input node")]
    NotAnInput { node: NodeId },
    #[error("node {node} references a later node; the graph is not in dependency order")]
    OutOfOrder { node: NodeId },
    #[error("{0}")]
    Evaluation(String),
}

impl GraphError {
    pub fn shape_mismatch(
        context: impl Into<String>,
        lhs: impl Into<Vec<usize>>,
        rhs: impl Into<Vec<usize>>,
    ) -> Self {
        GraphError::ShapeMismatch {
            context: context.into(),
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

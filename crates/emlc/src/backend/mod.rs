//! Imperative code-emission backend.
//!
//! Nodes describe their computation through [`FunctionEmitter`], which builds a small
//! loop-level IR ([`Routine`]). A routine is checked by [`verify_routine`] before it is
//! published and can then be run on the host by [`execute`] or rendered to source by a
//! separate code generator.

mod emitter;
mod exec;
pub mod ir;
mod target;
mod verify;

use thiserror::Error;

pub use emitter::FunctionEmitter;
pub use exec::{execute, CallbackHandler, ExecResult, ExecutionError, NoCallbacks};
pub use ir::{
    BinaryOp, BufferDecl, BufferId, BufferKind, CallbackKind, IndexExpr, LoopVar, Primitive,
    Routine, ScalarVar, Section, Stmt, UnaryOp, ValueExpr,
};
pub use target::Target;
pub use verify::verify_routine;

/// Rejection of an emitted routine by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("routine `{routine}`: {message}")]
pub struct BackendError {
    routine: String,
    message: String,
}

impl BackendError {
    pub fn new(routine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            routine: routine.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

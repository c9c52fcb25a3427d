//! Compiler for fixed-shape computation graphs.
//!
//! A [`Model`] is a graph of [`Node`]s connected through typed ports. A [`Map`] binds
//! some input nodes and output ports of a model to names, can be rewritten by the
//! [`optimizer`] and is lowered by [`MapCompiler`] into a [`CompiledMap`]: a verified
//! loop-level routine that runs on the host or is rendered to C by a separate crate.

pub mod backend;
pub mod codegen;
pub mod compiler;
mod env;
pub mod graph;
pub mod layout;
pub mod map;
pub mod nn;
pub mod nodes;
pub mod optimizer;
pub mod tensor;

pub use compiler::{CompileError, CompileResult, CompiledMap, MapCompiler, MapCompilerOptions};
pub use graph::{GraphError, GraphResult, Model, Node, NodeId, PortRef};
pub use layout::PortMemoryLayout;
pub use map::Map;
pub use optimizer::{ModelOptimizer, OptimizeError};
pub use tensor::Tensor;

mod constant_fold;
mod dead_nodes;
mod replace_source_sink;

pub use constant_fold::ConstantFoldingPass;
pub use dead_nodes::DeadNodeEliminationPass;
pub use replace_source_sink::ReplaceSourceAndSinkNodesPass;

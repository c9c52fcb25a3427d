//! Concrete node kinds.

mod binary;
mod bias;
mod constant;
mod io;
mod softmax;
mod source_sink;
mod unary;

pub use binary::BinaryOperationNode;
pub use bias::BiasLayerNode;
pub use constant::ConstantNode;
pub use io::{InputNode, OutputNode};
pub use softmax::SoftmaxLayerNode;
pub use source_sink::{SinkNode, SourceNode};
pub use unary::UnaryOperationNode;

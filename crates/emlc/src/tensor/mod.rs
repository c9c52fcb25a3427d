//! Host tensors used by reference interpretation, constants and tests.

mod host_tensor;

pub use host_tensor::Tensor;

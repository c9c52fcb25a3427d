//! Trained layers that can be wrapped as graph nodes.

pub mod layers;

//! Shared utilities for the engine
//!
//! Numeric kernels, the im2row transforms, activation functions and the
//! MNIST dataset readers used by the training binary.

pub mod activations;
pub mod im2rows;
pub mod kernels;
pub mod mnist;

pub use activations::Activation;
pub use im2rows::RowMatrix;

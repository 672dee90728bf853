//! Layer abstractions for the engine
//!
//! This module provides the [`Layer`] trait and the fixed set of layer kinds:
//! dense, direct-loop convolution, im2row convolution, max and average pooling,
//! and dropout.

mod r#trait;
pub mod conv2d;
pub mod conv2d_im2row;
pub mod dense;
pub mod dropout;
pub mod pooling;

// Re-export the Layer trait for convenience
pub use r#trait::{Layer, LayerKind};
pub use conv2d::Conv2DLayer;
pub use conv2d_im2row::Im2RowConv2DLayer;
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use pooling::{AvgPoolLayer, MaxPoolLayer};

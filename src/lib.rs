//! Rust CNN Engine Library
//!
//! Forward propagation, backpropagation and mini-batch SGD for small
//! feed-forward networks built from dense, convolutional, pooling and dropout
//! layers.
//!
//! # Modules
//!
//! - `tensor`: Shapes, owned tensors and borrowed views
//! - `utils`: Numeric kernels, im2row transforms, activations, MNIST reader
//! - `context`: Per-sample and per-batch mutable layer state
//! - `layers`: Layer trait and implementations (Dense, Conv2D, pooling, Dropout)
//! - `optimizers`: Optimizer trait and SGD with weight decay
//! - `network`: Layer stack, losses and the training loop
//! - `config`: Training configuration
//! - `architecture`: Architecture configuration and network building
//! - `model_io`: Saving and loading trained networks
//! - `eval`: Accuracy and confusion matrix
//! - `error`: Error type for the public entry points

pub mod architecture;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod layers;
pub mod model_io;
pub mod network;
pub mod optimizers;
pub mod tensor;
pub mod utils;

pub use error::{EngineError, Result};
pub use network::{LossKind, Network, NetworkContext, NetworkOptions};
pub use tensor::{Shape, Tensor, TensorView, TensorViewMut};

//! Error types for the training engine
//!
//! Boundary failures (bad configuration files, mismatched input sizes, corrupt
//! model records) are reported through [`EngineError`]. Inconsistent shapes below
//! the network boundary are programming errors and panic instead.

use thiserror::Error;

/// Errors surfaced by the engine's public entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("Invalid model record: {0}")]
    InvalidModel(String),

    #[error("Input size mismatch: expected {expected} values per sample, got {actual}")]
    InputSize { expected: usize, actual: usize },

    #[error("Sample count mismatch: {inputs} inputs but {targets} targets")]
    SampleCountMismatch { inputs: usize, targets: usize },

    #[error("Target size mismatch: network produces {expected} outputs, target has {actual}")]
    TargetSize { expected: usize, actual: usize },

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("MNIST file error: {0}")]
    Mnist(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

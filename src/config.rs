//! Training configuration
//!
//! Hyperparameters for [`Network::train`](crate::network::Network::train),
//! usually read from a JSON file.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings of one training run.
///
/// # Example
///
/// ```json
/// {
///   "epochs": 10,
///   "mini_batch_size": 32,
///   "learning_rate": 0.1,
///   "lambda": 5.0,
///   "shuffle": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,

    /// Samples summed before every optimizer step
    pub mini_batch_size: usize,

    pub learning_rate: f64,

    /// L2 weight decay strength, scaled by `learning_rate / training_count`
    #[serde(default)]
    pub lambda: f64,

    /// Shuffle sample order at the start of every epoch (default: true)
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_shuffle() -> bool {
    true
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { epochs: 10, mini_batch_size: 32, learning_rate: 0.1, lambda: 0.0, shuffle: true }
    }
}

impl TrainConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(EngineError::InvalidConfig("epochs must be greater than 0".into()));
        }
        if self.mini_batch_size == 0 {
            return Err(EngineError::InvalidConfig("mini_batch_size must be greater than 0".into()));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(EngineError::InvalidConfig("learning_rate must be a positive number".into()));
        }
        if !(self.lambda >= 0.0) || !self.lambda.is_finite() {
            return Err(EngineError::InvalidConfig("lambda must be non-negative".into()));
        }
        Ok(())
    }
}

/// Loads and validates a training configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn_engine::config::load_config;
///
/// let cfg = load_config("config/train_default.json").unwrap();
/// assert!(cfg.epochs > 0);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

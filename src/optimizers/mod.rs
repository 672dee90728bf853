//! Optimizer abstractions for parameter updates
//!
//! Layers hand the optimizer their parameter buffers together with the
//! gradients summed over a mini-batch. Averaging over the batch and weight
//! decay over the training set are the optimizer's business, which is why
//! both counts travel with every call.
//!
//! # Example
//!
//! ```ignore
//! use rust_cnn_engine::optimizers::{Optimizer, Sgd};
//!
//! let mut optimizer = Sgd::new(0.1, 0.0);
//! optimizer.update(&mut weights, &gradient_sum, training_count, batch_len);
//! optimizer.update_biases(&mut biases, &delta_sum, batch_len);
//! ```

pub mod sgd;

pub use sgd::Sgd;

/// In-place parameter update policy.
pub trait Optimizer {
    /// Updates `weights` from the gradient summed over `mini_batch_count`
    /// samples, out of `training_count` samples in the training set.
    ///
    /// # Panics
    ///
    /// Implementations panic if `weights` and `gradients` differ in length.
    fn update(
        &mut self,
        weights: &mut [f64],
        gradients: &[f64],
        training_count: usize,
        mini_batch_count: usize,
    );

    /// Updates `biases` from the delta summed over `mini_batch_count` samples.
    fn update_biases(&mut self, biases: &mut [f64], delta_sum: &[f64], mini_batch_count: usize);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

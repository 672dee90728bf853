//! Stochastic gradient descent with L2 weight decay
//!
//! Normal mode:
//!
//! `w = w * (1 - η·λ / trainingCount) - g · η / miniBatchCount`
//!
//! `b = b - Σδ · η / miniBatchCount`
//!
//! Debug mode drops decay and batch averaging (`w = w - η·g`) so hand-worked
//! examples can be reproduced exactly.

use crate::optimizers::Optimizer;

/// Stochastic gradient descent optimizer.
///
/// # Example
///
/// ```
/// use rust_cnn_engine::optimizers::{Optimizer, Sgd};
///
/// let mut optimizer = Sgd::new(0.1, 0.0);
/// let mut weights = vec![1.0, 2.0];
/// optimizer.update(&mut weights, &[0.2, 0.4], 100, 2);
/// assert!((weights[0] - 0.99).abs() < 1e-12);
/// assert!((weights[1] - 1.98).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
    lambda: f64,
    debug: bool,
}

impl Sgd {
    /// Creates an optimizer with learning rate `learning_rate` and weight
    /// decay coefficient `lambda`.
    pub fn new(learning_rate: f64, lambda: f64) -> Self {
        Self { learning_rate, lambda, debug: false }
    }

    /// Switches to the plain `w -= η·g` rule.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

impl Optimizer for Sgd {
    fn update(
        &mut self,
        weights: &mut [f64],
        gradients: &[f64],
        training_count: usize,
        mini_batch_count: usize,
    ) {
        assert_eq!(
            weights.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.debug {
            for (w, g) in weights.iter_mut().zip(gradients) {
                *w -= self.learning_rate * g;
            }
            return;
        }

        let decay = 1.0 - self.learning_rate * self.lambda / training_count.max(1) as f64;
        let step = self.learning_rate / mini_batch_count.max(1) as f64;
        for (w, g) in weights.iter_mut().zip(gradients) {
            *w = *w * decay - g * step;
        }
    }

    fn update_biases(&mut self, biases: &mut [f64], delta_sum: &[f64], mini_batch_count: usize) {
        assert_eq!(biases.len(), delta_sum.len(), "Biases and delta must have the same length");

        let step = self.learning_rate / mini_batch_count.max(1) as f64;
        for (b, d) in biases.iter_mut().zip(delta_sum) {
            *b -= d * step;
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_averages_over_batch() {
        let mut optimizer = Sgd::new(0.5, 0.0);
        let mut params = vec![1.0, 1.0];
        optimizer.update(&mut params, &[4.0, -4.0], 10, 4);
        assert!((params[0] - 0.5).abs() < 1e-12);
        assert!((params[1] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_weight_decay_uses_training_count() {
        let mut optimizer = Sgd::new(0.1, 5.0);
        let mut params = vec![2.0];
        optimizer.update(&mut params, &[0.0], 10, 1);
        // 2 * (1 - 0.1 * 5 / 10)
        assert!((params[0] - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_debug_mode_ignores_decay_and_batch() {
        let mut optimizer = Sgd::new(0.5, 5.0).with_debug(true);
        let mut params = vec![1.0];
        optimizer.update(&mut params, &[0.2], 10, 4);
        assert!((params[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_biases_have_no_decay() {
        let mut optimizer = Sgd::new(0.1, 100.0);
        let mut biases = vec![1.0, 0.0];
        optimizer.update_biases(&mut biases, &[2.0, -2.0], 2);
        assert!((biases[0] - 0.9).abs() < 1e-12);
        assert!((biases[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_learning_rate_update() {
        let mut optimizer = Sgd::new(0.1, 0.0);
        optimizer.set_learning_rate(0.01);
        assert_eq!(optimizer.learning_rate(), 0.01);
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same length")]
    fn test_mismatched_lengths() {
        let mut optimizer = Sgd::new(0.01, 0.0);
        let mut params = vec![1.0, 2.0];
        optimizer.update(&mut params, &[0.1, 0.2, 0.3], 1, 1);
    }
}

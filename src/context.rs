//! Per-layer mutable state
//!
//! Layer parameters live in the layer objects and are only touched by the
//! optimizer. Everything that changes per sample lives here instead, so one
//! network can drive any number of independent contexts:
//!
//! - [`LayerContext`]: output, propagated delta, per-sample gradients and
//!   layer-specific scratch buffers for one layer.
//! - [`BackwardContext`]: delta plus gradients. Each layer context owns one for
//!   the current sample; the network keeps a second one per layer that sums
//!   those over a mini-batch.

use crate::tensor::{Shape, Tensor};
use crate::utils::kernels::add_assign;
use crate::utils::RowMatrix;
use rand::rngs::StdRng;

/// Delta and parameter gradients of one layer.
#[derive(Debug, Clone)]
pub struct BackwardContext {
    /// Derivative of the loss with respect to the layer's output.
    pub delta: Tensor,
    /// One flat buffer per trainable parameter tensor, shaped like it.
    pub gradients: Vec<Vec<f64>>,
}

impl Default for BackwardContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BackwardContext {
    pub fn new() -> Self {
        Self { delta: Tensor::zeros(Shape::d1(0)), gradients: Vec::new() }
    }

    /// Zeroes the delta and every gradient buffer, keeping their shapes.
    pub fn clear(&mut self) {
        self.delta.fill(0.0);
        for g in &mut self.gradients {
            g.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Adds another context's delta and gradients into this one.
    ///
    /// Buffers are adopted from `other` the first time their shape is seen, so
    /// a freshly created batch context needs no sizing up front.
    pub fn accumulate(&mut self, other: &BackwardContext) {
        if self.delta.shape() != other.delta.shape() {
            self.delta.reset(other.delta.shape());
        }
        add_assign(self.delta.data_mut(), other.delta.data());

        if self.gradients.len() != other.gradients.len() {
            self.gradients = other.gradients.iter().map(|g| vec![0.0; g.len()]).collect();
        }
        for (mine, theirs) in self.gradients.iter_mut().zip(&other.gradients) {
            if mine.len() != theirs.len() {
                *mine = vec![0.0; theirs.len()];
            }
            add_assign(mine, theirs);
        }
    }
}

/// Scratch buffers owned by a layer context, one variant per layer kind that
/// needs them.
#[derive(Debug)]
pub enum Scratch {
    None,
    Dense {
        outer: Vec<f64>,
    },
    Conv {
        padded_delta: Tensor,
        rot180: Tensor,
    },
    ConvRows {
        padded_delta: Tensor,
        input_rows: RowMatrix,
        delta_rows: RowMatrix,
        gradient_delta_rows: RowMatrix,
        gradient_input_rows: RowMatrix,
        gradient: Vec<f64>,
    },
    MaxPool {
        /// Flat input offset of the selected element for every output element.
        argmax: Vec<usize>,
    },
    Dropout {
        /// `true` where the element was dropped.
        mask: Vec<bool>,
        rng: StdRng,
    },
}

/// Mutable state for one layer during forward and backward passes.
#[derive(Debug)]
pub struct LayerContext {
    pub output: Tensor,
    pub backward: BackwardContext,
    pub scratch: Scratch,
}

impl LayerContext {
    pub fn new(scratch: Scratch) -> Self {
        Self {
            output: Tensor::zeros(Shape::d1(0)),
            backward: BackwardContext::new(),
            scratch,
        }
    }

    /// Context with one zeroed gradient buffer per parameter tensor.
    pub fn with_gradients(scratch: Scratch, sizes: &[usize]) -> Self {
        let mut ctx = Self::new(scratch);
        ctx.backward.gradients = sizes.iter().map(|&n| vec![0.0; n]).collect();
        ctx
    }

    pub fn delta(&self) -> &Tensor {
        &self.backward.delta
    }

    pub fn delta_mut(&mut self) -> &mut Tensor {
        &mut self.backward.delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(delta: Vec<f64>, grad: Vec<f64>) -> BackwardContext {
        let n = delta.len();
        BackwardContext { delta: Tensor::from_vec(delta, Shape::d2(1, n)), gradients: vec![grad] }
    }

    #[test]
    fn test_accumulate_sums_without_averaging() {
        let mut batch = BackwardContext::new();
        batch.accumulate(&sample(vec![1.0, 2.0], vec![0.5, 0.5, 0.5]));
        batch.accumulate(&sample(vec![3.0, 4.0], vec![1.0, 2.0, 3.0]));
        assert_eq!(batch.delta.data(), &[4.0, 6.0]);
        assert_eq!(batch.gradients[0], vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_clear_keeps_shapes() {
        let mut batch = sample(vec![1.0, 2.0], vec![3.0]);
        batch.clear();
        assert_eq!(batch.delta.shape(), Shape::d2(1, 2));
        assert_eq!(batch.delta.data(), &[0.0, 0.0]);
        assert_eq!(batch.gradients[0], vec![0.0]);
    }
}

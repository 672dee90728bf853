//! Layer trait definition
//!
//! A layer owns its parameters and geometry. Everything that changes from one
//! sample to the next lives in a [`LayerContext`] created by the layer itself,
//! so the same layer can serve any number of contexts.
//!
//! Call order for one training sample:
//!
//! 1. [`Layer::forward`] on every layer, first to last
//! 2. the network seeds the last context's delta from the loss gradient
//! 3. [`Layer::backward`] on every layer, last to first
//! 4. [`Layer::collect_gradients`] on every layer
//!
//! and once per mini-batch, [`Layer::apply_gradients`] with the summed batch
//! context.

use crate::context::{BackwardContext, LayerContext};
use crate::model_io::LayerRecord;
use crate::optimizers::Optimizer;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::Activation;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of layer kinds the engine knows how to build and persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Dense,
    Conv2d,
    Conv2dIm2row,
    MaxPool,
    AvgPool,
    Dropout,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Dense => "Dense",
            LayerKind::Conv2d => "Conv2D",
            LayerKind::Conv2dIm2row => "Conv2D(im2row)",
            LayerKind::MaxPool => "MaxPool",
            LayerKind::AvgPool => "AvgPool",
            LayerKind::Dropout => "Dropout",
        };
        write!(f, "{}", name)
    }
}

/// Core trait for network layers.
///
/// Inputs always carry a leading batch axis followed by the layer's
/// [`base_in_dims`](Layer::base_in_dims); outputs carry the batch axis followed
/// by [`base_out_dims`](Layer::base_out_dims).
///
/// # Example
///
/// ```ignore
/// let mut ctx = layer.create_ctx(&mut rng);
/// layer.forward(input.view(), &mut ctx);
/// ctx.delta_mut().data_mut().copy_from_slice(&upstream);
/// layer.backward(input.view(), &mut ctx, Some(&mut in_delta));
/// layer.collect_gradients(input.view(), &mut ctx);
/// ```
pub trait Layer {
    fn kind(&self) -> LayerKind;

    /// Per-sample input shape.
    fn base_in_dims(&self) -> Shape;

    /// Per-sample output shape.
    fn base_out_dims(&self) -> Shape;

    fn activation(&self) -> Option<Activation>;

    fn set_activation(&mut self, activation: Option<Activation>);

    /// Switches between training and inference behavior. Only dropout cares.
    fn set_training(&mut self, _training: bool) {}

    /// Debug mode: dense layers neither add nor update biases.
    fn set_debug(&mut self, _debug: bool) {}

    /// Allocates a context with the scratch this layer kind needs. `rng` seeds
    /// any per-context randomness.
    fn create_ctx(&self, rng: &mut StdRng) -> LayerContext;

    /// Computes the raw (pre-activation) output into `ctx.output`.
    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext);

    /// Writes the derivative of the loss with respect to `input` into
    /// `in_delta`, reshaped to the input's shape, from `ctx.backward.delta`.
    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor);

    /// Overwrites `ctx.backward.gradients` with the gradient of the current
    /// call, summed over the rows of `input`.
    fn collect_gradients(&self, _input: TensorView<'_>, _ctx: &mut LayerContext) {}

    /// Applies a mini-batch worth of summed gradients through `optimizer`.
    fn apply_gradients(
        &mut self,
        _batch: &BackwardContext,
        _optimizer: &mut dyn Optimizer,
        _training_count: usize,
        _mini_batch_count: usize,
    ) {
    }

    /// Number of trainable values.
    fn parameter_count(&self) -> usize {
        0
    }

    /// Parameter summary for [`describe`](Layer::describe). Buffers are
    /// included when `detail` is set.
    fn describe_params(&self, detail: bool) -> String;

    /// Shapes and buffers for persistence.
    fn record(&self) -> LayerRecord;

    fn input_size(&self) -> usize {
        self.base_in_dims().flatten_size()
    }

    fn output_size(&self) -> usize {
        self.base_out_dims().flatten_size()
    }

    /// `calc_output`, then the activation in place, then a zeroed delta shaped
    /// like the output.
    fn forward(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        self.calc_output(input, ctx);

        if let Some(act) = self.activation() {
            let row_len = sample_len(&ctx.output);
            act.activate(ctx.output.data_mut(), row_len);
        }

        ctx.backward.delta.reset(ctx.output.shape());
    }

    /// Chain rule through the activation, then backpropagation into
    /// `in_delta` when the caller wants it.
    fn backward(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: Option<&mut Tensor>) {
        if let Some(act) = self.activation() {
            let row_len = sample_len(&ctx.output);
            act.derivate(ctx.output.data(), ctx.backward.delta.data_mut(), row_len);
        }

        if let Some(in_delta) = in_delta {
            self.backpropagate(input, ctx, in_delta);
        }
    }

    /// One-line summary plus parameter details, used for logging.
    fn describe(&self, detail: bool) -> String {
        let mut out = format!(
            "Type = {}; Activation = {}; BaseInDims = {}; BaseOutDims = {};",
            self.kind(),
            self.activation().map_or_else(|| "none".to_string(), |a| a.to_string()),
            self.base_in_dims(),
            self.base_out_dims()
        );
        let params = self.describe_params(detail);
        if !params.is_empty() {
            out.push('\n');
            out.push_str(&params);
        }
        out
    }
}

/// Values per sample of a batched tensor.
pub(crate) fn sample_len(t: &Tensor) -> usize {
    let n = t.dim(0).max(1);
    t.len() / n
}

/// Formats up to `limit` values of a buffer for [`Layer::describe_params`].
pub(crate) fn preview(values: &[f64], limit: usize) -> String {
    let mut s = values
        .iter()
        .take(limit)
        .map(|v| format!("{:.8}", v))
        .collect::<Vec<_>>()
        .join(", ");
    if values.len() > limit {
        s.push_str(", ...");
    }
    s
}

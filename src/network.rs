//! Network assembly and the mini-batch training loop
//!
//! A [`Network`] owns an ordered stack of layers. A [`NetworkContext`] holds
//! one [`LayerContext`] per layer for the current sample plus one batch
//! [`BackwardContext`] per layer that sums deltas and gradients until the
//! optimizer consumes them.
//!
//! Layer `i` reads the output of layer `i - 1` through a view reshaped to its
//! own input dims, so a dense layer can follow a convolution without an
//! explicit flatten step.

use crate::config::TrainConfig;
use crate::context::{BackwardContext, LayerContext};
use crate::error::{EngineError, Result};
use crate::layers::Layer;
use crate::optimizers::{Optimizer, Sgd};
use crate::tensor::{Shape, Tensor, TensorView};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Loss attached to the network output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Seeds `2 (output - target)`, reports `Σ (target - output)²`.
    #[default]
    MeanSquaredError,
    /// Seeds `output - target`, reports `-Σ target · ln(output)`. Meant to
    /// follow a softmax output layer.
    CrossEntropy,
}

impl LossKind {
    /// Writes the derivative of the loss with respect to the output.
    pub fn seed_delta(&self, output: &[f64], target: &[f64], delta: &mut [f64]) {
        assert_eq!(output.len(), target.len(), "Output and target must have the same length");
        assert_eq!(output.len(), delta.len(), "Output and delta must have the same length");
        let factor = match self {
            LossKind::MeanSquaredError => 2.0,
            LossKind::CrossEntropy => 1.0,
        };
        for ((d, o), t) in delta.iter_mut().zip(output).zip(target) {
            *d = factor * (o - t);
        }
    }

    /// Loss value of one sample.
    pub fn compute(&self, output: &[f64], target: &[f64]) -> f64 {
        match self {
            LossKind::MeanSquaredError => {
                output.iter().zip(target).map(|(o, t)| (t - o) * (t - o)).sum()
            }
            LossKind::CrossEntropy => -output.iter().zip(target).map(|(o, t)| t * o.ln()).sum::<f64>(),
        }
    }
}

/// Construction-time settings of a network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkOptions {
    pub loss: LossKind,
    /// Seed for initialization, shuffling and dropout masks.
    pub seed: u64,
    /// Dense layers skip biases and SGD applies `w -= lr·g` unaveraged.
    pub debug: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self { loss: LossKind::MeanSquaredError, seed: 42, debug: false }
    }
}

/// Per-run mutable state for every layer of a network.
#[derive(Debug)]
pub struct NetworkContext {
    input: Tensor,
    layers: Vec<LayerContext>,
    batch: Vec<BackwardContext>,
}

impl NetworkContext {
    pub fn layer_ctx(&self, index: usize) -> &LayerContext {
        &self.layers[index]
    }

    pub fn batch_ctx(&self, index: usize) -> &BackwardContext {
        &self.batch[index]
    }

    /// Output of the last layer for the most recent forward pass.
    ///
    /// # Panics
    ///
    /// Panics if the network has no layers.
    pub fn output(&self) -> &Tensor {
        match self.layers.last() {
            Some(ctx) => &ctx.output,
            None => panic!("Network has no layers"),
        }
    }

    /// Zeroes every batch accumulator.
    pub fn clear_batch(&mut self) {
        for b in &mut self.batch {
            b.clear();
        }
    }

    /// Adds the current sample's deltas and gradients to the batch.
    pub fn add_to_batch(&mut self) {
        for (b, l) in self.batch.iter_mut().zip(&self.layers) {
            b.accumulate(&l.backward);
        }
    }
}

/// Ordered stack of layers plus the options that drive training.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    options: NetworkOptions,
    rng: StdRng,
    training: bool,
    on_epoch_end: Option<Box<dyn FnMut(usize, f64)>>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("layers", &self.layers.iter().map(|l| l.kind()).collect::<Vec<_>>())
            .field("options", &self.options)
            .field("training", &self.training)
            .finish_non_exhaustive()
    }
}

impl Network {
    pub fn new(options: NetworkOptions) -> Self {
        Self {
            layers: Vec::new(),
            options,
            rng: StdRng::seed_from_u64(options.seed),
            training: false,
            on_epoch_end: None,
        }
    }

    /// Generator used for initialization, shuffling and context seeds.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn loss(&self) -> LossKind {
        self.options.loss
    }

    pub fn set_loss(&mut self, loss: LossKind) {
        self.options.loss = loss;
    }

    pub fn is_debug(&self) -> bool {
        self.options.debug
    }

    /// Appends a layer.
    ///
    /// # Panics
    ///
    /// Panics if the layer's input size differs from the previous layer's
    /// output size.
    pub fn add_layer<L: Layer + 'static>(&mut self, layer: L) {
        self.add_boxed_layer(Box::new(layer));
    }

    pub fn add_boxed_layer(&mut self, mut layer: Box<dyn Layer>) {
        if let Some(prev) = self.layers.last() {
            assert_eq!(
                prev.output_size(),
                layer.input_size(),
                "Layer connection mismatch: previous output {} vs input {}",
                prev.base_out_dims(),
                layer.base_in_dims()
            );
        }
        layer.set_debug(self.options.debug);
        layer.set_training(self.training);
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output_size())
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    /// Registers a callback invoked with `(epoch, mean loss)` after every epoch.
    pub fn set_on_epoch_end<F>(&mut self, callback: F)
    where
        F: FnMut(usize, f64) + 'static,
    {
        self.on_epoch_end = Some(Box::new(callback));
    }

    /// Multi-line description of every layer.
    pub fn describe(&self, detail: bool) -> String {
        let mut out = format!("Network: LayerCount = {}; Loss = {:?};", self.layers.len(), self.options.loss);
        for (i, layer) in self.layers.iter().enumerate() {
            out.push_str(&format!("\nLayer#{}: {}", i, layer.describe(detail)));
        }
        out
    }

    /// Builds fresh contexts drawing per-context seeds from the network's
    /// generator.
    pub fn init_ctx(&mut self) -> NetworkContext {
        create_contexts(&self.layers, &mut self.rng)
    }

    /// Loads one or more concatenated samples as the context's input.
    pub fn set_input(&self, ctx: &mut NetworkContext, data: &[f64]) -> Result<()> {
        let first = self.layers.first().ok_or_else(|| EngineError::InvalidArchitecture("network has no layers".into()))?;
        let in_size = first.input_size();
        if data.is_empty() || data.len() % in_size != 0 {
            warn!(expected = in_size, actual = data.len(), "rejecting input of wrong size");
            return Err(EngineError::InputSize { expected: in_size, actual: data.len() });
        }
        let shape = first.base_in_dims().with_batch(data.len() / in_size);
        ctx.input.reset(shape);
        ctx.input.data_mut().copy_from_slice(data);
        Ok(())
    }

    /// Runs every layer on the context's current input.
    pub fn forward_ctx(&self, ctx: &mut NetworkContext) {
        for (i, layer) in self.layers.iter().enumerate() {
            let (prev, rest) = ctx.layers.split_at_mut(i);
            let input = layer_input(layer.as_ref(), &ctx.input, prev);
            layer.forward(input, &mut rest[0]);
        }
    }

    /// Seeds the last delta from `target` and backpropagates through every
    /// layer.
    pub fn backward_ctx(&self, ctx: &mut NetworkContext, target: &[f64]) {
        let Some(last) = ctx.layers.last_mut() else {
            return;
        };
        self.options.loss.seed_delta(last.output.data(), target, last.backward.delta.data_mut());

        for i in (0..self.layers.len()).rev() {
            let layer = self.layers[i].as_ref();
            let (prev, rest) = ctx.layers.split_at_mut(i);
            let cur = &mut rest[0];
            match prev.last_mut() {
                None => {
                    let input = layer_input(layer, &ctx.input, &[]);
                    layer.backward(input, cur, None);
                }
                Some(p) => {
                    let out_shape = p.output.shape();
                    let n = p.output.len() / layer.input_size();
                    let input = p.output.view().reshaped(layer.base_in_dims().with_batch(n));
                    layer.backward(input, cur, Some(&mut p.backward.delta));
                    p.backward.delta.reshape(out_shape);
                }
            }
        }
    }

    /// Per-sample gradient collection for every layer.
    pub fn collect(&self, ctx: &mut NetworkContext) {
        for (i, layer) in self.layers.iter().enumerate() {
            let (prev, rest) = ctx.layers.split_at_mut(i);
            let input = layer_input(layer.as_ref(), &ctx.input, prev);
            layer.collect_gradients(input, &mut rest[0]);
        }
    }

    /// Inference on a single sample.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        let in_size = self.input_size();
        if input.len() != in_size {
            warn!(expected = in_size, actual = input.len(), "rejecting input of wrong size");
            return Err(EngineError::InputSize { expected: in_size, actual: input.len() });
        }
        let mut ctx = create_contexts(&self.layers, &mut StdRng::seed_from_u64(self.options.seed));
        self.set_input(&mut ctx, input)?;
        self.forward_ctx(&mut ctx);
        Ok(ctx.output().data().to_vec())
    }

    /// Inference on a batch of samples in one pass.
    pub fn forward_batch(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let in_size = self.input_size();
        if let Some(bad) = inputs.iter().find(|x| x.len() != in_size) {
            return Err(EngineError::InputSize { expected: in_size, actual: bad.len() });
        }
        let flat: Vec<f64> = inputs.iter().flatten().copied().collect();

        let mut ctx = create_contexts(&self.layers, &mut StdRng::seed_from_u64(self.options.seed));
        self.set_input(&mut ctx, &flat)?;
        self.forward_ctx(&mut ctx);

        let out_size = self.output_size();
        Ok(ctx.output().data().chunks_exact(out_size).map(|c| c.to_vec()).collect())
    }

    /// Forward, backward, collect and accumulate for every sample in `chunk`.
    /// Returns the summed loss. The batch accumulators are not cleared here.
    pub fn train_mini_batch(
        &self,
        ctx: &mut NetworkContext,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        chunk: &[usize],
    ) -> Result<f64> {
        let mut total = 0.0;
        for &idx in chunk {
            self.set_input(ctx, &inputs[idx])?;
            self.forward_ctx(ctx);
            self.backward_ctx(ctx, &targets[idx]);
            self.collect(ctx);
            ctx.add_to_batch();

            let loss = self.options.loss.compute(ctx.output().data(), &targets[idx]);
            total += loss;
            if self.options.debug {
                debug!(sample = idx, loss, total, "trained sample");
            }
        }
        Ok(total)
    }

    /// Hands every layer its batch accumulator.
    pub fn apply(
        &mut self,
        ctx: &NetworkContext,
        optimizer: &mut dyn Optimizer,
        training_count: usize,
        mini_batch_count: usize,
    ) {
        for (layer, batch) in self.layers.iter_mut().zip(&ctx.batch) {
            layer.apply_gradients(batch, optimizer, training_count, mini_batch_count);
        }
    }

    /// Trains with SGD built from `config`. Returns the mean loss per epoch.
    pub fn train(&mut self, inputs: &[Vec<f64>], targets: &[Vec<f64>], config: &TrainConfig) -> Result<Vec<f64>> {
        let mut optimizer = Sgd::new(config.learning_rate, config.lambda).with_debug(self.options.debug);
        self.train_with(inputs, targets, config, &mut optimizer)
    }

    /// Trains with any optimizer. `config.learning_rate` and `config.lambda`
    /// are ignored in favor of the optimizer's own settings.
    pub fn train_with(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        config: &TrainConfig,
        optimizer: &mut dyn Optimizer,
    ) -> Result<Vec<f64>> {
        config.validate()?;
        self.check_dataset(inputs, targets)?;

        let count = inputs.len();
        let batch_size = config.mini_batch_size.max(1);
        info!(samples = count, epochs = config.epochs, batch_size, "start training");

        self.set_training(true);
        let mut ctx = create_contexts(&self.layers, &mut self.rng);
        let mut indices: Vec<usize> = (0..count).collect();
        let mut losses = Vec::with_capacity(config.epochs);
        let progress_every = (count / batch_size / 10).max(1);

        for epoch in 0..config.epochs {
            let started = Instant::now();
            indices.sort_unstable();
            if config.shuffle {
                indices.shuffle(&mut self.rng);
            }

            let mut total = 0.0;
            let mut seen = 0;
            for (b, chunk) in indices.chunks(batch_size).enumerate() {
                ctx.clear_batch();
                total += match self.train_mini_batch(&mut ctx, inputs, targets, chunk) {
                    Ok(loss) => loss,
                    Err(e) => {
                        self.set_training(false);
                        return Err(e);
                    }
                };
                self.apply(&ctx, optimizer, count, chunk.len());

                seen += chunk.len();
                if b % progress_every == 0 {
                    debug!(epoch, seen, loss = total / seen as f64, "mini-batch progress");
                }
            }

            let mean = total / count as f64;
            losses.push(mean);
            info!(
                epoch,
                lr = optimizer.learning_rate(),
                loss = mean,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "epoch finished"
            );
            if self.options.debug {
                debug!("{}", self.describe(true));
            }
            if let Some(callback) = self.on_epoch_end.as_mut() {
                callback(epoch, mean);
            }
        }

        self.set_training(false);
        Ok(losses)
    }

    fn check_dataset(&self, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<()> {
        if inputs.len() != targets.len() {
            return Err(EngineError::SampleCountMismatch { inputs: inputs.len(), targets: targets.len() });
        }
        if inputs.is_empty() || self.layers.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        let (in_size, out_size) = (self.input_size(), self.output_size());
        if let Some(bad) = inputs.iter().find(|x| x.len() != in_size) {
            warn!(expected = in_size, actual = bad.len(), "rejecting training input of wrong size");
            return Err(EngineError::InputSize { expected: in_size, actual: bad.len() });
        }
        if let Some(bad) = targets.iter().find(|t| t.len() != out_size) {
            return Err(EngineError::TargetSize { expected: out_size, actual: bad.len() });
        }
        Ok(())
    }
}

fn create_contexts(layers: &[Box<dyn Layer>], rng: &mut StdRng) -> NetworkContext {
    NetworkContext {
        input: Tensor::zeros(Shape::d1(0)),
        layers: layers.iter().map(|l| l.create_ctx(rng)).collect(),
        batch: layers.iter().map(|_| BackwardContext::new()).collect(),
    }
}

/// View of the input of a layer: the network input for the first layer,
/// otherwise the previous layer's output, reshaped to `[N] + base_in_dims`.
fn layer_input<'a>(layer: &dyn Layer, input: &'a Tensor, prev: &'a [LayerContext]) -> TensorView<'a> {
    let source = match prev.last() {
        Some(p) => &p.output,
        None => input,
    };
    let n = source.len() / layer.input_size();
    source.view().reshaped(layer.base_in_dims().with_batch(n))
}

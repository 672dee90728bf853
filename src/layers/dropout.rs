//! Dropout layer implementation for regularization
//!
//! During training each element is dropped (set to zero) with probability
//! `drop_rate` and survivors are scaled by `1 / (1 - drop_rate)`. The drop mask
//! is kept in the layer context so the backward pass zeroes exactly the same
//! positions. In inference mode the layer is the identity.

use crate::context::{LayerContext, Scratch};
use crate::layers::r#trait::{Layer, LayerKind};
use crate::model_io::LayerRecord;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::Activation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Inverted dropout.
///
/// # Fields
///
/// * `in_dims` - Per-sample shape; dropout never changes it
/// * `drop_rate` - Probability of dropping each element, in `[0, 1)`
/// * `training` - Whether masks are drawn (`true`) or inputs pass through
///
/// # Example
///
/// ```ignore
/// let mut layer = DropoutLayer::new(Shape::d1(512), 0.5);
/// layer.set_training(true);
/// assert_eq!(layer.input_size(), 512);
/// assert_eq!(layer.parameter_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    in_dims: Shape,
    drop_rate: f64,
    training: bool,
    activation: Option<Activation>,
}

impl DropoutLayer {
    /// Creates a dropout layer in inference mode.
    ///
    /// # Panics
    ///
    /// Panics if `drop_rate` is outside `[0, 1)`.
    pub fn new(in_dims: Shape, drop_rate: f64) -> Self {
        assert!((0.0..1.0).contains(&drop_rate), "drop_rate must be in range [0.0, 1.0)");
        Self { in_dims, drop_rate, training: false, activation: None }
    }

    pub fn drop_rate(&self) -> f64 {
        self.drop_rate
    }

    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Layer for DropoutLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
    }

    fn base_in_dims(&self) -> Shape {
        self.in_dims
    }

    fn base_out_dims(&self) -> Shape {
        self.in_dims
    }

    fn activation(&self) -> Option<Activation> {
        self.activation
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.activation = activation;
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn create_ctx(&self, rng: &mut StdRng) -> LayerContext {
        LayerContext::new(Scratch::Dropout {
            mask: Vec::new(),
            rng: StdRng::seed_from_u64(rng.gen()),
        })
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let Scratch::Dropout { mask, rng } = &mut ctx.scratch else {
            panic!("Dropout layer given a context of another kind");
        };
        ctx.output.reset(input.shape());
        mask.clear();
        mask.resize(input.len(), false);

        let output = ctx.output.data_mut();
        if !self.training {
            output.copy_from_slice(input.data());
            return;
        }

        let keep_scale = 1.0 / (1.0 - self.drop_rate);
        for ((o, &x), dropped) in output.iter_mut().zip(input.data()).zip(mask.iter_mut()) {
            if rng.gen::<f64>() < self.drop_rate {
                *dropped = true;
                *o = 0.0;
            } else {
                *o = x * keep_scale;
            }
        }
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let Scratch::Dropout { mask, .. } = &ctx.scratch else {
            panic!("Dropout layer given a context of another kind");
        };
        in_delta.reset(input.shape());
        let delta = ctx.backward.delta.data();
        for ((out, &d), &dropped) in in_delta.data_mut().iter_mut().zip(delta).zip(mask) {
            *out = if dropped { 0.0 } else { d };
        }
    }

    fn describe_params(&self, _detail: bool) -> String {
        format!("DropRate = {}", self.drop_rate)
    }

    fn record(&self) -> LayerRecord {
        LayerRecord {
            kind: LayerKind::Dropout,
            input_dims: self.in_dims.dims().to_vec(),
            activation: self.activation,
            weight_dims: Vec::new(),
            weights: Vec::new(),
            biases: Vec::new(),
            pool_size: None,
            drop_rate: Some(self.drop_rate),
        }
    }
}

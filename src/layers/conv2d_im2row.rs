//! 2D convolution as row-matrix products
//!
//! Same parameters and results as [`Conv2DLayer`], but each sample is handled
//! with one [`rows_product`] per pass:
//!
//! - forward: filter rows `(F × C·k·k)` against input patch rows
//!   `(oh·ow × C·k·k)`
//! - backward: rotated filter rows `(C × F·k·k)` against patch rows of the
//!   zero-padded delta `(H·W × F·k·k)`
//! - gradients: delta rows `(F × oh·ow)` against input tap rows
//!   `(C·k·k × oh·ow)`
//!
//! The filter row matrices are rebuilt whenever the filters change.

use crate::context::{BackwardContext, LayerContext, Scratch};
use crate::layers::conv2d::{pad_delta, Conv2DLayer};
use crate::layers::r#trait::{Layer, LayerKind};
use crate::model_io::LayerRecord;
use crate::optimizers::Optimizer;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::im2rows::{
    deltas_to_rows, filters_to_rows, input_to_rows, input_to_rows_for_gradients,
    rot180_filters_to_rows,
};
use crate::utils::kernels::{add_assign, rows_product, RowBias};
use crate::utils::{Activation, RowMatrix};
use rand::rngs::StdRng;

/// Convolution layer computing through im2row matrices.
#[derive(Debug, Clone)]
pub struct Im2RowConv2DLayer {
    conv: Conv2DLayer,
    filter_rows: RowMatrix,
    rot180_rows: RowMatrix,
}

impl Im2RowConv2DLayer {
    pub fn new(in_dims: Shape, filter_count: usize, filter_size: usize, rng: &mut StdRng) -> Self {
        Self::from_conv(Conv2DLayer::new(in_dims, filter_count, filter_size, rng))
    }

    pub fn with_filters(in_dims: Shape, filters: Tensor, biases: Vec<f64>) -> Self {
        Self::from_conv(Conv2DLayer::with_filters(in_dims, filters, biases))
    }

    /// Wraps an existing direct-loop layer, taking over its parameters.
    pub fn from_conv(conv: Conv2DLayer) -> Self {
        let mut layer = Self { conv, filter_rows: RowMatrix::new(), rot180_rows: RowMatrix::new() };
        layer.update_filter_rows();
        layer
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.conv.set_activation(Some(activation));
        self
    }

    pub fn filters(&self) -> &Tensor {
        self.conv.filters()
    }

    pub fn biases(&self) -> &[f64] {
        self.conv.biases()
    }

    /// Rebuilds the forward and rotated filter row matrices.
    pub fn update_filter_rows(&mut self) {
        filters_to_rows(self.conv.filters().view(), &mut self.filter_rows);
        rot180_filters_to_rows(self.conv.filters().view(), &mut self.rot180_rows);
    }
}

impl Layer for Im2RowConv2DLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2dIm2row
    }

    fn base_in_dims(&self) -> Shape {
        self.conv.base_in_dims()
    }

    fn base_out_dims(&self) -> Shape {
        self.conv.out_dims()
    }

    fn activation(&self) -> Option<Activation> {
        self.conv.activation()
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.conv.set_activation(activation);
    }

    fn create_ctx(&self, _rng: &mut StdRng) -> LayerContext {
        LayerContext::with_gradients(
            Scratch::ConvRows {
                padded_delta: Tensor::zeros(Shape::d1(0)),
                input_rows: RowMatrix::new(),
                delta_rows: RowMatrix::new(),
                gradient_delta_rows: RowMatrix::new(),
                gradient_input_rows: RowMatrix::new(),
                gradient: vec![0.0; self.conv.filters().len()],
            },
            &[self.conv.filters().len()],
        )
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let Scratch::ConvRows { input_rows, .. } = &mut ctx.scratch else {
            panic!("Im2row Conv2D layer given a context of another kind");
        };
        assert_eq!(input.shape().rank(), 4, "Conv2D input must be (batch, channels, height, width)");
        let n = input.dim(0);
        let out = self.conv.out_dims();
        let plane = out.dim(1) * out.dim(2);
        let k = self.conv.filter_size();

        ctx.output.reset(out.with_batch(n));
        for (s, out_sample) in ctx.output.data_mut().chunks_exact_mut(out.flatten_size()).enumerate() {
            input_to_rows(input, s, (k, k), input_rows);
            rows_product(
                self.filter_rows.data(),
                self.filter_rows.rows(),
                input_rows.data(),
                plane,
                RowBias::PerRowOfA(self.conv.biases()),
                out_sample,
            );
        }
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let Scratch::ConvRows { padded_delta, delta_rows, .. } = &mut ctx.scratch else {
            panic!("Im2row Conv2D layer given a context of another kind");
        };
        let k = self.conv.filter_size();
        pad_delta(ctx.backward.delta.view(), k, padded_delta);

        let s = input.shape();
        let (c, plane) = (s.dim(1), s.dim(2) * s.dim(3));
        in_delta.reset(s);

        for (n, in_sample) in in_delta.data_mut().chunks_exact_mut(c * plane).enumerate() {
            input_to_rows(padded_delta.view(), n, (k, k), delta_rows);
            rows_product(
                self.rot180_rows.data(),
                self.rot180_rows.rows(),
                delta_rows.data(),
                plane,
                RowBias::None,
                in_sample,
            );
        }
    }

    fn collect_gradients(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let Scratch::ConvRows { gradient_delta_rows, gradient_input_rows, gradient: sample_gradient, .. } =
            &mut ctx.scratch
        else {
            panic!("Im2row Conv2D layer given a context of another kind");
        };
        let delta = ctx.backward.delta.view();
        let gradient = &mut ctx.backward.gradients[0];
        gradient.iter_mut().for_each(|g| *g = 0.0);

        let (n, f, oh, ow) = (delta.dim(0), delta.dim(1), delta.dim(2), delta.dim(3));
        for s in 0..n {
            deltas_to_rows(delta, s, gradient_delta_rows);
            input_to_rows_for_gradients(input, s, (oh, ow), gradient_input_rows);
            rows_product(
                gradient_delta_rows.data(),
                f,
                gradient_input_rows.data(),
                gradient_input_rows.rows(),
                RowBias::None,
                sample_gradient,
            );
            add_assign(gradient, sample_gradient);
        }
    }

    fn apply_gradients(
        &mut self,
        batch: &BackwardContext,
        optimizer: &mut dyn Optimizer,
        training_count: usize,
        mini_batch_count: usize,
    ) {
        self.conv.apply_to_params(batch, optimizer, training_count, mini_batch_count);
        self.update_filter_rows();
    }

    fn parameter_count(&self) -> usize {
        self.conv.parameter_count()
    }

    fn describe_params(&self, detail: bool) -> String {
        self.conv.describe_filters(detail)
    }

    fn record(&self) -> LayerRecord {
        self.conv.record_as(LayerKind::Conv2dIm2row)
    }
}

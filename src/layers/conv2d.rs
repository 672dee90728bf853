//! 2D convolutional layer, direct loops
//!
//! Valid-only cross-correlation with stride 1: a `C × H × W` input and `F`
//! filters of size `k × k` give an `F × (H-k+1) × (W-k+1)` output. This is the
//! reference implementation; [`Im2RowConv2DLayer`] computes the same thing
//! through row-matrix products.
//!
//! [`Im2RowConv2DLayer`]: crate::layers::Im2RowConv2DLayer

use crate::context::{BackwardContext, LayerContext, Scratch};
use crate::layers::r#trait::{preview, Layer, LayerKind};
use crate::model_io::LayerRecord;
use crate::optimizers::Optimizer;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::im2rows::rot180_filters;
use crate::utils::Activation;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// 2D convolutional layer with learnable filters.
///
/// # Fields
///
/// * `in_dims` - Per-sample input shape `(channels, height, width)`
/// * `filters` - Filter tensor `(filter_count, channels, k, k)`
/// * `biases` - One bias per filter
///
/// # Example
///
/// ```ignore
/// let mut rng = StdRng::seed_from_u64(42);
/// // 1 input channel, 28x28 input, 8 filters of 5x5
/// let layer = Conv2DLayer::new(Shape::d3(1, 28, 28), 8, 5, &mut rng);
/// assert_eq!(layer.base_out_dims(), Shape::d3(8, 24, 24));
/// ```
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    in_dims: Shape,
    filters: Tensor,
    biases: Vec<f64>,
    activation: Option<Activation>,
}

impl Conv2DLayer {
    /// Creates a layer with filters and biases drawn from a standard normal
    /// distribution.
    ///
    /// # Panics
    ///
    /// Panics if `in_dims` is not rank 3 or the filter does not fit the input.
    pub fn new(in_dims: Shape, filter_count: usize, filter_size: usize, rng: &mut StdRng) -> Self {
        assert_eq!(in_dims.rank(), 3, "Conv2D input dims must be (channels, height, width)");
        let shape = Shape::d4(filter_count, in_dims.dim(0), filter_size, filter_size);
        let filters = (0..shape.flatten_size()).map(|_| rng.sample(StandardNormal)).collect();
        let biases = (0..filter_count).map(|_| rng.sample(StandardNormal)).collect();

        Self::with_filters(in_dims, Tensor::from_vec(filters, shape), biases)
    }

    /// Creates a layer from an explicit `(F, C, k, k)` filter tensor.
    ///
    /// # Panics
    ///
    /// Panics if shapes are inconsistent or the filter is not square.
    pub fn with_filters(in_dims: Shape, filters: Tensor, biases: Vec<f64>) -> Self {
        assert_eq!(in_dims.rank(), 3, "Conv2D input dims must be (channels, height, width)");
        let fs = filters.shape();
        assert_eq!(fs.rank(), 4, "Conv2D filters must be (filters, channels, k, k)");
        assert_eq!(fs.dim(1), in_dims.dim(0), "Filter channels must match input channels");
        assert_eq!(fs.dim(0), biases.len(), "One bias per filter is required");
        assert_eq!(fs.dim(2), fs.dim(3), "Conv2D filters must be square, got {}x{}", fs.dim(2), fs.dim(3));
        assert!(
            fs.dim(2) <= in_dims.dim(1) && fs.dim(3) <= in_dims.dim(2),
            "Filter {}x{} does not fit input {}",
            fs.dim(2),
            fs.dim(3),
            in_dims
        );
        Self { in_dims, filters, biases, activation: None }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn filters(&self) -> &Tensor {
        &self.filters
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    pub fn filter_count(&self) -> usize {
        self.filters.dim(0)
    }

    pub fn filter_size(&self) -> usize {
        self.filters.dim(2)
    }

    pub(crate) fn out_dims(&self) -> Shape {
        Shape::d3(
            self.filter_count(),
            self.in_dims.dim(1) - self.filters.dim(2) + 1,
            self.in_dims.dim(2) - self.filters.dim(3) + 1,
        )
    }

    /// Filter and bias updates shared with the im2row variant.
    pub(crate) fn apply_to_params(
        &mut self,
        batch: &BackwardContext,
        optimizer: &mut dyn Optimizer,
        training_count: usize,
        mini_batch_count: usize,
    ) {
        optimizer.update(
            self.filters.data_mut(),
            &batch.gradients[0],
            training_count,
            mini_batch_count,
        );

        let bias_delta = bias_delta_per_filter(&batch.delta, self.filter_count());
        optimizer.update_biases(&mut self.biases, &bias_delta, mini_batch_count);
    }

    pub(crate) fn describe_filters(&self, detail: bool) -> String {
        let mut out = format!("FilterDims = {}", self.filters.shape());
        if detail {
            out.push_str(&format!("\n\tFilters = [{}]", preview(self.filters.data(), 20)));
            out.push_str(&format!("\n\tBiases = [{}]", preview(&self.biases, 20)));
        }
        out
    }

    pub(crate) fn record_as(&self, kind: LayerKind) -> LayerRecord {
        LayerRecord {
            kind,
            input_dims: self.in_dims.dims().to_vec(),
            activation: self.activation,
            weight_dims: self.filters.shape().dims().to_vec(),
            weights: self.filters.data().to_vec(),
            biases: self.biases.clone(),
            pool_size: None,
            drop_rate: None,
        }
    }
}

/// Copies a `(N, F, oh, ow)` delta into the centre of a zeroed
/// `(N, F, oh + 2(k-1), ow + 2(k-1))` buffer.
pub(crate) fn pad_delta(delta: TensorView<'_>, k: usize, dest: &mut Tensor) {
    let d = delta.shape();
    let (n, f, oh, ow) = (d.dim(0), d.dim(1), d.dim(2), d.dim(3));
    dest.reset(Shape::d4(n, f, oh + 2 * (k - 1), ow + 2 * (k - 1)));
    for s in 0..n {
        for fi in 0..f {
            for x in 0..oh {
                for y in 0..ow {
                    dest[[s, fi, x + k - 1, y + k - 1]] = delta[[s, fi, x, y]];
                }
            }
        }
    }
}

/// Sums a `(N, F, oh, ow)` delta over everything but the filter axis.
pub(crate) fn bias_delta_per_filter(delta: &Tensor, filter_count: usize) -> Vec<f64> {
    let mut out = vec![0.0; filter_count];
    if delta.is_empty() {
        return out;
    }
    let plane = delta.len() / (delta.dim(0) * filter_count);
    for (i, chunk) in delta.data().chunks_exact(plane).enumerate() {
        out[i % filter_count] += chunk.iter().sum::<f64>();
    }
    out
}

impl Layer for Conv2DLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2d
    }

    fn base_in_dims(&self) -> Shape {
        self.in_dims
    }

    fn base_out_dims(&self) -> Shape {
        self.out_dims()
    }

    fn activation(&self) -> Option<Activation> {
        self.activation
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.activation = activation;
    }

    fn create_ctx(&self, _rng: &mut StdRng) -> LayerContext {
        LayerContext::with_gradients(
            Scratch::Conv {
                padded_delta: Tensor::zeros(Shape::d1(0)),
                rot180: Tensor::zeros(self.filters.shape()),
            },
            &[self.filters.len()],
        )
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        assert_eq!(input.shape().rank(), 4, "Conv2D input must be (batch, channels, height, width)");
        let n = input.dim(0);
        let out = self.out_dims();
        let (f, oh, ow) = (out.dim(0), out.dim(1), out.dim(2));
        let (c, kh, kw) = (self.filters.dim(1), self.filters.dim(2), self.filters.dim(3));

        ctx.output.reset(out.with_batch(n));
        for s in 0..n {
            for fi in 0..f {
                for x in 0..oh {
                    for y in 0..ow {
                        let mut total = 0.0;
                        for ci in 0..c {
                            for i in 0..kh {
                                for j in 0..kw {
                                    total += input[[s, ci, x + i, y + j]] * self.filters[[fi, ci, i, j]];
                                }
                            }
                        }
                        ctx.output[[s, fi, x, y]] = total + self.biases[fi];
                    }
                }
            }
        }
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let Scratch::Conv { padded_delta, rot180 } = &mut ctx.scratch else {
            panic!("Conv2D layer given a context of another kind");
        };
        let k = self.filter_size();
        pad_delta(ctx.backward.delta.view(), k, padded_delta);
        rot180_filters(self.filters.view(), rot180);

        let s = input.shape();
        let (n, c, h, w) = (s.dim(0), s.dim(1), s.dim(2), s.dim(3));
        let f = self.filter_count();
        in_delta.reset(s);

        for si in 0..n {
            for ci in 0..c {
                for x in 0..h {
                    for y in 0..w {
                        let mut total = 0.0;
                        for fi in 0..f {
                            for i in 0..k {
                                for j in 0..k {
                                    total += padded_delta[[si, fi, x + i, y + j]] * rot180[[fi, ci, i, j]];
                                }
                            }
                        }
                        in_delta[[si, ci, x, y]] = total;
                    }
                }
            }
        }
    }

    fn collect_gradients(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let delta = ctx.backward.delta.view();
        let gradient = &mut ctx.backward.gradients[0];
        gradient.iter_mut().for_each(|g| *g = 0.0);

        let fs = self.filters.shape();
        let (f, c, kh, kw) = (fs.dim(0), fs.dim(1), fs.dim(2), fs.dim(3));
        let (n, oh, ow) = (delta.dim(0), delta.dim(2), delta.dim(3));

        for s in 0..n {
            for fi in 0..f {
                for ci in 0..c {
                    for x in 0..kh {
                        for y in 0..kw {
                            let mut total = 0.0;
                            for i in 0..oh {
                                for j in 0..ow {
                                    total += input[[s, ci, x + i, y + j]] * delta[[s, fi, i, j]];
                                }
                            }
                            gradient[fs.offset([fi, ci, x, y])] += total;
                        }
                    }
                }
            }
        }
    }

    fn apply_gradients(
        &mut self,
        batch: &BackwardContext,
        optimizer: &mut dyn Optimizer,
        training_count: usize,
        mini_batch_count: usize,
    ) {
        self.apply_to_params(batch, optimizer, training_count, mini_batch_count);
    }

    fn parameter_count(&self) -> usize {
        self.filters.len() + self.biases.len()
    }

    fn describe_params(&self, detail: bool) -> String {
        self.describe_filters(detail)
    }

    fn record(&self) -> LayerRecord {
        self.record_as(LayerKind::Conv2d)
    }
}

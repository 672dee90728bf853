//! Max and average pooling over non-overlapping square windows
//!
//! A `C × H × W` input pooled with window `p` gives `C × H/p × W/p`. Trailing
//! rows and columns that do not fill a window are ignored and receive a zero
//! delta.

use crate::context::{LayerContext, Scratch};
use crate::layers::r#trait::{Layer, LayerKind};
use crate::model_io::LayerRecord;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::Activation;
use rand::rngs::StdRng;

fn pooled_dims(in_dims: Shape, pool_size: usize) -> Shape {
    assert_eq!(in_dims.rank(), 3, "Pooling input dims must be (channels, height, width)");
    assert!(pool_size > 0, "Pool size must be greater than 0");
    Shape::d3(in_dims.dim(0), in_dims.dim(1) / pool_size, in_dims.dim(2) / pool_size)
}

fn pool_record(kind: LayerKind, in_dims: Shape, pool_size: usize, act: Option<Activation>) -> LayerRecord {
    LayerRecord {
        kind,
        input_dims: in_dims.dims().to_vec(),
        activation: act,
        weight_dims: Vec::new(),
        weights: Vec::new(),
        biases: Vec::new(),
        pool_size: Some(pool_size),
        drop_rate: None,
    }
}

/// Max pooling. The delta of each window goes to the first maximal element in
/// scan order, recorded during the forward pass.
#[derive(Debug, Clone)]
pub struct MaxPoolLayer {
    in_dims: Shape,
    pool_size: usize,
    activation: Option<Activation>,
}

impl MaxPoolLayer {
    pub fn new(in_dims: Shape, pool_size: usize) -> Self {
        pooled_dims(in_dims, pool_size);
        Self { in_dims, pool_size, activation: None }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Layer for MaxPoolLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPool
    }

    fn base_in_dims(&self) -> Shape {
        self.in_dims
    }

    fn base_out_dims(&self) -> Shape {
        pooled_dims(self.in_dims, self.pool_size)
    }

    fn activation(&self) -> Option<Activation> {
        self.activation
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.activation = activation;
    }

    fn create_ctx(&self, _rng: &mut StdRng) -> LayerContext {
        LayerContext::new(Scratch::MaxPool { argmax: Vec::new() })
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let Scratch::MaxPool { argmax } = &mut ctx.scratch else {
            panic!("MaxPool layer given a context of another kind");
        };
        let in_shape = input.shape();
        let out = self.base_out_dims().with_batch(in_shape.dim(0));
        let p = self.pool_size;

        ctx.output.reset(out);
        argmax.clear();
        argmax.resize(out.flatten_size(), 0);

        let (n, c, oh, ow) = (out.dim(0), out.dim(1), out.dim(2), out.dim(3));
        for s in 0..n {
            for ci in 0..c {
                for x in 0..oh {
                    for y in 0..ow {
                        let mut best = f64::NEG_INFINITY;
                        let mut best_at = in_shape.offset([s, ci, x * p, y * p]);
                        for i in 0..p {
                            for j in 0..p {
                                let at = in_shape.offset([s, ci, x * p + i, y * p + j]);
                                if input.data()[at] > best {
                                    best = input.data()[at];
                                    best_at = at;
                                }
                            }
                        }
                        let o = out.offset([s, ci, x, y]);
                        ctx.output.data_mut()[o] = best;
                        argmax[o] = best_at;
                    }
                }
            }
        }
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let Scratch::MaxPool { argmax } = &ctx.scratch else {
            panic!("MaxPool layer given a context of another kind");
        };
        in_delta.reset(input.shape());
        let delta = ctx.backward.delta.data();
        let target = in_delta.data_mut();
        for (&at, &d) in argmax.iter().zip(delta) {
            target[at] = d;
        }
    }

    fn describe_params(&self, _detail: bool) -> String {
        format!("PoolSize = {}", self.pool_size)
    }

    fn record(&self) -> LayerRecord {
        pool_record(LayerKind::MaxPool, self.in_dims, self.pool_size, self.activation)
    }
}

/// Average pooling. The delta of each window is spread evenly over it.
#[derive(Debug, Clone)]
pub struct AvgPoolLayer {
    in_dims: Shape,
    pool_size: usize,
    activation: Option<Activation>,
}

impl AvgPoolLayer {
    pub fn new(in_dims: Shape, pool_size: usize) -> Self {
        pooled_dims(in_dims, pool_size);
        Self { in_dims, pool_size, activation: None }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Layer for AvgPoolLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::AvgPool
    }

    fn base_in_dims(&self) -> Shape {
        self.in_dims
    }

    fn base_out_dims(&self) -> Shape {
        pooled_dims(self.in_dims, self.pool_size)
    }

    fn activation(&self) -> Option<Activation> {
        self.activation
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.activation = activation;
    }

    fn create_ctx(&self, _rng: &mut StdRng) -> LayerContext {
        LayerContext::new(Scratch::None)
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let out = self.base_out_dims().with_batch(input.dim(0));
        let p = self.pool_size;
        let area = (p * p) as f64;

        ctx.output.reset(out);
        let (n, c, oh, ow) = (out.dim(0), out.dim(1), out.dim(2), out.dim(3));
        for s in 0..n {
            for ci in 0..c {
                for x in 0..oh {
                    for y in 0..ow {
                        let mut total = 0.0;
                        for i in 0..p {
                            for j in 0..p {
                                total += input[[s, ci, x * p + i, y * p + j]];
                            }
                        }
                        ctx.output[[s, ci, x, y]] = total / area;
                    }
                }
            }
        }
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let p = self.pool_size;
        let area = (p * p) as f64;
        let delta = &ctx.backward.delta;
        in_delta.reset(input.shape());

        let d = delta.shape();
        let (n, c, oh, ow) = (d.dim(0), d.dim(1), d.dim(2), d.dim(3));
        for s in 0..n {
            for ci in 0..c {
                for x in 0..oh {
                    for y in 0..ow {
                        let share = delta[[s, ci, x, y]] / area;
                        for i in 0..p {
                            for j in 0..p {
                                in_delta[[s, ci, x * p + i, y * p + j]] = share;
                            }
                        }
                    }
                }
            }
        }
    }

    fn describe_params(&self, _detail: bool) -> String {
        format!("PoolSize = {}", self.pool_size)
    }

    fn record(&self) -> LayerRecord {
        pool_record(LayerKind::AvgPool, self.in_dims, self.pool_size, self.activation)
    }
}

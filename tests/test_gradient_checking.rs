// Numerical gradient checking using central finite differences.
//
// Each check uses the loss L = Σ c_i · out_i for fixed coefficients c, so the
// delta seeded into the layer is exactly c. Analytical parameter gradients
// (collect_gradients), bias gradients (the delta sum apply_gradients hands
// to the optimizer) and input deltas (backward) are compared with
// (L(θ + h) - L(θ - h)) / 2h.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_cnn_engine::layers::{Conv2DLayer, DenseLayer, Im2RowConv2DLayer, Layer};
use rust_cnn_engine::optimizers::Optimizer;
use rust_cnn_engine::tensor::{Shape, Tensor};
use rust_cnn_engine::utils::Activation;

const H: f64 = 1e-6;

fn coefficients(n: usize) -> Vec<f64> {
    (0..n).map(|i| ((i * 5 % 9) as f64 - 4.0) * 0.25).collect()
}

fn linear_loss(layer: &dyn Layer, input: &Tensor, coeffs: &[f64]) -> f64 {
    let mut ctx = layer.create_ctx(&mut StdRng::seed_from_u64(0));
    layer.forward(input.view(), &mut ctx);
    ctx.output.data().iter().zip(coeffs).map(|(o, c)| o * c).sum()
}

/// Returns (parameter gradient, input delta).
fn analytical(layer: &dyn Layer, input: &Tensor, coeffs: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut ctx = layer.create_ctx(&mut StdRng::seed_from_u64(0));
    layer.forward(input.view(), &mut ctx);
    ctx.delta_mut().data_mut().copy_from_slice(coeffs);

    let mut in_delta = Tensor::zeros(Shape::d1(0));
    layer.backward(input.view(), &mut ctx, Some(&mut in_delta));
    layer.collect_gradients(input.view(), &mut ctx);
    (ctx.backward.gradients[0].clone(), in_delta.into_vec())
}

/// Keeps the bias delta sum and leaves every parameter untouched.
#[derive(Default)]
struct RecordingOptimizer {
    bias_delta: Vec<f64>,
}

impl Optimizer for RecordingOptimizer {
    fn update(&mut self, _weights: &mut [f64], _gradients: &[f64], _training_count: usize, _mini_batch_count: usize) {}

    fn update_biases(&mut self, _biases: &mut [f64], delta_sum: &[f64], _mini_batch_count: usize) {
        self.bias_delta = delta_sum.to_vec();
    }

    fn learning_rate(&self) -> f64 {
        1.0
    }

    fn set_learning_rate(&mut self, _lr: f64) {}
}

/// Bias gradient as the layer reports it to its optimizer.
fn analytical_bias(layer: &mut dyn Layer, input: &Tensor, coeffs: &[f64]) -> Vec<f64> {
    let mut ctx = layer.create_ctx(&mut StdRng::seed_from_u64(0));
    layer.forward(input.view(), &mut ctx);
    ctx.delta_mut().data_mut().copy_from_slice(coeffs);
    layer.backward(input.view(), &mut ctx, None);
    layer.collect_gradients(input.view(), &mut ctx);

    let mut optimizer = RecordingOptimizer::default();
    layer.apply_gradients(&ctx.backward, &mut optimizer, 1, 1);
    optimizer.bias_delta
}

fn check_bias<L, F>(build: F, biases: &[f64], input: &Tensor, coeffs: &[f64])
where
    L: Layer,
    F: Fn(Vec<f64>) -> L,
{
    let mut layer = build(biases.to_vec());
    let gradient = analytical_bias(&mut layer, input, coeffs);
    assert_eq!(gradient.len(), biases.len());

    for i in 0..biases.len() {
        let mut plus = biases.to_vec();
        plus[i] += H;
        let mut minus = biases.to_vec();
        minus[i] -= H;
        let numerical =
            (linear_loss(&build(plus), input, coeffs) - linear_loss(&build(minus), input, coeffs)) / (2.0 * H);
        assert_relative_eq!(numerical, gradient[i], epsilon = 1e-6, max_relative = 1e-4);
    }
}

fn check_input_delta(layer: &dyn Layer, input: &Tensor, coeffs: &[f64], expected: &[f64]) {
    for i in 0..input.len() {
        let mut plus = input.clone();
        plus.data_mut()[i] += H;
        let mut minus = input.clone();
        minus.data_mut()[i] -= H;
        let numerical = (linear_loss(layer, &plus, coeffs) - linear_loss(layer, &minus, coeffs)) / (2.0 * H);
        assert_relative_eq!(numerical, expected[i], epsilon = 1e-6, max_relative = 1e-4);
    }
}

fn test_input(shape: Shape) -> Tensor {
    Tensor::from_vec((0..shape.flatten_size()).map(|i| (i as f64 * 0.61).sin()).collect(), shape)
}

// ============================================================================
// Dense
// ============================================================================

fn dense(weights: Vec<f64>, biases: Vec<f64>) -> DenseLayer {
    DenseLayer::with_weights(Shape::d1(4), weights, biases).with_activation(Activation::Sigmoid)
}

#[test]
fn test_dense_gradients() {
    let weights: Vec<f64> = (0..12).map(|i| (i as f64 * 0.37).cos()).collect();
    let biases = vec![0.1, -0.2, 0.3];
    let input = test_input(Shape::d2(2, 4));
    let coeffs = coefficients(6);

    let layer = dense(weights.clone(), biases.clone());
    let (gradient, in_delta) = analytical(&layer, &input, &coeffs);

    for i in 0..weights.len() {
        let mut plus = weights.clone();
        plus[i] += H;
        let mut minus = weights.clone();
        minus[i] -= H;
        let numerical = (linear_loss(&dense(plus, biases.clone()), &input, &coeffs)
            - linear_loss(&dense(minus, biases.clone()), &input, &coeffs))
            / (2.0 * H);
        assert_relative_eq!(numerical, gradient[i], epsilon = 1e-6, max_relative = 1e-4);
    }

    check_input_delta(&layer, &input, &coeffs, &in_delta);
    check_bias(|b| dense(weights.clone(), b), &biases, &input, &coeffs);
}

#[test]
fn test_dense_softmax_input_delta() {
    let weights: Vec<f64> = (0..12).map(|i| (i as f64 * 0.53).sin()).collect();
    let layer = DenseLayer::with_weights(Shape::d1(4), weights, vec![0.0; 3]).with_activation(Activation::Softmax);
    let input = test_input(Shape::d2(3, 4));
    let coeffs = coefficients(9);

    let (_, in_delta) = analytical(&layer, &input, &coeffs);
    check_input_delta(&layer, &input, &coeffs, &in_delta);
}

// ============================================================================
// Convolution (direct loops and im2row)
// ============================================================================

fn filters_tensor(values: Vec<f64>) -> Tensor {
    Tensor::from_vec(values, Shape::d4(2, 2, 2, 2))
}

fn check_conv<L, F>(build: F)
where
    L: Layer,
    F: Fn(Tensor, Vec<f64>) -> L,
{
    let filters: Vec<f64> = (0..16).map(|i| (i as f64 * 0.29).cos() * 0.5).collect();
    let biases = vec![0.05, -0.1];
    let input = test_input(Shape::d4(2, 2, 3, 4));
    let layer = build(filters_tensor(filters.clone()), biases.clone());
    let coeffs = coefficients(layer.output_size() * 2);

    let (gradient, in_delta) = analytical(&layer, &input, &coeffs);
    assert_eq!(gradient.len(), filters.len());

    for i in 0..filters.len() {
        let mut plus = filters.clone();
        plus[i] += H;
        let mut minus = filters.clone();
        minus[i] -= H;
        let numerical = (linear_loss(&build(filters_tensor(plus), biases.clone()), &input, &coeffs)
            - linear_loss(&build(filters_tensor(minus), biases.clone()), &input, &coeffs))
            / (2.0 * H);
        assert_relative_eq!(numerical, gradient[i], epsilon = 1e-6, max_relative = 1e-4);
    }

    check_input_delta(&layer, &input, &coeffs, &in_delta);
    check_bias(|b| build(filters_tensor(filters.clone()), b), &biases, &input, &coeffs);
}

#[test]
fn test_conv2d_gradients() {
    check_conv(|f, b| Conv2DLayer::with_filters(Shape::d3(2, 3, 4), f, b).with_activation(Activation::Tanh));
}

#[test]
fn test_conv2d_im2row_gradients() {
    check_conv(|f, b| Im2RowConv2DLayer::with_filters(Shape::d3(2, 3, 4), f, b).with_activation(Activation::Tanh));
}

#[test]
fn test_conv2d_linear_gradients() {
    check_conv(|f, b| Conv2DLayer::with_filters(Shape::d3(2, 3, 4), f, b));
}

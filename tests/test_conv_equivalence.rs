// The im2row convolution must agree with the direct-loop convolution on
// outputs, propagated deltas, filter gradients and parameter updates.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_cnn_engine::context::BackwardContext;
use rust_cnn_engine::layers::{Conv2DLayer, Im2RowConv2DLayer, Layer};
use rust_cnn_engine::optimizers::Sgd;
use rust_cnn_engine::tensor::{Shape, Tensor};
use rust_cnn_engine::utils::Activation;

struct Pass {
    output: Vec<f64>,
    in_delta: Vec<f64>,
    gradient: Vec<f64>,
    batch: BackwardContext,
}

fn run(layer: &dyn Layer, input: &Tensor) -> Pass {
    let mut ctx = layer.create_ctx(&mut StdRng::seed_from_u64(0));
    layer.forward(input.view(), &mut ctx);
    let output = ctx.output.data().to_vec();

    let seed: Vec<f64> = (0..output.len()).map(|i| ((i * 7 % 11) as f64 - 5.0) * 0.1).collect();
    ctx.delta_mut().data_mut().copy_from_slice(&seed);
    let mut in_delta = Tensor::zeros(Shape::d1(0));
    layer.backward(input.view(), &mut ctx, Some(&mut in_delta));
    layer.collect_gradients(input.view(), &mut ctx);

    let mut batch = BackwardContext::new();
    batch.accumulate(&ctx.backward);
    Pass { output, in_delta: in_delta.into_vec(), gradient: ctx.backward.gradients[0].clone(), batch }
}

fn assert_all_close(a: &[f64], b: &[f64]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_relative_eq!(*x, *y, epsilon = 1e-10);
    }
}

fn check(in_dims: Shape, filters: usize, k: usize, batch: usize, activation: Option<Activation>) {
    let mut rng = StdRng::seed_from_u64(21);
    let mut naive = Conv2DLayer::new(in_dims, filters, k, &mut rng);
    naive.set_activation(activation);
    let fast = Im2RowConv2DLayer::from_conv(naive.clone());

    let shape = in_dims.with_batch(batch);
    let input = Tensor::from_vec(
        (0..shape.flatten_size()).map(|i| (i as f64 * 0.23).cos()).collect(),
        shape,
    );

    let a = run(&naive, &input);
    let b = run(&fast, &input);
    assert_all_close(&a.output, &b.output);
    assert_all_close(&a.in_delta, &b.in_delta);
    assert_all_close(&a.gradient, &b.gradient);

    // One identical SGD step keeps them in lockstep.
    let mut naive = naive;
    let mut fast = fast;
    let mut sgd = Sgd::new(0.1, 0.5);
    naive.apply_gradients(&a.batch, &mut sgd, 10, 1);
    fast.apply_gradients(&b.batch, &mut sgd, 10, 1);
    assert_all_close(naive.filters().data(), fast.filters().data());
    assert_all_close(naive.biases(), fast.biases());

    let a = run(&naive, &input);
    let b = run(&fast, &input);
    assert_all_close(&a.output, &b.output);
}

// ============================================================================
// Equivalence Cases
// ============================================================================

#[test]
fn test_single_channel_single_filter() {
    check(Shape::d3(1, 5, 5), 1, 3, 1, None);
}

#[test]
fn test_multi_channel_multi_filter_batch() {
    check(Shape::d3(2, 5, 6), 3, 3, 2, Some(Activation::Tanh));
}

#[test]
fn test_filter_covers_whole_input() {
    check(Shape::d3(3, 4, 4), 2, 4, 3, Some(Activation::Sigmoid));
}

#[test]
fn test_one_by_one_filter() {
    check(Shape::d3(2, 3, 3), 4, 1, 1, None);
}

#[test]
fn test_kinds_and_records_differ_only_in_kind() {
    let mut rng = StdRng::seed_from_u64(1);
    let naive = Conv2DLayer::new(Shape::d3(1, 6, 6), 2, 3, &mut rng);
    let fast = Im2RowConv2DLayer::from_conv(naive.clone());

    let mut a = naive.record();
    let b = fast.record();
    assert_ne!(a.kind, b.kind);
    a.kind = b.kind;
    assert_eq!(a, b);
    assert_eq!(naive.base_out_dims(), Shape::d3(2, 4, 4));
    assert_eq!(fast.base_out_dims(), Shape::d3(2, 4, 4));
}

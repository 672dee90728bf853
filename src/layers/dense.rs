//! Dense (fully connected) layer implementation
//!
//! For every sample row `x` of the input, computes `y_i = W_i · x + b_i` where
//! `W` is stored neuron-major (neurons × inputs).

use crate::context::{BackwardContext, LayerContext, Scratch};
use crate::layers::r#trait::{preview, Layer, LayerKind};
use crate::model_io::LayerRecord;
use crate::optimizers::Optimizer;
use crate::tensor::{Shape, Tensor, TensorView};
use crate::utils::kernels::{add_assign, kronecker, rows_product, RowBias};
use crate::utils::Activation;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Dense (fully connected) layer with weights and biases.
///
/// # Fields
///
/// * `in_dims` - Per-sample input shape; flattened before the product
/// * `neurons` - Number of output features
/// * `weights` - Weight matrix stored row-major (neurons × input size)
/// * `biases` - Bias vector (neurons)
///
/// # Example
///
/// ```ignore
/// use rand::SeedableRng;
/// use rust_cnn_engine::layers::{DenseLayer, Layer};
/// use rust_cnn_engine::tensor::Shape;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
/// let layer = DenseLayer::new(Shape::d1(784), 128, &mut rng);
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 128);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    in_dims: Shape,
    neurons: usize,
    weights: Vec<f64>,
    biases: Vec<f64>,
    activation: Option<Activation>,
    debug: bool,
}

impl DenseLayer {
    /// Creates a layer with weights and biases drawn from a standard normal
    /// distribution.
    pub fn new(in_dims: Shape, neurons: usize, rng: &mut StdRng) -> Self {
        let in_size = in_dims.flatten_size();
        let weights = (0..neurons * in_size).map(|_| rng.sample(StandardNormal)).collect();
        let biases = (0..neurons).map(|_| rng.sample(StandardNormal)).collect();

        Self { in_dims, neurons, weights, biases, activation: None, debug: false }
    }

    /// Creates a layer from explicit parameters. The neuron count is taken
    /// from `biases`.
    ///
    /// # Panics
    ///
    /// Panics if `weights.len()` is not `biases.len() * in_dims.flatten_size()`.
    pub fn with_weights(in_dims: Shape, weights: Vec<f64>, biases: Vec<f64>) -> Self {
        let neurons = biases.len();
        assert_eq!(
            weights.len(),
            neurons * in_dims.flatten_size(),
            "Dense weights must hold neurons × inputs values"
        );
        Self { in_dims, neurons, weights, biases, activation: None, debug: false }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    pub fn neurons(&self) -> usize {
        self.neurons
    }
}

impl Layer for DenseLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn base_in_dims(&self) -> Shape {
        self.in_dims
    }

    fn base_out_dims(&self) -> Shape {
        Shape::d1(self.neurons)
    }

    fn activation(&self) -> Option<Activation> {
        self.activation
    }

    fn set_activation(&mut self, activation: Option<Activation>) {
        self.activation = activation;
    }

    fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn create_ctx(&self, _rng: &mut StdRng) -> LayerContext {
        LayerContext::with_gradients(
            Scratch::Dense { outer: vec![0.0; self.weights.len()] },
            &[self.weights.len()],
        )
    }

    fn calc_output(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let in_size = self.input_size();
        let samples = input.len() / in_size;

        ctx.output.reset(Shape::d2(samples, self.neurons));

        let bias = if self.debug { RowBias::None } else { RowBias::PerRowOfB(&self.biases) };
        rows_product(input.data(), samples, &self.weights, self.neurons, bias, ctx.output.data_mut());
    }

    fn backpropagate(&self, input: TensorView<'_>, ctx: &mut LayerContext, in_delta: &mut Tensor) {
        let in_size = self.input_size();
        in_delta.reset(input.shape());

        let delta = ctx.backward.delta.data();
        for (out_row, delta_row) in in_delta
            .data_mut()
            .chunks_exact_mut(in_size)
            .zip(delta.chunks_exact(self.neurons))
        {
            for (&d, w_row) in delta_row.iter().zip(self.weights.chunks_exact(in_size)) {
                for (o, w) in out_row.iter_mut().zip(w_row) {
                    *o += d * w;
                }
            }
        }
    }

    fn collect_gradients(&self, input: TensorView<'_>, ctx: &mut LayerContext) {
        let in_size = self.input_size();
        let Scratch::Dense { outer } = &mut ctx.scratch else {
            panic!("Dense layer given a context of another kind");
        };

        let gradient = &mut ctx.backward.gradients[0];
        gradient.iter_mut().for_each(|g| *g = 0.0);

        let delta = ctx.backward.delta.data();
        for (x, d) in input.data().chunks_exact(in_size).zip(delta.chunks_exact(self.neurons)) {
            kronecker(d, x, outer);
            add_assign(gradient, outer);
        }
    }

    fn apply_gradients(
        &mut self,
        batch: &BackwardContext,
        optimizer: &mut dyn Optimizer,
        training_count: usize,
        mini_batch_count: usize,
    ) {
        optimizer.update(&mut self.weights, &batch.gradients[0], training_count, mini_batch_count);

        if !self.debug {
            let mut bias_delta = vec![0.0; self.neurons];
            for row in batch.delta.data().chunks_exact(self.neurons) {
                add_assign(&mut bias_delta, row);
            }
            optimizer.update_biases(&mut self.biases, &bias_delta, mini_batch_count);
        }
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn describe_params(&self, detail: bool) -> String {
        if !detail {
            return String::new();
        }
        let in_size = self.input_size();
        let mut out = format!("Weights: Count = {}; InSize = {};", self.neurons, in_size);
        for (i, row) in self.weights.chunks_exact(in_size).take(10).enumerate() {
            out.push_str(&format!(
                "\n\tNeuron#{}: Bias = {:.8}; Weights = [{}]",
                i,
                self.biases[i],
                preview(row, 10)
            ));
        }
        if self.neurons > 10 {
            out.push_str("\n\t......");
        }
        out
    }

    fn record(&self) -> LayerRecord {
        LayerRecord {
            kind: LayerKind::Dense,
            input_dims: self.in_dims.dims().to_vec(),
            activation: self.activation,
            weight_dims: vec![self.neurons, self.input_size()],
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            pool_size: None,
            drop_rate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_dense_layer_creation() {
        let mut rng = StdRng::seed_from_u64(42);
        let layer = DenseLayer::new(Shape::d1(10), 5, &mut rng);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.weights.len(), 50);
        assert_eq!(layer.biases.len(), 5);
        assert_eq!(layer.parameter_count(), 55);
    }

    #[test]
    fn test_deterministic_initialization() {
        let layer1 = DenseLayer::new(Shape::d1(10), 5, &mut StdRng::seed_from_u64(42));
        let layer2 = DenseLayer::new(Shape::d1(10), 5, &mut StdRng::seed_from_u64(42));

        assert_eq!(layer1.weights, layer2.weights);
        assert_eq!(layer1.biases, layer2.biases);
    }

    #[test]
    fn test_debug_mode_skips_bias() {
        let mut layer = DenseLayer::with_weights(Shape::d1(2), vec![1.0, 1.0], vec![10.0]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = layer.create_ctx(&mut rng);
        let input = Tensor::from_vec(vec![1.0, 2.0], Shape::d2(1, 2));

        layer.calc_output(input.view(), &mut ctx);
        assert_eq!(ctx.output.data(), &[13.0]);

        layer.set_debug(true);
        layer.calc_output(input.view(), &mut ctx);
        assert_eq!(ctx.output.data(), &[3.0]);
    }

    #[test]
    #[should_panic(expected = "Dense weights must hold neurons × inputs values")]
    fn test_with_weights_checks_sizes() {
        DenseLayer::with_weights(Shape::d1(3), vec![0.0; 5], vec![0.0; 2]);
    }
}

//! Architecture configuration structures
//!
//! Describes a network as a JSON list of layers so architectures can be tried
//! without code changes. Only the first layer needs `input_dims`; every later
//! layer takes the previous layer's output dims unless it states its own, in
//! which case the flattened sizes must agree.

use crate::error::{EngineError, Result};
use crate::layers::{
    AvgPoolLayer, Conv2DLayer, DenseLayer, DropoutLayer, Im2RowConv2DLayer, Layer, MaxPoolLayer,
};
use crate::network::{LossKind, Network, NetworkOptions};
use crate::tensor::Shape;
use crate::utils::Activation;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const LAYER_TYPES: [&str; 6] = ["dense", "conv2d", "conv2d_im2row", "maxpool", "avgpool", "dropout"];

/// Configuration for a single layer.
///
/// Different layer types require different fields:
///
/// - **dense**: `neurons`
/// - **conv2d**, **conv2d_im2row**: `filter_count`, `filter_size`; input dims
///   must be `(channels, height, width)`
/// - **maxpool**, **avgpool**: `pool_size`; input dims must be
///   `(channels, height, width)`
/// - **dropout**: `drop_rate` in `[0.0, 1.0)`
///
/// Every layer accepts an optional `activation`: "sigmoid", "leaky_relu",
/// "tanh" or "softmax".
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "conv2d_im2row",
///   "input_dims": [1, 28, 28],
///   "filter_count": 8,
///   "filter_size": 5,
///   "activation": "leaky_relu"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub layer_type: String,

    /// Per-sample input shape, 1 to 3 axes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dims: Option<Vec<usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,

    // Dense
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neurons: Option<usize>,

    // Conv2D
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_count: Option<usize>,
    /// Side of the square filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_size: Option<usize>,

    // Pooling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,

    // Dropout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f64>,
}

/// Configuration for the entire network.
///
/// # Example
///
/// ```json
/// {
///   "loss": "cross_entropy",
///   "layers": [
///     { "layer_type": "dense", "input_dims": [784], "neurons": 100, "activation": "sigmoid" },
///     { "layer_type": "dropout", "drop_rate": 0.2 },
///     { "layer_type": "dense", "neurons": 10, "activation": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    /// Overrides the loss of the [`NetworkOptions`] passed to [`build_network`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossKind>,

    pub layers: Vec<LayerConfig>,
}

/// Loads and validates an architecture from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn_engine::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/mlp.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - the architecture has at least one layer and the first one has `input_dims`
/// - each layer has the required fields for its type, within valid ranges
/// - layer connections are valid (output size of layer i matches input size of
///   layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    resolve_dims(config).map(|_| ())
}

/// Builds a network from a validated architecture.
///
/// Parameters are drawn from the network's own generator, so the same seed in
/// `options` gives the same initial weights.
pub fn build_network(config: &ArchitectureConfig, mut options: NetworkOptions) -> Result<Network> {
    let dims = resolve_dims(config)?;
    if let Some(loss) = config.loss {
        options.loss = loss;
    }

    let mut network = Network::new(options);
    for (layer_config, in_dims) in config.layers.iter().zip(dims) {
        let layer = build_layer(layer_config, in_dims, network.rng());
        network.add_boxed_layer(layer);
    }
    Ok(network)
}

/// Input dims of every layer, validating the whole chain.
fn resolve_dims(config: &ArchitectureConfig) -> Result<Vec<Shape>> {
    if config.layers.is_empty() {
        return Err(invalid("Architecture must have at least one layer".into()));
    }

    let mut dims = Vec::with_capacity(config.layers.len());
    let mut prev_out: Option<Shape> = None;
    for (i, layer) in config.layers.iter().enumerate() {
        let in_dims = match (&layer.input_dims, prev_out) {
            (Some(stated), prev) => {
                let stated = shape_from(stated, i)?;
                if let Some(prev) = prev {
                    if prev.flatten_size() != stated.flatten_size() {
                        return Err(invalid(format!(
                            "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                            i - 1,
                            prev.flatten_size(),
                            i,
                            stated.flatten_size()
                        )));
                    }
                }
                stated
            }
            (None, Some(prev)) => prev,
            (None, None) => return Err(invalid(format!("Layer {}: first layer requires 'input_dims'", i))),
        };
        prev_out = Some(layer_output_dims(layer, in_dims, i)?);
        dims.push(in_dims);
    }
    Ok(dims)
}

fn shape_from(dims: &[usize], index: usize) -> Result<Shape> {
    if dims.is_empty() || dims.len() > 3 {
        return Err(invalid(format!("Layer {}: input_dims must have 1 to 3 axes", index)));
    }
    if dims.contains(&0) {
        return Err(invalid(format!("Layer {}: input_dims must be positive", index)));
    }
    Ok(Shape::new(dims))
}

fn require(value: Option<usize>, field: &str, layer_type: &str, index: usize) -> Result<usize> {
    match value {
        Some(0) => Err(invalid(format!("Layer {}: {} must be greater than 0", index, field))),
        Some(v) => Ok(v),
        None => Err(invalid(format!("Layer {}: {} layer requires '{}'", index, layer_type, field))),
    }
}

fn require_image(in_dims: Shape, layer_type: &str, index: usize) -> Result<()> {
    if in_dims.rank() != 3 {
        return Err(invalid(format!(
            "Layer {}: {} layer needs (channels, height, width) input, got {}",
            index, layer_type, in_dims
        )));
    }
    Ok(())
}

/// Output dims of one layer, checking its fields against `in_dims`.
fn layer_output_dims(layer: &LayerConfig, in_dims: Shape, index: usize) -> Result<Shape> {
    if let Some(name) = &layer.activation {
        if Activation::from_name(name).is_none() {
            return Err(invalid(format!(
                "Layer {}: Invalid activation '{}'. Must be one of: sigmoid, leaky_relu, tanh, softmax",
                index, name
            )));
        }
    }

    let layer_type = layer.layer_type.to_lowercase();
    match layer_type.as_str() {
        "dense" => Ok(Shape::d1(require(layer.neurons, "neurons", "Dense", index)?)),
        "conv2d" | "conv2d_im2row" => {
            require_image(in_dims, "Conv2D", index)?;
            let filters = require(layer.filter_count, "filter_count", "Conv2D", index)?;
            let k = require(layer.filter_size, "filter_size", "Conv2D", index)?;
            if k > in_dims.dim(1) || k > in_dims.dim(2) {
                return Err(invalid(format!("Layer {}: filter_size {} does not fit input {}", index, k, in_dims)));
            }
            Ok(Shape::d3(filters, in_dims.dim(1) - k + 1, in_dims.dim(2) - k + 1))
        }
        "maxpool" | "avgpool" => {
            require_image(in_dims, "Pooling", index)?;
            let p = require(layer.pool_size, "pool_size", "Pooling", index)?;
            if p > in_dims.dim(1) || p > in_dims.dim(2) {
                return Err(invalid(format!("Layer {}: pool_size {} does not fit input {}", index, p, in_dims)));
            }
            Ok(Shape::d3(in_dims.dim(0), in_dims.dim(1) / p, in_dims.dim(2) / p))
        }
        "dropout" => {
            let rate = layer
                .drop_rate
                .ok_or_else(|| invalid(format!("Layer {}: Dropout layer requires 'drop_rate'", index)))?;
            if !(0.0..1.0).contains(&rate) {
                return Err(invalid(format!("Layer {}: drop_rate must be in range [0.0, 1.0)", index)));
            }
            Ok(in_dims)
        }
        _ => Err(invalid(format!(
            "Layer {}: Invalid layer type '{}'. Must be one of: {}",
            index,
            layer.layer_type,
            LAYER_TYPES.join(", ")
        ))),
    }
}

/// Builds one layer. Fields were checked by [`resolve_dims`].
fn build_layer(config: &LayerConfig, in_dims: Shape, rng: &mut StdRng) -> Box<dyn Layer> {
    let get = |v: Option<usize>| v.unwrap_or_default();
    let mut layer: Box<dyn Layer> = match config.layer_type.to_lowercase().as_str() {
        "dense" => Box::new(DenseLayer::new(in_dims, get(config.neurons), rng)),
        "conv2d" => {
            Box::new(Conv2DLayer::new(in_dims, get(config.filter_count), get(config.filter_size), rng))
        }
        "conv2d_im2row" => Box::new(Im2RowConv2DLayer::new(
            in_dims,
            get(config.filter_count),
            get(config.filter_size),
            rng,
        )),
        "maxpool" => Box::new(MaxPoolLayer::new(in_dims, get(config.pool_size))),
        "avgpool" => Box::new(AvgPoolLayer::new(in_dims, get(config.pool_size))),
        _ => Box::new(DropoutLayer::new(in_dims, config.drop_rate.unwrap_or_default())),
    };
    layer.set_activation(config.activation.as_deref().and_then(Activation::from_name));
    layer
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidArchitecture(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(neurons: usize) -> LayerConfig {
        LayerConfig { layer_type: "dense".into(), neurons: Some(neurons), ..LayerConfig::default() }
    }

    #[test]
    fn test_first_layer_needs_input_dims() {
        let arch = ArchitectureConfig { loss: None, layers: vec![dense(3)] };
        assert!(validate_architecture(&arch).is_err());
    }

    #[test]
    fn test_dims_flow_between_layers() {
        let mut first = dense(5);
        first.input_dims = Some(vec![4]);
        let arch = ArchitectureConfig { loss: None, layers: vec![first, dense(2)] };

        let dims = resolve_dims(&arch).unwrap();
        assert_eq!(dims, vec![Shape::d1(4), Shape::d1(5)]);
    }

    #[test]
    fn test_unknown_activation_rejected() {
        let mut first = dense(5);
        first.input_dims = Some(vec![4]);
        first.activation = Some("relu6".into());
        let arch = ArchitectureConfig { loss: None, layers: vec![first] };

        let err = validate_architecture(&arch).unwrap_err().to_string();
        assert!(err.contains("Invalid activation"));
    }
}

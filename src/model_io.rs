//! Model persistence
//!
//! A trained network is stored as JSON: the loss kind plus one [`LayerRecord`]
//! per layer carrying its kind, geometry, activation and parameter buffers.
//! Loading checks every buffer length before any layer is built.

use crate::error::{EngineError, Result};
use crate::layers::{
    AvgPoolLayer, Conv2DLayer, DenseLayer, DropoutLayer, Im2RowConv2DLayer, Layer, LayerKind,
    MaxPoolLayer,
};
use crate::network::{LossKind, Network, NetworkOptions};
use crate::tensor::{Shape, Tensor};
use crate::utils::Activation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Shapes and buffers of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub kind: LayerKind,
    pub input_dims: Vec<usize>,
    #[serde(default)]
    pub activation: Option<Activation>,
    /// `[neurons, inputs]` for dense layers, `[F, C, k, k]` for convolutions
    #[serde(default)]
    pub weight_dims: Vec<usize>,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub biases: Vec<f64>,
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default)]
    pub drop_rate: Option<f64>,
}

/// Everything needed to rebuild a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub loss: LossKind,
    pub layers: Vec<LayerRecord>,
}

impl ModelRecord {
    pub fn from_network(network: &Network) -> Self {
        Self { loss: network.loss(), layers: network.layers().iter().map(|l| l.record()).collect() }
    }

    /// Rebuilds the network. `options.loss` is replaced by the stored loss.
    pub fn into_network(self, mut options: NetworkOptions) -> Result<Network> {
        options.loss = self.loss;
        let mut network = Network::new(options);
        let mut prev_out: Option<usize> = None;
        for (i, record) in self.layers.iter().enumerate() {
            let layer = layer_from_record(record).map_err(|e| match e {
                EngineError::InvalidModel(m) => EngineError::InvalidModel(format!("Layer {}: {}", i, m)),
                other => other,
            })?;
            if let Some(prev) = prev_out {
                if prev != layer.input_size() {
                    return Err(EngineError::InvalidModel(format!(
                        "Layer {}: input size {} does not match previous output size {}",
                        i,
                        layer.input_size(),
                        prev
                    )));
                }
            }
            prev_out = Some(layer.output_size());
            network.add_boxed_layer(layer);
        }
        Ok(network)
    }
}

/// Builds a layer from its record, validating shapes and buffer lengths.
pub fn layer_from_record(record: &LayerRecord) -> Result<Box<dyn Layer>> {
    if record.input_dims.is_empty() || record.input_dims.len() > 3 || record.input_dims.contains(&0) {
        return Err(bad(format!("invalid input dims {:?}", record.input_dims)));
    }
    let in_dims = Shape::new(&record.input_dims);

    let mut layer: Box<dyn Layer> = match record.kind {
        LayerKind::Dense => {
            let neurons = record.biases.len();
            if neurons == 0 || record.weights.len() != neurons * in_dims.flatten_size() {
                return Err(bad(format!(
                    "dense layer needs {} × {} weights, found {}",
                    neurons,
                    in_dims.flatten_size(),
                    record.weights.len()
                )));
            }
            Box::new(DenseLayer::with_weights(in_dims, record.weights.clone(), record.biases.clone()))
        }
        LayerKind::Conv2d => Box::new(conv_from_record(record, in_dims)?),
        LayerKind::Conv2dIm2row => Box::new(Im2RowConv2DLayer::from_conv(conv_from_record(record, in_dims)?)),
        LayerKind::MaxPool => Box::new(MaxPoolLayer::new(in_dims, pool_size(record, in_dims)?)),
        LayerKind::AvgPool => Box::new(AvgPoolLayer::new(in_dims, pool_size(record, in_dims)?)),
        LayerKind::Dropout => {
            let rate = record.drop_rate.ok_or_else(|| bad("dropout layer without drop_rate".into()))?;
            if !(0.0..1.0).contains(&rate) {
                return Err(bad(format!("drop_rate {} outside [0, 1)", rate)));
            }
            Box::new(DropoutLayer::new(in_dims, rate))
        }
    };
    layer.set_activation(record.activation);
    Ok(layer)
}

fn conv_from_record(record: &LayerRecord, in_dims: Shape) -> Result<Conv2DLayer> {
    let wd = &record.weight_dims;
    let valid = in_dims.rank() == 3
        && wd.len() == 4
        && wd[0] > 0
        && wd[1] == in_dims.dim(0)
        && wd[2] > 0
        && wd[2] == wd[3]
        && wd[2] <= in_dims.dim(1)
        && wd[3] <= in_dims.dim(2)
        && record.biases.len() == wd[0]
        && record.weights.len() == wd.iter().product::<usize>();
    if !valid {
        return Err(bad(format!(
            "convolution with filter dims {:?}, {} weights and {} biases does not fit input {}",
            wd,
            record.weights.len(),
            record.biases.len(),
            in_dims
        )));
    }
    let filters = Tensor::from_vec(record.weights.clone(), Shape::new(wd));
    Ok(Conv2DLayer::with_filters(in_dims, filters, record.biases.clone()))
}

fn pool_size(record: &LayerRecord, in_dims: Shape) -> Result<usize> {
    match record.pool_size {
        Some(p) if p > 0 && in_dims.rank() == 3 && p <= in_dims.dim(1) && p <= in_dims.dim(2) => Ok(p),
        other => Err(bad(format!("pool size {:?} does not fit input {}", other, in_dims))),
    }
}

fn bad(message: String) -> EngineError {
    EngineError::InvalidModel(message)
}

/// Writes the network to `path` as JSON.
pub fn save_network<P: AsRef<Path>>(path: P, network: &Network) -> Result<()> {
    let record = ModelRecord::from_network(network);
    let json = serde_json::to_string(&record)?;
    fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), layers = record.layers.len(), "model saved");
    Ok(())
}

/// Reads a network written by [`save_network`].
pub fn load_network<P: AsRef<Path>>(path: P, options: NetworkOptions) -> Result<Network> {
    let contents = fs::read_to_string(path.as_ref())?;
    let record: ModelRecord = serde_json::from_str(&contents)?;
    let network = record.into_network(options)?;
    info!(path = %path.as_ref().display(), layers = network.len(), "model loaded");
    Ok(network)
}

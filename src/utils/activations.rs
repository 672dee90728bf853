//! Activation functions and their derivative operators
//!
//! Activations are applied in place on a layer's output. Derivatives consume the
//! activation's own output together with the incoming delta and overwrite the
//! delta with the chain-rule product. Both operate per sample row, which only
//! matters for softmax.
//!
//! Supported kinds:
//! - Sigmoid
//! - Leaky-ReLU (clipped linear: slope 0.01 below 0 and above 1)
//! - Tanh
//! - Softmax (full Jacobian in the derivative)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slope used by leaky-ReLU outside the `[0, 1]` band.
pub const LEAKY_SLOPE: f64 = 0.01;

/// Activation attached to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Sigmoid,
    LeakyRelu,
    Tanh,
    Softmax,
}

impl Activation {
    /// Stable numeric code used in layer descriptions.
    pub fn code(&self) -> i32 {
        match self {
            Activation::Sigmoid => 1,
            Activation::LeakyRelu => 2,
            Activation::Tanh => 3,
            Activation::Softmax => 4,
        }
    }

    /// Parses the lowercase names accepted in architecture files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sigmoid" => Some(Activation::Sigmoid),
            "leaky_relu" | "leakyrelu" => Some(Activation::LeakyRelu),
            "tanh" => Some(Activation::Tanh),
            "softmax" => Some(Activation::Softmax),
            _ => None,
        }
    }

    /// Applies the activation in place. `row_len` is the per-sample width.
    ///
    /// # Panics
    ///
    /// Panics if `row_len` is zero or does not divide `values.len()`.
    pub fn activate(&self, values: &mut [f64], row_len: usize) {
        assert!(
            row_len > 0 && values.len() % row_len == 0,
            "Activation row length {} does not divide {} values",
            row_len,
            values.len()
        );
        match self {
            Activation::Sigmoid => values.iter_mut().for_each(|v| *v = sigmoid(*v)),
            Activation::LeakyRelu => values.iter_mut().for_each(|v| *v = leaky_relu(*v)),
            Activation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Activation::Softmax => softmax_rows(values, values.len() / row_len, row_len),
        }
    }

    /// Multiplies `delta` in place by the local derivative evaluated at `output`.
    ///
    /// # Panics
    ///
    /// Panics if `output` and `delta` differ in length or `row_len` does not
    /// divide them.
    pub fn derivate(&self, output: &[f64], delta: &mut [f64], row_len: usize) {
        assert_eq!(output.len(), delta.len(), "Output and delta must have the same length");
        assert!(
            row_len > 0 && output.len() % row_len == 0,
            "Activation row length {} does not divide {} values",
            row_len,
            output.len()
        );
        match self {
            Activation::Sigmoid => {
                for (d, &y) in delta.iter_mut().zip(output) {
                    *d *= sigmoid_derivative(y);
                }
            }
            Activation::LeakyRelu => {
                for (d, &y) in delta.iter_mut().zip(output) {
                    *d *= leaky_relu_derivative(y);
                }
            }
            Activation::Tanh => {
                for (d, &y) in delta.iter_mut().zip(output) {
                    *d *= tanh_derivative(y);
                }
            }
            Activation::Softmax => {
                let mut upstream = vec![0.0; row_len];
                for (y, d) in output.chunks_exact(row_len).zip(delta.chunks_exact_mut(row_len)) {
                    upstream.copy_from_slice(d);
                    softmax_jacobian_product(y, &upstream, d);
                }
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Sigmoid => "sigmoid",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
        };
        write!(f, "{}", name)
    }
}

/// Returns the sigmoid of the input: 1 / (1 + exp(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative assuming y = sigmoid(z).
pub fn sigmoid_derivative(y: f64) -> f64 {
    y * (1.0 - y)
}

/// Tanh derivative assuming y = tanh(z).
pub fn tanh_derivative(y: f64) -> f64 {
    1.0 - y * y
}

/// Clipped-linear leaky-ReLU: identity on `[0, 1]`, slope 0.01 outside.
pub fn leaky_relu(x: f64) -> f64 {
    if x < 0.0 {
        LEAKY_SLOPE * x
    } else if x > 1.0 {
        1.0 + LEAKY_SLOPE * (x - 1.0)
    } else {
        x
    }
}

/// Leaky-ReLU derivative evaluated on the activation's output.
pub fn leaky_relu_derivative(y: f64) -> f64 {
    if y < 0.0 || y > 1.0 {
        LEAKY_SLOPE
    } else {
        1.0
    }
}

/// Softmax applied row-wise with max subtraction for stability.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f64], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols) {
        let max_value = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut sum = 0.0;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        for value in row.iter_mut() {
            *value /= sum;
        }
    }
}

/// `out[j] = sum_k J[k][j] * upstream[k]` with the softmax Jacobian
/// `J[k][j] = y_j (1 - y_j)` for `k == j` and `-y_k y_j` otherwise.
fn softmax_jacobian_product(y: &[f64], upstream: &[f64], out: &mut [f64]) {
    for (j, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &u) in upstream.iter().enumerate() {
            let jac = if k == j { y[j] * (1.0 - y[j]) } else { -y[k] * y[j] };
            acc += jac * u;
        }
        *o = acc;
    }
}

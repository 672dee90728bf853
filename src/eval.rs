//! Classification accuracy and confusion matrix

use crate::error::{EngineError, Result};
use crate::network::Network;

/// Samples per inference forward pass in [`evaluate`].
pub const EVAL_CHUNK: usize = 256;

/// Outcome of evaluating a classifier on a labelled set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub correct: usize,
    pub total: usize,
    /// `confusion[target][predicted]`, each row divided by the number of
    /// samples of that target class. Rows of absent classes stay zero.
    pub confusion: Vec<Vec<f64>>,
}

impl EvalReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Compares the argmax of every output with the argmax of its one-hot target,
/// forwarding [`EVAL_CHUNK`] samples at a time.
pub fn evaluate(network: &Network, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<EvalReport> {
    evaluate_in_chunks(network, inputs, targets, EVAL_CHUNK)
}

/// [`evaluate`] with an explicit batch size, which bounds activation memory.
pub fn evaluate_in_chunks(
    network: &Network,
    inputs: &[Vec<f64>],
    targets: &[Vec<f64>],
    chunk_size: usize,
) -> Result<EvalReport> {
    if inputs.len() != targets.len() {
        return Err(EngineError::SampleCountMismatch { inputs: inputs.len(), targets: targets.len() });
    }
    let classes = network.output_size();
    if let Some(bad) = targets.iter().find(|t| t.len() != classes) {
        return Err(EngineError::TargetSize { expected: classes, actual: bad.len() });
    }

    let mut confusion = vec![vec![0.0; classes]; classes];
    let mut counts = vec![0usize; classes];
    let mut correct = 0;

    let chunk_size = chunk_size.max(1);
    for (input_chunk, target_chunk) in inputs.chunks(chunk_size).zip(targets.chunks(chunk_size)) {
        let outputs = network.forward_batch(input_chunk)?;
        for (output, target) in outputs.iter().zip(target_chunk) {
            let predicted = argmax(output);
            let expected = argmax(target);
            if predicted == expected {
                correct += 1;
            }
            confusion[expected][predicted] += 1.0;
            counts[expected] += 1;
        }
    }

    for (row, &count) in confusion.iter_mut().zip(&counts) {
        if count > 0 {
            row.iter_mut().for_each(|v| *v /= count as f64);
        }
    }

    Ok(EvalReport { correct, total: inputs.len(), confusion })
}

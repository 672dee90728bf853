//! IDX readers for MNIST-style datasets
//!
//! Images become one `f64` vector per sample scaled to `[0, 1]`. Labels become
//! one-hot target vectors, either of a given class count or sized by the
//! largest label seen.

use crate::error::{EngineError, Result};
use std::path::Path;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// Decoded image set.
#[derive(Debug, Clone)]
pub struct MnistImages {
    pub rows: usize,
    pub cols: usize,
    pub images: Vec<Vec<f64>>,
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| EngineError::Mnist("header is truncated".to_string()))?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parses an IDX image buffer, keeping at most `limit` images.
pub fn parse_images(data: &[u8], limit: Option<usize>) -> Result<MnistImages> {
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != IMAGE_MAGIC {
        return Err(EngineError::Mnist(format!(
            "bad image magic number {} (expected {})",
            magic, IMAGE_MAGIC
        )));
    }
    let total = read_be_u32(data, &mut offset)? as usize;
    let rows = read_be_u32(data, &mut offset)? as usize;
    let cols = read_be_u32(data, &mut offset)? as usize;
    let count = limit.map_or(total, |l| l.min(total));
    let image_size = rows * cols;

    if data.len() < offset + count * image_size {
        return Err(EngineError::Mnist("image file is truncated".to_string()));
    }

    let images = data[offset..offset + count * image_size]
        .chunks_exact(image_size.max(1))
        .take(count)
        .map(|px| px.iter().map(|&p| p as f64 / 255.0).collect())
        .collect();

    Ok(MnistImages { rows, cols, images })
}

/// Parses an IDX label buffer into one-hot targets, keeping at most `limit`.
///
/// With `classes` every target has that width and a label outside it is an
/// error. Without it the width is the largest kept label plus one.
pub fn parse_labels(data: &[u8], limit: Option<usize>, classes: Option<usize>) -> Result<Vec<Vec<f64>>> {
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != LABEL_MAGIC {
        return Err(EngineError::Mnist(format!(
            "bad label magic number {} (expected {})",
            magic, LABEL_MAGIC
        )));
    }
    let total = read_be_u32(data, &mut offset)? as usize;
    let count = limit.map_or(total, |l| l.min(total));

    let labels = data
        .get(offset..offset + count)
        .ok_or_else(|| EngineError::Mnist("label file is truncated".to_string()))?;
    let seen = labels.iter().copied().max().map_or(0, |m| m as usize + 1);
    let classes = match classes {
        Some(n) if seen > n => {
            return Err(EngineError::Mnist(format!("label {} does not fit {} classes", seen - 1, n)));
        }
        Some(n) => n,
        None => seen,
    };

    Ok(labels
        .iter()
        .map(|&l| {
            let mut one_hot = vec![0.0; classes];
            one_hot[l as usize] = 1.0;
            one_hot
        })
        .collect())
}

pub fn load_images<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<MnistImages> {
    let data = std::fs::read(path)?;
    parse_images(&data, limit)
}

pub fn load_labels<P: AsRef<Path>>(path: P, limit: Option<usize>, classes: Option<usize>) -> Result<Vec<Vec<f64>>> {
    let data = std::fs::read(path)?;
    parse_labels(&data, limit, classes)
}

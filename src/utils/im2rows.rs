//! Im2row transforms turning convolution into row-matrix products
//!
//! Every receptive field of a convolution is flattened into one row so that
//! a convolution over one sample becomes a single [`rows_product`] between the
//! filter rows and the patch rows. The backward pass uses the same trick on the
//! zero-padded delta with filters rotated by 180 degrees.
//!
//! [`rows_product`]: crate::utils::kernels::rows_product

use crate::tensor::{Shape, Tensor, TensorView};

/// Dense row-major matrix reused as scratch across calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMatrix {
    data: Vec<f64>,
    rows: usize,
    row_len: usize,
}

impl RowMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts the requested geometry, reallocating only if it changed.
    pub fn resize_if_needed(&mut self, rows: usize, row_len: usize) {
        if self.rows != rows || self.row_len != row_len {
            self.rows = rows;
            self.row_len = row_len;
            self.data.resize(rows * row_len, 0.0);
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.row_len..(i + 1) * self.row_len]
    }

    fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.row_len..(i + 1) * self.row_len]
    }
}

/// One row per filter, each holding `channels * kh * kw` weights.
///
/// # Panics
///
/// Panics if `filters` is not rank 4.
pub fn filters_to_rows(filters: TensorView<'_>, dest: &mut RowMatrix) {
    let (f, c, kh, kw) = dims4(filters.shape());
    dest.resize_if_needed(f, c * kh * kw);
    for fi in 0..f {
        dest.row_mut(fi).copy_from_slice(filters.sample(fi));
    }
}

/// Reverses both spatial axes of every `(filter, channel)` kernel.
pub fn rot180_filters(filters: TensorView<'_>, dest: &mut Tensor) {
    let shape = filters.shape();
    let (f, c, kh, kw) = dims4(shape);
    dest.resize(shape);
    for fi in 0..f {
        for ci in 0..c {
            for i in 0..kh {
                for j in 0..kw {
                    dest[[fi, ci, kh - i - 1, kw - j - 1]] = filters[[fi, ci, i, j]];
                }
            }
        }
    }
}

/// One row per input channel holding the rotated kernels of every filter,
/// laid out as `(filter, ky, kx)`.
pub fn rot180_filters_to_rows(filters: TensorView<'_>, dest: &mut RowMatrix) {
    let (f, c, kh, kw) = dims4(filters.shape());
    let mut rotated = Tensor::zeros(filters.shape());
    rot180_filters(filters, &mut rotated);

    dest.resize_if_needed(c, f * kh * kw);
    for ci in 0..c {
        let row = dest.row_mut(ci);
        let mut k = 0;
        for fi in 0..f {
            for i in 0..kh {
                for j in 0..kw {
                    row[k] = rotated[[fi, ci, i, j]];
                    k += 1;
                }
            }
        }
    }
}

/// Flattens every valid `kh x kw` window of sample `n` into a row laid out as
/// `(channel, ky, kx)`. Rows are ordered by window position, row-major.
pub fn input_to_rows(input: TensorView<'_>, n: usize, window: (usize, usize), dest: &mut RowMatrix) {
    let (_, c, h, w) = dims4(input.shape());
    let (kh, kw) = window;
    assert!(kh <= h && kw <= w, "Window {}x{} larger than input {}x{}", kh, kw, h, w);
    let (oh, ow) = (h - kh + 1, w - kw + 1);

    dest.resize_if_needed(oh * ow, c * kh * kw);
    for x in 0..oh {
        for y in 0..ow {
            let row = dest.row_mut(x * ow + y);
            let mut k = 0;
            for ci in 0..c {
                for i in 0..kh {
                    for j in 0..kw {
                        row[k] = input[[n, ci, x + i, y + j]];
                        k += 1;
                    }
                }
            }
        }
    }
}

/// One row per output channel holding that channel's delta map for sample `n`.
pub fn deltas_to_rows(delta: TensorView<'_>, n: usize, dest: &mut RowMatrix) {
    let (_, f, oh, ow) = dims4(delta.shape());
    dest.resize_if_needed(f, oh * ow);
    let sample = delta.sample(n);
    for fi in 0..f {
        dest.row_mut(fi).copy_from_slice(&sample[fi * oh * ow..(fi + 1) * oh * ow]);
    }
}

/// Rows used to correlate input against the output delta: one row per
/// `(channel, ky, kx)` filter tap, each holding the `oh x ow` input window that
/// tap sees across all output positions.
pub fn input_to_rows_for_gradients(
    input: TensorView<'_>,
    n: usize,
    out_window: (usize, usize),
    dest: &mut RowMatrix,
) {
    let (_, c, h, w) = dims4(input.shape());
    let (oh, ow) = out_window;
    assert!(oh <= h && ow <= w, "Output window {}x{} larger than input {}x{}", oh, ow, h, w);
    let (kh, kw) = (h - oh + 1, w - ow + 1);

    dest.resize_if_needed(c * kh * kw, oh * ow);
    for ci in 0..c {
        for x in 0..kh {
            for y in 0..kw {
                let row = dest.row_mut((ci * kh + x) * kw + y);
                for i in 0..oh {
                    for j in 0..ow {
                        row[i * ow + j] = input[[n, ci, x + i, y + j]];
                    }
                }
            }
        }
    }
}

fn dims4(shape: Shape) -> (usize, usize, usize, usize) {
    assert_eq!(shape.rank(), 4, "Expected a rank 4 tensor, got {}", shape);
    let d = shape.dims();
    (d[0], d[1], d[2], d[3])
}

//! Dense numeric kernels used by the layers
//!
//! The inner loops are unrolled in lanes of eight, then two, then one element so
//! the compiler can vectorize them. Reassociating the sums this way changes the
//! last bits of the result, so callers compare against sequential sums with a
//! relative tolerance.

/// Sum of elementwise products of two equally long slices.
///
/// # Panics
///
/// Panics if the slices have different lengths.
///
/// # Examples
///
/// ```
/// use rust_cnn_engine::utils::kernels::dot;
///
/// assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
/// ```
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "dot operands must have the same length");

    let mut lanes = [0.0f64; 8];
    let mut a8 = a.chunks_exact(8);
    let mut b8 = b.chunks_exact(8);
    for (x, y) in (&mut a8).zip(&mut b8) {
        for k in 0..8 {
            lanes[k] += x[k] * y[k];
        }
    }

    let (ra, rb) = (a8.remainder(), b8.remainder());
    let mut a2 = ra.chunks_exact(2);
    let mut b2 = rb.chunks_exact(2);
    let mut pair = [0.0f64; 2];
    for (x, y) in (&mut a2).zip(&mut b2) {
        pair[0] += x[0] * y[0];
        pair[1] += x[1] * y[1];
    }

    let mut sum = lanes.iter().sum::<f64>() + pair[0] + pair[1];
    for (x, y) in a2.remainder().iter().zip(b2.remainder()) {
        sum += x * y;
    }
    sum
}

/// Writes `a[i] * scalar` into `out[i]`.
///
/// # Panics
///
/// Panics if `out` is shorter than `a`.
pub fn scale(a: &[f64], scalar: f64, out: &mut [f64]) {
    assert!(out.len() >= a.len(), "scale output buffer too small");
    let mut o8 = out.chunks_exact_mut(8);
    let mut a8 = a.chunks_exact(8);
    for (o, x) in (&mut o8).zip(&mut a8) {
        for k in 0..8 {
            o[k] = x[k] * scalar;
        }
    }
    for (o, x) in o8.into_remainder().iter_mut().zip(a8.remainder()) {
        *o = x * scalar;
    }
}

/// Multiplies every element of `a` by `scalar` in place.
pub fn scale_in_place(a: &mut [f64], scalar: f64) {
    for v in a.iter_mut() {
        *v *= scalar;
    }
}

/// Flattened outer product: `out[i * b.len() + j] = a[i] * b[j]`.
///
/// # Panics
///
/// Panics if `out.len() != a.len() * b.len()`.
pub fn kronecker(a: &[f64], b: &[f64], out: &mut [f64]) {
    assert_eq!(out.len(), a.len() * b.len(), "kronecker output has wrong length");
    if b.is_empty() {
        return;
    }
    for (row, &x) in out.chunks_exact_mut(b.len()).zip(a) {
        scale(b, x, row);
    }
}

/// `a[i] += b[i]` over two equally long slices.
pub fn add_assign(a: &mut [f64], b: &[f64]) {
    assert_eq!(a.len(), b.len(), "add_assign operands must have the same length");
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
}

/// Optional bias added by [`rows_product`].
#[derive(Debug, Clone, Copy)]
pub enum RowBias<'a> {
    None,
    /// `bias[i]` is added to every entry of output row `i`.
    PerRowOfA(&'a [f64]),
    /// `bias[j]` is added to every entry of output column `j`.
    PerRowOfB(&'a [f64]),
}

/// Row-against-row matrix product.
///
/// `a` holds `a_rows` rows and `b` holds `b_rows` rows, all of length `k`
/// (inferred from the buffer lengths). Writes `out[i * b_rows + j] =
/// dot(a_i, b_j) + bias`.
///
/// # Panics
///
/// Panics if the buffers do not divide into the declared rows, if the row
/// lengths differ, or if a bias vector has the wrong length.
pub fn rows_product(
    a: &[f64],
    a_rows: usize,
    b: &[f64],
    b_rows: usize,
    bias: RowBias<'_>,
    out: &mut [f64],
) {
    assert_eq!(out.len(), a_rows * b_rows, "rows_product output has wrong length");
    if a_rows == 0 || b_rows == 0 {
        return;
    }
    assert_eq!(a.len() % a_rows, 0, "rows_product: A does not split into {} rows", a_rows);
    let k = a.len() / a_rows;
    assert_eq!(b.len(), b_rows * k, "rows_product: row lengths of A and B differ");
    match bias {
        RowBias::PerRowOfA(v) => assert_eq!(v.len(), a_rows, "row bias has wrong length"),
        RowBias::PerRowOfB(v) => assert_eq!(v.len(), b_rows, "column bias has wrong length"),
        RowBias::None => {}
    }

    for (i, out_row) in out.chunks_exact_mut(b_rows).enumerate() {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, o) in out_row.iter_mut().enumerate() {
            let mut v = dot(a_row, &b[j * k..(j + 1) * k]);
            match bias {
                RowBias::PerRowOfA(bv) => v += bv[i],
                RowBias::PerRowOfB(bv) => v += bv[j],
                RowBias::None => {}
            }
            *o = v;
        }
    }
}

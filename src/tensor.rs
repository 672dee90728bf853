//! Shape-described views over flat `f64` buffers
//!
//! All tensors in the engine are row-major: the last axis varies fastest. A
//! [`Shape`] carries between one and four axes. Layers see their input through a
//! [`TensorView`] borrowed from the previous layer's output and write into an
//! owned [`Tensor`] held by their context.
//!
//! Axis-count mismatches always panic. Per-axis bounds are checked in debug
//! builds only.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Maximum number of axes a shape may carry.
pub const MAX_RANK: usize = 4;

/// Ordered list of one to four axis sizes.
///
/// # Example
///
/// ```ignore
/// use rust_cnn_engine::tensor::Shape;
///
/// let s = Shape::d3(1, 28, 28);
/// assert_eq!(s.flatten_size(), 784);
/// assert_eq!(s.with_batch(32).dims(), &[32, 1, 28, 28]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    dims: [usize; MAX_RANK],
    rank: usize,
}

impl Shape {
    pub const fn d1(a: usize) -> Self {
        Self { dims: [a, 0, 0, 0], rank: 1 }
    }

    pub const fn d2(a: usize, b: usize) -> Self {
        Self { dims: [a, b, 0, 0], rank: 2 }
    }

    pub const fn d3(a: usize, b: usize, c: usize) -> Self {
        Self { dims: [a, b, c, 0], rank: 3 }
    }

    pub const fn d4(a: usize, b: usize, c: usize, d: usize) -> Self {
        Self { dims: [a, b, c, d], rank: 4 }
    }

    /// Builds a shape from a slice of axis sizes.
    ///
    /// # Panics
    ///
    /// Panics if `dims` is empty or longer than [`MAX_RANK`].
    pub fn new(dims: &[usize]) -> Self {
        assert!(
            !dims.is_empty() && dims.len() <= MAX_RANK,
            "Shape rank must be between 1 and {}, got {}",
            MAX_RANK,
            dims.len()
        );
        let mut buf = [0; MAX_RANK];
        buf[..dims.len()].copy_from_slice(dims);
        Self { dims: buf, rank: dims.len() }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.rank]
    }

    /// Size of axis `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is not a valid axis of this shape.
    pub fn dim(&self, k: usize) -> usize {
        assert!(k < self.rank, "Axis {} out of range for rank {}", k, self.rank);
        self.dims[k]
    }

    /// Product of all axis sizes.
    pub fn flatten_size(&self) -> usize {
        self.dims().iter().product()
    }

    /// Prepends a batch axis of size `n`.
    ///
    /// # Panics
    ///
    /// Panics if the shape already has [`MAX_RANK`] axes.
    pub fn with_batch(&self, n: usize) -> Self {
        assert!(self.rank < MAX_RANK, "Cannot add a batch axis to rank {} shape", self.rank);
        let mut dims = [0; MAX_RANK];
        dims[0] = n;
        dims[1..=self.rank].copy_from_slice(self.dims());
        Self { dims, rank: self.rank + 1 }
    }

    /// Drops the leading (batch) axis. A rank-1 shape becomes `[1]`.
    pub fn without_batch(&self) -> Self {
        if self.rank == 1 {
            return Self::d1(1);
        }
        Self::new(&self.dims[1..self.rank])
    }

    /// Row-major flat offset of a full index.
    ///
    /// # Panics
    ///
    /// Panics if `N` differs from the rank. Each coordinate is checked against
    /// its axis in debug builds.
    #[inline]
    pub fn offset<const N: usize>(&self, index: [usize; N]) -> usize {
        assert_eq!(N, self.rank, "Index arity {} does not match rank {}", N, self.rank);
        let mut off = 0;
        for (k, &i) in index.iter().enumerate() {
            debug_assert!(
                i < self.dims[k],
                "Index {} out of bounds for axis {} of size {}",
                i,
                k,
                self.dims[k]
            );
            off = off * self.dims[k] + i;
        }
        off
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (k, d) in self.dims().iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// Read-only view pairing a borrowed buffer with a shape.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    data: &'a [f64],
    shape: Shape,
}

impl<'a> TensorView<'a> {
    /// # Panics
    ///
    /// Panics if the shape's flattened size differs from `data.len()`.
    pub fn new(data: &'a [f64], shape: Shape) -> Self {
        assert_eq!(
            shape.flatten_size(),
            data.len(),
            "Shape {} does not cover a buffer of {} values",
            shape,
            data.len()
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn dim(&self, k: usize) -> usize {
        self.shape.dim(k)
    }

    pub fn data(&self) -> &'a [f64] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same buffer seen through a different shape of equal flattened size.
    pub fn reshaped(&self, shape: Shape) -> TensorView<'a> {
        TensorView::new(self.data, shape)
    }

    /// Number of entries along the leading axis.
    pub fn batch_size(&self) -> usize {
        self.shape.dim(0)
    }

    /// Contiguous slice holding entry `n` of the leading axis.
    pub fn sample(&self, n: usize) -> &'a [f64] {
        let stride = self.data.len() / self.batch_size().max(1);
        &self.data[n * stride..(n + 1) * stride]
    }
}

impl<'a, const N: usize> Index<[usize; N]> for TensorView<'a> {
    type Output = f64;

    #[inline]
    fn index(&self, index: [usize; N]) -> &f64 {
        &self.data[self.shape.offset(index)]
    }
}

/// Mutable view pairing a borrowed buffer with a shape.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    data: &'a mut [f64],
    shape: Shape,
}

impl<'a> TensorViewMut<'a> {
    /// # Panics
    ///
    /// Panics if the shape's flattened size differs from `data.len()`.
    pub fn new(data: &'a mut [f64], shape: Shape) -> Self {
        assert_eq!(
            shape.flatten_size(),
            data.len(),
            "Shape {} does not cover a buffer of {} values",
            shape,
            data.len()
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn dim(&self, k: usize) -> usize {
        self.shape.dim(k)
    }

    pub fn data(&self) -> &[f64] {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut *self.data
    }

    /// Read-only reborrow of the same storage.
    pub fn as_view(&self) -> TensorView<'_> {
        TensorView { data: &*self.data, shape: self.shape }
    }
}

impl<'a, const N: usize> Index<[usize; N]> for TensorViewMut<'a> {
    type Output = f64;

    #[inline]
    fn index(&self, index: [usize; N]) -> &f64 {
        &self.data[self.shape.offset(index)]
    }
}

impl<'a, const N: usize> IndexMut<[usize; N]> for TensorViewMut<'a> {
    #[inline]
    fn index_mut(&mut self, index: [usize; N]) -> &mut f64 {
        let off = self.shape.offset(index);
        &mut self.data[off]
    }
}

/// Owned buffer with a shape, resized lazily as batch sizes change.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Shape,
}

impl Tensor {
    pub fn zeros(shape: Shape) -> Self {
        Self { data: vec![0.0; shape.flatten_size()], shape }
    }

    /// # Panics
    ///
    /// Panics if the shape's flattened size differs from `data.len()`.
    pub fn from_vec(data: Vec<f64>, shape: Shape) -> Self {
        assert_eq!(
            shape.flatten_size(),
            data.len(),
            "Shape {} does not cover a buffer of {} values",
            shape,
            data.len()
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn dim(&self, k: usize) -> usize {
        self.shape.dim(k)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Adopts `shape` and zero-fills. The allocation is reused when large enough.
    pub fn reset(&mut self, shape: Shape) {
        self.shape = shape;
        self.data.clear();
        self.data.resize(shape.flatten_size(), 0.0);
    }

    /// Adopts `shape` without touching the contents unless the size changes.
    pub fn resize(&mut self, shape: Shape) {
        if self.shape != shape {
            self.data.resize(shape.flatten_size(), 0.0);
            self.shape = shape;
        }
    }

    /// Reinterprets the buffer under a shape of equal flattened size.
    ///
    /// # Panics
    ///
    /// Panics if the flattened sizes differ.
    pub fn reshape(&mut self, shape: Shape) {
        assert_eq!(
            shape.flatten_size(),
            self.data.len(),
            "Cannot reshape {} values to {}",
            self.data.len(),
            shape
        );
        self.shape = shape;
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView { data: &self.data, shape: self.shape }
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorViewMut { data: &mut self.data, shape: self.shape }
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl<const N: usize> Index<[usize; N]> for Tensor {
    type Output = f64;

    #[inline]
    fn index(&self, index: [usize; N]) -> &f64 {
        &self.data[self.shape.offset(index)]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Tensor {
    #[inline]
    fn index_mut(&mut self, index: [usize; N]) -> &mut f64 {
        let off = self.shape.offset(index);
        &mut self.data[off]
    }
}

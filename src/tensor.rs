//! Batched Tensors for Layer Propagation
//!
//! This module provides the tensor type that flows in and out of every layer.
//! A tensor is a flat row-major buffer with shape and stride information. The
//! layers in this crate only ever look at it as a batch of samples:
//!
//! - **Dimension 0** is the sample (batch) index
//! - **Remaining dimensions** are flattened into the per-sample feature count
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, features]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Example
//!
//! ```rust
//! use gatenet::Tensor;
//!
//! // Two samples with three features each
//! let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! assert_eq!(tensor.batch_size(), 2);
//! assert_eq!(tensor.features(), 3);
//! assert_eq!(tensor.at(1, 2), 6.0);
//! ```
//!
//! ## Ownership
//!
//! Layers never allocate tensors for the caller. They read the input tensors
//! they are handed and write into caller-owned output and gradient tensors in
//! place. The single exception is [`Tensor::resize_like`], which dropout uses
//! to make its output match the shape of its input.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// A batched multi-dimensional array
///
/// Tensors store data in a contiguous `Vec<f32>` with shape and stride
/// information. All operations use row-major (C-style) memory layout, so the
/// features of one sample are always contiguous.
///
/// # Fields
///
/// - `data`: Flat array of f32 values
/// - `shape`: Dimensions (e.g., `[4, 16]` for 4 samples of 16 features)
/// - `strides`: Step sizes for each dimension (computed from shape)
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Arguments
    ///
    /// * `data` - Flat vector of values
    /// * `shape` - Dimensions of the tensor
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    ///
    /// # Example
    ///
    /// ```rust
    /// # use gatenet::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    ///
    /// # Example
    ///
    /// ```rust
    /// # use gatenet::Tensor;
    /// let tensor = Tensor::zeros(vec![3, 4]);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// Create a `[rows.len(), width]` tensor from per-sample rows
    ///
    /// # Panics
    ///
    /// Panics if the rows do not all have the same length
    ///
    /// # Example
    ///
    /// ```rust
    /// # use gatenet::Tensor;
    /// let tensor = Tensor::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// assert_eq!(tensor.sample(1), &[3.0, 4.0]);
    /// ```
    pub fn from_rows(rows: &[&[f32]]) -> Self {
        let width = rows.first().map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            assert_eq!(row.len(), width, "All rows must have the same length");
            data.extend_from_slice(row);
        }
        Self::new(data, vec![rows.len(), width])
    }

    /// Create a tensor with normally distributed values
    ///
    /// Values are drawn from `N(0, std²)` using a generator seeded with
    /// `seed`, so the same arguments always produce the same tensor.
    ///
    /// # Panics
    ///
    /// Panics if `std` is negative or not finite
    pub fn randn(shape: Vec<usize>, std: f32, seed: u64) -> Self {
        assert!(
            std.is_finite() && std >= 0.0,
            "Standard deviation must be finite and non-negative, got {}",
            std
        );
        let mut rng = StdRng::seed_from_u64(seed);
        let size: usize = shape.iter().product();
        let data = (0..size)
            .map(|_| {
                let z: f32 = StandardNormal.sample(&mut rng);
                z * std
            })
            .collect();
        Self::new(data, shape)
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Number of samples (dimension 0)
    ///
    /// A rank-1 tensor is treated as a single sample, which is how weight and
    /// bias parameter vectors are viewed.
    pub fn batch_size(&self) -> usize {
        match self.shape.len() {
            0 => 0,
            1 => 1,
            _ => self.shape[0],
        }
    }

    /// Number of features per sample (product of all but the first dimension)
    pub fn features(&self) -> usize {
        match self.shape.len() {
            0 => 0,
            1 => self.shape[0],
            _ => self.shape[1..].iter().product(),
        }
    }

    /// Read the value of `unit` in `sample`
    #[inline]
    pub fn at(&self, sample: usize, unit: usize) -> f32 {
        self.data[sample * self.features() + unit]
    }

    /// Mutable access to the value of `unit` in `sample`
    #[inline]
    pub fn at_mut(&mut self, sample: usize, unit: usize) -> &mut f32 {
        let features = self.features();
        &mut self.data[sample * features + unit]
    }

    /// Contiguous features of one sample
    pub fn sample(&self, sample: usize) -> &[f32] {
        let features = self.features();
        &self.data[sample * features..(sample + 1) * features]
    }

    /// Mutable contiguous features of one sample
    pub fn sample_mut(&mut self, sample: usize) -> &mut [f32] {
        let features = self.features();
        &mut self.data[sample * features..(sample + 1) * features]
    }

    /// Set every element to `value`
    ///
    /// Gradient buffers accumulate across backward calls; callers use
    /// `fill(0.0)` to start a fresh accumulation pass.
    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Reshape tensor to new shape
    ///
    /// Total number of elements must remain the same.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use gatenet::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let reshaped = tensor.reshape(&[3, 2]);
    /// assert_eq!(reshaped.shape, vec![3, 2]);
    /// ```
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            self.data.len(),
            new_size,
            "Cannot reshape: element count mismatch"
        );
        Tensor::new(self.data.clone(), new_shape.to_vec())
    }

    /// Reshape in place so that this tensor has the same shape as `other`
    ///
    /// Existing values are kept when the element count is unchanged. When it
    /// changes, the buffer is resized and new elements are zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use gatenet::Tensor;
    /// let input = Tensor::zeros(vec![4, 3]);
    /// let mut output = Tensor::zeros(vec![1, 3]);
    /// output.resize_like(&input);
    /// assert_eq!(output.shape, vec![4, 3]);
    /// assert_eq!(output.data.len(), 12);
    /// ```
    pub fn resize_like(&mut self, other: &Tensor) {
        if self.shape == other.shape {
            return;
        }
        self.data.resize(other.data.len(), 0.0);
        self.shape = other.shape.clone();
        self.strides = Self::compute_strides(&self.shape);
    }
}

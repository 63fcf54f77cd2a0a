//! Dense 2-D Tensors
//!
//! This module provides the minimal matrix type the vision transformer is built
//! on. Every value in the network (images, patches, token sequences, weights,
//! gradients) is a `Tensor` with a fixed number of rows and columns.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: `rows × cols`, fixed at construction
//! - **Value semantics**: Cloning copies the data; tensors never alias
//!
//! ## Shape Contracts
//!
//! Binary operations require exact dimension compatibility:
//!
//! ```text
//! add / sub / hadamard:  [r, c] ∘ [r, c] → [r, c]
//! matmul:                [m, k] @ [k, n] → [m, n]
//! ```
//!
//! A violation is a programming error, not a runtime condition, so every
//! shape-checking operation panics with a message starting with
//! `ShapeMismatch`.
//!
//! ## Example
//!
//! ```rust
//! use tinyvit::Tensor;
//!
//! let a = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
//! let t = a.transpose();
//! assert_eq!(t.data, vec![1.0, 3.0, 2.0, 4.0]);
//!
//! let product = a.matmul(&Tensor::identity(2));
//! assert_eq!(product.data, a.data);
//! ```
//!
//! ## Parallelism
//!
//! Element-wise operations and the rows of a matrix product are computed with
//! Rayon. Each output element is still produced by a single sequential
//! reduction, so results are bit-identical to a single-threaded evaluation.

use rand::Rng;
use rayon::prelude::*;

use crate::rng::randn;

/// Norm floor used by [`Tensor::row_normalize`]
pub const ROW_NORM_EPS: f32 = 1e-8;

/// A dense row-major matrix of `f32` values
///
/// # Fields
///
/// - `rows`: Number of rows
/// - `cols`: Number of columns
/// - `data`: Flat storage, `data[i * cols + j]` is element `(i, j)`
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Row-major element storage (length `rows * cols`)
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor from flat row-major data
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "ShapeMismatch: data length ({}) doesn't match shape [{}, {}]",
            data.len(),
            rows,
            cols
        );
        Self { rows, cols, data }
    }

    /// Create a tensor filled with zeros
    ///
    /// ```rust
    /// # use tinyvit::Tensor;
    /// let t = Tensor::zeros(3, 4);
    /// assert_eq!(t.data.len(), 12);
    /// assert!(t.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create a tensor where every element equals `value`
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a tensor from nested rows
    ///
    /// # Panics
    ///
    /// Panics if `rows` is empty or the rows have different lengths
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        assert!(!rows.is_empty(), "ShapeMismatch: cannot build a tensor from zero rows");
        let cols = rows[0].len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(
                row.len(),
                cols,
                "ShapeMismatch: row {} has {} columns, expected {}",
                i,
                row.len(),
                cols
            );
            data.extend_from_slice(row);
        }
        Self::new(data, rows.len(), cols)
    }

    /// The `n × n` identity matrix
    pub fn identity(n: usize) -> Self {
        let mut result = Self::zeros(n, n);
        for i in 0..n {
            result.data[i * n + i] = 1.0;
        }
        result
    }

    /// `(rows, cols)` pair
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Element `(i, j)`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.cols + j]
    }

    /// Overwrite element `(i, j)`
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.cols + j] = value;
    }

    /// Borrow row `i` as a slice
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Set every element to zero in place
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|x| *x = 0.0);
    }

    fn assert_same_shape(&self, other: &Tensor, op: &str) {
        assert!(
            self.rows == other.rows && self.cols == other.cols,
            "ShapeMismatch: {} requires equal shapes, got [{}, {}] and [{}, {}]",
            op,
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
    }

    /// Element-wise addition
    pub fn add(&self, other: &Tensor) -> Tensor {
        self.assert_same_shape(other, "add");
        let data = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// Element-wise subtraction
    pub fn sub(&self, other: &Tensor) -> Tensor {
        self.assert_same_shape(other, "sub");
        let data = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// Element-wise (Hadamard) product
    pub fn hadamard(&self, other: &Tensor) -> Tensor {
        self.assert_same_shape(other, "hadamard");
        let data = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// In-place element-wise accumulation: `self += other`
    ///
    /// Gradient accumulators use this to avoid allocating a new tensor per sample.
    pub fn add_assign(&mut self, other: &Tensor) {
        self.assert_same_shape(other, "add_assign");
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Multiply all elements by a scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let data = self.data.par_iter().map(|&x| x * scalar).collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// Apply an element-wise function to every entry
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(data, self.rows, self.cols)
    }

    /// Matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]`, the result is
    /// `[m, n]` with `C[i,j] = Σ_l A[i,l] · B[l,j]`.
    ///
    /// This is the straightforward `O(m·k·n)` triple loop without cache
    /// blocking. Output rows are distributed across threads; the reduction
    /// for each element stays sequential.
    ///
    /// # Panics
    ///
    /// Panics if `self.cols != other.rows`
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.cols, other.rows,
            "ShapeMismatch: matmul [{}, {}] @ [{}, {}]",
            self.rows, self.cols, other.rows, other.cols
        );

        let m = self.rows;
        let k = self.cols;
        let n = other.cols;
        let mut result = vec![0.0; m * n];

        if n == 0 {
            return Tensor::new(result, m, n);
        }

        let row_product = |i: usize, out_row: &mut [f32]| {
            for (j, out) in out_row.iter_mut().enumerate() {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += self.data[i * k + l] * other.data[l * n + j];
                }
                *out = sum;
            }
        };

        // Small products are not worth the thread hand-off
        if m * n * k < 1_000 {
            for (i, out_row) in result.chunks_mut(n).enumerate() {
                row_product(i, out_row);
            }
        } else {
            result
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_product(i, out_row));
        }

        Tensor::new(result, m, n)
    }

    /// Transpose rows and columns
    ///
    /// ```rust
    /// # use tinyvit::Tensor;
    /// let t = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).transpose();
    /// assert_eq!(t, Tensor::from_rows(&[vec![1.0, 3.0], vec![2.0, 4.0]]));
    /// ```
    pub fn transpose(&self) -> Tensor {
        let mut result = vec![0.0; self.data.len()];
        for i in 0..self.rows {
            for j in 0..self.cols {
                result[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Tensor::new(result, self.cols, self.rows)
    }

    /// Copy the sub-block `[r0, r1) × [c0, c1)` into a new tensor
    ///
    /// # Panics
    ///
    /// Panics if the range is inverted or exceeds the tensor bounds
    pub fn slice(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> Tensor {
        assert!(
            r0 <= r1 && r1 <= self.rows && c0 <= c1 && c1 <= self.cols,
            "ShapeMismatch: slice [{}..{}, {}..{}] out of bounds for [{}, {}]",
            r0,
            r1,
            c0,
            c1,
            self.rows,
            self.cols
        );
        let cols = c1 - c0;
        let mut data = Vec::with_capacity((r1 - r0) * cols);
        for i in r0..r1 {
            data.extend_from_slice(&self.data[i * self.cols + c0..i * self.cols + c1]);
        }
        Tensor::new(data, r1 - r0, cols)
    }

    /// Overwrite the block starting at `(r0, c0)` with `src`
    ///
    /// # Panics
    ///
    /// Panics if `src` does not fit inside `self` at that offset
    pub fn set_slice(&mut self, r0: usize, c0: usize, src: &Tensor) {
        assert!(
            r0 + src.rows <= self.rows && c0 + src.cols <= self.cols,
            "ShapeMismatch: cannot place [{}, {}] at ({}, {}) inside [{}, {}]",
            src.rows,
            src.cols,
            r0,
            c0,
            self.rows,
            self.cols
        );
        for i in 0..src.rows {
            let dst = (r0 + i) * self.cols + c0;
            self.data[dst..dst + src.cols].copy_from_slice(src.row(i));
        }
    }

    /// L2-normalize each row
    ///
    /// ```text
    /// out[i, j] = x[i, j] / √(Σ_j x[i, j]² + 1e-8)
    /// ```
    pub fn row_normalize(&self) -> Tensor {
        let cols = self.cols;
        let mut data = self.data.clone();
        if cols == 0 {
            return Tensor::new(data, self.rows, cols);
        }
        data.par_chunks_mut(cols).for_each(|row| {
            let sum_sq: f32 = row.iter().map(|&x| x * x).sum();
            let norm = (sum_sq + ROW_NORM_EPS).sqrt();
            row.iter_mut().for_each(|x| *x /= norm);
        });
        Tensor::new(data, self.rows, cols)
    }

    /// Xavier (Glorot) normal initialization in place
    ///
    /// Samples every element from `N(0, √(2 / (rows + cols)))`.
    pub fn xavier_init<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let std = (2.0 / (self.rows + self.cols) as f32).sqrt();
        for value in &mut self.data {
            *value = randn(rng, 0.0, std);
        }
    }

    /// He (Kaiming) normal initialization in place
    ///
    /// Samples every element from `N(0, √(2 / rows))`.
    pub fn he_init<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let std = (2.0 / self.rows as f32).sqrt();
        for value in &mut self.data {
            *value = randn(rng, 0.0, std);
        }
    }

    /// Column index of the largest value in row `i`
    ///
    /// Ties resolve to the lowest index.
    pub fn argmax_row(&self, i: usize) -> usize {
        let row = self.row(i);
        let mut best = 0;
        for (j, &value) in row.iter().enumerate().skip(1) {
            if value > row[best] {
                best = j;
            }
        }
        best
    }

    /// Largest absolute value in the tensor (0 for an empty tensor)
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }
}

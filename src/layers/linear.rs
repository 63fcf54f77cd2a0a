//! Linear Layer (Fully Connected)
//!
//! The linear layer performs an affine transformation, applied to each row of
//! the input independently:
//!
//! ```text
//! Input:  x [n, in_features]
//! Weight: W [out_features, in_features]
//! Bias:   b [out_features, 1]
//! Output: y = x @ Wᵀ + bᵀ   [n, out_features]
//! ```
//!
//! ## Backward Pass
//!
//! With the weight stored as `[out, in]`, the chain rule gives:
//!
//! ```text
//! grad_W = grad_yᵀ @ x          [out, in]
//! grad_b = Σ_rows grad_y        [out, 1]
//! grad_x = grad_y @ W           [n, in]
//! ```
//!
//! ## State
//!
//! The layer caches its last forward input and *accumulates* weight and bias
//! gradients across backward calls. [`Linear::update`] applies a clipped SGD
//! step and clears the accumulators; [`Linear::zero_grad`] clears them without
//! stepping.
//!
//! ## Initialization
//!
//! - Weights: Xavier normal, `N(0, √(2/(in+out)))`
//! - Bias: zero

use rand::Rng;

use crate::optimizer::sgd_step;
use crate::tensor::Tensor;

/// Affine layer with cached input and accumulated gradients
pub struct Linear {
    pub weight: Tensor,
    pub bias: Tensor,
    pub weight_grad: Tensor,
    pub bias_grad: Tensor,
    last_input: Option<Tensor>,
}

impl Linear {
    /// Create a new linear layer with Xavier initialization
    ///
    /// # Arguments
    ///
    /// * `in_features` - Input dimension
    /// * `out_features` - Output dimension
    /// * `rng` - Generator for the weight initialization
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let mut weight = Tensor::zeros(out_features, in_features);
        weight.xavier_init(rng);
        Self::from_parts(weight, Tensor::zeros(out_features, 1))
    }

    /// Build a layer from existing weight `[out, in]` and bias `[out, 1]`
    ///
    /// # Panics
    ///
    /// Panics if the bias is not a column matching the weight's row count
    pub fn from_parts(weight: Tensor, bias: Tensor) -> Self {
        assert_eq!(
            (bias.rows, bias.cols),
            (weight.rows, 1),
            "ShapeMismatch: bias must be [{}, 1], got [{}, {}]",
            weight.rows,
            bias.rows,
            bias.cols
        );
        Self {
            weight_grad: Tensor::zeros(weight.rows, weight.cols),
            bias_grad: Tensor::zeros(bias.rows, 1),
            weight,
            bias,
            last_input: None,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.cols
    }

    pub fn out_features(&self) -> usize {
        self.weight.rows
    }

    /// Forward pass: `y = x @ Wᵀ + b`, caching `x`
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let mut y = x.matmul(&self.weight.transpose());
        let out = self.out_features();
        for row in y.data.chunks_mut(out) {
            for (value, &b) in row.iter_mut().zip(&self.bias.data) {
                *value += b;
            }
        }
        self.last_input = Some(x.clone());
        y
    }

    /// Backward pass
    ///
    /// Accumulates `grad_W += grad_outᵀ @ x` and `grad_b += Σ_rows grad_out`,
    /// then returns the gradient with respect to the input, `grad_out @ W`.
    ///
    /// # Panics
    ///
    /// Panics if called before any forward pass
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        let Some(input) = self.last_input.as_ref() else {
            panic!("Linear::backward called before forward");
        };

        assert_eq!(
            grad_out.cols,
            self.out_features(),
            "ShapeMismatch: grad_out has {} columns, layer has {} outputs",
            grad_out.cols,
            self.out_features()
        );

        self.weight_grad
            .add_assign(&grad_out.transpose().matmul(input));
        for row in grad_out.data.chunks(grad_out.cols.max(1)) {
            for (acc, &g) in self.bias_grad.data.iter_mut().zip(row) {
                *acc += g;
            }
        }

        grad_out.matmul(&self.weight)
    }

    /// Clipped SGD step on weight and bias; clears both gradients
    pub fn update(&mut self, learning_rate: f32) {
        sgd_step(&mut self.weight, &mut self.weight_grad, learning_rate);
        sgd_step(&mut self.bias, &mut self.bias_grad, learning_rate);
    }

    /// Reset accumulated gradients without touching the parameters
    pub fn zero_grad(&mut self) {
        self.weight_grad.fill_zero();
        self.bias_grad.fill_zero();
    }

    /// Number of learnable scalars (weights + biases)
    pub fn parameter_count(&self) -> usize {
        self.weight.data.len() + self.bias.data.len()
    }
}

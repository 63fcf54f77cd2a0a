//! Activation Functions
//!
//! Element-wise nonlinearities and their derivatives for backpropagation,
//! plus the row-wise softmax used by the classification loss.
//!
//! ## GELU (Gaussian Error Linear Unit)
//!
//! GELU is used in the transformer MLP instead of ReLU because it provides
//! smoother gradients.
//!
//! ### Approximation
//!
//! We use the tanh approximation, not the exact erf form:
//!
//! ```text
//! GELU(x) ≈ 0.5 × x × (1 + tanh(√(2/π) × (x + 0.044715 × x³)))
//! ```
//!
//! The derivative is the analytic derivative of that same approximation:
//!
//! ```text
//! t       = tanh(√(2/π) × (x + 0.044715 × x³))
//! GELU'(x) = 0.5 × (1 + t) + 0.5 × x × (1 − t²) × √(2/π) × (1 + 0.134145 × x²)
//! ```
//!
//! where `0.134145 = 3 × 0.044715`.
//!
//! ## ReLU
//!
//! ```text
//! ReLU(x)  = max(0, x)
//! ReLU'(x) = 1 if x > 0 else 0
//! ```
//!
//! ## Softmax
//!
//! Softmax runs per row and subtracts the row maximum before exponentiating:
//!
//! ```text
//! softmax(x)[i] = exp(x[i] - max(x)) / Σ_j exp(x[j] - max(x))
//! ```
//!
//! Subtracting the maximum prevents overflow in `exp()` without changing the
//! result, since the factor cancels between numerator and denominator.

use crate::tensor::Tensor;
use rayon::prelude::*;

const SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044715;
const GELU_COEFF_DERIV: f32 = 0.134145;

/// Rectified linear unit
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Derivative of [`relu`] (0 at the origin)
pub fn relu_derivative(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// GELU, tanh approximation
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x)).tanh())
}

/// Analytic derivative of the tanh-approximated [`gelu`]
pub fn gelu_derivative(x: f32) -> f32 {
    let tanh_val = (SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x)).tanh();
    let sech_sq = 1.0 - tanh_val * tanh_val;
    0.5 * (1.0 + tanh_val) + 0.5 * x * sech_sq * SQRT_2_OVER_PI * (1.0 + GELU_COEFF_DERIV * x * x)
}

/// Element-wise activation strategy
///
/// Layers hold one of these instead of a function pointer; `apply` and
/// `derivative` dispatch to the scalar functions above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Gelu,
}

impl Activation {
    /// Evaluate the activation at `x`
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => relu(x),
            Activation::Gelu => gelu(x),
        }
    }

    /// Evaluate the activation's derivative at `x`
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Relu => relu_derivative(x),
            Activation::Gelu => gelu_derivative(x),
        }
    }

    /// Apply the activation to every element of `x`
    pub fn forward(self, x: &Tensor) -> Tensor {
        apply(x, move |v| self.apply(v))
    }

    /// Backward pass: `grad_out ⊙ f'(pre_activation)`
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from the next layer
    /// * `pre_activation` - Input the activation saw during the forward pass
    pub fn backward(self, grad_out: &Tensor, pre_activation: &Tensor) -> Tensor {
        grad_out.hadamard(&apply(pre_activation, move |v| self.derivative(v)))
    }
}

/// Map any element-wise function over a tensor
pub fn apply<F>(input: &Tensor, f: F) -> Tensor
where
    F: Fn(f32) -> f32 + Sync + Send,
{
    input.map(f)
}

/// Row-wise numerically stable softmax
///
/// Each output row is non-negative and sums to 1.
pub fn softmax(input: &Tensor) -> Tensor {
    let cols = input.cols;
    let mut data = input.data.clone();
    if cols == 0 {
        return Tensor::new(data, input.rows, cols);
    }

    data.par_chunks_mut(cols).for_each(|row| {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mut sum = 0.0;
        for value in row.iter_mut() {
            *value = (*value - max).exp();
            sum += *value;
        }
        for value in row.iter_mut() {
            *value /= sum;
        }
    });

    Tensor::new(data, input.rows, cols)
}

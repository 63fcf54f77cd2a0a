//! Layer Normalization
//!
//! Layer normalization standardizes each row (token) to zero mean and unit
//! variance, then applies a learnable scale (gamma) and shift (beta).
//!
//! ## Forward Pass
//!
//! ```text
//! 1. mean   = Σ x / N
//! 2. var    = Σ (x - mean)² / N          (biased estimator)
//! 3. x_norm = (x - mean) / √(var + ε)    ε = 1e-5
//! 4. y      = γ ⊙ x_norm + β
//! ```
//!
//! ## Backward Pass
//!
//! Two behaviors are available, selected by [`GradientMode`]:
//!
//! **Reference**: the gradient passes through unchanged and no gamma/beta
//! gradient is produced. `update` only clears the (always zero) accumulators,
//! so gamma stays 1 and beta stays 0 for the lifetime of the model.
//!
//! **Exact**: the full derivative, including the dependency of every output
//! on the row statistics:
//!
//! ```text
//! grad_γ      = Σ_rows grad_y ⊙ x_norm
//! grad_β      = Σ_rows grad_y
//! grad_x_norm = grad_y ⊙ γ
//! grad_x      = (grad_x_norm - mean(grad_x_norm) - x_norm ⊙ mean(grad_x_norm ⊙ x_norm)) / √(var + ε)
//! ```
//!
//! and `update` applies the same clipped SGD step as the linear layers.

use crate::config::GradientMode;
use crate::optimizer::sgd_step;
use crate::tensor::Tensor;

/// Variance floor inside the square root
pub const LAYER_NORM_EPS: f32 = 1e-5;

/// Per-row layer normalization with learnable scale and shift
pub struct LayerNorm {
    pub gamma: Tensor, // Scale parameter [1, d_model]
    pub beta: Tensor,  // Shift parameter [1, d_model]
    pub gamma_grad: Tensor,
    pub beta_grad: Tensor,
    pub eps: f32,
    mode: GradientMode,
    last_input: Option<Tensor>,
    last_mean: Tensor, // [rows, 1]
    last_var: Tensor,  // [rows, 1]
}

impl LayerNorm {
    /// Create a layer norm over `d_model` features
    ///
    /// gamma starts at 1, beta at 0.
    pub fn new(d_model: usize, mode: GradientMode) -> Self {
        Self {
            gamma: Tensor::filled(1, d_model, 1.0),
            beta: Tensor::zeros(1, d_model),
            gamma_grad: Tensor::zeros(1, d_model),
            beta_grad: Tensor::zeros(1, d_model),
            eps: LAYER_NORM_EPS,
            mode,
            last_input: None,
            last_mean: Tensor::zeros(0, 1),
            last_var: Tensor::zeros(0, 1),
        }
    }

    pub fn d_model(&self) -> usize {
        self.gamma.cols
    }

    pub fn mode(&self) -> GradientMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GradientMode) {
        self.mode = mode;
    }

    /// Per-row mean from the last forward call, shape `[rows, 1]`
    pub fn last_mean(&self) -> &Tensor {
        &self.last_mean
    }

    /// Per-row biased variance from the last forward call, shape `[rows, 1]`
    pub fn last_var(&self) -> &Tensor {
        &self.last_var
    }

    /// Forward pass
    ///
    /// Normalizes every row of `x` (`[rows, d_model]`), caches the row
    /// statistics, and applies the affine transform.
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let d = self.d_model();
        assert_eq!(
            x.cols, d,
            "ShapeMismatch: LayerNorm over {} features got [{}, {}]",
            d, x.rows, x.cols
        );

        let mut mean = Tensor::zeros(x.rows, 1);
        let mut var = Tensor::zeros(x.rows, 1);
        let mut y = Tensor::zeros(x.rows, d);

        for i in 0..x.rows {
            let row = x.row(i);
            let m = row.iter().sum::<f32>() / d as f32;
            let v = row
                .iter()
                .map(|&val| {
                    let diff = val - m;
                    diff * diff
                })
                .sum::<f32>()
                / d as f32;
            mean.data[i] = m;
            var.data[i] = v;

            let inv_std = 1.0 / (v + self.eps).sqrt();
            for j in 0..d {
                let normalized = (row[j] - m) * inv_std;
                y.data[i * d + j] = self.gamma.data[j] * normalized + self.beta.data[j];
            }
        }

        self.last_input = Some(x.clone());
        self.last_mean = mean;
        self.last_var = var;
        y
    }

    /// Backward pass
    ///
    /// In [`GradientMode::Reference`] this returns `grad_out` unchanged.
    /// In [`GradientMode::Exact`] it accumulates gamma/beta gradients and
    /// returns the gradient through the normalization.
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        match self.mode {
            GradientMode::Reference => grad_out.clone(),
            GradientMode::Exact => self.backward_exact(grad_out),
        }
    }

    fn backward_exact(&mut self, grad_out: &Tensor) -> Tensor {
        let Some(x) = self.last_input.as_ref() else {
            panic!("LayerNorm::backward called before forward");
        };
        assert_eq!(
            grad_out.shape(),
            x.shape(),
            "ShapeMismatch: grad_out {:?} vs cached input {:?}",
            grad_out.shape(),
            x.shape()
        );

        let d = self.d_model();
        let mut grad_x = Tensor::zeros(x.rows, d);
        let mut x_norm = vec![0.0; d];
        let mut grad_x_norm = vec![0.0; d];

        for i in 0..x.rows {
            let inv_std = 1.0 / (self.last_var.data[i] + self.eps).sqrt();
            let mean = self.last_mean.data[i];
            let row = x.row(i);
            let grad_row = grad_out.row(i);

            for j in 0..d {
                x_norm[j] = (row[j] - mean) * inv_std;
                grad_x_norm[j] = grad_row[j] * self.gamma.data[j];
                self.gamma_grad.data[j] += grad_row[j] * x_norm[j];
                self.beta_grad.data[j] += grad_row[j];
            }

            // Mean of gradients accounts for the mean dependency,
            // mean of (grad * x_norm) for the variance dependency
            let mean_grad = grad_x_norm.iter().sum::<f32>() / d as f32;
            let mean_grad_x = grad_x_norm
                .iter()
                .zip(&x_norm)
                .map(|(g, xn)| g * xn)
                .sum::<f32>()
                / d as f32;

            for j in 0..d {
                grad_x.data[i * d + j] =
                    (grad_x_norm[j] - mean_grad - x_norm[j] * mean_grad_x) * inv_std;
            }
        }

        grad_x
    }

    /// Parameter update
    ///
    /// Reference mode only clears the accumulators; exact mode applies a
    /// clipped SGD step to gamma and beta.
    pub fn update(&mut self, learning_rate: f32) {
        match self.mode {
            GradientMode::Reference => self.zero_grad(),
            GradientMode::Exact => {
                sgd_step(&mut self.gamma, &mut self.gamma_grad, learning_rate);
                sgd_step(&mut self.beta, &mut self.beta_grad, learning_rate);
            }
        }
    }

    pub fn zero_grad(&mut self) {
        self.gamma_grad.fill_zero();
        self.beta_grad.fill_zero();
    }

    pub fn parameter_count(&self) -> usize {
        self.gamma.data.len() + self.beta.data.len()
    }
}

//! Multi-Layer Perceptron (MLP)
//!
//! The MLP is the feedforward half of each transformer block. Unlike the
//! usual transformer MLP it ends with its own layer normalization.
//!
//! ## Architecture
//!
//! ```text
//! x → fc1 → GELU → fc2 → LayerNorm → y
//! ```
//!
//! ## Expansion Factor
//!
//! The hidden layer is twice as wide as the model:
//! - Input: d_model
//! - Hidden: d_model × 2
//! - Output: d_model
//!
//! ## Backward Pass
//!
//! ```text
//! grad_fc2_out = ln.backward(grad_y)
//! grad_hidden  = fc2.backward(grad_fc2_out) ⊙ GELU'(fc1 output)
//! grad_x       = fc1.backward(grad_hidden)
//! ```

use rand::Rng;

use super::activation::Activation;
use super::layer_norm::LayerNorm;
use super::linear::Linear;
use crate::config::GradientMode;
use crate::tensor::Tensor;

/// Hidden width relative to `d_model`
pub const MLP_EXPANSION: usize = 2;

/// Feedforward network with GELU activation and trailing LayerNorm
pub struct Mlp {
    pub fc1: Linear,
    pub fc2: Linear,
    pub ln: LayerNorm,
    activation: Activation,
    hidden: Option<Tensor>, // fc1 output, needed for GELU backward
}

impl Mlp {
    /// Create a new MLP with 2x expansion
    pub fn new<R: Rng + ?Sized>(d_model: usize, mode: GradientMode, rng: &mut R) -> Self {
        let hidden = d_model * MLP_EXPANSION;
        Self {
            fc1: Linear::new(d_model, hidden, rng),
            fc2: Linear::new(hidden, d_model, rng),
            ln: LayerNorm::new(d_model, mode),
            activation: Activation::Gelu,
            hidden: None,
        }
    }

    /// Forward pass: x → fc1 → GELU → fc2 → LayerNorm
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [seq_len, d_model]
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let h = self.fc1.forward(x);
        let activated = self.activation.forward(&h);
        self.hidden = Some(h);
        let projected = self.fc2.forward(&activated);
        self.ln.forward(&projected)
    }

    /// Backward pass through LayerNorm, fc2, GELU and fc1
    ///
    /// Parameter gradients accumulate in the owning layers; the return value
    /// is the gradient with respect to the MLP input.
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        let Some(h) = self.hidden.as_ref() else {
            panic!("Mlp::backward called before forward");
        };

        let grad_projected = self.ln.backward(grad_out);
        let grad_activated = self.fc2.backward(&grad_projected);
        let grad_h = self.activation.backward(&grad_activated, h);
        self.fc1.backward(&grad_h)
    }

    /// Update fc1, fc2 and the LayerNorm, in that order
    pub fn update(&mut self, learning_rate: f32) {
        self.fc1.update(learning_rate);
        self.fc2.update(learning_rate);
        self.ln.update(learning_rate);
    }

    pub fn zero_grad(&mut self) {
        self.fc1.zero_grad();
        self.fc2.zero_grad();
        self.ln.zero_grad();
    }

    pub fn set_gradient_mode(&mut self, mode: GradientMode) {
        self.ln.set_mode(mode);
    }

    pub fn parameter_count(&self) -> usize {
        self.fc1.parameter_count() + self.fc2.parameter_count() + self.ln.parameter_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded;

    #[test]
    fn test_shapes() {
        let mut mlp = Mlp::new(8, GradientMode::Reference, &mut seeded(7));
        assert_eq!(mlp.fc1.weight.shape(), (16, 8));
        assert_eq!(mlp.fc2.weight.shape(), (8, 16));

        let x = Tensor::filled(5, 8, 0.3);
        assert_eq!(mlp.forward(&x).shape(), (5, 8));
        assert_eq!(mlp.backward(&Tensor::filled(5, 8, 1.0)).shape(), (5, 8));
    }

    #[test]
    fn test_output_is_normalized() {
        let mut mlp = Mlp::new(8, GradientMode::Reference, &mut seeded(11));
        let x = Tensor::from_rows(&[(0..8).map(|v| v as f32 * 0.1).collect::<Vec<_>>()]);
        let y = mlp.forward(&x);
        let mean = y.data.iter().sum::<f32>() / 8.0;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn test_backward_accumulates_into_both_linears() {
        let mut mlp = Mlp::new(4, GradientMode::Reference, &mut seeded(5));
        let x = Tensor::from_rows(&[vec![0.5, -1.0, 2.0, 0.0]]);
        mlp.forward(&x);
        mlp.backward(&Tensor::from_rows(&[vec![1.0, -1.0, 0.5, 0.0]]));

        assert!(mlp.fc1.weight_grad.max_abs() > 0.0);
        assert!(mlp.fc2.weight_grad.max_abs() > 0.0);

        mlp.zero_grad();
        assert_eq!(mlp.fc1.weight_grad.max_abs(), 0.0);
        assert_eq!(mlp.fc2.bias_grad.max_abs(), 0.0);
    }

    #[test]
    #[should_panic(expected = "before forward")]
    fn test_backward_without_forward_panics() {
        let mut mlp = Mlp::new(4, GradientMode::Reference, &mut seeded(5));
        mlp.backward(&Tensor::zeros(1, 4));
    }

    #[test]
    fn test_parameter_count() {
        let mlp = Mlp::new(4, GradientMode::Reference, &mut seeded(1));
        // fc1: 8*4 + 8, fc2: 4*8 + 4, ln: 4 + 4
        assert_eq!(mlp.parameter_count(), 40 + 36 + 8);
    }
}

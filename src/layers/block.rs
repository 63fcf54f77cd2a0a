//! Transformer Block
//!
//! A transformer block combines a projection stage and a feedforward stage,
//! each wrapped in a pre-norm residual connection.
//!
//! ## Architecture
//!
//! ```text
//! x → LayerNorm → Projection → (+) → LayerNorm → MLP → (+) → output
//! │                             ↑                        ↑
//! └─────────────────────────────┘                        │
//!                               └────────────────────────┘
//! ```
//!
//! The "attention" stage is a single `d_model → d_model` linear projection
//! applied to each token independently. There are no queries, keys or values,
//! so tokens never exchange information inside a block.
//!
//! ## Backward Pass
//!
//! At each residual connection the gradient splits into the skip path and the
//! transformed path, and the two contributions are summed:
//!
//! ```text
//! grad_residual1 = grad_out + ln2.backward(mlp.backward(grad_out))
//! grad_x         = grad_residual1 + ln1.backward(attention_proj.backward(grad_residual1))
//! ```

use rand::Rng;

use super::layer_norm::LayerNorm;
use super::linear::Linear;
use super::mlp::Mlp;
use crate::config::GradientMode;
use crate::tensor::Tensor;

/// Pre-norm residual block with a projection stage and an MLP stage
pub struct TransformerBlock {
    pub attention_proj: Linear,
    pub mlp: Mlp,
    pub ln1: LayerNorm,
    pub ln2: LayerNorm,
}

impl TransformerBlock {
    /// Create a new transformer block
    ///
    /// # Arguments
    ///
    /// * `d_model` - Embedding dimension
    /// * `mode` - LayerNorm gradient behavior
    /// * `rng` - Generator for the weight initialization
    pub fn new<R: Rng + ?Sized>(d_model: usize, mode: GradientMode, rng: &mut R) -> Self {
        Self {
            attention_proj: Linear::new(d_model, d_model, rng),
            mlp: Mlp::new(d_model, mode, rng),
            ln1: LayerNorm::new(d_model, mode),
            ln2: LayerNorm::new(d_model, mode),
        }
    }

    /// Forward pass: projection + MLP with residual connections
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [seq_len, d_model]
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let normalized1 = self.ln1.forward(x);
        let attn_out = self.attention_proj.forward(&normalized1);
        let residual1 = x.add(&attn_out);

        let normalized2 = self.ln2.forward(&residual1);
        let mlp_out = self.mlp.forward(&normalized2);
        residual1.add(&mlp_out)
    }

    /// Backward pass through both residual connections
    ///
    /// Returns the gradient with respect to the block input.
    pub fn backward(&mut self, grad_out: &Tensor) -> Tensor {
        // Outer skip plus MLP branch
        let grad_mlp_in = self.mlp.backward(grad_out);
        let mut grad_residual1 = grad_out.clone();
        grad_residual1.add_assign(&self.ln2.backward(&grad_mlp_in));

        // Inner skip plus projection branch
        let grad_proj_in = self.attention_proj.backward(&grad_residual1);
        let mut grad_x = grad_residual1;
        grad_x.add_assign(&self.ln1.backward(&grad_proj_in));
        grad_x
    }

    pub fn update(&mut self, learning_rate: f32) {
        self.attention_proj.update(learning_rate);
        self.mlp.update(learning_rate);
        self.ln1.update(learning_rate);
        self.ln2.update(learning_rate);
    }

    pub fn zero_grad(&mut self) {
        self.attention_proj.zero_grad();
        self.mlp.zero_grad();
        self.ln1.zero_grad();
        self.ln2.zero_grad();
    }

    pub fn set_gradient_mode(&mut self, mode: GradientMode) {
        self.mlp.set_gradient_mode(mode);
        self.ln1.set_mode(mode);
        self.ln2.set_mode(mode);
    }

    pub fn parameter_count(&self) -> usize {
        self.attention_proj.parameter_count()
            + self.mlp.parameter_count()
            + self.ln1.parameter_count()
            + self.ln2.parameter_count()
    }
}

//! Neural Network Layers
//!
//! The building blocks of the vision transformer. Each layer owns its
//! parameters and gradient accumulators and caches what its backward pass
//! needs.
//!
//! ## Layers
//!
//! - **activation**: ReLU, GELU and row-wise softmax
//! - **linear**: Fully connected layer
//! - **layer_norm**: Layer normalization
//! - **mlp**: Feedforward network with trailing LayerNorm
//! - **block**: Pre-norm residual transformer block
//!
//! ## Design Pattern
//!
//! Every trainable layer follows the same stateful pattern:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn new(...) -> Self { }
//!     pub fn forward(&mut self, x: &Tensor) -> Tensor { }       // caches inputs
//!     pub fn backward(&mut self, grad: &Tensor) -> Tensor { }   // accumulates grads
//!     pub fn update(&mut self, learning_rate: f32) { }          // clipped SGD, clears grads
//!     pub fn zero_grad(&mut self) { }
//! }
//! ```
//!
//! A `backward` call consumes the cache written by the most recent `forward`,
//! so the two must alternate one sample at a time.

pub mod activation;
pub mod block;
pub mod layer_norm;
pub mod linear;
pub mod mlp;

// Re-export main types for convenience
pub use activation::{gelu, gelu_derivative, relu, relu_derivative, softmax, Activation};
pub use block::TransformerBlock;
pub use layer_norm::LayerNorm;
pub use linear::Linear;
pub use mlp::Mlp;

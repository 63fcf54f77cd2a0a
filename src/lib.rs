//! TinyViT: Vision Transformer From Scratch
//!
//! A small Vision Transformer for MNIST-style digit classification, with
//! every forward and backward pass written by hand. No numeric or autodiff
//! library is involved.
//!
//! # Modules
//!
//! - [`tensor`] - Dense 2-D matrices
//! - [`layers`] - Activations, Linear, LayerNorm, MLP, transformer block
//! - [`vit`] - The full model: patchify, forward, backward, predict, update
//! - [`checkpoint`] - Plain-text model files
//! - [`optimizer`] - Clipped SGD step
//! - [`config`] - Model and training configuration
//! - [`train`] - CSV datasets, splits, training and evaluation loops
//! - [`training_logger`] - CSV metrics logger
//! - [`rng`] - Explicit random number context
//! - [`error`] - Error type
//!
//! # Example
//!
//! ```rust
//! use tinyvit::{rng, Tensor, VisionTransformer, VitConfig};
//!
//! let mut rng = rng::seeded(42);
//! let mut model = VisionTransformer::new(VitConfig::tiny(3), &mut rng).unwrap();
//!
//! let image = Tensor::zeros(8, 8);
//! model.zero_grad();
//! let logits = model.forward(&image);
//! let loss = model.compute_loss(&logits, 1);
//! model.backward(1);
//! model.update_weights(0.01);
//! assert!(loss > 0.0);
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod layers;
pub mod optimizer;
pub mod rng;
pub mod tensor;
pub mod train;
pub mod training_logger;
pub mod vit;

// Re-export main types for convenience
pub use checkpoint::{load_model, save_model};
pub use config::{load_config, GradientMode, RunConfig, TrainingConfig, VitConfig};
pub use error::VitError;
pub use tensor::Tensor;
pub use train::{evaluate, train_epoch, train_val_split, Dataset, EpochStats};
pub use training_logger::TrainingLogger;
pub use vit::VisionTransformer;

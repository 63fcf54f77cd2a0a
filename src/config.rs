//! Model and Training Configuration
//!
//! [`VitConfig`] holds the architecture hyperparameters, [`TrainingConfig`]
//! the optimizer and dataset knobs. Both serialize with serde, and a
//! [`RunConfig`] bundling the two can be read from a JSON file:
//!
//! ```json
//! {
//!   "model": { "d_model": 32, "num_layers": 1, "gradient_mode": "exact" },
//!   "training": { "epochs": 3, "learning_rate": 0.001 }
//! }
//! ```
//!
//! Every field is optional; missing fields keep their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, VitError};
use crate::layers::mlp::MLP_EXPANSION;

/// Largest model [`VitConfig::validate`] accepts, in learnable parameters
///
/// Every parameter also carries a gradient, so this caps a model at about
/// 512 MiB of `f32` storage.
pub const MAX_PARAMETERS: usize = 1 << 26;

/// How gradients are propagated through the normalization layers and the
/// learned embeddings
///
/// - `Reference`: LayerNorm backward is an identity, gamma/beta never change,
///   and the class token and position embeddings stay at their initial values.
/// - `Exact`: LayerNorm back-propagates through its statistics and trains
///   gamma/beta; the class token and position embeddings receive gradients
///   and are updated with the same clipped SGD as every other parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientMode {
    #[default]
    Reference,
    Exact,
}

/// Vision transformer architecture
///
/// # Parameter Count
///
/// ```text
/// embeddings = d_model + (num_patches + 1) × d_model + patch_dim × d_model + d_model
/// per_layer  ≈ 5 × d_model² + 12 × d_model   (projection + 2x MLP + three LayerNorms)
/// head       = d_model × num_classes + num_classes + 2 × d_model
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub d_model: usize,
    pub num_layers: usize,
    pub num_classes: usize,
    pub gradient_mode: GradientMode,
}

impl Default for VitConfig {
    fn default() -> Self {
        Self {
            image_size: 28, // MNIST
            patch_size: 4,  // 7x7 grid of 4x4 tiles
            d_model: 64,
            num_layers: 2,
            num_classes: 10,
            gradient_mode: GradientMode::Reference,
        }
    }
}

impl VitConfig {
    /// The reference MNIST model: 28x28 input, 4x4 patches, 64-wide, 2 blocks
    pub fn mnist() -> Self {
        Self::default()
    }

    /// Create a tiny config for tests and quick experiments
    ///
    /// 8x8 images in 4x4 patches, 16-wide, one block.
    pub fn tiny(num_classes: usize) -> Self {
        Self {
            image_size: 8,
            patch_size: 4,
            d_model: 16,
            num_layers: 1,
            num_classes,
            gradient_mode: GradientMode::Reference,
        }
    }

    pub fn with_gradient_mode(mut self, mode: GradientMode) -> Self {
        self.gradient_mode = mode;
        self
    }

    /// Number of patches, `(image_size / patch_size)²`
    pub fn num_patches(&self) -> usize {
        let per_side = self.patches_per_side();
        per_side * per_side
    }

    pub fn patches_per_side(&self) -> usize {
        self.image_size / self.patch_size
    }

    /// Token sequence length: one class token plus every patch
    pub fn seq_len(&self) -> usize {
        self.num_patches() + 1
    }

    /// Flattened patch length, `patch_size²`
    pub fn patch_dim(&self) -> usize {
        self.patch_size * self.patch_size
    }

    pub fn mlp_hidden(&self) -> usize {
        self.d_model * MLP_EXPANSION
    }

    /// Check that the hyperparameters describe a buildable model
    ///
    /// Rejects zero dimensions, a patch size that does not divide the image,
    /// and models whose parameter count overflows or exceeds
    /// [`MAX_PARAMETERS`].
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("image_size", self.image_size),
            ("patch_size", self.patch_size),
            ("d_model", self.d_model),
            ("num_layers", self.num_layers),
            ("num_classes", self.num_classes),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(VitError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.image_size % self.patch_size != 0 {
            return Err(VitError::InvalidConfig(format!(
                "patch_size {} does not divide image_size {}",
                self.patch_size, self.image_size
            )));
        }
        match self.checked_parameter_count() {
            Some(count) if count <= MAX_PARAMETERS => Ok(()),
            Some(count) => Err(VitError::InvalidConfig(format!(
                "model would have {count} parameters, limit is {MAX_PARAMETERS}"
            ))),
            None => Err(VitError::InvalidConfig(
                "model dimensions overflow usize".to_string(),
            )),
        }
    }

    /// Learnable parameter count, or `None` if any product overflows
    ///
    /// Model file headers are checked with this before any of the unchecked
    /// size helpers run.
    fn checked_parameter_count(&self) -> Option<usize> {
        let d = self.d_model;
        let per_side = self.image_size / self.patch_size;
        let seq_len = per_side.checked_mul(per_side)?.checked_add(1)?;
        let patch_dim = self.patch_size.checked_mul(self.patch_size)?;
        let hidden = d.checked_mul(MLP_EXPANSION)?;

        // class token, position embeddings, patch embedding, head, final LN
        let embeddings = d
            .checked_add(seq_len.checked_mul(d)?)?
            .checked_add(patch_dim.checked_add(1)?.checked_mul(d)?)?;
        let head = d
            .checked_add(1)?
            .checked_mul(self.num_classes)?
            .checked_add(d.checked_mul(2)?)?;

        // projection, fc1, fc2 and three LayerNorms
        let per_layer = d
            .checked_add(1)?
            .checked_mul(d)?
            .checked_add(d.checked_add(1)?.checked_mul(hidden)?)?
            .checked_add(hidden.checked_add(1)?.checked_mul(d)?)?
            .checked_add(d.checked_mul(6)?)?;

        embeddings
            .checked_add(head)?
            .checked_add(per_layer.checked_mul(self.num_layers)?)
    }
}

/// Optimizer, schedule and dataset settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of the training set held out for validation
    pub val_split: f32,
    /// Generator seed; 0 draws one from OS entropy
    pub seed: u64,
    /// Stop reading a CSV after this many accepted rows
    pub max_samples: Option<usize>,
    /// Rows whose label is at or above this value are skipped
    pub num_classes_to_load: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            epochs: 10,
            batch_size: 128,
            val_split: 0.1,
            seed: 42,
            max_samples: None,
            num_classes_to_load: 10,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(VitError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(VitError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.val_split) {
            return Err(VitError::InvalidConfig(format!(
                "val_split must be in [0, 1), got {}",
                self.val_split
            )));
        }
        if self.num_classes_to_load == 0 {
            return Err(VitError::InvalidConfig(
                "num_classes_to_load must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model and training settings read together from one JSON file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: VitConfig,
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()
    }
}

/// Load and validate a [`RunConfig`] from a JSON file
///
/// # Examples
///
/// ```no_run
/// use tinyvit::config::load_config;
///
/// let cfg = load_config("configs/mnist.json").unwrap();
/// assert_eq!(cfg.model.image_size, 28);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let contents = fs::read_to_string(path)?;
    let config: RunConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

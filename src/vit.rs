//! Vision Transformer
//!
//! This module ties the layers together into an image classifier.
//!
//! ## Architecture
//!
//! ```text
//! Image [image_size, image_size]
//!   ↓
//! Patchify          → [num_patches, patch_size²]
//!   ↓
//! Patch Embedding   → [num_patches, d_model]
//!   ↓
//! Prepend Class Token, Add Position Embeddings → [num_patches + 1, d_model]
//!   ↓
//! Transformer Block × num_layers
//!   ↓
//! Final LayerNorm
//!   ↓
//! Row 0 (class token) → Classification Head → logits [1, num_classes]
//! ```
//!
//! ## Training Step
//!
//! ```text
//! zero_grad()
//! for each (image, label) in batch:
//!     logits = forward(image)
//!     backward(label)              // gradients accumulate, no averaging
//! update_weights(learning_rate)    // clipped SGD, clears gradients
//! ```
//!
//! `forward` caches intermediates in the model and its layers, so the
//! `forward`/`backward` pair for one sample must finish before the next
//! sample's `forward` starts.
//!
//! ## Frozen Embeddings
//!
//! In [`GradientMode::Reference`] the class token and position embeddings
//! keep their initial values: the gradient reaching the token sequence is
//! only routed to the patch embedding. [`GradientMode::Exact`] accumulates
//! gradients for both and updates them with the rest of the model.

use rand::Rng;

use crate::config::{GradientMode, VitConfig};
use crate::error::{Result, VitError};
use crate::layers::activation::softmax;
use crate::layers::{LayerNorm, Linear, TransformerBlock};
use crate::optimizer::sgd_step;
use crate::rng::randn;
use crate::tensor::Tensor;

/// Standard deviation of the class token and position embedding init
pub const EMBEDDING_INIT_STD: f32 = 0.01;

/// Probability floor inside the cross-entropy logarithm
pub const LOSS_EPS: f32 = 1e-8;

/// Vision transformer classifier
///
/// Owns every parameter and the gradient accumulators for the class token
/// and position embeddings.
pub struct VisionTransformer {
    config: VitConfig,
    pub class_token: Tensor,         // [1, d_model]
    pub position_embeddings: Tensor, // [num_patches + 1, d_model]
    pub patch_embedding: Linear,     // patch_size² → d_model
    pub blocks: Vec<TransformerBlock>,
    pub final_ln: LayerNorm,
    pub classification_head: Linear, // d_model → num_classes
    pub class_token_grad: Tensor,
    pub position_embeddings_grad: Tensor,
    last_logits: Option<Tensor>,
}

impl VisionTransformer {
    /// Create a new randomly initialized model
    ///
    /// Linear weights use Xavier init, biases start at zero, and the class
    /// token and position embeddings are drawn from `N(0, 0.01²)`.
    ///
    /// # Errors
    ///
    /// Returns [`VitError::InvalidConfig`] if the hyperparameters cannot
    /// describe a model (zero sizes, or a patch size that does not divide
    /// the image size).
    ///
    /// # Example
    ///
    /// ```rust
    /// use tinyvit::{rng, VisionTransformer, VitConfig};
    ///
    /// let mut rng = rng::seeded(42);
    /// let model = VisionTransformer::new(VitConfig::mnist(), &mut rng).unwrap();
    /// assert_eq!(model.num_patches(), 49);
    /// ```
    pub fn new<R: Rng + ?Sized>(config: VitConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let d = config.d_model;
        let mode = config.gradient_mode;

        let patch_embedding = Linear::new(config.patch_dim(), d, rng);
        let classification_head = Linear::new(d, config.num_classes, rng);

        let mut class_token = Tensor::zeros(1, d);
        for v in class_token.data.iter_mut() {
            *v = randn(rng, 0.0, EMBEDDING_INIT_STD);
        }
        let mut position_embeddings = Tensor::zeros(config.seq_len(), d);
        for v in position_embeddings.data.iter_mut() {
            *v = randn(rng, 0.0, EMBEDDING_INIT_STD);
        }

        let blocks = (0..config.num_layers)
            .map(|_| TransformerBlock::new(d, mode, rng))
            .collect();

        Ok(Self {
            class_token_grad: Tensor::zeros(1, d),
            position_embeddings_grad: Tensor::zeros(config.seq_len(), d),
            class_token,
            position_embeddings,
            patch_embedding,
            blocks,
            final_ln: LayerNorm::new(d, mode),
            classification_head,
            last_logits: None,
            config,
        })
    }

    pub fn config(&self) -> &VitConfig {
        &self.config
    }

    pub fn num_patches(&self) -> usize {
        self.config.num_patches()
    }

    pub fn gradient_mode(&self) -> GradientMode {
        self.config.gradient_mode
    }

    /// Switch gradient behavior on a live model
    ///
    /// Accumulated gradients are kept; the new mode applies from the next
    /// backward/update call.
    pub fn set_gradient_mode(&mut self, mode: GradientMode) {
        self.config.gradient_mode = mode;
        self.final_ln.set_mode(mode);
        for block in &mut self.blocks {
            block.set_gradient_mode(mode);
        }
    }

    /// Split an image into flattened patches
    ///
    /// Tiles are scanned row-major over the tile grid and, within each tile,
    /// row-major over pixels.
    ///
    /// # Panics
    ///
    /// Panics if the image is not `image_size × image_size`
    pub fn image_to_patches(&self, image: &Tensor) -> Tensor {
        let size = self.config.image_size;
        assert_eq!(
            image.shape(),
            (size, size),
            "ShapeMismatch: image must be [{}, {}], got {:?}",
            size,
            size,
            image.shape()
        );

        let p = self.config.patch_size;
        let per_side = self.config.patches_per_side();
        let mut patches = Tensor::zeros(self.num_patches(), p * p);
        for ti in 0..per_side {
            for tj in 0..per_side {
                let patch_idx = ti * per_side + tj;
                for pi in 0..p {
                    for pj in 0..p {
                        let value = image.get(ti * p + pi, tj * p + pj);
                        patches.set(patch_idx, pi * p + pj, value);
                    }
                }
            }
        }
        patches
    }

    /// Reassemble an image from its patches (inverse of [`image_to_patches`])
    ///
    /// [`image_to_patches`]: VisionTransformer::image_to_patches
    pub fn patches_to_image(&self, patches: &Tensor) -> Tensor {
        let p = self.config.patch_size;
        assert_eq!(
            patches.shape(),
            (self.num_patches(), p * p),
            "ShapeMismatch: patches must be [{}, {}], got {:?}",
            self.num_patches(),
            p * p,
            patches.shape()
        );

        let size = self.config.image_size;
        let per_side = self.config.patches_per_side();
        let mut image = Tensor::zeros(size, size);
        for patch_idx in 0..self.num_patches() {
            let (ti, tj) = (patch_idx / per_side, patch_idx % per_side);
            for k in 0..p * p {
                image.set(ti * p + k / p, tj * p + k % p, patches.get(patch_idx, k));
            }
        }
        image
    }

    /// Forward pass: image → logits `[1, num_classes]`
    ///
    /// Caches the logits for the following [`backward`](Self::backward).
    ///
    /// # Panics
    ///
    /// Panics if the image is not `image_size × image_size`
    pub fn forward(&mut self, image: &Tensor) -> Tensor {
        let patches = self.image_to_patches(image);
        let embedded = self.patch_embedding.forward(&patches);

        let mut sequence = Tensor::zeros(self.config.seq_len(), self.config.d_model);
        sequence.set_slice(0, 0, &self.class_token);
        sequence.set_slice(1, 0, &embedded);
        let mut x = sequence.add(&self.position_embeddings);

        for block in &mut self.blocks {
            x = block.forward(&x);
        }

        let normalized = self.final_ln.forward(&x);
        let pooled = normalized.slice(0, 1, 0, self.config.d_model);
        let logits = self.classification_head.forward(&pooled);
        self.last_logits = Some(logits.clone());
        logits
    }

    /// Cross-entropy of `logits` against `label`
    ///
    /// `-ln(max(softmax(logits)[label], 1e-8))`
    pub fn compute_loss(&self, logits: &Tensor, label: usize) -> f32 {
        self.check_label(label);
        let probs = softmax(logits);
        -probs.get(0, label).max(LOSS_EPS).ln()
    }

    /// Backward pass from the cached logits of the last forward call
    ///
    /// The logit gradient is `softmax(logits) - one_hot(label)`. It flows
    /// through the classification head into row 0 of the sequence gradient,
    /// back through the final LayerNorm and the block stack, and rows
    /// `1..=num_patches` reach the patch embedding.
    ///
    /// # Panics
    ///
    /// Panics if called before [`forward`](Self::forward) or if `label` is
    /// not a valid class
    pub fn backward(&mut self, label: usize) {
        self.check_label(label);
        let Some(logits) = self.last_logits.as_ref() else {
            panic!("VisionTransformer::backward called before forward");
        };

        let mut grad_logits = softmax(logits);
        grad_logits.data[label] -= 1.0;

        let grad_pooled = self.classification_head.backward(&grad_logits);
        let mut grad_sequence = Tensor::zeros(self.config.seq_len(), self.config.d_model);
        grad_sequence.set_slice(0, 0, &grad_pooled);

        let mut grad = self.final_ln.backward(&grad_sequence);
        for block in self.blocks.iter_mut().rev() {
            grad = block.backward(&grad);
        }

        if self.config.gradient_mode == GradientMode::Exact {
            self.position_embeddings_grad.add_assign(&grad);
            self.class_token_grad
                .add_assign(&grad.slice(0, 1, 0, self.config.d_model));
        }

        let grad_patches = grad.slice(1, self.config.seq_len(), 0, self.config.d_model);
        self.patch_embedding.backward(&grad_patches);
    }

    /// Predicted class: index of the largest logit, lowest index on ties
    pub fn predict(&mut self, image: &Tensor) -> usize {
        self.forward(image).argmax_row(0)
    }

    /// Like [`predict`](Self::predict), but reports a wrongly sized image
    /// as [`VitError::ImageShape`] instead of panicking
    pub fn try_predict(&mut self, image: &Tensor) -> Result<usize> {
        let size = self.config.image_size;
        if image.shape() != (size, size) {
            return Err(VitError::ImageShape {
                expected: size,
                rows: image.rows,
                cols: image.cols,
            });
        }
        Ok(self.predict(image))
    }

    /// Apply one clipped SGD step everywhere and clear every gradient
    ///
    /// Order: patch embedding, classification head, final LayerNorm, then
    /// each block in sequence.
    pub fn update_weights(&mut self, learning_rate: f32) {
        self.patch_embedding.update(learning_rate);
        self.classification_head.update(learning_rate);
        self.final_ln.update(learning_rate);
        for block in &mut self.blocks {
            block.update(learning_rate);
        }

        if self.config.gradient_mode == GradientMode::Exact {
            sgd_step(&mut self.class_token, &mut self.class_token_grad, learning_rate);
            sgd_step(
                &mut self.position_embeddings,
                &mut self.position_embeddings_grad,
                learning_rate,
            );
        } else {
            self.class_token_grad.fill_zero();
            self.position_embeddings_grad.fill_zero();
        }
    }

    pub fn zero_grad(&mut self) {
        self.patch_embedding.zero_grad();
        self.classification_head.zero_grad();
        self.final_ln.zero_grad();
        for block in &mut self.blocks {
            block.zero_grad();
        }
        self.class_token_grad.fill_zero();
        self.position_embeddings_grad.fill_zero();
    }

    /// Every learnable tensor with its model-file name, in file order
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params: Vec<(String, &Tensor)> = vec![
            ("class_token".to_string(), &self.class_token),
            ("position_embeddings".to_string(), &self.position_embeddings),
            ("patch_embedding_weights".to_string(), &self.patch_embedding.weight),
            ("patch_embedding_biases".to_string(), &self.patch_embedding.bias),
        ];

        for (i, block) in self.blocks.iter().enumerate() {
            let prefix = format!("transformer_block_{i}");
            let tensors: [(&str, &Tensor); 12] = [
                ("attention_proj_weights", &block.attention_proj.weight),
                ("attention_proj_biases", &block.attention_proj.bias),
                ("mlp_fc1_weights", &block.mlp.fc1.weight),
                ("mlp_fc1_biases", &block.mlp.fc1.bias),
                ("mlp_fc2_weights", &block.mlp.fc2.weight),
                ("mlp_fc2_biases", &block.mlp.fc2.bias),
                ("mlp_ln_gamma", &block.mlp.ln.gamma),
                ("mlp_ln_beta", &block.mlp.ln.beta),
                ("ln1_gamma", &block.ln1.gamma),
                ("ln1_beta", &block.ln1.beta),
                ("ln2_gamma", &block.ln2.gamma),
                ("ln2_beta", &block.ln2.beta),
            ];
            params.extend(
                tensors
                    .into_iter()
                    .map(|(name, t)| (format!("{prefix}_{name}"), t)),
            );
        }

        params.extend([
            (
                "classification_head_weights".to_string(),
                &self.classification_head.weight,
            ),
            (
                "classification_head_biases".to_string(),
                &self.classification_head.bias,
            ),
            ("final_ln_gamma".to_string(), &self.final_ln.gamma),
            ("final_ln_beta".to_string(), &self.final_ln.beta),
        ]);
        params
    }

    /// Mutable counterpart of [`named_parameters`](Self::named_parameters),
    /// same names and order
    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let Self {
            class_token,
            position_embeddings,
            patch_embedding,
            blocks,
            final_ln,
            classification_head,
            ..
        } = self;

        let mut params: Vec<(String, &mut Tensor)> = vec![
            ("class_token".to_string(), class_token),
            ("position_embeddings".to_string(), position_embeddings),
            ("patch_embedding_weights".to_string(), &mut patch_embedding.weight),
            ("patch_embedding_biases".to_string(), &mut patch_embedding.bias),
        ];

        for (i, block) in blocks.iter_mut().enumerate() {
            let prefix = format!("transformer_block_{i}");
            let TransformerBlock {
                attention_proj,
                mlp,
                ln1,
                ln2,
            } = block;
            let tensors: [(&str, &mut Tensor); 12] = [
                ("attention_proj_weights", &mut attention_proj.weight),
                ("attention_proj_biases", &mut attention_proj.bias),
                ("mlp_fc1_weights", &mut mlp.fc1.weight),
                ("mlp_fc1_biases", &mut mlp.fc1.bias),
                ("mlp_fc2_weights", &mut mlp.fc2.weight),
                ("mlp_fc2_biases", &mut mlp.fc2.bias),
                ("mlp_ln_gamma", &mut mlp.ln.gamma),
                ("mlp_ln_beta", &mut mlp.ln.beta),
                ("ln1_gamma", &mut ln1.gamma),
                ("ln1_beta", &mut ln1.beta),
                ("ln2_gamma", &mut ln2.gamma),
                ("ln2_beta", &mut ln2.beta),
            ];
            params.extend(
                tensors
                    .into_iter()
                    .map(|(name, t)| (format!("{prefix}_{name}"), t)),
            );
        }

        params.extend([
            (
                "classification_head_weights".to_string(),
                &mut classification_head.weight,
            ),
            (
                "classification_head_biases".to_string(),
                &mut classification_head.bias,
            ),
            ("final_ln_gamma".to_string(), &mut final_ln.gamma),
            ("final_ln_beta".to_string(), &mut final_ln.beta),
        ]);
        params
    }

    /// Total number of learnable scalars
    pub fn parameter_count(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, t)| t.data.len())
            .sum()
    }

    fn check_label(&self, label: usize) {
        assert!(
            label < self.config.num_classes,
            "label {} out of range for {} classes",
            label,
            self.config.num_classes
        );
    }
}

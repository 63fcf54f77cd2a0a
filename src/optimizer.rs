//! Clipped SGD
//!
//! Every parameter owner (Linear, LayerNorm, the vision transformer's own
//! embeddings) updates itself with the same rule:
//!
//! ```text
//! g = clamp(grad, -1, 1)     # per-element clipping
//! θ = θ - lr * g
//! grad = 0                   # update consumes the accumulated gradient
//! ```
//!
//! ## Per-Element Clipping
//!
//! Unlike norm clipping, which rescales the whole gradient vector, each
//! element is clamped independently. The bound on a single step is therefore
//! simple: no parameter moves by more than `lr × GRAD_CLIP` in one update,
//! however large the accumulated gradient is.
//!
//! ## Accumulation
//!
//! Gradients accumulate additively across every backward call since the last
//! update. A batch of N samples produces the *sum* of N per-sample gradients;
//! nothing is averaged.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// Per-element gradient bound applied before every step
pub const GRAD_CLIP: f32 = 1.0;

/// Apply one clipped SGD step to `param` and reset `grad` to zero
///
/// # Arguments
///
/// * `param` - Parameter tensor, updated in place
/// * `grad` - Accumulated gradient of the same shape, zeroed on return
/// * `learning_rate` - Step size
///
/// # Panics
///
/// Panics if `param` and `grad` have different shapes
pub fn sgd_step(param: &mut Tensor, grad: &mut Tensor, learning_rate: f32) {
    assert_eq!(
        param.shape(),
        grad.shape(),
        "ShapeMismatch: parameter {:?} and gradient {:?}",
        param.shape(),
        grad.shape()
    );

    param
        .data
        .par_iter_mut()
        .zip(grad.data.par_iter_mut())
        .for_each(|(p, g)| {
            *p -= learning_rate * g.clamp(-GRAD_CLIP, GRAD_CLIP);
            *g = 0.0;
        });
}

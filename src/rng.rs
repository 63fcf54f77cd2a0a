//! Random Number Context
//!
//! All randomness (weight initialization, embedding initialization, dataset
//! shuffling) flows through an explicit generator that the caller creates
//! once and passes down by `&mut`. Nothing in the crate keeps hidden global
//! RNG state, so two models built from the same seed are identical.
//!
//! ## Example
//!
//! ```rust
//! use tinyvit::rng::{randn, seeded};
//!
//! let mut rng = seeded(42);
//! let x = randn(&mut rng, 0.0, 0.01);
//! assert!(x.abs() < 1.0);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Create the generator used for a run
///
/// A seed of `0` draws the seed from operating-system entropy, so every run
/// differs. Any other value gives a reproducible stream.
pub fn seeded(seed: u64) -> StdRng {
    if seed == 0 {
        StdRng::from_os_rng()
    } else {
        StdRng::seed_from_u64(seed)
    }
}

/// Sample from `N(mean, std²)`
pub fn randn<R: Rng + ?Sized>(rng: &mut R, mean: f32, std: f32) -> f32 {
    let z: f32 = rng.sample(StandardNormal);
    mean + std * z
}

//! Vision transformer tests
//!
//! Patchify geometry, determinism, training behavior and the two gradient
//! modes, all on small models so they run quickly.

use approx::assert_abs_diff_eq;
use tinyvit::train::probe_image;
use tinyvit::{rng, GradientMode, Tensor, VisionTransformer, VitConfig};

fn model_with(config: VitConfig, seed: u64) -> VisionTransformer {
    VisionTransformer::new(config, &mut rng::seeded(seed)).expect("valid config")
}

fn numbered_image(size: usize) -> Tensor {
    Tensor::new((0..size * size).map(|v| v as f32 / 255.0).collect(), size, size)
}

// ============================================================================
// Patchify
// ============================================================================

mod patch_tests {
    use super::*;

    #[test]
    fn test_mnist_geometry() {
        let model = model_with(VitConfig::mnist(), 1);
        assert_eq!(model.num_patches(), 49);
        assert_eq!(model.config().seq_len(), 50);
        assert_eq!(model.position_embeddings.shape(), (50, 64));

        let patches = model.image_to_patches(&numbered_image(28));
        assert_eq!(patches.shape(), (49, 16));
    }

    #[test]
    fn test_roundtrip_reconstructs_image() {
        let model = model_with(VitConfig::mnist(), 1);
        let image = numbered_image(28);
        let restored = model.patches_to_image(&model.image_to_patches(&image));
        assert_eq!(restored, image);
    }

    #[test]
    fn test_last_patch_is_bottom_right_tile() {
        let model = model_with(VitConfig::mnist(), 1);
        let image = numbered_image(28);
        let patches = model.image_to_patches(&image);
        // Tile (6, 6) starts at pixel (24, 24); its last pixel is (27, 27)
        assert_eq!(patches.get(48, 0), image.get(24, 24));
        assert_eq!(patches.get(48, 15), image.get(27, 27));
    }

    #[test]
    #[should_panic(expected = "ShapeMismatch")]
    fn test_wrong_image_size_panics_in_forward() {
        let mut model = model_with(VitConfig::tiny(2), 1);
        model.forward(&Tensor::zeros(9, 9));
    }
}

// ============================================================================
// Determinism
// ============================================================================

mod determinism_tests {
    use super::*;

    #[test]
    fn test_repeated_forward_is_identical() {
        let mut model = model_with(VitConfig::mnist(), 42);
        let image = probe_image(28);
        let first = model.forward(&image);
        let second = model.forward(&image);
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_seed_same_model() {
        let mut a = model_with(VitConfig::tiny(4), 7);
        let mut b = model_with(VitConfig::tiny(4), 7);
        let image = probe_image(8);
        assert_eq!(a.forward(&image), b.forward(&image));
    }

    #[test]
    fn test_different_seed_different_model() {
        let a = model_with(VitConfig::tiny(4), 7);
        let b = model_with(VitConfig::tiny(4), 8);
        assert_ne!(a.class_token, b.class_token);
    }

    #[test]
    fn test_initial_parameter_values() {
        let model = model_with(VitConfig::mnist(), 3);
        assert!(model.patch_embedding.bias.data.iter().all(|&b| b == 0.0));
        assert!(model.final_ln.gamma.data.iter().all(|&g| g == 1.0));
        // Embeddings are drawn with std 0.01
        assert!(model.class_token.max_abs() < 0.1);
        assert!(model.position_embeddings.max_abs() < 0.1);
    }
}

// ============================================================================
// Training Behavior
// ============================================================================

mod training_tests {
    use super::*;

    fn train_single_sample(model: &mut VisionTransformer, image: &Tensor, label: usize, steps: usize) {
        for _ in 0..steps {
            model.zero_grad();
            model.forward(image);
            model.backward(label);
            model.update_weights(0.05);
        }
    }

    #[test]
    fn test_overfits_single_sample() {
        let mut model = model_with(VitConfig::tiny(3), 11);
        let image = probe_image(8);
        let label = 2;

        let initial = {
            let logits = model.forward(&image);
            model.compute_loss(&logits, label)
        };
        train_single_sample(&mut model, &image, label, 200);
        let logits = model.forward(&image);
        let final_loss = model.compute_loss(&logits, label);

        assert!(final_loss < initial);
        assert!(final_loss < 0.1, "loss {} did not approach zero", final_loss);
        assert_eq!(model.predict(&image), label);
    }

    #[test]
    fn test_overfits_single_sample_exact_mode() {
        let config = VitConfig::tiny(3).with_gradient_mode(GradientMode::Exact);
        let mut model = model_with(config, 11);
        let image = probe_image(8);
        train_single_sample(&mut model, &image, 0, 200);
        let logits = model.forward(&image);
        assert!(model.compute_loss(&logits, 0) < 0.1);
        assert_eq!(model.predict(&image), 0);
    }

    #[test]
    fn test_update_step_is_clipped() {
        let lr = 0.01;
        let mut model = model_with(VitConfig::tiny(2), 5);
        let image = numbered_image(8).mul_scalar(50.0);
        let before: Vec<Tensor> = model
            .named_parameters()
            .into_iter()
            .map(|(_, t)| t.clone())
            .collect();

        // Many accumulated samples produce gradients far above the clip bound
        model.zero_grad();
        for _ in 0..64 {
            model.forward(&image);
            model.backward(1);
        }
        model.update_weights(lr);

        for ((name, after), old) in model.named_parameters().into_iter().zip(&before) {
            for (a, b) in after.data.iter().zip(&old.data) {
                assert!(
                    (a - b).abs() <= lr + 1e-6,
                    "{} moved by {} in one step",
                    name,
                    (a - b).abs()
                );
            }
        }
    }

    #[test]
    fn test_zero_grad_discards_accumulated_gradients() {
        let mut model = model_with(VitConfig::tiny(2), 5);
        let before = model.classification_head.weight.clone();
        model.forward(&probe_image(8));
        model.backward(0);
        model.zero_grad();
        model.update_weights(0.1);
        assert_eq!(model.classification_head.weight, before);
    }

    #[test]
    fn test_reference_mode_keeps_layer_norm_fixed() {
        let mut model = model_with(VitConfig::tiny(2), 6);
        train_single_sample(&mut model, &probe_image(8), 1, 5);
        for block in &model.blocks {
            assert!(block.ln1.gamma.data.iter().all(|&g| g == 1.0));
            assert!(block.mlp.ln.beta.data.iter().all(|&b| b == 0.0));
        }
        assert!(model.final_ln.gamma.data.iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_exact_mode_trains_layer_norm() {
        let config = VitConfig::tiny(2).with_gradient_mode(GradientMode::Exact);
        let mut model = model_with(config, 6);
        train_single_sample(&mut model, &probe_image(8), 1, 5);
        assert!(model.final_ln.gamma.data.iter().any(|&g| g != 1.0));
    }
}

// ============================================================================
// Exact-Mode Gradient Check
// ============================================================================

mod gradient_check_tests {
    use super::*;

    #[test]
    fn test_class_token_gradient_matches_finite_difference() {
        let config = VitConfig::tiny(3).with_gradient_mode(GradientMode::Exact);
        let mut model = model_with(config, 21);
        // Well-conditioned class token so LayerNorm is far from its epsilon
        for (j, v) in model.class_token.data.iter_mut().enumerate() {
            *v = (j as f32 * 0.7).sin();
        }

        let image = probe_image(8);
        let label = 1;
        model.zero_grad();
        model.forward(&image);
        model.backward(label);
        let analytic = model.class_token_grad.clone();

        let h = 1e-2;
        for j in 0..model.class_token.cols {
            let original = model.class_token.data[j];

            model.class_token.data[j] = original + h;
            let logits = model.forward(&image);
            let up = model.compute_loss(&logits, label);

            model.class_token.data[j] = original - h;
            let logits = model.forward(&image);
            let down = model.compute_loss(&logits, label);

            model.class_token.data[j] = original;
            let numeric = (up - down) / (2.0 * h);
            assert_abs_diff_eq!(analytic.data[j], numeric, epsilon = 2e-2);
        }
    }
}

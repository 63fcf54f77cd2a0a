//! Layer tests: activations, softmax, LayerNorm, Linear and the optimizer
//!
//! Analytic gradients are checked against central finite differences.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use tinyvit::layers::{gelu, gelu_derivative, softmax, LayerNorm, Linear};
use tinyvit::optimizer::{sgd_step, GRAD_CLIP};
use tinyvit::{rng, GradientMode, Tensor};

fn sample_rows(seed: u64, rows: usize, cols: usize) -> Tensor {
    let mut t = Tensor::zeros(rows, cols);
    t.xavier_init(&mut rng::seeded(seed));
    t.mul_scalar(5.0)
}

// ============================================================================
// Softmax
// ============================================================================

mod softmax_tests {
    use super::*;

    #[test]
    fn test_rows_sum_to_one() {
        let x = sample_rows(1, 6, 10);
        let s = softmax(&x);
        for i in 0..6 {
            assert_abs_diff_eq!(s.row(i).iter().sum::<f32>(), 1.0, epsilon = 1e-6);
            assert!(s.row(i).iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_shift_invariance() {
        let x = sample_rows(2, 3, 7);
        let shifted = x.map(|v| v + 123.0);
        let a = softmax(&x);
        let b = softmax(&shifted);
        for (p, q) in a.data.iter().zip(&b.data) {
            assert_abs_diff_eq!(*p, *q, epsilon = 1e-6);
        }
    }
}

// ============================================================================
// GELU
// ============================================================================

mod gelu_tests {
    use super::*;

    #[test]
    fn test_tanh_approximation_formula() {
        for &x in &[-2.0f32, -0.5, 0.3, 1.7] {
            let expected =
                0.5 * x * (1.0 + ((2.0 / std::f32::consts::PI).sqrt() * (x + 0.044715 * x.powi(3))).tanh());
            assert_relative_eq!(gelu(x), expected, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_derivative_against_finite_difference() {
        let h = 1e-3;
        for i in -20..=20 {
            let x = i as f32 * 0.2;
            let numeric = (gelu(x + h) - gelu(x - h)) / (2.0 * h);
            assert_abs_diff_eq!(gelu_derivative(x), numeric, epsilon = 1e-3);
        }
    }
}

// ============================================================================
// LayerNorm
// ============================================================================

mod layer_norm_tests {
    use super::*;

    #[test]
    fn test_output_statistics() {
        let x = sample_rows(3, 8, 32);
        let mut ln = LayerNorm::new(32, GradientMode::Reference);
        let y = ln.forward(&x);
        for i in 0..8 {
            let row = y.row(i);
            let mean = row.iter().sum::<f32>() / 32.0;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 32.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-4);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_affine_parameters_applied() {
        let x = sample_rows(4, 2, 4);
        let mut ln = LayerNorm::new(4, GradientMode::Reference);
        let base = ln.forward(&x);
        ln.gamma = Tensor::filled(1, 4, 2.0);
        ln.beta = Tensor::filled(1, 4, -1.0);
        let scaled = ln.forward(&x);
        for (b, s) in base.data.iter().zip(&scaled.data) {
            assert_abs_diff_eq!(*s, 2.0 * b - 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_exact_gradients_match_finite_difference() {
        let x = sample_rows(5, 3, 6);
        let upstream = sample_rows(6, 3, 6);
        let mut ln = LayerNorm::new(6, GradientMode::Exact);
        ln.gamma = Tensor::new(vec![1.0, 0.5, -0.7, 2.0, 1.2, 0.9], 1, 6);
        ln.beta = Tensor::new(vec![0.1, 0.0, -0.3, 0.2, 0.0, 0.5], 1, 6);

        let objective = |ln: &mut LayerNorm, input: &Tensor| -> f32 {
            ln.forward(input).hadamard(&upstream).data.iter().sum()
        };

        ln.forward(&x);
        let grad_x = ln.backward(&upstream);
        let grad_gamma = ln.gamma_grad.clone();

        let h = 1e-2;
        for idx in 0..x.data.len() {
            let mut plus = x.clone();
            plus.data[idx] += h;
            let mut minus = x.clone();
            minus.data[idx] -= h;
            let numeric = (objective(&mut ln, &plus) - objective(&mut ln, &minus)) / (2.0 * h);
            assert_abs_diff_eq!(grad_x.data[idx], numeric, epsilon = 1e-2);
        }

        for j in 0..6 {
            let original = ln.gamma.data[j];
            ln.gamma.data[j] = original + h;
            let up = objective(&mut ln, &x);
            ln.gamma.data[j] = original - h;
            let down = objective(&mut ln, &x);
            ln.gamma.data[j] = original;
            assert_abs_diff_eq!(grad_gamma.data[j], (up - down) / (2.0 * h), epsilon = 1e-2);
        }
    }

    #[test]
    fn test_mode_switch_on_live_layer() {
        let x = sample_rows(7, 2, 4);
        let grad = sample_rows(8, 2, 4);
        let mut ln = LayerNorm::new(4, GradientMode::Reference);
        ln.forward(&x);
        assert_eq!(ln.backward(&grad), grad);

        ln.set_mode(GradientMode::Exact);
        ln.forward(&x);
        assert_ne!(ln.backward(&grad), grad);
    }
}

// ============================================================================
// Linear
// ============================================================================

mod linear_tests {
    use super::*;

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let mut layer = Linear::new(5, 3, &mut rng::seeded(9));
        let x = sample_rows(10, 2, 5);
        let upstream = sample_rows(11, 2, 3);

        layer.forward(&x);
        let grad_x = layer.backward(&upstream);

        let h = 1e-2;
        for idx in 0..x.data.len() {
            let mut plus = x.clone();
            plus.data[idx] += h;
            let mut minus = x.clone();
            minus.data[idx] -= h;
            let f_plus: f32 = layer.forward(&plus).hadamard(&upstream).data.iter().sum();
            let f_minus: f32 = layer.forward(&minus).hadamard(&upstream).data.iter().sum();
            assert_abs_diff_eq!(grad_x.data[idx], (f_plus - f_minus) / (2.0 * h), epsilon = 1e-2);
        }
    }

    #[test]
    fn test_gradients_sum_across_samples() {
        let mut layer = Linear::new(4, 2, &mut rng::seeded(12));
        let a = sample_rows(13, 1, 4);
        let b = sample_rows(14, 1, 4);
        let g = Tensor::from_rows(&[vec![1.0, -0.5]]);

        layer.forward(&a);
        layer.backward(&g);
        layer.forward(&b);
        layer.backward(&g);

        let expected = g.transpose().matmul(&a.add(&b));
        for (got, want) in layer.weight_grad.data.iter().zip(&expected.data) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-5);
        }
        assert_eq!(layer.bias_grad.data, vec![2.0, -1.0]);
    }
}

// ============================================================================
// Gradient Clipping
// ============================================================================

mod clipping_tests {
    use super::*;

    #[test]
    fn test_step_never_exceeds_learning_rate() {
        let lr = 0.05;
        let mut param = sample_rows(20, 4, 4);
        let before = param.clone();
        let mut grad = sample_rows(21, 4, 4).mul_scalar(1e4);
        sgd_step(&mut param, &mut grad, lr);

        for (new, old) in param.data.iter().zip(&before.data) {
            assert!((new - old).abs() <= lr * GRAD_CLIP + 1e-6);
        }
        assert_eq!(grad.max_abs(), 0.0);
    }
}

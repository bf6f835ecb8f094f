//! Shared helpers for integration tests.

#![allow(dead_code)]

use boosters_compute::{Backend, FloatWidth, NumericConfig, UIntWidth};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Backends with an `f32`/`u32` instantiation on every machine.
pub const F32_BACKENDS: [Backend; 3] = [Backend::Scalar, Backend::Simd128, Backend::Simd256];

pub fn f64_config(n_outputs: usize) -> NumericConfig {
    NumericConfig::builder().n_outputs(n_outputs).build().unwrap()
}

pub fn f32_config(n_outputs: usize) -> NumericConfig {
    NumericConfig::builder()
        .n_outputs(n_outputs)
        .float_width(FloatWidth::F32)
        .uint_width(UIntWidth::U32)
        .build()
        .unwrap()
}

/// A random histogram batch in `f64`; convert with [`to_f32`].
#[derive(Debug, Clone)]
pub struct Batch {
    pub n_samples: usize,
    pub n_bins: usize,
    pub n_outputs: usize,
    pub bins: Vec<usize>,
    /// Interleaved `(grad, hess)` per sample and output.
    pub grad_hess: Vec<f64>,
    pub weights: Vec<f64>,
    pub occurrences: Vec<u8>,
}

pub fn batch(n_samples: usize, n_bins: usize, n_outputs: usize, seed: u64) -> Batch {
    let mut rng = StdRng::seed_from_u64(seed);
    Batch {
        n_samples,
        n_bins,
        n_outputs,
        bins: (0..n_samples).map(|_| rng.gen_range(0..n_bins)).collect(),
        grad_hess: (0..n_samples * n_outputs)
            .flat_map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(0.05..1.0)])
            .collect(),
        weights: (0..n_samples).map(|_| rng.gen_range(0.1..2.0)).collect(),
        occurrences: (0..n_samples).map(|_| rng.gen_range(0..4)).collect(),
    }
}

impl Batch {
    /// Gradient buffer in kernel layout: interleaved with hessians, or gradients only.
    pub fn gradients(&self, hessian: bool) -> Vec<f64> {
        if hessian {
            self.grad_hess.clone()
        } else {
            self.grad_hess.iter().step_by(2).copied().collect()
        }
    }
}

pub fn to_f32(v: &[f64]) -> Vec<f32> {
    v.iter().map(|&x| x as f32).collect()
}

pub fn random_scores(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect()
}

/// Relative-or-absolute closeness used for cross-backend comparisons.
pub fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        let scale = x.abs().max(y.abs()).max(1.0);
        assert!((x - y).abs() <= tol * scale, "index {i}: {x} vs {y}");
    }
}

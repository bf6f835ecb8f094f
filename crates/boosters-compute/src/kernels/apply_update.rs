//! Score update and gradient refresh.
//!
//! For every sample the slot index is unpacked from the stream and the
//! `n_outputs` values of the update tensor at that slot are added to the
//! sample's scores (`scores[sample * n_outputs + k]`, `update[slot * n_outputs + k]`).
//! Then, depending on the request:
//!
//! - gradients (and hessians) are recomputed from the new scores and stored
//!   unweighted in the interleaved `grad_hess` layout read by the bin-sum pass,
//! - the weighted metric term is accumulated in `f64`.
//!
//! Multiclass objectives go through a softmax with the running maximum
//! subtracted; exponentials are staged in the scratch buffer
//! (`n_outputs * LANES` values). Squared error with a gradient buffer and no
//! targets keeps residuals in that buffer and never reads targets.

use super::{walk_samples, SampleVisitor};
use crate::buffers::check_len;
use crate::error::{ComputeError, Result};
use crate::lanes::{FloatLanes, IndexOf, LaneScalar, LaneUInt, ScalarOf, SingleOf, UIntLanes};
use crate::objectives::Objective;
use crate::packing::{packed_len, Packing};

/// Typed per-sample targets.
#[derive(Debug, Clone, Copy)]
pub enum TargetValues<'a, T, U> {
    /// Not supplied: only scores (or squared-error residuals) are updated.
    None,
    Continuous(&'a [T]),
    Class(&'a [U]),
}

impl<T, U> TargetValues<'_, T, U> {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Continuous(v) => v.len(),
            Self::Class(v) => v.len(),
        }
    }
}

/// Typed read-only inputs of the update pass.
#[derive(Debug, Clone, Copy)]
pub struct UpdateArgs<'a, T, U> {
    pub n_outputs: usize,
    /// Store hessians next to gradients.
    pub hessian: bool,
    pub calc_metric: bool,
    pub n_samples: usize,
    pub packing: Packing,
    /// `None`: every sample uses slot 0.
    pub packed: Option<&'a [U]>,
    /// `n_outputs` values per slot.
    pub update: &'a [T],
    pub targets: TargetValues<'a, T, U>,
    pub weights: Option<&'a [T]>,
}

/// Caller-owned buffers the update pass writes.
#[derive(Debug)]
pub struct UpdateBuffers<'a, T> {
    pub scores: &'a mut [T],
    pub grad_hess: Option<&'a mut [T]>,
    pub scratch: &'a mut [T],
}

/// Weighted metric accumulation of one update call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSum {
    /// Sum of `weight * term` over samples.
    pub sum: f64,
    pub weight_total: f64,
}

impl MetricSum {
    /// Weighted mean, or 0 when no weight was seen.
    pub fn mean(&self) -> f64 {
        if self.weight_total > 0.0 {
            self.sum / self.weight_total
        } else {
            0.0
        }
    }

    /// Combine the sums of two disjoint sample ranges.
    pub fn combine(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            weight_total: self.weight_total + other.weight_total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Squared error: `grad_hess` holds residuals.
    Residuals,
    /// One gradient per output from its own score.
    Independent,
    /// Softmax across outputs.
    Multiclass,
}

fn mode<O: Objective, T, U>(objective: &O, args: &UpdateArgs<'_, T, U>, has_gradients: bool) -> Mode {
    if objective.multiclass() {
        Mode::Multiclass
    } else if has_gradients && args.targets.is_none() && objective.info().is_rmse {
        Mode::Residuals
    } else {
        Mode::Independent
    }
}

impl<T, U: LaneUInt> UpdateArgs<'_, T, U> {
    /// Check buffer extents for a zone of `lanes` lanes.
    pub fn validate<O: Objective>(&self, objective: &O, buffers: &UpdateBuffers<'_, T>, lanes: usize) -> Result<()> {
        let n = self.n_samples;
        self.packing.validate(U::BITS)?;
        if let Some(packed) = self.packed {
            check_len("packed", packed_len(n, self.packing, U::BITS)?, packed.len())?;
        }
        check_len("update", self.n_outputs, self.update.len())?;
        check_len("scores", n * self.n_outputs, buffers.scores.len())?;
        if let Some(weights) = self.weights {
            check_len("weights", n, weights.len())?;
        }

        let stride = if self.hessian { 2 } else { 1 };
        if let Some(grad_hess) = &buffers.grad_hess {
            check_len("grad_hess", n * self.n_outputs * stride, grad_hess.len())?;
        }

        let mode = mode(objective, self, buffers.grad_hess.is_some());
        let needs_targets = mode != Mode::Residuals && (buffers.grad_hess.is_some() || self.calc_metric);
        if needs_targets {
            let per_sample = match self.targets {
                TargetValues::Continuous(_) => self.n_outputs,
                _ => 1,
            };
            check_len("targets", n * per_sample, self.targets.len())?;
        }
        if mode == Mode::Multiclass {
            check_len("scratch", self.n_outputs * lanes, buffers.scratch.len())?;
            if needs_targets && !matches!(self.targets, TargetValues::Class(_)) {
                return Err(ComputeError::WidthMismatch { buffer: "targets" });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Kernel
// =============================================================================

struct Updater<'a, T, U, O> {
    objective: &'a O,
    mode: Mode,
    n_outputs: usize,
    hessian: bool,
    calc_metric: bool,
    update: &'a [T],
    targets: TargetValues<'a, T, U>,
    weights: Option<&'a [T]>,
    scores: &'a mut [T],
    grad_hess: Option<&'a mut [T]>,
    scratch: &'a mut [T],
    metric: MetricSum,
}

#[inline(always)]
fn idx<L: FloatLanes>(v: usize) -> L::UInt {
    L::UInt::splat(<L::UInt as UIntLanes>::Scalar::from_index(v))
}

impl<T: LaneScalar, U: LaneUInt, O: Objective> Updater<'_, T, U, O> {
    #[inline(always)]
    fn body<L: FloatLanes<Scalar = T>>(&mut self, samples: L::UInt, slots: L::UInt) {
        let n = self.n_outputs;
        let score_base = samples.mul_scalar(<L::UInt as UIntLanes>::Scalar::from_index(n));
        let update_base = slots.mul_scalar(<L::UInt as UIntLanes>::Scalar::from_index(n));

        let term = match self.mode {
            Mode::Residuals => self.residuals::<L>(score_base, update_base),
            Mode::Independent => self.independent::<L>(samples, score_base, update_base),
            Mode::Multiclass => self.multiclass::<L>(samples, score_base, update_base),
        };

        if self.calc_metric {
            let weight = match self.weights {
                Some(w) => L::gather(w, samples),
                None => L::one(),
            };
            self.metric.sum += (weight * term).sum().as_f64();
            self.metric.weight_total += weight.sum().as_f64();
        }
    }

    /// Add the update at `update_base + k` into the score at `score_base + k`.
    #[inline(always)]
    fn add_update<L: FloatLanes<Scalar = T>>(&mut self, score_ix: L::UInt, update_ix: L::UInt) -> L {
        let score = L::gather(self.scores, score_ix) + L::gather(self.update, update_ix);
        score.scatter(self.scores, score_ix);
        score
    }

    #[inline(always)]
    fn residuals<L: FloatLanes<Scalar = T>>(&mut self, score_base: L::UInt, update_base: L::UInt) -> L {
        let mut term = L::zero();
        for k in 0..self.n_outputs {
            let update = L::gather(self.update, update_base + idx::<L>(k));
            let score_ix = score_base + idx::<L>(k);
            (L::gather(self.scores, score_ix) + update).scatter(self.scores, score_ix);
            if let Some(residuals) = self.grad_hess.as_deref_mut() {
                let r = L::gather(residuals, score_ix) + update;
                r.scatter(residuals, score_ix);
                term = term + r * r;
            }
        }
        term
    }

    #[inline(always)]
    fn independent<L: FloatLanes<Scalar = T>>(
        &mut self,
        samples: L::UInt,
        score_base: L::UInt,
        update_base: L::UInt,
    ) -> L {
        let n = self.n_outputs;
        let stride = if self.hessian { 2 } else { 1 };
        let needs_targets = self.grad_hess.is_some() || self.calc_metric;
        let grad_base = samples.mul_scalar(<L::UInt as UIntLanes>::Scalar::from_index(n * stride));

        let mut term = L::zero();
        for k in 0..n {
            let score = self.add_update::<L>(score_base + idx::<L>(k), update_base + idx::<L>(k));
            if !needs_targets {
                continue;
            }
            let target = self.target::<L>(samples, score_base, k);
            if let Some(grad_hess) = self.grad_hess.as_deref_mut() {
                let gi = grad_base + idx::<L>(k * stride);
                if self.hessian {
                    let (g, h) = self.objective.gradient_hessian(score, target);
                    g.scatter(grad_hess, gi);
                    h.scatter(grad_hess, gi + idx::<L>(1));
                } else {
                    self.objective.gradient(score, target).scatter(grad_hess, gi);
                }
            }
            if self.calc_metric {
                term = term + self.objective.metric(score, target);
            }
        }
        term
    }

    #[inline(always)]
    fn multiclass<L: FloatLanes<Scalar = T>>(
        &mut self,
        samples: L::UInt,
        score_base: L::UInt,
        update_base: L::UInt,
    ) -> L {
        let n = self.n_outputs;
        let lanes = L::LANES;
        let stride = if self.hessian { 2 } else { 1 };

        let mut max = L::splat(T::neg_infinity());
        for k in 0..n {
            let score = self.add_update::<L>(score_base + idx::<L>(k), update_base + idx::<L>(k));
            score.store(&mut self.scratch[k * lanes..]);
            max = L::max(max, score);
        }
        if self.grad_hess.is_none() && !self.calc_metric {
            return L::zero();
        }

        let mut total = L::zero();
        for k in 0..n {
            let e = (L::load(&self.scratch[k * lanes..]) - max).exp();
            e.store(&mut self.scratch[k * lanes..]);
            total = total + e;
        }

        let class = match self.targets {
            TargetValues::Class(c) => class_lanes::<L, U>(c, samples),
            _ => idx::<L>(0),
        };
        let grad_base = samples.mul_scalar(<L::UInt as UIntLanes>::Scalar::from_index(n * stride));
        let mut prob_of_target = L::one();
        for k in 0..n {
            let prob = L::load(&self.scratch[k * lanes..]) / total;
            if let Some(grad_hess) = self.grad_hess.as_deref_mut() {
                let indicator = L::if_equal(class, idx::<L>(k), L::one(), L::zero());
                let (g, h) = self.objective.multiclass_gradient_hessian(prob, indicator);
                let gi = grad_base + idx::<L>(k * stride);
                g.scatter(grad_hess, gi);
                if self.hessian {
                    h.scatter(grad_hess, gi + idx::<L>(1));
                }
            }
            prob_of_target = L::if_equal(class, idx::<L>(k), prob, prob_of_target);
        }
        if self.calc_metric {
            self.objective.multiclass_metric(prob_of_target)
        } else {
            L::zero()
        }
    }

    /// Target lanes of output `k`. Binary class targets become 0.0 / 1.0;
    /// with several outputs a class target is the indicator of class `k`.
    #[inline(always)]
    fn target<L: FloatLanes<Scalar = T>>(&self, samples: L::UInt, score_base: L::UInt, k: usize) -> L {
        match self.targets {
            TargetValues::Continuous(t) => L::gather(t, score_base + idx::<L>(k)),
            TargetValues::Class(c) => {
                let positive = if self.n_outputs == 1 { 1 } else { k };
                L::if_equal(class_lanes::<L, U>(c, samples), idx::<L>(positive), L::one(), L::zero())
            }
            TargetValues::None => L::zero(),
        }
    }
}

#[inline(always)]
fn class_lanes<L: FloatLanes, U: LaneUInt>(classes: &[U], samples: L::UInt) -> L::UInt {
    let ix = samples.to_indices();
    L::UInt::from_fn(|lane| <L::UInt as UIntLanes>::Scalar::from_index(classes[ix[lane]].as_index()))
}

impl<F: FloatLanes, O: Objective> SampleVisitor<F> for Updater<'_, ScalarOf<F>, IndexOf<F>, O> {
    #[inline(always)]
    fn group(&mut self, samples: F::UInt, slots: F::UInt) {
        self.body::<F>(samples, slots);
    }

    #[inline(always)]
    fn single(&mut self, sample: usize, slot: usize) {
        self.body::<SingleOf<F>>(idx::<SingleOf<F>>(sample), idx::<SingleOf<F>>(slot));
    }
}

/// Apply one update tensor. Call [`UpdateArgs::validate`] first.
///
/// Returns the weighted metric sum; zero when `calc_metric` is unset.
#[inline(always)]
pub fn apply_update<F: FloatLanes, O: Objective>(
    objective: &O,
    args: &UpdateArgs<'_, ScalarOf<F>, IndexOf<F>>,
    buffers: UpdateBuffers<'_, ScalarOf<F>>,
) -> MetricSum {
    let mode = mode(objective, args, buffers.grad_hess.is_some());
    let mut updater = Updater {
        objective,
        mode,
        n_outputs: args.n_outputs,
        hessian: args.hessian && mode != Mode::Residuals,
        calc_metric: args.calc_metric,
        update: args.update,
        targets: args.targets,
        weights: args.weights,
        scores: buffers.scores,
        grad_hess: buffers.grad_hess,
        scratch: buffers.scratch,
        metric: MetricSum::default(),
    };
    walk_samples::<F, _>(args.n_samples, args.packing, args.packed, &mut updater);
    updater.metric
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::{ScalarF64, Simd128F32, Simd256F32};
    use crate::objectives::{LogisticLoss, SoftmaxLoss, SquaredLoss};
    use crate::packing::pack;
    use approx::assert_relative_eq;

    fn args<'a, T, U>(n_samples: usize, update: &'a [T], packed: Option<&'a [U]>, packing: Packing) -> UpdateArgs<'a, T, U> {
        UpdateArgs {
            n_outputs: 1,
            hessian: false,
            calc_metric: true,
            n_samples,
            packing,
            packed,
            update,
            targets: TargetValues::None,
            weights: None,
        }
    }

    #[test]
    fn squared_error_by_hand() {
        let stream = pack::<u64>(&[0, 1, 1], Packing::Bits(1)).unwrap();
        let update = [1.0, 2.0];
        let targets = [1.0, 1.0, 3.0];
        let a = UpdateArgs {
            targets: TargetValues::Continuous(&targets),
            ..args(3, &update, Some(&stream[..]), Packing::Bits(1))
        };
        let mut scores = [0.0; 3];
        let mut grads = [0.0; 3];
        let buffers = UpdateBuffers {
            scores: &mut scores,
            grad_hess: Some(&mut grads),
            scratch: &mut [],
        };
        a.validate(&SquaredLoss, &buffers, 1).unwrap();
        let metric = apply_update::<ScalarF64, _>(&SquaredLoss, &a, buffers);
        assert_eq!(scores, [1.0, 2.0, 2.0]);
        assert_eq!(grads, [0.0, 1.0, -1.0]);
        assert_eq!(metric, MetricSum { sum: 2.0, weight_total: 3.0 });
    }

    #[test]
    fn residual_path_matches_generic_path() {
        let n = 29;
        let indices: Vec<usize> = (0..n).map(|i| i % 3).collect();
        let stream = pack::<u32>(&indices, Packing::Bits(2)).unwrap();
        let update = [0.5f32, -0.25, 1.0];
        let targets: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();
        let weights: Vec<f32> = (0..n).map(|i| 1.0 + (i % 4) as f32).collect();
        let base = UpdateArgs {
            weights: Some(&weights[..]),
            ..args(n, &update, Some(&stream[..]), Packing::Bits(2))
        };

        // generic: gradients recomputed from targets
        let mut scores_a = vec![0.1f32; n];
        let mut grads_a = vec![0.0f32; n];
        let generic = UpdateArgs {
            targets: TargetValues::Continuous(&targets),
            ..base
        };
        let m_a = apply_update::<Simd256F32, _>(
            &SquaredLoss,
            &generic,
            UpdateBuffers { scores: &mut scores_a, grad_hess: Some(&mut grads_a), scratch: &mut [] },
        );

        // residuals: gradient buffer starts at score - target
        let mut scores_b = vec![0.1f32; n];
        let mut grads_b: Vec<f32> = targets.iter().map(|y| 0.1 - y).collect();
        let m_b = apply_update::<Simd256F32, _>(
            &SquaredLoss,
            &base,
            UpdateBuffers { scores: &mut scores_b, grad_hess: Some(&mut grads_b), scratch: &mut [] },
        );

        assert_eq!(scores_a, scores_b);
        for (a, b) in grads_a.iter().zip(&grads_b) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        assert_relative_eq!(
            SquaredLoss.finish_metric(m_a.mean()),
            SquaredLoss.finish_metric(m_b.mean()),
            max_relative = 1e-5
        );
    }

    #[test]
    fn zero_update_keeps_scores() {
        let n = 19;
        let stream = pack::<u32>(&vec![1; n], Packing::Bits(3)).unwrap();
        let update = [0.0f32; 8];
        let classes: Vec<u32> = (0..n as u32).map(|i| i % 2).collect();
        let a = UpdateArgs {
            hessian: true,
            targets: TargetValues::Class(&classes),
            ..args(n, &update, Some(&stream[..]), Packing::Bits(3))
        };
        let original: Vec<f32> = (0..n).map(|i| i as f32 * 0.1 - 1.0).collect();
        let mut scores = original.clone();
        let mut gh = vec![0.0f32; 2 * n];
        apply_update::<Simd256F32, _>(
            &LogisticLoss,
            &a,
            UpdateBuffers { scores: &mut scores, grad_hess: Some(&mut gh), scratch: &mut [] },
        );
        assert_eq!(scores, original);
        for i in 0..n {
            let p = 1.0 / (1.0 + (-original[i]).exp());
            assert_relative_eq!(gh[2 * i], p - classes[i] as f32, epsilon = 1e-6);
            assert_relative_eq!(gh[2 * i + 1], p * (1.0 - p), epsilon = 1e-6);
        }
    }

    #[test]
    fn softmax_by_hand() {
        let n_outputs = 3;
        let n = 5;
        let update = [0.0f32, 1.0, 2.0];
        let classes = [0u32, 1, 2, 2, 0];
        let a = UpdateArgs {
            n_outputs,
            hessian: true,
            targets: TargetValues::Class(&classes),
            ..args(n, &update, None, Packing::None)
        };
        let mut scores = vec![0.0f32; n * n_outputs];
        let mut gh = vec![0.0f32; 2 * n * n_outputs];
        let mut scratch = vec![0.0f32; n_outputs * Simd128F32::LANES];
        let obj = SoftmaxLoss::new(n_outputs);
        let buffers = UpdateBuffers { scores: &mut scores, grad_hess: Some(&mut gh), scratch: &mut scratch };
        a.validate(&obj, &buffers, Simd128F32::LANES).unwrap();
        let metric = apply_update::<Simd128F32, _>(&obj, &a, buffers);

        let z: f32 = [0.0f32, 1.0, 2.0].iter().map(|s| s.exp()).sum();
        let probs: Vec<f32> = [0.0f32, 1.0, 2.0].iter().map(|s| s.exp() / z).collect();
        for i in 0..n {
            for k in 0..n_outputs {
                assert_eq!(scores[i * n_outputs + k], k as f32);
                let y = if classes[i] as usize == k { 1.0 } else { 0.0 };
                assert_relative_eq!(gh[2 * (i * n_outputs + k)], probs[k] - y, epsilon = 1e-6);
                assert_relative_eq!(gh[2 * (i * n_outputs + k) + 1], probs[k] * (1.0 - probs[k]), epsilon = 1e-6);
            }
        }
        let expected: f64 = classes.iter().map(|&c| -(probs[c as usize] as f64).ln()).sum();
        assert_relative_eq!(metric.sum, expected, max_relative = 1e-5);
        assert_eq!(metric.weight_total, 5.0);
    }

    #[test]
    fn validation() {
        let update = [0.0f32];
        let a = args::<f32, u32>(4, &update, None, Packing::None);
        let mut scores = [0.0f32; 4];
        let buffers = UpdateBuffers { scores: &mut scores, grad_hess: None, scratch: &mut [] };
        // metric requested but no targets
        assert!(matches!(
            a.validate(&LogisticLoss, &buffers, 4),
            Err(ComputeError::BufferTooSmall { buffer: "targets", .. })
        ));
        let obj = SoftmaxLoss::new(3);
        let classes = [0u32; 4];
        let multi = UpdateArgs {
            n_outputs: 3,
            targets: TargetValues::Class(&classes),
            update: &[0.0; 3],
            ..a
        };
        let mut scores = [0.0f32; 12];
        let buffers = UpdateBuffers { scores: &mut scores, grad_hess: None, scratch: &mut [0.0; 4] };
        assert!(matches!(
            multi.validate(&obj, &buffers, 4),
            Err(ComputeError::BufferTooSmall { buffer: "scratch", required: 12, actual: 4 })
        ));
    }

    #[test]
    fn metric_sum_helpers() {
        let a = MetricSum { sum: 3.0, weight_total: 2.0 };
        let b = MetricSum { sum: 1.0, weight_total: 2.0 };
        assert_eq!(a.combine(b).mean(), 1.0);
        assert_eq!(MetricSum::default().mean(), 0.0);
    }
}

//! Histogram accumulation for split finding (boosting) and interaction
//! detection.
//!
//! Both passes add into caller-zeroed [`BinSumsMut`] accumulators:
//!
//! - `counts[bin] += occurrences`
//! - `weights[bin] += weight`
//! - `grads[bin * n_outputs + k] += weight * occurrences * grad_k`
//! - `hess[bin * n_outputs + k] += weight * occurrences * hess_k` (if requested)
//!
//! Gradients are interleaved per sample and output:
//! `grad_hess[(sample * n_outputs + k) * stride]` with `stride = 2` when
//! hessians are present (hessian at `+ 1`) and `1` otherwise.

use num_traits::{One, Zero};

use super::{walk_samples, SampleVisitor, MAX_DIMENSIONS};
use crate::buffers::{check_len, BinSumsMut};
use crate::error::{ComputeError, Result};
use crate::lanes::{FloatLanes, IndexOf, LaneScalar, LaneUInt, ScalarOf, UIntLanes};
use crate::packing::{packed_len, unpack_one, Packing};

// =============================================================================
// Arguments
// =============================================================================

/// Typed inputs of the boosting pass.
#[derive(Debug, Clone, Copy)]
pub struct BoostingArgs<'a, T, U> {
    pub n_outputs: usize,
    pub hessian: bool,
    pub n_samples: usize,
    pub packing: Packing,
    /// `None`: every sample falls in bin 0.
    pub packed: Option<&'a [U]>,
    pub grad_hess: &'a [T],
    pub weights: Option<&'a [T]>,
    pub occurrences: Option<&'a [u8]>,
}

impl<T, U: LaneUInt> BoostingArgs<'_, T, U> {
    /// Check buffer extents against the request and the accumulators.
    pub fn validate(&self, bins: &BinSumsMut<'_, T>) -> Result<()> {
        self.packing.validate(U::BITS)?;
        if let Some(packed) = self.packed {
            check_len("packed", packed_len(self.n_samples, self.packing, U::BITS)?, packed.len())?;
        }
        check_gradients(self.grad_hess, self.weights, self.n_samples, self.n_outputs, self.hessian)?;
        if let Some(occurrences) = self.occurrences {
            check_len("occurrences", self.n_samples, occurrences.len())?;
        }
        let n_bins = match self.packed {
            Some(_) => bins.n_bins(),
            None => 1,
        };
        bins.check(n_bins, self.n_outputs, self.hessian)
    }
}

/// One dimension of an interaction request.
#[derive(Debug, Clone, Copy)]
pub struct DimensionArgs<'a, U> {
    pub n_bins: usize,
    pub packing: Packing,
    pub packed: &'a [U],
}

impl<U> Default for DimensionArgs<'_, U> {
    fn default() -> Self {
        Self {
            n_bins: 1,
            packing: Packing::None,
            packed: &[],
        }
    }
}

/// Typed inputs of the interaction pass.
#[derive(Debug, Clone, Copy)]
pub struct InteractionArgs<'a, T, U> {
    pub n_outputs: usize,
    pub hessian: bool,
    pub n_samples: usize,
    pub grad_hess: &'a [T],
    pub weights: Option<&'a [T]>,
    /// Lowest-order dimension first. Empty means a single bin.
    pub dimensions: &'a [DimensionArgs<'a, U>],
}

impl<T, U: LaneUInt> InteractionArgs<'_, T, U> {
    /// Bins in the dense tensor: the product of per-dimension bin counts.
    pub fn tensor_bins(&self) -> usize {
        self.dimensions.iter().map(|d| d.n_bins).product()
    }

    pub fn validate(&self, bins: &BinSumsMut<'_, T>) -> Result<()> {
        if self.dimensions.len() > MAX_DIMENSIONS {
            return Err(ComputeError::TooManyDimensions {
                requested: self.dimensions.len(),
                max: MAX_DIMENSIONS,
            });
        }
        for dim in self.dimensions {
            dim.packing.validate(U::BITS)?;
            check_len("dimension.packed", packed_len(self.n_samples, dim.packing, U::BITS)?, dim.packed.len())?;
        }
        check_gradients(self.grad_hess, self.weights, self.n_samples, self.n_outputs, self.hessian)?;
        bins.check(self.tensor_bins(), self.n_outputs, self.hessian)
    }
}

fn check_gradients<T>(
    grad_hess: &[T],
    weights: Option<&[T]>,
    n_samples: usize,
    n_outputs: usize,
    hessian: bool,
) -> Result<()> {
    let stride = if hessian { 2 } else { 1 };
    check_len("grad_hess", n_samples * n_outputs * stride, grad_hess.len())?;
    if let Some(weights) = weights {
        check_len("weights", n_samples, weights.len())?;
    }
    Ok(())
}

// =============================================================================
// Accumulation
// =============================================================================

struct Accumulate<'r, 'a, T> {
    n_outputs: usize,
    hessian: bool,
    grad_hess: &'r [T],
    weights: Option<&'r [T]>,
    occurrences: Option<&'r [u8]>,
    bins: &'r mut BinSumsMut<'a, T>,
}

impl<F: FloatLanes> SampleVisitor<F> for Accumulate<'_, '_, ScalarOf<F>> {
    #[inline(always)]
    fn group(&mut self, samples: F::UInt, slots: F::UInt) {
        let n_outputs = self.n_outputs;
        let stride = if self.hessian { 2 } else { 1 };
        let sample_ix = samples.to_indices();
        let bin_ix = slots.to_indices();

        let weight = match self.weights {
            Some(w) => F::gather(w, samples),
            None => F::one(),
        };
        let scale = match self.occurrences {
            Some(occ) => {
                for lane in 0..F::LANES {
                    debug_assert!(bin_ix[lane] < self.bins.counts.len());
                    self.bins.counts[bin_ix[lane]] += occ[sample_ix[lane]] as u64;
                }
                weight * F::from_fn(|lane| ScalarOf::<F>::from_f64(occ[sample_ix[lane]] as f64))
            }
            None => {
                for &bin in &bin_ix[..F::LANES] {
                    debug_assert!(bin < self.bins.counts.len());
                    self.bins.counts[bin] += 1;
                }
                weight
            }
        };
        weight.scatter_add(self.bins.weights, slots);

        let grad_base = samples.mul_scalar(IndexOf::<F>::from_index(n_outputs * stride));
        let slot_base = slots.mul_scalar(IndexOf::<F>::from_index(n_outputs));
        for k in 0..n_outputs {
            let grad_ix = grad_base + F::UInt::splat(IndexOf::<F>::from_index(k * stride));
            let slot_ix = slot_base + F::UInt::splat(IndexOf::<F>::from_index(k));
            (F::gather(self.grad_hess, grad_ix) * scale).scatter_add(self.bins.grads, slot_ix);
            if !self.hessian {
                continue;
            }
            if let Some(hess) = self.bins.hess.as_deref_mut() {
                let hess_ix = grad_ix + F::UInt::splat(IndexOf::<F>::one());
                (F::gather(self.grad_hess, hess_ix) * scale).scatter_add(hess, slot_ix);
            }
        }
    }

    #[inline(always)]
    fn single(&mut self, sample: usize, bin: usize) {
        debug_assert!(bin < self.bins.counts.len());
        let n_outputs = self.n_outputs;
        let stride = if self.hessian { 2 } else { 1 };
        let weight = self.weights.map_or(ScalarOf::<F>::one(), |w| w[sample]);
        let occurrences = self.occurrences.map_or(1, |occ| occ[sample]);
        let scale = weight * ScalarOf::<F>::from_f64(occurrences as f64);

        self.bins.counts[bin] += occurrences as u64;
        self.bins.weights[bin] += weight;
        for k in 0..n_outputs {
            let gi = (sample * n_outputs + k) * stride;
            let slot = bin * n_outputs + k;
            self.bins.grads[slot] += self.grad_hess[gi] * scale;
            if !self.hessian {
                continue;
            }
            if let Some(hess) = self.bins.hess.as_deref_mut() {
                hess[slot] += self.grad_hess[gi + 1] * scale;
            }
        }
    }
}

// =============================================================================
// Boosting pass
// =============================================================================

/// Accumulate one boosting histogram.
///
/// Call [`BoostingArgs::validate`] first; bin indices are only
/// `debug_assert!`ed against the accumulator extent.
#[inline(always)]
pub fn bin_sums_boosting<F: FloatLanes>(
    args: &BoostingArgs<'_, ScalarOf<F>, IndexOf<F>>,
    bins: &mut BinSumsMut<'_, ScalarOf<F>>,
) {
    let mut acc = Accumulate {
        n_outputs: args.n_outputs,
        hessian: args.hessian && bins.hess.is_some(),
        grad_hess: args.grad_hess,
        weights: args.weights,
        occurrences: args.occurrences,
        bins,
    };
    walk_samples::<F, _>(args.n_samples, args.packing, args.packed, &mut acc);
}

// =============================================================================
// Interaction pass
// =============================================================================

/// Accumulate one dense interaction histogram.
///
/// The flat bin of a sample is `sum_d bin_d * prod_{e < d} n_bins_e`.
#[inline(always)]
pub fn bin_sums_interaction<F: FloatLanes>(
    args: &InteractionArgs<'_, ScalarOf<F>, IndexOf<F>>,
    bins: &mut BinSumsMut<'_, ScalarOf<F>>,
) {
    let dims = args.dimensions;
    debug_assert!(dims.len() <= MAX_DIMENSIONS);
    let mut strides = [0usize; MAX_DIMENSIONS];
    let mut stride = 1;
    for (d, dim) in dims.iter().enumerate() {
        strides[d] = stride;
        stride *= dim.n_bins;
    }

    let mut acc = Accumulate {
        n_outputs: args.n_outputs,
        hessian: args.hessian && bins.hess.is_some(),
        grad_hess: args.grad_hess,
        weights: args.weights,
        occurrences: None,
        bins,
    };

    let lanes = F::LANES;
    let iota = F::UInt::iota();
    let whole = args.n_samples - args.n_samples % lanes;
    for base in (0..whole).step_by(lanes) {
        let mut flat = F::UInt::splat(IndexOf::<F>::zero());
        for (d, dim) in dims.iter().enumerate() {
            let bin = F::UInt::from_fn(|lane| {
                IndexOf::<F>::from_index(unpack_one(dim.packed, dim.packing, base + lane))
            });
            flat = flat + bin.mul_scalar(IndexOf::<F>::from_index(strides[d]));
        }
        let samples = iota + F::UInt::splat(IndexOf::<F>::from_index(base));
        SampleVisitor::<F>::group(&mut acc, samples, flat);
    }
    for sample in whole..args.n_samples {
        let flat: usize = dims
            .iter()
            .zip(&strides)
            .map(|(dim, &stride)| unpack_one(dim.packed, dim.packing, sample) * stride)
            .sum();
        SampleVisitor::<F>::single(&mut acc, sample, flat);
    }
}

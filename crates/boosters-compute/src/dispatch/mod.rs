//! Runtime backend selection.
//!
//! A zone is one objective monomorphized for one lane backend. The binding
//! holds it as `Box<dyn ComputeZone>`, so the virtual call is paid once per
//! kernel invocation and never per sample.
//!
//! [`CpuZone`] covers every CPU backend; the lane type decides the width.
//! On x86 the 256-bit backend is wrapped in an AVX2 zone when the CPU
//! supports it (see `avx2`); elsewhere it runs the portable build.
//! The CUDA zone (feature `cuda`) lives in [`cuda`].

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod avx2;
#[cfg(feature = "cuda")]
mod cuda;
mod registry;

pub(crate) use registry::{instantiate, objective_names, Instance};

use std::marker::PhantomData;

use crate::binding::{ApplyUpdateRequest, BoostingBinSumsRequest, InteractionBinSumsRequest};
use crate::buffers::{AccumulatorsMut, BinSumsMut, FloatSlice, FloatSliceMut, Targets, UIntSlice};
use crate::error::{ComputeError, Result};
use crate::kernels::{
    self, BoostingArgs, DimensionArgs, InteractionArgs, MetricSum, TargetValues, UpdateArgs,
    UpdateBuffers, MAX_DIMENSIONS,
};
use crate::lanes::{FloatLanes, IndexOf, LaneScalar, LaneUInt, ScalarOf};
use crate::objectives::Objective;

/// The kernel table behind a binding.
///
/// Implementations downcast width-erased buffers to their element types,
/// check extents and run the kernels. Output-count and hessian checks are
/// done by the binding before dispatch.
pub(crate) trait ComputeZone: Send + Sync {
    fn lane_width(&self) -> usize;

    fn apply_update(&self, request: &mut ApplyUpdateRequest<'_>) -> Result<MetricSum>;

    fn finish_metric(&self, mean: f64) -> f64;

    fn check_targets(&self, targets: &Targets<'_>) -> bool;

    fn bin_sums_boosting(&self, request: &mut BoostingBinSumsRequest<'_>) -> Result<()>;

    fn bin_sums_interaction(&self, request: &mut InteractionBinSumsRequest<'_>) -> Result<()>;
}

// =============================================================================
// Downcasts
// =============================================================================

fn floats<'a, T: LaneScalar>(buffer: &'static str, s: FloatSlice<'a>) -> Result<&'a [T]> {
    T::floats(&s).ok_or(ComputeError::WidthMismatch { buffer })
}

fn floats_mut<'r, T: LaneScalar>(buffer: &'static str, s: &'r mut FloatSliceMut<'_>) -> Result<&'r mut [T]> {
    T::floats_mut(s).ok_or(ComputeError::WidthMismatch { buffer })
}

fn uints<'a, U: LaneUInt>(buffer: &'static str, s: UIntSlice<'a>) -> Result<&'a [U]> {
    U::uints(&s).ok_or(ComputeError::WidthMismatch { buffer })
}

fn targets<'a, T: LaneScalar, U: LaneUInt>(targets: Option<Targets<'a>>) -> Result<TargetValues<'a, T, U>> {
    Ok(match targets {
        None => TargetValues::None,
        Some(Targets::Continuous(t)) => TargetValues::Continuous(floats("targets", t)?),
        Some(Targets::Class(c)) => TargetValues::Class(uints("targets", c)?),
    })
}

fn boosting_args<'a, T: LaneScalar, U: LaneUInt>(r: &BoostingBinSumsRequest<'a>) -> Result<BoostingArgs<'a, T, U>> {
    Ok(BoostingArgs {
        n_outputs: r.n_outputs,
        hessian: r.hessian,
        n_samples: r.n_samples,
        packing: r.packing,
        packed: r.packed.map(|p| uints("packed", p)).transpose()?,
        grad_hess: floats("grad_hess", r.grad_hess)?,
        weights: r.weights.map(|w| floats("weights", w)).transpose()?,
        occurrences: r.occurrences,
    })
}

/// Typed dimensions written into a caller-provided stack array.
fn dimension_args<'a, U: LaneUInt>(
    r: &InteractionBinSumsRequest<'a>,
    dims: &mut [DimensionArgs<'a, U>; MAX_DIMENSIONS],
) -> Result<usize> {
    if r.dimensions.len() > MAX_DIMENSIONS {
        return Err(ComputeError::TooManyDimensions {
            requested: r.dimensions.len(),
            max: MAX_DIMENSIONS,
        });
    }
    for (slot, dim) in dims.iter_mut().zip(r.dimensions) {
        *slot = DimensionArgs {
            n_bins: dim.n_bins,
            packing: dim.packing,
            packed: uints("dimension.packed", dim.packed)?,
        };
    }
    Ok(r.dimensions.len())
}

fn interaction_args<'d, 'a: 'd, T: LaneScalar, U: LaneUInt>(
    r: &InteractionBinSumsRequest<'a>,
    dimensions: &'d [DimensionArgs<'a, U>],
) -> Result<InteractionArgs<'d, T, U>> {
    Ok(InteractionArgs {
        n_outputs: r.n_outputs,
        hessian: r.hessian,
        n_samples: r.n_samples,
        grad_hess: floats("grad_hess", r.grad_hess)?,
        weights: r.weights.map(|w| floats("weights", w)).transpose()?,
        dimensions,
    })
}

fn bins_mut<'r, 'a, T: LaneScalar>(
    bins: &'r mut AccumulatorsMut<'a>,
) -> Result<&'r mut BinSumsMut<'a, T>> {
    T::bins_mut(bins).ok_or(ComputeError::WidthMismatch { buffer: "bins" })
}

// =============================================================================
// CPU zone
// =============================================================================

/// An objective bound to a CPU lane backend.
pub(crate) struct CpuZone<F, O> {
    objective: O,
    _lanes: PhantomData<fn() -> F>,
}

impl<F: FloatLanes, O: Objective> CpuZone<F, O> {
    pub(crate) fn new(objective: O) -> Self {
        Self {
            objective,
            _lanes: PhantomData,
        }
    }

    // The `run_*` bodies are force-inlined so a `#[target_feature]` caller
    // compiles the whole kernel for its instruction set.

    #[inline(always)]
    pub(crate) fn run_apply_update(&self, r: &mut ApplyUpdateRequest<'_>) -> Result<MetricSum> {
        let args: UpdateArgs<'_, ScalarOf<F>, IndexOf<F>> = UpdateArgs {
            n_outputs: r.n_outputs,
            hessian: r.hessian,
            calc_metric: r.calc_metric,
            n_samples: r.n_samples,
            packing: r.packing,
            packed: r.packed.map(|p| uints("packed", p)).transpose()?,
            update: floats("update", r.update)?,
            targets: targets(r.targets)?,
            weights: r.weights.map(|w| floats("weights", w)).transpose()?,
        };
        let buffers = UpdateBuffers {
            scores: floats_mut("scores", &mut r.scores)?,
            grad_hess: match &mut r.grad_hess {
                Some(g) => Some(floats_mut("grad_hess", g)?),
                None => None,
            },
            scratch: match &mut r.scratch {
                Some(s) => floats_mut("scratch", s)?,
                None => Default::default(),
            },
        };
        args.validate(&self.objective, &buffers, F::LANES)?;
        Ok(kernels::apply_update::<F, O>(&self.objective, &args, buffers))
    }

    #[inline(always)]
    pub(crate) fn run_bin_sums_boosting(&self, r: &mut BoostingBinSumsRequest<'_>) -> Result<()> {
        let args = boosting_args::<ScalarOf<F>, IndexOf<F>>(r)?;
        let bins = bins_mut(&mut r.bins)?;
        args.validate(bins)?;
        kernels::bin_sums_boosting::<F>(&args, bins);
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn run_bin_sums_interaction(&self, r: &mut InteractionBinSumsRequest<'_>) -> Result<()> {
        let mut dims = [DimensionArgs::<IndexOf<F>>::default(); MAX_DIMENSIONS];
        let n_dims = dimension_args(r, &mut dims)?;
        let args = interaction_args::<ScalarOf<F>, IndexOf<F>>(r, &dims[..n_dims])?;
        let bins = bins_mut(&mut r.bins)?;
        args.validate(bins)?;
        kernels::bin_sums_interaction::<F>(&args, bins);
        Ok(())
    }
}

impl<F: FloatLanes, O: Objective> ComputeZone for CpuZone<F, O> {
    fn lane_width(&self) -> usize {
        F::LANES
    }

    fn apply_update(&self, r: &mut ApplyUpdateRequest<'_>) -> Result<MetricSum> {
        self.run_apply_update(r)
    }

    fn finish_metric(&self, mean: f64) -> f64 {
        self.objective.finish_metric(mean)
    }

    fn check_targets(&self, targets: &Targets<'_>) -> bool {
        self.objective.check_targets(targets)
    }

    fn bin_sums_boosting(&self, r: &mut BoostingBinSumsRequest<'_>) -> Result<()> {
        self.run_bin_sums_boosting(r)
    }

    fn bin_sums_interaction(&self, r: &mut InteractionBinSumsRequest<'_>) -> Result<()> {
        self.run_bin_sums_interaction(r)
    }
}

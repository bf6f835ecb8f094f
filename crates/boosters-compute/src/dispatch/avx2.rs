//! AVX2 zone.
//!
//! `wide::f32x8` fixes its representation at compile time: without
//! `-C target-feature=+avx2` it is two 128-bit halves. This zone runs the
//! 256-bit kernels inside `#[target_feature(enable = "avx2")]` functions so
//! the inlined kernel bodies are code-generated for AVX2 regardless of the
//! build flags. It is only constructed after runtime detection succeeds.

use super::{ComputeZone, CpuZone};
use crate::binding::{ApplyUpdateRequest, BoostingBinSumsRequest, InteractionBinSumsRequest};
use crate::buffers::Targets;
use crate::error::Result;
use crate::kernels::MetricSum;
use crate::lanes::Simd256F32;
use crate::objectives::Objective;

/// The 256-bit zone, entered through AVX2-enabled wrappers.
pub(crate) struct Avx2Zone<O> {
    inner: CpuZone<Simd256F32, O>,
}

impl<O: Objective> Avx2Zone<O> {
    /// Wrap `objective` if the CPU supports AVX2, otherwise hand it back.
    pub(crate) fn new(objective: O) -> std::result::Result<Self, O> {
        if std::is_x86_feature_detected!("avx2") {
            Ok(Self {
                inner: CpuZone::new(objective),
            })
        } else {
            Err(objective)
        }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn apply_update_avx2<O: Objective>(
    zone: &CpuZone<Simd256F32, O>,
    r: &mut ApplyUpdateRequest<'_>,
) -> Result<MetricSum> {
    zone.run_apply_update(r)
}

#[target_feature(enable = "avx2")]
unsafe fn bin_sums_boosting_avx2<O: Objective>(
    zone: &CpuZone<Simd256F32, O>,
    r: &mut BoostingBinSumsRequest<'_>,
) -> Result<()> {
    zone.run_bin_sums_boosting(r)
}

#[target_feature(enable = "avx2")]
unsafe fn bin_sums_interaction_avx2<O: Objective>(
    zone: &CpuZone<Simd256F32, O>,
    r: &mut InteractionBinSumsRequest<'_>,
) -> Result<()> {
    zone.run_bin_sums_interaction(r)
}

impl<O: Objective> ComputeZone for Avx2Zone<O> {
    fn lane_width(&self) -> usize {
        self.inner.lane_width()
    }

    fn apply_update(&self, r: &mut ApplyUpdateRequest<'_>) -> Result<MetricSum> {
        // SAFETY: AVX2 was detected in `Avx2Zone::new`.
        unsafe { apply_update_avx2(&self.inner, r) }
    }

    fn finish_metric(&self, mean: f64) -> f64 {
        self.inner.finish_metric(mean)
    }

    fn check_targets(&self, targets: &Targets<'_>) -> bool {
        self.inner.check_targets(targets)
    }

    fn bin_sums_boosting(&self, r: &mut BoostingBinSumsRequest<'_>) -> Result<()> {
        // SAFETY: AVX2 was detected in `Avx2Zone::new`.
        unsafe { bin_sums_boosting_avx2(&self.inner, r) }
    }

    fn bin_sums_interaction(&self, r: &mut InteractionBinSumsRequest<'_>) -> Result<()> {
        // SAFETY: AVX2 was detected in `Avx2Zone::new`.
        unsafe { bin_sums_interaction_avx2(&self.inner, r) }
    }
}

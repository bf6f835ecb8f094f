//! The public handle: one objective bound to one backend.
//!
//! [`ObjectiveBinding::create`] parses the objective string, instantiates the
//! objective for the requested backend and copies its scalar parameters out.
//! The binding then exposes five operations:
//!
//! | operation | request |
//! |---|---|
//! | [`apply_update`](ObjectiveBinding::apply_update) | [`ApplyUpdateRequest`] |
//! | [`finish_metric`](ObjectiveBinding::finish_metric) | metric mean |
//! | [`check_targets`](ObjectiveBinding::check_targets) | [`Targets`] |
//! | [`bin_sums_boosting`](ObjectiveBinding::bin_sums_boosting) | [`BoostingBinSumsRequest`] |
//! | [`bin_sums_interaction`](ObjectiveBinding::bin_sums_interaction) | [`InteractionBinSumsRequest`] |
//!
//! The binding holds no per-call state; its operations take `&self` and may
//! run concurrently on disjoint buffers.
//!
//! # Example
//!
//! ```
//! use boosters_compute::{
//!     Backend, BinSums, BoostingBinSumsRequest, NumericConfig, ObjectiveBinding, Packing, pack,
//! };
//!
//! let binding = ObjectiveBinding::create(&NumericConfig::default(), "rmse", Backend::Scalar).unwrap();
//!
//! let packing = Packing::for_bins(4, 64);
//! let packed = pack::<u64>(&[0, 3, 3, 1], packing).unwrap();
//! let grads = [0.5, -1.0, 2.0, 0.25];
//! let mut bins = BinSums::<f64>::new(4, 1, false);
//!
//! let mut request = BoostingBinSumsRequest::builder()
//!     .n_samples(4)
//!     .packing(packing)
//!     .packed(&packed[..])
//!     .grad_hess(&grads[..])
//!     .bins(bins.as_mut())
//!     .build();
//! binding.bin_sums_boosting(&mut request).unwrap();
//! drop(request);
//!
//! assert_eq!(bins.counts(), &[1, 1, 0, 2]);
//! assert_eq!(bins.grads()[3], 1.0);
//! ```

use bon::Builder;

use crate::buffers::{AccumulatorsMut, FloatSlice, FloatSliceMut, Targets, UIntSlice};
use crate::config::{Backend, NumericConfig};
use crate::dispatch::{self, ComputeZone};
use crate::error::{ComputeError, Result};
use crate::objectives::{ObjectiveInfo, ObjectiveSpec};
use crate::packing::Packing;

// =============================================================================
// Requests
// =============================================================================

/// Inputs and accumulators of one boosting histogram pass.
#[derive(Debug, Builder)]
pub struct BoostingBinSumsRequest<'a> {
    #[builder(default = 1)]
    pub n_outputs: usize,
    /// `grad_hess` interleaves hessians and they are accumulated.
    #[builder(default)]
    pub hessian: bool,
    #[builder(default)]
    pub packing: Packing,
    pub n_samples: usize,
    /// Packed bin indices. `None`: a single-bin term.
    #[builder(into)]
    pub packed: Option<UIntSlice<'a>>,
    #[builder(into)]
    pub grad_hess: FloatSlice<'a>,
    #[builder(into)]
    pub weights: Option<FloatSlice<'a>>,
    /// Bag multiplicities; absent means 1.
    pub occurrences: Option<&'a [u8]>,
    #[builder(into)]
    pub bins: AccumulatorsMut<'a>,
}

/// One feature of an interaction request.
#[derive(Debug, Clone, Copy)]
pub struct Dimension<'a> {
    pub n_bins: usize,
    pub packing: Packing,
    pub packed: UIntSlice<'a>,
}

impl<'a> Dimension<'a> {
    pub fn new(n_bins: usize, packing: Packing, packed: impl Into<UIntSlice<'a>>) -> Self {
        Self {
            n_bins,
            packing,
            packed: packed.into(),
        }
    }
}

/// Inputs and accumulators of one dense interaction histogram.
///
/// The flat bin of a sample is `sum_d bin_d * prod_{e < d} n_bins_e`; the
/// accumulators need `prod_d n_bins_d` bins.
#[derive(Debug, Builder)]
pub struct InteractionBinSumsRequest<'a> {
    #[builder(default = 1)]
    pub n_outputs: usize,
    #[builder(default)]
    pub hessian: bool,
    pub n_samples: usize,
    /// At most [`MAX_DIMENSIONS`](crate::MAX_DIMENSIONS). Empty: a single bin.
    #[builder(default)]
    pub dimensions: &'a [Dimension<'a>],
    #[builder(into)]
    pub grad_hess: FloatSlice<'a>,
    #[builder(into)]
    pub weights: Option<FloatSlice<'a>>,
    #[builder(into)]
    pub bins: AccumulatorsMut<'a>,
}

/// Metric written by [`ObjectiveBinding::apply_update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricOut {
    /// `sum(weight * term)` in double precision.
    pub sum: f64,
    pub weight_total: f64,
    /// `finish_metric(sum / weight_total)`.
    pub value: f64,
}

/// Inputs and in-place outputs of one update pass.
#[derive(Debug, Builder)]
pub struct ApplyUpdateRequest<'a> {
    #[builder(default = 1)]
    pub n_outputs: usize,
    /// Store hessians interleaved with gradients.
    #[builder(default)]
    pub hessian: bool,
    #[builder(default)]
    pub calc_metric: bool,
    pub n_samples: usize,
    #[builder(default)]
    pub packing: Packing,
    /// Packed slot indices into `update`. `None`: every sample uses slot 0.
    #[builder(into)]
    pub packed: Option<UIntSlice<'a>>,
    /// `n_outputs` values per slot; already scaled by the learning rate.
    #[builder(into)]
    pub update: FloatSlice<'a>,
    /// Required when gradients or the metric are computed, except for
    /// `rmse` whose gradient buffer holds residuals.
    pub targets: Option<Targets<'a>>,
    #[builder(into)]
    pub weights: Option<FloatSlice<'a>>,
    #[builder(into)]
    pub scores: FloatSliceMut<'a>,
    /// Gradients (and hessians) for the next pass.
    #[builder(into)]
    pub grad_hess: Option<FloatSliceMut<'a>>,
    /// Multiclass staging, [`ObjectiveBinding::scratch_len`] values.
    #[builder(into)]
    pub scratch: Option<FloatSliceMut<'a>>,
    /// Written on return when `calc_metric` is set.
    #[builder(skip)]
    pub metric: MetricOut,
}

// =============================================================================
// Binding
// =============================================================================

/// An objective bound to a backend and numeric configuration.
pub struct ObjectiveBinding {
    zone: Box<dyn ComputeZone>,
    objective: &'static str,
    info: ObjectiveInfo,
    backend: Backend,
    config: NumericConfig,
}

impl std::fmt::Debug for ObjectiveBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveBinding")
            .field("objective", &self.objective)
            .field("backend", &self.backend)
            .field("lane_width", &self.lane_width())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ObjectiveBinding {
    /// Bind `objective` (`name[:param=value,...]`) to `backend`.
    ///
    /// [`Backend::Auto`] is resolved here. Either a complete binding is
    /// returned or nothing is allocated.
    pub fn create(config: &NumericConfig, objective: &str, backend: Backend) -> Result<Self> {
        config.validate()?;
        let spec = ObjectiveSpec::parse(objective)?;
        let backend = backend.resolve(config.float_width);
        let instance = dispatch::instantiate(&spec, config, backend)?;
        log::debug!(
            "bound objective '{}' to {} backend ({:?}/{:?}, {} lanes)",
            instance.name,
            backend,
            config.float_width,
            config.uint_width,
            instance.zone.lane_width()
        );
        Ok(Self {
            zone: instance.zone,
            objective: instance.name,
            info: instance.info,
            backend,
            config: config.clone(),
        })
    }

    /// Update scores and optionally gradients and the metric.
    pub fn apply_update(&self, request: &mut ApplyUpdateRequest<'_>) -> Result<()> {
        self.check_request(request.n_outputs, request.hessian)?;
        let sum = self.zone.apply_update(request)?;
        request.metric = if request.calc_metric {
            MetricOut {
                sum: sum.sum,
                weight_total: sum.weight_total,
                value: self.finish_metric(sum.mean()),
            }
        } else {
            MetricOut::default()
        };
        Ok(())
    }

    /// Turn a weighted metric mean into the reported metric.
    pub fn finish_metric(&self, mean: f64) -> f64 {
        self.zone.finish_metric(mean)
    }

    /// Whether every target is in the objective's domain and of this
    /// binding's width.
    pub fn check_targets(&self, targets: &Targets<'_>) -> bool {
        let width_ok = match targets {
            Targets::Continuous(FloatSlice::F32(_)) => self.float_bytes() == 4,
            Targets::Continuous(FloatSlice::F64(_)) => self.float_bytes() == 8,
            Targets::Class(UIntSlice::U32(_)) => self.uint_bytes() == 4,
            Targets::Class(UIntSlice::U64(_)) => self.uint_bytes() == 8,
        };
        width_ok && self.zone.check_targets(targets)
    }

    /// Accumulate one boosting histogram.
    pub fn bin_sums_boosting(&self, request: &mut BoostingBinSumsRequest<'_>) -> Result<()> {
        self.check_request(request.n_outputs, request.hessian)?;
        self.zone.bin_sums_boosting(request)
    }

    /// Accumulate one dense interaction histogram.
    pub fn bin_sums_interaction(&self, request: &mut InteractionBinSumsRequest<'_>) -> Result<()> {
        self.check_request(request.n_outputs, request.hessian)?;
        self.zone.bin_sums_interaction(request)
    }

    fn check_request(&self, n_outputs: usize, hessian: bool) -> Result<()> {
        if n_outputs != self.config.n_outputs {
            return Err(ComputeError::OutputMismatch {
                expected: self.config.n_outputs,
                actual: n_outputs,
            });
        }
        if hessian && !self.info.has_hessian {
            return Err(ComputeError::HessianUnavailable);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Names accepted by [`create`](Self::create).
    pub fn objective_names() -> impl Iterator<Item = &'static str> {
        dispatch::objective_names()
    }

    /// Registry name of the bound objective.
    pub fn objective(&self) -> &'static str {
        self.objective
    }

    pub fn info(&self) -> &ObjectiveInfo {
        &self.info
    }

    /// The resolved backend (never [`Backend::Auto`]).
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn config(&self) -> &NumericConfig {
        &self.config
    }

    pub fn n_outputs(&self) -> usize {
        self.config.n_outputs
    }

    pub fn lane_width(&self) -> usize {
        self.zone.lane_width()
    }

    pub fn float_bytes(&self) -> usize {
        self.config.float_width.bytes()
    }

    pub fn uint_bytes(&self) -> usize {
        self.config.uint_width.bytes()
    }

    /// Scratch values [`ApplyUpdateRequest::scratch`] needs for this binding.
    pub fn scratch_len(&self) -> usize {
        self.config.n_outputs * self.lane_width()
    }
}

impl Drop for ObjectiveBinding {
    fn drop(&mut self) {
        log::trace!("releasing '{}' binding on {} backend", self.objective, self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FloatWidth, UIntWidth};

    fn f32_config(n_outputs: usize) -> NumericConfig {
        NumericConfig::builder()
            .n_outputs(n_outputs)
            .float_width(FloatWidth::F32)
            .uint_width(UIntWidth::U32)
            .build()
            .unwrap()
    }

    #[test]
    fn introspection() {
        let binding = ObjectiveBinding::create(&f32_config(3), "log_loss", Backend::Simd256).unwrap();
        assert_eq!(binding.objective(), "log_loss");
        assert_eq!(binding.backend(), Backend::Simd256);
        assert_eq!(binding.lane_width(), 8);
        assert_eq!(binding.float_bytes(), 4);
        assert_eq!(binding.uint_bytes(), 4);
        assert_eq!(binding.scratch_len(), 24);
        assert!(binding.info().has_hessian);
    }

    #[test]
    fn auto_resolves() {
        let binding = ObjectiveBinding::create(&NumericConfig::default(), "rmse", Backend::Auto).unwrap();
        assert_eq!(binding.backend(), Backend::Scalar);
        let binding = ObjectiveBinding::create(&f32_config(1), "rmse", Backend::Auto).unwrap();
        assert!(matches!(binding.backend(), Backend::Simd128 | Backend::Simd256));
    }

    #[test]
    fn request_checks() {
        let binding = ObjectiveBinding::create(&f32_config(1), "rmse", Backend::Scalar).unwrap();
        let gh = [0.0f32; 4];
        let mut bins = crate::BinSums::<f32>::new(1, 2, true);
        let mut request = BoostingBinSumsRequest::builder()
            .n_outputs(2)
            .n_samples(2)
            .grad_hess(&gh[..])
            .bins(bins.as_mut())
            .build();
        assert_eq!(
            binding.bin_sums_boosting(&mut request),
            Err(ComputeError::OutputMismatch { expected: 1, actual: 2 })
        );
        request.n_outputs = 1;
        request.hessian = true;
        assert_eq!(binding.bin_sums_boosting(&mut request), Err(ComputeError::HessianUnavailable));
    }

    #[test]
    fn target_width_must_match() {
        let binding = ObjectiveBinding::create(&NumericConfig::default(), "rmse", Backend::Scalar).unwrap();
        assert!(binding.check_targets(&Targets::Continuous(FloatSlice::F64(&[1.0]))));
        assert!(!binding.check_targets(&Targets::Continuous(FloatSlice::F32(&[1.0]))));
    }
}

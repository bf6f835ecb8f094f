//! Objective (loss) functions, written once against the lane contract.
//!
//! Every objective implements [`Objective`], whose per-sample math is generic
//! over [`FloatLanes`]. The same source is monomorphized for each backend when
//! the registry instantiates a zone.
//!
//! # Available Objectives
//!
//! | name | type | link |
//! |---|---|---|
//! | `rmse` | [`SquaredLoss`] | identity |
//! | `log_loss` (1 output) | [`LogisticLoss`] | logit |
//! | `log_loss` (k outputs) | [`SoftmaxLoss`] | multinomial logit |
//! | `poisson_deviance` | [`PoissonLoss`] | log |
//! | `gamma_deviance` | [`GammaLoss`] | log |
//! | `tweedie_deviance:variance_power=p` | [`TweedieLoss`] | log |
//! | `pseudo_huber[:delta=d]` | [`PseudoHuberLoss`] | identity |
//!
//! # Objective Strings
//!
//! `name[:param=value[,param=value]*]`, case-insensitive. See [`ObjectiveSpec`].

mod classification;
mod regression;
mod spec;

pub use classification::{LogisticLoss, SoftmaxLoss};
pub use regression::{GammaLoss, PoissonLoss, PseudoHuberLoss, SquaredLoss, TweedieLoss};
pub use spec::{ObjectiveSpec, ParamSpec};

use serde::{Deserialize, Serialize};

use crate::buffers::{FloatSlice, Targets, UIntSlice};
use crate::config::NumericConfig;
use crate::error::Result;
use crate::lanes::FloatLanes;

// =============================================================================
// Target semantics
// =============================================================================

/// Target encoding expected by an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSchema {
    /// Finite real values.
    Continuous,
    /// Finite values `>= 0`.
    NonNegative,
    /// Finite values `> 0`.
    Positive,
    /// Class indices in `[0, n_classes)`.
    ClassIndex { n_classes: usize },
}

impl TargetSchema {
    /// Check every target against the schema.
    ///
    /// A continuous schema rejects class-index targets and vice versa.
    pub fn accepts(self, targets: &Targets<'_>) -> bool {
        match (self, targets) {
            (Self::Continuous, Targets::Continuous(v)) => all_floats(v, f64::is_finite),
            (Self::NonNegative, Targets::Continuous(v)) => all_floats(v, |y| y.is_finite() && y >= 0.0),
            (Self::Positive, Targets::Continuous(v)) => all_floats(v, |y| y.is_finite() && y > 0.0),
            (Self::ClassIndex { n_classes }, Targets::Class(v)) => match *v {
                UIntSlice::U32(c) => c.iter().all(|&y| (y as usize) < n_classes),
                UIntSlice::U64(c) => c.iter().all(|&y| y < n_classes as u64),
            },
            _ => false,
        }
    }

    pub fn is_class(self) -> bool {
        matches!(self, Self::ClassIndex { .. })
    }
}

fn all_floats(values: &FloatSlice<'_>, pred: impl Fn(f64) -> bool) -> bool {
    match *values {
        FloatSlice::F32(v) => v.iter().all(|&y| pred(y as f64)),
        FloatSlice::F64(v) => v.iter().all(|&y| pred(y)),
    }
}

// =============================================================================
// Scalar parameters
// =============================================================================

/// Link function between raw scores and the prediction scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    Identity,
    Logit,
    /// Softmax over the outputs.
    Mlogit,
    Log,
}

/// Scalar parameters copied out of an objective when a binding is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveInfo {
    /// Whether larger metric values are better.
    pub maximize_metric: bool,
    pub link: Link,
    pub link_param: f64,
    pub learning_rate_adjustment_differential_privacy: f64,
    pub learning_rate_adjustment_gradient_boosting: f64,
    pub learning_rate_adjustment_hessian_boosting: f64,
    pub gain_adjustment_gradient_boosting: f64,
    pub gain_adjustment_hessian_boosting: f64,
    /// `gradient_constant * gradient` is the slope of the per-sample metric
    /// term. Deviance objectives store half their slope.
    pub gradient_constant: f64,
    /// `hessian_constant * hessian` is the curvature of the per-sample metric
    /// term. Without a stored hessian this is the curvature itself.
    pub hessian_constant: f64,
    pub has_hessian: bool,
    /// Squared error: the gradient buffer holds residuals.
    pub is_rmse: bool,
}

impl ObjectiveInfo {
    /// Unit adjustments, no hessian, not squared error.
    pub fn new(link: Link) -> Self {
        Self {
            maximize_metric: false,
            link,
            link_param: 0.0,
            learning_rate_adjustment_differential_privacy: 1.0,
            learning_rate_adjustment_gradient_boosting: 1.0,
            learning_rate_adjustment_hessian_boosting: 1.0,
            gain_adjustment_gradient_boosting: 1.0,
            gain_adjustment_hessian_boosting: 1.0,
            gradient_constant: 1.0,
            hessian_constant: 1.0,
            has_hessian: false,
            is_rmse: false,
        }
    }

    /// Set the gradient and hessian scale constants.
    pub fn with_constants(mut self, gradient_constant: f64, hessian_constant: f64) -> Self {
        self.gradient_constant = gradient_constant;
        self.hessian_constant = hessian_constant;
        self
    }

    /// Scale the gradient-only adjustments for an objective whose hessian is
    /// typically `typical_hessian`, so gradient and hessian boosting take
    /// comparable steps.
    pub fn with_typical_hessian(mut self, typical_hessian: f64) -> Self {
        let scale = 1.0 / typical_hessian;
        self.learning_rate_adjustment_differential_privacy = scale;
        self.learning_rate_adjustment_gradient_boosting = scale;
        self.gain_adjustment_gradient_boosting = scale;
        self
    }
}

// =============================================================================
// Objective trait
// =============================================================================

/// A loss function usable by every backend.
///
/// The per-sample methods take score and target lanes and return lanes. For
/// class-index objectives the target lane holds the class as a float
/// (0.0 or 1.0 for binary).
pub trait Objective: Send + Sync + 'static {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Scalar parameters exported to the binding.
    fn info(&self) -> ObjectiveInfo;

    /// Target encoding this objective expects.
    fn target_schema(&self) -> TargetSchema;

    /// Whether targets are in this objective's domain.
    fn check_targets(&self, targets: &Targets<'_>) -> bool {
        self.target_schema().accepts(targets)
    }

    /// Turn a weighted mean of per-sample metric terms into the reported metric.
    fn finish_metric(&self, mean: f64) -> f64 {
        mean
    }

    /// Softmax across outputs instead of independent per-output gradients.
    fn multiclass(&self) -> bool {
        false
    }

    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F;

    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F);

    /// Per-sample metric term.
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F;

    /// Gradient and hessian of one output given its softmax probability and
    /// the target indicator (1.0 on the target class).
    fn multiclass_gradient_hessian<F: FloatLanes>(&self, prob: F, indicator: F) -> (F, F) {
        (prob - indicator, prob * (F::one() - prob))
    }

    /// Metric term from the probability assigned to the target class.
    fn multiclass_metric<F: FloatLanes>(&self, prob_of_target: F) -> F {
        -prob_of_target.ln()
    }
}

/// An objective constructible from an objective string.
pub trait RegisteredObjective: Objective + Sized {
    /// Name in objective strings.
    const NAME: &'static str;

    /// Accepted parameters, in the order passed to [`Self::from_params`].
    const PARAMS: &'static [ParamSpec];

    /// Construct from resolved parameter values and the numeric configuration.
    fn from_params(params: &[f64], config: &NumericConfig) -> Result<Self>;
}

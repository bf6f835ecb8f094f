//! Regression objectives.
//!
//! Scores are raw margins. Log-link objectives interpret the score as
//! `ln(mu)`; their metric is the unit deviance.

use num_traits::Float;

use super::spec::invalid;
use super::{Link, Objective, ObjectiveInfo, ParamSpec, RegisteredObjective, TargetSchema};
use crate::config::NumericConfig;
use crate::error::{ComputeError, Result};
use crate::lanes::{FloatLanes, LaneScalar};

fn single_output(name: &str, config: &NumericConfig) -> Result<()> {
    if config.n_outputs != 1 {
        return Err(ComputeError::UnsupportedOutputs {
            objective: name.to_string(),
            n_outputs: config.n_outputs,
        });
    }
    Ok(())
}

// =============================================================================
// Squared Loss
// =============================================================================

/// Squared error.
///
/// - Gradient: `score - target` (the residual)
/// - Metric: `sqrt(mean((score - target)²))`
///
/// Reports no hessian: it is the constant `1`. Flagged `is_rmse`, which lets
/// the update kernel keep residuals in the gradient buffer and skip targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl Objective for SquaredLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        ObjectiveInfo {
            is_rmse: true,
            // r² has slope 2r and curvature 2
            ..ObjectiveInfo::new(Link::Identity).with_constants(2.0, 2.0)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::Continuous
    }

    fn finish_metric(&self, mean: f64) -> f64 {
        mean.sqrt()
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        score - target
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        (score - target, F::one())
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        let r = score - target;
        r * r
    }
}

impl RegisteredObjective for SquaredLoss {
    const NAME: &'static str = "rmse";
    const PARAMS: &'static [ParamSpec] = &[];

    fn from_params(_params: &[f64], config: &NumericConfig) -> Result<Self> {
        single_output(Self::NAME, config)?;
        Ok(Self)
    }
}

// =============================================================================
// Poisson Loss
// =============================================================================

/// Poisson deviance with a log link.
///
/// - Gradient: `exp(score) - target`
/// - Hessian: `exp(score)`
/// - Metric: `2 * (y * ln(y / mu) - (y - mu))`
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonLoss;

impl Objective for PoissonLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        ObjectiveInfo {
            has_hessian: true,
            ..ObjectiveInfo::new(Link::Log).with_constants(2.0, 2.0)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::NonNegative
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        score.exp() - target
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        let mu = score.exp();
        (mu - target, mu)
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        let mu = score.exp();
        // y * ln(y / mu) is 0 at y = 0
        let log_term = F::if_less(F::zero(), target, target * (target.ln() - score), F::zero());
        F::from_f64(2.0) * (log_term - (target - mu))
    }
}

impl RegisteredObjective for PoissonLoss {
    const NAME: &'static str = "poisson_deviance";
    const PARAMS: &'static [ParamSpec] = &[];

    fn from_params(_params: &[f64], config: &NumericConfig) -> Result<Self> {
        single_output(Self::NAME, config)?;
        Ok(Self)
    }
}

// =============================================================================
// Gamma Loss
// =============================================================================

/// Gamma deviance with a log link.
///
/// - Gradient: `1 - y * exp(-score)`
/// - Hessian: `y * exp(-score)`
/// - Metric: `2 * (ln(mu / y) + y / mu - 1)`
#[derive(Debug, Clone, Copy, Default)]
pub struct GammaLoss;

impl Objective for GammaLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        ObjectiveInfo {
            has_hessian: true,
            ..ObjectiveInfo::new(Link::Log).with_constants(2.0, 2.0)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::Positive
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        F::one() - target * (-score).exp()
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        let h = target * (-score).exp();
        (F::one() - h, h)
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        let ratio = target * (-score).exp();
        F::from_f64(2.0) * (score - target.ln() + ratio - F::one())
    }
}

impl RegisteredObjective for GammaLoss {
    const NAME: &'static str = "gamma_deviance";
    const PARAMS: &'static [ParamSpec] = &[];

    fn from_params(_params: &[f64], config: &NumericConfig) -> Result<Self> {
        single_output(Self::NAME, config)?;
        Ok(Self)
    }
}

// =============================================================================
// Tweedie Loss
// =============================================================================

/// Tweedie deviance with a log link, variance power `1 < p < 2`.
///
/// With `a = exp((1 - p) * s)` and `b = exp((2 - p) * s)`:
/// - Gradient: `b - y * a`
/// - Hessian: `(2 - p) * b - (1 - p) * y * a`
/// - Metric: `2 * (y^(2-p) / ((1-p)(2-p)) - y * a / (1-p) + b / (2-p))`
#[derive(Debug, Clone, Copy)]
pub struct TweedieLoss {
    variance_power: f64,
}

impl TweedieLoss {
    pub fn new(variance_power: f64) -> Result<Self> {
        if !(variance_power > 1.0 && variance_power < 2.0) {
            return Err(invalid(
                Self::NAME,
                format!("variance_power must be in (1, 2), got {variance_power}"),
            ));
        }
        Ok(Self { variance_power })
    }

    pub fn variance_power(&self) -> f64 {
        self.variance_power
    }
}

impl Objective for TweedieLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        ObjectiveInfo {
            has_hessian: true,
            link_param: self.variance_power,
            ..ObjectiveInfo::new(Link::Log).with_constants(2.0, 2.0)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::NonNegative
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        let p = self.variance_power;
        let a = (F::from_f64(1.0 - p) * score).exp();
        let b = (F::from_f64(2.0 - p) * score).exp();
        b - target * a
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        let p = self.variance_power;
        let a = (F::from_f64(1.0 - p) * score).exp();
        let b = (F::from_f64(2.0 - p) * score).exp();
        let hess = F::from_f64(2.0 - p) * b - F::from_f64(1.0 - p) * target * a;
        (b - target * a, hess)
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        let p = self.variance_power;
        let (one_p, two_p) = (1.0 - p, 2.0 - p);
        let a = (F::from_f64(one_p) * score).exp();
        let b = (F::from_f64(two_p) * score).exp();
        let exponent = <F::Scalar as LaneScalar>::from_f64(two_p);
        let y_pow = target.apply(|y| y.powf(exponent));
        F::from_f64(2.0)
            * (y_pow / F::from_f64(one_p * two_p) - target * a / F::from_f64(one_p)
                + b / F::from_f64(two_p))
    }
}

impl RegisteredObjective for TweedieLoss {
    const NAME: &'static str = "tweedie_deviance";
    const PARAMS: &'static [ParamSpec] = &[ParamSpec {
        name: "variance_power",
        default: None,
    }];

    fn from_params(params: &[f64], config: &NumericConfig) -> Result<Self> {
        single_output(Self::NAME, config)?;
        Self::new(params[0])
    }
}

// =============================================================================
// Pseudo-Huber Loss
// =============================================================================

/// Pseudo-Huber loss with slope parameter `delta`.
///
/// With `r = score - target` and `k = sqrt(1 + (r / delta)²)`:
/// - Gradient: `r / k`
/// - Hessian: `1 / k³`
/// - Metric: `delta² * (k - 1)`
#[derive(Debug, Clone, Copy)]
pub struct PseudoHuberLoss {
    delta: f64,
}

impl PseudoHuberLoss {
    pub fn new(delta: f64) -> Result<Self> {
        if !(delta > 0.0) {
            return Err(invalid(Self::NAME, format!("delta must be > 0, got {delta}")));
        }
        Ok(Self { delta })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    #[inline(always)]
    fn scale<F: FloatLanes>(&self, r: F) -> F {
        let q = r / F::from_f64(self.delta);
        (F::one() + q * q).sqrt()
    }
}

impl Objective for PseudoHuberLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        ObjectiveInfo {
            has_hessian: true,
            link_param: self.delta,
            ..ObjectiveInfo::new(Link::Identity)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::Continuous
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        let r = score - target;
        r / self.scale(r)
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        let r = score - target;
        let k = self.scale(r);
        (r / k, F::one() / (k * k * k))
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        let k = self.scale(score - target);
        F::from_f64(self.delta * self.delta) * (k - F::one())
    }
}

impl RegisteredObjective for PseudoHuberLoss {
    const NAME: &'static str = "pseudo_huber";
    const PARAMS: &'static [ParamSpec] = &[ParamSpec {
        name: "delta",
        default: Some(1.0),
    }];

    fn from_params(params: &[f64], config: &NumericConfig) -> Result<Self> {
        single_output(Self::NAME, config)?;
        Self::new(params[0])
    }
}

//! Classification objectives. Targets are class indices.

use super::{Link, Objective, ObjectiveInfo, ParamSpec, RegisteredObjective, TargetSchema};
use crate::config::NumericConfig;
use crate::error::{ComputeError, Result};
use crate::lanes::FloatLanes;

// =============================================================================
// Logistic Loss
// =============================================================================

/// Binary log loss over a single logit output.
///
/// - Gradient: `sigmoid(score) - y`
/// - Hessian: `p * (1 - p)`
/// - Metric: `softplus(score) - y * score`, the mean negative log-likelihood
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl LogisticLoss {
    #[inline(always)]
    fn sigmoid<F: FloatLanes>(score: F) -> F {
        F::one() / (F::one() + (-score).exp())
    }
}

impl Objective for LogisticLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        // p(1 - p) peaks at 1/4
        ObjectiveInfo {
            has_hessian: true,
            ..ObjectiveInfo::new(Link::Logit).with_typical_hessian(0.25)
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::ClassIndex { n_classes: 2 }
    }

    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        Self::sigmoid(score) - target
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        let p = Self::sigmoid(score);
        (p - target, p * (F::one() - p))
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        // softplus(s) = max(s, 0) + ln(1 + exp(-|s|))
        let softplus = F::max(score, F::zero()) + (F::one() + (-score.abs()).exp()).ln();
        softplus - target * score
    }
}

impl RegisteredObjective for LogisticLoss {
    const NAME: &'static str = "log_loss";
    const PARAMS: &'static [ParamSpec] = &[];

    fn from_params(_params: &[f64], config: &NumericConfig) -> Result<Self> {
        if config.n_outputs != 1 {
            return Err(ComputeError::UnsupportedOutputs {
                objective: Self::NAME.to_string(),
                n_outputs: config.n_outputs,
            });
        }
        Ok(Self)
    }
}

// =============================================================================
// Softmax Loss
// =============================================================================

/// Multiclass log loss over one logit per class.
///
/// The update kernel computes `p_k = softmax(scores)_k` with the running max
/// subtracted, then per output:
/// - Gradient: `p_k - [k == y]`
/// - Hessian: `p_k * (1 - p_k)`
/// - Metric: `-ln(p_y)`
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxLoss {
    n_classes: usize,
}

impl SoftmaxLoss {
    pub fn new(n_classes: usize) -> Self {
        Self { n_classes }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl Objective for SoftmaxLoss {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn info(&self) -> ObjectiveInfo {
        // p(1 - p) at the uniform prediction p = 1/k
        let k = self.n_classes as f64;
        ObjectiveInfo {
            has_hessian: true,
            ..ObjectiveInfo::new(Link::Mlogit).with_typical_hessian((k - 1.0) / (k * k))
        }
    }

    fn target_schema(&self) -> TargetSchema {
        TargetSchema::ClassIndex {
            n_classes: self.n_classes,
        }
    }

    fn multiclass(&self) -> bool {
        true
    }

    // Independent-logit forms. The update kernel uses the multiclass methods.
    #[inline(always)]
    fn gradient<F: FloatLanes>(&self, score: F, target: F) -> F {
        LogisticLoss.gradient(score, target)
    }

    #[inline(always)]
    fn gradient_hessian<F: FloatLanes>(&self, score: F, target: F) -> (F, F) {
        LogisticLoss.gradient_hessian(score, target)
    }

    #[inline(always)]
    fn metric<F: FloatLanes>(&self, score: F, target: F) -> F {
        LogisticLoss.metric(score, target)
    }
}

impl RegisteredObjective for SoftmaxLoss {
    const NAME: &'static str = "log_loss";
    const PARAMS: &'static [ParamSpec] = &[];

    fn from_params(_params: &[f64], config: &NumericConfig) -> Result<Self> {
        if config.n_outputs < 2 {
            return Err(ComputeError::UnsupportedOutputs {
                objective: Self::NAME.to_string(),
                n_outputs: config.n_outputs,
            });
        }
        Ok(Self::new(config.n_outputs))
    }
}

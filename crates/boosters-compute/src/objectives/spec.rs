//! Objective string parsing.

use crate::error::{ComputeError, Result};

/// A parameter an objective accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// Value used when the parameter is omitted. `None` makes it required.
    pub default: Option<f64>,
}

/// A parsed objective string: `name[:param=value[,param=value]*]`.
///
/// Names and parameter names are lowercased and trimmed.
///
/// ```
/// use boosters_compute::ObjectiveSpec;
///
/// let spec = ObjectiveSpec::parse("Tweedie_Deviance: variance_power = 1.5").unwrap();
/// assert_eq!(spec.name, "tweedie_deviance");
/// assert_eq!(spec.params, vec![("variance_power".to_string(), 1.5)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveSpec {
    pub name: String,
    pub params: Vec<(String, f64)>,
}

impl ObjectiveSpec {
    pub fn parse(objective: &str) -> Result<Self> {
        let (name, rest) = match objective.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (objective, None),
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(ComputeError::UnknownObjective(objective.to_string()));
        }

        let mut params = Vec::new();
        if let Some(rest) = rest {
            for item in rest.split(',') {
                let (key, value) = item.split_once('=').ok_or_else(|| {
                    invalid(&name, format!("expected 'param=value', got '{}'", item.trim()))
                })?;
                let key = key.trim().to_ascii_lowercase();
                if key.is_empty() {
                    return Err(invalid(&name, format!("missing parameter name in '{}'", item.trim())));
                }
                let value: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(&name, format!("'{}' is not a number", value.trim())))?;
                if !value.is_finite() {
                    return Err(invalid(&name, format!("{key} must be finite")));
                }
                params.push((key, value));
            }
        }
        Ok(Self { name, params })
    }

    /// Resolve parameters against an objective's accepted set.
    ///
    /// Returns one value per entry of `accepted`, in that order.
    pub fn resolve(&self, accepted: &[ParamSpec]) -> Result<Vec<f64>> {
        for (i, (key, _)) in self.params.iter().enumerate() {
            if !accepted.iter().any(|p| p.name == key) {
                return Err(invalid(&self.name, format!("unknown parameter '{key}'")));
            }
            if self.params[..i].iter().any(|(k, _)| k == key) {
                return Err(invalid(&self.name, format!("duplicate parameter '{key}'")));
            }
        }
        accepted
            .iter()
            .map(|p| {
                self.params
                    .iter()
                    .find(|(k, _)| k == p.name)
                    .map(|&(_, v)| v)
                    .or(p.default)
                    .ok_or_else(|| {
                        invalid(&self.name, format!("missing required parameter '{}'", p.name))
                    })
            })
            .collect()
    }
}

pub(crate) fn invalid(objective: &str, reason: String) -> ComputeError {
    ComputeError::InvalidObjectiveParam {
        objective: objective.to_string(),
        reason,
    }
}

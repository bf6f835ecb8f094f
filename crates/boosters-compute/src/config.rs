//! Numeric configuration and backend selection.
//!
//! A [`NumericConfig`] is fixed for the lifetime of a binding. It names the
//! output count, the privacy mode and the float/index widths every buffer
//! handed to the binding must use. The [`Backend`] preference is resolved once
//! at binding creation.

use std::fmt;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Numeric widths
// =============================================================================

/// Floating-point width of gradients, weights, scores and accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatWidth {
    F32,
    #[default]
    F64,
}

impl FloatWidth {
    /// Size of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Unsigned-integer width of packed index streams and class targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UIntWidth {
    U32,
    #[default]
    U64,
}

impl UIntWidth {
    /// Size of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Size of one element in bits.
    pub fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }
}

// =============================================================================
// NumericConfig
// =============================================================================

/// Immutable numeric configuration of a binding.
///
/// # Example
///
/// ```
/// use boosters_compute::{FloatWidth, NumericConfig, UIntWidth};
///
/// let config = NumericConfig::builder()
///     .n_outputs(3)
///     .float_width(FloatWidth::F32)
///     .uint_width(UIntWidth::U32)
///     .build()
///     .unwrap();
/// assert_eq!(config.n_outputs, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct NumericConfig {
    /// Score dimensions per sample. 1 for regression and binary
    /// classification, the class count for multiclass. Default: 1.
    #[builder(default = 1)]
    #[serde(default = "default_outputs")]
    pub n_outputs: usize,

    /// Differential-privacy mode. Objectives report no hessian when set.
    #[builder(default)]
    #[serde(default)]
    pub differential_privacy: bool,

    /// Float width. Default: `F64`.
    #[builder(default)]
    #[serde(default)]
    pub float_width: FloatWidth,

    /// Index width. Default: `U64`.
    #[builder(default)]
    #[serde(default)]
    pub uint_width: UIntWidth,
}

fn default_outputs() -> usize {
    1
}

impl<S: numeric_config_builder::IsComplete> NumericConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOutputs`] when `n_outputs == 0`.
    pub fn build(self) -> Result<NumericConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            n_outputs: 1,
            differential_privacy: false,
            float_width: FloatWidth::F64,
            uint_width: UIntWidth::U64,
        }
    }
}

impl NumericConfig {
    /// Validate a configuration that did not come through the builder
    /// (e.g. one deserialized from JSON).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_outputs == 0 {
            return Err(ConfigError::InvalidOutputs(self.n_outputs));
        }
        Ok(())
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Backend preference passed at binding creation.
///
/// Each concrete variant names one compiled instantiation of the kernels.
/// [`Backend::Auto`] is resolved to a concrete variant by [`Backend::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Pick the widest available CPU backend for the configured widths.
    #[default]
    Auto,
    /// One lane per group. Portable reference implementation.
    Scalar,
    /// Four 32-bit lanes per group.
    Simd128,
    /// Eight 32-bit lanes per group. Runs AVX2 code when the CPU has it.
    Simd256,
    /// NVIDIA GPU via CUDA. Never chosen automatically.
    Cuda,
}

impl Backend {
    /// Lanes per group for a concrete backend, 0 for `Auto`.
    pub fn lane_width(self) -> usize {
        match self {
            Self::Auto => 0,
            Self::Scalar => 1,
            Self::Simd128 => 4,
            Self::Simd256 => 8,
            Self::Cuda => 32,
        }
    }

    /// Resolve `Auto` for the given float width. Concrete variants are returned as is.
    pub fn resolve(self, float_width: FloatWidth) -> Backend {
        if self != Self::Auto {
            return self;
        }
        let resolved = match float_width {
            FloatWidth::F64 => Self::Scalar,
            FloatWidth::F32 if has_avx2() => Self::Simd256,
            FloatWidth::F32 => Self::Simd128,
        };
        log::info!("auto-selected {resolved} backend for {float_width:?}");
        resolved
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Scalar => "scalar",
            Self::Simd128 => "simd128",
            Self::Simd256 => "simd256",
            Self::Cuda => "cuda",
        };
        f.write_str(name)
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn has_avx2() -> bool {
    std::is_x86_feature_detected!("avx2")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn has_avx2() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = NumericConfig::builder().build().unwrap();
        assert_eq!(config, NumericConfig::default());
    }

    #[test]
    fn builder_rejects_zero_outputs() {
        let err = NumericConfig::builder().n_outputs(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidOutputs(0));
    }

    #[test]
    fn config_from_json() {
        let config: NumericConfig =
            serde_json::from_str(r#"{"n_outputs": 4, "float_width": "f32", "uint_width": "u32"}"#)
                .unwrap();
        assert_eq!(config.n_outputs, 4);
        assert_eq!(config.float_width, FloatWidth::F32);
        assert_eq!(config.uint_width, UIntWidth::U32);
        assert!(!config.differential_privacy);
        config.validate().unwrap();

        let bad: NumericConfig = serde_json::from_str(r#"{"n_outputs": 0}"#).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn auto_resolution() {
        assert_eq!(Backend::Auto.resolve(FloatWidth::F64), Backend::Scalar);
        let narrow = Backend::Auto.resolve(FloatWidth::F32);
        assert!(matches!(narrow, Backend::Simd128 | Backend::Simd256));
        assert_eq!(Backend::Cuda.resolve(FloatWidth::F32), Backend::Cuda);
    }

    #[test]
    fn widths() {
        assert_eq!(UIntWidth::U32.bits(), 32);
        assert_eq!(UIntWidth::U64.bits(), 64);
        assert_eq!(FloatWidth::F32.bytes(), 4);
        assert_eq!(Backend::Simd256.lane_width(), 8);
    }
}

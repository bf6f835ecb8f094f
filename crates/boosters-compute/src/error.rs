//! Error types for binding construction and kernel requests.

use crate::config::{Backend, FloatWidth, UIntWidth};

/// Numeric configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The output count must be at least 1.
    #[error("n_outputs must be at least 1, got {0}")]
    InvalidOutputs(usize),
}

/// Errors reported by binding creation and by the kernel entry points.
///
/// Construction errors leave nothing allocated. Request errors are raised
/// before any accumulator, score or gradient buffer is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    /// The numeric configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No objective is registered under this name.
    #[error("unknown objective '{0}'")]
    UnknownObjective(String),

    /// The objective string carried a malformed, unknown or out-of-range parameter.
    #[error("invalid parameter for objective '{objective}': {reason}")]
    InvalidObjectiveParam { objective: String, reason: String },

    /// The objective does not support the configured output count.
    #[error("objective '{objective}' does not support n_outputs = {n_outputs}")]
    UnsupportedOutputs { objective: String, n_outputs: usize },

    /// The backend has no instantiation for these numeric widths.
    #[error("backend {backend} does not support {float_width:?} floats with {uint_width:?} indices")]
    UnsupportedCombination {
        backend: Backend,
        float_width: FloatWidth,
        uint_width: UIntWidth,
    },

    /// The backend is not compiled in or not present on this machine.
    #[error("backend {0} is not available")]
    BackendUnavailable(Backend),

    /// A request buffer is shorter than the request's extents require.
    #[error("buffer '{buffer}' too small: need {required} elements, got {actual}")]
    BufferTooSmall {
        buffer: &'static str,
        required: usize,
        actual: usize,
    },

    /// A request buffer has a different element width than the binding.
    #[error("buffer '{buffer}' does not match the binding's numeric width")]
    WidthMismatch { buffer: &'static str },

    /// Bits per item is zero or wider than the index integer.
    #[error("invalid packing: {bits} bits per item with {uint_bits}-bit units")]
    InvalidPacking { bits: u32, uint_bits: u32 },

    /// The interaction request names more dimensions than supported.
    #[error("interaction requests {requested} dimensions, at most {max} supported")]
    TooManyDimensions { requested: usize, max: usize },

    /// The request's output count differs from the binding's.
    #[error("request has n_outputs = {actual}, binding was created with {expected}")]
    OutputMismatch { expected: usize, actual: usize },

    /// Hessians were requested from an objective that has none.
    #[error("hessian requested but the objective does not provide one")]
    HessianUnavailable,

    /// Device-side failure (allocation, compilation, launch or transfer).
    #[error("device error: {0}")]
    Device(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ComputeError>;

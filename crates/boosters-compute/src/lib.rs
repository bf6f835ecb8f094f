//! boosters-compute: backend-dispatched kernels for boosted additive models.
//!
//! Accumulates per-bin gradient/hessian sums from bit-packed bin indices and
//! applies score updates, on whichever lane backend is selected at runtime.
//! Kernels are written once against the lane contract in [`lanes`] and
//! monomorphized per backend.
//!
//! # Key Types
//!
//! - [`ObjectiveBinding`] - An objective bound to a backend; the five kernel entry points
//! - [`NumericConfig`] / [`Backend`] - Widths, output count and backend preference
//! - [`BoostingBinSumsRequest`] / [`InteractionBinSumsRequest`] / [`ApplyUpdateRequest`] - Kernel inputs
//! - [`BinSums`] - Owned histogram accumulators
//! - [`Packing`] / [`pack`] - Bit-packed index streams
//!
//! # Usage
//!
//! Create one binding per training run with
//! [`ObjectiveBinding::create`], then per boosting round call
//! [`ObjectiveBinding::bin_sums_boosting`] to build histograms and
//! [`ObjectiveBinding::apply_update`] to commit the update and refresh
//! gradients. See the [`binding`] module for a worked example.

pub mod binding;
pub mod buffers;
pub mod config;
mod dispatch;
pub mod error;
pub mod kernels;
pub mod lanes;
pub mod objectives;
pub mod packing;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Binding and requests
pub use binding::{
    ApplyUpdateRequest, BoostingBinSumsRequest, Dimension, InteractionBinSumsRequest, MetricOut,
    ObjectiveBinding,
};

// Configuration
pub use config::{Backend, FloatWidth, NumericConfig, UIntWidth};
pub use error::{ComputeError, ConfigError, Result};

// Buffers
pub use buffers::{AccumulatorsMut, BinSums, BinSumsMut, FloatSlice, FloatSliceMut, Targets, UIntSlice};

// Packing
pub use packing::{pack, pack_into, packed_len, unpack, unpack_one, Packing};

// Objectives
pub use objectives::{Link, Objective, ObjectiveInfo, ObjectiveSpec, TargetSchema};

pub use kernels::MAX_DIMENSIONS;

//! Caller-owned buffers handed to the kernels.
//!
//! Requests carry width-erased slices ([`FloatSlice`], [`UIntSlice`]) so a
//! caller compiled once can drive any backend. Each backend checks that the
//! variant matches its numeric configuration and reports
//! [`ComputeError::WidthMismatch`] otherwise.
//!
//! Histogram accumulators are stored as a struct of arrays:
//!
//! ```text
//! counts:  [u64; n_bins]
//! weights: [T;   n_bins]
//! grads:   [T;   n_bins * n_outputs]   slot = bin * n_outputs + output
//! hess:    [T;   n_bins * n_outputs]   optional
//! ```

use ndarray::{ArrayViewD, IxDyn};

use crate::error::{ComputeError, Result};
use crate::lanes::LaneScalar;

// =============================================================================
// Width-erased slices
// =============================================================================

/// Read-only float buffer of either width.
#[derive(Debug, Clone, Copy)]
pub enum FloatSlice<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl FloatSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [f32]> for FloatSlice<'a> {
    fn from(v: &'a [f32]) -> Self {
        Self::F32(v)
    }
}

impl<'a> From<&'a [f64]> for FloatSlice<'a> {
    fn from(v: &'a [f64]) -> Self {
        Self::F64(v)
    }
}

/// Mutable float buffer of either width.
#[derive(Debug)]
pub enum FloatSliceMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

impl FloatSliceMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a mut [f32]> for FloatSliceMut<'a> {
    fn from(v: &'a mut [f32]) -> Self {
        Self::F32(v)
    }
}

impl<'a> From<&'a mut [f64]> for FloatSliceMut<'a> {
    fn from(v: &'a mut [f64]) -> Self {
        Self::F64(v)
    }
}

/// Read-only unsigned buffer of either width: packed streams and class targets.
#[derive(Debug, Clone, Copy)]
pub enum UIntSlice<'a> {
    U32(&'a [u32]),
    U64(&'a [u64]),
}

impl UIntSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [u32]> for UIntSlice<'a> {
    fn from(v: &'a [u32]) -> Self {
        Self::U32(v)
    }
}

impl<'a> From<&'a [u64]> for UIntSlice<'a> {
    fn from(v: &'a [u64]) -> Self {
        Self::U64(v)
    }
}

/// Per-sample targets.
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    /// Real-valued targets for regression objectives.
    Continuous(FloatSlice<'a>),
    /// Class indices for classification objectives.
    Class(UIntSlice<'a>),
}

impl Targets<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(v) => v.len(),
            Self::Class(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Accumulators
// =============================================================================

/// Borrowed histogram accumulators the kernels add into.
///
/// The bin count is `counts.len()`. The kernels never zero these buffers.
#[derive(Debug)]
pub struct BinSumsMut<'a, T> {
    pub counts: &'a mut [u64],
    pub weights: &'a mut [T],
    pub grads: &'a mut [T],
    pub hess: Option<&'a mut [T]>,
}

impl<'a, T> BinSumsMut<'a, T> {
    pub fn new(
        counts: &'a mut [u64],
        weights: &'a mut [T],
        grads: &'a mut [T],
        hess: Option<&'a mut [T]>,
    ) -> Self {
        Self {
            counts,
            weights,
            grads,
            hess,
        }
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// Check the extents against a request's bin count and output count.
    pub(crate) fn check(&self, n_bins: usize, n_outputs: usize, hessian: bool) -> Result<()> {
        let slots = n_bins * n_outputs;
        check_len("bins.counts", n_bins, self.counts.len())?;
        check_len("bins.weights", n_bins, self.weights.len())?;
        check_len("bins.grads", slots, self.grads.len())?;
        if hessian {
            match &self.hess {
                Some(h) => check_len("bins.hess", slots, h.len())?,
                None => {
                    return Err(ComputeError::BufferTooSmall {
                        buffer: "bins.hess",
                        required: slots,
                        actual: 0,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Width-erased accumulators.
#[derive(Debug)]
pub enum AccumulatorsMut<'a> {
    F32(BinSumsMut<'a, f32>),
    F64(BinSumsMut<'a, f64>),
}

impl<'a> From<BinSumsMut<'a, f32>> for AccumulatorsMut<'a> {
    fn from(v: BinSumsMut<'a, f32>) -> Self {
        Self::F32(v)
    }
}

impl<'a> From<BinSumsMut<'a, f64>> for AccumulatorsMut<'a> {
    fn from(v: BinSumsMut<'a, f64>) -> Self {
        Self::F64(v)
    }
}

/// Owned, zero-initialized histogram accumulators.
///
/// # Example
///
/// ```
/// use boosters_compute::BinSums;
///
/// let mut bins = BinSums::<f64>::new(16, 1, true);
/// assert_eq!(bins.total_count(), 0);
/// let view = bins.as_mut();
/// assert_eq!(view.n_bins(), 16);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BinSums<T> {
    n_bins: usize,
    n_outputs: usize,
    counts: Vec<u64>,
    weights: Vec<T>,
    grads: Vec<T>,
    hess: Option<Vec<T>>,
}

impl<T: LaneScalar> BinSums<T> {
    /// Zeroed accumulators for `n_bins` bins and `n_outputs` outputs.
    pub fn new(n_bins: usize, n_outputs: usize, hessian: bool) -> Self {
        let slots = n_bins * n_outputs;
        Self {
            n_bins,
            n_outputs,
            counts: vec![0; n_bins],
            weights: vec![T::zero(); n_bins],
            grads: vec![T::zero(); slots],
            hess: hessian.then(|| vec![T::zero(); slots]),
        }
    }

    /// Mutable view for a kernel request.
    pub fn as_mut(&mut self) -> BinSumsMut<'_, T> {
        BinSumsMut {
            counts: &mut self.counts,
            weights: &mut self.weights,
            grads: &mut self.grads,
            hess: self.hess.as_deref_mut(),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn has_hessian(&self) -> bool {
        self.hess.is_some()
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn grads(&self) -> &[T] {
        &self.grads
    }

    pub fn hess(&self) -> Option<&[T]> {
        self.hess.as_deref()
    }

    /// Sum of raw counts across all bins.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Reset every slot to zero.
    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.weights.fill(T::zero());
        self.grads.fill(T::zero());
        if let Some(h) = &mut self.hess {
            h.fill(T::zero());
        }
    }

    /// Add another histogram of the same shape into this one.
    ///
    /// Used to combine per-shard histograms built concurrently over disjoint
    /// sample ranges.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.n_bins, other.n_bins);
        debug_assert_eq!(self.n_outputs, other.n_outputs);
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += *b;
        }
        for (a, &b) in self.weights.iter_mut().zip(&other.weights) {
            *a += b;
        }
        for (a, &b) in self.grads.iter_mut().zip(&other.grads) {
            *a += b;
        }
        if let (Some(h), Some(o)) = (&mut self.hess, &other.hess) {
            for (a, &b) in h.iter_mut().zip(o) {
                *a += b;
            }
        }
    }

    /// Counts shaped as a tensor over interaction dimensions.
    ///
    /// `shape` lists bin counts with the first dimension varying fastest, the
    /// order used by the interaction kernel. The returned view's axes are
    /// reversed so that `view[[.., b1, b0]]` addresses `(b0, b1, ..)`.
    pub fn counts_tensor(&self, shape: &[usize]) -> Result<ArrayViewD<'_, u64>> {
        tensor_view("counts", &self.counts, shape, 1)
    }

    /// Gradient sums shaped as `[.., b1, b0, output]`.
    pub fn grads_tensor(&self, shape: &[usize]) -> Result<ArrayViewD<'_, T>> {
        tensor_view("grads", &self.grads, shape, self.n_outputs)
    }
}

fn tensor_view<'a, V>(
    buffer: &'static str,
    data: &'a [V],
    shape: &[usize],
    n_outputs: usize,
) -> Result<ArrayViewD<'a, V>> {
    let mut dims: Vec<usize> = shape.iter().rev().copied().collect();
    if n_outputs > 1 {
        dims.push(n_outputs);
    }
    let required: usize = dims.iter().product();
    if required != data.len() {
        return Err(ComputeError::BufferTooSmall {
            buffer,
            required,
            actual: data.len(),
        });
    }
    ArrayViewD::from_shape(IxDyn(&dims), data).map_err(|_| ComputeError::BufferTooSmall {
        buffer,
        required,
        actual: data.len(),
    })
}

#[inline]
pub(crate) fn check_len(buffer: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(ComputeError::BufferTooSmall {
            buffer,
            required,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_zeroed() {
        let bins = BinSums::<f32>::new(4, 3, true);
        assert_eq!(bins.counts(), &[0; 4]);
        assert_eq!(bins.grads().len(), 12);
        assert_eq!(bins.hess().map(<[f32]>::len), Some(12));
        assert!(!BinSums::<f32>::new(4, 3, false).has_hessian());
    }

    #[test]
    fn merge_and_clear() {
        let mut a = BinSums::<f64>::new(2, 1, true);
        let mut b = BinSums::<f64>::new(2, 1, true);
        {
            let view = b.as_mut();
            view.counts[1] = 3;
            view.weights[1] = 1.5;
            view.grads[1] = -2.0;
            if let Some(h) = view.hess {
                h[1] = 0.25;
            }
        }
        a.merge(&b);
        a.merge(&b);
        assert_eq!(a.counts(), &[0, 6]);
        assert_eq!(a.grads(), &[0.0, -4.0]);
        assert_eq!(a.hess().unwrap(), &[0.0, 0.5]);
        a.clear();
        assert_eq!(a.total_count(), 0);
        assert_eq!(a.weights(), &[0.0, 0.0]);
    }

    #[test]
    fn check_reports_short_buffers() {
        let mut bins = BinSums::<f64>::new(4, 2, false);
        let view = bins.as_mut();
        assert!(view.check(4, 2, false).is_ok());
        assert!(matches!(
            view.check(5, 2, false),
            Err(ComputeError::BufferTooSmall { buffer: "bins.counts", .. })
        ));
        assert!(matches!(
            view.check(4, 2, true),
            Err(ComputeError::BufferTooSmall { buffer: "bins.hess", .. })
        ));
    }

    #[test]
    fn tensor_views() {
        let mut bins = BinSums::<f64>::new(6, 1, false);
        bins.as_mut().counts[4] = 7;
        let counts = bins.counts_tensor(&[2, 3]).unwrap();
        assert_eq!(counts.shape(), &[3, 2]);
        // flat 4 = b0 + 2 * b1
        assert_eq!(counts[[2, 0]], 7);
        assert!(bins.counts_tensor(&[4, 4]).is_err());
    }
}

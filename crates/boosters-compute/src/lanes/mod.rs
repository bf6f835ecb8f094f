//! Lane types: the contract every kernel is written against.
//!
//! A backend is a pair of value types, [`FloatLanes`] and [`UIntLanes`], each
//! wrapping a fixed number of lanes. The kernels in [`crate::kernels`] are
//! generic over `F: FloatLanes` and are monomorphized once per backend.
//!
//! # Instantiations
//!
//! | backend | float lanes | index lanes | width |
//! |---|---|---|---|
//! | scalar f64 | [`ScalarF64`] | [`ScalarU64`] | 1 |
//! | scalar f32 | [`ScalarF32`] | [`ScalarU32`] | 1 |
//! | 128-bit | [`Simd128F32`] | [`Simd128U32`] | 4 |
//! | 256-bit | [`Simd256F32`] | [`Simd256U32`] | 8 |
//!
//! # Escape hatch
//!
//! Operations without a vector closed form (`exp`, `ln`, gathers, scatters)
//! go through [`FloatLanes::apply`] / [`FloatLanes::execute`], which unpack the
//! group to per-lane scalars, run a callback and repack. Per-lane `ln`/`exp`
//! use the std scalar functions; the approximations shipped with `wide` are
//! too coarse for metric parity with the scalar backend.
//!
//! Loads and stores are unaligned; any slice with at least `LANES` elements
//! is accepted.

mod scalar;
mod simd;

use std::fmt::Debug;
use std::ops::{Add, AddAssign, BitAnd, Div, Mul, Neg, Sub};

use num_traits::{Float, One, PrimInt, Unsigned, Zero};

use crate::buffers::{AccumulatorsMut, BinSumsMut, FloatSlice, FloatSliceMut, UIntSlice};

pub use scalar::{ScalarF32, ScalarF64, ScalarU32, ScalarU64};
pub use simd::{Simd128F32, Simd128U32, Simd256F32, Simd256U32};

/// Upper bound on `LANES` across all CPU instantiations.
pub const MAX_LANES: usize = 16;

// =============================================================================
// Scalar element traits
// =============================================================================

/// Unsigned element type of an index stream (`u32` or `u64`).
pub trait LaneUInt: PrimInt + Unsigned + Default + Debug + Send + Sync + 'static {
    /// Width in bits.
    const BITS: u32;

    /// Truncating conversion from `usize`.
    fn from_index(v: usize) -> Self;

    /// Conversion to `usize` for indexing.
    fn as_index(self) -> usize;

    /// Borrow the matching variant of a width-erased slice.
    fn uints<'a>(s: &UIntSlice<'a>) -> Option<&'a [Self]>;
}

/// Floating-point element type (`f32` or `f64`).
pub trait LaneScalar: Float + Default + Debug + AddAssign + Send + Sync + 'static {
    /// The width-1 lane type over this element. Used for group tails.
    type Single: FloatLanes<Scalar = Self>;

    fn from_f64(v: f64) -> Self;

    fn as_f64(self) -> f64;

    /// Borrow the matching variant of a width-erased slice.
    fn floats<'a>(s: &FloatSlice<'a>) -> Option<&'a [Self]>;

    /// Mutably borrow the matching variant of a width-erased slice.
    fn floats_mut<'r>(s: &'r mut FloatSliceMut<'_>) -> Option<&'r mut [Self]>;

    /// Mutably borrow the matching variant of width-erased accumulators.
    fn bins_mut<'r, 'a>(b: &'r mut AccumulatorsMut<'a>) -> Option<&'r mut BinSumsMut<'a, Self>>;
}

impl LaneUInt for u32 {
    const BITS: u32 = 32;

    #[inline(always)]
    fn from_index(v: usize) -> Self {
        v as u32
    }

    #[inline(always)]
    fn as_index(self) -> usize {
        self as usize
    }

    fn uints<'a>(s: &UIntSlice<'a>) -> Option<&'a [Self]> {
        match *s {
            UIntSlice::U32(v) => Some(v),
            UIntSlice::U64(_) => None,
        }
    }
}

impl LaneUInt for u64 {
    const BITS: u32 = 64;

    #[inline(always)]
    fn from_index(v: usize) -> Self {
        v as u64
    }

    #[inline(always)]
    fn as_index(self) -> usize {
        self as usize
    }

    fn uints<'a>(s: &UIntSlice<'a>) -> Option<&'a [Self]> {
        match *s {
            UIntSlice::U64(v) => Some(v),
            UIntSlice::U32(_) => None,
        }
    }
}

impl LaneScalar for f32 {
    type Single = ScalarF32;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline(always)]
    fn as_f64(self) -> f64 {
        self as f64
    }

    fn floats<'a>(s: &FloatSlice<'a>) -> Option<&'a [Self]> {
        match *s {
            FloatSlice::F32(v) => Some(v),
            FloatSlice::F64(_) => None,
        }
    }

    fn floats_mut<'r>(s: &'r mut FloatSliceMut<'_>) -> Option<&'r mut [Self]> {
        match s {
            FloatSliceMut::F32(v) => Some(&mut **v),
            FloatSliceMut::F64(_) => None,
        }
    }

    fn bins_mut<'r, 'a>(b: &'r mut AccumulatorsMut<'a>) -> Option<&'r mut BinSumsMut<'a, Self>> {
        match b {
            AccumulatorsMut::F32(bins) => Some(bins),
            AccumulatorsMut::F64(_) => None,
        }
    }
}

impl LaneScalar for f64 {
    type Single = ScalarF64;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline(always)]
    fn as_f64(self) -> f64 {
        self
    }

    fn floats<'a>(s: &FloatSlice<'a>) -> Option<&'a [Self]> {
        match *s {
            FloatSlice::F64(v) => Some(v),
            FloatSlice::F32(_) => None,
        }
    }

    fn floats_mut<'r>(s: &'r mut FloatSliceMut<'_>) -> Option<&'r mut [Self]> {
        match s {
            FloatSliceMut::F64(v) => Some(&mut **v),
            FloatSliceMut::F32(_) => None,
        }
    }

    fn bins_mut<'r, 'a>(b: &'r mut AccumulatorsMut<'a>) -> Option<&'r mut BinSumsMut<'a, Self>> {
        match b {
            AccumulatorsMut::F64(bins) => Some(bins),
            AccumulatorsMut::F32(_) => None,
        }
    }
}

// =============================================================================
// Lane traits
// =============================================================================

/// A group of unsigned integer lanes.
pub trait UIntLanes:
    Copy + Debug + Send + Sync + 'static + Add<Output = Self> + BitAnd<Output = Self>
{
    type Scalar: LaneUInt;

    /// Lanes per group.
    const LANES: usize;

    /// Broadcast one value to every lane.
    fn splat(v: Self::Scalar) -> Self;

    /// Build a group lane by lane.
    fn from_fn(f: impl FnMut(usize) -> Self::Scalar) -> Self;

    /// Load the first `LANES` elements of `src`.
    fn load(src: &[Self::Scalar]) -> Self;

    /// Store into the first `LANES` elements of `dst`.
    fn store(self, dst: &mut [Self::Scalar]);

    /// Logical right shift of every lane.
    fn shift_right(self, shift: u32) -> Self;

    /// Multiply every lane by one value, wrapping.
    fn mul_scalar(self, v: Self::Scalar) -> Self;

    /// `[0, 1, .., LANES - 1]`.
    #[inline]
    fn iota() -> Self {
        Self::from_fn(Self::Scalar::from_index)
    }

    /// Gather `src[idx[lane]]` for every lane.
    #[inline]
    fn gather(src: &[Self::Scalar], idx: Self) -> Self {
        let ix = idx.to_indices();
        Self::from_fn(|lane| src[ix[lane]])
    }

    /// Invoke `f(lane, value)` for every lane in order.
    #[inline]
    fn execute(self, mut f: impl FnMut(usize, Self::Scalar)) {
        let mut buf = [Self::Scalar::zero(); MAX_LANES];
        self.store(&mut buf);
        for (lane, &v) in buf[..Self::LANES].iter().enumerate() {
            f(lane, v);
        }
    }

    /// Lanes as `usize` indices. Only the first `LANES` entries are meaningful.
    #[inline]
    fn to_indices(self) -> [usize; MAX_LANES] {
        let mut out = [0usize; MAX_LANES];
        self.execute(|lane, v| out[lane] = v.as_index());
        out
    }
}

/// A group of floating-point lanes.
pub trait FloatLanes:
    Copy
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    type Scalar: LaneScalar;
    type UInt: UIntLanes;

    /// Lanes per group. Equal to `Self::UInt::LANES`.
    const LANES: usize;

    /// Broadcast one value to every lane.
    fn splat(v: Self::Scalar) -> Self;

    /// Build a group lane by lane.
    fn from_fn(f: impl FnMut(usize) -> Self::Scalar) -> Self;

    /// Load the first `LANES` elements of `src`.
    fn load(src: &[Self::Scalar]) -> Self;

    /// Store into the first `LANES` elements of `dst`.
    fn store(self, dst: &mut [Self::Scalar]);

    /// Per lane: `if a < b { then } else { otherwise }`.
    fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self;

    fn abs(self) -> Self;

    fn sqrt(self) -> Self;

    /// Horizontal sum of all lanes.
    fn sum(self) -> Self::Scalar;

    #[inline]
    fn zero() -> Self {
        Self::splat(Self::Scalar::zero())
    }

    #[inline]
    fn one() -> Self {
        Self::splat(Self::Scalar::one())
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::splat(Self::Scalar::from_f64(v))
    }

    /// Per lane: `if a == b { then } else { otherwise }`, comparing index lanes.
    #[inline]
    fn if_equal(a: Self::UInt, b: Self::UInt, then: Self, otherwise: Self) -> Self {
        let (ia, ib) = (a.to_indices(), b.to_indices());
        let (t, o) = (then.to_buf(), otherwise.to_buf());
        Self::from_fn(|lane| if ia[lane] == ib[lane] { t[lane] } else { o[lane] })
    }

    /// Lane-wise maximum.
    #[inline]
    fn max(a: Self, b: Self) -> Self {
        Self::if_less(a, b, b, a)
    }

    /// Gather `src[idx[lane]]` for every lane.
    #[inline]
    fn gather(src: &[Self::Scalar], idx: Self::UInt) -> Self {
        let ix = idx.to_indices();
        Self::from_fn(|lane| src[ix[lane]])
    }

    /// Store lane `l` to `dst[idx[l]]`. Later lanes win on duplicate indices.
    #[inline]
    fn scatter(self, dst: &mut [Self::Scalar], idx: Self::UInt) {
        let ix = idx.to_indices();
        self.execute(|lane, v| dst[ix[lane]] = v);
    }

    /// Add lane `l` into `dst[idx[l]]`, one lane at a time, so duplicate
    /// indices within a group accumulate.
    #[inline]
    fn scatter_add(self, dst: &mut [Self::Scalar], idx: Self::UInt) {
        let ix = idx.to_indices();
        self.execute(|lane, v| dst[ix[lane]] += v);
    }

    /// Map every lane through a scalar function.
    #[inline]
    fn apply(self, mut f: impl FnMut(Self::Scalar) -> Self::Scalar) -> Self {
        let buf = self.to_buf();
        Self::from_fn(|lane| f(buf[lane]))
    }

    /// Invoke `f(lane, value)` for every lane in order.
    #[inline]
    fn execute(self, mut f: impl FnMut(usize, Self::Scalar)) {
        let buf = self.to_buf();
        for (lane, &v) in buf[..Self::LANES].iter().enumerate() {
            f(lane, v);
        }
    }

    #[inline]
    fn exp(self) -> Self {
        self.apply(Float::exp)
    }

    #[inline]
    fn ln(self) -> Self {
        self.apply(Float::ln)
    }

    /// Lanes spilled to a stack buffer. Only the first `LANES` entries are meaningful.
    #[inline]
    fn to_buf(self) -> [Self::Scalar; MAX_LANES] {
        let mut buf = [Self::Scalar::zero(); MAX_LANES];
        self.store(&mut buf);
        buf
    }
}

/// The scalar element of a float lane type.
pub type ScalarOf<F> = <F as FloatLanes>::Scalar;

/// The index element paired with a float lane type.
pub type IndexOf<F> = <<F as FloatLanes>::UInt as UIntLanes>::Scalar;

/// The width-1 lane type over the same element.
pub type SingleOf<F> = <<F as FloatLanes>::Scalar as LaneScalar>::Single;

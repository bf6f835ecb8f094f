//! 128-bit and 256-bit lane types over `wide` registers.
//!
//! Arithmetic, comparisons, shifts, `abs`, `sqrt` and the horizontal sum map
//! to `wide` operations. Equality masks are computed on the index register
//! and reinterpreted as float masks with `bytemuck`. Loads, stores and
//! gathers go through arrays.

use std::ops::{Add, BitAnd, Div, Mul, Neg, Sub};

use wide::{f32x4, f32x8, u32x4, u32x8, CmpEq, CmpLt};

use super::{FloatLanes, UIntLanes};

macro_rules! simd_lanes {
    ($float_name:ident, $uint_name:ident, $freg:ty, $ureg:ty, $lanes:expr) => {
        /// Index lanes backed by one `wide` register.
        #[derive(Debug, Clone, Copy, PartialEq)]
        #[repr(transparent)]
        pub struct $uint_name(pub $ureg);

        /// Float lanes backed by one `wide` register.
        #[derive(Debug, Clone, Copy, PartialEq)]
        #[repr(transparent)]
        pub struct $float_name(pub $freg);

        impl Add for $uint_name {
            type Output = Self;
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl BitAnd for $uint_name {
            type Output = Self;
            #[inline(always)]
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl UIntLanes for $uint_name {
            type Scalar = u32;
            const LANES: usize = $lanes;

            #[inline(always)]
            fn splat(v: u32) -> Self {
                Self(<$ureg>::splat(v))
            }

            #[inline(always)]
            fn from_fn(f: impl FnMut(usize) -> u32) -> Self {
                Self(<$ureg>::new(std::array::from_fn(f)))
            }

            #[inline(always)]
            fn load(src: &[u32]) -> Self {
                Self(<$ureg>::new(std::array::from_fn(|i| src[i])))
            }

            #[inline(always)]
            fn store(self, dst: &mut [u32]) {
                dst[..$lanes].copy_from_slice(&self.0.to_array());
            }

            #[inline(always)]
            fn shift_right(self, shift: u32) -> Self {
                Self(self.0 >> shift)
            }

            #[inline(always)]
            fn mul_scalar(self, v: u32) -> Self {
                Self(self.0 * <$ureg>::splat(v))
            }
        }

        impl Add for $float_name {
            type Output = Self;
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $float_name {
            type Output = Self;
            #[inline(always)]
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul for $float_name {
            type Output = Self;
            #[inline(always)]
            fn mul(self, rhs: Self) -> Self {
                Self(self.0 * rhs.0)
            }
        }

        impl Div for $float_name {
            type Output = Self;
            #[inline(always)]
            fn div(self, rhs: Self) -> Self {
                Self(self.0 / rhs.0)
            }
        }

        impl Neg for $float_name {
            type Output = Self;
            #[inline(always)]
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl FloatLanes for $float_name {
            type Scalar = f32;
            type UInt = $uint_name;
            const LANES: usize = $lanes;

            #[inline(always)]
            fn splat(v: f32) -> Self {
                Self(<$freg>::splat(v))
            }

            #[inline(always)]
            fn from_fn(f: impl FnMut(usize) -> f32) -> Self {
                Self(<$freg>::new(std::array::from_fn(f)))
            }

            #[inline(always)]
            fn load(src: &[f32]) -> Self {
                Self(<$freg>::new(std::array::from_fn(|i| src[i])))
            }

            #[inline(always)]
            fn store(self, dst: &mut [f32]) {
                dst[..$lanes].copy_from_slice(&self.0.to_array());
            }

            #[inline(always)]
            fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self {
                Self(a.0.cmp_lt(b.0).blend(then.0, otherwise.0))
            }

            #[inline(always)]
            fn if_equal(a: $uint_name, b: $uint_name, then: Self, otherwise: Self) -> Self {
                let mask: $freg = bytemuck::cast(a.0.cmp_eq(b.0));
                Self(mask.blend(then.0, otherwise.0))
            }

            #[inline(always)]
            fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline(always)]
            fn sqrt(self) -> Self {
                Self(self.0.sqrt())
            }

            #[inline(always)]
            fn sum(self) -> f32 {
                self.0.reduce_add()
            }
        }
    };
}

simd_lanes!(Simd128F32, Simd128U32, f32x4, u32x4, 4);
simd_lanes!(Simd256F32, Simd256U32, f32x8, u32x8, 8);

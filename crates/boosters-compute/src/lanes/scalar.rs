//! Width-1 lane types: the portable reference backend.

use std::ops::{Add, BitAnd, Div, Mul, Neg, Sub};

use super::{FloatLanes, UIntLanes};

macro_rules! scalar_lanes {
    ($float_name:ident, $uint_name:ident, $float:ty, $uint:ty) => {
        /// One index lane.
        #[derive(Debug, Clone, Copy, Default, PartialEq)]
        #[repr(transparent)]
        pub struct $uint_name(pub $uint);

        /// One float lane.
        #[derive(Debug, Clone, Copy, Default, PartialEq)]
        #[repr(transparent)]
        pub struct $float_name(pub $float);

        impl Add for $uint_name {
            type Output = Self;
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                Self(self.0.wrapping_add(rhs.0))
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
            type Scalar = $uint;
            const LANES: usize = 1;

            #[inline(always)]
            fn splat(v: $uint) -> Self {
                Self(v)
            }

            #[inline(always)]
            fn from_fn(mut f: impl FnMut(usize) -> $uint) -> Self {
                Self(f(0))
            }

            #[inline(always)]
            fn load(src: &[$uint]) -> Self {
                Self(src[0])
            }

            #[inline(always)]
            fn store(self, dst: &mut [$uint]) {
                dst[0] = self.0;
            }

            #[inline(always)]
            fn shift_right(self, shift: u32) -> Self {
                Self(self.0 >> shift)
            }

            #[inline(always)]
            fn mul_scalar(self, v: $uint) -> Self {
                Self(self.0.wrapping_mul(v))
            }

            #[inline(always)]
            fn execute(self, mut f: impl FnMut(usize, $uint)) {
                f(0, self.0);
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
            type Scalar = $float;
            type UInt = $uint_name;
            const LANES: usize = 1;

            #[inline(always)]
            fn splat(v: $float) -> Self {
                Self(v)
            }

            #[inline(always)]
            fn from_fn(mut f: impl FnMut(usize) -> $float) -> Self {
                Self(f(0))
            }

            #[inline(always)]
            fn load(src: &[$float]) -> Self {
                Self(src[0])
            }

            #[inline(always)]
            fn store(self, dst: &mut [$float]) {
                dst[0] = self.0;
            }

            #[inline(always)]
            fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self {
                if a.0 < b.0 {
                    then
                } else {
                    otherwise
                }
            }

            #[inline(always)]
            fn if_equal(a: $uint_name, b: $uint_name, then: Self, otherwise: Self) -> Self {
                if a.0 == b.0 {
                    then
                } else {
                    otherwise
                }
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
            fn exp(self) -> Self {
                Self(self.0.exp())
            }

            #[inline(always)]
            fn ln(self) -> Self {
                Self(self.0.ln())
            }

            #[inline(always)]
            fn sum(self) -> $float {
                self.0
            }

            #[inline(always)]
            fn gather(src: &[$float], idx: $uint_name) -> Self {
                Self(src[idx.0 as usize])
            }

            #[inline(always)]
            fn scatter(self, dst: &mut [$float], idx: $uint_name) {
                dst[idx.0 as usize] = self.0;
            }

            #[inline(always)]
            fn scatter_add(self, dst: &mut [$float], idx: $uint_name) {
                dst[idx.0 as usize] += self.0;
            }

            #[inline(always)]
            fn apply(self, mut f: impl FnMut($float) -> $float) -> Self {
                Self(f(self.0))
            }

            #[inline(always)]
            fn execute(self, mut f: impl FnMut(usize, $float)) {
                f(0, self.0);
            }
        }
    };
}

scalar_lanes!(ScalarF64, ScalarU64, f64, u64);
scalar_lanes!(ScalarF32, ScalarU32, f32, u32);

//! Fixed-width lane types used by the transform stage and the rasterizer, backed by `wide` so they
//! lower to the host's vector units on stable.
//!
//! Masks are full lanes: every bit of a lane is set when the lane is selected and clear otherwise.

use core::{
    fmt,
    ops::{Add, BitAnd, BitOr, Mul, Not, Shl, Shr, Sub},
};
use wide::{f32x4, i16x8, i32x4, CmpLt};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct I16x8(i16x8);

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct I32x4(i32x4);

#[derive(Clone, Copy, PartialEq, Default)]
pub struct F32x4(f32x4);

macro_rules! lanes {
    ($ty: ident, $inner: ident, $elem: ty, $count: literal) => {
        impl $ty {
            pub const LANES: usize = $count;

            #[inline]
            pub fn new(lanes: [$elem; $count]) -> Self {
                $ty($inner::new(lanes))
            }

            #[inline]
            pub fn splat(value: $elem) -> Self {
                $ty($inner::splat(value))
            }

            #[inline]
            pub fn to_array(self) -> [$elem; $count] {
                self.0.to_array()
            }

            #[inline]
            pub fn lane(self, i: usize) -> $elem {
                self.0.as_array_ref()[i]
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&self.to_array()).finish()
            }
        }

        impl Add for $ty {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                $ty(self.0 + rhs.0)
            }
        }

        impl Sub for $ty {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                $ty(self.0 - rhs.0)
            }
        }

        impl Mul for $ty {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                $ty(self.0 * rhs.0)
            }
        }
    };
}

macro_rules! bitwise {
    ($ty: ident) => {
        impl BitAnd for $ty {
            type Output = Self;

            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                $ty(self.0 & rhs.0)
            }
        }

        impl BitOr for $ty {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                $ty(self.0 | rhs.0)
            }
        }

        impl Not for $ty {
            type Output = Self;

            #[inline]
            fn not(self) -> Self {
                $ty(!self.0)
            }
        }

        /// Shifts every lane by the same amount; right shifts are arithmetic.
        impl Shl<u32> for $ty {
            type Output = Self;

            #[inline]
            fn shl(self, rhs: u32) -> Self {
                $ty(self.0 << rhs)
            }
        }

        impl Shr<u32> for $ty {
            type Output = Self;

            #[inline]
            fn shr(self, rhs: u32) -> Self {
                $ty(self.0 >> rhs)
            }
        }
    };
}

lanes!(I16x8, i16x8, i16, 8);
lanes!(I32x4, i32x4, i32, 4);
lanes!(F32x4, f32x4, f32, 4);
bitwise!(I16x8);
bitwise!(I32x4);

impl I16x8 {
    #[inline]
    pub fn from_slice(slice: &[i16]) -> Self {
        let mut result = [0; 8];
        result.copy_from_slice(&slice[..8]);
        I16x8::new(result)
    }

    /// Reinterprets eight unsigned lanes (e.g. RGB565 pixels) as signed ones.
    #[inline]
    pub fn from_u16_slice(slice: &[u16]) -> Self {
        let mut result = [0; 8];
        for (dst, src) in result.iter_mut().zip(&slice[..8]) {
            *dst = *src as i16;
        }
        I16x8::new(result)
    }

    /// Narrows two 32-bit halves into one vector, truncating each lane.
    #[inline]
    pub fn from_halves(low: I32x4, high: I32x4) -> Self {
        let mut result = [0; 8];
        for (dst, lane) in result
            .iter_mut()
            .zip(low.to_array().into_iter().chain(high.to_array()))
        {
            *dst = lane as i16;
        }
        I16x8::new(result)
    }

    #[inline]
    pub fn simd_lt(self, other: Self) -> Self {
        I16x8(self.0.cmp_lt(other.0))
    }

    #[inline]
    pub fn simd_ge(self, other: Self) -> Self {
        !self.simd_lt(other)
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        I16x8(self.0.max(other.0))
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        I16x8(self.0.min(other.0))
    }

    /// Takes lanes from `self` where `mask` is set and from `other` elsewhere.
    #[inline]
    pub fn select(self, other: Self, mask: Self) -> Self {
        I16x8(mask.0.blend(self.0, other.0))
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == i16x8::default()
    }

    /// Number of selected lanes in a full-lane mask.
    #[inline]
    pub fn count_set(self) -> u32 {
        self.0.move_mask().count_ones()
    }

    #[inline]
    pub fn lane_set(self, i: usize) -> bool {
        self.lane(i) != 0
    }

    /// Writes the selected lanes of `self` over `dst`, leaving the rest untouched.
    #[inline]
    pub fn store_masked(self, dst: &mut [i16], mask: Self) {
        let old = I16x8::from_slice(dst);
        dst[..8].copy_from_slice(&self.select(old, mask).to_array());
    }

    #[inline]
    pub fn store_masked_u16(self, dst: &mut [u16], mask: Self) {
        let old = I16x8::from_u16_slice(dst);
        for (dst, src) in dst[..8].iter_mut().zip(self.select(old, mask).to_array()) {
            *dst = src as u16;
        }
    }
}

impl I32x4 {
    #[inline]
    pub fn simd_ge(self, other: Self) -> Self {
        I32x4(!self.0.cmp_lt(other.0))
    }
}

impl F32x4 {
    #[inline]
    pub fn max(self, other: Self) -> Self {
        F32x4(self.0.max(other.0))
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        F32x4(self.0.min(other.0))
    }

    /// Converts to integers, truncating toward zero and saturating at the `i32` range.
    #[inline]
    pub fn to_i32(self) -> I32x4 {
        I32x4(self.0.trunc_int())
    }

    #[inline]
    pub fn dot3(self, other: Self) -> f32 {
        let [x, y, z, _] = (self.0 * other.0).to_array();
        x + y + z
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "approx-recip")] {
        /// Reciprocal estimate keeping 8 bits of mantissa.
        #[inline]
        pub fn recip(value: f32) -> f32 {
            f32::from_bits((1.0 / value).to_bits() & !0x7FFF)
        }
    } else {
        #[inline]
        pub fn recip(value: f32) -> f32 {
            1.0 / value
        }
    }
}

//! Lane-width configuration shared by every wide kernel in the engine.
//!
//! All wide math runs over a fixed number of lanes chosen at compile time.
//! Masks use the -1/0 integer convention so they can be stored in bundles,
//! combined with bitwise ops, and blended without conversions.

use std::simd::prelude::*;
use std::simd::{Mask, Simd};

/// Number of independent problems processed per wide operation.
#[cfg(feature = "lanes8")]
pub const LANES: usize = 8;
/// Number of independent problems processed per wide operation.
#[cfg(not(feature = "lanes8"))]
pub const LANES: usize = 4;

/// A wide scalar: one value per lane.
pub type Vector<T> = Simd<T, LANES>;
/// Boolean lane mask produced by wide comparisons.
pub type WideMask = Mask<i32, LANES>;

/// Converts a -1/0 integer mask into a boolean lane mask.
#[inline(always)]
pub fn to_mask(v: Vector<i32>) -> WideMask {
    v.simd_ne(Vector::splat(0))
}

/// Restores the `Mask::to_int` convention (each lane -1 if true, 0 if false)
/// removed from `std::simd::Mask` by newer toolchains.
pub trait MaskToInt {
    fn to_int(self) -> Vector<i32>;
}

impl MaskToInt for WideMask {
    #[inline(always)]
    fn to_int(self) -> Vector<i32> {
        self.select(Vector::splat(-1), Vector::splat(0))
    }
}

/// True if every lane of a -1/0 integer mask is set.
#[inline(always)]
pub fn all_lanes_set(v: Vector<i32>) -> bool {
    v.simd_lt(Vector::splat(0)).all()
}

/// True if any lane of a -1/0 integer mask is set.
#[inline(always)]
pub fn any_lane_set(v: Vector<i32>) -> bool {
    v.simd_lt(Vector::splat(0)).any()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_conventions_round_trip() {
        let mut raw = [0i32; LANES];
        raw[0] = -1;
        let v = Vector::from_array(raw);
        assert!(any_lane_set(v));
        assert!(!all_lanes_set(v));
        assert!(to_mask(v).test(0));
        assert!(!to_mask(v).test(1));
        assert!(all_lanes_set(Vector::splat(-1)));
    }
}

use std::simd::prelude::*;

use crate::utilities::vector::{MaskToInt, Vector, LANES};

/// Mask such that `x & BUNDLE_MASK` computes `x % LANES`.
pub const BUNDLE_MASK: usize = LANES - 1;

/// Helpers for splitting linear constraint indices into bundle/lane pairs.
pub struct BundleIndexing;

impl BundleIndexing {
    /// Shift such that `x >> bundle_shift()` divides by LANES.
    #[inline(always)]
    pub const fn bundle_shift() -> usize {
        match LANES {
            4 => 2,
            8 => 3,
            _ => unreachable!(),
        }
    }

    #[inline(always)]
    pub fn get_bundle_indices(linear_index: usize) -> (usize, usize) {
        (linear_index >> Self::bundle_shift(), linear_index & BUNDLE_MASK)
    }

    #[inline(always)]
    pub fn get_bundle_count(element_count: usize) -> usize {
        (element_count + BUNDLE_MASK) >> Self::bundle_shift()
    }

    /// -1 in lanes `< count_in_bundle`, 0 in the trailing lanes.
    #[inline(always)]
    pub fn create_occupancy_mask(count_in_bundle: usize) -> Vector<i32> {
        let indices = Vector::from_array(std::array::from_fn(|i| i as i32));
        Vector::splat(count_in_bundle as i32)
            .simd_gt(indices)
            .to_int()
    }

    /// -1 in lanes `>= count_in_bundle`; the complement of the occupancy mask.
    #[inline(always)]
    pub fn create_trailing_mask(count_in_bundle: usize) -> Vector<i32> {
        let indices = Vector::from_array(std::array::from_fn(|i| i as i32));
        Vector::splat(count_in_bundle as i32)
            .simd_le(indices)
            .to_int()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_split_round_trips() {
        for linear in 0..4 * LANES {
            let (bundle, inner) = BundleIndexing::get_bundle_indices(linear);
            assert_eq!(bundle * LANES + inner, linear);
        }
        assert_eq!(BundleIndexing::get_bundle_count(0), 0);
        assert_eq!(BundleIndexing::get_bundle_count(1), 1);
        assert_eq!(BundleIndexing::get_bundle_count(LANES), 1);
        assert_eq!(BundleIndexing::get_bundle_count(LANES + 1), 2);
    }

    #[test]
    fn occupancy_masks_are_complementary(){
        for count in 0..=LANES {
            let occupied = BundleIndexing::create_occupancy_mask(count);
            let trailing = BundleIndexing::create_trailing_mask(count);
            assert_eq!((occupied | trailing), Vector::splat(-1));
            assert_eq!((occupied & trailing), Vector::splat(0));
        }
    }
}

use std::simd::prelude::*;

use crate::utilities::vector::Vector;

/// Scalar and wide numeric helpers.
pub struct MathHelper;

impl MathHelper {
    /// Approximate lane-wise reciprocal, refined by one Newton-Raphson step.
    /// Relative error is on the order of 1e-5.
    #[inline(always)]
    pub fn fast_reciprocal(v: Vector<f32>) -> Vector<f32> {
        let guess_bits = Vector::<u32>::splat(0x7EF3_11C3) - v.to_bits();
        let guess = Vector::<f32>::from_bits(guess_bits);
        // r' = r * (2 - v * r)
        guess * (Vector::splat(2.0) - v * guess)
    }

    /// Approximate lane-wise reciprocal square root, refined by one
    /// Newton-Raphson step. Not safe for nonpositive inputs.
    #[inline(always)]
    pub fn fast_reciprocal_square_root(v: Vector<f32>) -> Vector<f32> {
        let guess_bits = Vector::<u32>::splat(0x5F37_59DF) - (v.to_bits() >> Vector::splat(1));
        let guess = Vector::<f32>::from_bits(guess_bits);
        // y' = y * (1.5 - 0.5 * v * y * y)
        guess * (Vector::splat(1.5) - Vector::splat(0.5) * v * guess * guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_reciprocal_is_close() {
        for value in [0.01f32, 0.5, 1.0, 3.7, 1024.0] {
            let approx = MathHelper::fast_reciprocal(Vector::splat(value)).as_array()[0];
            let exact = 1.0 / value;
            assert!(
                (approx - exact).abs() / exact < 1e-3,
                "1/{value}: {approx} vs {exact}"
            );
        }
    }

    #[test]
    fn fast_reciprocal_square_root_is_close() {
        for value in [0.01f32, 0.5, 1.0, 3.7, 1024.0] {
            let approx =
                MathHelper::fast_reciprocal_square_root(Vector::splat(value)).as_array()[0];
            let exact = 1.0 / value.sqrt();
            assert!(
                (approx - exact).abs() / exact < 1e-3,
                "rsqrt({value}): {approx} vs {exact}"
            );
        }
    }
}

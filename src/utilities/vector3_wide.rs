use glam::Vec3;
use std::simd::prelude::*;
use std::simd::StdFloat;

use crate::utilities::vector::{to_mask, Vector};

/// Three wide scalars laid out as structure-of-arrays: one 3-vector per lane.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Vector3Wide {
    pub x: Vector<f32>,
    pub y: Vector<f32>,
    pub z: Vector<f32>,
}

impl Vector3Wide {
    #[inline(always)]
    pub fn add(a: &Self, b: &Self) -> Self {
        Self {
            x: a.x + b.x,
            y: a.y + b.y,
            z: a.z + b.z,
        }
    }

    #[inline(always)]
    pub fn subtract(a: &Self, b: &Self) -> Self {
        Self {
            x: a.x - b.x,
            y: a.y - b.y,
            z: a.z - b.z,
        }
    }

    #[inline(always)]
    pub fn dot(a: &Self, b: &Self) -> Vector<f32> {
        a.x * b.x + a.y * b.y + a.z * b.z
    }

    #[inline(always)]
    pub fn scale(v: &Self, scalar: Vector<f32>) -> Self {
        Self {
            x: v.x * scalar,
            y: v.y * scalar,
            z: v.z * scalar,
        }
    }

    #[inline(always)]
    pub fn cross(a: &Self, b: &Self) -> Self {
        Self {
            x: a.y * b.z - a.z * b.y,
            y: a.z * b.x - a.x * b.z,
            z: a.x * b.y - a.y * b.x,
        }
    }

    #[inline(always)]
    pub fn negate(&self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    #[inline(always)]
    pub fn min(a: &Self, b: &Self) -> Self {
        Self {
            x: a.x.simd_min(b.x),
            y: a.y.simd_min(b.y),
            z: a.z.simd_min(b.z),
        }
    }

    #[inline(always)]
    pub fn max(a: &Self, b: &Self) -> Self {
        Self {
            x: a.x.simd_max(b.x),
            y: a.y.simd_max(b.y),
            z: a.z.simd_max(b.z),
        }
    }

    #[inline(always)]
    pub fn length_squared(&self) -> Vector<f32> {
        Self::dot(self, self)
    }

    #[inline(always)]
    pub fn length(&self) -> Vector<f32> {
        self.length_squared().sqrt()
    }

    #[inline(always)]
    pub fn normalize(&self) -> Self {
        let inverse = Vector::splat(1.0) / self.length();
        Self::scale(self, inverse)
    }

    /// Blends two wide vectors with a -1/0 integer mask; set lanes take `left`.
    #[inline(always)]
    pub fn conditional_select(condition: Vector<i32>, left: &Self, right: &Self) -> Self {
        let mask = to_mask(condition);
        Self {
            x: mask.select(left.x, right.x),
            y: mask.select(left.y, right.y),
            z: mask.select(left.z, right.z),
        }
    }

    /// Negates the lanes selected by a -1/0 integer mask.
    #[inline(always)]
    pub fn conditionally_negate(condition: Vector<i32>, v: &Self) -> Self {
        let mask = to_mask(condition);
        Self {
            x: mask.select(-v.x, v.x),
            y: mask.select(-v.y, v.y),
            z: mask.select(-v.z, v.z),
        }
    }

    #[inline(always)]
    pub fn broadcast(source: Vec3) -> Self {
        Self {
            x: Vector::splat(source.x),
            y: Vector::splat(source.y),
            z: Vector::splat(source.z),
        }
    }

    #[inline(always)]
    pub fn read_slot(&self, slot_index: usize) -> Vec3 {
        Vec3::new(
            self.x.as_array()[slot_index],
            self.y.as_array()[slot_index],
            self.z.as_array()[slot_index],
        )
    }

    #[inline(always)]
    pub fn write_slot(&mut self, source: Vec3, slot_index: usize) {
        self.x.as_mut_array()[slot_index] = source.x;
        self.y.as_mut_array()[slot_index] = source.y;
        self.z.as_mut_array()[slot_index] = source.z;
    }
}

impl std::ops::Add for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self::add(&self, &rhs)
    }
}

impl std::ops::Sub for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self::subtract(&self, &rhs)
    }
}

impl std::ops::Mul<Vector<f32>> for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Vector<f32>) -> Self {
        Self::scale(&self, rhs)
    }
}

impl std::ops::Neg for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::vector::LANES;

    #[test]
    fn cross_matches_scalar() {
        let a = Vector3Wide::broadcast(Vec3::new(1.0, 2.0, 3.0));
        let b = Vector3Wide::broadcast(Vec3::new(-2.0, 0.5, 4.0));
        let wide = Vector3Wide::cross(&a, &b);
        let scalar = Vec3::new(1.0, 2.0, 3.0).cross(Vec3::new(-2.0, 0.5, 4.0));
        for slot in 0..LANES {
            assert!((wide.read_slot(slot) - scalar).length() < 1e-6);
        }
    }

    #[test]
    fn conditional_select_takes_left_on_set_lanes() {
        let left = Vector3Wide::broadcast(Vec3::ONE);
        let right = Vector3Wide::broadcast(Vec3::ZERO);
        let mut condition = [0i32; LANES];
        condition[0] = -1;
        let blended =
            Vector3Wide::conditional_select(Vector::from_array(condition), &left, &right);
        assert_eq!(blended.read_slot(0), Vec3::ONE);
        assert_eq!(blended.read_slot(1), Vec3::ZERO);
    }
}

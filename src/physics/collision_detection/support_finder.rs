use std::simd::prelude::*;

use crate::physics::collidables::box_shape::BoxWide;
use crate::physics::collidables::capsule::CapsuleWide;
use crate::physics::collidables::sphere::SphereWide;
use crate::utilities::matrix3x3_wide::Matrix3x3Wide;
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Directional extreme point queries for wide convex shapes.
///
/// Shapes with a spherical margin (spheres, capsules) sample their core
/// geometry; the margin is reapplied by the consumer once a direction has
/// converged. That keeps support samples cheap and the Minkowski surface
/// smooth where it matters.
pub trait SupportFinder {
    /// Whether samples exclude a spherical margin that must be reapplied.
    const HAS_MARGIN: bool;

    /// The spherical margin excluded from support samples.
    fn margin(&self) -> Vector<f32>;

    /// Extreme point along `direction`, both in the shape's local frame.
    fn compute_local_support(&self, direction: &Vector3Wide) -> Vector3Wide;

    /// Extreme point of the shape oriented by `orientation`, in the
    /// orienting frame.
    #[inline(always)]
    fn compute_support(
        &self,
        orientation: &Matrix3x3Wide,
        direction: &Vector3Wide,
    ) -> Vector3Wide {
        let local_direction = Matrix3x3Wide::transform_by_transposed(direction, orientation);
        let local_support = self.compute_local_support(&local_direction);
        Matrix3x3Wide::transform(&local_support, orientation)
    }
}

impl SupportFinder for SphereWide {
    const HAS_MARGIN: bool = true;

    #[inline(always)]
    fn margin(&self) -> Vector<f32> {
        self.radius
    }

    #[inline(always)]
    fn compute_local_support(&self, _direction: &Vector3Wide) -> Vector3Wide {
        // The core of a sphere is its center; the radius is all margin.
        Vector3Wide::default()
    }
}

impl SupportFinder for BoxWide {
    const HAS_MARGIN: bool = false;

    #[inline(always)]
    fn margin(&self) -> Vector<f32> {
        Vector::splat(0.0)
    }

    #[inline(always)]
    fn compute_local_support(&self, direction: &Vector3Wide) -> Vector3Wide {
        let zero = Vector::splat(0.0);
        Vector3Wide {
            x: direction.x.simd_lt(zero).select(-self.half_width, self.half_width),
            y: direction
                .y
                .simd_lt(zero)
                .select(-self.half_height, self.half_height),
            z: direction
                .z
                .simd_lt(zero)
                .select(-self.half_length, self.half_length),
        }
    }
}

impl SupportFinder for CapsuleWide {
    const HAS_MARGIN: bool = true;

    #[inline(always)]
    fn margin(&self) -> Vector<f32> {
        self.radius
    }

    #[inline(always)]
    fn compute_local_support(&self, direction: &Vector3Wide) -> Vector3Wide {
        // Core is the internal segment along local Y.
        let zero = Vector::splat(0.0);
        Vector3Wide {
            x: zero,
            y: direction
                .y
                .simd_lt(zero)
                .select(-self.half_length, self.half_length),
            z: zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::box_shape::BoxShape;
    use crate::utilities::vector::LANES;
    use glam::Vec3;

    #[test]
    fn box_support_maximizes_dot_over_vertices() {
        let shape = BoxShape::new(2.0, 3.0, 1.0);
        let mut wide = BoxWide::default();
        for slot in 0..LANES {
            wide.write_slot(&shape, slot);
        }
        let directions = [
            Vec3::new(1.0, 0.2, -0.4),
            Vec3::new(-0.3, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-0.7, 0.6, -0.9),
        ];
        for direction in directions {
            let support = wide
                .compute_local_support(&Vector3Wide::broadcast(direction))
                .read_slot(0);
            let best = support.dot(direction);
            for corner in 0..8 {
                let vertex = Vec3::new(
                    if corner & 1 == 0 { -1.0 } else { 1.0 },
                    if corner & 2 == 0 { -1.5 } else { 1.5 },
                    if corner & 4 == 0 { -0.5 } else { 0.5 },
                );
                assert!(vertex.dot(direction) <= best + 1e-6);
            }
        }
    }

    #[test]
    fn capsule_support_picks_the_right_endpoint() {
        let shape = crate::physics::collidables::capsule::Capsule::new(0.5, 2.0);
        let mut wide = CapsuleWide::default();
        wide.write_slot(&shape, 0);
        let up = wide
            .compute_local_support(&Vector3Wide::broadcast(Vec3::new(0.1, 1.0, 0.0)))
            .read_slot(0);
        assert_eq!(up, Vec3::new(0.0, 1.0, 0.0));
        let down = wide
            .compute_local_support(&Vector3Wide::broadcast(Vec3::new(0.0, -1.0, 0.3)))
            .read_slot(0);
        assert_eq!(down, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(wide.margin().as_array()[0], 0.5);
    }
}

use glam::{Quat, Vec3};

use crate::physics::body_properties::BodyInertia;
use crate::utilities::vector::Vector;

/// Collision shape representing a sphere.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Type id of sphere shapes.
    pub const ID: u32 = 0;

    #[inline(always)]
    pub fn new(radius: f32) -> Self {
        debug_assert!(radius > 0.0);
        Self { radius }
    }

    pub fn compute_inertia(&self, mass: f32) -> BodyInertia {
        let mut inertia = BodyInertia::default();
        inertia.inverse_mass = 1.0 / mass;
        let inverse_moment = inertia.inverse_mass / (0.4 * self.radius * self.radius);
        inertia.inverse_inertia_tensor.xx = inverse_moment;
        inertia.inverse_inertia_tensor.yy = inverse_moment;
        inertia.inverse_inertia_tensor.zz = inverse_moment;
        inertia
    }

    pub fn compute_bounds(&self, _orientation: Quat) -> (Vec3, Vec3) {
        (Vec3::splat(-self.radius), Vec3::splat(self.radius))
    }

    pub fn maximum_radius(&self) -> f32 {
        self.radius
    }
}

/// Wide sphere bundle for SIMD narrow phase execution.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SphereWide {
    pub radius: Vector<f32>,
}

impl SphereWide {
    #[inline(always)]
    pub fn write_slot(&mut self, source: &Sphere, slot_index: usize) {
        self.radius.as_mut_array()[slot_index] = source.radius;
    }
}

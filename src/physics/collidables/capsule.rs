use glam::{Quat, Vec3};

use crate::physics::body_properties::BodyInertia;
use crate::utilities::vector::Vector;

/// Collision shape representing a sphere-swept line segment along the local
/// Y axis.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Capsule {
    /// Spherical expansion applied to the internal line segment.
    pub radius: f32,
    /// Half of the length of the internal line segment.
    pub half_length: f32,
}

impl Capsule {
    /// Type id of capsule shapes.
    pub const ID: u32 = 2;

    /// Creates a capsule from its radius and the full length of the
    /// internal segment.
    #[inline(always)]
    pub fn new(radius: f32, length: f32) -> Self {
        debug_assert!(radius > 0.0 && length >= 0.0);
        Self {
            radius,
            half_length: length * 0.5,
        }
    }

    pub fn compute_inertia(&self, mass: f32) -> BodyInertia {
        let r = self.radius;
        let l = self.half_length * 2.0;
        let cylinder_volume = std::f32::consts::PI * r * r * l;
        let sphere_volume = (4.0 / 3.0) * std::f32::consts::PI * r * r * r;
        let inverse_total = 1.0 / (cylinder_volume + sphere_volume);
        let cylinder_mass = mass * cylinder_volume * inverse_total;
        let sphere_mass = mass * sphere_volume * inverse_total;

        // Transverse moment: cylinder term plus hemispheres shifted to the
        // segment endpoints by the parallel axis theorem.
        let h = self.half_length;
        let cylinder_transverse = cylinder_mass * (l * l / 12.0 + r * r / 4.0);
        let sphere_transverse =
            sphere_mass * (0.4 * r * r + h * h + 2.0 * h * (3.0 * r / 8.0));
        let transverse = cylinder_transverse + sphere_transverse;
        let axial = cylinder_mass * r * r / 2.0 + sphere_mass * 0.4 * r * r;

        let mut inertia = BodyInertia::default();
        inertia.inverse_mass = 1.0 / mass;
        inertia.inverse_inertia_tensor.xx = 1.0 / transverse;
        inertia.inverse_inertia_tensor.yy = 1.0 / axial;
        inertia.inverse_inertia_tensor.zz = 1.0 / transverse;
        inertia
    }

    pub fn compute_bounds(&self, orientation: Quat) -> (Vec3, Vec3) {
        let segment_offset = orientation * Vec3::new(0.0, self.half_length, 0.0);
        let extent = segment_offset.abs() + Vec3::splat(self.radius);
        (-extent, extent)
    }

    pub fn maximum_radius(&self) -> f32 {
        self.half_length + self.radius
    }
}

/// Wide capsule bundle for SIMD narrow phase execution.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct CapsuleWide {
    pub radius: Vector<f32>,
    pub half_length: Vector<f32>,
}

impl CapsuleWide {
    #[inline(always)]
    pub fn write_slot(&mut self, source: &Capsule, slot_index: usize) {
        self.radius.as_mut_array()[slot_index] = source.radius;
        self.half_length.as_mut_array()[slot_index] = source.half_length;
    }
}

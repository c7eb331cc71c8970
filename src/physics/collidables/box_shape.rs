use glam::{Mat3, Quat, Vec3};

use crate::physics::body_properties::BodyInertia;
use crate::utilities::vector::Vector;

/// Collision shape representing a solid rectangular prism.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BoxShape {
    pub half_width: f32,
    pub half_height: f32,
    pub half_length: f32,
}

impl BoxShape {
    /// Type id of box shapes.
    pub const ID: u32 = 1;

    /// Creates a box from full edge lengths along x, y, and z.
    #[inline(always)]
    pub fn new(width: f32, height: f32, length: f32) -> Self {
        debug_assert!(width > 0.0 && height > 0.0 && length > 0.0);
        Self {
            half_width: width * 0.5,
            half_height: height * 0.5,
            half_length: length * 0.5,
        }
    }

    #[inline(always)]
    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(self.half_width, self.half_height, self.half_length)
    }

    pub fn compute_inertia(&self, mass: f32) -> BodyInertia {
        let mut inertia = BodyInertia::default();
        inertia.inverse_mass = 1.0 / mass;
        let x2 = self.half_width * self.half_width;
        let y2 = self.half_height * self.half_height;
        let z2 = self.half_length * self.half_length;
        inertia.inverse_inertia_tensor.xx = 3.0 * inertia.inverse_mass / (y2 + z2);
        inertia.inverse_inertia_tensor.yy = 3.0 * inertia.inverse_mass / (x2 + z2);
        inertia.inverse_inertia_tensor.zz = 3.0 * inertia.inverse_mass / (x2 + y2);
        inertia
    }

    pub fn compute_bounds(&self, orientation: Quat) -> (Vec3, Vec3) {
        let r = Mat3::from_quat(orientation);
        let extent = Vec3::new(
            r.row(0).abs().dot(self.half_extents()),
            r.row(1).abs().dot(self.half_extents()),
            r.row(2).abs().dot(self.half_extents()),
        );
        (-extent, extent)
    }

    pub fn maximum_radius(&self) -> f32 {
        self.half_extents().length()
    }
}

/// Wide box bundle for SIMD narrow phase execution.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxWide {
    pub half_width: Vector<f32>,
    pub half_height: Vector<f32>,
    pub half_length: Vector<f32>,
}

impl BoxWide {
    #[inline(always)]
    pub fn write_slot(&mut self, source: &BoxShape, slot_index: usize) {
        self.half_width.as_mut_array()[slot_index] = source.half_width;
        self.half_height.as_mut_array()[slot_index] = source.half_height;
        self.half_length.as_mut_array()[slot_index] = source.half_length;
    }
}

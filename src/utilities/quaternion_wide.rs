use glam::Quat;

use crate::utilities::vector::Vector;

/// Wide quaternion: one rotation per lane, structure-of-arrays layout.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct QuaternionWide {
    pub x: Vector<f32>,
    pub y: Vector<f32>,
    pub z: Vector<f32>,
    pub w: Vector<f32>,
}

impl Default for QuaternionWide {
    fn default() -> Self {
        Self::identity()
    }
}

impl QuaternionWide {
    #[inline(always)]
    pub fn identity() -> Self {
        Self {
            x: Vector::splat(0.0),
            y: Vector::splat(0.0),
            z: Vector::splat(0.0),
            w: Vector::splat(1.0),
        }
    }

    #[inline(always)]
    pub fn broadcast(source: Quat) -> Self {
        Self {
            x: Vector::splat(source.x),
            y: Vector::splat(source.y),
            z: Vector::splat(source.z),
            w: Vector::splat(source.w),
        }
    }

    #[inline(always)]
    pub fn write_slot(&mut self, source: Quat, slot_index: usize) {
        self.x.as_mut_array()[slot_index] = source.x;
        self.y.as_mut_array()[slot_index] = source.y;
        self.z.as_mut_array()[slot_index] = source.z;
        self.w.as_mut_array()[slot_index] = source.w;
    }
}

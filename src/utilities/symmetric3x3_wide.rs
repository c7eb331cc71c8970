use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Scalar symmetric 3x3 matrix; lower triangle storage. Used for inertia
/// tensors on the narrow side of gathers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Symmetric3x3 {
    pub xx: f32,
    pub yx: f32,
    pub yy: f32,
    pub zx: f32,
    pub zy: f32,
    pub zz: f32,
}

/// Wide symmetric 3x3 matrix; one lower triangle per lane.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Symmetric3x3Wide {
    pub xx: Vector<f32>,
    pub yx: Vector<f32>,
    pub yy: Vector<f32>,
    pub zx: Vector<f32>,
    pub zy: Vector<f32>,
    pub zz: Vector<f32>,
}

impl Symmetric3x3Wide {
    /// v * M for a symmetric M.
    #[inline(always)]
    pub fn transform(v: &Vector3Wide, m: &Self) -> Vector3Wide {
        Vector3Wide {
            x: v.x * m.xx + v.y * m.yx + v.z * m.zx,
            y: v.x * m.yx + v.y * m.yy + v.z * m.zy,
            z: v.x * m.zx + v.y * m.zy + v.z * m.zz,
        }
    }

    /// v * M * vᵀ; the scalar sandwich used by effective mass computations.
    #[inline(always)]
    pub fn vector_sandwich(v: &Vector3Wide, m: &Self) -> Vector<f32> {
        let transformed = Self::transform(v, m);
        Vector3Wide::dot(v, &transformed)
    }

    #[inline(always)]
    pub fn write_slot(&mut self, source: &Symmetric3x3, slot_index: usize) {
        self.xx.as_mut_array()[slot_index] = source.xx;
        self.yx.as_mut_array()[slot_index] = source.yx;
        self.yy.as_mut_array()[slot_index] = source.yy;
        self.zx.as_mut_array()[slot_index] = source.zx;
        self.zy.as_mut_array()[slot_index] = source.zy;
        self.zz.as_mut_array()[slot_index] = source.zz;
    }
}

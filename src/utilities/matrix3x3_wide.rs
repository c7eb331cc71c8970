use crate::utilities::quaternion_wide::QuaternionWide;
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Wide 3x3 rotation matrix stored as three wide row vectors. Rows are the
/// rotated basis axes, so `transform` follows the row-vector convention.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Matrix3x3Wide {
    pub x: Vector3Wide,
    pub y: Vector3Wide,
    pub z: Vector3Wide,
}

impl Matrix3x3Wide {
    pub fn identity() -> Self {
        let mut m = Self::default();
        m.x.x = Vector::splat(1.0);
        m.y.y = Vector::splat(1.0);
        m.z.z = Vector::splat(1.0);
        m
    }

    /// Builds the rotation matrix for each lane of a wide quaternion.
    #[inline(always)]
    pub fn create_from_quaternion(q: &QuaternionWide) -> Self {
        let two = Vector::splat(2.0);
        let qx2 = q.x * two;
        let qy2 = q.y * two;
        let qz2 = q.z * two;

        let xx = qx2 * q.x;
        let yy = qy2 * q.y;
        let zz = qz2 * q.z;
        let xy = qx2 * q.y;
        let xz = qx2 * q.z;
        let yz = qy2 * q.z;
        let wx = qx2 * q.w;
        let wy = qy2 * q.w;
        let wz = qz2 * q.w;

        let one = Vector::splat(1.0);
        Self {
            x: Vector3Wide {
                x: one - yy - zz,
                y: xy + wz,
                z: xz - wy,
            },
            y: Vector3Wide {
                x: xy - wz,
                y: one - xx - zz,
                z: yz + wx,
            },
            z: Vector3Wide {
                x: xz + wy,
                y: yz - wx,
                z: one - xx - yy,
            },
        }
    }

    /// v * M: maps a vector expressed on the rows' source basis into the
    /// rows' target space.
    #[inline(always)]
    pub fn transform(v: &Vector3Wide, m: &Self) -> Vector3Wide {
        let x = Vector3Wide::scale(&m.x, v.x);
        let y = Vector3Wide::scale(&m.y, v.y);
        let z = Vector3Wide::scale(&m.z, v.z);
        Vector3Wide::add(&Vector3Wide::add(&x, &y), &z)
    }

    /// v * Mᵀ: the inverse mapping of `transform` for rotations.
    #[inline(always)]
    pub fn transform_by_transposed(v: &Vector3Wide, m: &Self) -> Vector3Wide {
        Vector3Wide {
            x: Vector3Wide::dot(v, &m.x),
            y: Vector3Wide::dot(v, &m.y),
            z: Vector3Wide::dot(v, &m.z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn quaternion_matrix_matches_glam_rotation() {
        let q = Quat::from_axis_angle(Vec3::new(0.3, -0.8, 0.52).normalize(), 1.1);
        let m = Matrix3x3Wide::create_from_quaternion(&QuaternionWide::broadcast(q));
        let v = Vec3::new(1.5, -2.0, 0.25);
        let rotated = Matrix3x3Wide::transform(&Vector3Wide::broadcast(v), &m).read_slot(0);
        assert!((rotated - q * v).length() < 1e-5);
        let back = Matrix3x3Wide::transform_by_transposed(&Vector3Wide::broadcast(rotated), &m)
            .read_slot(0);
        assert!((back - v).length() < 1e-5);
    }
}

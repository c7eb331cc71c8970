use glam::{Mat3, Quat, Vec3};

use crate::utilities::symmetric3x3_wide::{Symmetric3x3, Symmetric3x3Wide};
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Position and orientation of a body or static.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RigidPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl RigidPose {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Default for RigidPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Linear and angular velocity of a body.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyVelocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Inverse inertial properties. A zero inverse mass and tensor marks a
/// kinematic body: it pushes, but impulses cannot move it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyInertia {
    pub inverse_inertia_tensor: Symmetric3x3,
    pub inverse_mass: f32,
}

impl BodyInertia {
    /// Rotates a local-frame inverse inertia into world space:
    /// R * I⁻¹ * Rᵀ.
    pub fn rotate(local: &Symmetric3x3, orientation: Quat) -> Symmetric3x3 {
        let r = Mat3::from_quat(orientation);
        let i = Mat3::from_cols(
            Vec3::new(local.xx, local.yx, local.zx),
            Vec3::new(local.yx, local.yy, local.zy),
            Vec3::new(local.zx, local.zy, local.zz),
        );
        let world = r * i * r.transpose();
        Symmetric3x3 {
            xx: world.x_axis.x,
            yx: world.y_axis.x,
            yy: world.y_axis.y,
            zx: world.z_axis.x,
            zy: world.z_axis.y,
            zz: world.z_axis.z,
        }
    }
}

/// Wide mirror of `BodyVelocity`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyVelocityWide {
    pub linear: Vector3Wide,
    pub angular: Vector3Wide,
}

/// Wide mirror of `BodyInertia`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyInertiaWide {
    pub inverse_inertia_tensor: Symmetric3x3Wide,
    pub inverse_mass: Vector<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotating_a_spherical_tensor_is_identity() {
        let local = Symmetric3x3 {
            xx: 2.5,
            yy: 2.5,
            zz: 2.5,
            ..Default::default()
        };
        let rotated = BodyInertia::rotate(
            &local,
            Quat::from_axis_angle(Vec3::new(1.0, 2.0, -1.0).normalize(), 0.9),
        );
        assert!((rotated.xx - 2.5).abs() < 1e-5);
        assert!((rotated.yy - 2.5).abs() < 1e-5);
        assert!((rotated.zz - 2.5).abs() < 1e-5);
        assert!(rotated.yx.abs() < 1e-5);
        assert!(rotated.zx.abs() < 1e-5);
        assert!(rotated.zy.abs() < 1e-5);
    }
}

//! Four-body volume preservation constraint:
//! `(ab x ac) . ad = target scaled volume`.
//!
//! Linear jacobians only; orientation never enters. The target is six
//! times the tetrahedron's signed volume, which keeps the constraint
//! function a plain triple product.

use glam::Vec3;
use std::simd::prelude::*;

use crate::physics::body_properties::{BodyInertiaWide, BodyVelocityWide};
use crate::physics::constraints::spring_settings::{SpringSettings, SpringSettingsWide};
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Scalar description of a volume constraint over bodies A, B, C, D.
#[derive(Clone, Copy, Debug)]
pub struct VolumeConstraintDescription {
    /// 6 * target volume of the tetrahedron ABCD.
    pub target_scaled_volume: f32,
    pub spring_settings: SpringSettings,
}

impl VolumeConstraintDescription {
    /// Builds a description targeting the volume currently spanned by the
    /// given vertex positions.
    pub fn from_positions(a: Vec3, b: Vec3, c: Vec3, d: Vec3, spring_settings: SpringSettings) -> Self {
        Self {
            target_scaled_volume: (b - a).cross(c - a).dot(d - a),
            spring_settings,
        }
    }
}

/// Wide prestep inputs for a bundle of volume constraints.
#[derive(Clone, Copy)]
pub struct VolumePrestepWide {
    pub target_scaled_volume: Vector<f32>,
    pub spring_settings: SpringSettingsWide,
}

impl VolumePrestepWide {
    pub fn empty() -> Self {
        Self {
            target_scaled_volume: Vector::splat(0.0),
            spring_settings: SpringSettingsWide::default(),
        }
    }

    pub fn write_slot(&mut self, description: &VolumeConstraintDescription, slot: usize) {
        self.target_scaled_volume.as_mut_array()[slot] = description.target_scaled_volume;
        self.spring_settings
            .write_slot(&description.spring_settings, slot);
    }
}

/// Per-frame cached jacobians, effective mass, and bias.
#[derive(Clone, Copy)]
pub struct VolumeProjectionWide {
    pub negated_jacobian_a: Vector3Wide,
    pub jacobian_b: Vector3Wide,
    pub jacobian_c: Vector3Wide,
    pub jacobian_d: Vector3Wide,
    pub inverse_mass_a: Vector<f32>,
    pub inverse_mass_b: Vector<f32>,
    pub inverse_mass_c: Vector<f32>,
    pub inverse_mass_d: Vector<f32>,
    pub effective_mass: Vector<f32>,
    pub bias_velocity: Vector<f32>,
    pub softness_impulse_scale: Vector<f32>,
}

pub struct VolumeConstraintFunctions;

impl VolumeConstraintFunctions {
    /// Computes the jacobians from current positions:
    /// `J_B = ac x ad`, `J_C = ad x ab`, `J_D = ab x ac`,
    /// `J_A = -(J_B + J_C + J_D)`.
    #[allow(clippy::too_many_arguments)]
    pub fn prestep(
        prestep: &VolumePrestepWide,
        position_a: &Vector3Wide,
        position_b: &Vector3Wide,
        position_c: &Vector3Wide,
        position_d: &Vector3Wide,
        inertia_a: &BodyInertiaWide,
        inertia_b: &BodyInertiaWide,
        inertia_c: &BodyInertiaWide,
        inertia_d: &BodyInertiaWide,
        dt: f32,
    ) -> VolumeProjectionWide {
        let ab = Vector3Wide::subtract(position_b, position_a);
        let ac = Vector3Wide::subtract(position_c, position_a);
        let ad = Vector3Wide::subtract(position_d, position_a);
        let jacobian_b = Vector3Wide::cross(&ac, &ad);
        let jacobian_c = Vector3Wide::cross(&ad, &ab);
        let jacobian_d = Vector3Wide::cross(&ab, &ac);
        let negated_jacobian_a = Vector3Wide::add(
            &Vector3Wide::add(&jacobian_b, &jacobian_c),
            &jacobian_d,
        );

        let mut contribution_a = negated_jacobian_a.length_squared();
        let mut contribution_b = jacobian_b.length_squared();
        let mut contribution_c = jacobian_c.length_squared();
        let mut contribution_d = jacobian_d.length_squared();
        // Degenerate tetrahedra produce zero-length jacobians; the epsilon
        // keeps the effective mass finite. Scaled by the target volume so
        // the guard tracks the constraint's own scale.
        let epsilon = Vector::splat(5e-4) * prestep.target_scaled_volume;
        contribution_a = contribution_a.simd_max(epsilon);
        contribution_b = contribution_b.simd_max(epsilon);
        contribution_c = contribution_c.simd_max(epsilon);
        contribution_d = contribution_d.simd_max(epsilon);
        let inverse_effective_mass = contribution_a * inertia_a.inverse_mass
            + contribution_b * inertia_b.inverse_mass
            + contribution_c * inertia_c.inverse_mass
            + contribution_d * inertia_d.inverse_mass;

        let (position_error_to_velocity, effective_mass_cfm_scale, softness_impulse_scale) =
            SpringSettingsWide::compute_springiness(&prestep.spring_settings, dt);

        let unscaled_volume = Vector3Wide::dot(&jacobian_d, &ad);
        VolumeProjectionWide {
            negated_jacobian_a,
            jacobian_b,
            jacobian_c,
            jacobian_d,
            inverse_mass_a: inertia_a.inverse_mass,
            inverse_mass_b: inertia_b.inverse_mass,
            inverse_mass_c: inertia_c.inverse_mass,
            inverse_mass_d: inertia_d.inverse_mass,
            effective_mass: effective_mass_cfm_scale / inverse_effective_mass,
            bias_velocity: (prestep.target_scaled_volume - unscaled_volume)
                * position_error_to_velocity,
            softness_impulse_scale,
        }
    }

    #[inline(always)]
    fn apply_impulse(
        projection: &VolumeProjectionWide,
        impulse: Vector<f32>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
        wsv_c: &mut BodyVelocityWide,
        wsv_d: &mut BodyVelocityWide,
    ) {
        wsv_a.linear = Vector3Wide::subtract(
            &wsv_a.linear,
            &Vector3Wide::scale(
                &projection.negated_jacobian_a,
                projection.inverse_mass_a * impulse,
            ),
        );
        wsv_b.linear = Vector3Wide::add(
            &wsv_b.linear,
            &Vector3Wide::scale(&projection.jacobian_b, projection.inverse_mass_b * impulse),
        );
        wsv_c.linear = Vector3Wide::add(
            &wsv_c.linear,
            &Vector3Wide::scale(&projection.jacobian_c, projection.inverse_mass_c * impulse),
        );
        wsv_d.linear = Vector3Wide::add(
            &wsv_d.linear,
            &Vector3Wide::scale(&projection.jacobian_d, projection.inverse_mass_d * impulse),
        );
    }

    pub fn warm_start(
        projection: &VolumeProjectionWide,
        accumulated_impulse: Vector<f32>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
        wsv_c: &mut BodyVelocityWide,
        wsv_d: &mut BodyVelocityWide,
    ) {
        Self::apply_impulse(projection, accumulated_impulse, wsv_a, wsv_b, wsv_c, wsv_d);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        projection: &VolumeProjectionWide,
        accumulated_impulse: &mut Vector<f32>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
        wsv_c: &mut BodyVelocityWide,
        wsv_d: &mut BodyVelocityWide,
    ) {
        let negated_velocity_a =
            Vector3Wide::dot(&projection.negated_jacobian_a, &wsv_a.linear);
        let velocity_b = Vector3Wide::dot(&projection.jacobian_b, &wsv_b.linear);
        let velocity_c = Vector3Wide::dot(&projection.jacobian_c, &wsv_c.linear);
        let velocity_d = Vector3Wide::dot(&projection.jacobian_d, &wsv_d.linear);
        let constraint_space_velocity =
            velocity_b + velocity_c + velocity_d - negated_velocity_a;
        let constraint_space_impulse = (projection.bias_velocity - constraint_space_velocity)
            * projection.effective_mass
            - *accumulated_impulse * projection.softness_impulse_scale;
        *accumulated_impulse = *accumulated_impulse + constraint_space_impulse;
        Self::apply_impulse(
            projection,
            constraint_space_impulse,
            wsv_a,
            wsv_b,
            wsv_c,
            wsv_d,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::vector::LANES;

    fn tetrahedron() -> [Vec3; 4] {
        // Regular tetrahedron of edge length 1, wound so the scaled volume
        // is positive.
        [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 0.0, -(3.0f32.sqrt()) / 2.0),
            Vec3::new(0.5, (2.0f32 / 3.0).sqrt(), -(3.0f32.sqrt()) / 6.0),
        ]
    }

    fn projection_at_rest() -> VolumeProjectionWide {
        let [a, b, c, d] = tetrahedron();
        let description = VolumeConstraintDescription::from_positions(
            a,
            b,
            c,
            d,
            SpringSettings::new(30.0, 1.0),
        );
        // The triple product of a regular tetrahedron is six times its
        // volume: sqrt(2)/12 per unit edge.
        assert!((description.target_scaled_volume - 6.0 * 2.0f32.sqrt() / 12.0).abs() < 1e-5);

        let mut prestep = VolumePrestepWide::empty();
        for slot in 0..LANES {
            prestep.write_slot(&description, slot);
        }
        let unit_mass = {
            let mut inertia = BodyInertiaWide::default();
            inertia.inverse_mass = Vector::splat(1.0);
            inertia
        };
        VolumeConstraintFunctions::prestep(
            &prestep,
            &Vector3Wide::broadcast(a),
            &Vector3Wide::broadcast(b),
            &Vector3Wide::broadcast(c),
            &Vector3Wide::broadcast(d),
            &unit_mass,
            &unit_mass,
            &unit_mass,
            &unit_mass,
            1.0 / 60.0,
        )
    }

    #[test]
    fn resting_tetrahedron_has_zero_bias() {
        let projection = projection_at_rest();
        assert!(projection.bias_velocity.as_array()[0].abs() < 1e-6);
    }

    #[test]
    fn resting_tetrahedron_accumulates_no_impulse() {
        let projection = projection_at_rest();
        let mut accumulated = Vector::splat(0.0);
        let mut wsv = [BodyVelocityWide::default(); 4];
        for _ in 0..8 {
            let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
            VolumeConstraintFunctions::solve(&projection, &mut accumulated, a, b, c, d);
        }
        assert!(accumulated.as_array()[0].abs() < 1e-6);
        assert!(wsv[0].linear.read_slot(0).length() < 1e-6);
    }

    #[test]
    fn compression_produces_restoring_impulse() {
        let projection = projection_at_rest();
        let mut accumulated = Vector::splat(0.0);
        let mut wsv = [BodyVelocityWide::default(); 4];
        // Push the apex toward the base: the volume shrinks.
        wsv[3].linear.write_slot(Vec3::new(0.0, -1.0, 0.0), 0);
        let [ref mut a, ref mut b, ref mut c, ref mut d] = wsv;
        VolumeConstraintFunctions::solve(&projection, &mut accumulated, a, b, c, d);
        assert!(
            accumulated.as_array()[0] > 0.0,
            "shrinking volume must be resisted"
        );
    }
}

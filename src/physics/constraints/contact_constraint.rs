//! Two-body contact constraints with one to four contact points.
//!
//! Each contact contributes a penetration limit along the shared normal;
//! the manifold as a whole contributes a planar friction constraint whose
//! impulse is clamped to a disc scaled by the total normal impulse. The
//! contact count is a const generic rather than four stamped-out types.

use glam::Vec3;
use std::simd::prelude::*;
use std::simd::StdFloat;

use crate::physics::body_properties::{BodyInertiaWide, BodyVelocityWide};
use crate::physics::constraints::spring_settings::{SpringSettings, SpringSettingsWide};
use crate::utilities::matrix2x3_wide::{Matrix2x3Wide, Symmetric2x2Wide};
use crate::utilities::symmetric3x3_wide::Symmetric3x3Wide;
use crate::utilities::vector::Vector;
use crate::utilities::vector2_wide::Vector2Wide;
use crate::utilities::vector3_wide::Vector3Wide;

/// Scalar description of a contact constraint, produced by the narrow
/// phase from a manifold.
#[derive(Clone, Copy, Debug)]
pub struct ContactConstraintDescription<const N: usize> {
    pub offset_a: [Vec3; N],
    pub depth: [f32; N],
    /// Shared surface normal, calibrated to point from B toward A so a
    /// positive impulse pushes the bodies apart.
    pub normal: Vec3,
    /// Center of B minus center of A.
    pub offset_b: Vec3,
    pub friction_coefficient: f32,
    pub spring_settings: SpringSettings,
    pub maximum_recovery_velocity: f32,
}

/// Wide prestep inputs for a bundle of contact constraints.
#[derive(Clone, Copy)]
pub struct ContactPrestepWide<const N: usize> {
    pub offset_a: [Vector3Wide; N],
    pub depth: [Vector<f32>; N],
    pub normal: Vector3Wide,
    pub offset_b: Vector3Wide,
    pub friction_coefficient: Vector<f32>,
    pub spring_settings: SpringSettingsWide,
    pub maximum_recovery_velocity: Vector<f32>,
}

impl<const N: usize> ContactPrestepWide<N> {
    pub fn empty() -> Self {
        Self {
            offset_a: [Vector3Wide::default(); N],
            depth: [Vector::splat(0.0); N],
            normal: Vector3Wide::default(),
            offset_b: Vector3Wide::default(),
            friction_coefficient: Vector::splat(0.0),
            spring_settings: SpringSettingsWide::default(),
            maximum_recovery_velocity: Vector::splat(0.0),
        }
    }

    pub fn write_slot(&mut self, description: &ContactConstraintDescription<N>, slot: usize) {
        for contact in 0..N {
            self.offset_a[contact].write_slot(description.offset_a[contact], slot);
            self.depth[contact].as_mut_array()[slot] = description.depth[contact];
        }
        self.normal.write_slot(description.normal, slot);
        self.offset_b.write_slot(description.offset_b, slot);
        self.friction_coefficient.as_mut_array()[slot] = description.friction_coefficient;
        self.spring_settings
            .write_slot(&description.spring_settings, slot);
        self.maximum_recovery_velocity.as_mut_array()[slot] =
            description.maximum_recovery_velocity;
    }
}

/// Accumulated impulses carried across frames for warm starting.
#[derive(Clone, Copy)]
pub struct ContactImpulsesWide<const N: usize> {
    pub penetration: [Vector<f32>; N],
    pub tangent: Vector2Wide,
}

impl<const N: usize> ContactImpulsesWide<N> {
    pub fn empty() -> Self {
        Self {
            penetration: [Vector::splat(0.0); N],
            tangent: Vector2Wide::default(),
        }
    }

    /// Reads one lane's penetration impulses into a scalar array.
    pub fn read_slot(&self, slot: usize) -> [f32; N] {
        std::array::from_fn(|contact| self.penetration[contact].as_array()[slot])
    }

    /// Writes one lane's penetration impulses; tangent impulses do not
    /// survive contact-count changes and reset to zero.
    pub fn write_slot(&mut self, penetration: &[f32; N], slot: usize) {
        for contact in 0..N {
            self.penetration[contact].as_mut_array()[slot] = penetration[contact];
        }
        self.tangent.x.as_mut_array()[slot] = 0.0;
        self.tangent.y.as_mut_array()[slot] = 0.0;
    }
}

/// Everything the warm start and solve iterations need, rebuilt by the
/// prestep every frame.
#[derive(Clone, Copy)]
pub struct ContactProjectionWide<const N: usize> {
    pub inertia_a: BodyInertiaWide,
    pub inertia_b: BodyInertiaWide,
    pub normal: Vector3Wide,
    pub angular_a: [Vector3Wide; N],
    pub angular_b: [Vector3Wide; N],
    pub effective_mass: [Vector<f32>; N],
    pub bias_velocity: [Vector<f32>; N],
    pub softness_impulse_scale: Vector<f32>,
    pub friction_jacobians: FrictionJacobians,
    pub friction_effective_mass: Symmetric2x2Wide,
    pub friction_coefficient: Vector<f32>,
}

impl<const N: usize> ContactProjectionWide<N> {
    pub fn empty() -> Self {
        Self {
            inertia_a: BodyInertiaWide::default(),
            inertia_b: BodyInertiaWide::default(),
            normal: Vector3Wide::default(),
            angular_a: [Vector3Wide::default(); N],
            angular_b: [Vector3Wide::default(); N],
            effective_mass: [Vector::splat(0.0); N],
            bias_velocity: [Vector::splat(0.0); N],
            softness_impulse_scale: Vector::splat(0.0),
            friction_jacobians: FrictionJacobians::default(),
            friction_effective_mass: Symmetric2x2Wide::default(),
            friction_coefficient: Vector::splat(0.0),
        }
    }
}

/// Tangent-plane jacobian rows for the manifold friction constraint.
#[derive(Clone, Copy, Default)]
pub struct FrictionJacobians {
    pub linear_a: Matrix2x3Wide,
    pub angular_a: Matrix2x3Wide,
    pub angular_b: Matrix2x3Wide,
}

/// Builds a basis around the normal. The choice is arbitrary but must be
/// deterministic; friction has no preferred direction in the plane.
#[inline(always)]
fn build_orthonormal_basis(normal: &Vector3Wide) -> (Vector3Wide, Vector3Wide) {
    // Pick the axis least aligned with the normal as the seed.
    let abs_x = normal.x.abs();
    let abs_y = normal.y.abs();
    let use_x_seed = abs_y.simd_ge(abs_x);
    let seed = Vector3Wide {
        x: use_x_seed.select(Vector::splat(1.0), Vector::splat(0.0)),
        y: use_x_seed.select(Vector::splat(0.0), Vector::splat(1.0)),
        z: Vector::splat(0.0),
    };
    let tangent_x = Vector3Wide::cross(&seed, normal).normalize();
    let tangent_y = Vector3Wide::cross(normal, &tangent_x);
    (tangent_x, tangent_y)
}

pub struct ContactConstraintFunctions;

impl ContactConstraintFunctions {
    /// Precomputes jacobians, effective masses, softness, and bias
    /// velocities from the current body states.
    pub fn prestep<const N: usize>(
        prestep: &ContactPrestepWide<N>,
        inertia_a: BodyInertiaWide,
        inertia_b: BodyInertiaWide,
        dt: f32,
        inverse_dt: f32,
    ) -> ContactProjectionWide<N> {
        let mut projection = ContactProjectionWide::<N>::empty();
        projection.inertia_a = inertia_a;
        projection.inertia_b = inertia_b;
        projection.normal = prestep.normal;
        projection.friction_coefficient = prestep.friction_coefficient;

        let (position_error_to_velocity, effective_mass_cfm_scale, softness_impulse_scale) =
            SpringSettingsWide::compute_springiness(&prestep.spring_settings, dt);
        projection.softness_impulse_scale = softness_impulse_scale;

        let inverse_dt_wide = Vector::splat(inverse_dt);
        let linear = projection.inertia_a.inverse_mass + projection.inertia_b.inverse_mass;
        for contact in 0..N {
            let offset_a = prestep.offset_a[contact];
            let offset_b = Vector3Wide::subtract(&offset_a, &prestep.offset_b);
            let angular_a = Vector3Wide::cross(&offset_a, &prestep.normal);
            let angular_b = Vector3Wide::cross(&prestep.normal, &offset_b);
            let angular_contribution_a = Symmetric3x3Wide::vector_sandwich(
                &angular_a,
                &projection.inertia_a.inverse_inertia_tensor,
            );
            let angular_contribution_b = Symmetric3x3Wide::vector_sandwich(
                &angular_b,
                &projection.inertia_b.inverse_inertia_tensor,
            );
            projection.effective_mass[contact] = effective_mass_cfm_scale
                / (linear + angular_contribution_a + angular_contribution_b);
            // Speculative contacts: negative depth permits approach up to
            // the surface, because positionErrorToVelocity * dt <= 1.
            let depth = prestep.depth[contact];
            projection.bias_velocity[contact] = (depth * inverse_dt_wide).simd_min(
                (depth * position_error_to_velocity).simd_min(prestep.maximum_recovery_velocity),
            );
            projection.angular_a[contact] = angular_a;
            projection.angular_b[contact] = angular_b;
        }

        // Friction acts at the manifold center with shared tangents.
        let (tangent_x, tangent_y) = build_orthonormal_basis(&prestep.normal);
        let scale = Vector::splat(1.0 / N as f32);
        let mut center_a = prestep.offset_a[0];
        for contact in 1..N {
            center_a = Vector3Wide::add(&center_a, &prestep.offset_a[contact]);
        }
        center_a = Vector3Wide::scale(&center_a, scale);
        let center_b = Vector3Wide::subtract(&center_a, &prestep.offset_b);

        projection.friction_jacobians.linear_a = Matrix2x3Wide {
            x: tangent_x,
            y: tangent_y,
        };
        projection.friction_jacobians.angular_a = Matrix2x3Wide {
            x: Vector3Wide::cross(&center_a, &tangent_x),
            y: Vector3Wide::cross(&center_a, &tangent_y),
        };
        projection.friction_jacobians.angular_b = Matrix2x3Wide {
            x: Vector3Wide::cross(&tangent_x, &center_b),
            y: Vector3Wide::cross(&tangent_y, &center_b),
        };

        let mut friction_mass = Symmetric2x2Wide::sandwich_scale(
            &projection.friction_jacobians.linear_a,
            linear,
        );
        let angular_ax = Symmetric3x3Wide::transform(
            &projection.friction_jacobians.angular_a.x,
            &projection.inertia_a.inverse_inertia_tensor,
        );
        let angular_ay = Symmetric3x3Wide::transform(
            &projection.friction_jacobians.angular_a.y,
            &projection.inertia_a.inverse_inertia_tensor,
        );
        let angular_bx = Symmetric3x3Wide::transform(
            &projection.friction_jacobians.angular_b.x,
            &projection.inertia_b.inverse_inertia_tensor,
        );
        let angular_by = Symmetric3x3Wide::transform(
            &projection.friction_jacobians.angular_b.y,
            &projection.inertia_b.inverse_inertia_tensor,
        );
        friction_mass.xx = friction_mass.xx
            + Vector3Wide::dot(&projection.friction_jacobians.angular_a.x, &angular_ax)
            + Vector3Wide::dot(&projection.friction_jacobians.angular_b.x, &angular_bx);
        friction_mass.yx = friction_mass.yx
            + Vector3Wide::dot(&projection.friction_jacobians.angular_a.y, &angular_ax)
            + Vector3Wide::dot(&projection.friction_jacobians.angular_b.y, &angular_bx);
        friction_mass.yy = friction_mass.yy
            + Vector3Wide::dot(&projection.friction_jacobians.angular_a.y, &angular_ay)
            + Vector3Wide::dot(&projection.friction_jacobians.angular_b.y, &angular_by);
        projection.friction_effective_mass = Symmetric2x2Wide::invert_without_overlap(&friction_mass);
        projection
    }

    #[inline(always)]
    fn apply_penetration_impulse<const N: usize>(
        projection: &ContactProjectionWide<N>,
        contact: usize,
        impulse: Vector<f32>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
    ) {
        let linear_change_a = impulse * projection.inertia_a.inverse_mass;
        wsv_a.linear = Vector3Wide::add(
            &wsv_a.linear,
            &Vector3Wide::scale(&projection.normal, linear_change_a),
        );
        let angular_impulse_a = Vector3Wide::scale(&projection.angular_a[contact], impulse);
        wsv_a.angular = Vector3Wide::add(
            &wsv_a.angular,
            &Symmetric3x3Wide::transform(
                &angular_impulse_a,
                &projection.inertia_a.inverse_inertia_tensor,
            ),
        );

        let linear_change_b = impulse * projection.inertia_b.inverse_mass;
        // The normal is A's linear jacobian; B's is its negation.
        wsv_b.linear = Vector3Wide::subtract(
            &wsv_b.linear,
            &Vector3Wide::scale(&projection.normal, linear_change_b),
        );
        let angular_impulse_b = Vector3Wide::scale(&projection.angular_b[contact], impulse);
        wsv_b.angular = Vector3Wide::add(
            &wsv_b.angular,
            &Symmetric3x3Wide::transform(
                &angular_impulse_b,
                &projection.inertia_b.inverse_inertia_tensor,
            ),
        );
    }

    #[inline(always)]
    fn apply_friction_impulse<const N: usize>(
        projection: &ContactProjectionWide<N>,
        impulse: &Vector2Wide,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
    ) {
        let linear_impulse =
            Matrix2x3Wide::transform(impulse, &projection.friction_jacobians.linear_a);
        let angular_impulse_a =
            Matrix2x3Wide::transform(impulse, &projection.friction_jacobians.angular_a);
        let angular_impulse_b =
            Matrix2x3Wide::transform(impulse, &projection.friction_jacobians.angular_b);

        wsv_a.linear = Vector3Wide::add(
            &wsv_a.linear,
            &Vector3Wide::scale(&linear_impulse, projection.inertia_a.inverse_mass),
        );
        wsv_a.angular = Vector3Wide::add(
            &wsv_a.angular,
            &Symmetric3x3Wide::transform(
                &angular_impulse_a,
                &projection.inertia_a.inverse_inertia_tensor,
            ),
        );
        wsv_b.linear = Vector3Wide::subtract(
            &wsv_b.linear,
            &Vector3Wide::scale(&linear_impulse, projection.inertia_b.inverse_mass),
        );
        wsv_b.angular = Vector3Wide::add(
            &wsv_b.angular,
            &Symmetric3x3Wide::transform(
                &angular_impulse_b,
                &projection.inertia_b.inverse_inertia_tensor,
            ),
        );
    }

    /// Applies the previous frame's accumulated impulses once.
    pub fn warm_start<const N: usize>(
        projection: &ContactProjectionWide<N>,
        impulses: &ContactImpulsesWide<N>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
    ) {
        for contact in 0..N {
            Self::apply_penetration_impulse(
                projection,
                contact,
                impulses.penetration[contact],
                wsv_a,
                wsv_b,
            );
        }
        Self::apply_friction_impulse(projection, &impulses.tangent, wsv_a, wsv_b);
    }

    /// One velocity iteration: friction first against the previous total
    /// normal impulse, then each penetration limit.
    pub fn solve<const N: usize>(
        projection: &ContactProjectionWide<N>,
        impulses: &mut ContactImpulsesWide<N>,
        wsv_a: &mut BodyVelocityWide,
        wsv_b: &mut BodyVelocityWide,
    ) {
        let zero = Vector::splat(0.0);

        let mut total_normal_impulse = zero;
        for contact in 0..N {
            total_normal_impulse = total_normal_impulse + impulses.penetration[contact];
        }

        // Friction: csi = -J*v * effectiveMass, clamped to the disc of
        // radius friction * totalNormalImpulse.
        let relative_linear = Vector3Wide::subtract(&wsv_a.linear, &wsv_b.linear);
        let mut tangent_velocity = Matrix2x3Wide::transform_by_rows(
            &projection.friction_jacobians.linear_a,
            &relative_linear,
        );
        let angular_velocity_a = Matrix2x3Wide::transform_by_rows(
            &projection.friction_jacobians.angular_a,
            &wsv_a.angular,
        );
        let angular_velocity_b = Matrix2x3Wide::transform_by_rows(
            &projection.friction_jacobians.angular_b,
            &wsv_b.angular,
        );
        tangent_velocity = Vector2Wide::add(
            &tangent_velocity,
            &Vector2Wide::add(&angular_velocity_a, &angular_velocity_b),
        );
        let friction_csi = Symmetric2x2Wide::transform(
            &Vector2Wide::scale(&tangent_velocity, Vector::splat(-1.0)),
            &projection.friction_effective_mass,
        );
        let candidate = Vector2Wide::add(&impulses.tangent, &friction_csi);
        let maximum_impulse = projection.friction_coefficient * total_normal_impulse;
        let candidate_magnitude_squared = candidate.length_squared();
        let needs_clamp = candidate_magnitude_squared
            .simd_gt(maximum_impulse * maximum_impulse);
        let scale = maximum_impulse
            / candidate_magnitude_squared.sqrt().simd_max(Vector::splat(1e-20));
        let clamped = Vector2Wide::scale(&candidate, needs_clamp.select(scale, Vector::splat(1.0)));
        let corrective_friction = Vector2Wide::subtract(&clamped, &impulses.tangent);
        impulses.tangent = clamped;
        Self::apply_friction_impulse(projection, &corrective_friction, wsv_a, wsv_b);

        // Penetration limits, sequentially per contact.
        for contact in 0..N {
            let contact_velocity_a = Vector3Wide::dot(&wsv_a.linear, &projection.normal)
                + Vector3Wide::dot(&wsv_a.angular, &projection.angular_a[contact]);
            let negated_contact_velocity_b =
                Vector3Wide::dot(&wsv_b.linear, &projection.normal)
                    - Vector3Wide::dot(&wsv_b.angular, &projection.angular_b[contact]);
            let contact_velocity = contact_velocity_a - negated_contact_velocity_b;
            let negated_csi = impulses.penetration[contact] * projection.softness_impulse_scale
                + (contact_velocity - projection.bias_velocity[contact])
                    * projection.effective_mass[contact];
            let previous = impulses.penetration[contact];
            impulses.penetration[contact] = (previous - negated_csi).simd_max(zero);
            let corrective = impulses.penetration[contact] - previous;
            Self::apply_penetration_impulse(projection, contact, corrective, wsv_a, wsv_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::symmetric3x3_wide::Symmetric3x3;
    use crate::utilities::vector::LANES;

    fn unit_inertia() -> BodyInertiaWide {
        let mut inertia = BodyInertiaWide::default();
        inertia.inverse_mass = Vector::splat(1.0);
        let tensor = Symmetric3x3 {
            xx: 1.0,
            yy: 1.0,
            zz: 1.0,
            ..Default::default()
        };
        for slot in 0..LANES {
            inertia.inverse_inertia_tensor.write_slot(&tensor, slot);
        }
        inertia
    }

    fn head_on_projection() -> ContactProjectionWide<1> {
        let mut prestep = ContactPrestepWide::<1>::empty();
        let description = ContactConstraintDescription::<1> {
            offset_a: [Vec3::new(0.0, -1.0, 0.0)],
            depth: [0.05],
            // B sits below A; the calibrated normal points up at A.
            normal: Vec3::new(0.0, 1.0, 0.0),
            offset_b: Vec3::new(0.0, -2.0, 0.0),
            friction_coefficient: 1.0,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        };
        for slot in 0..LANES {
            prestep.write_slot(&description, slot);
        }
        ContactConstraintFunctions::prestep(
            &prestep,
            unit_inertia(),
            unit_inertia(),
            1.0 / 60.0,
            60.0,
        )
    }

    #[test]
    fn warm_start_with_zero_impulse_is_a_no_op() {
        let projection = head_on_projection();
        let mut wsv_a = BodyVelocityWide::default();
        let mut wsv_b = BodyVelocityWide::default();
        wsv_a.linear.write_slot(Vec3::new(0.0, -1.0, 0.0), 0);
        let before_a = wsv_a.linear.read_slot(0);
        let impulses = ContactImpulsesWide::<1>::empty();
        ContactConstraintFunctions::warm_start(&projection, &impulses, &mut wsv_a, &mut wsv_b);
        assert_eq!(wsv_a.linear.read_slot(0), before_a);
        assert_eq!(wsv_b.linear.read_slot(0), Vec3::ZERO);
        assert_eq!(wsv_a.angular.read_slot(0), Vec3::ZERO);
    }

    #[test]
    fn normal_impulse_stays_nonnegative_and_stops_approach() {
        let projection = head_on_projection();
        let mut impulses = ContactImpulsesWide::<1>::empty();
        let mut wsv_a = BodyVelocityWide::default();
        let mut wsv_b = BodyVelocityWide::default();
        // A moving toward B along -Y (into the contact).
        wsv_a.linear.write_slot(Vec3::new(0.0, -1.0, 0.0), 0);
        for _ in 0..8 {
            ContactConstraintFunctions::solve(&projection, &mut impulses, &mut wsv_a, &mut wsv_b);
            assert!(
                impulses.penetration[0].as_array()[0] >= 0.0,
                "accumulated normal impulse must never go negative"
            );
        }
        // The approach should be arrested; the bias may even push A back
        // out along the calibrated normal.
        assert!(
            wsv_a.linear.read_slot(0).y > -0.1,
            "approach velocity {} not arrested",
            wsv_a.linear.read_slot(0).y
        );
        assert!(impulses.penetration[0].as_array()[0] > 0.0);
    }

    #[test]
    fn separating_contacts_accumulate_no_impulse() {
        let projection = head_on_projection();
        let mut impulses = ContactImpulsesWide::<1>::empty();
        let mut wsv_a = BodyVelocityWide::default();
        let mut wsv_b = BodyVelocityWide::default();
        // A moving away from B.
        wsv_a.linear.write_slot(Vec3::new(0.0, 5.0, 0.0), 0);
        for _ in 0..4 {
            ContactConstraintFunctions::solve(&projection, &mut impulses, &mut wsv_a, &mut wsv_b);
        }
        assert_eq!(impulses.penetration[0].as_array()[0], 0.0);
        // Velocity untouched by a zero impulse.
        assert_eq!(wsv_a.linear.read_slot(0), Vec3::new(0.0, 5.0, 0.0));
    }
}

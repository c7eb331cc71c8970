use glam::Quat;

use crate::physics::bodies::BodySet;
use crate::physics::body_properties::BodyInertia;
use crate::utilities::thread_dispatcher::{dispatch_jobs, ThreadDispatcher};

/// Bodies integrated per parallel job.
const BODIES_PER_JOB: usize = 64;

/// Advances active body poses by their post-solve velocities and refreshes
/// world-frame inverse inertias for the next frame's prestep.
pub struct PoseIntegrator;

impl PoseIntegrator {
    #[inline(always)]
    fn integrate_body(set: &BodySet, index: usize, dt: f32) -> (glam::Vec3, Quat, BodyInertia) {
        let pose = &set.poses[index];
        let velocity = &set.velocities[index];
        let position = pose.position + velocity.linear * dt;

        // q' = normalize(q + 0.5 * (w * dt) ⊗ q)
        let angular = velocity.angular * dt;
        let half_spin = Quat::from_xyzw(angular.x, angular.y, angular.z, 0.0) * pose.orientation;
        let orientation = Quat::from_xyzw(
            pose.orientation.x + 0.5 * half_spin.x,
            pose.orientation.y + 0.5 * half_spin.y,
            pose.orientation.z + 0.5 * half_spin.z,
            pose.orientation.w + 0.5 * half_spin.w,
        )
        .normalize();

        let local = &set.local_inertias[index];
        let world = BodyInertia {
            inverse_inertia_tensor: BodyInertia::rotate(
                &local.inverse_inertia_tensor,
                orientation,
            ),
            inverse_mass: local.inverse_mass,
        };
        (position, orientation, world)
    }

    pub fn integrate(set: &mut BodySet, dt: f32, dispatcher: &dyn ThreadDispatcher) {
        let body_count = set.count();
        let job_count = (body_count + BODIES_PER_JOB - 1) / BODIES_PER_JOB;
        if dispatcher.thread_count() == 1 || job_count <= 1 {
            for index in 0..body_count {
                let (position, orientation, inertia) = Self::integrate_body(set, index, dt);
                set.poses[index].position = position;
                set.poses[index].orientation = orientation;
                set.inertias[index] = inertia;
            }
            return;
        }

        struct IntegrationView {
            set: *mut BodySet,
        }
        // Safety: jobs cover disjoint body ranges, so no slot is written by
        // two workers.
        unsafe impl Send for IntegrationView {}
        unsafe impl Sync for IntegrationView {}

        let view = IntegrationView {
            set: set as *mut BodySet,
        };
        dispatch_jobs(dispatcher, job_count, &|_, job_index| {
            let view = &view;
            let set = unsafe { &mut *view.set };
            let start = job_index * BODIES_PER_JOB;
            let end = (start + BODIES_PER_JOB).min(body_count);
            for index in start..end {
                let (position, orientation, inertia) = Self::integrate_body(set, index, dt);
                set.poses[index].position = position;
                set.poses[index].orientation = orientation;
                set.inertias[index] = inertia;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::bodies::{Bodies, BodyDescription};
    use crate::physics::body_properties::{BodyVelocity, RigidPose};
    use crate::physics::collidables::collidable::Collidable;
    use crate::physics::collidables::typed_index::TypedIndex;
    use crate::utilities::thread_dispatcher::SequentialDispatcher;
    use glam::Vec3;

    #[test]
    fn linear_velocity_advances_position() {
        let mut bodies = Bodies::new();
        bodies.add(&BodyDescription {
            pose: RigidPose::identity(),
            velocity: BodyVelocity {
                linear: Vec3::new(1.0, 2.0, 0.0),
                angular: Vec3::ZERO,
            },
            local_inertia: BodyInertia {
                inverse_mass: 1.0,
                ..Default::default()
            },
            collidable: Collidable::new(TypedIndex::new(0, 0), 0.1),
        });
        PoseIntegrator::integrate(bodies.active_set_mut(), 0.5, &SequentialDispatcher);
        let pose = &bodies.active_set().poses[0];
        assert!((pose.position - Vec3::new(0.5, 1.0, 0.0)).length() < 1e-6);
        assert!((pose.orientation.length() - 1.0).abs() < 1e-6);
    }
}

use crate::physics::body_properties::{
    BodyInertia, BodyInertiaWide, BodyVelocity, BodyVelocityWide, RigidPose,
};
use crate::physics::collidables::collidable::Collidable;
use crate::physics::errors::KeelError;
use crate::physics::handles::{BodyHandle, ConstraintHandle, HandlePool};
use crate::utilities::vector::{Vector, LANES};
use crate::utilities::vector3_wide::Vector3Wide;

/// Sentinel solver body reference: lane refers to no dynamic body (a static
/// collidable, or an unoccupied trailing lane of a partial bundle).
pub const NO_BODY: i32 = -1;

/// Marks an encoded body reference as kinematic: its state is gathered,
/// but impulses never scatter back.
pub const KINEMATIC_FLAG: i32 = 1 << 30;

/// Masks the flag bits off an encoded body reference.
pub const BODY_REFERENCE_MASK: i32 = KINEMATIC_FLAG - 1;

/// Encodes an active-set body index for storage in constraint body
/// references.
#[inline(always)]
pub fn encode_body_index(index: usize, kinematic: bool) -> i32 {
    index as i32 | if kinematic { KINEMATIC_FLAG } else { 0 }
}

/// Where a body handle's data currently lives.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyLocation {
    /// Which set the body belongs to; 0 is the active set, higher indices
    /// are sleeping islands.
    pub set_index: u32,
    /// Slot within the set.
    pub index: u32,
}

/// Everything needed to create a body.
#[derive(Clone, Copy, Debug)]
pub struct BodyDescription {
    pub pose: RigidPose,
    pub velocity: BodyVelocity,
    pub local_inertia: BodyInertia,
    pub collidable: Collidable,
}

/// Notes a constraint connected to a body and which of the constraint's
/// body slots the body occupies.
#[derive(Clone, Copy, Debug)]
pub struct BodyConstraintReference {
    pub connecting_constraint_handle: ConstraintHandle,
    pub body_index_in_constraint: u32,
}

/// Slot-parallel storage for one set of bodies.
#[derive(Default)]
pub struct BodySet {
    pub poses: Vec<RigidPose>,
    pub velocities: Vec<BodyVelocity>,
    pub local_inertias: Vec<BodyInertia>,
    /// World-frame inverse inertias, refreshed whenever poses change.
    pub inertias: Vec<BodyInertia>,
    pub collidables: Vec<Collidable>,
    pub index_to_handle: Vec<BodyHandle>,
    /// Per-body lists of connected constraints.
    pub constraints: Vec<Vec<BodyConstraintReference>>,
}

impl BodySet {
    pub fn count(&self) -> usize {
        self.poses.len()
    }

    fn push(&mut self, handle: BodyHandle, description: &BodyDescription) -> u32 {
        self.poses.push(description.pose);
        self.velocities.push(description.velocity);
        self.local_inertias.push(description.local_inertia);
        self.inertias.push(BodyInertia {
            inverse_inertia_tensor: BodyInertia::rotate(
                &description.local_inertia.inverse_inertia_tensor,
                description.pose.orientation,
            ),
            inverse_mass: description.local_inertia.inverse_mass,
        });
        self.collidables.push(description.collidable);
        self.index_to_handle.push(handle);
        self.constraints.push(Vec::new());
        self.poses.len() as u32 - 1
    }

    /// Swap-removes a slot, returning the handle of the body that moved
    /// into it, if any.
    fn swap_remove(&mut self, index: usize) -> Option<BodyHandle> {
        self.poses.swap_remove(index);
        self.velocities.swap_remove(index);
        self.local_inertias.swap_remove(index);
        self.inertias.swap_remove(index);
        self.collidables.swap_remove(index);
        self.index_to_handle.swap_remove(index);
        self.constraints.swap_remove(index);
        if index < self.index_to_handle.len() {
            Some(self.index_to_handle[index])
        } else {
            None
        }
    }
}

/// Body storage and handle bookkeeping. Set 0 is the active set; the narrow
/// phase and solver only ever touch set 0.
pub struct Bodies {
    pub sets: Vec<BodySet>,
    pub handle_to_location: Vec<BodyLocation>,
    handle_pool: HandlePool,
}

impl Bodies {
    pub fn new() -> Self {
        Self {
            sets: vec![BodySet::default()],
            handle_to_location: Vec::new(),
            handle_pool: HandlePool::default(),
        }
    }

    #[inline(always)]
    pub fn active_set(&self) -> &BodySet {
        &self.sets[0]
    }

    #[inline(always)]
    pub fn active_set_mut(&mut self) -> &mut BodySet {
        &mut self.sets[0]
    }

    pub fn add(&mut self, description: &BodyDescription) -> BodyHandle {
        let handle = BodyHandle(self.handle_pool.take());
        let index = self.sets[0].push(handle, description);
        let slot = handle.0 as usize;
        if slot >= self.handle_to_location.len() {
            self.handle_to_location
                .resize_with(slot + 1, BodyLocation::default);
        }
        self.handle_to_location[slot] = BodyLocation {
            set_index: 0,
            index,
        };
        handle
    }

    /// Removes a body. The body must have no connected constraints; remove
    /// or let the narrow phase flush them first.
    pub fn remove(&mut self, handle: BodyHandle) -> Result<(), KeelError> {
        let location = self.handle_to_location[handle.0 as usize];
        let set = &mut self.sets[location.set_index as usize];
        if !set.constraints[location.index as usize].is_empty() {
            return Err(KeelError::ContractViolation(
                "removed bodies must not have connected constraints",
            ));
        }
        if let Some(moved_handle) = set.swap_remove(location.index as usize) {
            self.handle_to_location[moved_handle.0 as usize].index = location.index;
        }
        self.handle_pool.return_id(handle.0);
        Ok(())
    }

    #[inline(always)]
    pub fn index_of(&self, handle: BodyHandle) -> usize {
        let location = &self.handle_to_location[handle.0 as usize];
        debug_assert_eq!(location.set_index, 0, "Only active bodies have solver indices.");
        location.index as usize
    }

    pub fn add_constraint_reference(
        &mut self,
        body_index: usize,
        constraint_handle: ConstraintHandle,
        body_index_in_constraint: u32,
    ) {
        self.sets[0].constraints[body_index].push(BodyConstraintReference {
            connecting_constraint_handle: constraint_handle,
            body_index_in_constraint,
        });
    }

    pub fn remove_constraint_reference(
        &mut self,
        body_index: usize,
        constraint_handle: ConstraintHandle,
    ) {
        let list = &mut self.sets[0].constraints[body_index];
        if let Some(position) = list
            .iter()
            .position(|entry| entry.connecting_constraint_handle == constraint_handle)
        {
            list.swap_remove(position);
        }
    }
}

impl Default for Bodies {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw view over the active set used inside solver dispatches.
///
/// Safety: sharing this across workers is sound only while the coloring
/// invariant holds — within a batch, every body index appears in at most one
/// bundle, so concurrent `scatter_velocities` calls never alias. The view is
/// created from an exclusive borrow, so no other access coexists with it.
pub struct SolverBodyView {
    poses: *const RigidPose,
    velocities: *mut BodyVelocity,
    inertias: *const BodyInertia,
    count: usize,
}

unsafe impl Send for SolverBodyView {}
unsafe impl Sync for SolverBodyView {}

impl SolverBodyView {
    pub fn new(set: &mut BodySet) -> Self {
        Self {
            poses: set.poses.as_ptr(),
            velocities: set.velocities.as_mut_ptr(),
            inertias: set.inertias.as_ptr(),
            count: set.poses.len(),
        }
    }

    /// Gathers positions, velocities, and inverse inertias for a bundle of
    /// body references. Lanes referencing `NO_BODY` gather zeros, which
    /// makes statics and empty lanes immovable as far as kernels care.
    #[inline(always)]
    pub fn gather_state(
        &self,
        references: Vector<i32>,
        position: &mut Vector3Wide,
        velocity: &mut BodyVelocityWide,
        inertia: &mut BodyInertiaWide,
    ) {
        *position = Vector3Wide::default();
        *velocity = BodyVelocityWide::default();
        *inertia = BodyInertiaWide::default();
        for slot in 0..LANES {
            let body_index = references.as_array()[slot];
            if body_index < 0 {
                continue;
            }
            let body_index = (body_index & BODY_REFERENCE_MASK) as usize;
            debug_assert!(body_index < self.count);
            let pose = unsafe { &*self.poses.add(body_index) };
            let body_velocity = unsafe { &*self.velocities.add(body_index) };
            let body_inertia = unsafe { &*self.inertias.add(body_index) };
            position.write_slot(pose.position, slot);
            velocity.linear.write_slot(body_velocity.linear, slot);
            velocity.angular.write_slot(body_velocity.angular, slot);
            inertia.inverse_mass.as_mut_array()[slot] = body_inertia.inverse_mass;
            inertia
                .inverse_inertia_tensor
                .write_slot(&body_inertia.inverse_inertia_tensor, slot);
        }
    }

    #[inline(always)]
    pub fn gather_velocities(&self, references: Vector<i32>, velocity: &mut BodyVelocityWide) {
        *velocity = BodyVelocityWide::default();
        for slot in 0..LANES {
            let body_index = references.as_array()[slot];
            if body_index < 0 {
                continue;
            }
            let body_index = (body_index & BODY_REFERENCE_MASK) as usize;
            let body_velocity = unsafe { &*self.velocities.add(body_index) };
            velocity.linear.write_slot(body_velocity.linear, slot);
            velocity.angular.write_slot(body_velocity.angular, slot);
        }
    }

    /// Writes a bundle of velocities back. Lanes referencing `NO_BODY` or a
    /// kinematic body are skipped.
    #[inline(always)]
    pub fn scatter_velocities(&self, references: Vector<i32>, velocity: &BodyVelocityWide) {
        for slot in 0..LANES {
            let body_index = references.as_array()[slot];
            if body_index < 0 || body_index & KINEMATIC_FLAG != 0 {
                continue;
            }
            debug_assert!((body_index as usize) < self.count);
            let target = unsafe { &mut *self.velocities.add(body_index as usize) };
            target.linear = velocity.linear.read_slot(slot);
            target.angular = velocity.angular.read_slot(slot);
        }
    }

    /// Adds a velocity delta to one body. Used by the fallback batch's
    /// reduction, which runs single threaded.
    #[inline(always)]
    pub fn apply_velocity_delta(&self, body_index: usize, linear: glam::Vec3, angular: glam::Vec3) {
        debug_assert!(body_index < self.count);
        let target = unsafe { &mut *self.velocities.add(body_index) };
        target.linear += linear;
        target.angular += angular;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::typed_index::TypedIndex;
    use glam::Vec3;

    fn test_body(position: Vec3) -> BodyDescription {
        BodyDescription {
            pose: RigidPose::at(position),
            velocity: BodyVelocity::default(),
            local_inertia: BodyInertia {
                inverse_mass: 1.0,
                ..Default::default()
            },
            collidable: Collidable::new(TypedIndex::new(0, 0), 0.1),
        }
    }

    #[test]
    fn add_remove_preserves_handle_mapping() {
        let mut bodies = Bodies::new();
        let a = bodies.add(&test_body(Vec3::ZERO));
        let b = bodies.add(&test_body(Vec3::X));
        let c = bodies.add(&test_body(Vec3::Y));
        bodies.remove(a).unwrap();
        // c was swapped into a's slot.
        assert_eq!(bodies.index_of(c), 0);
        assert_eq!(bodies.index_of(b), 1);
        assert_eq!(
            bodies.active_set().poses[bodies.index_of(c)].position,
            Vec3::Y
        );
    }

    #[test]
    fn gather_skips_no_body_lanes() {
        let mut bodies = Bodies::new();
        bodies.add(&test_body(Vec3::new(5.0, 0.0, 0.0)));
        let view = SolverBodyView::new(bodies.active_set_mut());
        let mut references = [NO_BODY; LANES];
        references[0] = 0;
        let mut position = Vector3Wide::default();
        let mut velocity = BodyVelocityWide::default();
        let mut inertia = BodyInertiaWide::default();
        view.gather_state(
            Vector::from_array(references),
            &mut position,
            &mut velocity,
            &mut inertia,
        );
        assert_eq!(position.read_slot(0), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(position.read_slot(1), Vec3::ZERO);
        assert_eq!(inertia.inverse_mass.as_array()[0], 1.0);
        assert_eq!(inertia.inverse_mass.as_array()[1], 0.0);
    }
}

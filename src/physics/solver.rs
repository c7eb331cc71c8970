//! Batched iterative velocity solver.
//!
//! Constraints are partitioned into batches in which no dynamic body
//! appears twice, found greedily at insertion time. Batches execute
//! serially in index order; bundles within a batch fan out across workers,
//! race free by the coloring invariant. Bodies whose constraint degree
//! exhausts the colored batch cap overflow into the sequential fallback
//! batch, which runs last with an averaged Jacobi projection.

use crate::physics::bodies::{Bodies, SolverBodyView, BODY_REFERENCE_MASK};
use crate::physics::constraint_batch::ConstraintBatch;
use crate::physics::constraints::contact_constraint::ContactConstraintDescription;
use crate::physics::constraints::type_batch::{
    ContactTypeSlot, ContactTypes, TypeBatch, VOLUME_TYPE_ID,
};
use crate::physics::constraints::volume_constraint::VolumeConstraintDescription;
use crate::physics::errors::KeelError;
use crate::physics::handles::{ConstraintHandle, HandlePool};
use crate::physics::sequential_fallback_batch::{JacobiDeltas, SequentialFallbackBatch};
use crate::utilities::index_set::IndexSet;
use crate::utilities::thread_dispatcher::{dispatch_jobs, ThreadDispatcher};

/// Bundles per parallel solve job. Small enough to balance, large enough
/// to amortize the claim.
const BUNDLES_PER_JOB: usize = 4;

/// Where a live constraint's data lives.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintLocation {
    pub batch_index: u32,
    pub type_id: u32,
    pub index_in_type_batch: u32,
}

const DEAD_BATCH: u32 = u32::MAX;

pub struct Solver {
    /// Colored batches in execution order. If the fallback batch exists,
    /// it sits at index `fallback_batch_threshold`.
    pub batches: Vec<ConstraintBatch>,
    /// Per colored batch, the set of dynamic body handles it references.
    batch_referenced_handles: Vec<IndexSet>,
    pub fallback: SequentialFallbackBatch,
    pub fallback_batch_threshold: usize,
    pub velocity_iteration_count: usize,
    pub handle_pool: HandlePool,
    handle_to_constraint: Vec<ConstraintLocation>,
    jacobi_deltas: JacobiDeltas,
    /// Scratch for removal bookkeeping.
    body_index_scratch: Vec<i32>,
}

impl Solver {
    pub fn new(velocity_iteration_count: usize, fallback_batch_threshold: usize) -> Self {
        debug_assert!(velocity_iteration_count >= 1);
        Self {
            batches: Vec::new(),
            batch_referenced_handles: Vec::new(),
            fallback: SequentialFallbackBatch::default(),
            fallback_batch_threshold,
            velocity_iteration_count,
            handle_pool: HandlePool::default(),
            handle_to_constraint: Vec::new(),
            jacobi_deltas: JacobiDeltas::new(),
            body_index_scratch: Vec::new(),
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.batches.iter().map(ConstraintBatch::constraint_count).sum()
    }

    #[inline(always)]
    pub fn location_of(&self, handle: ConstraintHandle) -> &ConstraintLocation {
        let location = &self.handle_to_constraint[handle.0 as usize];
        debug_assert!(location.batch_index != DEAD_BATCH, "constraint is dead");
        location
    }

    /// Finds the first batch whose referenced handles admit all of the
    /// given dynamic bodies, creating colored batches up to the threshold
    /// before spilling into the fallback batch.
    fn find_target_batch(&mut self, dynamic_body_handles: &[usize]) -> usize {
        let colored_count = self.batches.len().min(self.fallback_batch_threshold);
        for batch_index in 0..colored_count {
            if self.batch_referenced_handles[batch_index].can_fit(dynamic_body_handles) {
                return batch_index;
            }
        }
        if self.batches.len() < self.fallback_batch_threshold {
            self.batches.push(ConstraintBatch::new());
            self.batch_referenced_handles.push(IndexSet::with_capacity(64));
            return self.batches.len() - 1;
        }
        // Every colored batch is blocked; this constraint joins the
        // fallback batch.
        while self.batches.len() <= self.fallback_batch_threshold {
            self.batches.push(ConstraintBatch::new());
        }
        self.fallback_batch_threshold
    }

    fn claim_batch_slots(&mut self, batch_index: usize, dynamic_body_handles: &[usize]) {
        if batch_index < self.fallback_batch_threshold {
            let referenced = &mut self.batch_referenced_handles[batch_index];
            for &handle in dynamic_body_handles {
                referenced.set(handle);
            }
        } else {
            let as_i32: Vec<i32> = dynamic_body_handles.iter().map(|&h| h as i32).collect();
            self.fallback.allocate(&as_i32);
        }
    }

    fn record_location(&mut self, handle: ConstraintHandle, location: ConstraintLocation) {
        let slot = handle.0 as usize;
        if slot >= self.handle_to_constraint.len() {
            self.handle_to_constraint.resize(
                slot + 1,
                ConstraintLocation {
                    batch_index: DEAD_BATCH,
                    type_id: 0,
                    index_in_type_batch: 0,
                },
            );
        }
        self.handle_to_constraint[slot] = location;
    }

    fn register_body_references(
        bodies: &mut Bodies,
        handle: ConstraintHandle,
        encoded_bodies: &[i32],
    ) {
        for (slot, &encoded) in encoded_bodies.iter().enumerate() {
            if encoded < 0 {
                continue;
            }
            bodies.add_constraint_reference(
                (encoded & BODY_REFERENCE_MASK) as usize,
                handle,
                slot as u32,
            );
        }
    }

    /// Adds a contact constraint between body A and (possibly static) body
    /// B. `dynamic_body_handles` are the handles that must be exclusive
    /// within a colored batch; kinematic and static collidables are not
    /// listed.
    pub fn add_contact_constraint<const N: usize>(
        &mut self,
        bodies: &mut Bodies,
        encoded_body_a: i32,
        encoded_body_b: i32,
        dynamic_body_handles: &[usize],
        description: &ContactConstraintDescription<N>,
        initial_impulses: &[f32; N],
    ) -> ConstraintHandle
    where
        ContactTypes: ContactTypeSlot<N>,
    {
        let handle = ConstraintHandle(self.handle_pool.take());
        let batch_index = self.find_target_batch(dynamic_body_handles);
        self.claim_batch_slots(batch_index, dynamic_body_handles);
        let type_batch = self.batches[batch_index]
            .get_or_create_type_batch(<ContactTypes as ContactTypeSlot<N>>::TYPE_ID);
        let index = <ContactTypes as ContactTypeSlot<N>>::get_mut(type_batch).allocate(
            handle,
            encoded_body_a,
            encoded_body_b,
            description,
            initial_impulses,
        );
        self.record_location(
            handle,
            ConstraintLocation {
                batch_index: batch_index as u32,
                type_id: <ContactTypes as ContactTypeSlot<N>>::TYPE_ID,
                index_in_type_batch: index as u32,
            },
        );
        Self::register_body_references(bodies, handle, &[encoded_body_a, encoded_body_b]);
        handle
    }

    /// Adds a four-body volume constraint.
    pub fn add_volume_constraint(
        &mut self,
        bodies: &mut Bodies,
        encoded_bodies: [i32; 4],
        dynamic_body_handles: &[usize],
        description: &VolumeConstraintDescription,
    ) -> ConstraintHandle {
        let handle = ConstraintHandle(self.handle_pool.take());
        let batch_index = self.find_target_batch(dynamic_body_handles);
        self.claim_batch_slots(batch_index, dynamic_body_handles);
        let type_batch = self.batches[batch_index].get_or_create_type_batch(VOLUME_TYPE_ID);
        let index = match type_batch {
            TypeBatch::Volume(volume) => volume.allocate(handle, encoded_bodies, description),
            _ => unreachable!(),
        };
        self.record_location(
            handle,
            ConstraintLocation {
                batch_index: batch_index as u32,
                type_id: VOLUME_TYPE_ID,
                index_in_type_batch: index as u32,
            },
        );
        Self::register_body_references(bodies, handle, &encoded_bodies);
        handle
    }

    /// Rewrites an existing contact constraint's description and carried
    /// impulses in place; the constraint keeps its slot and handle.
    pub fn update_contact_constraint<const N: usize>(
        &mut self,
        handle: ConstraintHandle,
        description: &ContactConstraintDescription<N>,
        impulses: &[f32; N],
    ) where
        ContactTypes: ContactTypeSlot<N>,
    {
        let location = *self.location_of(handle);
        debug_assert_eq!(location.type_id, <ContactTypes as ContactTypeSlot<N>>::TYPE_ID);
        let type_batch = self.batches[location.batch_index as usize]
            .type_batch_mut(location.type_id)
            .expect("live constraint's type batch must exist");
        let contact_batch = <ContactTypes as ContactTypeSlot<N>>::get_mut(type_batch);
        contact_batch.apply_description(location.index_in_type_batch as usize, description);
        contact_batch
            .write_penetration_impulses(location.index_in_type_batch as usize, impulses);
    }

    /// Reads a contact constraint's accumulated penetration impulses into
    /// `impulses`, returning the contact count.
    pub fn read_contact_impulses(
        &self,
        handle: ConstraintHandle,
        impulses: &mut [f32; 4],
    ) -> usize {
        let location = *self.location_of(handle);
        let type_batch = self.batches[location.batch_index as usize]
            .type_batch(location.type_id)
            .expect("live constraint's type batch must exist");
        let index = location.index_in_type_batch as usize;
        match type_batch {
            TypeBatch::Contact1(batch) => {
                impulses[..1].copy_from_slice(&batch.read_penetration_impulses(index));
                1
            }
            TypeBatch::Contact2(batch) => {
                impulses[..2].copy_from_slice(&batch.read_penetration_impulses(index));
                2
            }
            TypeBatch::Contact3(batch) => {
                impulses[..3].copy_from_slice(&batch.read_penetration_impulses(index));
                3
            }
            TypeBatch::Contact4(batch) => {
                impulses[..4].copy_from_slice(&batch.read_penetration_impulses(index));
                4
            }
            TypeBatch::Volume(_) => unreachable!("volume constraints carry no contact impulses"),
        }
    }

    /// Removes a constraint, releasing its batch slots, body list entries,
    /// and handle.
    pub fn remove_constraint(&mut self, bodies: &mut Bodies, handle: ConstraintHandle) {
        let location = *self.location_of(handle);
        let batch_index = location.batch_index as usize;
        let index = location.index_in_type_batch as usize;

        let mut encoded_bodies = std::mem::take(&mut self.body_index_scratch);
        encoded_bodies.clear();
        {
            let type_batch = self.batches[batch_index]
                .type_batch(location.type_id)
                .expect("live constraint's type batch must exist");
            type_batch.encoded_body_indices(index, &mut encoded_bodies);
        }

        // Body list entries and batch exclusivity slots.
        let mut dynamic_handles: Vec<usize> = Vec::with_capacity(encoded_bodies.len());
        for &encoded in &encoded_bodies {
            let body_index = (encoded & BODY_REFERENCE_MASK) as usize;
            bodies.remove_constraint_reference(body_index, handle);
            if encoded & crate::physics::bodies::KINEMATIC_FLAG == 0 {
                dynamic_handles.push(bodies.active_set().index_to_handle[body_index].0 as usize);
            }
        }
        if batch_index < self.fallback_batch_threshold {
            let referenced = &mut self.batch_referenced_handles[batch_index];
            for &body_handle in &dynamic_handles {
                referenced.unset(body_handle);
            }
        } else {
            let as_i32: Vec<i32> = dynamic_handles.iter().map(|&h| h as i32).collect();
            self.fallback.remove(&as_i32);
        }

        let type_batch = self.batches[batch_index]
            .type_batch_mut(location.type_id)
            .expect("live constraint's type batch must exist");
        if let Some(moved_handle) = type_batch.remove(index) {
            self.handle_to_constraint[moved_handle.0 as usize].index_in_type_batch = index as u32;
        }
        self.batches[batch_index].remove_type_batch_if_empty(location.type_id);

        self.handle_to_constraint[handle.0 as usize].batch_index = DEAD_BATCH;
        self.handle_pool.return_id(handle.0);
        encoded_bodies.clear();
        self.body_index_scratch = encoded_bodies;
    }

    /// Marks a constraint's handle slot dead and recycles the handle.
    /// Part of the removal flush; see the constraint remover.
    pub fn mark_dead_and_return_handle(&mut self, handle: ConstraintHandle) {
        self.handle_to_constraint[handle.0 as usize].batch_index = DEAD_BATCH;
        self.handle_pool.return_id(handle.0);
    }

    /// Releases a colored batch's exclusivity claims on body handles.
    pub fn unset_batch_referenced_handles(
        &mut self,
        batch_index: usize,
        dynamic_body_handles: &[usize],
    ) {
        let referenced = &mut self.batch_referenced_handles[batch_index];
        for &body_handle in dynamic_body_handles {
            referenced.unset(body_handle);
        }
    }

    /// Removes constraints from one type batch. Indices must be sorted
    /// descending so swap-with-last removals never disturb a pending
    /// index. Moved survivors get their locations patched.
    pub fn remove_from_type_batch(
        &mut self,
        batch_index: usize,
        type_id: u32,
        indices_descending: &[usize],
    ) {
        let type_batch_ptr = self.batches[batch_index]
            .type_batch_mut(type_id)
            .expect("planned type batch must exist") as *mut TypeBatch;
        for &index in indices_descending {
            // Safety: the pointer stays valid; only handle_to_constraint
            // entries of surviving constraints are written here.
            let type_batch = unsafe { &mut *type_batch_ptr };
            if let Some(moved_handle) = type_batch.remove(index) {
                self.handle_to_constraint[moved_handle.0 as usize].index_in_type_batch =
                    index as u32;
            }
        }
    }

    /// Rewrites one body slot of a constraint after a body changed its
    /// active-set index.
    pub fn update_body_reference(
        &mut self,
        handle: ConstraintHandle,
        slot_in_constraint: u32,
        new_encoded_index: i32,
    ) {
        let location = *self.location_of(handle);
        let type_batch = self.batches[location.batch_index as usize]
            .type_batch_mut(location.type_id)
            .expect("live constraint's type batch must exist");
        let index = location.index_in_type_batch as usize;
        let (bundle, inner) =
            crate::utilities::bundle_indexing::BundleIndexing::get_bundle_indices(index);
        match type_batch {
            TypeBatch::Contact1(batch) => {
                write_two_body_slot(&mut batch.body_references[bundle], slot_in_constraint, inner, new_encoded_index)
            }
            TypeBatch::Contact2(batch) => {
                write_two_body_slot(&mut batch.body_references[bundle], slot_in_constraint, inner, new_encoded_index)
            }
            TypeBatch::Contact3(batch) => {
                write_two_body_slot(&mut batch.body_references[bundle], slot_in_constraint, inner, new_encoded_index)
            }
            TypeBatch::Contact4(batch) => {
                write_two_body_slot(&mut batch.body_references[bundle], slot_in_constraint, inner, new_encoded_index)
            }
            TypeBatch::Volume(batch) => {
                let references = &mut batch.body_references[bundle];
                let lane = match slot_in_constraint {
                    0 => &mut references.index_a,
                    1 => &mut references.index_b,
                    2 => &mut references.index_c,
                    _ => &mut references.index_d,
                };
                lane.as_mut_array()[inner] = new_encoded_index;
            }
        }
    }

    /// Runs prestep, warm start, and the velocity iterations.
    pub fn solve(
        &mut self,
        bodies: &mut Bodies,
        dt: f32,
        dispatcher: &dyn ThreadDispatcher,
    ) -> Result<(), KeelError> {
        if dt <= 0.0 {
            return Err(KeelError::ContractViolation("dt must be positive"));
        }
        let inverse_dt = 1.0 / dt;
        let body_count = bodies.active_set().count();
        let view = SolverBodyView::new(bodies.active_set_mut());

        // Prestep touches no shared velocity state; every bundle of every
        // batch can run concurrently.
        let mut prestep_jobs = Vec::new();
        for batch in self.batches.iter_mut() {
            collect_jobs(batch, &mut prestep_jobs);
        }
        run_jobs(&prestep_jobs, dispatcher, |job| {
            // Safety: each job covers a disjoint bundle range of its type
            // batch, and prestep writes only that range's projections.
            let type_batch = unsafe { &mut *job.type_batch };
            type_batch.prestep(&view, dt, inverse_dt, job.start, job.end);
        });

        let fallback_live =
            self.batches.len() > self.fallback_batch_threshold && {
                self.batches[self.fallback_batch_threshold].constraint_count() > 0
            };

        // Warm start: batches execute serially, bundles within them in
        // parallel. The fallback batch accumulates and applies summed
        // deltas since its bodies can repeat.
        for batch_index in 0..self.batches.len() {
            if batch_index == self.fallback_batch_threshold {
                continue;
            }
            let mut jobs = Vec::new();
            collect_jobs(&mut self.batches[batch_index], &mut jobs);
            run_jobs(&jobs, dispatcher, |job| {
                // Safety: bundle ranges are disjoint and the coloring
                // invariant keeps body writes disjoint across bundles.
                let type_batch = unsafe { &mut *job.type_batch };
                type_batch.warm_start(&view, job.start, job.end);
            });
        }
        if fallback_live {
            self.jacobi_deltas.prepare(body_count);
            for type_batch in
                self.batches[self.fallback_batch_threshold].type_batches.iter_mut()
            {
                type_batch.warm_start_jacobi(&view, &mut self.jacobi_deltas);
            }
            self.jacobi_deltas.apply(&view, false);
        }

        for _ in 0..self.velocity_iteration_count {
            for batch_index in 0..self.batches.len() {
                if batch_index == self.fallback_batch_threshold {
                    continue;
                }
                let mut jobs = Vec::new();
                collect_jobs(&mut self.batches[batch_index], &mut jobs);
                run_jobs(&jobs, dispatcher, |job| {
                    // Safety: same disjointness argument as the warm start.
                    let type_batch = unsafe { &mut *job.type_batch };
                    type_batch.solve(&view, job.start, job.end);
                });
            }
            if fallback_live {
                self.jacobi_deltas.prepare(body_count);
                for type_batch in
                    self.batches[self.fallback_batch_threshold].type_batches.iter_mut()
                {
                    type_batch.solve_jacobi(&view, &mut self.jacobi_deltas);
                }
                self.jacobi_deltas.apply(&view, true);
            }
        }
        Ok(())
    }
}

#[inline(always)]
fn write_two_body_slot(
    references: &mut crate::physics::constraints::type_batch::TwoBodyReferencesWide,
    slot_in_constraint: u32,
    inner: usize,
    new_encoded_index: i32,
) {
    let lane = if slot_in_constraint == 0 {
        &mut references.index_a
    } else {
        &mut references.index_b
    };
    lane.as_mut_array()[inner] = new_encoded_index;
}

/// One parallel work item: a contiguous bundle range of one type batch.
struct BundleJob {
    type_batch: *mut TypeBatch,
    start: usize,
    end: usize,
}

// Safety: jobs are only executed through `run_jobs`, whose callers
// guarantee ranges are disjoint per type batch and body writes are
// disjoint per the coloring invariant.
unsafe impl Send for BundleJob {}
unsafe impl Sync for BundleJob {}

fn collect_jobs(batch: &mut ConstraintBatch, jobs: &mut Vec<BundleJob>) {
    for type_batch in batch.type_batches.iter_mut() {
        let bundle_count = type_batch.bundle_count();
        let type_batch_ptr = type_batch as *mut TypeBatch;
        let mut start = 0;
        while start < bundle_count {
            let end = (start + BUNDLES_PER_JOB).min(bundle_count);
            jobs.push(BundleJob {
                type_batch: type_batch_ptr,
                start,
                end,
            });
            start = end;
        }
    }
}

fn run_jobs(
    jobs: &[BundleJob],
    dispatcher: &dyn ThreadDispatcher,
    executor: impl Fn(&BundleJob) + Sync,
) {
    if jobs.is_empty() {
        return;
    }
    if jobs.len() == 1 || dispatcher.thread_count() == 1 {
        for job in jobs {
            executor(job);
        }
        return;
    }
    dispatch_jobs(dispatcher, jobs.len(), &|_, job_index| {
        executor(&jobs[job_index]);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::bodies::{encode_body_index, BodyDescription};
    use crate::physics::body_properties::{BodyInertia, BodyVelocity, RigidPose};
    use crate::physics::collidables::collidable::Collidable;
    use crate::physics::collidables::typed_index::TypedIndex;
    use crate::physics::constraints::spring_settings::SpringSettings;
    use glam::Vec3;

    fn add_test_body(bodies: &mut Bodies, position: Vec3) -> crate::physics::handles::BodyHandle {
        bodies.add(&BodyDescription {
            pose: RigidPose::at(position),
            velocity: BodyVelocity::default(),
            local_inertia: BodyInertia {
                inverse_mass: 1.0,
                ..Default::default()
            },
            collidable: Collidable::new(TypedIndex::new(0, 0), 0.1),
        })
    }

    fn contact_description() -> ContactConstraintDescription<1> {
        ContactConstraintDescription {
            offset_a: [Vec3::ZERO],
            depth: [0.0],
            normal: Vec3::Y,
            offset_b: Vec3::new(0.0, -1.0, 0.0),
            friction_coefficient: 1.0,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        }
    }

    fn add_pair_constraint(
        solver: &mut Solver,
        bodies: &mut Bodies,
        a: crate::physics::handles::BodyHandle,
        b: crate::physics::handles::BodyHandle,
    ) -> ConstraintHandle {
        let encoded_a = encode_body_index(bodies.index_of(a), false);
        let encoded_b = encode_body_index(bodies.index_of(b), false);
        solver.add_contact_constraint(
            bodies,
            encoded_a,
            encoded_b,
            &[a.0 as usize, b.0 as usize],
            &contact_description(),
            &[0.0],
        )
    }

    #[test]
    fn shared_bodies_force_new_batches() {
        // Constraints {(A,B), (C,D), (A,C), (B,D)} must color into two
        // batches of two constraints, with no body twice in a batch.
        let mut solver = Solver::new(4, 8);
        let mut bodies = Bodies::new();
        let a = add_test_body(&mut bodies, Vec3::ZERO);
        let b = add_test_body(&mut bodies, Vec3::X);
        let c = add_test_body(&mut bodies, Vec3::Y);
        let d = add_test_body(&mut bodies, Vec3::Z);

        let h_ab = add_pair_constraint(&mut solver, &mut bodies, a, b);
        let h_cd = add_pair_constraint(&mut solver, &mut bodies, c, d);
        let h_ac = add_pair_constraint(&mut solver, &mut bodies, a, c);
        let h_bd = add_pair_constraint(&mut solver, &mut bodies, b, d);

        assert_eq!(solver.batches.len(), 2);
        assert_eq!(solver.location_of(h_ab).batch_index, 0);
        assert_eq!(solver.location_of(h_cd).batch_index, 0);
        assert_eq!(solver.location_of(h_ac).batch_index, 1);
        assert_eq!(solver.location_of(h_bd).batch_index, 1);
        assert_eq!(solver.batches[0].constraint_count(), 2);
        assert_eq!(solver.batches[1].constraint_count(), 2);
    }

    #[test]
    fn exhausted_coloring_overflows_into_the_fallback_batch() {
        let mut solver = Solver::new(4, 2);
        let mut bodies = Bodies::new();
        let hub = add_test_body(&mut bodies, Vec3::ZERO);
        let mut handles = Vec::new();
        for i in 0..3 {
            let other = add_test_body(&mut bodies, Vec3::X * (i + 1) as f32);
            handles.push(add_pair_constraint(&mut solver, &mut bodies, hub, other));
        }
        // Two colored batches absorb the first two; the third shares the
        // hub with both and lands in the fallback.
        assert_eq!(solver.location_of(handles[0]).batch_index, 0);
        assert_eq!(solver.location_of(handles[1]).batch_index, 1);
        assert_eq!(
            solver.location_of(handles[2]).batch_index as usize,
            solver.fallback_batch_threshold
        );
        assert_eq!(solver.fallback.constraint_count_for(hub.0), 1);
    }

    #[test]
    fn removal_releases_batch_slots_for_reuse() {
        let mut solver = Solver::new(4, 8);
        let mut bodies = Bodies::new();
        let a = add_test_body(&mut bodies, Vec3::ZERO);
        let b = add_test_body(&mut bodies, Vec3::X);
        let c = add_test_body(&mut bodies, Vec3::Y);

        let h_ab = add_pair_constraint(&mut solver, &mut bodies, a, b);
        let h_ac = add_pair_constraint(&mut solver, &mut bodies, a, c);
        assert_eq!(solver.location_of(h_ac).batch_index, 1);

        solver.remove_constraint(&mut bodies, h_ab);
        assert!(bodies.active_set().constraints[bodies.index_of(a)]
            .iter()
            .all(|entry| entry.connecting_constraint_handle != h_ab));

        // With A free again, a new A constraint colors into batch 0.
        let h_ab2 = add_pair_constraint(&mut solver, &mut bodies, a, b);
        assert_eq!(solver.location_of(h_ab2).batch_index, 0);
    }
}

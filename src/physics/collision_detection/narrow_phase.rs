//! Narrow phase execution: canonicalizes broad phase overlaps, drives the
//! collision batchers, and reconciles manifolds against the pair cache and
//! solver.
//!
//! The parallel phase reads the previous frame's pair mapping and writes
//! only worker-local lists. The single-threaded flush applies updates,
//! sweeps freshness, drains the removal job list, and applies adds, in
//! that order, so mapping slots stay valid exactly as long as anything
//! references them.

use crate::physics::bodies::{encode_body_index, Bodies, NO_BODY};
use crate::physics::collidables::collidable::ContinuousDetection;
use crate::physics::collidables::collidable_reference::{
    CollidableMobility, CollidableReference,
};
use crate::physics::collidables::shapes::Shapes;
use crate::physics::collision_detection::collision_batcher::{
    CollisionBatcher, ManifoldHandler,
};
use crate::physics::collision_detection::constraint_remover::{
    ConstraintRemover, RemovalContext, RemovalJob,
};
use crate::physics::collision_detection::contact_manifold::ContactManifold;
use crate::physics::collision_detection::freshness_checker::FreshnessChecker;
use crate::physics::collision_detection::pair_cache::{
    CollidablePair, ConstraintCache, PairCache,
};
use crate::physics::collision_detection::pair_testers::TesterSettings;
use crate::physics::constraints::contact_constraint::ContactConstraintDescription;
use crate::physics::constraints::spring_settings::SpringSettings;
use crate::physics::constraints::type_batch::{contact_type_id, ContactTypeSlot, ContactTypes};
use crate::physics::errors::KeelError;
use crate::physics::handles::ConstraintHandle;
use crate::physics::solver::Solver;
use crate::physics::statics::Statics;
use crate::utilities::pool::BufferPool;
use crate::utilities::thread_dispatcher::{dispatch_jobs, ThreadDispatcher};

/// Surface properties applied to generated contact constraints.
#[derive(Clone, Copy, Debug)]
pub struct ContactMaterial {
    pub friction_coefficient: f32,
    pub spring_settings: SpringSettings,
    pub maximum_recovery_velocity: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction_coefficient: 1.0,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        }
    }
}

/// Per-pair hooks invoked by the narrow phase.
pub trait NarrowPhaseCallbacks {
    /// Filters pairs before any manifold work happens.
    fn allow_contact_generation(
        &self,
        _worker_index: usize,
        _a: CollidableReference,
        _b: CollidableReference,
    ) -> bool {
        true
    }

    /// Supplies the contact material for a pair's constraint.
    fn configure_contact_material(&self, _pair: &CollidablePair) -> ContactMaterial {
        ContactMaterial::default()
    }
}

/// Callbacks that accept every pair with one shared material.
#[derive(Default)]
pub struct DefaultNarrowPhaseCallbacks {
    pub material: ContactMaterial,
}

impl NarrowPhaseCallbacks for DefaultNarrowPhaseCallbacks {
    fn configure_contact_material(&self, _pair: &CollidablePair) -> ContactMaterial {
        self.material
    }
}

/// A visited pair whose constraint must be created at flush.
struct PendingAdd {
    pair: CollidablePair,
    manifold: ContactManifold,
}

/// A visited pair that already had a mapping slot last frame.
struct PendingUpdate {
    pair: CollidablePair,
    slot: usize,
    manifold: ContactManifold,
}

#[derive(Default)]
struct WorkerChanges {
    pending_updates: Vec<PendingUpdate>,
    pending_adds: Vec<PendingAdd>,
}

/// Applies batcher results to the worker's pending change lists. Reads the
/// previous frame's mapping only.
struct WorkerReconciler<'a> {
    pair_cache: &'a PairCache,
    changes: &'a mut WorkerChanges,
}

impl ManifoldHandler for WorkerReconciler<'_> {
    fn on_pair_completed(&mut self, pair: CollidablePair, manifold: &ContactManifold) {
        match self.pair_cache.lookup(&pair) {
            Some((slot, _)) => {
                if manifold.count > 0 {
                    self.changes.pending_updates.push(PendingUpdate {
                        pair,
                        slot,
                        manifold: *manifold,
                    });
                }
                // A pair that stopped touching is simply not refreshed;
                // the freshness sweep retires it.
            }
            None => {
                if manifold.count > 0 {
                    self.changes.pending_adds.push(PendingAdd {
                        pair,
                        manifold: *manifold,
                    });
                }
            }
        }
    }
}

struct WorkerContext {
    batcher: CollisionBatcher,
    changes: WorkerChanges,
}

pub struct NarrowPhase<TCallbacks: NarrowPhaseCallbacks = DefaultNarrowPhaseCallbacks> {
    pub pair_cache: PairCache,
    pub constraint_remover: ConstraintRemover,
    pub callbacks: TCallbacks,
    settings: TesterSettings,
    workers: Vec<WorkerContext>,
}

impl<TCallbacks: NarrowPhaseCallbacks + Sync> NarrowPhase<TCallbacks> {
    pub fn new(settings: TesterSettings, callbacks: TCallbacks) -> Self {
        Self {
            pair_cache: PairCache::new(),
            constraint_remover: ConstraintRemover::new(),
            callbacks,
            settings,
            workers: Vec::new(),
        }
    }

    /// Sorts a pair so statics occupy the second slot and, between two
    /// bodies, the lower handle comes first. Total and stable across
    /// frames; this order is the persistence key.
    #[inline(always)]
    pub fn sort_collidable_references_for_pair(
        a: CollidableReference,
        b: CollidableReference,
    ) -> (CollidableReference, CollidableReference) {
        let a_static = a.mobility() == CollidableMobility::Static;
        let b_static = b.mobility() == CollidableMobility::Static;
        if a_static || (!b_static && a.body_handle().0 > b.body_handle().0) {
            (b, a)
        } else {
            (a, b)
        }
    }

    /// Runs the parallel narrow phase over broad phase overlaps, then the
    /// single-threaded flush.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        bodies: &mut Bodies,
        statics: &Statics,
        shapes: &Shapes,
        solver: &mut Solver,
        overlaps: &[(CollidableReference, CollidableReference)],
        dispatcher: &dyn ThreadDispatcher,
        pool: &mut BufferPool,
    ) -> Result<(), KeelError> {
        let worker_count = dispatcher.thread_count();
        self.prepare_workers(worker_count);
        self.pair_cache.prepare(pool)?;

        log::trace!(
            "narrow phase: {} overlaps over {} workers, {} cached pairs",
            overlaps.len(),
            worker_count,
            self.pair_cache.count()
        );

        // Overlaps partition statically per worker; each worker owns its
        // batcher and pending lists, and only reads shared state.
        {
            struct WorkerSlots {
                ptr: *mut WorkerContext,
            }
            // Safety: each worker touches exactly its own context.
            unsafe impl Send for WorkerSlots {}
            unsafe impl Sync for WorkerSlots {}

            let slots = WorkerSlots {
                ptr: self.workers.as_mut_ptr(),
            };
            let chunk_size = overlaps.len().div_ceil(worker_count.max(1)).max(1);
            let pair_cache = &self.pair_cache;
            let callbacks = &self.callbacks;
            let bodies_ref = &*bodies;
            dispatcher.dispatch(&|worker_index| {
                let slots = &slots;
                let worker = unsafe { &mut *slots.ptr.add(worker_index) };
                let start = worker_index * chunk_size;
                if start >= overlaps.len() {
                    return;
                }
                let end = (start + chunk_size).min(overlaps.len());
                let mut reconciler = WorkerReconciler {
                    pair_cache,
                    changes: &mut worker.changes,
                };
                for &(a, b) in &overlaps[start..end] {
                    Self::handle_overlap(
                        callbacks,
                        bodies_ref,
                        statics,
                        shapes,
                        &mut worker.batcher,
                        &mut reconciler,
                        worker_index,
                        a,
                        b,
                    );
                }
                worker.batcher.flush(shapes, &mut reconciler);
            });
        }

        self.flush(bodies, solver, dispatcher, pool);
        Ok(())
    }

    fn prepare_workers(&mut self, worker_count: usize) {
        while self.workers.len() < worker_count {
            self.workers.push(WorkerContext {
                batcher: CollisionBatcher::new(self.settings),
                changes: WorkerChanges::default(),
            });
        }
    }

    /// Processes one broad phase overlap on a worker.
    #[allow(clippy::too_many_arguments)]
    fn handle_overlap(
        callbacks: &TCallbacks,
        bodies: &Bodies,
        statics: &Statics,
        shapes: &Shapes,
        batcher: &mut CollisionBatcher,
        reconciler: &mut WorkerReconciler<'_>,
        worker_index: usize,
        a: CollidableReference,
        b: CollidableReference,
    ) {
        debug_assert!(a.packed != b.packed, "An object cannot collide with itself!");
        let (a, b) = Self::sort_collidable_references_for_pair(a, b);
        debug_assert!(
            a.mobility() != CollidableMobility::Static,
            "Broad phase should not generate static-static pairs."
        );
        if !callbacks.allow_contact_generation(worker_index, a, b) {
            return;
        }

        let set = bodies.active_set();
        let index_a = bodies.index_of(a.body_handle());
        let pose_a = set.poses[index_a];
        let collidable_a = set.collidables[index_a];

        let (pose_b, collidable_b) = if b.mobility() == CollidableMobility::Static {
            let static_index = statics.index_of(b.static_handle());
            (statics.poses[static_index], statics.collidables[static_index])
        } else {
            let index_b = bodies.index_of(b.body_handle());
            (set.poses[index_b], set.collidables[index_b])
        };

        let speculative_margin = collidable_a
            .speculative_margin
            .max(collidable_b.speculative_margin);
        // Continuity features union across the pair. Only discrete
        // detection acts today; the combined value is validated and then
        // dropped.
        let _combined_continuity =
            ContinuousDetection::combine(&collidable_a.continuity, &collidable_b.continuity);

        batcher.add(
            shapes,
            CollidablePair::new(a, b),
            collidable_a.shape,
            collidable_b.shape,
            pose_b.position - pose_a.position,
            pose_a.orientation,
            pose_b.orientation,
            speculative_margin,
            reconciler,
        );
    }

    /// Single-threaded postpass: applies updates, sweeps freshness, drains
    /// removal jobs, applies adds.
    fn flush(
        &mut self,
        bodies: &mut Bodies,
        solver: &mut Solver,
        dispatcher: &dyn ThreadDispatcher,
        pool: &mut BufferPool,
    ) {
        // Phase 1: updates against existing mapping slots, which marks
        // those slots fresh.
        let mut type_switch_removals: Vec<ConstraintHandle> = Vec::new();
        for worker_index in 0..self.workers.len() {
            let updates = std::mem::take(&mut self.workers[worker_index].changes.pending_updates);
            for update in &updates {
                self.apply_update(bodies, solver, update, &mut type_switch_removals);
            }
        }

        // Phase 2: the freshness sweep finds every pair not visited this
        // frame. Job boundaries are deterministic, and so is the
        // concatenation order.
        let jobs = FreshnessChecker::create_jobs(self.pair_cache.count(), dispatcher.thread_count());
        let mut stale_slots: Vec<usize> = Vec::new();
        let mut per_job_stale: Vec<Vec<usize>> = (0..jobs.len()).map(|_| Vec::new()).collect();
        {
            struct StaleSlots {
                ptr: *mut Vec<usize>,
            }
            // Safety: each job writes only its own output list.
            unsafe impl Send for StaleSlots {}
            unsafe impl Sync for StaleSlots {}
            let outputs = StaleSlots {
                ptr: per_job_stale.as_mut_ptr(),
            };
            let pair_cache = &self.pair_cache;
            let jobs_ref = &jobs;
            dispatch_jobs(dispatcher, jobs.len(), &|_, job_index| {
                let outputs = &outputs;
                let output = unsafe { &mut *outputs.ptr.add(job_index) };
                FreshnessChecker::check_region(pair_cache, jobs_ref[job_index], output);
            });
        }
        for job_stale in per_job_stale {
            stale_slots.extend(job_stale);
        }

        let mut removals = type_switch_removals;
        for &slot in &stale_slots {
            removals.push(self.pair_cache.cache_at(slot).constraint_handle);
        }
        log::trace!(
            "narrow phase flush: {} stale pairs, {} constraint removals",
            stale_slots.len(),
            removals.len()
        );

        // Phase 3: drain the removal jobs. Every job category has a single
        // writer; see the constraint remover.
        if !removals.is_empty() {
            self.constraint_remover.plan(solver, &removals);
            self.constraint_remover.resolve_body_handles(bodies);
            let mut flush_jobs: Vec<Option<RemovalJob>> = self
                .constraint_remover
                .create_jobs()
                .into_iter()
                .map(Some)
                .collect();
            // The pair cache change flush rides in the same job list.
            flush_jobs.push(None);
            // Stale mapping slots release in descending order so the
            // dense-array swaps never disturb a pending slot.
            stale_slots.sort_unstable_by(|a, b| b.cmp(a));

            struct PairCachePtr {
                ptr: *mut PairCache,
            }
            // Safety: only the pair cache job touches the mapping.
            unsafe impl Send for PairCachePtr {}
            unsafe impl Sync for PairCachePtr {}
            let pair_cache_ptr = PairCachePtr {
                ptr: &mut self.pair_cache,
            };
            let context = RemovalContext {
                solver: solver as *mut Solver,
                bodies: bodies as *mut Bodies,
            };
            let remover = &self.constraint_remover;
            let stale_slots_ref = &stale_slots;
            dispatch_jobs(dispatcher, flush_jobs.len(), &|_, job_index| {
                let pair_cache_ptr = &pair_cache_ptr;
                match flush_jobs[job_index] {
                    Some(removal_job) => remover.execute_job(removal_job, &context),
                    None => {
                        let pair_cache = unsafe { &mut *pair_cache_ptr.ptr };
                        for &slot in stale_slots_ref {
                            pair_cache.remove_at(slot);
                        }
                    }
                }
            });
            self.constraint_remover.postflush(solver);
        }

        // Phase 4: adds. New pairs get zero-initialized accumulated
        // impulses and a fresh mapping entry.
        for worker_index in 0..self.workers.len() {
            let adds = std::mem::take(&mut self.workers[worker_index].changes.pending_adds);
            for add in &adds {
                self.apply_add(bodies, solver, add);
            }
        }

        self.pair_cache.postflush(pool);
    }

    fn apply_update(
        &mut self,
        bodies: &mut Bodies,
        solver: &mut Solver,
        update: &PendingUpdate,
        type_switch_removals: &mut Vec<ConstraintHandle>,
    ) {
        let cache = *self.pair_cache.cache_at(update.slot);
        let old_handle = cache.constraint_handle;
        let old_type = solver.location_of(old_handle).type_id;
        let new_type = contact_type_id(update.manifold.count);

        let mut old_impulses = [0.0f32; 4];
        let old_count = solver.read_contact_impulses(old_handle, &mut old_impulses);
        debug_assert_eq!(old_count as u32, cache.contact_count);

        let mut new_impulses = [0.0f32; 4];
        redistribute_impulses(
            &cache.feature_ids[..old_count],
            &mut old_impulses[..old_count],
            &update.manifold,
            &mut new_impulses,
        );

        let material = self.callbacks.configure_contact_material(&update.pair);
        let mut new_cache = constraint_cache_for(&update.manifold, old_handle);
        if new_type == old_type {
            // Same arity: rewrite the existing constraint in place.
            match update.manifold.count {
                1 => update_contact::<1>(solver, old_handle, &update.manifold, &material, &new_impulses),
                2 => update_contact::<2>(solver, old_handle, &update.manifold, &material, &new_impulses),
                3 => update_contact::<3>(solver, old_handle, &update.manifold, &material, &new_impulses),
                _ => update_contact::<4>(solver, old_handle, &update.manifold, &material, &new_impulses),
            }
        } else {
            // Contact count changed: the old constraint retires through
            // the removal flush and a new one takes over the pair,
            // carrying the redistributed impulses.
            let new_handle =
                add_contact_for_pair(bodies, solver, &update.pair, &update.manifold, &material, &new_impulses);
            new_cache.constraint_handle = new_handle;
            type_switch_removals.push(old_handle);
        }
        self.pair_cache.update(update.slot, new_cache);
    }

    fn apply_add(&mut self, bodies: &mut Bodies, solver: &mut Solver, add: &PendingAdd) {
        let material = self.callbacks.configure_contact_material(&add.pair);
        let zero_impulses = [0.0f32; 4];
        let handle =
            add_contact_for_pair(bodies, solver, &add.pair, &add.manifold, &material, &zero_impulses);
        self.pair_cache
            .add(add.pair, constraint_cache_for(&add.manifold, handle));
    }
}

fn constraint_cache_for(manifold: &ContactManifold, handle: ConstraintHandle) -> ConstraintCache {
    let mut cache = ConstraintCache {
        constraint_handle: handle,
        feature_ids: [0; 4],
        contact_count: manifold.count,
    };
    for contact in 0..manifold.count as usize {
        cache.feature_ids[contact] = manifold.contacts[contact].feature_id;
    }
    cache
}

/// Moves accumulated impulses from the old contact set onto the new one by
/// feature id. Orphaned impulse splits evenly over unmatched new contacts;
/// correspondence is best effort, not exact.
fn redistribute_impulses(
    old_feature_ids: &[u32],
    old_impulses: &mut [f32],
    manifold: &ContactManifold,
    new_impulses: &mut [f32; 4],
) {
    let new_count = manifold.count as usize;
    let mut unmatched_count = 0;
    for contact in 0..new_count {
        // Accumulated impulses cannot be negative; negative marks
        // 'unmatched'.
        new_impulses[contact] = -1.0;
        for old in 0..old_feature_ids.len() {
            if old_feature_ids[old] == manifold.contacts[contact].feature_id {
                new_impulses[contact] = old_impulses[old];
                // Consumed; it must not also flow to unmatched contacts.
                old_impulses[old] = 0.0;
                break;
            }
        }
        if new_impulses[contact] < 0.0 {
            unmatched_count += 1;
        }
    }
    if unmatched_count > 0 {
        let orphaned: f32 = old_impulses.iter().sum();
        let per_unmatched = orphaned / unmatched_count as f32;
        for contact in 0..new_count {
            if new_impulses[contact] < 0.0 {
                new_impulses[contact] = per_unmatched;
            }
        }
    }
}

fn description_from_manifold<const N: usize>(
    manifold: &ContactManifold,
    material: &ContactMaterial,
) -> ContactConstraintDescription<N> {
    debug_assert_eq!(manifold.count as usize, N);
    ContactConstraintDescription {
        offset_a: std::array::from_fn(|contact| manifold.contacts[contact].offset_a),
        depth: std::array::from_fn(|contact| manifold.contacts[contact].depth),
        // Manifold normals point from A toward B; the constraint wants the
        // push-apart direction.
        normal: -manifold.normal,
        offset_b: manifold.offset_b,
        friction_coefficient: material.friction_coefficient,
        spring_settings: material.spring_settings,
        maximum_recovery_velocity: material.maximum_recovery_velocity,
    }
}

fn update_contact<const N: usize>(
    solver: &mut Solver,
    handle: ConstraintHandle,
    manifold: &ContactManifold,
    material: &ContactMaterial,
    impulses: &[f32; 4],
) where
    ContactTypes: ContactTypeSlot<N>,
{
    let description = description_from_manifold::<N>(manifold, material);
    let narrowed: [f32; N] = std::array::from_fn(|contact| impulses[contact]);
    solver.update_contact_constraint(handle, &description, &narrowed);
}

fn add_contact_for_pair(
    bodies: &mut Bodies,
    solver: &mut Solver,
    pair: &CollidablePair,
    manifold: &ContactManifold,
    material: &ContactMaterial,
    impulses: &[f32; 4],
) -> ConstraintHandle {
    let index_a = bodies.index_of(pair.a.body_handle());
    let encoded_a = encode_body_index(index_a, pair.a.mobility() == CollidableMobility::Kinematic);
    let encoded_b = if pair.b.mobility() == CollidableMobility::Static {
        NO_BODY
    } else {
        encode_body_index(
            bodies.index_of(pair.b.body_handle()),
            pair.b.mobility() == CollidableMobility::Kinematic,
        )
    };
    let mut dynamic_handles: Vec<usize> = Vec::with_capacity(2);
    if pair.a.mobility() == CollidableMobility::Dynamic {
        dynamic_handles.push(pair.a.body_handle().0 as usize);
    }
    if pair.b.mobility() == CollidableMobility::Dynamic {
        dynamic_handles.push(pair.b.body_handle().0 as usize);
    }

    match manifold.count {
        1 => add_contact::<1>(bodies, solver, encoded_a, encoded_b, &dynamic_handles, manifold, material, impulses),
        2 => add_contact::<2>(bodies, solver, encoded_a, encoded_b, &dynamic_handles, manifold, material, impulses),
        3 => add_contact::<3>(bodies, solver, encoded_a, encoded_b, &dynamic_handles, manifold, material, impulses),
        _ => add_contact::<4>(bodies, solver, encoded_a, encoded_b, &dynamic_handles, manifold, material, impulses),
    }
}

#[allow(clippy::too_many_arguments)]
fn add_contact<const N: usize>(
    bodies: &mut Bodies,
    solver: &mut Solver,
    encoded_a: i32,
    encoded_b: i32,
    dynamic_handles: &[usize],
    manifold: &ContactManifold,
    material: &ContactMaterial,
    impulses: &[f32; 4],
) -> ConstraintHandle
where
    ContactTypes: ContactTypeSlot<N>,
{
    let description = description_from_manifold::<N>(manifold, material);
    let narrowed: [f32; N] = std::array::from_fn(|contact| impulses[contact]);
    solver.add_contact_constraint(
        bodies,
        encoded_a,
        encoded_b,
        dynamic_handles,
        &description,
        &narrowed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::handles::BodyHandle;
    use glam::Vec3;

    fn dynamic_ref(handle: i32) -> CollidableReference {
        CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(handle))
    }

    #[test]
    fn canonicalization_is_symmetric_and_orders_handles() {
        let seven = dynamic_ref(7);
        let three = dynamic_ref(3);
        let forward = NarrowPhase::<DefaultNarrowPhaseCallbacks>::sort_collidable_references_for_pair(
            seven, three,
        );
        let backward = NarrowPhase::<DefaultNarrowPhaseCallbacks>::sort_collidable_references_for_pair(
            three, seven,
        );
        assert_eq!(forward, backward);
        assert_eq!(forward.0, three);
        assert_eq!(forward.1, seven);
    }

    #[test]
    fn statics_always_canonicalize_to_the_second_slot() {
        let body = dynamic_ref(9);
        let fixed = CollidableReference::statik(crate::physics::handles::StaticHandle(0));
        let (first, second) =
            NarrowPhase::<DefaultNarrowPhaseCallbacks>::sort_collidable_references_for_pair(
                fixed, body,
            );
        assert_eq!(first, body);
        assert_eq!(second, fixed);
    }

    #[test]
    fn redistribution_matches_features_then_splits_orphans() {
        let mut manifold = ContactManifold::default();
        manifold.push(Vec3::ZERO, 0.1, 10);
        manifold.push(Vec3::X, 0.1, 11);
        manifold.push(Vec3::Y, 0.1, 99);

        let old_features = [10u32, 12, 13];
        let mut old_impulses = [5.0f32, 2.0, 4.0];
        let mut new_impulses = [0.0f32; 4];
        redistribute_impulses(&old_features, &mut old_impulses, &manifold, &mut new_impulses);
        // Feature 10 matched; features 12 and 13's impulse (6.0) split
        // across the two unmatched contacts.
        assert_eq!(new_impulses[0], 5.0);
        assert_eq!(new_impulses[1], 3.0);
        assert_eq!(new_impulses[2], 3.0);
    }
}

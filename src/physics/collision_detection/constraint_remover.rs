//! Batched constraint removal.
//!
//! Stale pairs found by the freshness sweep queue their constraint handles
//! here. Removal work is grouped into jobs by the resource each touches:
//! body constraint lists, the handle pool, batch referenced handle sets,
//! the fallback batch, and each affected type batch. Every category has a
//! single writer, so the job list can drain across workers.

use std::collections::HashMap;

use crate::physics::bodies::{Bodies, BODY_REFERENCE_MASK, KINEMATIC_FLAG};
use crate::physics::handles::ConstraintHandle;
use crate::physics::solver::Solver;

/// One planned constraint removal, captured before any mutation so the
/// jobs can run independently.
struct RemovalPlan {
    handle: ConstraintHandle,
    batch_index: u32,
    encoded_bodies: Vec<i32>,
    dynamic_body_handles: Vec<usize>,
}

/// A removal work item; each touches a disjoint resource.
#[derive(Clone, Copy, Debug)]
pub enum RemovalJob {
    RemoveFromBodyLists,
    ReturnHandles,
    RemoveFromBatchReferencedHandles,
    RemoveFromFallbackBatch,
    /// Index into the planned per-type-batch removal lists.
    RemoveFromTypeBatch(usize),
}

/// Raw access used by removal jobs.
///
/// Safety: each job category writes a disjoint part of the solver/bodies
/// state, so concurrent job execution never aliases a write.
pub struct RemovalContext {
    pub solver: *mut Solver,
    pub bodies: *mut Bodies,
}

unsafe impl Send for RemovalContext {}
unsafe impl Sync for RemovalContext {}

pub struct ConstraintRemover {
    plans: Vec<RemovalPlan>,
    /// Removals grouped by (batch index, type id), indices sorted
    /// descending so in-batch swaps never invalidate a later removal.
    type_batch_removals: Vec<((u32, u32), Vec<usize>)>,
}

impl ConstraintRemover {
    pub fn new() -> Self {
        Self {
            plans: Vec::new(),
            type_batch_removals: Vec::new(),
        }
    }

    /// Captures everything the removal jobs need. `handles` must be
    /// deterministically ordered by the caller.
    pub fn plan(&mut self, solver: &Solver, handles: &[ConstraintHandle]) {
        debug_assert!(self.plans.is_empty() && self.type_batch_removals.is_empty());
        let mut groups: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for &handle in handles {
            let location = *solver.location_of(handle);
            let mut encoded_bodies = Vec::new();
            let batch = &solver.batches[location.batch_index as usize];
            let type_batch = batch
                .type_batch(location.type_id)
                .expect("planned constraint's type batch must exist");
            type_batch.encoded_body_indices(
                location.index_in_type_batch as usize,
                &mut encoded_bodies,
            );
            groups
                .entry((location.batch_index, location.type_id))
                .or_default()
                .push(location.index_in_type_batch as usize);
            self.plans.push(RemovalPlan {
                handle,
                batch_index: location.batch_index,
                encoded_bodies,
                dynamic_body_handles: Vec::new(),
            });
        }
        let mut groups: Vec<((u32, u32), Vec<usize>)> = groups.into_iter().collect();
        groups.sort_by_key(|(key, _)| *key);
        for (_, indices) in groups.iter_mut() {
            indices.sort_unstable_by(|a, b| b.cmp(a));
        }
        self.type_batch_removals = groups;
    }

    /// Resolves the dynamic body handles for every plan. Runs before the
    /// jobs, while body index maps are untouched.
    pub fn resolve_body_handles(&mut self, bodies: &Bodies) {
        for plan in self.plans.iter_mut() {
            for &encoded in &plan.encoded_bodies {
                if encoded & KINEMATIC_FLAG != 0 {
                    continue;
                }
                let body_index = (encoded & BODY_REFERENCE_MASK) as usize;
                plan.dynamic_body_handles
                    .push(bodies.active_set().index_to_handle[body_index].0 as usize);
            }
        }
    }

    /// The jobs to drain for the current plan set.
    pub fn create_jobs(&self) -> Vec<RemovalJob> {
        if self.plans.is_empty() {
            return Vec::new();
        }
        let mut jobs = vec![
            RemovalJob::RemoveFromBodyLists,
            RemovalJob::ReturnHandles,
            RemovalJob::RemoveFromBatchReferencedHandles,
            RemovalJob::RemoveFromFallbackBatch,
        ];
        for group in 0..self.type_batch_removals.len() {
            jobs.push(RemovalJob::RemoveFromTypeBatch(group));
        }
        jobs
    }

    /// Executes one removal job against the shared context.
    pub fn execute_job(&self, job: RemovalJob, context: &RemovalContext) {
        match job {
            RemovalJob::RemoveFromBodyLists => {
                // Safety: sole writer of per-body constraint lists.
                let bodies = unsafe { &mut *context.bodies };
                for plan in &self.plans {
                    for &encoded in &plan.encoded_bodies {
                        bodies.remove_constraint_reference(
                            (encoded & BODY_REFERENCE_MASK) as usize,
                            plan.handle,
                        );
                    }
                }
            }
            RemovalJob::ReturnHandles => {
                // Safety: sole writer of the handle pool and of the
                // removed handles' location slots.
                let solver = unsafe { &mut *context.solver };
                for plan in &self.plans {
                    solver.mark_dead_and_return_handle(plan.handle);
                }
            }
            RemovalJob::RemoveFromBatchReferencedHandles => {
                // Safety: sole writer of the colored batches' referenced
                // handle sets.
                let solver = unsafe { &mut *context.solver };
                for plan in &self.plans {
                    if (plan.batch_index as usize) < solver.fallback_batch_threshold {
                        solver.unset_batch_referenced_handles(
                            plan.batch_index as usize,
                            &plan.dynamic_body_handles,
                        );
                    }
                }
            }
            RemovalJob::RemoveFromFallbackBatch => {
                // Safety: sole writer of the fallback batch's counts.
                let solver = unsafe { &mut *context.solver };
                for plan in &self.plans {
                    if plan.batch_index as usize == solver.fallback_batch_threshold {
                        let as_i32: Vec<i32> = plan
                            .dynamic_body_handles
                            .iter()
                            .map(|&handle| handle as i32)
                            .collect();
                        solver.fallback.remove(&as_i32);
                    }
                }
            }
            RemovalJob::RemoveFromTypeBatch(group) => {
                // Safety: each group touches one type batch, and moved-
                // handle location updates only touch surviving handles,
                // disjoint from the ReturnHandles job's slots.
                let solver = unsafe { &mut *context.solver };
                let ((batch_index, type_id), indices) = &self.type_batch_removals[group];
                solver.remove_from_type_batch(*batch_index as usize, *type_id, indices);
            }
        }
    }

    /// Single-threaded postpass: drops emptied type batches and clears the
    /// plan for the next frame.
    pub fn postflush(&mut self, solver: &mut Solver) {
        for ((batch_index, type_id), _) in &self.type_batch_removals {
            solver.batches[*batch_index as usize].remove_type_batch_if_empty(*type_id);
        }
        self.plans.clear();
        self.type_batch_removals.clear();
    }
}

impl Default for ConstraintRemover {
    fn default() -> Self {
        Self::new()
    }
}

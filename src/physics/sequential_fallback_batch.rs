//! Fallback storage for constraints that could not be colored.
//!
//! Colored batches guarantee each body appears at most once, which makes
//! bundle-parallel solving race free. Bodies with very high constraint
//! degree would force an unbounded number of batches, so constraints past
//! the batch cap land here instead. The fallback trades rigidity for
//! parallelism: every constraint solves against the same velocity
//! snapshot, and per-body velocity deltas are averaged before application.

use std::collections::HashMap;

use glam::Vec3;

use crate::physics::bodies::{SolverBodyView, BODY_REFERENCE_MASK, KINEMATIC_FLAG};
use crate::physics::body_properties::BodyVelocityWide;
use crate::utilities::vector::{Vector, LANES};

/// Tracks how many fallback constraints reference each dynamic body. The
/// same body may appear many times, so membership is a count, not a set.
#[derive(Default)]
pub struct SequentialFallbackBatch {
    body_constraint_counts: HashMap<i32, u32>,
}

impl SequentialFallbackBatch {
    pub fn body_count(&self) -> usize {
        self.body_constraint_counts.len()
    }

    pub fn constraint_count_for(&self, body_handle: i32) -> u32 {
        self.body_constraint_counts
            .get(&body_handle)
            .copied()
            .unwrap_or(0)
    }

    pub fn allocate(&mut self, dynamic_body_handles: &[i32]) {
        for &handle in dynamic_body_handles {
            *self.body_constraint_counts.entry(handle).or_insert(0) += 1;
        }
    }

    /// Decrements the constraint count of each body; bodies reaching zero
    /// drop out of the fallback batch entirely.
    pub fn remove(&mut self, dynamic_body_handles: &[i32]) {
        for &handle in dynamic_body_handles {
            let count = self
                .body_constraint_counts
                .get_mut(&handle)
                .expect("removed fallback constraints must have been allocated");
            *count -= 1;
            if *count == 0 {
                self.body_constraint_counts.remove(&handle);
            }
        }
    }
}

/// Accumulates per-body velocity deltas during a fallback solve, then
/// applies the average. Averaging makes the reduction independent of the
/// order constraints executed in, which the determinism guarantee needs.
pub struct JacobiDeltas {
    linear: Vec<Vec3>,
    angular: Vec<Vec3>,
    counts: Vec<u32>,
    touched: Vec<usize>,
}

impl JacobiDeltas {
    pub fn new() -> Self {
        Self {
            linear: Vec::new(),
            angular: Vec::new(),
            counts: Vec::new(),
            touched: Vec::new(),
        }
    }

    pub fn prepare(&mut self, body_count: usize) {
        self.linear.clear();
        self.angular.clear();
        self.counts.clear();
        self.linear.resize(body_count, Vec3::ZERO);
        self.angular.resize(body_count, Vec3::ZERO);
        self.counts.resize(body_count, 0);
        self.touched.clear();
    }

    /// Folds in the velocity change one constraint produced for a bundle
    /// of body references.
    pub fn accumulate(
        &mut self,
        references: Vector<i32>,
        before: &BodyVelocityWide,
        after: &BodyVelocityWide,
    ) {
        for slot in 0..LANES {
            let body = references.as_array()[slot];
            if body < 0 || body & KINEMATIC_FLAG != 0 {
                continue;
            }
            let body = (body & BODY_REFERENCE_MASK) as usize;
            if self.counts[body] == 0 {
                self.touched.push(body);
            }
            self.counts[body] += 1;
            self.linear[body] += after.linear.read_slot(slot) - before.linear.read_slot(slot);
            self.angular[body] += after.angular.read_slot(slot) - before.angular.read_slot(slot);
        }
    }

    /// Applies the accumulated deltas. Solve iterations average by
    /// contribution count to stay stable under repeated bodies; warm
    /// starting applies the full sum, since accumulated impulses are
    /// additive.
    pub fn apply(&mut self, view: &SolverBodyView, average: bool) {
        for &body in &self.touched {
            let scale = if average {
                1.0 / self.counts[body] as f32
            } else {
                1.0
            };
            view.apply_velocity_delta(body, self.linear[body] * scale, self.angular[body] * scale);
        }
    }
}

impl Default for JacobiDeltas {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_allocation_and_removal() {
        let mut fallback = SequentialFallbackBatch::default();
        fallback.allocate(&[3, 7]);
        fallback.allocate(&[3]);
        assert_eq!(fallback.body_count(), 2);
        assert_eq!(fallback.constraint_count_for(3), 2);
        fallback.remove(&[3, 7]);
        assert_eq!(fallback.body_count(), 1);
        assert_eq!(fallback.constraint_count_for(7), 0);
        fallback.remove(&[3]);
        assert_eq!(fallback.body_count(), 0);
    }

    #[test]
    fn deltas_average_over_contributions() {
        use crate::physics::bodies::{BodySet, NO_BODY};
        use crate::physics::body_properties::BodyVelocity;

        let mut deltas = JacobiDeltas::new();
        deltas.prepare(2);
        let mut references = [NO_BODY; LANES];
        references[0] = 1;
        references[1] = 1;
        let references = Vector::from_array(references);
        let before = BodyVelocityWide::default();
        let mut after = BodyVelocityWide::default();
        after.linear.write_slot(Vec3::new(2.0, 0.0, 0.0), 0);
        after.linear.write_slot(Vec3::new(4.0, 0.0, 0.0), 1);
        deltas.accumulate(references, &before, &after);

        let mut set = BodySet::default();
        for _ in 0..2 {
            set.poses.push(Default::default());
            set.velocities.push(BodyVelocity::default());
            set.inertias.push(Default::default());
        }
        let view = SolverBodyView::new(&mut set);
        deltas.apply(&view, true);
        // Two contributions of 2 and 4 average to 3.
        assert_eq!(set.velocities[1].linear, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(set.velocities[0].linear, Vec3::ZERO);
    }
}

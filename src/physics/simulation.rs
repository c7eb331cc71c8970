//! Top-level facade tying bodies, shapes, the narrow phase, the solver,
//! and pose integration into a timestep.

use crate::physics::bodies::{encode_body_index, Bodies, BodyDescription};
use crate::physics::collidables::collidable_reference::CollidableReference;
use crate::physics::collidables::shapes::{Shape, Shapes};
use crate::physics::collidables::typed_index::TypedIndex;
use crate::physics::collision_detection::narrow_phase::{
    DefaultNarrowPhaseCallbacks, NarrowPhase, NarrowPhaseCallbacks,
};
use crate::physics::collision_detection::pair_testers::TesterSettings;
use crate::physics::constraints::volume_constraint::VolumeConstraintDescription;
use crate::physics::errors::KeelError;
use crate::physics::handles::{BodyHandle, ConstraintHandle, StaticHandle};
use crate::physics::pose_integration::PoseIntegrator;
use crate::physics::solver::Solver;
use crate::physics::statics::{StaticDescription, Statics};
use crate::utilities::pool::BufferPool;
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Tunables for a simulation instance, validated at construction.
#[derive(Clone, Copy, Debug)]
pub struct SimulationConfig {
    /// Velocity iterations per timestep. At least 1; 4 to 8 is typical.
    pub velocity_iteration_count: usize,
    /// Colored batch cap; constraints that cannot color below it spill
    /// into the sequential fallback batch.
    pub fallback_batch_threshold: usize,
    /// Iteration cap for the depth refiner.
    pub depth_refiner_max_iterations: u32,
    /// Depth refiner termination tolerance. Nonnegative.
    pub convergence_threshold: f32,
    /// Global depth floor for refinement; typically slightly negative.
    pub minimum_depth_threshold: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            velocity_iteration_count: 8,
            fallback_batch_threshold: 16,
            depth_refiner_max_iterations: 50,
            convergence_threshold: 1e-5,
            minimum_depth_threshold: -0.5,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), KeelError> {
        if self.velocity_iteration_count < 1 {
            return Err(KeelError::ContractViolation(
                "velocity_iteration_count must be at least 1",
            ));
        }
        if self.fallback_batch_threshold < 1 {
            return Err(KeelError::ContractViolation(
                "fallback_batch_threshold must be at least 1",
            ));
        }
        if self.convergence_threshold < 0.0 {
            return Err(KeelError::ContractViolation(
                "convergence_threshold must be nonnegative",
            ));
        }
        if self.depth_refiner_max_iterations == 0 {
            return Err(KeelError::ContractViolation(
                "depth_refiner_max_iterations must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A simulation instance. Broad phase collision detection is a
/// collaborator, not a member: each timestep consumes the candidate
/// overlap pairs it produced.
pub struct Simulation<TCallbacks: NarrowPhaseCallbacks = DefaultNarrowPhaseCallbacks> {
    pub bodies: Bodies,
    pub statics: Statics,
    pub shapes: Shapes,
    pub solver: Solver,
    pub narrow_phase: NarrowPhase<TCallbacks>,
    pub pool: BufferPool,
}

impl Simulation<DefaultNarrowPhaseCallbacks> {
    pub fn new(config: SimulationConfig) -> Result<Self, KeelError> {
        Self::with_callbacks(config, DefaultNarrowPhaseCallbacks::default())
    }
}

impl<TCallbacks: NarrowPhaseCallbacks + Sync> Simulation<TCallbacks> {
    pub fn with_callbacks(
        config: SimulationConfig,
        callbacks: TCallbacks,
    ) -> Result<Self, KeelError> {
        config.validate()?;
        Ok(Self {
            bodies: Bodies::new(),
            statics: Statics::new(),
            shapes: Shapes::new(),
            solver: Solver::new(
                config.velocity_iteration_count,
                config.fallback_batch_threshold,
            ),
            narrow_phase: NarrowPhase::new(
                TesterSettings {
                    convergence_threshold: config.convergence_threshold,
                    minimum_depth_threshold: config.minimum_depth_threshold,
                    depth_refiner_max_iterations: config.depth_refiner_max_iterations,
                },
                callbacks,
            ),
            pool: BufferPool::new(),
        })
    }

    pub fn add_shape(&mut self, shape: Shape) -> TypedIndex {
        self.shapes.add(shape)
    }

    pub fn add_body(&mut self, description: &BodyDescription) -> BodyHandle {
        self.bodies.add(description)
    }

    pub fn add_static(&mut self, description: &StaticDescription) -> StaticHandle {
        self.statics.add(description)
    }

    /// Removes a body with no connected constraints. The body swapped into
    /// the vacated slot has its constraints' references patched.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), KeelError> {
        let removed_index = self.bodies.index_of(handle);
        self.bodies.remove(handle)?;
        let set = self.bodies.active_set();
        if removed_index < set.count() {
            // Something moved into the slot; retarget its constraints.
            let kinematic = set.local_inertias[removed_index].inverse_mass == 0.0;
            let encoded = encode_body_index(removed_index, kinematic);
            let references: Vec<_> = set.constraints[removed_index].clone();
            for reference in references {
                self.solver.update_body_reference(
                    reference.connecting_constraint_handle,
                    reference.body_index_in_constraint,
                    encoded,
                );
            }
        }
        Ok(())
    }

    /// Adds a four-body volume constraint over dynamic bodies.
    pub fn add_volume_constraint(
        &mut self,
        body_handles: [BodyHandle; 4],
        description: &VolumeConstraintDescription,
    ) -> ConstraintHandle {
        let encoded = body_handles.map(|handle| {
            let index = self.bodies.index_of(handle);
            let kinematic = self.bodies.active_set().local_inertias[index].inverse_mass == 0.0;
            encode_body_index(index, kinematic)
        });
        let dynamic_handles: Vec<usize> = body_handles
            .iter()
            .filter(|&&handle| {
                let index = self.bodies.index_of(handle);
                self.bodies.active_set().local_inertias[index].inverse_mass > 0.0
            })
            .map(|handle| handle.0 as usize)
            .collect();
        self.solver
            .add_volume_constraint(&mut self.bodies, encoded, &dynamic_handles, description)
    }

    /// Advances the simulation one timestep over the supplied broad phase
    /// overlaps: narrow phase, constraint solve, pose integration, and the
    /// removal flush.
    pub fn timestep(
        &mut self,
        dt: f32,
        overlaps: &[(CollidableReference, CollidableReference)],
        dispatcher: &dyn ThreadDispatcher,
    ) -> Result<(), KeelError> {
        if !(dt > 0.0) {
            return Err(KeelError::ContractViolation("dt must be positive"));
        }
        log::trace!("timestep start: dt {dt}, {} overlaps", overlaps.len());
        self.narrow_phase.execute(
            &mut self.bodies,
            &self.statics,
            &self.shapes,
            &mut self.solver,
            overlaps,
            dispatcher,
            &mut self.pool,
        )?;
        self.solver.solve(&mut self.bodies, dt, dispatcher)?;
        PoseIntegrator::integrate(self.bodies.active_set_mut(), dt, dispatcher);
        log::trace!(
            "timestep end: {} constraints across {} batches",
            self.solver.constraint_count(),
            self.solver.batches.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut config = SimulationConfig::default();
        config.velocity_iteration_count = 0;
        assert!(matches!(
            Simulation::new(config),
            Err(KeelError::ContractViolation(_))
        ));

        let mut config = SimulationConfig::default();
        config.convergence_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_dt_is_a_contract_violation() {
        let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
        let result = simulation.timestep(
            0.0,
            &[],
            &crate::utilities::thread_dispatcher::SequentialDispatcher,
        );
        assert!(matches!(result, Err(KeelError::ContractViolation(_))));
    }
}

//! Real-time rigid body physics core.
//!
//! The two load-bearing subsystems are the wide-SIMD narrow phase — support
//! mapping plus an iterative minimum-depth refiner — and a batched
//! iterative velocity solver whose constraint batches are colored so that
//! bundles solve in parallel without synchronization.
//!
//! Broad phase acceleration is a collaborator: `Simulation::timestep`
//! consumes the candidate overlap pairs it produced. Determinism holds for
//! a fixed lane width and a fixed worker count.

#![feature(portable_simd)]

pub mod physics;
pub mod utilities;

pub use physics::bodies::{Bodies, BodyDescription};
pub use physics::body_properties::{BodyInertia, BodyVelocity, RigidPose};
pub use physics::collidables::box_shape::BoxShape;
pub use physics::collidables::capsule::Capsule;
pub use physics::collidables::collidable::{Collidable, ContinuousDetection};
pub use physics::collidables::collidable_reference::{CollidableMobility, CollidableReference};
pub use physics::collidables::compound::{Compound, CompoundChild};
pub use physics::collidables::shapes::{Shape, Shapes};
pub use physics::collidables::sphere::Sphere;
pub use physics::collidables::typed_index::TypedIndex;
pub use physics::collision_detection::narrow_phase::{
    ContactMaterial, DefaultNarrowPhaseCallbacks, NarrowPhase, NarrowPhaseCallbacks,
};
pub use physics::constraints::spring_settings::SpringSettings;
pub use physics::constraints::volume_constraint::VolumeConstraintDescription;
pub use physics::errors::KeelError;
pub use physics::handles::{BodyHandle, ConstraintHandle, StaticHandle};
pub use physics::simulation::{Simulation, SimulationConfig};
pub use physics::statics::{StaticDescription, Statics};
pub use utilities::thread_dispatcher::{
    ScopedDispatcher, SequentialDispatcher, ThreadDispatcher,
};

pub mod bodies;
pub mod body_properties;
pub mod collidables;
pub mod collision_detection;
pub mod constraint_batch;
pub mod constraints;
pub mod errors;
pub mod handles;
pub mod pose_integration;
pub mod sequential_fallback_batch;
pub mod simulation;
pub mod solver;
pub mod statics;

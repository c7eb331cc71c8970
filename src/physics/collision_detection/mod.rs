pub mod collision_batcher;
pub mod constraint_remover;
pub mod contact_manifold;
pub mod depth_refiner;
pub mod freshness_checker;
pub mod narrow_phase;
pub mod pair_cache;
pub mod pair_testers;
pub mod support_finder;

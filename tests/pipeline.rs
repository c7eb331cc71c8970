//! End-to-end tests driving the public API through whole timesteps:
//! narrow phase, solver, integration, and the removal flush.

use glam::Vec3;
use keel::{
    Bodies, BodyDescription, BodyHandle, BodyInertia, BodyVelocity, BoxShape, Collidable,
    CollidableMobility, CollidableReference, RigidPose, ScopedDispatcher, SequentialDispatcher,
    Shape, Simulation, SimulationConfig, SpringSettings, Sphere, StaticDescription, StaticHandle,
    VolumeConstraintDescription,
};

fn dynamic_sphere_description(
    simulation: &mut Simulation,
    position: Vec3,
    radius: f32,
    mass: f32,
) -> BodyDescription {
    let shape = simulation.add_shape(Shape::Sphere(Sphere::new(radius)));
    let sphere = Sphere::new(radius);
    BodyDescription {
        pose: RigidPose::at(position),
        velocity: BodyVelocity::default(),
        local_inertia: sphere.compute_inertia(mass),
        collidable: Collidable::new(shape, 0.1),
    }
}

fn point_mass_description(position: Vec3) -> BodyDescription {
    BodyDescription {
        pose: RigidPose::at(position),
        velocity: BodyVelocity::default(),
        local_inertia: BodyInertia {
            inverse_mass: 1.0,
            ..Default::default()
        },
        // Shape index is irrelevant for bodies that never collide.
        collidable: Collidable::new(keel::TypedIndex::new(Sphere::ID, 0), 0.0),
    }
}

fn body_ref(handle: BodyHandle) -> CollidableReference {
    CollidableReference::body(CollidableMobility::Dynamic, handle)
}

fn static_ref(handle: StaticHandle) -> CollidableReference {
    CollidableReference::statik(handle)
}

#[test]
fn colliding_spheres_stop_approaching() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let mut description = dynamic_sphere_description(&mut simulation, Vec3::ZERO, 1.0, 1.0);
    description.velocity.linear = Vec3::new(1.0, 0.0, 0.0);
    let a = simulation.add_body(&description);
    let mut description =
        dynamic_sphere_description(&mut simulation, Vec3::new(1.9, 0.0, 0.0), 1.0, 1.0);
    description.velocity.linear = Vec3::new(-1.0, 0.0, 0.0);
    let b = simulation.add_body(&description);

    let overlaps = [(body_ref(a), body_ref(b))];
    simulation
        .timestep(1.0 / 60.0, &overlaps, &SequentialDispatcher)
        .unwrap();

    assert_eq!(simulation.solver.constraint_count(), 1);
    let index_a = simulation.bodies.index_of(a);
    let index_b = simulation.bodies.index_of(b);
    let velocity_a = simulation.bodies.active_set().velocities[index_a].linear;
    let velocity_b = simulation.bodies.active_set().velocities[index_b].linear;
    let approach = velocity_a.x - velocity_b.x;
    assert!(
        approach <= 0.05,
        "spheres still approaching at {approach} after the solve"
    );
}

#[test]
fn sphere_rests_on_a_static_box_under_gravity() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let ground_shape = simulation.add_shape(Shape::Box(BoxShape::new(10.0, 1.0, 10.0)));
    let ground = simulation.add_static(&StaticDescription {
        pose: RigidPose::at(Vec3::new(0.0, -0.5, 0.0)),
        collidable: Collidable::new(ground_shape, 0.1),
    });
    let description = dynamic_sphere_description(&mut simulation, Vec3::new(0.0, 1.05, 0.0), 1.0, 1.0);
    let ball = simulation.add_body(&description);

    let dt = 1.0 / 60.0;
    let overlaps = [(body_ref(ball), static_ref(ground))];
    for _ in 0..120 {
        let index = simulation.bodies.index_of(ball);
        simulation.bodies.active_set_mut().velocities[index].linear += Vec3::new(0.0, -10.0, 0.0) * dt;
        simulation.timestep(dt, &overlaps, &SequentialDispatcher).unwrap();
    }

    let index = simulation.bodies.index_of(ball);
    let position = simulation.bodies.active_set().poses[index].position;
    assert!(
        position.y > 0.9 && position.y < 1.1,
        "ball should rest on the ground near y = 1, found {position:?}"
    );
    // One persistent pair, one persistent constraint.
    assert_eq!(simulation.narrow_phase.pair_cache.count(), 1);
    assert_eq!(simulation.solver.constraint_count(), 1);
}

#[test]
fn overlap_order_does_not_create_duplicate_pairs() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let description = dynamic_sphere_description(&mut simulation, Vec3::ZERO, 1.0, 1.0);
    let a = simulation.add_body(&description);
    let description =
        dynamic_sphere_description(&mut simulation, Vec3::new(1.9, 0.0, 0.0), 1.0, 1.0);
    let b = simulation.add_body(&description);

    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    assert_eq!(simulation.narrow_phase.pair_cache.count(), 1);
    assert_eq!(simulation.solver.constraint_count(), 1);

    // Same pair reported in the opposite order updates the same entry.
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(b), body_ref(a))], &SequentialDispatcher)
        .unwrap();
    assert_eq!(simulation.narrow_phase.pair_cache.count(), 1);
    assert_eq!(simulation.solver.constraint_count(), 1);
}

#[test]
fn separated_pairs_retire_their_cache_entry_and_constraint() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let description = dynamic_sphere_description(&mut simulation, Vec3::ZERO, 1.0, 1.0);
    let a = simulation.add_body(&description);
    let description =
        dynamic_sphere_description(&mut simulation, Vec3::new(1.9, 0.0, 0.0), 1.0, 1.0);
    let b = simulation.add_body(&description);

    // Frame N: in contact.
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    assert_eq!(simulation.narrow_phase.pair_cache.count(), 1);
    assert_eq!(simulation.solver.constraint_count(), 1);

    // Frame N+1: the broad phase no longer reports the pair.
    simulation
        .timestep(1.0 / 60.0, &[], &SequentialDispatcher)
        .unwrap();
    assert_eq!(
        simulation.narrow_phase.pair_cache.count(),
        0,
        "stale pair must leave the cache after the flush"
    );
    assert_eq!(
        simulation.solver.constraint_count(),
        0,
        "the constraint must be removed with its pair"
    );
    // The returned handle recycles for the next constraint.
    assert_eq!(simulation.solver.handle_pool.highest_possibly_claimed_id(), 1);
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    assert_eq!(simulation.solver.handle_pool.highest_possibly_claimed_id(), 1);
}

#[test]
fn resting_volume_constraint_stays_quiet() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    // Regular tetrahedron of edge 1, wound for positive volume.
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.5, 0.0, -(3.0f32.sqrt()) / 2.0),
        Vec3::new(0.5, (2.0f32 / 3.0).sqrt(), -(3.0f32.sqrt()) / 6.0),
    ];
    let handles = positions.map(|position| simulation.add_body(&point_mass_description(position)));
    let description = VolumeConstraintDescription::from_positions(
        positions[0],
        positions[1],
        positions[2],
        positions[3],
        SpringSettings::new(30.0, 1.0),
    );
    assert!((description.target_scaled_volume - 6.0 * 2.0f32.sqrt() / 12.0).abs() < 1e-5);
    simulation.add_volume_constraint(handles, &description);

    for _ in 0..8 {
        simulation.timestep(1.0 / 60.0, &[], &SequentialDispatcher).unwrap();
    }
    for handle in handles {
        let index = simulation.bodies.index_of(handle);
        let velocity = simulation.bodies.active_set().velocities[index].linear;
        assert!(
            velocity.length() < 1e-5,
            "a resting tetrahedron must accumulate no velocity, found {velocity:?}"
        );
    }
}

#[test]
fn replays_are_bitwise_identical_for_a_fixed_worker_count() {
    fn run(worker_count: usize) -> Vec<Vec3> {
        let dispatcher = ScopedDispatcher::new(worker_count);
        let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
        let mut handles = Vec::new();
        for i in 0..6 {
            let mut description = dynamic_sphere_description(
                &mut simulation,
                Vec3::new(i as f32 * 1.8, 0.1 * i as f32, 0.0),
                1.0,
                1.0,
            );
            description.velocity.linear = Vec3::new(-(i as f32) * 0.1, 0.0, 0.0);
            handles.push(simulation.add_body(&description));
        }
        let mut overlaps = Vec::new();
        for window in handles.windows(2) {
            overlaps.push((body_ref(window[0]), body_ref(window[1])));
        }
        for _ in 0..30 {
            simulation.timestep(1.0 / 60.0, &overlaps, &dispatcher).unwrap();
        }
        handles
            .iter()
            .map(|&handle| {
                simulation.bodies.active_set().poses[simulation.bodies.index_of(handle)].position
            })
            .collect()
    }

    let first = run(2);
    let second = run(2);
    assert_eq!(first, second, "identical runs must replay bitwise identically");
}

#[test]
fn removing_a_body_patches_moved_references() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let description = dynamic_sphere_description(&mut simulation, Vec3::ZERO, 1.0, 1.0);
    let doomed = simulation.add_body(&description);
    let description = dynamic_sphere_description(&mut simulation, Vec3::new(5.0, 0.0, 0.0), 1.0, 1.0);
    let a = simulation.add_body(&description);
    let description = dynamic_sphere_description(&mut simulation, Vec3::new(6.9, 0.0, 0.0), 1.0, 1.0);
    let b = simulation.add_body(&description);

    // Constrain the last two bodies, then remove the first so the body
    // slot shuffle forces reference patching.
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    simulation.remove_body(doomed).unwrap();

    // The surviving pair keeps solving without disturbance.
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    assert_eq!(simulation.solver.constraint_count(), 1);
    let index_b = simulation.bodies.index_of(b);
    assert!(simulation.bodies.active_set().poses[index_b]
        .position
        .is_finite());
}

#[test]
fn bodies_with_live_constraints_refuse_removal() {
    let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
    let description = dynamic_sphere_description(&mut simulation, Vec3::ZERO, 1.0, 1.0);
    let a = simulation.add_body(&description);
    let description =
        dynamic_sphere_description(&mut simulation, Vec3::new(1.9, 0.0, 0.0), 1.0, 1.0);
    let b = simulation.add_body(&description);
    simulation
        .timestep(1.0 / 60.0, &[(body_ref(a), body_ref(b))], &SequentialDispatcher)
        .unwrap();
    assert!(simulation.remove_body(a).is_err());
}

#[test]
fn bodies_crate_round_trip_smoke() {
    // Bodies is usable standalone as the storage collaborator.
    let mut bodies = Bodies::new();
    let handle = bodies.add(&point_mass_description(Vec3::ONE));
    assert_eq!(bodies.active_set().count(), 1);
    bodies.remove(handle).unwrap();
    assert_eq!(bodies.active_set().count(), 0);
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{Quat, Vec3};

use keel::physics::collidables::box_shape::{BoxShape, BoxWide};
use keel::physics::collidables::sphere::{Sphere, SphereWide};
use keel::physics::collision_detection::depth_refiner::DepthRefiner;
use keel::utilities::matrix3x3_wide::Matrix3x3Wide;
use keel::utilities::quaternion_wide::QuaternionWide;
use keel::utilities::vector::{Vector, LANES};
use keel::utilities::vector3_wide::Vector3Wide;

fn refine_sphere_box(criterion: &mut Criterion) {
    let mut sphere = SphereWide::default();
    let mut box_wide = BoxWide::default();
    for slot in 0..LANES {
        sphere.write_slot(&Sphere::new(1.0), slot);
        box_wide.write_slot(&BoxShape::new(4.0, 1.0, 4.0), slot);
    }
    let offset = Vector3Wide::broadcast(Vec3::new(0.1, -1.3, 0.2));
    let orientation = Matrix3x3Wide::create_from_quaternion(&QuaternionWide::broadcast(
        Quat::from_rotation_z(0.2),
    ));
    let guess = Vector3Wide::broadcast(Vec3::new(0.0, -1.0, 0.0));

    criterion.bench_function("depth_refiner_sphere_box_bundle", |bencher| {
        bencher.iter(|| {
            DepthRefiner::find_minimum_depth(
                black_box(&sphere),
                black_box(&box_wide),
                &offset,
                &orientation,
                &guess,
                Vector::splat(0),
                Vector::splat(1e-6),
                Vector::splat(-0.5),
                50,
            )
        })
    });
}

fn refine_box_box(criterion: &mut Criterion) {
    let mut a = BoxWide::default();
    let mut b = BoxWide::default();
    for slot in 0..LANES {
        a.write_slot(&BoxShape::new(2.0, 2.0, 2.0), slot);
        b.write_slot(&BoxShape::new(2.0, 2.0, 2.0), slot);
    }
    let offset = Vector3Wide::broadcast(Vec3::new(1.4, 1.2, 0.8));
    let orientation = Matrix3x3Wide::create_from_quaternion(&QuaternionWide::broadcast(
        Quat::from_axis_angle(Vec3::new(0.2, 1.0, 0.1).normalize(), 0.4),
    ));
    let guess = Vector3Wide::broadcast(Vec3::new(1.0, 0.0, 0.0));

    criterion.bench_function("depth_refiner_box_box_bundle", |bencher| {
        bencher.iter(|| {
            DepthRefiner::find_minimum_depth(
                black_box(&a),
                black_box(&b),
                &offset,
                &orientation,
                &guess,
                Vector::splat(0),
                Vector::splat(1e-6),
                Vector::splat(-0.5),
                50,
            )
        })
    });
}

criterion_group!(benches, refine_sphere_box, refine_box_box);
criterion_main!(benches);

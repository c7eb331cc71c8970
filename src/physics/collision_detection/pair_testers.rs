//! Per-pair-type contact manifold generators.
//!
//! Sphere pairs take a closed-form path. Every other convex pair runs the
//! wide depth refiner over the bundle to find the contact normal; box pairs
//! then rebuild a full four-contact face manifold around that normal, while
//! the remaining pairs place a single contact at the refiner's witness
//! point.

use glam::{Mat3, Quat, Vec3};
use std::simd::prelude::*;
use std::simd::StdFloat;

use crate::physics::collidables::box_shape::{BoxShape, BoxWide};
use crate::physics::collidables::capsule::{Capsule, CapsuleWide};
use crate::physics::collidables::sphere::{Sphere, SphereWide};
use crate::physics::collision_detection::contact_manifold::{ContactManifold, MAX_CONTACTS};
use crate::physics::collision_detection::depth_refiner::DepthRefiner;
use crate::physics::collision_detection::support_finder::SupportFinder;
use crate::utilities::bundle_indexing::BundleIndexing;
use crate::utilities::math_helper::MathHelper;
use crate::utilities::matrix3x3_wide::Matrix3x3Wide;
use crate::utilities::quaternion_wide::QuaternionWide;
use crate::utilities::vector::{MaskToInt, Vector, LANES};
use crate::utilities::vector3_wide::Vector3Wide;

/// Scalar convex shape data captured when a pair is enqueued, so bundle
/// execution never reaches back into shared shape storage.
#[derive(Clone, Copy, Debug)]
pub enum ConvexShapeData {
    Sphere(Sphere),
    Box(BoxShape),
    Capsule(Capsule),
}

impl ConvexShapeData {
    #[inline(always)]
    pub fn code(&self) -> u32 {
        match self {
            ConvexShapeData::Sphere(_) => 0,
            ConvexShapeData::Box(_) => 1,
            ConvexShapeData::Capsule(_) => 2,
        }
    }
}

/// Bundleable convex pair types. Pairs are normalized so the lower shape
/// code is always shape A; `flipped` on the request records when the caller
/// order was reversed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairType {
    SpherePair = 0,
    SphereBox = 1,
    SphereCapsule = 2,
    BoxPair = 3,
    BoxCapsule = 4,
    CapsulePair = 5,
}

/// Number of bundleable pair types.
pub const PAIR_TYPE_COUNT: usize = 6;

impl PairType {
    /// Classifies a shape code pair, returning the type and whether the
    /// operands must swap to reach canonical order.
    pub fn classify(code_a: u32, code_b: u32) -> (PairType, bool) {
        let flipped = code_a > code_b;
        let (low, high) = if flipped {
            (code_b, code_a)
        } else {
            (code_a, code_b)
        };
        let pair_type = match (low, high) {
            (0, 0) => PairType::SpherePair,
            (0, 1) => PairType::SphereBox,
            (0, 2) => PairType::SphereCapsule,
            (1, 1) => PairType::BoxPair,
            (1, 2) => PairType::BoxCapsule,
            (2, 2) => PairType::CapsulePair,
            _ => unreachable!("unregistered convex shape code"),
        };
        (pair_type, flipped)
    }

    pub fn from_index(index: usize) -> PairType {
        match index {
            0 => PairType::SpherePair,
            1 => PairType::SphereBox,
            2 => PairType::SphereCapsule,
            3 => PairType::BoxPair,
            4 => PairType::BoxCapsule,
            5 => PairType::CapsulePair,
            _ => unreachable!(),
        }
    }
}

/// One pair awaiting bundle execution. Already normalized to canonical
/// shape order.
#[derive(Clone, Copy, Debug)]
pub struct PairRequest<C: Copy> {
    pub shape_a: ConvexShapeData,
    pub shape_b: ConvexShapeData,
    /// Center of B minus center of A, world frame.
    pub offset_b: Vec3,
    pub orientation_a: Quat,
    pub orientation_b: Quat,
    pub speculative_margin: f32,
    pub flipped: bool,
    pub continuation: C,
}

/// Tuning knobs threaded from the narrow phase configuration.
#[derive(Clone, Copy, Debug)]
pub struct TesterSettings {
    pub convergence_threshold: f32,
    /// Global floor below which refinement stops; per pair, the floor is
    /// the lower of this and the negated speculative margin.
    pub minimum_depth_threshold: f32,
    pub depth_refiner_max_iterations: u32,
}

impl TesterSettings {
    #[inline(always)]
    fn depth_floor(&self, speculative_margin: Vector<f32>) -> Vector<f32> {
        (-speculative_margin).simd_min(Vector::splat(self.minimum_depth_threshold))
    }
}

/// Reverses a manifold produced with swapped operands back into the
/// caller's original order.
pub fn flip_manifold(manifold: &ContactManifold) -> ContactManifold {
    let mut flipped = ContactManifold {
        contacts: manifold.contacts,
        count: manifold.count,
        normal: -manifold.normal,
        offset_b: -manifold.offset_b,
    };
    for contact in flipped.contacts[..flipped.count as usize].iter_mut() {
        contact.offset_a -= manifold.offset_b;
    }
    flipped
}

/// Executes one bundle of requests, producing one manifold per request in
/// order. Manifolds are in canonical (unflipped) operand order; the caller
/// applies `flip_manifold` where the request was flipped.
pub fn execute_bundle<C: Copy>(
    pair_type: PairType,
    requests: &[PairRequest<C>],
    settings: &TesterSettings,
) -> [ContactManifold; LANES] {
    debug_assert!(!requests.is_empty() && requests.len() <= LANES);
    match pair_type {
        PairType::SpherePair => test_sphere_pairs(requests),
        PairType::SphereBox => test_with_refiner(
            requests,
            |wide: &mut SphereWide, shape, slot| match shape {
                ConvexShapeData::Sphere(sphere) => wide.write_slot(sphere, slot),
                _ => unreachable!(),
            },
            |wide: &mut BoxWide, shape, slot| match shape {
                ConvexShapeData::Box(box_shape) => wide.write_slot(box_shape, slot),
                _ => unreachable!(),
            },
            settings,
        ),
        PairType::SphereCapsule => test_with_refiner(
            requests,
            |wide: &mut SphereWide, shape, slot| match shape {
                ConvexShapeData::Sphere(sphere) => wide.write_slot(sphere, slot),
                _ => unreachable!(),
            },
            |wide: &mut CapsuleWide, shape, slot| match shape {
                ConvexShapeData::Capsule(capsule) => wide.write_slot(capsule, slot),
                _ => unreachable!(),
            },
            settings,
        ),
        PairType::BoxPair => test_box_pairs(requests, settings),
        PairType::BoxCapsule => test_with_refiner(
            requests,
            |wide: &mut BoxWide, shape, slot| match shape {
                ConvexShapeData::Box(box_shape) => wide.write_slot(box_shape, slot),
                _ => unreachable!(),
            },
            |wide: &mut CapsuleWide, shape, slot| match shape {
                ConvexShapeData::Capsule(capsule) => wide.write_slot(capsule, slot),
                _ => unreachable!(),
            },
            settings,
        ),
        PairType::CapsulePair => test_with_refiner(
            requests,
            |wide: &mut CapsuleWide, shape, slot| match shape {
                ConvexShapeData::Capsule(capsule) => wide.write_slot(capsule, slot),
                _ => unreachable!(),
            },
            |wide: &mut CapsuleWide, shape, slot| match shape {
                ConvexShapeData::Capsule(capsule) => wide.write_slot(capsule, slot),
                _ => unreachable!(),
            },
            settings,
        ),
    }
}

fn test_sphere_pairs<C: Copy>(requests: &[PairRequest<C>]) -> [ContactManifold; LANES] {
    let mut radius_a = Vector::<f32>::splat(0.0);
    let mut radius_b = Vector::<f32>::splat(0.0);
    let mut offset_b = Vector3Wide::default();
    for (slot, request) in requests.iter().enumerate() {
        match (&request.shape_a, &request.shape_b) {
            (ConvexShapeData::Sphere(a), ConvexShapeData::Sphere(b)) => {
                radius_a.as_mut_array()[slot] = a.radius;
                radius_b.as_mut_array()[slot] = b.radius;
                offset_b.write_slot(request.offset_b, slot);
            }
            _ => unreachable!(),
        }
    }

    let distance_squared = offset_b.length_squared();
    let distance = distance_squared.sqrt();
    // Concentric spheres have no meaningful direction; fall back to +Y.
    let degenerate = distance.simd_lt(Vector::splat(1e-10));
    let inverse_distance = Vector::splat(1.0) / distance;
    let mut normal = Vector3Wide::scale(&offset_b, inverse_distance);
    normal = Vector3Wide::conditional_select(
        degenerate.to_int(),
        &Vector3Wide::broadcast(Vec3::Y),
        &normal,
    );
    let depth = radius_a + radius_b - distance;
    let contact_offset = Vector3Wide::scale(&normal, radius_a - depth * Vector::splat(0.5));

    let mut manifolds = [ContactManifold::default(); LANES];
    for (slot, request) in requests.iter().enumerate() {
        let lane_depth = depth.as_array()[slot];
        let manifold = &mut manifolds[slot];
        manifold.normal = normal.read_slot(slot);
        manifold.offset_b = request.offset_b;
        if lane_depth >= -request.speculative_margin {
            manifold.push(contact_offset.read_slot(slot), lane_depth, 0);
        }
    }
    manifolds
}

/// Shared refiner-driven path: refines the pair normal over the whole
/// bundle, then emits one contact per lane at the witness point.
fn test_with_refiner<A, B, C>(
    requests: &[PairRequest<C>],
    write_a: impl Fn(&mut A, &ConvexShapeData, usize),
    write_b: impl Fn(&mut B, &ConvexShapeData, usize),
    settings: &TesterSettings,
) -> [ContactManifold; LANES]
where
    A: SupportFinder + Default,
    B: SupportFinder + Default,
    C: Copy,
{
    let mut wide_a = A::default();
    let mut wide_b = B::default();
    let mut local_offset_b = Vector3Wide::default();
    let mut local_orientation_b = QuaternionWide::identity();
    let mut speculative_margin = Vector::<f32>::splat(0.0);
    for (slot, request) in requests.iter().enumerate() {
        write_a(&mut wide_a, &request.shape_a, slot);
        write_b(&mut wide_b, &request.shape_b, slot);
        let to_local = request.orientation_a.conjugate();
        local_offset_b.write_slot(to_local * request.offset_b, slot);
        local_orientation_b.write_slot(to_local * request.orientation_b, slot);
        speculative_margin.as_mut_array()[slot] = request.speculative_margin;
    }
    let local_orientation_matrix = Matrix3x3Wide::create_from_quaternion(&local_orientation_b);

    // Initial guess: straight from A toward B. A zero offset has no usable
    // direction, so substitute +X; the refiner recovers from bad guesses.
    let offset_length_squared = local_offset_b.length_squared();
    let offset_degenerate = offset_length_squared.simd_lt(Vector::splat(1e-14));
    let mut initial_normal = Vector3Wide::scale(
        &local_offset_b,
        MathHelper::fast_reciprocal_square_root(offset_length_squared),
    );
    initial_normal = Vector3Wide::conditional_select(
        offset_degenerate.to_int(),
        &Vector3Wide::broadcast(Vec3::X),
        &initial_normal,
    );

    let inactive_lanes = BundleIndexing::create_trailing_mask(requests.len());
    let refinement = DepthRefiner::find_minimum_depth(
        &wide_a,
        &wide_b,
        &local_offset_b,
        &local_orientation_matrix,
        &initial_normal,
        inactive_lanes,
        Vector::splat(settings.convergence_threshold),
        settings.depth_floor(speculative_margin),
        settings.depth_refiner_max_iterations,
    );

    let mut manifolds = [ContactManifold::default(); LANES];
    for (slot, request) in requests.iter().enumerate() {
        let depth = refinement.depth.as_array()[slot];
        let manifold = &mut manifolds[slot];
        manifold.offset_b = request.offset_b;
        manifold.normal = request.orientation_a * refinement.normal.read_slot(slot);
        if depth >= -request.speculative_margin {
            let offset_a = request.orientation_a * refinement.witness_on_a.read_slot(slot);
            manifold.push(offset_a, depth, 0);
        }
    }
    manifolds
}

fn test_box_pairs<C: Copy>(
    requests: &[PairRequest<C>],
    settings: &TesterSettings,
) -> [ContactManifold; LANES] {
    let mut wide_a = BoxWide::default();
    let mut wide_b = BoxWide::default();
    let mut local_offset_b = Vector3Wide::default();
    let mut local_orientation_b = QuaternionWide::identity();
    let mut speculative_margin = Vector::<f32>::splat(0.0);
    let mut locals = [(Vec3::ZERO, Quat::IDENTITY); LANES];
    for (slot, request) in requests.iter().enumerate() {
        match (&request.shape_a, &request.shape_b) {
            (ConvexShapeData::Box(a), ConvexShapeData::Box(b)) => {
                wide_a.write_slot(a, slot);
                wide_b.write_slot(b, slot);
            }
            _ => unreachable!(),
        }
        let to_local = request.orientation_a.conjugate();
        let offset = to_local * request.offset_b;
        let orientation = to_local * request.orientation_b;
        locals[slot] = (offset, orientation);
        local_offset_b.write_slot(offset, slot);
        local_orientation_b.write_slot(orientation, slot);
        speculative_margin.as_mut_array()[slot] = request.speculative_margin;
    }
    let local_orientation_matrix = Matrix3x3Wide::create_from_quaternion(&local_orientation_b);

    let offset_length_squared = local_offset_b.length_squared();
    let offset_degenerate = offset_length_squared.simd_lt(Vector::splat(1e-14));
    let mut initial_normal = Vector3Wide::scale(
        &local_offset_b,
        MathHelper::fast_reciprocal_square_root(offset_length_squared),
    );
    initial_normal = Vector3Wide::conditional_select(
        offset_degenerate.to_int(),
        &Vector3Wide::broadcast(Vec3::X),
        &initial_normal,
    );

    let inactive_lanes = BundleIndexing::create_trailing_mask(requests.len());
    let refinement = DepthRefiner::find_minimum_depth(
        &wide_a,
        &wide_b,
        &local_offset_b,
        &local_orientation_matrix,
        &initial_normal,
        inactive_lanes,
        Vector::splat(settings.convergence_threshold),
        settings.depth_floor(speculative_margin),
        settings.depth_refiner_max_iterations,
    );

    let mut manifolds = [ContactManifold::default(); LANES];
    for (slot, request) in requests.iter().enumerate() {
        let depth = refinement.depth.as_array()[slot];
        let manifold = &mut manifolds[slot];
        manifold.offset_b = request.offset_b;
        let local_normal = refinement.normal.read_slot(slot);
        manifold.normal = request.orientation_a * local_normal;
        if depth < -request.speculative_margin {
            continue;
        }
        let (half_a, half_b) = match (&request.shape_a, &request.shape_b) {
            (ConvexShapeData::Box(a), ConvexShapeData::Box(b)) => {
                (a.half_extents(), b.half_extents())
            }
            _ => unreachable!(),
        };
        let (local_offset, local_orientation) = locals[slot];
        build_box_face_manifold(
            half_a,
            half_b,
            local_offset,
            local_orientation,
            local_normal,
            request.speculative_margin,
            request.orientation_a,
            manifold,
        );
    }
    manifolds
}

#[derive(Clone, Copy)]
struct ClipVertex {
    position: Vec3,
    id: u32,
}

/// Builds up to four contacts by clipping B's incident face against the
/// side planes of A's reference face, all in A's local frame. A is always
/// the reference; near edge-edge alignments the clip still produces a
/// usable reduced manifold around the refined normal.
#[allow(clippy::too_many_arguments)]
fn build_box_face_manifold(
    half_a: Vec3,
    half_b: Vec3,
    local_offset_b: Vec3,
    local_orientation_b: Quat,
    local_normal: Vec3,
    speculative_margin: f32,
    orientation_a: Quat,
    manifold: &mut ContactManifold,
) {
    // Reference face: A's axis most aligned with the contact normal.
    let abs_normal = local_normal.abs();
    let reference_axis = if abs_normal.x >= abs_normal.y && abs_normal.x >= abs_normal.z {
        0
    } else if abs_normal.y >= abs_normal.z {
        1
    } else {
        2
    };
    let reference_sign = if local_normal[reference_axis] >= 0.0 {
        1.0
    } else {
        -1.0
    };

    // Incident face: B's axis most anti-aligned with the normal.
    let rotation_b = Mat3::from_quat(local_orientation_b);
    let columns = [rotation_b.x_axis, rotation_b.y_axis, rotation_b.z_axis];
    let mut incident_axis = 0;
    let mut incident_alignment = f32::MAX;
    for (axis, column) in columns.iter().enumerate() {
        let alignment = column.dot(local_normal).abs();
        // The most parallel axis of B hosts the face whose outward normal
        // can oppose the reference normal.
        if -alignment < incident_alignment {
            incident_alignment = -alignment;
            incident_axis = axis;
        }
    }
    let incident_sign = if columns[incident_axis].dot(local_normal) > 0.0 {
        -1.0
    } else {
        1.0
    };
    let face_center = local_offset_b
        + columns[incident_axis] * (incident_sign * half_b[incident_axis]);
    let tangent_u = (incident_axis + 1) % 3;
    let tangent_v = (incident_axis + 2) % 3;
    let edge_u = columns[tangent_u] * half_b[tangent_u];
    let edge_v = columns[tangent_v] * half_b[tangent_v];

    // Face id bits keep contact feature ids stable while the same pair of
    // faces stays in contact.
    let incident_face_id = (incident_axis as u32) << 1 | ((incident_sign > 0.0) as u32);
    let mut polygon: Vec<ClipVertex> = vec![
        ClipVertex {
            position: face_center - edge_u - edge_v,
            id: incident_face_id << 4,
        },
        ClipVertex {
            position: face_center + edge_u - edge_v,
            id: incident_face_id << 4 | 1,
        },
        ClipVertex {
            position: face_center + edge_u + edge_v,
            id: incident_face_id << 4 | 2,
        },
        ClipVertex {
            position: face_center - edge_u + edge_v,
            id: incident_face_id << 4 | 3,
        },
    ];

    // Clip against the four side slabs of the reference face.
    let mut scratch: Vec<ClipVertex> = Vec::with_capacity(8);
    for side_axis in 0..3 {
        if side_axis == reference_axis {
            continue;
        }
        for plane_sign in [1.0f32, -1.0] {
            scratch.clear();
            let limit = half_a[side_axis];
            let count = polygon.len();
            for index in 0..count {
                let current = polygon[index];
                let next = polygon[(index + 1) % count];
                let current_distance = plane_sign * current.position[side_axis] - limit;
                let next_distance = plane_sign * next.position[side_axis] - limit;
                if current_distance <= 0.0 {
                    scratch.push(current);
                }
                if (current_distance <= 0.0) != (next_distance <= 0.0) {
                    let t = current_distance / (current_distance - next_distance);
                    scratch.push(ClipVertex {
                        position: current.position.lerp(next.position, t),
                        id: 0x100
                            | (side_axis as u32) << 6
                            | ((plane_sign > 0.0) as u32) << 5
                            | current.id & 0x1F,
                    });
                }
            }
            std::mem::swap(&mut polygon, &mut scratch);
            if polygon.is_empty() {
                break;
            }
        }
    }

    // Depth of each surviving point against the reference face plane.
    let mut candidates: Vec<(Vec3, f32, u32)> = polygon
        .iter()
        .map(|vertex| {
            let separation =
                reference_sign * vertex.position[reference_axis] - half_a[reference_axis];
            (vertex.position, -separation, vertex.id)
        })
        .filter(|(_, depth, _)| *depth >= -speculative_margin)
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(MAX_CONTACTS);

    for (position, depth, id) in candidates {
        manifold.push(orientation_a * position, depth, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TesterSettings {
        TesterSettings {
            convergence_threshold: 1e-6,
            minimum_depth_threshold: -1.0,
            depth_refiner_max_iterations: 50,
        }
    }

    fn direct_request(
        shape_a: ConvexShapeData,
        shape_b: ConvexShapeData,
        offset_b: Vec3,
    ) -> PairRequest<()> {
        PairRequest {
            shape_a,
            shape_b,
            offset_b,
            orientation_a: Quat::IDENTITY,
            orientation_b: Quat::IDENTITY,
            speculative_margin: 0.5,
            flipped: false,
            continuation: (),
        }
    }

    #[test]
    fn sphere_pair_bundle_reports_overlap_depth() {
        let request = direct_request(
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            Vec3::new(1.9, 0.0, 0.0),
        );
        let manifolds = execute_bundle(PairType::SpherePair, &[request], &settings());
        let manifold = &manifolds[0];
        assert_eq!(manifold.count, 1);
        assert!((manifold.contacts[0].depth - 0.1).abs() < 1e-5);
        assert!((manifold.normal - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn separated_sphere_pair_within_margin_is_speculative() {
        let request = direct_request(
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            Vec3::new(2.3, 0.0, 0.0),
        );
        let manifolds = execute_bundle(PairType::SpherePair, &[request], &settings());
        assert_eq!(manifolds[0].count, 1);
        assert!((manifolds[0].contacts[0].depth + 0.3).abs() < 1e-5);

        let far = direct_request(
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            Vec3::new(3.0, 0.0, 0.0),
        );
        let manifolds = execute_bundle(PairType::SpherePair, &[far], &settings());
        assert_eq!(manifolds[0].count, 0);
    }

    #[test]
    fn stacked_boxes_produce_a_four_contact_face_manifold() {
        let request = direct_request(
            ConvexShapeData::Box(BoxShape::new(2.0, 2.0, 2.0)),
            ConvexShapeData::Box(BoxShape::new(2.0, 2.0, 2.0)),
            Vec3::new(0.0, 1.95, 0.0),
        );
        let manifolds = execute_bundle(PairType::BoxPair, &[request], &settings());
        let manifold = &manifolds[0];
        assert_eq!(manifold.count, 4, "a resting face pair needs 4 contacts");
        assert!((manifold.normal - Vec3::Y).length() < 1e-3);
        for contact in &manifold.contacts[..4] {
            assert!((contact.depth - 0.05).abs() < 1e-3);
            // Contacts sit on the incident face of the upper box.
            assert!((contact.offset_a.y - 0.95).abs() < 1e-3);
        }
        // Feature ids must be distinct for contact correspondence.
        let mut ids: Vec<u32> = manifold.contacts[..4]
            .iter()
            .map(|contact| contact.feature_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn sphere_box_refiner_path_matches_the_analytic_answer() {
        let request = PairRequest {
            shape_a: ConvexShapeData::Sphere(Sphere::new(1.0)),
            shape_b: ConvexShapeData::Box(BoxShape::new(10.0, 0.1, 10.0)),
            offset_b: Vec3::new(0.0, -1.0, 0.0),
            orientation_a: Quat::IDENTITY,
            orientation_b: Quat::IDENTITY,
            speculative_margin: 0.5,
            flipped: false,
            continuation: (),
        };
        let manifolds = execute_bundle(PairType::SphereBox, &[request], &settings());
        let manifold = &manifolds[0];
        assert_eq!(manifold.count, 1);
        assert!((manifold.contacts[0].depth - 0.05).abs() < 1e-4);
        assert!((manifold.normal - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-3);
        assert!((manifold.contacts[0].offset_a - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-2);
    }

    #[test]
    fn flipping_a_manifold_restores_caller_order() {
        let request = direct_request(
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            ConvexShapeData::Sphere(Sphere::new(1.0)),
            Vec3::new(1.9, 0.0, 0.0),
        );
        let manifolds = execute_bundle(PairType::SpherePair, &[request], &settings());
        let flipped = flip_manifold(&manifolds[0]);
        assert!((flipped.normal + Vec3::X).length() < 1e-5);
        assert!((flipped.offset_b + Vec3::new(1.9, 0.0, 0.0)).length() < 1e-5);
        // The contact's world position is unchanged: offset from the
        // original A equals the flipped offset rebased through offset_b.
        let original_world = manifolds[0].contacts[0].offset_a;
        let rebased = manifolds[0].offset_b + flipped.contacts[0].offset_a;
        assert!((original_world - rebased).length() < 1e-5);
    }
}

//! Iterative minimum-depth search between two convex shapes.
//!
//! The search walks toward the point closest to the origin on the support
//! plane of the best (lowest depth) direction observed so far. A simplex of
//! up to three Minkowski-difference samples frames each step, with update
//! rules similar to a simplified GJK. The search target is definitionally
//! outside the Minkowski difference, so the walk makes progress until the
//! closest feature lands within the termination epsilon.

use std::simd::prelude::*;
use std::simd::StdFloat;

use crate::physics::collision_detection::support_finder::SupportFinder;
use crate::utilities::matrix3x3_wide::Matrix3x3Wide;
use crate::utilities::vector::{all_lanes_set, any_lane_set, MaskToInt, Vector};
use crate::utilities::vector3_wide::Vector3Wide;

/// One sampled Minkowski-difference vertex plus the matching point on A,
/// tracked so a converged query can reconstruct the closest point on A.
#[derive(Clone, Copy, Default)]
struct SimplexVertex {
    support: Vector3Wide,
    support_on_a: Vector3Wide,
    weight: Vector<f32>,
    exists: Vector<i32>,
}

/// The up-to-three-vertex simplex framing the search.
#[derive(Clone, Copy, Default)]
pub(crate) struct Simplex {
    a: SimplexVertex,
    b: SimplexVertex,
    c: SimplexVertex,
    weight_denominator: Vector<f32>,
}

/// Result of a depth refinement. Depth is positive when the shapes overlap
/// along the normal, negative when separated.
#[derive(Clone, Copy, Debug)]
pub struct DepthRefinement {
    pub depth: Vector<f32>,
    pub normal: Vector3Wide,
    /// Closest point on shape A, in A's local frame. Only meaningful for
    /// lanes that actually ran to convergence rather than falling below the
    /// minimum depth threshold.
    pub witness_on_a: Vector3Wide,
}

pub struct DepthRefiner;

impl DepthRefiner {
    /// Samples the Minkowski difference (A − B) in A's local frame:
    /// support(N, A) − (support(−N, B) rotated into A + offset of B in A).
    /// Also returns the contributing point on A.
    #[inline(always)]
    pub fn find_support<A: SupportFinder, B: SupportFinder>(
        a: &A,
        b: &B,
        local_offset_b: &Vector3Wide,
        local_orientation_b: &Matrix3x3Wide,
        direction: &Vector3Wide,
    ) -> (Vector3Wide, Vector3Wide) {
        let support_on_a = a.compute_local_support(direction);
        let negated_direction = direction.negate();
        let extreme_b = b.compute_support(local_orientation_b, &negated_direction);
        let offset_extreme_b = Vector3Wide::add(&extreme_b, local_offset_b);
        (
            Vector3Wide::subtract(&support_on_a, &offset_extreme_b),
            support_on_a,
        )
    }

    /// Fills any empty simplex slot with the given sample. Duplicates are
    /// fine; a degenerate simplex takes the same paths as a partial one.
    #[inline(always)]
    fn fill_slot(
        vertex: &mut SimplexVertex,
        support: &Vector3Wide,
        support_on_a: &Vector3Wide,
        terminated_lanes: Vector<i32>,
    ) {
        let dont_fill_slot = vertex.exists | terminated_lanes;
        vertex.support = Vector3Wide::conditional_select(dont_fill_slot, &vertex.support, support);
        vertex.support_on_a =
            Vector3Wide::conditional_select(dont_fill_slot, &vertex.support_on_a, support_on_a);
        vertex.exists = dont_fill_slot
            .simd_eq(Vector::splat(0))
            .select(Vector::splat(-1), vertex.exists);
    }

    #[inline(always)]
    fn force_fill_slot(
        should_fill: Vector<i32>,
        vertex: &mut SimplexVertex,
        support: &Vector3Wide,
        support_on_a: &Vector3Wide,
    ) {
        vertex.exists = vertex.exists | should_fill;
        vertex.support = Vector3Wide::conditional_select(should_fill, support, &vertex.support);
        vertex.support_on_a =
            Vector3Wide::conditional_select(should_fill, support_on_a, &vertex.support_on_a);
    }

    /// Creates a simplex from the initial sample. Unfilled slots hold
    /// duplicates of the sample so the degenerate paths see valid data.
    #[inline(always)]
    pub(crate) fn create(support: &Vector3Wide, support_on_a: &Vector3Wide) -> Simplex {
        let mut simplex = Simplex::default();
        simplex.a.support = *support;
        simplex.b.support = *support;
        simplex.c.support = *support;
        simplex.a.support_on_a = *support_on_a;
        simplex.b.support_on_a = *support_on_a;
        simplex.c.support_on_a = *support_on_a;
        simplex.a.exists = Vector::splat(-1);
        simplex.b.exists = Vector::splat(0);
        simplex.c.exists = Vector::splat(0);
        simplex.a.weight = Vector::splat(1.0);
        simplex.weight_denominator = Vector::splat(1.0);
        simplex
    }

    /// Advances the simplex by one step and computes the next sampling
    /// direction. Termination flags are set for lanes whose closest feature
    /// landed within the termination epsilon of the search target.
    pub(crate) fn get_next_normal(
        simplex: &mut Simplex,
        support: &Vector3Wide,
        support_on_a: &Vector3Wide,
        terminated_lanes: &mut Vector<i32>,
        best_normal: &Vector3Wide,
        best_depth: Vector<f32>,
        convergence_threshold: Vector<f32>,
        has_new_support: bool,
    ) -> Vector3Wide {
        let zero_f = Vector::<f32>::splat(0.0);
        let zero_i = Vector::<i32>::splat(0);
        let one_f = Vector::<f32>::splat(1.0);
        let neg_one = Vector::<i32>::splat(-1);

        // The search target is the closest point to the origin on the
        // so-far-best bounding plane. Separated lanes aim at the origin.
        let clamped_depth = best_depth.simd_max(zero_f);
        let search_target = Vector3Wide::scale(best_normal, clamped_depth);
        // Separation needs a tighter absolute tolerance as depth grows more
        // negative; the target distance itself scales with -depth.
        let termination_epsilon = best_depth
            .simd_lt(zero_f)
            .select(convergence_threshold - best_depth, convergence_threshold);
        let termination_epsilon_squared = termination_epsilon * termination_epsilon;

        if has_new_support {
            let simplex_full =
                (simplex.a.exists & simplex.b.exists & simplex.c.exists) & !*terminated_lanes;
            Self::fill_slot(&mut simplex.a, support, support_on_a, *terminated_lanes);
            Self::fill_slot(&mut simplex.b, support, support_on_a, *terminated_lanes);
            Self::fill_slot(&mut simplex.c, support, support_on_a, *terminated_lanes);

            if any_lane_set(simplex_full) {
                // The simplex was already a triangle; choose the subtriangle
                // {ABD, BCD, CAD} using the edge plane tests of AD, BD, and
                // CD, where D is the new support.
                let ab = Vector3Wide::subtract(&simplex.b.support, &simplex.a.support);
                let ca = Vector3Wide::subtract(&simplex.a.support, &simplex.c.support);
                let ad = Vector3Wide::subtract(support, &simplex.a.support);
                let bd = Vector3Wide::subtract(support, &simplex.b.support);
                let cd = Vector3Wide::subtract(support, &simplex.c.support);
                let triangle_normal = Vector3Wide::cross(&ab, &ca);
                // (ad x n) * (d - target) = (n x (d - target)) * ad
                let target_to_support = Vector3Wide::subtract(support, &search_target);
                let nx_offset = Vector3Wide::cross(&triangle_normal, &target_to_support);
                let ad_plane_test = Vector3Wide::dot(&nx_offset, &ad);
                let bd_plane_test = Vector3Wide::dot(&nx_offset, &bd);
                let cd_plane_test = Vector3Wide::dot(&nx_offset, &cd);

                let use_abd = ad_plane_test.simd_ge(zero_f) & bd_plane_test.simd_lt(zero_f);
                let use_bcd = bd_plane_test.simd_ge(zero_f) & cd_plane_test.simd_lt(zero_f);
                let use_cad = cd_plane_test.simd_ge(zero_f) & ad_plane_test.simd_lt(zero_f);

                // If no subtriangle qualifies (the best normal moved under
                // us, invalidating the portal), defaulting to ABD is safe:
                // it only happens when the best depth strictly improved.
                let none_selected = !(use_abd | use_bcd | use_cad);
                let use_abd = none_selected.select(neg_one, use_abd.to_int());
                let use_bcd = use_bcd.to_int();
                let use_cad = use_cad.to_int();

                Self::force_fill_slot(use_bcd & simplex_full, &mut simplex.a, support, support_on_a);
                Self::force_fill_slot(use_cad & simplex_full, &mut simplex.b, support, support_on_a);
                Self::force_fill_slot(use_abd & simplex_full, &mut simplex.c, support, support_on_a);
            }
        } else {
            let a_support = simplex.a.support;
            let a_support_on_a = simplex.a.support_on_a;
            Self::fill_slot(&mut simplex.a, &a_support, &a_support_on_a, *terminated_lanes);
            Self::fill_slot(&mut simplex.b, &a_support, &a_support_on_a, *terminated_lanes);
            Self::fill_slot(&mut simplex.c, &a_support, &a_support_on_a, *terminated_lanes);
        }

        let ab = Vector3Wide::subtract(&simplex.b.support, &simplex.a.support);
        let ca = Vector3Wide::subtract(&simplex.a.support, &simplex.c.support);
        let bc = Vector3Wide::subtract(&simplex.c.support, &simplex.b.support);
        let mut triangle_normal = Vector3Wide::cross(&ab, &ca);
        let triangle_normal_length_squared = triangle_normal.length_squared();

        // Unnormalized barycentric plane tests; only the sign matters.
        let target_to_a = Vector3Wide::subtract(&simplex.a.support, &search_target);
        let target_to_c = Vector3Wide::subtract(&simplex.c.support, &search_target);
        let abxta = Vector3Wide::cross(&ab, &target_to_a);
        let caxtc = Vector3Wide::cross(&ca, &target_to_c);
        let ab_plane_test = Vector3Wide::dot(&abxta, &triangle_normal);
        let ca_plane_test = Vector3Wide::dot(&caxtc, &triangle_normal);
        let bc_plane_test = triangle_normal_length_squared - ca_plane_test - ab_plane_test;
        let outside_ab = ab_plane_test.simd_lt(zero_f);
        let outside_bc = bc_plane_test.simd_lt(zero_f);
        let outside_ca = ca_plane_test.simd_lt(zero_f);

        let ab_length_squared = ab.length_squared();
        let bc_length_squared = bc.length_squared();
        let ca_length_squared = ca.length_squared();
        let longest_edge_length_squared = ab_length_squared
            .simd_max(bc_length_squared)
            .simd_max(ca_length_squared);
        let simplex_degenerate = triangle_normal_length_squared
            .simd_le(longest_edge_length_squared * Vector::splat(1e-10));
        let simplex_is_a_vertex = longest_edge_length_squared.simd_lt(Vector::splat(1e-14));
        let simplex_is_an_edge = simplex_degenerate & !simplex_is_a_vertex;

        // Calibrate the triangle normal against the best normal so the walk
        // stays on the outward side.
        let calibration_dot = Vector3Wide::dot(&triangle_normal, best_normal);
        triangle_normal = Vector3Wide::conditionally_negate(
            calibration_dot.simd_lt(zero_f).to_int(),
            &triangle_normal,
        );

        let target_outside_triangle_edges = outside_ab | outside_bc | outside_ca;

        // Default to the vertex feature: closest point is A itself.
        let mut triangle_to_target = target_to_a.negate();

        let one_i = Vector::<i32>::splat(1);
        let two_i = Vector::<i32>::splat(2);
        let four_i = Vector::<i32>::splat(4);
        let mut relevant_features = one_i;
        let previously_terminated = *terminated_lanes;
        simplex.a.weight = to_weight_default(previously_terminated, simplex.a.weight, one_f);
        simplex.b.weight = to_weight_default(previously_terminated, simplex.b.weight, zero_f);
        simplex.c.weight = to_weight_default(previously_terminated, simplex.c.weight, zero_f);
        simplex.weight_denominator =
            to_weight_default(previously_terminated, simplex.weight_denominator, one_f);

        // A vertex simplex sitting on the target terminates immediately.
        let target_to_a_length_squared = target_to_a.length_squared();
        *terminated_lanes = *terminated_lanes
            | (simplex_is_a_vertex.to_int()
                & target_to_a_length_squared
                    .simd_lt(termination_epsilon_squared)
                    .to_int());

        let use_edge =
            (target_outside_triangle_edges | simplex_is_an_edge).to_int() & !*terminated_lanes;
        if any_lane_set(use_edge) {
            // Project the target onto each edge, clamped to the endpoints,
            // and take the closest.
            let inverse_ab_length_squared = one_f / ab_length_squared;
            let inverse_bc_length_squared = one_f / bc_length_squared;
            let inverse_ca_length_squared = one_f / ca_length_squared;
            let target_to_b = Vector3Wide::subtract(&simplex.b.support, &search_target);
            let ta_dot_ab = Vector3Wide::dot(&target_to_a, &ab);
            let tb_dot_bc = Vector3Wide::dot(&target_to_b, &bc);
            let tc_dot_ca = Vector3Wide::dot(&target_to_c, &ca);
            let ab_scaled_t = zero_f.simd_max(ab_length_squared.simd_min(-ta_dot_ab));
            let bc_scaled_t = zero_f.simd_max(bc_length_squared.simd_min(-tb_dot_bc));
            let ca_scaled_t = zero_f.simd_max(ca_length_squared.simd_min(-tc_dot_ca));
            let ab_t = ab_scaled_t * inverse_ab_length_squared;
            let bc_t = bc_scaled_t * inverse_bc_length_squared;
            let ca_t = ca_scaled_t * inverse_ca_length_squared;
            let ab_closest_offset =
                Vector3Wide::add(&target_to_a, &Vector3Wide::scale(&ab, ab_t));
            let bc_closest_offset =
                Vector3Wide::add(&target_to_b, &Vector3Wide::scale(&bc, bc_t));
            let ca_closest_offset =
                Vector3Wide::add(&target_to_c, &Vector3Wide::scale(&ca, ca_t));
            let ab_distance_squared = ab_closest_offset.length_squared();
            let bc_distance_squared = bc_closest_offset.length_squared();
            let ca_distance_squared = ca_closest_offset.length_squared();

            let bc_degenerate = bc_length_squared.simd_eq(zero_f);
            let ca_degenerate = ca_length_squared.simd_eq(zero_f);
            let ab_closer_than_bc = bc_degenerate | ab_distance_squared.simd_lt(bc_distance_squared);
            let ab_closer_than_ca = ca_degenerate | ab_distance_squared.simd_lt(ca_distance_squared);
            let bc_closer_than_ca = ca_degenerate | bc_distance_squared.simd_lt(ca_distance_squared);

            let use_ab = (ab_closer_than_bc & ab_closer_than_ca).to_int();
            let use_bc = bc_closer_than_ca.to_int() & !use_ab;
            let use_ab_mask = use_ab.simd_ne(zero_i);
            let use_bc_mask = use_bc.simd_ne(zero_i);

            let best_distance_squared = use_ab_mask.select(
                ab_distance_squared,
                use_bc_mask.select(bc_distance_squared, ca_distance_squared),
            );

            // If the target is on the selected edge, the lane is done.
            *terminated_lanes = *terminated_lanes
                | (use_edge
                    & best_distance_squared
                        .simd_le(termination_epsilon_squared)
                        .to_int());

            let t = use_ab_mask.select(ab_t, use_bc_mask.select(bc_t, ca_t));
            let mut edge_offset = Vector3Wide::conditional_select(use_ab, &ab, &ca);
            let mut edge_start = Vector3Wide::conditional_select(use_ab, &target_to_a, &target_to_c);
            edge_offset = Vector3Wide::conditional_select(use_bc, &bc, &edge_offset);
            edge_start = Vector3Wide::conditional_select(use_bc, &target_to_b, &edge_start);

            let triangle_to_target_candidate =
                Vector3Wide::subtract(&Vector3Wide::scale(&edge_offset, -t), &edge_start);

            // Feature id bits: A = 1, B = 2, C = 4. Clamped projections
            // collapse the edge to one of its endpoints.
            let target_nearest_start = t.simd_eq(zero_f);
            let target_nearest_end = t.simd_eq(one_f);
            let three_i = Vector::<i32>::splat(3);
            let five_i = Vector::<i32>::splat(5);
            let six_i = Vector::<i32>::splat(6);
            let feature_for_ab =
                target_nearest_start.select(one_i, target_nearest_end.select(two_i, three_i));
            let feature_for_bc =
                target_nearest_start.select(two_i, target_nearest_end.select(four_i, six_i));
            let feature_for_ca =
                target_nearest_start.select(four_i, target_nearest_end.select(one_i, five_i));
            let edge_features = use_ab_mask.select(
                feature_for_ab,
                use_bc_mask.select(feature_for_bc, feature_for_ca),
            );
            let use_edge_mask = use_edge.simd_ne(zero_i);
            relevant_features = use_edge_mask.select(edge_features, relevant_features);
            triangle_to_target = Vector3Wide::conditional_select(
                use_edge,
                &triangle_to_target_candidate,
                &triangle_to_target,
            );

            // Interpolation weights for the witness point; the denominator
            // stays one in the edge and vertex cases.
            let weight_edge_start = one_f - t;
            simplex.a.weight = use_edge_mask.select(
                use_ab_mask.select(weight_edge_start, use_bc_mask.select(zero_f, t)),
                simplex.a.weight,
            );
            simplex.b.weight = use_edge_mask.select(
                use_ab_mask.select(t, use_bc_mask.select(weight_edge_start, zero_f)),
                simplex.b.weight,
            );
            simplex.c.weight = use_edge_mask.select(
                use_ab_mask.select(zero_f, use_bc_mask.select(t, weight_edge_start)),
                simplex.c.weight,
            );
        }

        // Vertex and edge cases handled; what remains is the triangle face.
        let target_contained_in_edge_planes = (!target_outside_triangle_edges.to_int())
            & (!simplex_degenerate.to_int())
            & !*terminated_lanes;
        if any_lane_set(target_contained_in_edge_planes) {
            // dot(n, target - a)^2 / ||n||^2 against the epsilon, without
            // the division.
            let target_to_a_dot = Vector3Wide::dot(&target_to_a, &triangle_normal);
            let target_on_triangle_surface = (target_to_a_dot * target_to_a_dot)
                .simd_lt(termination_epsilon_squared * triangle_normal_length_squared);
            *terminated_lanes = *terminated_lanes
                | (target_contained_in_edge_planes & target_on_triangle_surface.to_int());
            triangle_to_target = Vector3Wide::conditional_select(
                target_contained_in_edge_planes,
                &triangle_normal,
                &triangle_to_target,
            );
            let contained_mask = target_contained_in_edge_planes.simd_ne(zero_i);
            relevant_features =
                contained_mask.select(Vector::splat(7), relevant_features);

            // The plane tests are unnormalized barycentric coordinates;
            // defer the division until the witness is actually needed.
            simplex.a.weight = contained_mask.select(bc_plane_test, simplex.a.weight);
            simplex.b.weight = contained_mask.select(ca_plane_test, simplex.b.weight);
            simplex.c.weight = contained_mask.select(ab_plane_test, simplex.c.weight);
            simplex.weight_denominator =
                contained_mask.select(triangle_normal_length_squared, simplex.weight_denominator);
        }

        // Exactly the vertices supporting the selected feature survive.
        simplex.a.exists = (relevant_features & one_i).simd_gt(zero_i).to_int();
        simplex.b.exists = (relevant_features & two_i).simd_gt(zero_i).to_int();
        simplex.c.exists = (relevant_features & four_i).simd_gt(zero_i).to_int();

        if !all_lanes_set(*terminated_lanes) {
            // Near penetrating convergence the offset to the target can
            // point almost 90 degrees away from the previous best normal
            // and the search can stall in a cycle. Tilting the step away
            // from the surface breaks the cycle; separated lanes and face
            // features keep the direct offset.
            let push_candidate = Vector3Wide::add(
                &search_target,
                &Vector3Wide::scale(&triangle_to_target, Vector::splat(4.0)),
            );
            let use_direct =
                best_depth.simd_le(zero_f).to_int() | target_contained_in_edge_planes;
            triangle_to_target =
                Vector3Wide::conditional_select(use_direct, &triangle_to_target, &push_candidate);

            // No active lane can have a zero-length offset here.
            let inverse_length = one_f / triangle_to_target.length_squared().sqrt();
            Vector3Wide::scale(&triangle_to_target, inverse_length)
        } else {
            Vector3Wide::default()
        }
    }

    /// Refines an initial normal guess toward the minimum translation
    /// normal and depth. Returns the best observed direction and depth on
    /// iteration cap exhaustion; the result is never worse than the guess.
    #[allow(clippy::too_many_arguments)]
    pub fn find_minimum_depth<A: SupportFinder, B: SupportFinder>(
        a: &A,
        b: &B,
        local_offset_b: &Vector3Wide,
        local_orientation_b: &Matrix3x3Wide,
        initial_normal: &Vector3Wide,
        inactive_lanes: Vector<i32>,
        convergence_threshold: Vector<f32>,
        minimum_depth_threshold: Vector<f32>,
        maximum_iterations: u32,
    ) -> DepthRefinement {
        let (initial_support, initial_support_on_a) =
            Self::find_support(a, b, local_offset_b, local_orientation_b, initial_normal);
        let initial_depth = Vector3Wide::dot(&initial_support, initial_normal);
        let mut simplex = Self::create(&initial_support, &initial_support_on_a);

        // Margins are excluded from the support samples; search against the
        // cores and restore the margins on exit.
        let mut depth_threshold = minimum_depth_threshold;
        if A::HAS_MARGIN {
            depth_threshold = depth_threshold - a.margin();
        }
        if B::HAS_MARGIN {
            depth_threshold = depth_threshold - b.margin();
        }

        let mut terminated_lanes =
            initial_depth.simd_lt(depth_threshold).to_int() | inactive_lanes;
        let mut refinement = DepthRefinement {
            depth: initial_depth,
            normal: *initial_normal,
            witness_on_a: Vector3Wide::default(),
        };

        if !all_lanes_set(terminated_lanes) {
            let dummy = Vector3Wide::default();
            let mut normal = Self::get_next_normal(
                &mut simplex,
                &dummy,
                &dummy,
                &mut terminated_lanes,
                &refinement.normal,
                refinement.depth,
                convergence_threshold,
                false,
            );

            for _ in 0..maximum_iterations {
                if all_lanes_set(terminated_lanes) {
                    break;
                }
                let (support, support_on_a) =
                    Self::find_support(a, b, local_offset_b, local_orientation_b, &normal);
                let depth = Vector3Wide::dot(&support, &normal);

                let use_new_depth =
                    depth.simd_lt(refinement.depth).to_int() & !terminated_lanes;
                refinement.depth = use_new_depth
                    .simd_ne(Vector::splat(0))
                    .select(depth, refinement.depth);
                refinement.normal = Vector3Wide::conditional_select(
                    use_new_depth,
                    &normal,
                    &refinement.normal,
                );
                terminated_lanes =
                    terminated_lanes | refinement.depth.simd_le(depth_threshold).to_int();
                if all_lanes_set(terminated_lanes) {
                    break;
                }

                normal = Self::get_next_normal(
                    &mut simplex,
                    &support,
                    &support_on_a,
                    &mut terminated_lanes,
                    &refinement.normal,
                    refinement.depth,
                    convergence_threshold,
                    true,
                );
            }

            if !all_lanes_set(terminated_lanes) {
                log::debug!(
                    "depth refinement hit the {maximum_iterations} iteration cap; returning best observed depth"
                );
            }
        }

        if A::HAS_MARGIN {
            refinement.depth = refinement.depth + a.margin();
        }
        if B::HAS_MARGIN {
            refinement.depth = refinement.depth + b.margin();
        }

        // Convert the deferred plane tests into barycentric weights and
        // blend the witness point on A.
        let inverse_denominator = Vector::splat(1.0) / simplex.weight_denominator;
        let weighted_a =
            Vector3Wide::scale(&simplex.a.support_on_a, simplex.a.weight * inverse_denominator);
        let weighted_b =
            Vector3Wide::scale(&simplex.b.support_on_a, simplex.b.weight * inverse_denominator);
        let weighted_c =
            Vector3Wide::scale(&simplex.c.support_on_a, simplex.c.weight * inverse_denominator);
        refinement.witness_on_a =
            Vector3Wide::add(&Vector3Wide::add(&weighted_a, &weighted_b), &weighted_c);
        if A::HAS_MARGIN {
            refinement.witness_on_a = Vector3Wide::add(
                &refinement.witness_on_a,
                &Vector3Wide::scale(&refinement.normal, a.margin()),
            );
        }
        refinement
    }
}

#[inline(always)]
fn to_weight_default(
    terminated_lanes: Vector<i32>,
    current: Vector<f32>,
    default: Vector<f32>,
) -> Vector<f32> {
    terminated_lanes
        .simd_ne(Vector::splat(0))
        .select(current, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::box_shape::{BoxShape, BoxWide};
    use crate::physics::collidables::sphere::{Sphere, SphereWide};
    use crate::utilities::vector::LANES;
    use glam::Vec3;

    fn sphere_wide(radius: f32) -> SphereWide {
        let mut wide = SphereWide::default();
        for slot in 0..LANES {
            wide.write_slot(&Sphere::new(radius), slot);
        }
        wide
    }

    fn box_wide(width: f32, height: f32, length: f32) -> BoxWide {
        let mut wide = BoxWide::default();
        for slot in 0..LANES {
            wide.write_slot(&BoxShape::new(width, height, length), slot);
        }
        wide
    }

    fn refine<A: SupportFinder, B: SupportFinder>(
        a: &A,
        b: &B,
        offset_b: Vec3,
        guess: Vec3,
    ) -> DepthRefinement {
        DepthRefiner::find_minimum_depth(
            a,
            b,
            &Vector3Wide::broadcast(offset_b),
            &Matrix3x3Wide::identity(),
            &Vector3Wide::broadcast(guess),
            Vector::splat(0),
            Vector::splat(1e-6),
            Vector::splat(-5.0),
            50,
        )
    }

    #[test]
    fn overlapping_unit_spheres_refine_to_the_center_line() {
        let spheres = sphere_wide(1.0);
        let result = refine(&spheres, &spheres, Vec3::new(1.9, 0.0, 0.0), Vec3::X);
        let depth = result.depth.as_array()[0];
        assert!((depth - 0.1).abs() < 1e-4, "depth {depth}");
        let normal = result.normal.read_slot(0);
        assert!((normal - Vec3::X).length() < 1e-3, "normal {normal}");
    }

    #[test]
    fn sphere_over_thin_box_reports_the_face_normal() {
        let sphere = sphere_wide(1.0);
        let plane = box_wide(10.0, 0.1, 10.0);
        // Ground box whose top face sits 0.95 below the sphere center; the
        // unit sphere overlaps it by 0.05. The normal points from A (the
        // box) toward B (the sphere).
        let result = refine(&plane, &sphere, Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        let depth = result.depth.as_array()[0];
        assert!((depth - 0.05).abs() < 1e-4, "depth {depth}");
        let normal = result.normal.read_slot(0);
        assert!((normal - Vec3::Y).length() < 1e-3, "normal {normal}");
    }

    #[test]
    fn separated_spheres_report_negative_depth() {
        let spheres = sphere_wide(1.0);
        let result = refine(&spheres, &spheres, Vec3::new(3.0, 0.0, 0.0), Vec3::X);
        let depth = result.depth.as_array()[0];
        assert!((depth + 1.0).abs() < 1e-3, "depth {depth}");
    }

    #[test]
    fn bad_initial_guess_still_converges() {
        let spheres = sphere_wide(1.0);
        let result = refine(
            &spheres,
            &spheres,
            Vec3::new(1.9, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let depth = result.depth.as_array()[0];
        assert!((depth - 0.1).abs() < 1e-3, "depth {depth}");
    }

    #[test]
    fn witness_lands_on_the_contacting_face() {
        let sphere = sphere_wide(1.0);
        let plane = box_wide(10.0, 0.1, 10.0);
        // Same configuration with the sphere as A; its deepest point is
        // straight down in its local frame.
        let result = refine(&sphere, &plane, Vec3::new(0.0, -1.0, 0.0), -Vec3::Y);
        let depth = result.depth.as_array()[0];
        assert!((depth - 0.05).abs() < 1e-4, "depth {depth}");
        let witness = result.witness_on_a.read_slot(0);
        assert!(
            (witness - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-2,
            "witness {witness}"
        );
    }

    #[test]
    fn best_depth_is_monotone_and_simplex_stays_occupied() {
        let a = box_wide(2.0, 2.0, 2.0);
        let b = box_wide(2.0, 2.0, 2.0);
        let offset = Vector3Wide::broadcast(Vec3::new(1.5, 1.2, 0.4));
        let orientation = Matrix3x3Wide::identity();
        let guess = Vector3Wide::broadcast(Vec3::X);

        let (support, support_on_a) =
            DepthRefiner::find_support(&a, &b, &offset, &orientation, &guess);
        let mut best_depth = Vector3Wide::dot(&support, &guess);
        let mut best_normal = guess;
        let mut simplex = DepthRefiner::create(&support, &support_on_a);
        let mut terminated = Vector::splat(0);
        let dummy = Vector3Wide::default();
        let mut normal = DepthRefiner::get_next_normal(
            &mut simplex,
            &dummy,
            &dummy,
            &mut terminated,
            &best_normal,
            best_depth,
            Vector::splat(1e-6),
            false,
        );
        for _ in 0..30 {
            if all_lanes_set(terminated) {
                break;
            }
            let (support, support_on_a) =
                DepthRefiner::find_support(&a, &b, &offset, &orientation, &normal);
            let depth = Vector3Wide::dot(&support, &normal);
            let improved = depth.simd_lt(best_depth).to_int() & !terminated;
            let previous_best = best_depth;
            best_depth = improved.simd_ne(Vector::splat(0)).select(depth, best_depth);
            best_normal = Vector3Wide::conditional_select(improved, &normal, &best_normal);
            assert!(
                best_depth.simd_le(previous_best).all(),
                "best depth must be non-increasing"
            );
            normal = DepthRefiner::get_next_normal(
                &mut simplex,
                &support,
                &support_on_a,
                &mut terminated,
                &best_normal,
                best_depth,
                Vector::splat(1e-6),
                true,
            );
            let any_exists = simplex.a.exists | simplex.b.exists | simplex.c.exists;
            assert!(
                crate::utilities::vector::all_lanes_set(any_exists | terminated),
                "at least one simplex slot must exist in every active lane"
            );
        }
    }
}

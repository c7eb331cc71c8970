use glam::{Quat, Vec3};

use crate::physics::collidables::box_shape::BoxShape;
use crate::physics::collidables::capsule::Capsule;
use crate::physics::collidables::compound::Compound;
use crate::physics::collidables::shapes::Shapes;
use crate::physics::collidables::sphere::Sphere;
use crate::physics::collidables::typed_index::TypedIndex;
use crate::physics::collision_detection::contact_manifold::{ContactManifold, MAX_CONTACTS};
use crate::physics::collision_detection::pair_cache::CollidablePair;
use crate::physics::collision_detection::pair_testers::{
    execute_bundle, flip_manifold, ConvexShapeData, PairRequest, PairType, TesterSettings,
    PAIR_TYPE_COUNT,
};
use crate::utilities::vector::LANES;

/// Receives finished manifolds from the batcher.
pub trait ManifoldHandler {
    fn on_pair_completed(&mut self, pair: CollidablePair, manifold: &ContactManifold);
}

/// Routing information carried by every enqueued pair.
#[derive(Clone, Copy, Debug)]
pub enum PairContinuation {
    /// Top-level pair; the manifold goes straight to the handler.
    Direct { pair: CollidablePair },
    /// A child spawned by compound expansion. The manifold folds into the
    /// parent's reduction slot.
    CompoundChild {
        reduction: usize,
        child_id: u32,
        /// Added to contact offsets to rebase them from the child's center
        /// onto the parent collidable A's center.
        offset_rebase: Vec3,
    },
}

/// A compound pair waiting for expansion.
#[derive(Clone, Copy, Debug)]
struct CompoundPairEntry {
    shape_a: TypedIndex,
    shape_b: TypedIndex,
    offset_b: Vec3,
    orientation_a: Quat,
    orientation_b: Quat,
    speculative_margin: f32,
    continuation: PairContinuation,
}

/// Accumulates child manifolds of one expanded compound pair.
struct CompoundReduction {
    continuation: PairContinuation,
    offset_b: Vec3,
    expected_children: usize,
    completed_children: usize,
    // (offset_a, depth, feature id, normal) per surviving child contact.
    contacts: Vec<(Vec3, f32, u32, Vec3)>,
}

/// Worker-owned accumulator that groups pairs of identical type into
/// lane-width bundles. Full bundles drain immediately; `flush` drains the
/// remainder and runs spawned sub-pairs to quiescence. No cross-worker
/// synchronization happens anywhere in here.
pub struct CollisionBatcher {
    bundles: [Vec<PairRequest<PairContinuation>>; PAIR_TYPE_COUNT],
    compound_pairs: Vec<CompoundPairEntry>,
    reductions: Vec<Option<CompoundReduction>>,
    free_reductions: Vec<usize>,
    settings: TesterSettings,
    /// Scratch for compound child queries.
    child_overlaps: Vec<usize>,
}

impl CollisionBatcher {
    pub fn new(settings: TesterSettings) -> Self {
        Self {
            bundles: std::array::from_fn(|_| Vec::with_capacity(LANES)),
            compound_pairs: Vec::new(),
            reductions: Vec::new(),
            free_reductions: Vec::new(),
            settings,
            child_overlaps: Vec::new(),
        }
    }

    /// Enqueues a top-level pair. A full bundle drains before this returns.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        shapes: &Shapes,
        pair: CollidablePair,
        shape_a: TypedIndex,
        shape_b: TypedIndex,
        offset_b: Vec3,
        orientation_a: Quat,
        orientation_b: Quat,
        speculative_margin: f32,
        handler: &mut dyn ManifoldHandler,
    ) {
        self.add_with_continuation(
            shapes,
            shape_a,
            shape_b,
            offset_b,
            orientation_a,
            orientation_b,
            speculative_margin,
            PairContinuation::Direct { pair },
            handler,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn add_with_continuation(
        &mut self,
        shapes: &Shapes,
        shape_a: TypedIndex,
        shape_b: TypedIndex,
        offset_b: Vec3,
        orientation_a: Quat,
        orientation_b: Quat,
        speculative_margin: f32,
        continuation: PairContinuation,
        handler: &mut dyn ManifoldHandler,
    ) {
        let convex_a = Shapes::is_convex(shape_a.type_id());
        let convex_b = Shapes::is_convex(shape_b.type_id());
        if convex_a && convex_b {
            self.enqueue_convex(
                shapes,
                shape_a,
                shape_b,
                offset_b,
                orientation_a,
                orientation_b,
                speculative_margin,
                continuation,
                handler,
            );
        } else {
            self.compound_pairs.push(CompoundPairEntry {
                shape_a,
                shape_b,
                offset_b,
                orientation_a,
                orientation_b,
                speculative_margin,
                continuation,
            });
            if self.compound_pairs.len() == LANES {
                self.drain_compound_pairs(shapes, handler);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn enqueue_convex(
        &mut self,
        shapes: &Shapes,
        shape_a: TypedIndex,
        shape_b: TypedIndex,
        offset_b: Vec3,
        orientation_a: Quat,
        orientation_b: Quat,
        speculative_margin: f32,
        continuation: PairContinuation,
        handler: &mut dyn ManifoldHandler,
    ) {
        let data_a = Self::capture(shapes, shape_a);
        let data_b = Self::capture(shapes, shape_b);
        let (pair_type, flipped) = PairType::classify(data_a.code(), data_b.code());
        let request = if flipped {
            PairRequest {
                shape_a: data_b,
                shape_b: data_a,
                offset_b: -offset_b,
                orientation_a: orientation_b,
                orientation_b: orientation_a,
                speculative_margin,
                flipped: true,
                continuation,
            }
        } else {
            PairRequest {
                shape_a: data_a,
                shape_b: data_b,
                offset_b,
                orientation_a,
                orientation_b,
                speculative_margin,
                flipped: false,
                continuation,
            }
        };
        let bundle = &mut self.bundles[pair_type as usize];
        bundle.push(request);
        if bundle.len() == LANES {
            self.drain_bundle(pair_type, handler, shapes);
        }
    }

    fn capture(shapes: &Shapes, index: TypedIndex) -> ConvexShapeData {
        match index.type_id() {
            Sphere::ID => ConvexShapeData::Sphere(*shapes.sphere(index)),
            BoxShape::ID => ConvexShapeData::Box(*shapes.box_shape(index)),
            Capsule::ID => ConvexShapeData::Capsule(*shapes.capsule(index)),
            _ => unreachable!("compound shapes are expanded before bundling"),
        }
    }

    fn drain_bundle(
        &mut self,
        pair_type: PairType,
        handler: &mut dyn ManifoldHandler,
        shapes: &Shapes,
    ) {
        let requests = std::mem::take(&mut self.bundles[pair_type as usize]);
        if requests.is_empty() {
            return;
        }
        let manifolds = execute_bundle(pair_type, &requests, &self.settings);
        for (request, manifold) in requests.iter().zip(manifolds.iter()) {
            let manifold = if request.flipped {
                flip_manifold(manifold)
            } else {
                *manifold
            };
            self.dispatch_manifold(request.continuation, &manifold, handler, shapes);
        }
    }

    fn dispatch_manifold(
        &mut self,
        continuation: PairContinuation,
        manifold: &ContactManifold,
        handler: &mut dyn ManifoldHandler,
        shapes: &Shapes,
    ) {
        match continuation {
            PairContinuation::Direct { pair } => handler.on_pair_completed(pair, manifold),
            PairContinuation::CompoundChild {
                reduction,
                child_id,
                offset_rebase,
            } => {
                let completed = {
                    let slot = self.reductions[reduction]
                        .as_mut()
                        .expect("reduction slot must be live while children are pending");
                    for contact in &manifold.contacts[..manifold.count as usize] {
                        slot.contacts.push((
                            contact.offset_a + offset_rebase,
                            contact.depth,
                            child_id << 8 | contact.feature_id & 0xFF,
                            manifold.normal,
                        ));
                    }
                    slot.completed_children += 1;
                    slot.completed_children == slot.expected_children
                };
                if completed {
                    let slot = self.reductions[reduction].take().unwrap();
                    self.free_reductions.push(reduction);
                    let reduced = Self::reduce_compound(&slot);
                    self.dispatch_manifold(slot.continuation, &reduced, handler, shapes);
                }
            }
        }
    }

    /// Reduces child contacts to one manifold: the deepest contact picks
    /// the normal, near-parallel contacts keep their spots, and the four
    /// deepest survive.
    fn reduce_compound(reduction: &CompoundReduction) -> ContactManifold {
        let mut manifold = ContactManifold {
            offset_b: reduction.offset_b,
            ..Default::default()
        };
        if reduction.contacts.is_empty() {
            return manifold;
        }
        let deepest = reduction
            .contacts
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap();
        manifold.normal = deepest.3;
        let mut candidates: Vec<&(Vec3, f32, u32, Vec3)> = reduction
            .contacts
            .iter()
            .filter(|candidate| candidate.3.dot(manifold.normal) > 0.99)
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (offset_a, depth, feature_id, _) in candidates.into_iter().take(MAX_CONTACTS) {
            manifold.push(*offset_a, *depth, *feature_id);
        }
        manifold
    }

    fn drain_compound_pairs(&mut self, shapes: &Shapes, handler: &mut dyn ManifoldHandler) {
        while let Some(entry) = self.compound_pairs.pop() {
            self.expand_compound_pair(entry, shapes, handler);
        }
    }

    /// Expands one compound pair into child sub-pairs. Children prune
    /// against the other collidable's bounds in the compound's local
    /// frame; surviving children are re-added and may themselves fill
    /// bundles.
    fn expand_compound_pair(
        &mut self,
        entry: CompoundPairEntry,
        shapes: &Shapes,
        handler: &mut dyn ManifoldHandler,
    ) {
        let a_is_compound = entry.shape_a.type_id() == Compound::ID;
        let (compound_index, compound_orientation) = if a_is_compound {
            (entry.shape_a, entry.orientation_a)
        } else {
            (entry.shape_b, entry.orientation_b)
        };
        let other_index = if a_is_compound {
            entry.shape_b
        } else {
            entry.shape_a
        };

        // Other collidable's center in the compound's local frame, padded
        // by its maximum radius and the pair margin.
        let to_compound_local = compound_orientation.conjugate();
        let other_center_local = if a_is_compound {
            to_compound_local * entry.offset_b
        } else {
            to_compound_local * -entry.offset_b
        };
        let query_radius =
            shapes.maximum_radius(other_index) + entry.speculative_margin;
        let compound = shapes.compound(compound_index);
        self.child_overlaps.clear();
        let mut overlaps = std::mem::take(&mut self.child_overlaps);
        compound.find_overlapping_children(
            other_center_local - Vec3::splat(query_radius),
            other_center_local + Vec3::splat(query_radius),
            &mut overlaps,
        );
        if overlaps.is_empty() {
            self.child_overlaps = overlaps;
            let empty = ContactManifold {
                offset_b: entry.offset_b,
                ..Default::default()
            };
            self.dispatch_manifold(entry.continuation, &empty, handler, shapes);
            return;
        }

        let reduction = match self.free_reductions.pop() {
            Some(slot) => slot,
            None => {
                self.reductions.push(None);
                self.reductions.len() - 1
            }
        };
        self.reductions[reduction] = Some(CompoundReduction {
            continuation: entry.continuation,
            offset_b: entry.offset_b,
            expected_children: overlaps.len(),
            completed_children: 0,
            contacts: Vec::new(),
        });

        for &child_index in &overlaps {
            let child = compound.children[child_index];
            let child_world_offset = compound_orientation * child.local_pose.position;
            let child_orientation = compound_orientation * child.local_pose.orientation;
            if a_is_compound {
                // The child takes A's slot; contact offsets later rebase
                // from the child's center back onto the compound's.
                self.add_with_continuation(
                    shapes,
                    child.shape,
                    other_index,
                    entry.offset_b - child_world_offset,
                    child_orientation,
                    entry.orientation_b,
                    entry.speculative_margin,
                    PairContinuation::CompoundChild {
                        reduction,
                        child_id: child_index as u32,
                        offset_rebase: child_world_offset,
                    },
                    handler,
                );
            } else {
                self.add_with_continuation(
                    shapes,
                    entry.shape_a,
                    child.shape,
                    entry.offset_b + child_world_offset,
                    entry.orientation_a,
                    child_orientation,
                    entry.speculative_margin,
                    PairContinuation::CompoundChild {
                        reduction,
                        child_id: child_index as u32,
                        offset_rebase: Vec3::ZERO,
                    },
                    handler,
                );
            }
        }
        overlaps.clear();
        self.child_overlaps = overlaps;
    }

    /// Phase two: no new top-level pairs will arrive. Drains every
    /// non-empty bundle, running spawned work until the batcher is empty.
    pub fn flush(&mut self, shapes: &Shapes, handler: &mut dyn ManifoldHandler) {
        loop {
            if !self.compound_pairs.is_empty() {
                self.drain_compound_pairs(shapes, handler);
                continue;
            }
            let next = (0..PAIR_TYPE_COUNT).find(|&index| !self.bundles[index].is_empty());
            match next {
                Some(index) => self.drain_bundle(PairType::from_index(index), handler, shapes),
                None => break,
            }
        }
        debug_assert!(self.reductions.iter().all(Option::is_none));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body_properties::RigidPose;
    use crate::physics::collidables::collidable_reference::{
        CollidableMobility, CollidableReference,
    };
    use crate::physics::collidables::compound::CompoundChild;
    use crate::physics::collidables::shapes::Shape;
    use crate::physics::handles::BodyHandle;

    struct Recorder {
        completed: Vec<(CollidablePair, ContactManifold)>,
    }

    impl ManifoldHandler for Recorder {
        fn on_pair_completed(&mut self, pair: CollidablePair, manifold: &ContactManifold) {
            self.completed.push((pair, *manifold));
        }
    }

    fn settings() -> TesterSettings {
        TesterSettings {
            convergence_threshold: 1e-6,
            minimum_depth_threshold: -1.0,
            depth_refiner_max_iterations: 50,
        }
    }

    fn test_pair(a: i32, b: i32) -> CollidablePair {
        CollidablePair::new(
            CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(a)),
            CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(b)),
        )
    }

    #[test]
    fn partial_bundles_wait_for_flush() {
        let mut shapes = Shapes::new();
        let sphere = shapes.add(Shape::Sphere(Sphere::new(1.0)));
        let mut batcher = CollisionBatcher::new(settings());
        let mut recorder = Recorder {
            completed: Vec::new(),
        };
        batcher.add(
            &shapes,
            test_pair(0, 1),
            sphere,
            sphere,
            Vec3::new(1.9, 0.0, 0.0),
            Quat::IDENTITY,
            Quat::IDENTITY,
            0.1,
            &mut recorder,
        );
        assert!(recorder.completed.is_empty(), "partial bundle must not drain");
        batcher.flush(&shapes, &mut recorder);
        assert_eq!(recorder.completed.len(), 1);
        assert_eq!(recorder.completed[0].1.count, 1);
    }

    #[test]
    fn full_bundles_drain_during_accumulation() {
        let mut shapes = Shapes::new();
        let sphere = shapes.add(Shape::Sphere(Sphere::new(1.0)));
        let mut batcher = CollisionBatcher::new(settings());
        let mut recorder = Recorder {
            completed: Vec::new(),
        };
        for i in 0..LANES as i32 {
            batcher.add(
                &shapes,
                test_pair(i * 2, i * 2 + 1),
                sphere,
                sphere,
                Vec3::new(1.9, 0.0, 0.0),
                Quat::IDENTITY,
                Quat::IDENTITY,
                0.1,
                &mut recorder,
            );
        }
        assert_eq!(recorder.completed.len(), LANES, "full bundle drains eagerly");
    }

    #[test]
    fn mixed_shape_order_normalizes_and_flips_back() {
        let mut shapes = Shapes::new();
        let sphere = shapes.add(Shape::Sphere(Sphere::new(1.0)));
        let box_index = shapes.add(Shape::Box(BoxShape::new(10.0, 0.1, 10.0)));
        let mut batcher = CollisionBatcher::new(settings());
        let mut recorder = Recorder {
            completed: Vec::new(),
        };
        // Box first: the batcher must swap to sphere-box order internally
        // and un-flip the result.
        batcher.add(
            &shapes,
            test_pair(0, 1),
            box_index,
            sphere,
            Vec3::new(0.0, 1.0, 0.0),
            Quat::IDENTITY,
            Quat::IDENTITY,
            0.5,
            &mut recorder,
        );
        batcher.flush(&shapes, &mut recorder);
        assert_eq!(recorder.completed.len(), 1);
        let manifold = &recorder.completed[0].1;
        assert_eq!(manifold.count, 1);
        assert!((manifold.contacts[0].depth - 0.05).abs() < 1e-4);
        // Normal still points from the caller's A (the box) toward B.
        assert!((manifold.normal - Vec3::Y).length() < 1e-3);
    }

    #[test]
    fn compound_expansion_reduces_child_manifolds() {
        let mut shapes = Shapes::new();
        let child_box = BoxShape::new(1.0, 1.0, 1.0);
        let child_shape = shapes.add(Shape::Box(child_box));
        let children = vec![
            CompoundChild {
                local_pose: RigidPose::at(Vec3::new(-1.0, 0.0, 0.0)),
                shape: child_shape,
            },
            CompoundChild {
                local_pose: RigidPose::at(Vec3::new(1.0, 0.0, 0.0)),
                shape: child_shape,
            },
        ];
        let bounds = children
            .iter()
            .map(|child| {
                let (min, max) = child_box.compute_bounds(Quat::IDENTITY);
                (
                    child.local_pose.position + min,
                    child.local_pose.position + max,
                )
            })
            .collect();
        let compound = shapes.add(Shape::Compound(
            Compound::new(children, bounds).unwrap(),
        ));
        let sphere = shapes.add(Shape::Sphere(Sphere::new(0.4)));

        let mut batcher = CollisionBatcher::new(settings());
        let mut recorder = Recorder {
            completed: Vec::new(),
        };
        // Sphere hovering over the right child, just touching.
        batcher.add(
            &shapes,
            test_pair(0, 1),
            compound,
            sphere,
            Vec3::new(1.0, 0.85, 0.0),
            Quat::IDENTITY,
            Quat::IDENTITY,
            0.2,
            &mut recorder,
        );
        batcher.flush(&shapes, &mut recorder);
        assert_eq!(recorder.completed.len(), 1);
        let manifold = &recorder.completed[0].1;
        assert_eq!(manifold.count, 1);
        assert!((manifold.contacts[0].depth - 0.05).abs() < 1e-3);
        // Contact sits on the sphere surface, rebased onto the compound's
        // center.
        assert!((manifold.contacts[0].offset_a - Vec3::new(1.0, 0.45, 0.0)).length() < 2e-2);
        // Feature id carries the child index for cross-frame matching.
        assert_eq!(manifold.contacts[0].feature_id >> 8, 1);
    }
}

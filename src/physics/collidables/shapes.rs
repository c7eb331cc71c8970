use glam::{Quat, Vec3};

use crate::physics::body_properties::BodyInertia;
use crate::physics::collidables::box_shape::BoxShape;
use crate::physics::collidables::capsule::Capsule;
use crate::physics::collidables::compound::Compound;
use crate::physics::collidables::sphere::Sphere;
use crate::physics::collidables::typed_index::TypedIndex;

/// A shape of any registered type. Dispatch throughout the engine happens
/// on the type id carried by `TypedIndex`, never through virtual calls.
#[derive(Clone, Debug)]
pub enum Shape {
    Sphere(Sphere),
    Box(BoxShape),
    Capsule(Capsule),
    Compound(Compound),
}

/// Number of registered shape type ids.
pub const SHAPE_TYPE_COUNT: usize = 4;

/// Per-type shape storage. Adding returns a `TypedIndex` that encodes the
/// type id and slot; lookups dispatch on the type id.
///
/// Shared references suffice for every hot-path read; mutation happens only
/// during scene edits, which exclusive borrows already serialize.
#[derive(Default)]
pub struct Shapes {
    spheres: Vec<Sphere>,
    boxes: Vec<BoxShape>,
    capsules: Vec<Capsule>,
    compounds: Vec<Compound>,
}

impl Shapes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: Shape) -> TypedIndex {
        match shape {
            Shape::Sphere(sphere) => {
                self.spheres.push(sphere);
                TypedIndex::new(Sphere::ID, self.spheres.len() as u32 - 1)
            }
            Shape::Box(box_shape) => {
                self.boxes.push(box_shape);
                TypedIndex::new(BoxShape::ID, self.boxes.len() as u32 - 1)
            }
            Shape::Capsule(capsule) => {
                self.capsules.push(capsule);
                TypedIndex::new(Capsule::ID, self.capsules.len() as u32 - 1)
            }
            Shape::Compound(compound) => {
                self.compounds.push(compound);
                TypedIndex::new(Compound::ID, self.compounds.len() as u32 - 1)
            }
        }
    }

    #[inline(always)]
    pub fn sphere(&self, index: TypedIndex) -> &Sphere {
        debug_assert_eq!(index.type_id(), Sphere::ID);
        &self.spheres[index.index()]
    }

    #[inline(always)]
    pub fn box_shape(&self, index: TypedIndex) -> &BoxShape {
        debug_assert_eq!(index.type_id(), BoxShape::ID);
        &self.boxes[index.index()]
    }

    #[inline(always)]
    pub fn capsule(&self, index: TypedIndex) -> &Capsule {
        debug_assert_eq!(index.type_id(), Capsule::ID);
        &self.capsules[index.index()]
    }

    #[inline(always)]
    pub fn compound(&self, index: TypedIndex) -> &Compound {
        debug_assert_eq!(index.type_id(), Compound::ID);
        &self.compounds[index.index()]
    }

    #[inline(always)]
    pub fn is_convex(type_id: u32) -> bool {
        type_id != Compound::ID
    }

    /// Computes inertia for any shape on demand.
    pub fn compute_inertia(&self, index: TypedIndex, mass: f32) -> BodyInertia {
        match index.type_id() {
            Sphere::ID => self.sphere(index).compute_inertia(mass),
            BoxShape::ID => self.box_shape(index).compute_inertia(mass),
            Capsule::ID => self.capsule(index).compute_inertia(mass),
            Compound::ID => self
                .compound(index)
                .compute_inertia(mass, |child, child_mass| {
                    self.compute_inertia(child, child_mass)
                }),
            _ => unreachable!("unregistered shape type id"),
        }
    }

    /// Bounds of an oriented shape around its own origin.
    pub fn compute_bounds(&self, index: TypedIndex, orientation: Quat) -> (Vec3, Vec3) {
        match index.type_id() {
            Sphere::ID => self.sphere(index).compute_bounds(orientation),
            BoxShape::ID => self.box_shape(index).compute_bounds(orientation),
            Capsule::ID => self.capsule(index).compute_bounds(orientation),
            Compound::ID => {
                let compound = self.compound(index);
                let mut min = Vec3::splat(f32::MAX);
                let mut max = Vec3::splat(f32::MIN);
                for child in &compound.children {
                    let rotated = orientation * child.local_pose.position;
                    let (child_min, child_max) = self.compute_bounds(
                        child.shape,
                        orientation * child.local_pose.orientation,
                    );
                    min = min.min(rotated + child_min);
                    max = max.max(rotated + child_max);
                }
                (min, max)
            }
            _ => unreachable!("unregistered shape type id"),
        }
    }

    /// Maximum distance from the shape origin to its surface.
    pub fn maximum_radius(&self, index: TypedIndex) -> f32 {
        match index.type_id() {
            Sphere::ID => self.sphere(index).maximum_radius(),
            BoxShape::ID => self.box_shape(index).maximum_radius(),
            Capsule::ID => self.capsule(index).maximum_radius(),
            Compound::ID => {
                let compound = self.compound(index);
                compound
                    .children
                    .iter()
                    .map(|child| {
                        child.local_pose.position.length() + self.maximum_radius(child.shape)
                    })
                    .fold(0.0, f32::max)
            }
            _ => unreachable!("unregistered shape type id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_indices_dispatch_to_the_right_registry() {
        let mut shapes = Shapes::new();
        let sphere = shapes.add(Shape::Sphere(Sphere::new(1.0)));
        let box_index = shapes.add(Shape::Box(BoxShape::new(2.0, 4.0, 6.0)));
        assert_eq!(sphere.type_id(), Sphere::ID);
        assert_eq!(shapes.sphere(sphere).radius, 1.0);
        assert_eq!(shapes.box_shape(box_index).half_height, 2.0);
        assert!(Shapes::is_convex(Sphere::ID));
        assert!(!Shapes::is_convex(Compound::ID));
    }

    #[test]
    fn box_bounds_account_for_orientation() {
        let mut shapes = Shapes::new();
        let box_index = shapes.add(Shape::Box(BoxShape::new(2.0, 2.0, 2.0)));
        let (min, max) =
            shapes.compute_bounds(box_index, Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let expected = 2.0f32.sqrt();
        assert!((max.x - expected).abs() < 1e-5);
        assert!((max.y - expected).abs() < 1e-5);
        assert!((max.z - 1.0).abs() < 1e-5);
        assert!((min + max).length() < 1e-5);
    }
}

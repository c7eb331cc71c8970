use glam::Vec3;

use crate::physics::body_properties::{BodyInertia, RigidPose};
use crate::physics::collidables::typed_index::TypedIndex;
use crate::physics::errors::KeelError;

/// One convex member of a compound, positioned in the compound's local frame.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CompoundChild {
    pub local_pose: RigidPose,
    pub shape: TypedIndex,
}

/// Collision shape made of convex children. Compounds never nest: children
/// must reference convex shapes, which construction enforces.
#[derive(Clone, Debug)]
pub struct Compound {
    pub children: Vec<CompoundChild>,
    /// Child bounds in the compound's local frame, aligned with `children`.
    /// Used to prune child pairs during compound-versus-convex expansion.
    pub child_bounds: Vec<(Vec3, Vec3)>,
}

impl Compound {
    /// Type id of compound shapes.
    pub const ID: u32 = 3;

    /// Builds a compound from children and their local-frame bounds.
    /// The child list must be non-empty and all children must be convex.
    pub fn new(
        children: Vec<CompoundChild>,
        child_bounds: Vec<(Vec3, Vec3)>,
    ) -> Result<Self, KeelError> {
        if children.is_empty() {
            return Err(KeelError::ContractViolation(
                "compounds must have at least one child",
            ));
        }
        debug_assert_eq!(children.len(), child_bounds.len());
        if children.iter().any(|child| child.shape.type_id() == Self::ID) {
            return Err(KeelError::ContractViolation(
                "compound children must be convex",
            ));
        }
        Ok(Self {
            children,
            child_bounds,
        })
    }

    /// Appends the indices of children whose local bounds overlap the query
    /// bounds. Linear scan; compounds here are expected to be small.
    pub fn find_overlapping_children(
        &self,
        query_min: Vec3,
        query_max: Vec3,
        overlaps: &mut Vec<usize>,
    ) {
        for (child_index, (min, max)) in self.child_bounds.iter().enumerate() {
            if query_min.cmple(*max).all() && query_max.cmpge(*min).all() {
                overlaps.push(child_index);
            }
        }
    }

    /// Composes inertia from child contributions, treating each child as a
    /// point mass plus its own tensor. Mass is distributed uniformly over
    /// children. Computed on demand; nothing caches the result.
    pub fn compute_inertia(
        &self,
        mass: f32,
        child_inertia: impl Fn(TypedIndex, f32) -> BodyInertia,
    ) -> BodyInertia {
        let child_mass = mass / self.children.len() as f32;
        let mut xx = 0.0f32;
        let mut yy = 0.0;
        let mut zz = 0.0;
        let mut yx = 0.0;
        let mut zx = 0.0;
        let mut zy = 0.0;
        for child in &self.children {
            let inertia = child_inertia(child.shape, child_mass);
            // Invert the child's diagonalish tensor back to moments. The
            // shipped convexes produce diagonal local tensors.
            let offset = child.local_pose.position;
            let o2 = offset * offset;
            xx += 1.0 / inertia.inverse_inertia_tensor.xx + child_mass * (o2.y + o2.z);
            yy += 1.0 / inertia.inverse_inertia_tensor.yy + child_mass * (o2.x + o2.z);
            zz += 1.0 / inertia.inverse_inertia_tensor.zz + child_mass * (o2.x + o2.y);
            yx -= child_mass * offset.x * offset.y;
            zx -= child_mass * offset.x * offset.z;
            zy -= child_mass * offset.y * offset.z;
        }
        // Inverting the full symmetric tensor; off-diagonals are small for
        // typical compounds, so a cofactor inversion is fine.
        let determinant = xx * (yy * zz - zy * zy) - yx * (yx * zz - zy * zx)
            + zx * (yx * zy - yy * zx);
        let inverse_det = 1.0 / determinant;
        let mut inertia = BodyInertia::default();
        inertia.inverse_mass = 1.0 / mass;
        inertia.inverse_inertia_tensor.xx = (yy * zz - zy * zy) * inverse_det;
        inertia.inverse_inertia_tensor.yx = (zx * zy - yx * zz) * inverse_det;
        inertia.inverse_inertia_tensor.yy = (xx * zz - zx * zx) * inverse_det;
        inertia.inverse_inertia_tensor.zx = (yx * zy - zx * yy) * inverse_det;
        inertia.inverse_inertia_tensor.zy = (zx * yx - xx * zy) * inverse_det;
        inertia.inverse_inertia_tensor.zz = (xx * yy - yx * yx) * inverse_det;
        inertia
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_empty_and_nested() {
        assert!(matches!(
            Compound::new(Vec::new(), Vec::new()),
            Err(KeelError::ContractViolation(_))
        ));
        let nested = CompoundChild {
            local_pose: RigidPose::identity(),
            shape: TypedIndex::new(Compound::ID, 0),
        };
        assert!(matches!(
            Compound::new(vec![nested], vec![(Vec3::ZERO, Vec3::ZERO)]),
            Err(KeelError::ContractViolation(_))
        ));
    }
}

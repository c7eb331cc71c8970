use crate::physics::collidables::typed_index::TypedIndex;

/// Continuous collision detection features requested for a collidable.
/// Only discrete detection is active in the pipeline today; the other
/// features are accepted and combined, but not yet acted on.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContinuousDetection {
    /// Requests inner sphere contact generation during fast motion.
    pub inner_sphere: bool,
    /// Requests substepped collision testing during fast motion.
    pub substepping: bool,
}

impl ContinuousDetection {
    pub fn discrete() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn is_discrete(&self) -> bool {
        !self.inner_sphere && !self.substepping
    }

    /// Pairs use the union of both collidables' requested features.
    #[inline(always)]
    pub fn combine(a: &Self, b: &Self) -> Self {
        Self {
            inner_sphere: a.inner_sphere | b.inner_sphere,
            substepping: a.substepping | b.substepping,
        }
    }
}

/// Collision-relevant state attached to a body or static slot.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Collidable {
    /// Shape owned by this collidable.
    pub shape: TypedIndex,
    /// Continuous detection features requested for this collidable.
    pub continuity: ContinuousDetection,
    /// Distance beyond actual contact at which speculative contacts are
    /// created. Nonnegative.
    pub speculative_margin: f32,
}

impl Collidable {
    pub fn new(shape: TypedIndex, speculative_margin: f32) -> Self {
        debug_assert!(speculative_margin >= 0.0);
        Self {
            shape,
            continuity: ContinuousDetection::discrete(),
            speculative_margin,
        }
    }
}

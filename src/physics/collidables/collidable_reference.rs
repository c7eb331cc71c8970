use std::fmt;

use crate::physics::handles::{BodyHandle, StaticHandle};

/// Represents how a collidable can move and interact.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollidableMobility {
    /// Owned by a dynamic body.
    Dynamic = 0,
    /// Owned by a kinematic body: infinite mass, moved by its velocity only.
    Kinematic = 1,
    /// An independent immobile collidable.
    Static = 2,
}

/// Bitpacked reference to a body or static collidable: mobility in the top
/// two bits, owner handle in the low 30.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CollidableReference {
    pub packed: u32,
}

const _: () = {
    assert!(std::mem::size_of::<CollidableReference>() == 4);
};

impl CollidableReference {
    #[inline(always)]
    pub fn body(mobility: CollidableMobility, handle: BodyHandle) -> Self {
        debug_assert!(mobility != CollidableMobility::Static);
        Self::from_raw(mobility, handle.0)
    }

    #[inline(always)]
    pub fn statik(handle: StaticHandle) -> Self {
        Self::from_raw(CollidableMobility::Static, handle.0)
    }

    #[inline(always)]
    fn from_raw(mobility: CollidableMobility, handle: i32) -> Self {
        debug_assert!(
            handle >= 0 && handle < (1 << 30),
            "Do you actually have more than 2^30 collidables?"
        );
        Self {
            packed: ((mobility as u32) << 30) | handle as u32,
        }
    }

    #[inline(always)]
    pub fn mobility(&self) -> CollidableMobility {
        match self.packed >> 30 {
            0 => CollidableMobility::Dynamic,
            1 => CollidableMobility::Kinematic,
            _ => CollidableMobility::Static,
        }
    }

    #[inline(always)]
    pub fn raw_handle_value(&self) -> i32 {
        (self.packed & 0x3FFF_FFFF) as i32
    }

    #[inline(always)]
    pub fn body_handle(&self) -> BodyHandle {
        debug_assert!(
            self.mobility() != CollidableMobility::Static,
            "Extracting a body handle requires that the collidable is owned by a body."
        );
        BodyHandle(self.raw_handle_value())
    }

    #[inline(always)]
    pub fn static_handle(&self) -> StaticHandle {
        debug_assert!(
            self.mobility() == CollidableMobility::Static,
            "Extracting a static handle requires that the collidable is a static."
        );
        StaticHandle(self.raw_handle_value())
    }
}

impl fmt::Debug for CollidableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.mobility() {
            CollidableMobility::Dynamic => "dynamic",
            CollidableMobility::Kinematic => "kinematic",
            CollidableMobility::Static => "static",
        };
        write!(f, "{} {}", prefix, self.raw_handle_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_round_trips() {
        let body = CollidableReference::body(CollidableMobility::Kinematic, BodyHandle(77));
        assert_eq!(body.mobility(), CollidableMobility::Kinematic);
        assert_eq!(body.body_handle(), BodyHandle(77));

        let statik = CollidableReference::statik(StaticHandle(3));
        assert_eq!(statik.mobility(), CollidableMobility::Static);
        assert_eq!(statik.static_handle(), StaticHandle(3));
    }
}

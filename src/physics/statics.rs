use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::collidable::Collidable;
use crate::physics::handles::{HandlePool, StaticHandle};

/// Everything needed to create a static collidable.
#[derive(Clone, Copy, Debug)]
pub struct StaticDescription {
    pub pose: RigidPose,
    pub collidable: Collidable,
}

/// Immobile collidable storage.
pub struct Statics {
    pub poses: Vec<RigidPose>,
    pub collidables: Vec<Collidable>,
    pub index_to_handle: Vec<StaticHandle>,
    handle_to_index: Vec<u32>,
    handle_pool: HandlePool,
}

impl Statics {
    pub fn new() -> Self {
        Self {
            poses: Vec::new(),
            collidables: Vec::new(),
            index_to_handle: Vec::new(),
            handle_to_index: Vec::new(),
            handle_pool: HandlePool::default(),
        }
    }

    pub fn add(&mut self, description: &StaticDescription) -> StaticHandle {
        let handle = StaticHandle(self.handle_pool.take());
        self.poses.push(description.pose);
        self.collidables.push(description.collidable);
        self.index_to_handle.push(handle);
        let slot = handle.0 as usize;
        if slot >= self.handle_to_index.len() {
            self.handle_to_index.resize(slot + 1, u32::MAX);
        }
        self.handle_to_index[slot] = self.poses.len() as u32 - 1;
        handle
    }

    #[inline(always)]
    pub fn index_of(&self, handle: StaticHandle) -> usize {
        self.handle_to_index[handle.0 as usize] as usize
    }

    #[inline(always)]
    pub fn pose(&self, handle: StaticHandle) -> &RigidPose {
        &self.poses[self.index_of(handle)]
    }

    #[inline(always)]
    pub fn collidable(&self, handle: StaticHandle) -> &Collidable {
        &self.collidables[self.index_of(handle)]
    }

    pub fn count(&self) -> usize {
        self.poses.len()
    }
}

impl Default for Statics {
    fn default() -> Self {
        Self::new()
    }
}

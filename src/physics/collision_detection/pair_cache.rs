use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::physics::collidables::collidable_reference::CollidableReference;
use crate::physics::collision_detection::contact_manifold::MAX_CONTACTS;
use crate::physics::errors::KeelError;
use crate::physics::handles::ConstraintHandle;
use crate::utilities::pool::BufferPool;

/// Canonically ordered pair of collidable references; the key for
/// cross-frame persistence.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CollidablePair {
    pub a: CollidableReference,
    pub b: CollidableReference,
}

impl CollidablePair {
    #[inline(always)]
    pub fn new(a: CollidableReference, b: CollidableReference) -> Self {
        Self { a, b }
    }
}

impl Hash for CollidablePair {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        const P1: u64 = 961748927;
        const P2: u64 = 899809343;
        let hash64 = (self.a.packed as u64)
            .wrapping_mul(P1.wrapping_mul(P2))
            .wrapping_add((self.b.packed as u64).wrapping_mul(P2));
        state.write_u64(hash64 ^ (hash64 >> 32));
    }
}

/// Persisted per-pair state: the constraint fed by the pair last frame and
/// the feature ids of its contacts, for frame-to-frame correspondence.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintCache {
    pub constraint_handle: ConstraintHandle,
    pub feature_ids: [u32; MAX_CONTACTS],
    pub contact_count: u32,
}

/// Maps pair identity to constraint handle and persisted scratch across
/// frames.
///
/// During the parallel narrow phase the mapping is read-only; workers
/// accumulate their changes locally and a single-threaded flush applies
/// them. Entries not visited during a frame are stale and are removed by
/// the freshness sweep.
pub struct PairCache {
    keys: Vec<CollidablePair>,
    values: Vec<ConstraintCache>,
    index: HashMap<CollidablePair, usize>,
    /// One byte per mapping slot; 0xFF when the pair was visited this
    /// frame. Sized and zeroed by `prepare`, returned to the pool after
    /// the flush. The freshness sweep reads these eight at a time, which
    /// is why this is a byte buffer rather than a bit set.
    freshness: Vec<u8>,
}

impl PairCache {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            index: HashMap::new(),
            freshness: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// Prepares freshness tracking for a narrow phase execution.
    pub fn prepare(&mut self, pool: &mut BufferPool) -> Result<(), KeelError> {
        debug_assert!(self.freshness.is_empty(), "prepare/postflush must alternate");
        self.freshness = pool.take_at_least(self.keys.len())?;
        Ok(())
    }

    /// Returns the freshness scratch once the flush completes.
    pub fn postflush(&mut self, pool: &mut BufferPool) {
        pool.return_buffer(std::mem::take(&mut self.freshness));
    }

    /// Read-only lookup against the previous frame's mapping. Safe to call
    /// from any worker during the parallel phase.
    #[inline(always)]
    pub fn lookup(&self, pair: &CollidablePair) -> Option<(usize, &ConstraintCache)> {
        self.index
            .get(pair)
            .map(|&slot| (slot, &self.values[slot]))
    }

    #[inline(always)]
    pub fn cache_at(&self, slot: usize) -> &ConstraintCache {
        &self.values[slot]
    }

    /// Flush-time application of a visited pair's new cache state. Marks
    /// the slot fresh so the sweep keeps it.
    pub fn update(&mut self, slot: usize, cache: ConstraintCache) {
        self.values[slot] = cache;
        self.freshness[slot] = 0xFF;
    }

    /// Flush-time insertion of a pair that had no entry last frame.
    pub fn add(&mut self, pair: CollidablePair, cache: ConstraintCache) {
        debug_assert!(!self.index.contains_key(&pair), "pair already mapped");
        self.keys.push(pair);
        self.values.push(cache);
        self.index.insert(pair, self.keys.len() - 1);
    }

    #[inline(always)]
    pub fn freshness_bytes(&self) -> &[u8] {
        &self.freshness
    }

    /// Removes a mapping slot, preserving the dense layout by swapping the
    /// last entry in. Returns the removed entry's constraint handle.
    pub fn remove_at(&mut self, slot: usize) -> ConstraintHandle {
        let removed_pair = self.keys[slot];
        let handle = self.values[slot].constraint_handle;
        self.index.remove(&removed_pair);
        self.keys.swap_remove(slot);
        self.values.swap_remove(slot);
        if !self.freshness.is_empty() {
            self.freshness.swap_remove(slot);
        }
        if slot < self.keys.len() {
            self.index.insert(self.keys[slot], slot);
        }
        handle
    }
}

impl Default for PairCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::collidable_reference::CollidableMobility;
    use crate::physics::handles::BodyHandle;

    fn pair(a: i32, b: i32) -> CollidablePair {
        CollidablePair::new(
            CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(a)),
            CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(b)),
        )
    }

    #[test]
    fn update_marks_fresh_and_stale_entries_survive_removal() {
        let mut pool = BufferPool::new();
        let mut cache = PairCache::new();
        cache.add(
            pair(0, 1),
            ConstraintCache {
                constraint_handle: ConstraintHandle(5),
                ..Default::default()
            },
        );
        cache.add(
            pair(2, 3),
            ConstraintCache {
                constraint_handle: ConstraintHandle(9),
                ..Default::default()
            },
        );
        cache.prepare(&mut pool).unwrap();
        let (slot, _) = cache.lookup(&pair(0, 1)).unwrap();
        cache.update(slot, ConstraintCache {
            constraint_handle: ConstraintHandle(5),
            ..Default::default()
        });
        assert_eq!(cache.freshness_bytes()[slot], 0xFF);

        let (stale_slot, _) = cache.lookup(&pair(2, 3)).unwrap();
        assert_eq!(cache.freshness_bytes()[stale_slot], 0);
        let removed = cache.remove_at(stale_slot);
        assert_eq!(removed, ConstraintHandle(9));
        assert!(cache.lookup(&pair(2, 3)).is_none());
        assert!(cache.lookup(&pair(0, 1)).is_some());
        cache.postflush(&mut pool);
    }
}

use std::fmt;

/// Stable identifier of a body; survives interleaved adds and removals.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BodyHandle(pub i32);

/// Stable identifier of a static collidable.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct StaticHandle(pub i32);

/// Stable identifier of a constraint.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ConstraintHandle(pub i32);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConstraintHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recycling id allocator backing the handle types.
#[derive(Default)]
pub struct HandlePool {
    next: i32,
    free: Vec<i32>,
}

impl HandlePool {
    pub fn take(&mut self) -> i32 {
        match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        }
    }

    pub fn return_id(&mut self, id: i32) {
        debug_assert!(id < self.next, "Returned id was never claimed.");
        self.free.push(id);
    }

    /// Exclusive upper bound on ids that may currently be live. Sizes
    /// handle-indexed side tables.
    pub fn highest_possibly_claimed_id(&self) -> i32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_recycle() {
        let mut pool = HandlePool::default();
        let a = pool.take();
        let b = pool.take();
        assert_ne!(a, b);
        pool.return_id(a);
        assert_eq!(pool.take(), a);
        assert_eq!(pool.highest_possibly_claimed_id(), 2);
    }
}

use crate::physics::errors::KeelError;

/// Recycles byte blocks in power-of-two size classes with take/return
/// semantics. Blocks taken during a phase are returned en masse at flush, so
/// steady-state frames allocate nothing.
#[derive(Default)]
pub struct BufferPool {
    classes: Vec<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn class_index(byte_count: usize) -> usize {
        byte_count.next_power_of_two().trailing_zeros() as usize
    }

    /// Takes a zeroed block of at least `byte_count` bytes.
    pub fn take_at_least(&mut self, byte_count: usize) -> Result<Vec<u8>, KeelError> {
        let class = Self::class_index(byte_count.max(1));
        if class >= self.classes.len() {
            self.classes.resize_with(class + 1, Vec::new);
        }
        let mut block = match self.classes[class].pop() {
            Some(block) => block,
            None => {
                let mut fresh = Vec::new();
                fresh
                    .try_reserve_exact(1usize << class)
                    .map_err(|_| KeelError::ResourceExhaustion {
                        requested_bytes: 1usize << class,
                    })?;
                fresh
            }
        };
        block.clear();
        block.resize(byte_count, 0);
        Ok(block)
    }

    /// Returns a block to its size class for reuse.
    pub fn return_buffer(&mut self, block: Vec<u8>) {
        if block.capacity() == 0 {
            return;
        }
        let class = Self::class_index(block.capacity());
        if class >= self.classes.len() {
            self.classes.resize_with(class + 1, Vec::new);
        }
        self.classes[class].push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_reuses_returned_blocks() {
        let mut pool = BufferPool::new();
        let block = pool.take_at_least(100).unwrap();
        assert_eq!(block.len(), 100);
        let capacity = block.capacity();
        pool.return_buffer(block);
        let again = pool.take_at_least(90).unwrap();
        assert_eq!(again.capacity(), capacity);
        assert!(again.iter().all(|&b| b == 0));
    }
}

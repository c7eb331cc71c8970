use crate::physics::constraints::type_batch::{TypeBatch, CONSTRAINT_TYPE_COUNT};

/// A set of constraints in which each body appears at most once, so every
/// bundle can solve in parallel. Constraints are segregated by type into
/// type batches for lane-coherent execution.
pub struct ConstraintBatch {
    pub type_batches: Vec<TypeBatch>,
    type_id_to_index: [i32; CONSTRAINT_TYPE_COUNT],
}

impl ConstraintBatch {
    pub fn new() -> Self {
        Self {
            type_batches: Vec::new(),
            type_id_to_index: [-1; CONSTRAINT_TYPE_COUNT],
        }
    }

    #[inline(always)]
    pub fn type_batch_index(&self, type_id: u32) -> Option<usize> {
        let index = self.type_id_to_index[type_id as usize];
        (index >= 0).then_some(index as usize)
    }

    pub fn type_batch(&self, type_id: u32) -> Option<&TypeBatch> {
        self.type_batch_index(type_id)
            .map(|index| &self.type_batches[index])
    }

    pub fn type_batch_mut(&mut self, type_id: u32) -> Option<&mut TypeBatch> {
        self.type_batch_index(type_id)
            .map(|index| &mut self.type_batches[index])
    }

    pub fn get_or_create_type_batch(&mut self, type_id: u32) -> &mut TypeBatch {
        let index = match self.type_batch_index(type_id) {
            Some(index) => index,
            None => {
                self.type_batches.push(TypeBatch::new_for_type(type_id));
                let index = self.type_batches.len() - 1;
                self.type_id_to_index[type_id as usize] = index as i32;
                index
            }
        };
        &mut self.type_batches[index]
    }

    /// Drops an emptied type batch, keeping the id-to-index map coherent.
    pub fn remove_type_batch_if_empty(&mut self, type_id: u32) {
        if let Some(index) = self.type_batch_index(type_id) {
            if self.type_batches[index].constraint_count() == 0 {
                self.type_batches.swap_remove(index);
                self.type_id_to_index[type_id as usize] = -1;
                if index < self.type_batches.len() {
                    let moved_type = self.type_batches[index].type_id();
                    self.type_id_to_index[moved_type as usize] = index as i32;
                }
            }
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.type_batches
            .iter()
            .map(TypeBatch::constraint_count)
            .sum()
    }
}

impl Default for ConstraintBatch {
    fn default() -> Self {
        Self::new()
    }
}

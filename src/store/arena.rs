//! # In-Memory Cell Arena
//!
//! `MemArena` is the reference implementation of [`CellStore`]: two slot
//! vectors (one per storage class), a free-slot list so handles get reused,
//! and a dirty-cell set.
//!
//! ## Relocation Policy
//!
//! `resize` always relocates: it allocates a fresh slot, copies the
//! surviving prefix, and frees the old one. The trait permits relocation;
//! making it unconditional keeps every caller honest about writing the new
//! handle back into whatever structure pointed at the old one. A store that
//! resized in place would mask exactly the bug class that is hardest to
//! hit later.
//!
//! ## Allocation Budget
//!
//! `set_alloc_budget` caps how many further allocations (including the
//! allocation half of a resize) succeed before the arena reports
//! [`StoreError::OutOfSpace`]. Structural operations are required to leave
//! the index untouched when an allocation fails mid-flight; the budget
//! makes that property testable at every allocation point.
//!
//! ## Dirty Tracking
//!
//! `mark_dirty` records the cell in a set; `cell_mut` asserts membership in
//! debug builds. The set is observable (`is_dirty`, `dirty_count`) and
//! drainable (`clear_dirty`) so an embedding write-back layer can flush
//! exactly the cells that changed.

use hashbrown::HashSet;

use super::cell::{CellRef, CellStore, StorageClass, StoreError};

#[derive(Debug, Default)]
struct ClassSpace {
    cells: Vec<Option<Vec<u8>>>,
    free_slots: Vec<u32>,
}

impl ClassSpace {
    fn live(&self) -> usize {
        self.cells.iter().filter(|slot| slot.is_some()).count()
    }
}

/// In-memory [`CellStore`] with dirty tracking and failure injection.
#[derive(Debug, Default)]
pub struct MemArena {
    classes: [ClassSpace; StorageClass::COUNT],
    dirty: HashSet<CellRef>,
    alloc_budget: Option<u32>,
}

impl MemArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of further successful allocations. `None` lifts the
    /// cap.
    pub fn set_alloc_budget(&mut self, budget: Option<u32>) {
        self.alloc_budget = budget;
    }

    /// Number of currently allocated cells across both classes.
    pub fn live_cells(&self) -> usize {
        self.classes.iter().map(ClassSpace::live).sum()
    }

    pub fn is_dirty(&self, cell: CellRef) -> bool {
        self.dirty.contains(&cell)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    fn slot_data(&self, cell: CellRef) -> Result<&Vec<u8>, StoreError> {
        if cell.is_nil() {
            return Err(StoreError::Unresolvable(cell));
        }
        self.classes[cell.class().index()]
            .cells
            .get(cell.slot() as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(StoreError::Unresolvable(cell))
    }

    fn charge_allocation(&mut self, size: usize) -> Result<(), StoreError> {
        if let Some(budget) = self.alloc_budget.as_mut() {
            if *budget == 0 {
                return Err(StoreError::OutOfSpace { size });
            }
            *budget -= 1;
        }
        Ok(())
    }
}

impl CellStore for MemArena {
    // the colocation hint is meaningless for an in-memory arena
    fn allocate(
        &mut self,
        size: usize,
        class: StorageClass,
        _near: CellRef,
    ) -> Result<CellRef, StoreError> {
        self.charge_allocation(size)?;
        let space = &mut self.classes[class.index()];
        let slot = match space.free_slots.pop() {
            Some(slot) => {
                space.cells[slot as usize] = Some(vec![0; size]);
                slot
            }
            None => {
                space.cells.push(Some(vec![0; size]));
                (space.cells.len() - 1) as u32
            }
        };
        Ok(CellRef::new(class, slot))
    }

    fn resize(&mut self, cell: CellRef, new_size: usize) -> Result<CellRef, StoreError> {
        let old = self.slot_data(cell)?.clone();
        let moved = self.allocate(new_size, cell.class(), cell)?;
        let keep = old.len().min(new_size);
        let data = self.classes[moved.class().index()].cells[moved.slot() as usize]
            .as_mut()
            .expect("freshly allocated slot");
        data[..keep].copy_from_slice(&old[..keep]);
        self.free(cell);
        self.dirty.insert(moved);
        Ok(moved)
    }

    fn free(&mut self, cell: CellRef) {
        if cell.is_nil() {
            return;
        }
        let space = &mut self.classes[cell.class().index()];
        if let Some(slot) = space.cells.get_mut(cell.slot() as usize) {
            if slot.take().is_some() {
                space.free_slots.push(cell.slot());
            }
        }
        self.dirty.remove(&cell);
    }

    fn cell(&self, cell: CellRef) -> Result<&[u8], StoreError> {
        self.slot_data(cell).map(|data| data.as_slice())
    }

    fn cell_mut(&mut self, cell: CellRef) -> Result<&mut [u8], StoreError> {
        debug_assert!(
            self.dirty.contains(&cell),
            "cell {cell:?} mutated without mark_dirty"
        );
        if cell.is_nil() {
            return Err(StoreError::Unresolvable(cell));
        }
        self.classes[cell.class().index()]
            .cells
            .get_mut(cell.slot() as usize)
            .and_then(|slot| slot.as_mut())
            .map(|data| data.as_mut_slice())
            .ok_or(StoreError::Unresolvable(cell))
    }

    fn cell_size(&self, cell: CellRef) -> Result<usize, StoreError> {
        self.slot_data(cell).map(Vec::len)
    }

    fn mark_dirty(&mut self, cell: CellRef) -> Result<(), StoreError> {
        self.slot_data(cell)?;
        self.dirty.insert(cell);
        Ok(())
    }
}

//! The fixed-capacity PCB pool.
//!
//! Allocation never touches the global allocator on the hot path: every
//! slot is pre-allocated up front in [`PcbPool::new`] and handed out by
//! index from a `Mutex<Vec<u32>>` free list, favoring pre-sized,
//! index-addressed storage over per-task heap churn.

use std::sync::Mutex;

use crate::error::{Result, SchedulerError};
use crate::ids::{CoreId, Pid, PcbId};
use crate::pcb::{Pcb, Priority};

const MIN_STACK_SIZE: usize = 4096;
const MIN_HEAP_SIZE: usize = 4096;

pub struct PcbPool {
    slots: Box<[Pcb]>,
    free: Mutex<Vec<u32>>,
    next_pid: Mutex<u64>,
}

impl PcbPool {
    /// Build a pool with exactly `capacity` pre-allocated, empty slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Pcb::empty);
        let free = (0..capacity as u32).rev().collect();
        Self {
            slots: slots.into_boxed_slice(),
            free: Mutex::new(free),
            next_pid: Mutex::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots remaining. Intended for diagnostics; do not
    /// build allocation decisions on a racy read of this value.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    fn allocate_pid(&self) -> Pid {
        let mut guard = self.next_pid.lock().unwrap();
        let pid = Pid::from_raw(*guard);
        *guard += 1;
        pid
    }

    /// Allocate and initialize a slot.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        &self,
        owning_core: CoreId,
        priority: Priority,
        entry_point: usize,
        stack_size: usize,
        heap_size: usize,
        mailbox_capacity: usize,
    ) -> Result<PcbId> {
        if stack_size < MIN_STACK_SIZE {
            return Err(SchedulerError::InvalidSize { requested: stack_size, minimum: MIN_STACK_SIZE });
        }
        if heap_size < MIN_HEAP_SIZE {
            return Err(SchedulerError::InvalidSize { requested: heap_size, minimum: MIN_HEAP_SIZE });
        }

        let index = self.free.lock().unwrap().pop().ok_or(SchedulerError::Exhausted)?;
        let pid = self.allocate_pid();

        // The free-list invariant guarantees exclusive logical ownership of
        // this slot right now, even though `reset` only needs `&self`
        // thanks to `Pcb`'s interior mutability.
        let slot = &self.slots[index as usize];
        slot.reset(
            pid,
            owning_core,
            priority,
            entry_point,
            0,
            stack_size,
            0,
            heap_size,
            mailbox_capacity,
        );

        Ok(PcbId::new(index))
    }

    /// Return a slot to the free list.
    pub fn free(&self, id: PcbId) -> Result<()> {
        let index = id.index();
        let slot = self.slots.get(index).ok_or(SchedulerError::InvalidPcb)?;
        slot.clear();
        self.free.lock().unwrap().push(index as u32);
        Ok(())
    }

    pub fn get(&self, id: PcbId) -> Option<&Pcb> {
        self.slots.get(id.index())
    }

    /// Grow the pool beyond its initial capacity.
    ///
    /// Real growth (reallocating the slab without invalidating live
    /// [`PcbId`]s held by other cores) is explicitly out of scope.
    /// This always reports failure so callers take the `Exhausted` path
    /// instead of silently blocking.
    pub fn expand_pool(&self, _additional: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_pool_fails_allocation_without_panicking() {
        let pool = PcbPool::new(2);
        pool.allocate(0, Priority::Normal, 0, 8192, 4096, 16).unwrap();
        pool.allocate(0, Priority::Normal, 0, 8192, 4096, 16).unwrap();
        assert_eq!(
            pool.allocate(0, Priority::Normal, 0, 8192, 4096, 16),
            Err(SchedulerError::Exhausted)
        );
    }

    #[test]
    fn freed_slot_is_reusable_and_zeroed() {
        let pool = PcbPool::new(1);
        let first = pool.allocate(0, Priority::Normal, 0x10, 8192, 4096, 16).unwrap();
        let first_pid = pool.get(first).unwrap().pid();
        pool.free(first).unwrap();

        let second = pool.allocate(0, Priority::High, 0x20, 8192, 4096, 16).unwrap();
        assert_eq!(second, first, "pool has one slot, so it must be reused");
        assert_ne!(pool.get(second).unwrap().pid(), first_pid, "pid must not be reused");
    }

    #[test]
    fn rejects_undersized_stack_and_heap() {
        let pool = PcbPool::new(4);
        assert!(matches!(
            pool.allocate(0, Priority::Normal, 0, 64, 4096, 16),
            Err(SchedulerError::InvalidSize { .. })
        ));
        assert!(matches!(
            pool.allocate(0, Priority::Normal, 0, 8192, 64, 16),
            Err(SchedulerError::InvalidSize { .. })
        ));
    }

    #[test]
    fn expand_pool_always_reports_failure() {
        let pool = PcbPool::new(1);
        assert!(!pool.expand_pool(16));
    }
}

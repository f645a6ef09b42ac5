//! Intrusive, doubly-linked waiting queues.
//!
//! A [`crate::kernel::SchedulerState`] keeps one of these per core per
//! blocking reason (Receive / Timer / IO). The links live inside the PCB
//! itself (`Pcb::prev`/`Pcb::next`) rather than in a separate node —
//! index-linked instead of pointer-linked (see `ids.rs`).

use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::ids::PcbId;
use crate::pcb::Pcb;
use crate::pool::PcbPool;

/// Inline capacity for [`IntrusiveQueue::drain_matching`]'s result: most
/// `check_timer_wakeups` calls free a handful of timers at a time, so this
/// avoids a heap allocation on the common case.
const DRAIN_INLINE: usize = 8;

/// FIFO queue of [`PcbId`]s, linked through the PCBs' own `prev`/`next`
/// fields. Insertion order is preserved; removal from the middle is O(1)
/// once the node is located (no O(n) search beyond the initial lookup).
pub struct IntrusiveQueue {
    head: Option<PcbId>,
    tail: Option<PcbId>,
    len: usize,
}

impl IntrusiveQueue {
    pub const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node<'a>(pool: &'a PcbPool, id: PcbId) -> &'a Pcb {
        pool.get(id).expect("queue holds a PcbId freed while still linked")
    }

    pub fn push_back(&mut self, pool: &PcbPool, id: PcbId) {
        let node = Self::node(pool, id);
        node.prev.store(self.tail, Ordering::Relaxed);
        node.next.store(None, Ordering::Relaxed);
        if let Some(tail) = self.tail {
            Self::node(pool, tail).next.store(Some(id), Ordering::Relaxed);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        self.len += 1;
    }

    pub fn pop_front(&mut self, pool: &PcbPool) -> Option<PcbId> {
        let id = self.head?;
        self.remove(pool, id);
        Some(id)
    }

    /// Remove `id` from wherever it sits in the queue. No-op if `id` is not
    /// actually linked into this queue (callers are expected to know, but
    /// this stays defensive rather than asserting, since a racing wakeup
    /// from another core is a normal occurrence, not a bug).
    pub fn remove(&mut self, pool: &PcbPool, id: PcbId) {
        let node = Self::node(pool, id);
        let prev = node.prev.load(Ordering::Relaxed);
        let next = node.next.load(Ordering::Relaxed);

        match prev {
            Some(prev_id) => Self::node(pool, prev_id).next.store(next, Ordering::Relaxed),
            None => {
                if self.head != Some(id) {
                    return;
                }
                self.head = next;
            }
        }
        match next {
            Some(next_id) => Self::node(pool, next_id).prev.store(prev, Ordering::Relaxed),
            None => {
                if self.tail == Some(id) {
                    self.tail = prev;
                }
            }
        }

        node.prev.store(None, Ordering::Relaxed);
        node.next.store(None, Ordering::Relaxed);
        self.len = self.len.saturating_sub(1);
    }

    /// Pop every entry for which `predicate` holds, preserving the relative
    /// FIFO order of the matches.
    pub fn drain_matching(
        &mut self,
        pool: &PcbPool,
        mut predicate: impl FnMut(&Pcb) -> bool,
    ) -> SmallVec<[PcbId; DRAIN_INLINE]> {
        let mut matched = SmallVec::new();
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = Self::node(pool, id);
            cursor = node.next.load(Ordering::Relaxed);
            if predicate(node) {
                matched.push(id);
            }
        }
        for id in &matched {
            self.remove(pool, *id);
        }
        matched
    }

    pub fn iter<'a>(&'a self, pool: &'a PcbPool) -> impl Iterator<Item = PcbId> + 'a {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = Self::node(pool, id).next.load(Ordering::Relaxed);
            Some(id)
        })
    }
}

impl Default for IntrusiveQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::Priority;

    fn pool_with(n: usize) -> (PcbPool, Vec<PcbId>) {
        let pool = PcbPool::new(n);
        let ids = (0..n).map(|_| pool.allocate(0, Priority::Normal, 0, 8192, 4096, 16).unwrap()).collect();
        (pool, ids)
    }

    #[test]
    fn fifo_order_preserved() {
        let (pool, ids) = pool_with(3);
        let mut q = IntrusiveQueue::new();
        for &id in &ids {
            q.push_back(&pool, id);
        }
        assert_eq!(q.len(), 3);
        for &expected in &ids {
            assert_eq!(q.pop_front(&pool), Some(expected));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn remove_from_the_middle_preserves_the_rest() {
        let (pool, ids) = pool_with(3);
        let mut q = IntrusiveQueue::new();
        for &id in &ids {
            q.push_back(&pool, id);
        }
        q.remove(&pool, ids[1]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_front(&pool), Some(ids[0]));
        assert_eq!(q.pop_front(&pool), Some(ids[2]));
    }

    #[test]
    fn remove_of_an_unlinked_id_is_a_noop() {
        let (pool, ids) = pool_with(2);
        let mut q = IntrusiveQueue::new();
        q.push_back(&pool, ids[0]);
        q.remove(&pool, ids[1]); // never linked
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_matching_keeps_relative_order_of_matches() {
        let (pool, ids) = pool_with(4);
        for (i, &id) in ids.iter().enumerate() {
            // Mark every other pcb High so the predicate can tell them apart.
            let priority = if i % 2 == 0 { Priority::High } else { Priority::Normal };
            pool.get(id).unwrap().set_priority(priority);
        }
        let mut q = IntrusiveQueue::new();
        for &id in &ids {
            q.push_back(&pool, id);
        }
        let matched = q.drain_matching(&pool, |pcb| pcb.priority() == Priority::High);
        assert_eq!(matched.as_slice(), &[ids[0], ids[2]]);
        assert_eq!(q.len(), 2);
    }
}

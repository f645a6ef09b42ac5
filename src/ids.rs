//! Identifier types shared across the crate.
//!
//! PCBs are never referenced by pointer — only by [`PcbId`], a plain index
//! into a [`crate::pool::PcbPool`] slab. This is the central representation
//! decision recorded in DESIGN.md: it lets the pool grow or shrink slots
//! without invalidating anything a caller is holding, and it keeps every
//! queue a plain index-linked list instead of a pointer-linked one.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// Sequential identifier for a hardware core / scheduler instance.
pub type CoreId = u32;

/// Sentinel meaning "no core" where an `Option<CoreId>` would otherwise be
/// used in a hot atomic field.
pub const NO_CORE: CoreId = CoreId::MAX;

/// Unique, monotonically assigned process identifier.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u64);

impl Pid {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a PCB slot inside a [`crate::pool::PcbPool`].
///
/// `PcbId` is a plain slab index, never a pointer; see the module
/// documentation.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PcbId(u32);

impl PcbId {
    const NONE: u32 = u32::MAX;

    pub(crate) const fn new(index: u32) -> Self {
        debug_assert!(index != Self::NONE, "PcbId index collides with the None sentinel");
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Encode `Option<PcbId>` into a raw `u32` suitable for an `AtomicU32`.
    pub(crate) fn encode(id: Option<PcbId>) -> u32 {
        id.map_or(Self::NONE, |id| id.0)
    }

    /// Decode a raw `u32` previously produced by [`PcbId::encode`].
    pub(crate) fn decode(raw: u32) -> Option<PcbId> {
        if raw == Self::NONE {
            None
        } else {
            Some(PcbId(raw))
        }
    }
}

impl fmt::Debug for PcbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PcbId({})", self.0)
    }
}

/// An `AtomicU32` specialized to hold `Option<PcbId>`, used for intrusive
/// queue links and "current process" slots.
pub(crate) struct AtomicPcbId(AtomicU32);

impl AtomicPcbId {
    pub(crate) const fn none() -> Self {
        Self(AtomicU32::new(PcbId::NONE))
    }

    pub(crate) fn load(&self, order: Ordering) -> Option<PcbId> {
        PcbId::decode(self.0.load(order))
    }

    pub(crate) fn store(&self, value: Option<PcbId>, order: Ordering) {
        self.0.store(PcbId::encode(value), order);
    }

    pub(crate) fn swap(&self, value: Option<PcbId>, order: Ordering) -> Option<PcbId> {
        PcbId::decode(self.0.swap(PcbId::encode(value), order))
    }

    /// Compare-and-swap on the encoded representation.
    pub(crate) fn compare_exchange(
        &self,
        current: Option<PcbId>,
        new: Option<PcbId>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Option<PcbId>, Option<PcbId>> {
        self.0
            .compare_exchange(PcbId::encode(current), PcbId::encode(new), success, failure)
            .map(PcbId::decode)
            .map_err(PcbId::decode)
    }
}

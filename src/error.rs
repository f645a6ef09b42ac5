//! Recoverable error kinds.
//!
//! Every variant here is recovered locally by some caller in this crate —
//! none of them is allowed to propagate into a panic. Conditions that really
//! are unreachable for a well-formed caller (corrupted queue invariants) use
//! `debug_assert!`/`unreachable!` instead of this enum, matching the
//! teacher's own use of `unreachable!()` in `BlockedTaskQueue::custom_wakeup`.

use thiserror::Error;

use crate::ids::CoreId;

/// Recoverable scheduler failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// `core` was not in `[0, MAX_CORES)` or exceeds the configured core count.
    #[error("invalid core id {0}")]
    InvalidCore(CoreId),

    /// A PCB reference did not resolve to a live, allocated slot.
    #[error("invalid or freed PCB reference")]
    InvalidPcb,

    /// A priority value was not one of Max/High/Normal/Low.
    #[error("invalid priority {0}")]
    InvalidPriority(u8),

    /// A requested stack or heap size was below the runtime minimum.
    #[error("requested size {requested} is below the minimum {minimum}")]
    InvalidSize { requested: usize, minimum: usize },

    /// The PCB pool (or a work-stealing deque) had no room left.
    #[error("pool or queue exhausted")]
    Exhausted,

    /// The target core is not in the process's affinity mask.
    #[error("core {core} is not in the process's affinity mask")]
    AffinityViolation { core: CoreId },

    /// The process has already been migrated `MAX_MIGRATIONS` times.
    #[error("migration cap reached")]
    MigrationCapReached,

    /// A BIF's reduction cost exceeded the process's remaining budget.
    #[error("insufficient reductions: needed {needed}, had {available}")]
    InsufficientReductions { needed: u32, available: u32 },

    /// `block_on_timer` was asked to block longer than `MAX_BLOCKING_TIME`.
    #[error("timeout {requested} exceeds the maximum blocking time {max}")]
    Timeout { requested: u64, max: u64 },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, SchedulerError>;

//! Scheduler-wide constants.
//!
//! These mirror the constants the scheduler exposes to embedders. Each
//! one can still be overridden per-instance via
//! [`crate::kernel::SchedulerConfig`]; the values here are the defaults.

use crate::ids::CoreId;

/// Maximum number of scheduler instances (hardware cores) supported.
pub const MAX_CORES: CoreId = 128;

/// Number of ready-queue priority levels (Max, High, Normal, Low).
pub const NUM_PRIORITIES: usize = 4;

/// Reduction budget handed to a process on every fresh dispatch.
pub const DEFAULT_REDUCTIONS: u32 = 2000;

/// Informational: bytes per PCB in the source layout this crate is modeled
/// on. Rust's representation of [`crate::pcb::Pcb`] does not attempt to
/// match this exactly (see DESIGN.md) — it is kept as a contract constant
/// because embedders may size external bookkeeping off of it.
pub const PCB_SIZE: usize = 512;

/// Upper bound, in ticks, on a single `block_on_timer` request.
///
/// Not prescribed by any particular wire format — fixed here at one hour
/// assuming a 1 kHz tick source. See DESIGN.md.
pub const MAX_BLOCKING_TIME: u64 = 3_600_000;

/// Per-process cap on cross-core migrations via work stealing.
pub const MAX_MIGRATIONS: u32 = 10;

/// Minimum number of ready PCBs a victim must hold before it is worth
/// attempting a steal against it.
pub const MIN_STEAL_QUEUE: usize = 2;

/// Priority-weighted load factors used by [`crate::stealing::get_scheduler_load`],
/// indexed the same way as [`crate::pcb::Priority::index`] (Max, High, Normal, Low).
pub const PRIORITY_WEIGHTS: [u32; NUM_PRIORITIES] = [4, 3, 2, 1];

/// Upper bound on how many distinct victims a single `try_steal` call will
/// probe before giving up.
pub const MAX_STEAL_ATTEMPTS: usize = 4;

/// How the work-stealing engine picks a victim core.
///
/// The source chose this at compile time; this
/// crate resolves that into an explicit runtime setting instead, recorded
/// as a DESIGN.md decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VictimStrategy {
    Random,
    ByLoad,
    Locality,
}

/// Per-instance overrides for every constant above.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub default_reductions: u32,
    pub max_blocking_time: u64,
    pub max_migrations: u32,
    pub min_steal_queue: usize,
    pub max_steal_attempts: usize,
    pub victim_strategy: VictimStrategy,
    pub mailbox_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_reductions: DEFAULT_REDUCTIONS,
            max_blocking_time: MAX_BLOCKING_TIME,
            max_migrations: MAX_MIGRATIONS,
            min_steal_queue: MIN_STEAL_QUEUE,
            max_steal_attempts: MAX_STEAL_ATTEMPTS,
            victim_strategy: VictimStrategy::ByLoad,
            mailbox_capacity: 64,
        }
    }
}

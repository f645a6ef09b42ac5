//! The Process Control Block and the small types it's built from.
//!
//! Every field that a PCB's owning core touches on the hot path is a plain
//! atomic so that a shared `&Pcb` is enough for every operation in this
//! crate — there is no interior `unsafe` anywhere in this module. Larger,
//! cold-path fields (`saved_context`, `blocking_data`) sit behind a small
//! `Mutex` rather than trying to make everything lock-free.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::error::{Result, SchedulerError};
use crate::ids::{AtomicPcbId, CoreId, Pid, PcbId, NO_CORE};
use crate::mailbox::{Mailbox, Pattern};

/// Lifecycle state of a process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Created = 0,
    Ready = 1,
    Running = 2,
    Waiting = 3,
    Suspended = 4,
    Terminated = 5,
}

impl ProcessState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Waiting,
            4 => Self::Suspended,
            _ => Self::Terminated,
        }
    }
}

/// Scheduling priority. `Max` always wins ties against lower priorities;
/// within one priority, FIFO (insertion) order decides.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    Max = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

/// All priorities, highest first — the order `schedule` scans in.
pub const PRIORITIES: [Priority; 4] = [Priority::Max, Priority::High, Priority::Normal, Priority::Low];

impl Priority {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Max),
            1 => Ok(Self::High),
            2 => Ok(Self::Normal),
            3 => Ok(Self::Low),
            other => Err(SchedulerError::InvalidPriority(other)),
        }
    }
}

/// Why a process is sitting in a waiting queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockingReason {
    None = 0,
    Receive = 1,
    Timer = 2,
    Io = 3,
}

impl BlockingReason {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Receive,
            2 => Self::Timer,
            3 => Self::Io,
            _ => Self::None,
        }
    }

    /// Index into a core's `[waiting; 3]` array, for the reasons that
    /// actually have a waiting queue.
    pub(crate) fn queue_index(self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Receive => Some(0),
            Self::Timer => Some(1),
            Self::Io => Some(2),
        }
    }
}

/// Saved integer register file, stack pointer, link register, program
/// counter and flags — opaque payload for the embedder's context-switch
/// primitive, which this crate never inspects.
#[derive(Clone, Debug, Default)]
pub struct SavedContext {
    pub registers: [u64; 16],
    pub stack_pointer: u64,
    pub link_register: u64,
    pub program_counter: u64,
    pub flags: u64,
}

/// Extra data associated with a blocking reason: the pattern a `Receive`
/// block is waiting on, or the descriptor an `Io` block is waiting on.
#[derive(Clone, Debug, Default)]
pub struct BlockingData {
    pub receive_pattern: Option<Pattern>,
    pub io_descriptor: Option<u64>,
}

/// A bump-allocated stack or heap region.
pub struct Region {
    base: AtomicUsize,
    size: AtomicUsize,
    limit: AtomicUsize,
    ptr: AtomicUsize,
}

impl Region {
    pub fn new(base: usize, size: usize) -> Self {
        Self {
            base: AtomicUsize::new(base),
            size: AtomicUsize::new(size),
            limit: AtomicUsize::new(base + size),
            ptr: AtomicUsize::new(base),
        }
    }

    fn reset(&self, base: usize, size: usize) {
        self.base.store(base, Ordering::Relaxed);
        self.size.store(size, Ordering::Relaxed);
        self.limit.store(base + size, Ordering::Relaxed);
        self.ptr.store(base, Ordering::Relaxed);
    }

    pub fn base(&self) -> usize {
        self.base.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn ptr(&self) -> usize {
        self.ptr.load(Ordering::Relaxed)
    }

    /// Bump the region's pointer by `amount`. Fails without mutating state
    /// if that would exceed `limit`.
    pub fn bump(&self, amount: usize) -> Result<usize> {
        let limit = self.limit.load(Ordering::Relaxed);
        let mut current = self.ptr.load(Ordering::Relaxed);
        loop {
            let next = current
                .checked_add(amount)
                .filter(|&n| n <= limit)
                .ok_or(SchedulerError::Exhausted)?;
            match self
                .ptr
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(current),
                Err(observed) => current = observed,
            }
        }
    }
}

/// A bitset of cores a process may run on, up to [`crate::config::MAX_CORES`].
pub struct AffinityMask([AtomicU64; 2]);

impl AffinityMask {
    pub fn all() -> Self {
        Self([AtomicU64::new(u64::MAX), AtomicU64::new(u64::MAX)])
    }

    pub fn single(core: CoreId) -> Self {
        let mask = Self([AtomicU64::new(0), AtomicU64::new(0)]);
        mask.insert(core);
        mask
    }

    fn word_and_bit(core: CoreId) -> (usize, u32) {
        ((core / 64) as usize, core % 64)
    }

    pub fn contains(&self, core: CoreId) -> bool {
        let (word, bit) = Self::word_and_bit(core);
        word < 2 && (self.0[word].load(Ordering::Relaxed) & (1u64 << bit)) != 0
    }

    pub fn insert(&self, core: CoreId) {
        let (word, bit) = Self::word_and_bit(core);
        if word < 2 {
            self.0[word].fetch_or(1u64 << bit, Ordering::Relaxed);
        }
    }

    pub fn set(&self, mask: u128) {
        self.0[0].store(mask as u64, Ordering::Relaxed);
        self.0[1].store((mask >> 64) as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u128 {
        (self.0[0].load(Ordering::Relaxed) as u128) | ((self.0[1].load(Ordering::Relaxed) as u128) << 64)
    }
}

/// The Process Control Block.
pub struct Pcb {
    pid_cell: AtomicU64,
    owning_core: AtomicU32,
    state: AtomicU8,
    priority: AtomicU8,
    reduction_count: AtomicU32,
    saved_context: Mutex<SavedContext>,
    pub stack: Region,
    pub heap: Region,
    pub mailbox: Mailbox,
    pub affinity_mask: AffinityMask,
    migration_count: AtomicU32,
    last_scheduled: AtomicU64,
    blocking_reason: AtomicU8,
    blocking_data: Mutex<BlockingData>,
    wake_time: AtomicU64,
    entry_point: AtomicUsize,
    pub(crate) prev: AtomicPcbId,
    pub(crate) next: AtomicPcbId,
}

const NO_WAKE_TIME: u64 = u64::MAX;

impl Pcb {
    /// A zeroed, `Terminated` slot — used only to pre-fill the pool.
    pub(crate) fn empty() -> Self {
        Self {
            pid_cell: AtomicU64::new(0),
            owning_core: AtomicU32::new(NO_CORE),
            state: AtomicU8::new(ProcessState::Terminated as u8),
            priority: AtomicU8::new(Priority::Normal as u8),
            reduction_count: AtomicU32::new(0),
            saved_context: Mutex::new(SavedContext::default()),
            stack: Region::new(0, 0),
            heap: Region::new(0, 0),
            mailbox: Mailbox::new(0),
            affinity_mask: AffinityMask::all(),
            migration_count: AtomicU32::new(0),
            last_scheduled: AtomicU64::new(0),
            blocking_reason: AtomicU8::new(BlockingReason::None as u8),
            blocking_data: Mutex::new(BlockingData::default()),
            wake_time: AtomicU64::new(NO_WAKE_TIME),
            entry_point: AtomicUsize::new(0),
            prev: AtomicPcbId::none(),
            next: AtomicPcbId::none(),
        }
    }

    /// Re-initialize a freshly-allocated slot in place.
    ///
    /// Takes `&self`, not `&mut self`: every field is interior-mutable, so
    /// the pool can call this through a shared reference while a slot's
    /// index is exclusively held via the free-list invariant, without any
    /// `unsafe` aliasing games.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reset(
        &self,
        pid: Pid,
        owning_core: CoreId,
        priority: Priority,
        entry_point: usize,
        stack_base: usize,
        stack_size: usize,
        heap_base: usize,
        heap_size: usize,
        mailbox_capacity: usize,
    ) {
        self.pid_cell.store(pid.as_u64(), Ordering::Relaxed);
        self.owning_core.store(owning_core, Ordering::Relaxed);
        self.state.store(ProcessState::Created as u8, Ordering::Relaxed);
        self.priority.store(priority as u8, Ordering::Relaxed);
        self.reduction_count.store(0, Ordering::Relaxed);
        *self.saved_context.lock().unwrap() = SavedContext::default();
        self.stack.reset(stack_base, stack_size);
        self.heap.reset(heap_base, heap_size);
        self.mailbox.reset(mailbox_capacity);
        self.affinity_mask.set(u128::MAX);
        self.migration_count.store(0, Ordering::Relaxed);
        self.last_scheduled.store(0, Ordering::Relaxed);
        self.blocking_reason.store(BlockingReason::None as u8, Ordering::Relaxed);
        *self.blocking_data.lock().unwrap() = BlockingData::default();
        self.wake_time.store(NO_WAKE_TIME, Ordering::Relaxed);
        self.entry_point.store(entry_point, Ordering::Relaxed);
        self.prev.store(None, Ordering::Relaxed);
        self.next.store(None, Ordering::Relaxed);
    }

    /// Zero out a slot being returned to the free list.
    pub(crate) fn clear(&self) {
        self.reset(Pid::from_raw(0), NO_CORE, Priority::Normal, 0, 0, 0, 0, 0, 0);
        self.state.store(ProcessState::Terminated as u8, Ordering::Relaxed);
    }

    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.pid_cell.load(Ordering::Relaxed))
    }

    pub fn entry_point(&self) -> usize {
        self.entry_point.load(Ordering::Relaxed)
    }

    pub fn owning_core(&self) -> CoreId {
        self.owning_core.load(Ordering::Acquire)
    }

    pub(crate) fn set_owning_core(&self, core: CoreId) {
        self.owning_core.store(core, Ordering::Release);
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically transition `Waiting -> Ready`. Returns `false` without
    /// side effects if the PCB was not `Waiting` — this is what makes
    /// `wake` idempotent even when two cores race to wake the same PCB
    ///.
    pub(crate) fn try_begin_wake(&self) -> bool {
        self.state
            .compare_exchange(
                ProcessState::Waiting as u8,
                ProcessState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn priority(&self) -> Priority {
        match self.priority.load(Ordering::Acquire) {
            0 => Priority::Max,
            1 => Priority::High,
            2 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    pub fn reductions(&self) -> u32 {
        self.reduction_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_reductions(&self, value: u32) {
        self.reduction_count.store(value, Ordering::Relaxed);
    }

    /// Decrement the reduction budget by one, saturating at zero. Returns
    /// the value *after* the decrement.
    pub(crate) fn decrement_reductions(&self) -> u32 {
        let mut current = self.reduction_count.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(1);
            match self.reduction_count.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Deduct `cost` reductions if the budget covers it.
    pub(crate) fn try_deduct(&self, cost: u32) -> bool {
        let mut current = self.reduction_count.load(Ordering::Relaxed);
        loop {
            if current < cost {
                return false;
            }
            match self.reduction_count.compare_exchange_weak(
                current,
                current - cost,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&mut SavedContext) -> R) -> R {
        f(&mut self.saved_context.lock().unwrap())
    }

    pub fn migration_count(&self) -> u32 {
        self.migration_count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_migrations(&self) -> u32 {
        self.migration_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last_scheduled(&self) -> u64 {
        self.last_scheduled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_last_scheduled(&self, tick: u64) {
        self.last_scheduled.store(tick, Ordering::Relaxed);
    }

    pub fn blocking_reason(&self) -> BlockingReason {
        BlockingReason::from_u8(self.blocking_reason.load(Ordering::Acquire))
    }

    pub(crate) fn set_blocking_reason(&self, reason: BlockingReason) {
        self.blocking_reason.store(reason as u8, Ordering::Release);
    }

    pub fn with_blocking_data<R>(&self, f: impl FnOnce(&mut BlockingData) -> R) -> R {
        f(&mut self.blocking_data.lock().unwrap())
    }

    pub fn wake_time(&self) -> Option<u64> {
        match self.wake_time.load(Ordering::Relaxed) {
            NO_WAKE_TIME => None,
            t => Some(t),
        }
    }

    pub(crate) fn set_wake_time(&self, time: Option<u64>) {
        self.wake_time.store(time.unwrap_or(NO_WAKE_TIME), Ordering::Relaxed);
    }

    pub(crate) fn prev(&self) -> Option<PcbId> {
        self.prev.load(Ordering::Relaxed)
    }

    pub(crate) fn next(&self) -> Option<PcbId> {
        self.next.load(Ordering::Relaxed)
    }
}

//! Per-core scheduler state and the scheduler kernel itself.
//!
//! One [`CoreState`] exists per hardware core, pre-allocated together in
//! [`SchedulerState::new`] as a vector indexed by core id. A core's own
//! thread reads and mutates its `CoreState` without locks; the only
//! cross-core traffic is the `inbound` channel (wakes and steal
//! give-backs) and the `Stealer` half of its ready queues.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_deque::{Stealer, Worker};
use crossbeam_utils::CachePadded;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};

use crate::affinity::Topology;
use crate::config::{NUM_PRIORITIES, SchedulerConfig};
use crate::error::{Result, SchedulerError};
use crate::ids::{AtomicPcbId, CoreId, PcbId};
use crate::mailbox::{Message, Pattern};
use crate::pcb::{BlockingReason, PRIORITIES, Priority, ProcessState};
use crate::pool::PcbPool;
use crate::queue::IntrusiveQueue;

/// A cross-core request delivered through a core's `inbound` channel. Both
/// variants exist so that no thread other than a core's own ever mutates
/// that core's ready or waiting queues directly.
pub(crate) enum CrossCoreSignal {
    /// `pcb` was already flipped `Waiting -> Ready` by the waker (see
    /// [`crate::pcb::Pcb::try_begin_wake`]); the owning core still needs to
    /// unlink it from its waiting queue and push it onto its ready queue.
    Wake(PcbId),
    /// A steal picked up `pcb` but the steal was disallowed (affinity or
    /// migration cap); hand it back to the victim's ready queue.
    Return(PcbId),
}

/// Per-core counters").
#[derive(Default)]
pub struct CoreStats {
    scheduled: AtomicU64,
    yields: AtomicU64,
    migrations: AtomicU64,
    steals: AtomicU64,
}

impl CoreStats {
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn yields(&self) -> u64 {
        self.yields.load(Ordering::Relaxed)
    }

    pub fn migrations(&self) -> u64 {
        self.migrations.load(Ordering::Relaxed)
    }

    pub fn steals(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    pub(crate) fn record_migration(&self) {
        self.migrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.steals.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything one hardware core's scheduler thread owns outright.
///
/// The owner side of each ready queue (`Worker<PcbId>`) is wrapped in a
/// `Mutex`: `crossbeam_deque::Worker` is `Send` but deliberately not
/// `Sync` (it documents itself as single-owner-only), so it cannot sit
/// bare inside a struct reachable via `&SchedulerState` from more than one
/// thread. In normal operation only the owning core's thread ever locks
/// its own `ready[priority]`, so the mutex sees no contention — the
/// lock-free Chase-Lev protocol is still what makes the *thief* side
/// (`Stealer`, held in [`SchedulerState::stealers`]) concurrent.
pub(crate) struct CoreState {
    core_id: CoreId,
    ready: [Mutex<Worker<PcbId>>; NUM_PRIORITIES],
    current: AtomicPcbId,
    waiting: [Mutex<IntrusiveQueue>; 3],
    inbound_tx: Sender<CrossCoreSignal>,
    inbound_rx: Receiver<CrossCoreSignal>,
    stats: CoreStats,
}

/// Owns every per-core scheduler instance plus the PCB pool and topology
/// they share. This is the crate's top-level handle: one instance per
/// scheduled runtime.
pub struct SchedulerState {
    cores: Box<[CachePadded<CoreState>]>,
    stealers: Box<[Box<[Stealer<PcbId>]>]>,
    pool: PcbPool,
    topology: Topology,
    config: SchedulerConfig,
    clock: AtomicU64,
    rng_counter: AtomicU64,
}

impl SchedulerState {
    /// `scheduler_state_init`: build `num_cores` per-core records
    /// and a PCB pool of `pool_capacity` slots up front. Every core id in
    /// `[0, num_cores)` is valid for every other operation in this module
    /// from the moment this returns.
    pub fn new(num_cores: usize, pool_capacity: usize, topology: Topology, config: SchedulerConfig) -> Result<Self> {
        if num_cores == 0 || num_cores > crate::config::MAX_CORES as usize {
            return Err(SchedulerError::InvalidCore(num_cores as CoreId));
        }
        debug_assert_eq!(topology.num_cores(), num_cores, "topology must describe exactly num_cores cores");

        let mut cores = Vec::with_capacity(num_cores);
        let mut stealers = Vec::with_capacity(num_cores);
        for core_id in 0..num_cores as CoreId {
            let workers: Vec<Worker<PcbId>> = (0..NUM_PRIORITIES).map(|_| Worker::new_fifo()).collect();
            let core_stealers: Vec<Stealer<PcbId>> = workers.iter().map(Worker::stealer).collect();
            let ready: Vec<Mutex<Worker<PcbId>>> = workers.into_iter().map(Mutex::new).collect();
            let ready: [Mutex<Worker<PcbId>>; NUM_PRIORITIES] =
                ready.try_into().unwrap_or_else(|_| unreachable!("NUM_PRIORITIES workers built above"));
            let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();

            cores.push(CachePadded::new(CoreState {
                core_id,
                ready,
                current: AtomicPcbId::none(),
                waiting: [
                    Mutex::new(IntrusiveQueue::new()),
                    Mutex::new(IntrusiveQueue::new()),
                    Mutex::new(IntrusiveQueue::new()),
                ],
                inbound_tx,
                inbound_rx,
                stats: CoreStats::default(),
            }));
            stealers.push(core_stealers.into_boxed_slice());
        }

        Ok(Self {
            cores: cores.into_boxed_slice(),
            stealers: stealers.into_boxed_slice(),
            pool: PcbPool::new(pool_capacity),
            topology,
            config,
            clock: AtomicU64::new(0),
            rng_counter: AtomicU64::new(0),
        })
    }

    /// `scheduler_init(state, core)`: validates that `core` is one
    /// of the cores `new` pre-allocated. Every core's state already exists
    /// by construction, so this is purely a validation hook for embedders
    /// that want to fail fast before pinning a thread to an unknown core.
    pub fn scheduler_init(&self, core: CoreId) -> Result<()> {
        self.core(core).map(|_| ())
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    pub fn pool(&self) -> &PcbPool {
        &self.pool
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self, core: CoreId) -> Result<&CoreStats> {
        Ok(&self.core(core)?.stats)
    }

    /// Advance the monotonic tick source by one and return the new value
    ///` input").
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub(crate) fn core(&self, core: CoreId) -> Result<&CachePadded<CoreState>> {
        self.cores.get(core as usize).ok_or(SchedulerError::InvalidCore(core))
    }

    pub(crate) fn stealers_for(&self, core: CoreId) -> Result<&[Stealer<PcbId>]> {
        self.stealers.get(core as usize).map(|s| &**s).ok_or(SchedulerError::InvalidCore(core))
    }

    pub(crate) fn next_random_u64(&self) -> u64 {
        self.rng_counter.fetch_add(1, Ordering::Relaxed)
    }

    // ---- Process lifecycle --------------------------------

    /// `process_create`: allocate a PCB and enqueue it Ready on
    /// `owning_core` at `priority`. Which core a freshly spawned process
    /// starts on is left to the caller here; at the BIF layer it defaults
    /// to the spawning process's own core (see `bifs::actly_spawn`).
    pub fn process_create(
        &self,
        owning_core: CoreId,
        priority: Priority,
        entry: usize,
        stack_size: usize,
        heap_size: usize,
    ) -> Result<PcbId> {
        self.core(owning_core)?;
        let pcb_id = self.pool.allocate(owning_core, priority, entry, stack_size, heap_size, self.config.mailbox_capacity)?;
        self.enqueue(owning_core, pcb_id, priority)?;
        Ok(pcb_id)
    }

    /// `process_destroy`: terminate and free a PCB regardless of
    /// its current queue membership. Callers that need the replacement
    /// process dispatched should use [`Self::schedule`] afterward (the BIF
    /// layer's `actly_exit` does this).
    pub fn process_destroy(&self, pcb_id: PcbId) -> Result<()> {
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        pcb.set_state(ProcessState::Terminated);
        self.pool.free(pcb_id)
    }

    // ---- Scheduler kernel -------------------------------

    /// `enqueue(core, pcb, priority)`: append to the tail of `core`'s
    /// `priority` ready queue.
    pub fn enqueue(&self, core: CoreId, pcb_id: PcbId, priority: Priority) -> Result<()> {
        let core_state = self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        pcb.set_priority(priority);
        pcb.set_state(ProcessState::Ready);
        pcb.set_owning_core(core);
        core_state.push_ready(priority, pcb_id);
        trace!("enqueue core={core} pid={} priority={priority:?}", pcb.pid());
        Ok(())
    }

    /// `dequeue_from(queue) -> PCB|None`: pop the head of `core`'s
    /// `priority` ready queue without touching `current` or reductions.
    pub fn dequeue_from(&self, core: CoreId, priority: Priority) -> Result<Option<PcbId>> {
        Ok(self.core(core)?.pop_ready(priority))
    }

    /// Drain cross-core signals addressed to `core`, performed at the top
    /// of every [`Self::schedule`] call.
    fn drain_inbound(&self, core: CoreId, core_state: &CoreState) {
        while let Ok(signal) = core_state.inbound_rx.try_recv() {
            match signal {
                CrossCoreSignal::Wake(pcb_id) => {
                    let Some(pcb) = self.pool.get(pcb_id) else { continue };
                    if let Some(idx) = pcb.blocking_reason().queue_index() {
                        core_state.waiting[idx].lock().unwrap().remove(&self.pool, pcb_id);
                    }
                    pcb.set_blocking_reason(BlockingReason::None);
                    pcb.set_owning_core(core);
                    core_state.push_ready(pcb.priority(), pcb_id);
                    trace!("drain_inbound wake core={core} pid={}", pcb.pid());
                }
                CrossCoreSignal::Return(pcb_id) => {
                    let Some(pcb) = self.pool.get(pcb_id) else { continue };
                    pcb.set_owning_core(core);
                    core_state.push_ready(pcb.priority(), pcb_id);
                    trace!("drain_inbound return core={core} pid={}", pcb.pid());
                }
            }
        }
    }

    /// `schedule(core) -> PCB|None`: scan Max, High, Normal,
    /// Low in order and dispatch the head of the first non-empty queue.
    pub fn schedule(&self, core: CoreId) -> Result<Option<PcbId>> {
        let core_state = self.core(core)?;
        self.drain_inbound(core, core_state);

        for priority in PRIORITIES {
            if let Some(pcb_id) = core_state.pop_ready(priority) {
                let pcb = self.pool.get(pcb_id).expect("ready queue held a freed PcbId");
                pcb.set_state(ProcessState::Running);
                pcb.set_reductions(self.config.default_reductions);
                pcb.set_last_scheduled(self.now());
                core_state.current.store(Some(pcb_id), Ordering::Release);
                core_state.stats.scheduled.fetch_add(1, Ordering::Relaxed);
                debug!("schedule core={core} pid={} priority={priority:?}", pcb.pid());
                return Ok(Some(pcb_id));
            }
        }

        core_state.current.store(None, Ordering::Release);
        Ok(None)
    }

    /// `idle(core)`: called when `schedule` found nothing.
    /// Tries to steal one ready PCB from another core; if that also comes
    /// up empty, parks the calling thread briefly rather than busy-spinning.
    /// The stolen PCB (if any) is left Ready on `core` — a subsequent
    /// `schedule(core)` dispatches it.
    pub fn idle(&self, core: CoreId) -> Result<Option<PcbId>> {
        let stolen = self.try_steal(core)?;
        if stolen.is_none() {
            std::thread::park_timeout(Duration::from_millis(1));
        }
        Ok(stolen)
    }

    pub fn get_current(&self, core: CoreId) -> Result<Option<PcbId>> {
        Ok(self.core(core)?.current.load(Ordering::Acquire))
    }

    pub fn set_current(&self, core: CoreId, pcb_id: Option<PcbId>) -> Result<()> {
        self.core(core)?.current.store(pcb_id, Ordering::Release);
        Ok(())
    }

    // ---- Yield & preemption engine ----------------------

    pub fn get_reductions(&self, core: CoreId) -> Result<u32> {
        let core_state = self.core(core)?;
        match core_state.current.load(Ordering::Acquire) {
            Some(pcb_id) => Ok(self.pool.get(pcb_id).map_or(0, |p| p.reductions())),
            None => Ok(0),
        }
    }

    pub fn set_reductions(&self, core: CoreId, value: u32) -> Result<()> {
        let core_state = self.core(core)?;
        if let Some(pcb_id) = core_state.current.load(Ordering::Acquire) {
            if let Some(pcb) = self.pool.get(pcb_id) {
                pcb.set_reductions(value);
            }
        }
        Ok(())
    }

    /// `decrement_reductions(core) -> bool`: true iff the
    /// budget just reached zero. A no-op (`false`) if `core` has no
    /// `current` process.
    pub fn decrement_reductions(&self, core: CoreId) -> Result<bool> {
        let core_state = self.core(core)?;
        match core_state.current.load(Ordering::Acquire) {
            Some(pcb_id) => {
                let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
                Ok(pcb.decrement_reductions() == 0)
            }
            None => Ok(false),
        }
    }

    /// `yield_check(core, pcb) -> bool`.
    pub fn yield_check(&self, core: CoreId, pcb_id: PcbId) -> Result<bool> {
        self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        Ok(pcb.reductions() == 0)
    }

    /// Shared body of `preempt` and `yield`: save context (an embedder
    /// hook this crate never inspects), re-enqueue at the PCB's own
    /// priority tail, and dispatch the next process.
    fn requeue_and_reschedule(&self, core: CoreId, pcb_id: PcbId) -> Result<Option<PcbId>> {
        let core_state = self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;

        pcb.with_context(|_ctx| {
            // The embedder's register save/restore primitive runs here;
            // this crate only needs the slot to exist.
        });
        pcb.set_state(ProcessState::Ready);
        core_state.push_ready(pcb.priority(), pcb_id);

        if core_state.current.load(Ordering::Acquire) == Some(pcb_id) {
            core_state.current.store(None, Ordering::Release);
        }
        core_state.stats.yields.fetch_add(1, Ordering::Relaxed);

        self.schedule(core)
    }

    /// `preempt(core, pcb) -> next PCB`: forced reschedule on
    /// reduction exhaustion.
    pub fn preempt(&self, core: CoreId, pcb_id: PcbId) -> Result<Option<PcbId>> {
        trace!("preempt core={core} pid={pcb_id:?}");
        self.requeue_and_reschedule(core, pcb_id)
    }

    /// `yield(core, pcb) -> next PCB`: unconditional voluntary
    /// yield. Named `yield_now` since `yield` is a reserved word in Rust.
    pub fn yield_now(&self, core: CoreId, pcb_id: PcbId) -> Result<Option<PcbId>> {
        trace!("yield_now core={core} pid={pcb_id:?}");
        self.requeue_and_reschedule(core, pcb_id)
    }

    /// `yield_conditional(core, pcb) -> bool`: yields only if
    /// another ready process exists on `core`; otherwise `pcb` is left
    /// untouched and `false` is returned.
    pub fn yield_conditional(&self, core: CoreId, pcb_id: PcbId) -> Result<bool> {
        let core_state = self.core(core)?;
        let any_ready = core_state.ready.iter().any(|w| !w.lock().unwrap().is_empty());
        if any_ready {
            self.yield_now(core, pcb_id)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ---- Blocking & wakeup -------------------------------

    /// `block(core, pcb, reason)`.
    pub fn block(&self, core: CoreId, pcb_id: PcbId, reason: BlockingReason) -> Result<Option<PcbId>> {
        let core_state = self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;

        pcb.set_state(ProcessState::Waiting);
        pcb.set_blocking_reason(reason);
        if let Some(idx) = reason.queue_index() {
            core_state.waiting[idx].lock().unwrap().push_back(&self.pool, pcb_id);
        }
        if core_state.current.load(Ordering::Acquire) == Some(pcb_id) {
            core_state.current.store(None, Ordering::Release);
        }
        debug!("block core={core} pid={} reason={reason:?}", pcb.pid());
        self.schedule(core)
    }

    /// `wake(core, pcb) -> bool`. `core` is the caller's own
    /// core; if it differs from `pcb`'s `owning_core`, the actual queue
    /// move is delegated to the owning core via its inbound channel rather
    /// than touched directly.
    pub fn wake(&self, core: CoreId, pcb_id: PcbId) -> Result<bool> {
        self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;

        if !pcb.try_begin_wake() {
            return Ok(false);
        }

        let owner = pcb.owning_core();
        let target_core = if owner == crate::ids::NO_CORE { core } else { owner };
        let core_state = self.core(target_core)?;

        if target_core == core {
            if let Some(idx) = pcb.blocking_reason().queue_index() {
                core_state.waiting[idx].lock().unwrap().remove(&self.pool, pcb_id);
            }
            pcb.set_blocking_reason(BlockingReason::None);
            core_state.push_ready(pcb.priority(), pcb_id);
        } else {
            let _ = core_state.inbound_tx.send(CrossCoreSignal::Wake(pcb_id));
        }
        debug!("wake pid={} core={core} target_core={target_core}", pcb.pid());
        Ok(true)
    }

    /// `block_on_receive(core, pcb, pattern)`: non-blocking
    /// fast path if a matching message is already queued.
    pub fn block_on_receive(&self, core: CoreId, pcb_id: PcbId, pattern: Pattern) -> Result<Option<Message>> {
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        if let Some(message) = pcb.mailbox.try_take_matching(pattern) {
            return Ok(Some(message));
        }
        pcb.with_blocking_data(|data| data.receive_pattern = Some(pattern));
        self.block(core, pcb_id, BlockingReason::Receive)?;
        Ok(None)
    }

    /// `block_on_timer(core, pcb, timeout_ticks)`. Fails
    /// without blocking `pcb` if `timeout_ticks` exceeds
    /// [`SchedulerConfig::max_blocking_time`].
    pub fn block_on_timer(&self, core: CoreId, pcb_id: PcbId, timeout_ticks: u64) -> Result<Option<PcbId>> {
        if timeout_ticks > self.config.max_blocking_time {
            return Err(SchedulerError::Timeout { requested: timeout_ticks, max: self.config.max_blocking_time });
        }
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        let wake_at = self.now().saturating_add(timeout_ticks);
        pcb.set_wake_time(Some(wake_at));
        self.block(core, pcb_id, BlockingReason::Timer)
    }

    /// `block_on_io(core, pcb, descriptor)`.
    pub fn block_on_io(&self, core: CoreId, pcb_id: PcbId, descriptor: u64) -> Result<Option<PcbId>> {
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        pcb.with_blocking_data(|data| data.io_descriptor = Some(descriptor));
        self.block(core, pcb_id, BlockingReason::Io)
    }

    /// `check_timer_wakeups(core) -> count`: wake every
    /// Timer-waiting PCB on `core` whose `wake_time` has arrived, in their
    /// original waiting-queue order.
    pub fn check_timer_wakeups(&self, core: CoreId) -> Result<usize> {
        let core_state = self.core(core)?;
        let now = self.now();
        let idx = BlockingReason::Timer.queue_index().expect("Timer always has a waiting queue");
        let woken = core_state.waiting[idx]
            .lock()
            .unwrap()
            .drain_matching(&self.pool, |pcb| pcb.wake_time().is_some_and(|wake_at| wake_at <= now));

        for pcb_id in &woken {
            if let Some(pcb) = self.pool.get(*pcb_id) {
                pcb.set_blocking_reason(BlockingReason::None);
                pcb.set_wake_time(None);
                pcb.set_state(ProcessState::Ready);
                core_state.push_ready(pcb.priority(), *pcb_id);
            }
        }
        if !woken.is_empty() {
            debug!("check_timer_wakeups core={core} woke={}", woken.len());
        }
        Ok(woken.len())
    }

    /// `cancel_timer(id)`: remove a Timer-waiting PCB before its
    /// deadline. Safe to call after the timer already fired or was
    /// cancelled once — returns `false` rather than erroring.
    pub fn cancel_timer(&self, core: CoreId, pcb_id: PcbId) -> Result<bool> {
        let core_state = self.core(core)?;
        let pcb = self.pool.get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        if pcb.blocking_reason() != BlockingReason::Timer {
            return Ok(false);
        }
        let idx = BlockingReason::Timer.queue_index().expect("Timer always has a waiting queue");
        core_state.waiting[idx].lock().unwrap().remove(&self.pool, pcb_id);
        pcb.set_blocking_reason(BlockingReason::None);
        pcb.set_wake_time(None);
        pcb.set_state(ProcessState::Ready);
        core_state.push_ready(pcb.priority(), pcb_id);
        Ok(true)
    }
}

// Needed by `stealing.rs`, which lives in a sibling module but operates on
// the same per-core records.
impl CoreState {
    pub(crate) fn id(&self) -> CoreId {
        self.core_id
    }

    pub(crate) fn stats(&self) -> &CoreStats {
        &self.stats
    }

    pub(crate) fn send_inbound(&self, signal: CrossCoreSignal) {
        let _ = self.inbound_tx.send(signal);
    }

    pub(crate) fn push_ready(&self, priority: Priority, pcb_id: PcbId) {
        self.ready[priority.index()].lock().unwrap().push(pcb_id);
    }

    pub(crate) fn pop_ready(&self, priority: Priority) -> Option<PcbId> {
        self.ready[priority.index()].lock().unwrap().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::Topology;

    fn state(num_cores: usize) -> SchedulerState {
        SchedulerState::new(num_cores, 64, Topology::uniform(num_cores), SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn schedule_empty_returns_none_without_setting_current() {
        let state = state(1);
        assert_eq!(state.schedule(0).unwrap(), None);
        assert_eq!(state.get_current(0).unwrap(), None);
    }

    #[test]
    fn schedule_invalid_core_is_benign() {
        let state = state(1);
        assert!(matches!(state.schedule(7), Err(SchedulerError::InvalidCore(7))));
    }

    #[test]
    fn single_process_dispatch_resets_reductions() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0x1000, 8192, 4096).unwrap();
        let scheduled = state.schedule(0).unwrap();
        assert_eq!(scheduled, Some(pcb_id));
        assert_eq!(state.get_reductions(0).unwrap(), crate::config::DEFAULT_REDUCTIONS);
    }

    #[test]
    fn reduction_exhaustion_forces_preemption_and_resets_on_redispatch() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.schedule(0).unwrap();

        let mut hit_zero_at = None;
        for i in 1..=crate::config::DEFAULT_REDUCTIONS {
            if state.decrement_reductions(0).unwrap() {
                hit_zero_at = Some(i);
                break;
            }
        }
        assert_eq!(hit_zero_at, Some(crate::config::DEFAULT_REDUCTIONS));

        let next = state.preempt(0, pcb_id).unwrap();
        assert_eq!(next, Some(pcb_id));
        assert_eq!(state.get_reductions(0).unwrap(), crate::config::DEFAULT_REDUCTIONS);
    }

    #[test]
    fn priority_strictness_beats_round_robin() {
        let state = state(1);
        let low = state.process_create(0, Priority::Low, 0, 8192, 4096).unwrap();
        let normal = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let high = state.process_create(0, Priority::High, 0, 8192, 4096).unwrap();
        let max = state.process_create(0, Priority::Max, 0, 8192, 4096).unwrap();

        for _ in 0..3 {
            let current = state.schedule(0).unwrap();
            assert_eq!(current, Some(max));
            state.yield_now(0, max).unwrap();
        }

        // Max keeps winning until it blocks; demote it by exiting it.
        state.process_destroy(max).unwrap();
        assert_eq!(state.schedule(0).unwrap(), Some(high));
        state.process_destroy(high).unwrap();
        assert_eq!(state.schedule(0).unwrap(), Some(normal));
        state.process_destroy(normal).unwrap();
        assert_eq!(state.schedule(0).unwrap(), Some(low));
    }

    #[test]
    fn round_robin_within_one_priority() {
        let state = state(1);
        let a = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let b = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let c = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();

        for expected in [a, b, c] {
            let current = state.schedule(0).unwrap().unwrap();
            assert_eq!(current, expected);
            state.yield_now(0, current).unwrap();
        }
    }

    #[test]
    fn block_then_wake_round_trip() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.schedule(0).unwrap();

        let replacement = state.block(0, pcb_id, BlockingReason::Receive).unwrap();
        assert_eq!(replacement, None);
        assert_eq!(state.pool().get(pcb_id).unwrap().state(), ProcessState::Waiting);
        assert_eq!(state.schedule(0).unwrap(), None);

        assert!(state.wake(0, pcb_id).unwrap());
        assert_eq!(state.schedule(0).unwrap(), Some(pcb_id));
    }

    #[test]
    fn wake_of_non_waiting_pcb_is_a_noop() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        // Still Ready (never blocked) -> wake must report false.
        assert!(!state.wake(0, pcb_id).unwrap());
    }

    #[test]
    fn block_on_receive_fast_path_skips_blocking() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.schedule(0).unwrap();
        let pcb = state.pool().get(pcb_id).unwrap();
        pcb.mailbox.send(Message { tag: 1, payload: Box::new([1, 2, 3]) });

        let message = state.block_on_receive(0, pcb_id, Pattern::Tag(1)).unwrap();
        assert!(message.is_some());
        assert_eq!(pcb.state(), ProcessState::Running);
    }

    #[test]
    fn timer_block_rejects_excessive_timeout() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.schedule(0).unwrap();
        let err = state.block_on_timer(0, pcb_id, crate::config::MAX_BLOCKING_TIME + 1).unwrap_err();
        assert!(matches!(err, SchedulerError::Timeout { .. }));
        assert_eq!(state.pool().get(pcb_id).unwrap().state(), ProcessState::Running);
    }

    #[test]
    fn check_timer_wakeups_wakes_expired_only() {
        let state = state(1);
        let soon = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let later = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.block_on_timer(0, soon, 5).unwrap();
        state.block_on_timer(0, later, 500).unwrap();

        for _ in 0..5 {
            state.tick();
        }
        let woken = state.check_timer_wakeups(0).unwrap();
        assert_eq!(woken, 1);
        assert_eq!(state.pool().get(soon).unwrap().state(), ProcessState::Ready);
        assert_eq!(state.pool().get(later).unwrap().state(), ProcessState::Waiting);
    }

    #[test]
    fn yield_conditional_no_op_when_alone() {
        let state = state(1);
        let pcb_id = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        state.schedule(0).unwrap();
        assert!(!state.yield_conditional(0, pcb_id).unwrap());
        assert_eq!(state.pool().get(pcb_id).unwrap().state(), ProcessState::Running);
    }
}

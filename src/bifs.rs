//! Built-in operations a running process invokes directly.
//!
//! Every BIF first charges its reduction cost through [`bif_trap_check`].
//! When the budget can't cover it, the process is preempted immediately so
//! that whichever process runs next makes progress, and the *caller's*
//! caller (the embedder's BIF dispatch loop) is expected to retry the BIF
//! the next time this process is scheduled.

use log::{debug, trace};

use crate::error::{Result, SchedulerError};
use crate::ids::{CoreId, PcbId, Pid};
use crate::kernel::SchedulerState;
use crate::pcb::Priority;

const YIELD_COST: u32 = 1;
const SPAWN_COST: u32 = 10;
const EXIT_COST: u32 = 1;
const MIN_STACK_SIZE: usize = 4096;
const MIN_HEAP_SIZE: usize = 4096;

/// Result of a reduction charge.
pub enum BifOutcome {
    /// The cost was deducted; the BIF may proceed.
    Proceed,
    /// The budget didn't cover the cost; `pcb` was preempted and `next` is
    /// whatever `schedule` dispatched in its place.
    Preempted { next: Option<PcbId> },
}

/// `bif_trap_check(core, cost)`: deduct `cost` reductions from
/// the PCB at `pcb_id` if it can afford them; otherwise preempt it.
pub fn bif_trap_check(state: &SchedulerState, core: CoreId, pcb_id: PcbId, cost: u32) -> Result<BifOutcome> {
    let pcb = state.pool().get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
    if pcb.try_deduct(cost) {
        return Ok(BifOutcome::Proceed);
    }
    trace!("bif_trap_check insufficient core={core} pid={} cost={cost} available={}", pcb.pid(), pcb.reductions());
    let next = state.preempt(core, pcb_id)?;
    Ok(BifOutcome::Preempted { next })
}

/// `actly_yield(core) -> 1/0`.
pub fn actly_yield(state: &SchedulerState, core: CoreId) -> Result<u32> {
    let Some(pcb_id) = state.get_current(core)? else {
        return Ok(0);
    };
    match bif_trap_check(state, core, pcb_id, YIELD_COST)? {
        BifOutcome::Proceed => {
            state.yield_now(core, pcb_id)?;
            Ok(1)
        }
        BifOutcome::Preempted { .. } => Ok(0),
    }
}

/// `actly_spawn(core, entry, pri, stack_sz, heap_sz) -> pid`.
///
/// Returns `Pid::from_raw(0)` on any validation failure — invalid
/// priority, undersized stack/heap, an exhausted pool, or an insufficient
/// reduction budget on the spawning process — rather than an `Err`,
/// matching the BIF's documented pid-zero failure contract. The spawned
/// process's `owning_core` defaults to the caller's own `core`.
pub fn actly_spawn(
    state: &SchedulerState,
    core: CoreId,
    entry: usize,
    priority: u8,
    stack_size: usize,
    heap_size: usize,
) -> Result<Pid> {
    if let Some(current) = state.get_current(core)? {
        if let BifOutcome::Preempted { .. } = bif_trap_check(state, core, current, SPAWN_COST)? {
            return Ok(Pid::from_raw(0));
        }
    }

    let Ok(priority) = Priority::from_u8(priority) else {
        return Ok(Pid::from_raw(0));
    };
    if stack_size < MIN_STACK_SIZE || heap_size < MIN_HEAP_SIZE {
        return Ok(Pid::from_raw(0));
    }

    match state.process_create(core, priority, entry, stack_size, heap_size) {
        Ok(pcb_id) => {
            let pid = state.pool().get(pcb_id).map_or(Pid::from_raw(0), |pcb| pcb.pid());
            debug!("actly_spawn core={core} pid={pid} priority={priority:?}");
            Ok(pid)
        }
        Err(_) => Ok(Pid::from_raw(0)),
    }
}

/// `actly_exit(core, reason)`.
///
/// This is noreturn from the exiting process's point of view; a Rust API
/// has no way to express that without also performing the context switch
/// this crate deliberately leaves external, so this instead returns
/// whatever `schedule` dispatches next — the embedder's dispatch loop
/// treats that return as "control transferred, never come back here."
pub fn actly_exit(state: &SchedulerState, core: CoreId, pcb_id: PcbId, reason: u32) -> Result<Option<PcbId>> {
    match bif_trap_check(state, core, pcb_id, EXIT_COST)? {
        BifOutcome::Proceed => {
            debug!("actly_exit core={core} pid={} reason={reason}", state.pool().get(pcb_id).map_or(0, |p| p.pid().as_u64()));
            state.set_current(core, None)?;
            state.process_destroy(pcb_id)?;
            state.schedule(core)
        }
        BifOutcome::Preempted { next } => Ok(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::Topology;
    use crate::config::SchedulerConfig;
    use crate::kernel::SchedulerState;

    fn state(num_cores: usize) -> SchedulerState {
        SchedulerState::new(num_cores, 64, Topology::uniform(num_cores), SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn spawn_enqueues_and_returns_nonzero_pid() {
        let state = state(1);
        let pid = actly_spawn(&state, 0, 0x2000, Priority::Normal as u8, 8192, 4096).unwrap();
        assert_ne!(pid.as_u64(), 0);
        let scheduled = state.schedule(0).unwrap();
        assert!(scheduled.is_some());
        assert_eq!(state.pool().get(scheduled.unwrap()).unwrap().pid(), pid);
    }

    #[test]
    fn spawn_rejects_invalid_priority() {
        let state = state(1);
        let pid = actly_spawn(&state, 0, 0, 4, 8192, 4096).unwrap();
        assert_eq!(pid.as_u64(), 0);
    }

    #[test]
    fn spawn_rejects_undersized_stack() {
        let state = state(1);
        let pid = actly_spawn(&state, 0, 0, Priority::Normal as u8, 64, 4096).unwrap();
        assert_eq!(pid.as_u64(), 0);
    }

    #[test]
    fn yield_bif_reports_zero_with_no_current_process() {
        let state = state(1);
        assert_eq!(actly_yield(&state, 0).unwrap(), 0);
    }

    #[test]
    fn exit_frees_the_pcb_and_dispatches_the_next() {
        let state = state(1);
        let first = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let second = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        let current = state.schedule(0).unwrap().unwrap();
        assert_eq!(current, first);

        let available_before = state.pool().available();
        let next = actly_exit(&state, 0, first, 0).unwrap();
        assert_eq!(next, Some(second));
        assert_eq!(state.pool().get(first).unwrap().state(), crate::pcb::ProcessState::Terminated);
        assert_eq!(state.pool().available(), available_before + 1);
    }
}

//! Property-based tests of the scheduler's quantified invariants, run
//! against randomized sequences of enqueue/schedule/yield/block/wake
//! operations.

use proptest::prelude::*;

use reductor::affinity::Topology;
use reductor::config::{DEFAULT_REDUCTIONS, SchedulerConfig};
use reductor::{Priority, ProcessState, SchedulerState};

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Max),
        Just(Priority::High),
        Just(Priority::Normal),
        Just(Priority::Low),
    ]
}

proptest! {
    /// Round-robin within one priority: whatever order processes are
    /// enqueued in at the same priority, `schedule` dispatches them in
    /// that same order as long as each yields before the next is asked for.
    #[test]
    fn round_robin_preserves_enqueue_order(n in 1usize..12) {
        let state = SchedulerState::new(1, 128, Topology::uniform(1), SchedulerConfig::default()).unwrap();
        let ids: Vec<_> = (0..n)
            .map(|_| state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap())
            .collect();

        for &expected in &ids {
            let current = state.schedule(0).unwrap();
            prop_assert_eq!(current, Some(expected));
            state.yield_now(0, expected).unwrap();
        }
    }

    /// Dispatch always resets the budget to DEFAULT_REDUCTIONS, regardless
    /// of how many processes or priorities are involved.
    #[test]
    fn every_dispatch_resets_reductions(
        priorities in prop::collection::vec(priority_strategy(), 1..8)
    ) {
        let state = SchedulerState::new(1, 128, Topology::uniform(1), SchedulerConfig::default()).unwrap();
        for priority in &priorities {
            state.process_create(0, *priority, 0, 8192, 4096).unwrap();
        }
        for _ in 0..priorities.len() {
            let current = state.schedule(0).unwrap();
            prop_assert!(current.is_some());
            prop_assert_eq!(state.get_reductions(0).unwrap(), DEFAULT_REDUCTIONS);
            state.yield_now(0, current.unwrap()).unwrap();
        }
    }

    /// Priority strictness: a Max-priority process always wins dispatch
    /// over anything lower, no matter how many lower-priority processes
    /// are also ready.
    #[test]
    fn max_priority_always_dispatched_first(low_count in 0usize..10) {
        let state = SchedulerState::new(1, 128, Topology::uniform(1), SchedulerConfig::default()).unwrap();
        for _ in 0..low_count {
            state.process_create(0, Priority::Low, 0, 8192, 4096).unwrap();
        }
        let max = state.process_create(0, Priority::Max, 0, 8192, 4096).unwrap();

        prop_assert_eq!(state.schedule(0).unwrap(), Some(max));
    }

    /// block -> wake always returns a pcb to Ready and never changes the
    /// total ready+waiting population of its core.
    #[test]
    fn block_wake_round_trip_preserves_population(extra in 0usize..6) {
        let state = SchedulerState::new(1, 128, Topology::uniform(1), SchedulerConfig::default()).unwrap();
        let p = state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        for _ in 0..extra {
            state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        }
        state.schedule(0).unwrap();

        state.block(0, p, reductor::BlockingReason::Receive).unwrap();
        prop_assert_eq!(state.pool().get(p).unwrap().state(), ProcessState::Waiting);

        prop_assert!(state.wake(0, p).unwrap());
        prop_assert_eq!(state.pool().get(p).unwrap().state(), ProcessState::Ready);

        // Waking twice in a row must be idempotent.
        prop_assert!(!state.wake(0, p).unwrap());
    }

    /// A successful steal never changes the total number of ready PCBs
    /// across both cores — it only relocates one.
    #[test]
    fn steal_preserves_total_ready_count(n in 2usize..16) {
        let state = SchedulerState::new(2, 128, Topology::uniform(2), SchedulerConfig::default()).unwrap();
        for _ in 0..n {
            state.process_create(0, Priority::Normal, 0, 8192, 4096).unwrap();
        }
        let before = state.get_scheduler_load(0).unwrap() + state.get_scheduler_load(1).unwrap();

        let stolen = state.try_steal(1).unwrap();

        let after = state.get_scheduler_load(0).unwrap() + state.get_scheduler_load(1).unwrap();
        if stolen.is_some() {
            prop_assert_eq!(before, after);
        }
    }
}

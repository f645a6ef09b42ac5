//! Work-stealing engine: victim selection and cross-core
//! migration, built directly on the `crossbeam_deque` Chase-Lev deques
//! that double as the ready queues (see `kernel.rs`'s module docs for why
//! the two are unified).

use std::sync::atomic::Ordering;

use crossbeam_deque::Steal;
use log::{debug, trace};
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{RngCore, SeedableRng};

use crate::config::{PRIORITY_WEIGHTS, VictimStrategy};
use crate::error::{Result, SchedulerError};
use crate::ids::{CoreId, PcbId};
use crate::kernel::{CrossCoreSignal, SchedulerState};
use crate::pcb::{PRIORITIES, Pcb, ProcessState};

impl SchedulerState {
    /// `get_scheduler_load(core) -> u32`: priority-weighted sum
    /// of ready-queue lengths. Reads `Stealer::len`, which only bounds the
    /// true count under concurrent mutation — fine for a load heuristic,
    /// never used for correctness.
    pub fn get_scheduler_load(&self, core: CoreId) -> Result<u32> {
        let stealers = self.stealers_for(core)?;
        Ok(PRIORITIES
            .iter()
            .map(|priority| stealers[priority.index()].len() as u32 * PRIORITY_WEIGHTS[priority.index()])
            .sum())
    }

    /// `find_busiest(current) -> core`: the non-`current` core
    /// with the highest weighted load.
    pub fn find_busiest(&self, current: CoreId) -> Result<CoreId> {
        self.core(current)?;
        (0..self.num_cores() as CoreId)
            .filter(|&core| core != current)
            .max_by_key(|&core| self.get_scheduler_load(core).unwrap_or(0))
            .ok_or(SchedulerError::InvalidCore(current))
    }

    /// `select_victim_random(current) -> core`: uniform random
    /// core other than `current`.
    pub fn select_victim_random(&self, current: CoreId) -> Result<CoreId> {
        self.core(current)?;
        let others = self.num_cores() as u64 - 1;
        if others == 0 {
            return Ok(current);
        }
        let draw = (self.roll_dice() % others) as CoreId;
        Ok(if draw >= current { draw + 1 } else { draw })
    }

    /// `select_victim_by_load(current) -> core`: the busiest
    /// other core, falling back to `current` itself when every other core
    /// is idle.
    pub fn select_victim_by_load(&self, current: CoreId) -> Result<CoreId> {
        let busiest = self.find_busiest(current)?;
        if self.get_scheduler_load(busiest)? == 0 { Ok(current) } else { Ok(busiest) }
    }

    /// `select_victim_locality(current) -> core`: prefer a
    /// same-cluster/same-NUMA-node core that actually has work; otherwise
    /// fall back to [`Self::select_victim_by_load`].
    pub fn select_victim_locality(&self, current: CoreId) -> Result<CoreId> {
        let others = (0..self.num_cores() as CoreId).filter(|&core| core != current);
        let local = self.topology().most_local(current, others);
        match local {
            Some(candidate) if self.get_scheduler_load(candidate)? as usize >= self.config().min_steal_queue => {
                Ok(candidate)
            }
            _ => self.select_victim_by_load(current),
        }
    }

    fn select_victim(&self, current: CoreId) -> Result<CoreId> {
        match self.config().victim_strategy {
            VictimStrategy::Random => self.select_victim_random(current),
            VictimStrategy::ByLoad => self.select_victim_by_load(current),
            VictimStrategy::Locality => self.select_victim_locality(current),
        }
    }

    /// `is_steal_allowed(src, tgt, pcb) -> bool`: also reused
    /// by `migrate` for the equivalent `is_migration_allowed` predicate.
    pub fn is_steal_allowed(&self, src: CoreId, tgt: CoreId, pcb: &Pcb) -> bool {
        src != tgt
            && self.core(src).is_ok()
            && self.core(tgt).is_ok()
            && pcb.affinity_mask.contains(tgt)
            && pcb.migration_count() < self.config().max_migrations
    }

    /// `try_steal(current) -> PCB|None`: probe up to
    /// `max_steal_attempts` victims chosen by the configured strategy,
    /// popping the highest-priority ready PCB each has and migrating it if
    /// permitted; give up after the bound is exhausted.
    pub fn try_steal(&self, current: CoreId) -> Result<Option<PcbId>> {
        self.core(current)?;
        if self.num_cores() < 2 {
            return Ok(None);
        }

        let attempts = self.config().max_steal_attempts.min(self.num_cores() - 1);
        for _ in 0..attempts {
            let victim = self.select_victim(current)?;
            if victim == current {
                continue;
            }
            if (self.get_scheduler_load(victim)? as usize) < self.config().min_steal_queue {
                continue;
            }

            let Some(pcb_id) = self.steal_one(victim)? else { continue };
            let pcb = self.pool().get(pcb_id).expect("stole a freed PcbId");

            if self.is_steal_allowed(victim, current, pcb) {
                self.finish_migration(pcb_id, current)?;
                self.core(current)?.stats().record_steal();
                debug!("try_steal pid={} victim={victim} thief={current}", pcb.pid());
                return Ok(Some(pcb_id));
            }

            trace!("try_steal disallowed pid={} victim={victim} thief={current}", pcb.pid());
            self.core(victim)?.send_inbound(CrossCoreSignal::Return(pcb_id));
        }
        Ok(None)
    }

    /// Pop one PCB off the highest-priority non-empty ready queue
    /// belonging to `victim`, retrying on spurious `Steal::Retry`.
    fn steal_one(&self, victim: CoreId) -> Result<Option<PcbId>> {
        let stealers = self.stealers_for(victim)?;
        for priority in PRIORITIES {
            loop {
                match stealers[priority.index()].steal() {
                    Steal::Success(pcb_id) => return Ok(Some(pcb_id)),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        Ok(None)
    }

    /// `migrate(pcb, src, tgt) -> bool`.
    ///
    /// This assumes `pcb` has *already* been removed from `src`'s ready
    /// queue — `crossbeam_deque` has no arbitrary-position removal, so a
    /// caller wanting to migrate a PCB that isn't already in hand (e.g.
    /// from [`Self::steal_one`]) has no way to extract it from `src`
    /// first. In practice this is only ever called right after a
    /// successful steal; see [`Self::finish_migration`].
    pub fn migrate(&self, pcb_id: PcbId, src: CoreId, tgt: CoreId) -> Result<bool> {
        self.core(src)?;
        let pcb = self.pool().get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        if !self.is_steal_allowed(src, tgt, pcb) {
            return Ok(false);
        }
        self.finish_migration(pcb_id, tgt)?;
        Ok(true)
    }

    /// Common tail of a successful migration: update the PCB's bookkeeping
    /// and hand it to `tgt`'s ready queue at its existing priority,
    /// incrementing its migration count.
    fn finish_migration(&self, pcb_id: PcbId, tgt: CoreId) -> Result<()> {
        let core_state = self.core(tgt)?;
        let pcb = self.pool().get(pcb_id).ok_or(SchedulerError::InvalidPcb)?;
        pcb.set_owning_core(tgt);
        pcb.increment_migrations();
        pcb.set_state(ProcessState::Ready);
        core_state.push_ready(pcb.priority(), pcb_id);
        core_state.stats().record_migration();
        Ok(())
    }

    fn roll_dice(&self) -> u64 {
        let seed = self.next_random_u64();
        ChaCha8Rng::seed_from_u64(seed).next_u64()
    }
}

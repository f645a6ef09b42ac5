//! Core topology and affinity helpers.
//!
//! The scheduler does not discover real hardware topology itself — an
//! embedder supplies it at init time, the way a core-local runtime layer
//! is handed a core count and NUMA layout by the boot code rather than
//! probing ACPI itself from this crate.

use crate::ids::CoreId;
use crate::pcb::Pcb;

/// A core's classification for heterogeneous (big.LITTLE-style) systems.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoreKind {
    Performance,
    Efficiency,
}

/// Static topology describing the cores a [`crate::kernel::SchedulerState`]
/// was initialized with: how many there are, which NUMA node and cluster
/// each belongs to, and its performance class.
pub struct Topology {
    core_kinds: Vec<CoreKind>,
    numa_node: Vec<u32>,
    cluster: Vec<u32>,
}

impl Topology {
    /// A uniform topology: every core is `Performance`, single NUMA node,
    /// single cluster. Suitable for homogeneous hardware or tests.
    pub fn uniform(num_cores: usize) -> Self {
        Self {
            core_kinds: vec![CoreKind::Performance; num_cores],
            numa_node: vec![0; num_cores],
            cluster: vec![0; num_cores],
        }
    }

    /// Default topology detection: cores
    /// 0–7 are `Performance`, everything from 8 up is `Efficiency`, each
    /// kind forming its own cluster on a single NUMA node. A host that
    /// wants a real probe of its hardware builds a [`Topology`] with
    /// [`Topology::with_kinds`] instead and skips this default.
    pub fn detect(num_cores: usize) -> Self {
        let core_kinds: Vec<CoreKind> = (0..num_cores)
            .map(|i| if i < 8 { CoreKind::Performance } else { CoreKind::Efficiency })
            .collect();
        let cluster = core_kinds
            .iter()
            .map(|kind| match kind {
                CoreKind::Performance => 0,
                CoreKind::Efficiency => 1,
            })
            .collect();
        let numa_node = vec![0; num_cores];
        Self::with_kinds(core_kinds, numa_node, cluster)
    }

    pub fn with_kinds(core_kinds: Vec<CoreKind>, numa_node: Vec<u32>, cluster: Vec<u32>) -> Self {
        debug_assert_eq!(core_kinds.len(), numa_node.len());
        debug_assert_eq!(core_kinds.len(), cluster.len());
        Self { core_kinds, numa_node, cluster }
    }

    pub fn num_cores(&self) -> usize {
        self.core_kinds.len()
    }

    pub fn kind(&self, core: CoreId) -> CoreKind {
        self.core_kinds[core as usize]
    }

    pub fn numa_node(&self, core: CoreId) -> u32 {
        self.numa_node[core as usize]
    }

    pub fn cluster(&self, core: CoreId) -> u32 {
        self.cluster[core as usize]
    }

    /// True when `a` and `b` are "local" to each other: same cluster, or
    /// failing that, same NUMA node. Used to bias victim selection toward
    /// nearby cores.
    pub fn is_local(&self, a: CoreId, b: CoreId) -> bool {
        self.cluster(a) == self.cluster(b) || self.numa_node(a) == self.numa_node(b)
    }

    /// Among `candidates`, the one most local to `from`, preferring same
    /// cluster over same NUMA node over neither. Returns `None` if
    /// `candidates` is empty.
    pub fn most_local(&self, from: CoreId, candidates: impl Iterator<Item = CoreId>) -> Option<CoreId> {
        candidates.max_by_key(|&c| {
            if self.cluster(from) == self.cluster(c) {
                2
            } else if self.numa_node(from) == self.numa_node(c) {
                1
            } else {
                0
            }
        })
    }

    /// Pick the best core for a process of the given [`ProcessType`]:
    /// CPU-intensive and Mixed workloads go to a `Performance` core,
    /// I/O-bound workloads to an `Efficiency` core (falling back to
    /// `Performance` if none exists). Ties break toward the lowest core id.
    pub fn get_optimal_core(&self, process_type: ProcessType) -> CoreId {
        let preferred = match process_type {
            ProcessType::IoBound => CoreKind::Efficiency,
            ProcessType::CpuIntensive | ProcessType::Mixed => CoreKind::Performance,
        };
        (0..self.num_cores() as CoreId)
            .find(|&c| self.kind(c) == preferred)
            .unwrap_or(0)
    }
}

/// Coarse classification of a process's expected workload, used to steer
/// `get_optimal_core`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessType {
    CpuIntensive,
    IoBound,
    Mixed,
}

/// Check whether `process` is permitted to run on `core`.
pub fn is_affinity_allowed(process: &Pcb, core: CoreId) -> bool {
    process.affinity_mask.contains(core)
}

/// `set_affinity`: overwrite `process`'s entire affinity mask.
pub fn set_affinity(process: &Pcb, mask: u128) {
    process.affinity_mask.set(mask);
}

/// `get_affinity`.
pub fn get_affinity(process: &Pcb) -> u128 {
    process.affinity_mask.get()
}

/// `check_affinity`: alias of [`is_affinity_allowed`] for callers that
/// expect this name.
pub fn check_affinity(process: &Pcb, core: CoreId) -> bool {
    is_affinity_allowed(process, core)
}

/// Check whether migrating `process` to `target` is currently allowed: the
/// target core must be in the affinity mask and the migration cap must not
/// already be exhausted.
pub fn is_migration_allowed(process: &Pcb, target: CoreId, max_migrations: u32) -> bool {
    is_affinity_allowed(process, target) && process.migration_count() < max_migrations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_splits_performance_and_efficiency_at_core_eight() {
        let topology = Topology::detect(16);
        for core in 0..8 {
            assert_eq!(topology.kind(core), CoreKind::Performance);
        }
        for core in 8..16 {
            assert_eq!(topology.kind(core), CoreKind::Efficiency);
        }
    }

    #[test]
    fn most_local_prefers_same_cluster_over_same_numa_node() {
        let topology = Topology::with_kinds(
            vec![CoreKind::Performance; 3],
            vec![0, 0, 1],
            vec![0, 1, 0],
        );
        // core 0 shares a cluster with core 2 but a NUMA node with core 1.
        let best = topology.most_local(0, [1, 2].into_iter());
        assert_eq!(best, Some(2));
    }

    #[test]
    fn affinity_mask_round_trips_through_pcb() {
        let pcb = Pcb::empty();
        set_affinity(&pcb, 0b101);
        assert_eq!(get_affinity(&pcb), 0b101);
        assert!(check_affinity(&pcb, 0));
        assert!(!check_affinity(&pcb, 1));
        assert!(check_affinity(&pcb, 2));
    }

    #[test]
    fn migration_cap_blocks_further_migration_regardless_of_affinity() {
        let pcb = Pcb::empty();
        set_affinity(&pcb, u128::MAX);
        for _ in 0..3 {
            pcb.increment_migrations();
        }
        assert!(!is_migration_allowed(&pcb, 5, 3));
        assert!(is_migration_allowed(&pcb, 5, 4));
    }
}

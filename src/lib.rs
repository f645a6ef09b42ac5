//! A BEAM-inspired, reduction-counted preemptive scheduler kernel for
//! user-space multi-core runtimes.
//!
//! This crate is the scheduler core only: per-core ready queues,
//! reduction-based preemption, voluntary/conditional yielding, blocking and
//! wakeup, inter-core work stealing with load- and locality-aware victim
//! selection, and the process-control-block lifecycle underneath all of
//! it. The source-language front end, the register-level context switch,
//! timer hardware, and PCB-pool-growth allocation are all external
//! collaborators this crate never touches directly — see each module's
//! docs for the seam.
//!
//! # Layout
//!
//! - [`pcb`] — the process control block and its small supporting types.
//! - [`pool`] — the fixed-capacity PCB slab allocator.
//! - [`queue`] — intrusive doubly-linked waiting queues.
//! - [`kernel`] — [`kernel::SchedulerState`], the scheduler kernel, the
//!   yield/preemption engine, and blocking/wakeup.
//! - work stealing lives as further `impl SchedulerState` methods in a
//!   private `stealing` module; call them straight off [`kernel::SchedulerState`].
//! - [`affinity`] — CPU affinity masks and core topology (P/E-core
//!   classification, NUMA/cluster locality).
//! - [`bifs`] — the built-in operations (`yield`, `spawn`, `exit`) a running
//!   process invokes, each paying its reduction cost up front.
//! - [`mailbox`] — the per-process MPSC message queue behind `Receive` blocking.
//! - [`error`] — the recoverable [`error::SchedulerError`] kinds.
//! - [`config`] — every tunable constant, and [`config::SchedulerConfig`]
//!   for overriding them per instance.

pub mod affinity;
pub mod bifs;
pub mod config;
pub mod error;
pub mod ids;
pub mod kernel;
pub mod mailbox;
pub mod pcb;
pub mod pool;
pub mod queue;
mod stealing;

pub use affinity::{CoreKind, ProcessType, Topology};
pub use bifs::BifOutcome;
pub use config::{SchedulerConfig, VictimStrategy};
pub use error::{Result, SchedulerError};
pub use ids::{CoreId, PcbId, Pid};
pub use kernel::{CoreStats, SchedulerState};
pub use mailbox::{Message, Pattern};
pub use pcb::{BlockingReason, Pcb, Priority, ProcessState};

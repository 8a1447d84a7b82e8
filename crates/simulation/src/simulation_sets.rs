//! Deterministic simulation ordering via `SystemSet` phases.
//!
//! These sets establish a contract for system execution order within the
//! `FixedUpdate` schedule. Each plugin places its systems into the
//! appropriate set so that inter-plugin ordering is explicit and testable
//! rather than relying on implicit timing assumptions.
//!
//! # FixedUpdate phases (`SimulationSet`)
//!
//! ```text
//! PreSim  →  Allocation  →  PostSim
//! ```
//!
//! * **PreSim** -- derived-index maintenance (canal topology rebuild).
//!   Sets up per-hour lookup state the scheduler reads.
//! * **Allocation** -- the per-hour water allocation pass. The only phase
//!   that mutates region, canal, and water source state.
//! * **PostSim** -- hour advancement, halt decisions, and reporting.
//!   These read allocation results and never touch network levels.

use bevy::prelude::*;

/// Ordered phases for systems running in the `FixedUpdate` schedule.
///
/// Configured as a chain: `PreSim` → `Allocation` → `PostSim`.
/// Individual plugins use `.in_set(SimulationSet::X)` when registering their
/// systems, which gives them automatic ordering relative to other phases
/// while retaining the ability to add fine-grained `.after()` / `.before()`
/// constraints within the same phase.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Pre-allocation setup: canal index rebuild.
    PreSim,
    /// The greedy per-hour transfer pass.
    Allocation,
    /// Post-allocation bookkeeping: hour advance, halt checks, transfer logs.
    PostSim,
}

//! The simulation driver: hour counter, halt decisions, and the solved
//! predicate.
//!
//! The scheduler itself never decides when the run is over. After every
//! allocation pass the driver checks, in order: is every region satisfied,
//! did the pass make any progress, and is the hour budget exhausted. The
//! first check that fires halts the run; an unproductive hour never
//! advances the counter.

use bevy::prelude::*;
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationReport;
use crate::config::SchedulerConfig;
use crate::network::{deficit, Region};
use crate::{decode_or_warn, SimulationSet, Snapshot, SnapshotRegistry};

// =============================================================================
// Types
// =============================================================================

/// Why the driver stopped attempting further hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum HaltReason {
    /// Every region's deficit is at or below the negligibility threshold.
    Solved,
    /// The last hour produced zero transfers; repeating it has no value.
    NoProgress,
    /// The configured hour budget ran out with needs still open.
    HourBudgetExhausted,
}

impl HaltReason {
    /// Human-readable name for logs and run summaries.
    pub fn name(self) -> &'static str {
        match self {
            HaltReason::Solved => "solved",
            HaltReason::NoProgress => "no progress",
            HaltReason::HourBudgetExhausted => "hour budget exhausted",
        }
    }
}

/// Event fired once when the driver halts the run.
#[derive(Event, Debug, Clone)]
pub struct NetworkHaltedEvent {
    /// Why the run stopped.
    pub reason: HaltReason,
    /// The hour counter at the moment of halting.
    pub hour: u64,
}

/// Driver bookkeeping: the hour counter and the halt latch.
///
/// `halted` gates the allocation system; once set it never clears for the
/// rest of the run.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct DriverState {
    /// Hours simulated so far. Only productive hours advance it.
    pub hour: u64,
    /// Whether the run is over.
    pub halted: bool,
    /// Why the run stopped, once `halted` is set.
    pub halt_reason: Option<HaltReason>,
}

impl DriverState {
    fn halt(&mut self, reason: HaltReason) {
        self.halted = true;
        self.halt_reason = Some(reason);
    }
}

impl Snapshot for DriverState {
    const KEY: &'static str = "driver_state";

    fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        decode_or_warn(Self::KEY, bytes)
    }
}

// =============================================================================
// Systems
// =============================================================================

/// System: advance the hour after a productive allocation pass, or halt.
///
/// Runs in `PostSim`, after the allocation pass has filled in the report.
pub fn advance_hour(
    config: Res<SchedulerConfig>,
    report: Res<AllocationReport>,
    mut driver: ResMut<DriverState>,
    regions: Query<&Region>,
    mut halted_events: EventWriter<NetworkHaltedEvent>,
) {
    if driver.halted {
        return;
    }

    if report.did_transfer {
        driver.hour += 1;
        info!(
            "hour {}: {} transfers, {:.1} m3 moved",
            driver.hour, report.last_hour_transfers, report.last_hour_volume
        );
    }

    let solved = regions
        .iter()
        .all(|region| deficit(region) <= config.epsilon);

    let reason = if solved {
        Some(HaltReason::Solved)
    } else if !report.did_transfer {
        Some(HaltReason::NoProgress)
    } else if driver.hour >= config.max_hours {
        Some(HaltReason::HourBudgetExhausted)
    } else {
        None
    };

    if let Some(reason) = reason {
        driver.halt(reason);
        info!("run halted after hour {}: {}", driver.hour, reason.name());
        halted_events.send(NetworkHaltedEvent {
            reason,
            hour: driver.hour,
        });
    }
}

// =============================================================================
// Plugin
// =============================================================================

pub struct DriverPlugin;

impl Plugin for DriverPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DriverState>()
            .add_event::<NetworkHaltedEvent>();

        // Register for snapshot capture/restore.
        let mut registry = app
            .world_mut()
            .get_resource_or_insert_with(SnapshotRegistry::default);
        registry.register::<DriverState>();

        app.add_systems(
            FixedUpdate,
            advance_hour
                .after(crate::allocation::allocate_water)
                .in_set(SimulationSet::PostSim),
        );
    }
}

use bevy::prelude::*;
use std::time::Duration;

pub mod allocation;
pub mod config;
pub mod driver;
pub mod network;
pub mod scenario;
pub mod simulation_sets;
pub mod snapshot;

#[cfg(any(test, feature = "bench"))]
pub mod test_harness;

pub use simulation_sets::SimulationSet;
pub use snapshot::{decode_or_warn, Snapshot, SnapshotRegistry};

/// Fixed timestep driving the simulation: one `FixedUpdate` tick is one
/// simulated hour. 50ms wall-clock per hour keeps headless runs fast while
/// staying exactly representable as a `Duration`.
pub const HOUR_TICK: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Time::<Fixed>::from_duration(HOUR_TICK))
            .init_resource::<config::SchedulerConfig>()
            .init_resource::<SnapshotRegistry>()
            .configure_sets(
                FixedUpdate,
                (
                    SimulationSet::PreSim,
                    SimulationSet::Allocation,
                    SimulationSet::PostSim,
                )
                    .chain(),
            )
            .add_systems(
                Startup,
                (scenario::init_network, snapshot::restore_pending_snapshot).chain(),
            );

        app.add_plugins((
            network::TopologyPlugin,
            allocation::AllocationPlugin,
            driver::DriverPlugin,
        ));
    }
}

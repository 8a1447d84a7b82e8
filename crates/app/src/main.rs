//! Headless scheduler runner.
//!
//! Usage: `acequia [scenario.json]`. Without an argument the built-in demo
//! valley is simulated. The process runs the fixed-timestep loop until the
//! driver halts, prints a run summary, and exits.
//!
//! `ACEQUIA_SNAPSHOT=<path>` writes a run snapshot (driver state and
//! allocation report) when the run halts; `ACEQUIA_RESUME=<path>` loads one
//! back at startup.

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use simulation::allocation::AllocationReport;
use simulation::config::SchedulerConfig;
use simulation::driver::DriverState;
use simulation::network::{deficit, NetworkOrder, Region, WaterSource};
use simulation::scenario::{load_scenario, PendingScenario};
use simulation::snapshot::{read_snapshot, write_snapshot, PendingSnapshot};
use simulation::{SimulationPlugin, SnapshotRegistry};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let scenario = match args.next() {
        Some(path) => match load_scenario(Path::new(&path)) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("acequia: cannot load scenario '{path}': {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let resume = match std::env::var_os("ACEQUIA_RESUME") {
        Some(path) => match read_snapshot(Path::new(&path)) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                eprintln!("acequia: cannot load snapshot {path:?}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(1))),
    );
    app.add_plugins(LogPlugin::default());

    if let Some(file) = scenario {
        app.insert_resource(PendingScenario(file));
    }
    if let Some(snapshot) = resume {
        app.insert_resource(PendingSnapshot(snapshot));
    }

    app.add_plugins(SimulationPlugin);
    app.add_systems(Update, exit_when_halted);

    match app.run() {
        AppExit::Success => ExitCode::SUCCESS,
        AppExit::Error(code) => ExitCode::from(code.get()),
    }
}

/// Watches the driver's halt latch, prints the run summary once, writes the
/// run snapshot if one was requested, and exits.
///
/// A scenario rejected at startup halts the driver with no reason set; that
/// run exits with a failure code.
fn exit_when_halted(world: &mut World, mut printed: Local<bool>) {
    let driver = world.resource::<DriverState>().clone();
    if !driver.halted || *printed {
        return;
    }
    *printed = true;

    let Some(reason) = driver.halt_reason else {
        world.send_event(AppExit::error());
        return;
    };

    let report = world.resource::<AllocationReport>().clone();
    println!("run halted: {} after {} hour(s)", reason.name(), driver.hour);
    println!(
        "  {} transfer(s), {:.2} m3 moved in total",
        report.total_transfers, report.total_volume
    );

    let epsilon = world.resource::<SchedulerConfig>().epsilon;
    let mut ordered: Vec<(NetworkOrder, Region)> = world
        .query::<(&NetworkOrder, &Region)>()
        .iter(world)
        .map(|(order, region)| (*order, region.clone()))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);
    for (_, region) in &ordered {
        let mark = if deficit(region) <= epsilon { "ok" } else { "DRY" };
        println!(
            "  region {:<16} {:>8.2} / {:>8.2} m3 (capacity {:.0}) [{}]",
            region.name, region.level, region.need, region.capacity, mark
        );
    }
    for source in world.query::<&WaterSource>().iter(world) {
        println!("  source {:<16} {:>8.2} m3 remaining", source.name, source.level);
    }

    if let Some(path) = std::env::var_os("ACEQUIA_SNAPSHOT").map(PathBuf::from) {
        let snapshot = world.resource::<SnapshotRegistry>().capture_all(world);
        match write_snapshot(&path, &snapshot) {
            Ok(()) => info!("run snapshot written to {}", path.display()),
            Err(e) => error!("cannot write snapshot to {}: {e}", path.display()),
        }
    }

    world.send_event(AppExit::Success);
}

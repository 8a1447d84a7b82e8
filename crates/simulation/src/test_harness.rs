//! # TestBasin -- headless integration test harness
//!
//! Provides a fluent builder that wraps `bevy::app::App` + `SimulationPlugin`
//! for running allocation scenarios without a scheduler runner or renderer.

use bevy::app::App;
use bevy::prelude::*;
use std::collections::BTreeMap;

use crate::allocation::AllocationReport;
use crate::config::SchedulerConfig;
use crate::driver::DriverState;
use crate::network::{Canal, NetworkOrder, Region, WaterSource};
use crate::scenario::{apply_scenario, ScenarioFile, SkipScenarioInit};
use crate::{SimulationPlugin, SnapshotRegistry, HOUR_TICK};

/// A headless Bevy App wrapping `SimulationPlugin` for integration testing.
///
/// Use builder methods to set up the water network, then call `run_hours()`
/// to advance the simulation and query/assert on the resulting ECS state.
pub struct TestBasin {
    app: App,
    next_region_order: u32,
    next_canal_order: u32,
}

impl TestBasin {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Create an **empty** basin: no regions, canals, or sources. The demo
    /// scenario is NOT loaded.
    pub fn new() -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);

        // Insert the marker BEFORE SimulationPlugin so init_network skips.
        app.insert_resource(SkipScenarioInit);
        app.add_plugins(SimulationPlugin);

        // Drive the clock manually: hours advance only through the explicit
        // strategy switch in `run_hours`, never from wall-clock drift.
        app.insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
            std::time::Duration::ZERO,
        ));

        // Run one update so Startup systems execute (init_network will no-op).
        app.update();

        Self {
            app,
            next_region_order: 0,
            next_canal_order: 0,
        }
    }

    /// Create a basin from a pre-built scenario.
    pub fn from_scenario(file: &ScenarioFile) -> Self {
        let mut basin = Self::new();
        apply_scenario(basin.app.world_mut(), file).expect("test scenario should apply");
        basin.next_region_order = file.regions.len() as u32;
        basin.next_canal_order = file.canals.len() as u32;
        basin
    }

    // -----------------------------------------------------------------------
    // World setup (builder pattern -- consumes and returns Self)
    // -----------------------------------------------------------------------

    /// Replace the scheduler configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.app.insert_resource(config);
        self
    }

    /// Spawn a region. Builder call order fixes the donor scan order.
    pub fn with_region(mut self, name: &str, level: f32, need: f32, capacity: f32) -> Self {
        let order = self.next_region_order;
        self.next_region_order += 1;
        self.app.world_mut().spawn((
            Region {
                name: name.to_string(),
                level,
                need,
                capacity,
            },
            NetworkOrder(order),
        ));
        self
    }

    /// Spawn a water source.
    pub fn with_source(mut self, name: &str, level: f32) -> Self {
        self.app.world_mut().spawn(WaterSource {
            name: name.to_string(),
            level,
        });
        self
    }

    /// Spawn a canal between two named regions, optionally drawing from a
    /// named source. The regions (and source, if any) must already exist.
    pub fn with_canal(mut self, from: &str, to: &str, source: Option<&str>) -> Self {
        let from_entity = self.region_entity(from);
        let to_entity = self.region_entity(to);
        let source_entity = source.map(|name| self.source_entity(name));
        let order = self.next_canal_order;
        self.next_canal_order += 1;
        self.app.world_mut().spawn((
            Canal::new(from_entity, to_entity, source_entity),
            NetworkOrder(order),
        ));
        self
    }

    // -----------------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------------

    /// Run N simulated hours (one `FixedUpdate` tick each).
    pub fn run_hours(&mut self, n: u32) {
        self.app
            .insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(HOUR_TICK));
        for _ in 0..n {
            self.app.update();
        }
        self.app
            .insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
                std::time::Duration::ZERO,
            ));
    }

    // -----------------------------------------------------------------------
    // Queries (note: Bevy's World::query() requires &mut World)
    // -----------------------------------------------------------------------

    /// Entity of the region with the given name. Panics when absent.
    pub fn region_entity(&mut self, name: &str) -> Entity {
        let world = self.app.world_mut();
        world
            .query::<(Entity, &Region)>()
            .iter(world)
            .find(|(_, region)| region.name == name)
            .map(|(entity, _)| entity)
            .unwrap_or_else(|| panic!("no region named '{name}'"))
    }

    /// Entity of the water source with the given name. Panics when absent.
    pub fn source_entity(&mut self, name: &str) -> Entity {
        let world = self.app.world_mut();
        world
            .query::<(Entity, &WaterSource)>()
            .iter(world)
            .find(|(_, source)| source.name == name)
            .map(|(entity, _)| entity)
            .unwrap_or_else(|| panic!("no water source named '{name}'"))
    }

    /// Snapshot of the named region's component.
    pub fn region(&mut self, name: &str) -> Region {
        let world = self.app.world_mut();
        world
            .query::<&Region>()
            .iter(world)
            .find(|region| region.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no region named '{name}'"))
    }

    /// Current level of the named water source.
    pub fn source_level(&mut self, name: &str) -> f32 {
        let world = self.app.world_mut();
        world
            .query::<&WaterSource>()
            .iter(world)
            .find(|source| source.name == name)
            .map(|source| source.level)
            .unwrap_or_else(|| panic!("no water source named '{name}'"))
    }

    /// Snapshot of the first-spawned canal running from `from` to `to`.
    pub fn canal_between(&mut self, from: &str, to: &str) -> Canal {
        let from_entity = self.region_entity(from);
        let to_entity = self.region_entity(to);
        let world = self.app.world_mut();
        world
            .query::<(&NetworkOrder, &Canal)>()
            .iter(world)
            .filter(|(_, canal)| {
                canal.source_region == from_entity && canal.destination_region == to_entity
            })
            .min_by_key(|(order, _)| **order)
            .map(|(_, canal)| canal.clone())
            .unwrap_or_else(|| panic!("no canal from '{from}' to '{to}'"))
    }

    /// Number of canals currently open.
    pub fn open_canal_count(&mut self) -> usize {
        let world = self.app.world_mut();
        world
            .query::<&Canal>()
            .iter(world)
            .filter(|canal| canal.is_open)
            .count()
    }

    /// Total water held across all regions and sources (for conservation
    /// checks; transfers deplete both the donor and the source, so each
    /// executed transfer shrinks this total by exactly the amount moved).
    pub fn total_water(&mut self) -> f32 {
        let world = self.app.world_mut();
        let regions: f32 = world.query::<&Region>().iter(world).map(|r| r.level).sum();
        let sources: f32 = world
            .query::<&WaterSource>()
            .iter(world)
            .map(|s| s.level)
            .sum();
        regions + sources
    }

    /// Get the driver state.
    pub fn driver(&self) -> &DriverState {
        self.app.world().resource::<DriverState>()
    }

    /// Get the allocation report.
    pub fn report(&self) -> &AllocationReport {
        self.app.world().resource::<AllocationReport>()
    }

    /// Get a reference to any resource.
    pub fn resource<T: Resource>(&self) -> &T {
        self.app.world().resource::<T>()
    }

    /// Capture all registered run-state resources into a snapshot map.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let world = self.app.world();
        world.resource::<SnapshotRegistry>().capture_all(world)
    }

    // -----------------------------------------------------------------------
    // Assertions
    // -----------------------------------------------------------------------

    /// Assert every region sits within `[0, capacity]` and every source is
    /// non-negative.
    pub fn assert_network_invariants(&mut self) {
        let world = self.app.world_mut();
        for region in world.query::<&Region>().iter(world) {
            assert!(
                region.level >= -1e-4,
                "region '{}' level {} dropped below zero",
                region.name,
                region.level
            );
            assert!(
                region.level <= region.capacity + 1e-4,
                "region '{}' level {} exceeds capacity {}",
                region.name,
                region.level,
                region.capacity
            );
        }
        for source in world.query::<&WaterSource>().iter(world) {
            assert!(
                source.level >= -1e-4,
                "water source '{}' level {} dropped below zero",
                source.name,
                source.level
            );
        }
    }

    /// Assert the driver has halted with the given reason.
    pub fn assert_halted(&self, reason: crate::driver::HaltReason) {
        let driver = self.driver();
        assert!(driver.halted, "expected a halted run");
        assert_eq!(
            driver.halt_reason,
            Some(reason),
            "unexpected halt reason (hour {})",
            driver.hour
        );
    }
}

impl Default for TestBasin {
    fn default() -> Self {
        Self::new()
    }
}

//! Scenario construction: JSON scenario files, the built-in demo valley,
//! and a seeded random generator.
//!
//! A scenario is the external setup the scheduler contracts with: it names
//! every water source and region, wires canals between them by name, and
//! may override the scheduler configuration. Name resolution and config
//! validation happen before anything is spawned, so a rejected scenario
//! leaves the world untouched.

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::{ConfigError, SchedulerConfig};
use crate::driver::DriverState;
use crate::network::{Canal, NetworkOrder, Region, WaterSource};

// =============================================================================
// Scenario schema
// =============================================================================

/// A water source entry in a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Unique source name, referenced by canals.
    pub name: String,
    /// Starting water volume (cubic meters).
    pub level: f32,
}

/// A region entry in a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Unique region name, referenced by canals.
    pub name: String,
    /// Starting water level (cubic meters).
    pub level: f32,
    /// Target level (cubic meters).
    pub need: f32,
    /// Storage capacity (cubic meters).
    pub capacity: f32,
}

/// A canal entry in a scenario file. Endpoints and the source are resolved
/// by name; `source` may be omitted for a dry canal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanalSpec {
    /// Donor region name.
    pub from: String,
    /// Destination region name.
    pub to: String,
    /// Water source name, if the canal has one.
    #[serde(default)]
    pub source: Option<String>,
}

/// A complete scenario: the network topology plus an optional scheduler
/// configuration override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    /// Scheduler overrides; defaults apply when absent.
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    /// All water sources.
    pub sources: Vec<SourceSpec>,
    /// All regions, in enumeration order (this order is the donor scan order).
    pub regions: Vec<RegionSpec>,
    /// All canals, in enumeration order.
    pub canals: Vec<CanalSpec>,
}

// =============================================================================
// Errors
// =============================================================================

/// Failures while loading or applying a scenario.
#[derive(Debug)]
pub enum ScenarioError {
    /// I/O error reading the scenario file.
    Io(std::io::Error),
    /// The file is not valid scenario JSON.
    Parse(serde_json::Error),
    /// A canal references a region name that doesn't exist.
    UnknownRegion(String),
    /// A canal references a water source name that doesn't exist.
    UnknownSource(String),
    /// Two regions share a name.
    DuplicateRegion(String),
    /// Two water sources share a name.
    DuplicateSource(String),
    /// The embedded scheduler block violates a configuration invariant.
    Config(ConfigError),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Io(e) => write!(f, "I/O error: {e}"),
            ScenarioError::Parse(e) => write!(f, "parse error: {e}"),
            ScenarioError::UnknownRegion(name) => {
                write!(f, "canal references unknown region '{name}'")
            }
            ScenarioError::UnknownSource(name) => {
                write!(f, "canal references unknown water source '{name}'")
            }
            ScenarioError::DuplicateRegion(name) => write!(f, "duplicate region name '{name}'"),
            ScenarioError::DuplicateSource(name) => {
                write!(f, "duplicate water source name '{name}'")
            }
            ScenarioError::Config(e) => write!(f, "invalid scheduler configuration: {e}"),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Io(e) => Some(e),
            ScenarioError::Parse(e) => Some(e),
            ScenarioError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e)
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(e: serde_json::Error) -> Self {
        ScenarioError::Parse(e)
    }
}

// =============================================================================
// Loading and spawning
// =============================================================================

/// Read and parse a scenario file from disk.
pub fn load_scenario(path: &Path) -> Result<ScenarioFile, ScenarioError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Validate a scenario and spawn its network into the world.
///
/// Validation runs entirely before the first spawn, so an `Err` leaves the
/// world untouched. Regions and canals get `NetworkOrder` ordinals matching
/// their file order, which fixes the donor scan order and canal list order
/// for the whole run.
pub fn apply_scenario(world: &mut World, file: &ScenarioFile) -> Result<(), ScenarioError> {
    if let Some(config) = &file.scheduler {
        config.validate().map_err(ScenarioError::Config)?;
    }

    // Resolve every name before touching the world.
    let mut source_names: HashMap<&str, usize> = HashMap::new();
    for (i, spec) in file.sources.iter().enumerate() {
        if source_names.insert(spec.name.as_str(), i).is_some() {
            return Err(ScenarioError::DuplicateSource(spec.name.clone()));
        }
    }
    let mut region_names: HashMap<&str, usize> = HashMap::new();
    for (i, spec) in file.regions.iter().enumerate() {
        if region_names.insert(spec.name.as_str(), i).is_some() {
            return Err(ScenarioError::DuplicateRegion(spec.name.clone()));
        }
    }
    for canal in &file.canals {
        if !region_names.contains_key(canal.from.as_str()) {
            return Err(ScenarioError::UnknownRegion(canal.from.clone()));
        }
        if !region_names.contains_key(canal.to.as_str()) {
            return Err(ScenarioError::UnknownRegion(canal.to.clone()));
        }
        if let Some(source) = &canal.source {
            if !source_names.contains_key(source.as_str()) {
                return Err(ScenarioError::UnknownSource(source.clone()));
            }
        }
    }

    if let Some(config) = &file.scheduler {
        world.insert_resource(config.clone());
    }

    let source_entities: Vec<Entity> = file
        .sources
        .iter()
        .map(|spec| {
            world
                .spawn(WaterSource {
                    name: spec.name.clone(),
                    level: spec.level,
                })
                .id()
        })
        .collect();

    let region_entities: Vec<Entity> = file
        .regions
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            world
                .spawn((
                    Region {
                        name: spec.name.clone(),
                        level: spec.level,
                        need: spec.need,
                        capacity: spec.capacity,
                    },
                    NetworkOrder(i as u32),
                ))
                .id()
        })
        .collect();

    for (i, spec) in file.canals.iter().enumerate() {
        let from = region_entities[region_names[spec.from.as_str()]];
        let to = region_entities[region_names[spec.to.as_str()]];
        let source = spec
            .source
            .as_ref()
            .map(|name| source_entities[source_names[name.as_str()]]);
        world.spawn((Canal::new(from, to, source), NetworkOrder(i as u32)));
    }

    Ok(())
}

// =============================================================================
// Startup
// =============================================================================

/// Marker resource: insert before `SimulationPlugin` to suppress scenario
/// spawning at startup (used by the test harness).
#[derive(Resource, Default)]
pub struct SkipScenarioInit;

/// A scenario handed to the simulation by the outer setup, consumed at
/// startup. When absent, the built-in demo valley is used.
#[derive(Resource, Debug, Clone)]
pub struct PendingScenario(pub ScenarioFile);

/// Startup system: spawn the pending scenario, or the demo valley.
///
/// A rejected scenario halts the driver immediately instead of panicking;
/// the run then reports zero hours and the halt is visible to the caller.
pub fn init_network(world: &mut World) {
    if world.get_resource::<SkipScenarioInit>().is_some() {
        return;
    }

    let file = match world.remove_resource::<PendingScenario>() {
        Some(PendingScenario(file)) => file,
        None => demo_scenario(),
    };

    match apply_scenario(world, &file) {
        Ok(()) => info!(
            "scenario loaded: {} regions, {} canals, {} sources",
            file.regions.len(),
            file.canals.len(),
            file.sources.len()
        ),
        Err(e) => {
            error!("scenario rejected: {e}");
            if let Some(mut driver) = world.get_resource_mut::<DriverState>() {
                driver.halted = true;
            }
        }
    }
}

// =============================================================================
// Built-in scenarios
// =============================================================================

/// The built-in demo: a small irrigation valley with two donors, two needy
/// regions, and two reservoirs.
pub fn demo_scenario() -> ScenarioFile {
    ScenarioFile {
        scheduler: None,
        sources: vec![
            SourceSpec {
                name: "rio_bravo".to_string(),
                level: 400.0,
            },
            SourceSpec {
                name: "mountain_spring".to_string(),
                level: 120.0,
            },
        ],
        regions: vec![
            RegionSpec {
                name: "upper_valley".to_string(),
                level: 90.0,
                need: 40.0,
                capacity: 120.0,
            },
            RegionSpec {
                name: "lower_valley".to_string(),
                level: 10.0,
                need: 60.0,
                capacity: 100.0,
            },
            RegionSpec {
                name: "mesa".to_string(),
                level: 15.0,
                need: 30.0,
                capacity: 60.0,
            },
            RegionSpec {
                name: "bosque".to_string(),
                level: 70.0,
                need: 30.0,
                capacity: 90.0,
            },
        ],
        canals: vec![
            CanalSpec {
                from: "upper_valley".to_string(),
                to: "lower_valley".to_string(),
                source: Some("rio_bravo".to_string()),
            },
            CanalSpec {
                from: "upper_valley".to_string(),
                to: "mesa".to_string(),
                source: Some("rio_bravo".to_string()),
            },
            CanalSpec {
                from: "bosque".to_string(),
                to: "lower_valley".to_string(),
                source: Some("mountain_spring".to_string()),
            },
            CanalSpec {
                from: "bosque".to_string(),
                to: "mesa".to_string(),
                source: Some("mountain_spring".to_string()),
            },
        ],
    }
}

/// Generate a reproducible random scenario from a seed.
///
/// Roughly half the regions start above their need and the rest below it;
/// one canal in ten is left without a water source to exercise the
/// ineligibility path.
pub fn random_scenario(seed: u64, region_count: usize, canal_count: usize) -> ScenarioFile {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let source_count = (region_count / 2).max(1);
    let sources: Vec<SourceSpec> = (0..source_count)
        .map(|i| SourceSpec {
            name: format!("source_{i}"),
            level: rng.gen_range(50.0..500.0),
        })
        .collect();

    let regions: Vec<RegionSpec> = (0..region_count)
        .map(|i| {
            let capacity: f32 = rng.gen_range(50.0..200.0);
            let need = capacity * rng.gen_range(0.2..0.5);
            let level = if i % 2 == 0 {
                // Donor-ish: comfortably above need.
                (need + capacity * rng.gen_range(0.2..0.4)).min(capacity)
            } else {
                // Needy: below need.
                need * rng.gen_range(0.0..0.8)
            };
            RegionSpec {
                name: format!("region_{i}"),
                level,
                need,
                capacity,
            }
        })
        .collect();

    let canals: Vec<CanalSpec> = (0..canal_count)
        .map(|_| {
            let from = rng.gen_range(0..region_count);
            let mut to = rng.gen_range(0..region_count);
            if to == from {
                to = (to + 1) % region_count;
            }
            let source = if rng.gen_bool(0.9) {
                Some(format!("source_{}", rng.gen_range(0..source_count)))
            } else {
                None
            };
            CanalSpec {
                from: format!("region_{from}"),
                to: format!("region_{to}"),
                source,
            }
        })
        .collect();

    ScenarioFile {
        scheduler: None,
        sources,
        regions,
        canals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_HOURS;

    fn count_spawned(world: &mut World) -> (usize, usize, usize) {
        let regions = world.query::<&Region>().iter(world).count();
        let canals = world.query::<&Canal>().iter(world).count();
        let sources = world.query::<&WaterSource>().iter(world).count();
        (regions, canals, sources)
    }

    #[test]
    fn test_parse_minimal_scenario() {
        let json = r#"{
            "sources": [{"name": "river", "level": 100.0}],
            "regions": [
                {"name": "a", "level": 20.0, "need": 10.0, "capacity": 30.0},
                {"name": "b", "level": 2.0, "need": 10.0, "capacity": 20.0}
            ],
            "canals": [{"from": "a", "to": "b", "source": "river"}]
        }"#;
        let file: ScenarioFile = serde_json::from_str(json).expect("scenario should parse");
        assert_eq!(file.regions.len(), 2);
        assert_eq!(file.canals.len(), 1);
        assert!(file.scheduler.is_none());
    }

    #[test]
    fn test_parse_scheduler_override() {
        let json = r#"{
            "scheduler": {"max_hours": 24},
            "sources": [],
            "regions": [],
            "canals": []
        }"#;
        let file: ScenarioFile = serde_json::from_str(json).expect("scenario should parse");
        let config = file.scheduler.expect("scheduler block present");
        assert_eq!(config.max_hours, 24);
        assert_ne!(config.max_hours, DEFAULT_MAX_HOURS);
    }

    #[test]
    fn test_apply_spawns_everything() {
        let mut world = World::new();
        apply_scenario(&mut world, &demo_scenario()).expect("demo scenario applies");
        let (regions, canals, sources) = count_spawned(&mut world);
        assert_eq!(regions, 4);
        assert_eq!(canals, 4);
        assert_eq!(sources, 2);
    }

    #[test]
    fn test_apply_rejects_unknown_region() {
        let mut file = demo_scenario();
        file.canals.push(CanalSpec {
            from: "atlantis".to_string(),
            to: "mesa".to_string(),
            source: None,
        });

        let mut world = World::new();
        let err = apply_scenario(&mut world, &file).expect_err("unknown region must be rejected");
        assert!(matches!(err, ScenarioError::UnknownRegion(name) if name == "atlantis"));

        // Validation failed before spawning: world stays empty.
        let (regions, canals, sources) = count_spawned(&mut world);
        assert_eq!((regions, canals, sources), (0, 0, 0));
    }

    #[test]
    fn test_apply_rejects_unknown_source() {
        let mut file = demo_scenario();
        file.canals[0].source = Some("mirage".to_string());

        let mut world = World::new();
        let err = apply_scenario(&mut world, &file).expect_err("unknown source must be rejected");
        assert!(matches!(err, ScenarioError::UnknownSource(name) if name == "mirage"));
    }

    #[test]
    fn test_apply_rejects_duplicate_region() {
        let mut file = demo_scenario();
        let dup = file.regions[0].clone();
        file.regions.push(dup);

        let mut world = World::new();
        let err = apply_scenario(&mut world, &file).expect_err("duplicate region must be rejected");
        assert!(matches!(err, ScenarioError::DuplicateRegion(name) if name == "upper_valley"));
    }

    #[test]
    fn test_apply_rejects_invalid_scheduler_block() {
        let mut file = demo_scenario();
        file.scheduler = Some(SchedulerConfig {
            max_transfer_loops: 0,
            ..Default::default()
        });

        let mut world = World::new();
        let err = apply_scenario(&mut world, &file).expect_err("invalid config must be rejected");
        assert!(matches!(err, ScenarioError::Config(_)));
    }

    #[test]
    fn test_canal_without_source_is_allowed() {
        let mut file = demo_scenario();
        file.canals[0].source = None;

        let mut world = World::new();
        apply_scenario(&mut world, &file).expect("dry canal is valid");
    }

    #[test]
    fn test_random_scenario_is_reproducible() {
        let a = random_scenario(7, 10, 15);
        let b = random_scenario(7, 10, 15);
        assert_eq!(serde_json::to_string(&a).ok(), serde_json::to_string(&b).ok());
    }

    #[test]
    fn test_random_scenario_has_no_self_loops() {
        let file = random_scenario(123, 8, 40);
        for canal in &file.canals {
            assert_ne!(canal.from, canal.to);
        }
    }

    #[test]
    fn test_random_scenario_applies_cleanly() {
        let mut world = World::new();
        apply_scenario(&mut world, &random_scenario(99, 12, 20)).expect("generated names resolve");
        let (regions, canals, sources) = count_spawned(&mut world);
        assert_eq!(regions, 12);
        assert_eq!(canals, 20);
        assert_eq!(sources, 6);
    }
}

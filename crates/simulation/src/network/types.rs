use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Components
// =============================================================================

/// A water-consuming node: current level, target need, and storage capacity.
///
/// The scheduler is the only mutator of `level`; `need` and `capacity` are
/// fixed at spawn. External setup is expected to maintain
/// `0 <= level <= capacity`; the scheduler preserves that invariant but does
/// not repair out-of-range input.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Display name used in logs and run summaries.
    pub name: String,
    /// Current stored water volume (cubic meters).
    pub level: f32,
    /// Target level the region wants to hold (cubic meters).
    pub need: f32,
    /// Maximum storage (cubic meters). Always positive.
    pub capacity: f32,
}

/// A finite reservoir feeding one or more canals. Depleted by transfers,
/// never replenished by the scheduler.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct WaterSource {
    /// Display name used in logs and run summaries.
    pub name: String,
    /// Remaining water volume (cubic meters). Never negative.
    pub level: f32,
}

/// A directed transport edge between two regions, drawing from one water
/// source.
///
/// Endpoints are fixed for the canal's lifetime. `water_source` may be
/// absent, which makes the canal permanently ineligible (checked at
/// transfer time, not at index-build time). `is_open` and `flow_rate` are
/// reset at the start of every hour.
#[derive(Component, Debug, Clone)]
pub struct Canal {
    /// The donor end of the edge.
    pub source_region: Entity,
    /// The receiving end of the edge.
    pub destination_region: Entity,
    /// The reservoir this canal draws from, if it has one.
    pub water_source: Option<Entity>,
    /// Whether water moved through this canal in the current hour.
    pub is_open: bool,
    /// Instantaneous flow in cubic meters per second.
    pub flow_rate: f32,
}

impl Canal {
    /// A closed canal between two regions drawing from an optional source.
    pub fn new(
        source_region: Entity,
        destination_region: Entity,
        water_source: Option<Entity>,
    ) -> Self {
        Self {
            source_region,
            destination_region,
            water_source,
            is_open: false,
            flow_rate: 0.0,
        }
    }
}

/// Spawn-order ordinal attached to regions and canals.
///
/// Bevy query iteration order is not guaranteed, but donor scan order and
/// canal list order are behaviorally significant, so every enumeration the
/// scheduler performs sorts by this ordinal first.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NetworkOrder(pub u32);

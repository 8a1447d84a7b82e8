use bevy::prelude::*;
use std::collections::HashMap;

use super::types::{Canal, NetworkOrder};
use crate::SimulationSet;

// =============================================================================
// Canal index
// =============================================================================

/// Derived lookup from (donor region, destination region) to the canals
/// connecting them, in canal spawn order.
///
/// Built by [`rebuild_canal_index`] whenever the canal set changes and
/// read-only during the hour's transfer loop. Every canal lands in exactly
/// one bucket; canals without a water source are indexed too, since
/// eligibility is checked at transfer time.
#[derive(Resource, Debug, Default)]
pub struct CanalIndex {
    routes: HashMap<(Entity, Entity), Vec<Entity>>,
    indexed_canals: usize,
}

impl CanalIndex {
    /// The canals running from `donor` to `target`, if any exist.
    pub fn canals_between(&self, donor: Entity, target: Entity) -> Option<&[Entity]> {
        self.routes.get(&(donor, target)).map(Vec::as_slice)
    }

    /// Number of (donor, target) pairs with at least one canal.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of canals currently indexed.
    pub fn canal_count(&self) -> usize {
        self.indexed_canals
    }

    /// Rebuild from scratch: one O(n) pass over the canal set.
    fn rebuild(&mut self, canals: &[(Entity, NetworkOrder, Entity, Entity)]) {
        self.routes.clear();
        for (canal, _, from, to) in canals {
            self.routes.entry((*from, *to)).or_default().push(*canal);
        }
        self.indexed_canals = canals.len();
    }
}

// =============================================================================
// Systems
// =============================================================================

/// System: rebuild the canal index when canals have been spawned or
/// despawned. Runs in `PreSim`, before the allocation pass reads it.
pub fn rebuild_canal_index(
    mut index: ResMut<CanalIndex>,
    canals: Query<(Entity, &NetworkOrder, &Canal)>,
    added: Query<(), Added<Canal>>,
) {
    let dirty = !added.is_empty() || index.canal_count() != canals.iter().len();
    if !dirty {
        return;
    }

    // Sort by spawn ordinal so each bucket's canal list order is stable.
    let mut entries: Vec<(Entity, NetworkOrder, Entity, Entity)> = canals
        .iter()
        .map(|(entity, order, canal)| {
            (entity, *order, canal.source_region, canal.destination_region)
        })
        .collect();
    entries.sort_by_key(|(_, order, _, _)| *order);

    index.rebuild(&entries);
    debug!(
        "canal index rebuilt: {} canals across {} routes",
        index.canal_count(),
        index.route_count()
    );
}

// =============================================================================
// Plugin
// =============================================================================

pub struct TopologyPlugin;

impl Plugin for TopologyPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CanalIndex>().add_systems(
            FixedUpdate,
            rebuild_canal_index.in_set(SimulationSet::PreSim),
        );
    }
}

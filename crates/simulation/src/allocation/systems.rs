//! The per-hour greedy allocation pass.
//!
//! Three phases, run synchronously inside one `FixedUpdate` tick:
//!
//! 1. **Reset** -- every canal is closed and its flow zeroed, so no stale
//!    flow state leaks between hours.
//! 2. **Partition** -- regions split into a max-heap of needs (deficit
//!    above epsilon, largest first) and a donor list (safe surplus above
//!    epsilon, in spawn order).
//! 3. **Transfer loop** -- repeatedly serve the largest remaining need
//!    from the donors that have a canal to it, bounded by the configured
//!    loop cap. Donors are scanned in their fixed list order, never
//!    re-sorted by surplus size; a satisfied target immediately stops its
//!    scan. Both choices are deliberate greedy policy, not bugs.
//!
//! Missing data (no canal, no water source, empty reservoir) is
//! ineligibility, not an error: the pass skips and continues.

use bevy::prelude::*;
use std::collections::BinaryHeap;

use super::types::{AllocationReport, Need, TransferEvent};
use crate::config::SchedulerConfig;
use crate::driver::DriverState;
use crate::network::{
    deficit, headroom, safe_surplus, Canal, CanalIndex, NetworkOrder, Region, WaterSource,
};
use crate::{SimulationSet, SnapshotRegistry};

/// Transfer amounts are volumes per hour; canal flow rates are expressed
/// in volume per second.
pub const SECONDS_PER_HOUR: f32 = 3600.0;

// ---------------------------------------------------------------------------
// Allocation pass
// ---------------------------------------------------------------------------

/// System: run one hour of water allocation.
///
/// Mutates region, canal, and water source state in place. Success and
/// failure are entirely reflected in the resulting state plus the
/// `did_transfer` flag in [`AllocationReport`], which the driver uses to
/// decide whether further hours are worth attempting.
#[allow(clippy::too_many_arguments)]
pub fn allocate_water(
    config: Res<SchedulerConfig>,
    driver: Res<DriverState>,
    index: Res<CanalIndex>,
    mut report: ResMut<AllocationReport>,
    mut regions: Query<(Entity, &NetworkOrder, &mut Region)>,
    mut canals: Query<&mut Canal>,
    mut sources: Query<&mut WaterSource>,
    mut transfers: EventWriter<TransferEvent>,
) {
    if driver.halted {
        return;
    }

    let eps = config.epsilon;
    let margin = config.safety_margin;

    // Phase 1: reset all canals (closed, zero flow).
    for mut canal in &mut canals {
        if canal.is_open {
            canal.is_open = false;
        }
        canal.flow_rate = 0.0;
    }

    // Phase 2: partition regions into needs and donors. Donor list order is
    // spawn order; it doubles as the scan order below, so it is never
    // re-sorted by surplus size.
    let mut ordered: Vec<(NetworkOrder, Entity)> = regions
        .iter()
        .map(|(entity, order, _)| (*order, entity))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);

    let mut needs: BinaryHeap<Need> = BinaryHeap::new();
    let mut donors: Vec<Entity> = Vec::new();
    let mut seq: u64 = 0;

    for &(_, entity) in &ordered {
        let Ok((_, _, region)) = regions.get(entity) else {
            continue;
        };
        let d = deficit(region);
        if d > eps {
            needs.push(Need {
                region: entity,
                amount: d,
                seq,
            });
            seq += 1;
        } else if safe_surplus(region, margin) > eps {
            donors.push(entity);
        }
    }

    // Phase 3: greedy transfer loop, always serving the largest remaining
    // deficit first. The loop cap guarantees termination even when an
    // unservable need keeps getting re-queued.
    let mut did_transfer = false;
    let mut transfer_count: u32 = 0;
    let mut volume: f32 = 0.0;
    let mut loops: u32 = 0;

    while !needs.is_empty() && !donors.is_empty() && loops < config.max_transfer_loops {
        loops += 1;
        let Some(mut need) = needs.pop() else {
            break;
        };
        let target = need.region;

        'donor_scan: for &donor in &donors {
            // Surplus may have shrunk from earlier transfers this hour.
            let Ok((_, _, donor_region)) = regions.get(donor) else {
                continue;
            };
            if safe_surplus(donor_region, margin) <= eps {
                continue;
            }

            let Some(canal_list) = index.canals_between(donor, target) else {
                continue;
            };

            for &canal_entity in canal_list {
                let Ok(canal) = canals.get(canal_entity) else {
                    continue;
                };
                let Some(source_entity) = canal.water_source else {
                    continue;
                };
                let Ok(source) = sources.get(source_entity) else {
                    continue;
                };
                if source.level <= eps {
                    continue;
                }

                // Everything is re-read fresh: a previous canal in this very
                // scan may already have moved water.
                let Ok((_, _, donor_region)) = regions.get(donor) else {
                    continue;
                };
                let Ok((_, _, target_region)) = regions.get(target) else {
                    continue;
                };
                let amount = need
                    .amount
                    .min(safe_surplus(donor_region, margin))
                    .min(source.level)
                    .min(headroom(target_region));
                if amount <= eps {
                    continue;
                }

                // Execute the transfer: the canal draws `amount` from its
                // source while the donor's own stock drops by the same amount.
                if let Ok(mut canal) = canals.get_mut(canal_entity) {
                    canal.is_open = true;
                    canal.flow_rate = amount / SECONDS_PER_HOUR;
                }
                if let Ok(mut source) = sources.get_mut(source_entity) {
                    source.level -= amount;
                }
                if let Ok((_, _, mut donor_region)) = regions.get_mut(donor) {
                    donor_region.level -= amount;
                }
                if let Ok((_, _, mut target_region)) = regions.get_mut(target) {
                    target_region.level += amount;
                }

                need.amount -= amount;
                did_transfer = true;
                transfer_count += 1;
                volume += amount;
                transfers.send(TransferEvent {
                    canal: canal_entity,
                    donor,
                    target,
                    amount,
                });

                if need.amount <= eps {
                    // Satisfied for this pass: stop scanning canals AND
                    // remaining donors, even if they could serve other needs.
                    break 'donor_scan;
                }
            }
        }

        // Still thirsty: re-queue to compete against the other needs on the
        // next iteration.
        if need.amount > eps {
            need.seq = seq;
            seq += 1;
            needs.push(need);
        }
    }

    report.did_transfer = did_transfer;
    report.last_hour_transfers = transfer_count;
    report.last_hour_volume = volume;
    report.last_hour_loops = loops;
    report.loop_cap_hit = loops >= config.max_transfer_loops && !needs.is_empty();
    report.total_transfers += u64::from(transfer_count);
    report.total_volume += volume;

    debug!(
        "allocation pass: {} transfers, {:.1} m3 moved, {} loop iterations",
        transfer_count, volume, loops
    );
}

/// System: log each executed transfer with region names. Runs in `PostSim`.
pub fn log_transfers(mut events: EventReader<TransferEvent>, regions: Query<&Region>) {
    for event in events.read() {
        if let (Ok(donor), Ok(target)) = (regions.get(event.donor), regions.get(event.target)) {
            debug!(
                "canal open: {:.2} m3 from {} to {}",
                event.amount, donor.name, target.name
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct AllocationPlugin;

impl Plugin for AllocationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AllocationReport>()
            .add_event::<TransferEvent>();

        // Register for snapshot capture/restore.
        let mut registry = app
            .world_mut()
            .get_resource_or_insert_with(SnapshotRegistry::default);
        registry.register::<AllocationReport>();

        app.add_systems(
            FixedUpdate,
            allocate_water.in_set(SimulationSet::Allocation),
        )
        .add_systems(FixedUpdate, log_transfers.in_set(SimulationSet::PostSim));
    }
}

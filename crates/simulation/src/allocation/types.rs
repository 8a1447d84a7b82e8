use bevy::prelude::*;
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{decode_or_warn, Snapshot};

// =============================================================================
// Need queue entries
// =============================================================================

/// Priority-queue entry for a region that still wants water this hour.
///
/// Ordered by remaining deficit descending. Ties break on the insertion
/// sequence number (earlier insertions win), which makes heap order fully
/// deterministic even when two regions carry the same deficit.
#[derive(Debug, Clone, Copy)]
pub struct Need {
    /// The needy region.
    pub region: Entity,
    /// How much it still needs (cubic meters).
    pub amount: f32,
    /// Monotonically increasing insertion counter, the deterministic tiebreak.
    pub seq: u64,
}

impl Ord for Need {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN never enters the queue (amounts come from max(0, ..) math), so
        // treating incomparable amounts as equal is safe.
        self.amount
            .partial_cmp(&other.amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Need {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Need {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Need {}

// =============================================================================
// Events
// =============================================================================

/// Fired for every executed transfer: `amount` left the donor and the
/// canal's water source, and arrived at the target.
#[derive(Event, Debug, Clone)]
pub struct TransferEvent {
    /// The canal that carried the water.
    pub canal: Entity,
    /// The donor region.
    pub donor: Entity,
    /// The receiving region.
    pub target: Entity,
    /// Volume moved this hour (cubic meters).
    pub amount: f32,
}

// =============================================================================
// Resources
// =============================================================================

/// Per-hour and cumulative allocation statistics.
///
/// `did_transfer` is the "any progress this hour" signal the driver reads
/// when deciding whether another hour is worth attempting.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct AllocationReport {
    /// Whether at least one transfer happened in the last allocation pass.
    pub did_transfer: bool,
    /// Transfers executed in the last pass.
    pub last_hour_transfers: u32,
    /// Volume moved in the last pass (cubic meters).
    pub last_hour_volume: f32,
    /// Transfer-loop iterations consumed by the last pass.
    pub last_hour_loops: u32,
    /// Whether the last pass hit the loop cap before draining its needs.
    pub loop_cap_hit: bool,
    /// Transfers executed across the whole run.
    pub total_transfers: u64,
    /// Volume moved across the whole run (cubic meters).
    pub total_volume: f32,
}

impl Snapshot for AllocationReport {
    const KEY: &'static str = "allocation_report";

    fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        decode_or_warn(Self::KEY, bytes)
    }
}

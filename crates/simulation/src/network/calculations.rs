use super::types::Region;

// =============================================================================
// Derived quantities
// =============================================================================

/// How much water a region still needs to reach its target level.
pub fn deficit(region: &Region) -> f32 {
    (region.need - region.level).max(0.0)
}

/// How much water a region can give up without dipping into its safety
/// buffer: excess above need, minus `margin` times capacity.
pub fn safe_surplus(region: &Region, margin: f32) -> f32 {
    let extra = region.level - region.need;
    let buffer = margin * region.capacity;
    (extra - buffer).max(0.0)
}

/// Remaining storage room before the region hits capacity.
pub fn headroom(region: &Region) -> f32 {
    region.capacity - region.level
}

mod calculations;
mod topology;
mod types;

#[cfg(test)]
mod tests;

pub use calculations::{deficit, headroom, safe_surplus};
pub use topology::{rebuild_canal_index, CanalIndex, TopologyPlugin};
pub use types::{Canal, NetworkOrder, Region, WaterSource};

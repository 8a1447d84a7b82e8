mod systems;
mod types;


pub use systems::{allocate_water, log_transfers, AllocationPlugin, SECONDS_PER_HOUR};
pub use types::{AllocationReport, Need, TransferEvent};

//! Run snapshots: capturing and restoring scheduler run state.
//!
//! A snapshot is a keyed map of encoded resources -- currently the driver
//! state and the allocation report. The app binary writes one when a run
//! halts and can load one back at startup, so a finished run's counters
//! survive the process. Each plugin registers its own resources; nothing
//! here knows the concrete types behind the keys.

use bevy::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

// =============================================================================
// Snapshot trait
// =============================================================================

/// A resource that participates in run snapshots.
///
/// Implementors own their encoding; the registry only shuttles bytes. Keys
/// must stay stable across versions since they are the lookup handle on
/// restore.
pub trait Snapshot: Resource + Default + Send + Sync + 'static {
    /// Stable key identifying this resource inside a snapshot.
    const KEY: &'static str;

    /// Encode the resource to bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decode the resource from bytes.
    fn from_bytes(bytes: &[u8]) -> Self;
}

/// Decode via `bitcode::decode`, warning and falling back to `Default` when
/// the bytes don't parse (stale or truncated snapshot files).
pub fn decode_or_warn<T: bitcode::DecodeOwned + Default>(key: &str, bytes: &[u8]) -> T {
    match bitcode::decode(bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!("snapshot key '{key}': {} undecodable bytes ({e})", bytes.len());
            T::default()
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

type CaptureFn = Box<dyn Fn(&World) -> Option<Vec<u8>> + Send + Sync>;
type RestoreFn = Box<dyn Fn(&mut World, &[u8]) + Send + Sync>;

struct SnapshotEntry {
    capture: CaptureFn,
    restore: RestoreFn,
}

/// All snapshot-able resources, keyed by [`Snapshot::KEY`].
///
/// Plugins register their resources in `build()`; consumers (the app binary,
/// the test harness) go through [`capture_all`](Self::capture_all) and
/// [`restore_all`](Self::restore_all) without naming any resource type.
#[derive(Resource, Default)]
pub struct SnapshotRegistry {
    entries: BTreeMap<&'static str, SnapshotEntry>,
}

impl SnapshotRegistry {
    /// Register a resource type. A second registration under the same key is
    /// a plugin wiring mistake; it warns and keeps the first.
    pub fn register<T: Snapshot>(&mut self) {
        if self.entries.contains_key(T::KEY) {
            warn!("snapshot key '{}' registered twice, keeping the first", T::KEY);
            debug_assert!(false, "snapshot key '{}' registered twice", T::KEY);
            return;
        }
        self.entries.insert(
            T::KEY,
            SnapshotEntry {
                capture: Box::new(|world| world.get_resource::<T>().map(|r| r.to_bytes())),
                restore: Box::new(|world, bytes| {
                    world.insert_resource(T::from_bytes(bytes));
                }),
            },
        );
    }

    /// Encode every registered resource present in the world.
    pub fn capture_all(&self, world: &World) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| {
                (entry.capture)(world).map(|bytes| (key.to_string(), bytes))
            })
            .collect()
    }

    /// Restore registered resources from a snapshot map. Keys without a
    /// registration are ignored; registered resources absent from the map
    /// keep their current value.
    pub fn restore_all(&self, world: &mut World, snapshot: &BTreeMap<String, Vec<u8>>) {
        for (key, entry) in &self.entries {
            if let Some(bytes) = snapshot.get(*key) {
                (entry.restore)(world, bytes);
            }
        }
    }
}

// =============================================================================
// Snapshot files
// =============================================================================

/// Failures reading or writing a snapshot file.
#[derive(Debug)]
pub enum SnapshotError {
    /// I/O error on the snapshot path.
    Io(std::io::Error),
    /// The file is not a valid snapshot encoding.
    Decode(bitcode::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "I/O error: {e}"),
            SnapshotError::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io(e) => Some(e),
            SnapshotError::Decode(_) => None,
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

/// Write a captured snapshot map to disk.
pub fn write_snapshot(
    path: &Path,
    snapshot: &BTreeMap<String, Vec<u8>>,
) -> Result<(), SnapshotError> {
    // Encoded as a key-sorted pair list; BTreeMap iteration makes the bytes
    // reproducible for identical state.
    let pairs: Vec<(String, Vec<u8>)> = snapshot
        .iter()
        .map(|(key, bytes)| (key.clone(), bytes.clone()))
        .collect();
    fs::write(path, bitcode::encode(&pairs))?;
    Ok(())
}

/// Read a snapshot map back from disk.
pub fn read_snapshot(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, SnapshotError> {
    let bytes = fs::read(path)?;
    let pairs: Vec<(String, Vec<u8>)> =
        bitcode::decode(&bytes).map_err(SnapshotError::Decode)?;
    Ok(pairs.into_iter().collect())
}

// =============================================================================
// Startup restore
// =============================================================================

/// A snapshot handed in by the outer setup, applied once at startup after
/// the scenario has spawned.
#[derive(Resource, Debug, Clone)]
pub struct PendingSnapshot(pub BTreeMap<String, Vec<u8>>);

/// Startup system: apply a pending snapshot through the registry.
pub fn restore_pending_snapshot(world: &mut World) {
    let Some(PendingSnapshot(snapshot)) = world.remove_resource::<PendingSnapshot>() else {
        return;
    };
    world.resource_scope(|world, registry: Mut<SnapshotRegistry>| {
        registry.restore_all(world, &snapshot);
    });
    info!("run snapshot restored: {} entries", snapshot.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationReport;
    use crate::driver::{DriverState, HaltReason};

    fn registry() -> SnapshotRegistry {
        let mut registry = SnapshotRegistry::default();
        registry.register::<DriverState>();
        registry.register::<AllocationReport>();
        registry
    }

    #[test]
    fn test_capture_holds_driver_and_report() {
        let mut world = World::new();
        world.insert_resource(DriverState {
            hour: 3,
            halted: false,
            halt_reason: None,
        });
        world.insert_resource(AllocationReport::default());

        let snapshot = registry().capture_all(&world);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key(DriverState::KEY));
        assert!(snapshot.contains_key(AllocationReport::KEY));
    }

    #[test]
    fn test_capture_skips_absent_resources() {
        let world = World::new();
        let snapshot = registry().capture_all(&world);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_restore_rebuilds_run_state_in_fresh_world() {
        let registry = registry();

        let mut world = World::new();
        world.insert_resource(DriverState {
            hour: 7,
            halted: true,
            halt_reason: Some(HaltReason::Solved),
        });
        world.insert_resource(AllocationReport {
            did_transfer: true,
            total_transfers: 12,
            total_volume: 88.5,
            ..Default::default()
        });
        let snapshot = registry.capture_all(&world);

        let mut fresh = World::new();
        fresh.insert_resource(DriverState::default());
        fresh.insert_resource(AllocationReport::default());
        registry.restore_all(&mut fresh, &snapshot);

        let driver = fresh.resource::<DriverState>();
        assert_eq!(driver.hour, 7);
        assert_eq!(driver.halt_reason, Some(HaltReason::Solved));
        let report = fresh.resource::<AllocationReport>();
        assert_eq!(report.total_transfers, 12);
        assert!((report.total_volume - 88.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_restore_ignores_unknown_keys() {
        let mut world = World::new();
        world.insert_resource(DriverState { hour: 5, ..Default::default() });

        let mut snapshot = BTreeMap::new();
        snapshot.insert("retired_feature".to_string(), vec![0xAB, 0xCD]);
        registry().restore_all(&mut world, &snapshot);

        assert_eq!(world.resource::<DriverState>().hour, 5);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = SnapshotRegistry::default();
        registry.register::<DriverState>();
        registry.register::<DriverState>();
    }

    #[test]
    fn test_undecodable_bytes_fall_back_to_default() {
        let restored: DriverState = decode_or_warn(DriverState::KEY, &[0xFF; 3]);
        assert_eq!(restored.hour, 0);
        assert!(!restored.halted);
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let mut world = World::new();
        world.insert_resource(DriverState {
            hour: 9,
            halted: true,
            halt_reason: Some(HaltReason::HourBudgetExhausted),
        });
        world.insert_resource(AllocationReport::default());
        let snapshot = registry().capture_all(&world);

        let path = std::env::temp_dir().join("acequia_snapshot_roundtrip.bin");
        write_snapshot(&path, &snapshot).expect("snapshot writes");
        let loaded = read_snapshot(&path).expect("snapshot reads back");
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_read_snapshot_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("acequia_snapshot_does_not_exist.bin");
        let err = read_snapshot(&path).expect_err("missing file must fail");
        assert!(matches!(err, SnapshotError::Io(_)));
    }

    #[test]
    fn test_read_snapshot_garbage_is_decode_error() {
        let path = std::env::temp_dir().join("acequia_snapshot_garbage.bin");
        fs::write(&path, [0x00, 0x01, 0xFF]).expect("garbage file writes");
        let err = read_snapshot(&path).expect_err("garbage must fail to decode");
        let _ = fs::remove_file(&path);
        assert!(matches!(err, SnapshotError::Decode(_)));
    }
}

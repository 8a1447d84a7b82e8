use bevy::ecs::system::RunSystemOnce;
use bevy::prelude::*;

use super::*;

fn region(name: &str, level: f32, need: f32, capacity: f32) -> Region {
    Region {
        name: name.to_string(),
        level,
        need,
        capacity,
    }
}

// =============================================================================
// Derived quantity tests
// =============================================================================

#[test]
fn test_deficit_when_below_need() {
    let r = region("a", 2.0, 10.0, 20.0);
    assert!((deficit(&r) - 8.0).abs() < f32::EPSILON);
}

#[test]
fn test_deficit_zero_when_at_need() {
    let r = region("a", 10.0, 10.0, 20.0);
    assert!((deficit(&r) - 0.0).abs() < f32::EPSILON);
}

#[test]
fn test_deficit_zero_when_above_need() {
    let r = region("a", 15.0, 10.0, 20.0);
    assert!((deficit(&r) - 0.0).abs() < f32::EPSILON);
}

#[test]
fn test_safe_surplus_subtracts_buffer() {
    // extra = 20 - 10 = 10, buffer = 0.10 * 30 = 3, surplus = 7.
    let r = region("a", 20.0, 10.0, 30.0);
    assert!((safe_surplus(&r, 0.10) - 7.0).abs() < 1e-5);
}

#[test]
fn test_safe_surplus_clamped_to_zero() {
    // extra = 1, buffer = 3: donating would eat into the buffer.
    let r = region("a", 11.0, 10.0, 30.0);
    assert!((safe_surplus(&r, 0.10) - 0.0).abs() < f32::EPSILON);
}

#[test]
fn test_safe_surplus_zero_margin_gives_full_extra() {
    let r = region("a", 20.0, 10.0, 30.0);
    assert!((safe_surplus(&r, 0.0) - 10.0).abs() < f32::EPSILON);
}

#[test]
fn test_safe_surplus_zero_for_needy_region() {
    let r = region("a", 5.0, 10.0, 30.0);
    assert!((safe_surplus(&r, 0.10) - 0.0).abs() < f32::EPSILON);
}

#[test]
fn test_headroom() {
    let r = region("a", 2.0, 10.0, 20.0);
    assert!((headroom(&r) - 18.0).abs() < f32::EPSILON);
}

#[test]
fn test_headroom_zero_at_capacity() {
    let r = region("a", 20.0, 10.0, 20.0);
    assert!((headroom(&r) - 0.0).abs() < f32::EPSILON);
}

// =============================================================================
// Canal index tests
// =============================================================================

fn spawn_region(world: &mut World, order: u32) -> Entity {
    world
        .spawn((region("r", 0.0, 0.0, 10.0), NetworkOrder(order)))
        .id()
}

fn spawn_canal(world: &mut World, order: u32, from: Entity, to: Entity) -> Entity {
    world.spawn((Canal::new(from, to, None), NetworkOrder(order))).id()
}

fn rebuilt_index(world: &mut World) -> &CanalIndex {
    world
        .run_system_once(rebuild_canal_index)
        .expect("rebuild system should run");
    world.resource::<CanalIndex>()
}

#[test]
fn test_index_empty_world() {
    let mut world = World::new();
    world.init_resource::<CanalIndex>();
    let index = rebuilt_index(&mut world);
    assert_eq!(index.canal_count(), 0);
    assert_eq!(index.route_count(), 0);
}

#[test]
fn test_index_buckets_by_endpoint_pair() {
    let mut world = World::new();
    world.init_resource::<CanalIndex>();
    let a = spawn_region(&mut world, 0);
    let b = spawn_region(&mut world, 1);
    let c = spawn_region(&mut world, 2);
    let ab = spawn_canal(&mut world, 0, a, b);
    let ac = spawn_canal(&mut world, 1, a, c);

    let index = rebuilt_index(&mut world);
    assert_eq!(index.canal_count(), 2);
    assert_eq!(index.route_count(), 2);
    assert_eq!(index.canals_between(a, b), Some(&[ab][..]));
    assert_eq!(index.canals_between(a, c), Some(&[ac][..]));
    assert_eq!(index.canals_between(b, a), None);
}

#[test]
fn test_index_parallel_canals_keep_spawn_order() {
    let mut world = World::new();
    world.init_resource::<CanalIndex>();
    let a = spawn_region(&mut world, 0);
    let b = spawn_region(&mut world, 1);
    let first = spawn_canal(&mut world, 0, a, b);
    let second = spawn_canal(&mut world, 1, a, b);

    let index = rebuilt_index(&mut world);
    assert_eq!(index.route_count(), 1);
    assert_eq!(index.canals_between(a, b), Some(&[first, second][..]));
}

#[test]
fn test_index_keeps_canal_without_source() {
    // Absent water sources are a transfer-time concern; the index still
    // records the canal.
    let mut world = World::new();
    world.init_resource::<CanalIndex>();
    let a = spawn_region(&mut world, 0);
    let b = spawn_region(&mut world, 1);
    spawn_canal(&mut world, 0, a, b);

    let index = rebuilt_index(&mut world);
    assert_eq!(index.canal_count(), 1);
    assert!(index.canals_between(a, b).is_some());
}

#[test]
fn test_index_rebuilds_after_despawn() {
    let mut world = World::new();
    world.init_resource::<CanalIndex>();
    let a = spawn_region(&mut world, 0);
    let b = spawn_region(&mut world, 1);
    let ab = spawn_canal(&mut world, 0, a, b);
    rebuilt_index(&mut world);

    world.despawn(ab);
    let index = rebuilt_index(&mut world);
    assert_eq!(index.canal_count(), 0);
    assert_eq!(index.canals_between(a, b), None);
}

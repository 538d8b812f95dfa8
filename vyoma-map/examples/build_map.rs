//! Build a small map from simulated depth scans and save it to disk.
//!
//! A sensor sweeps a room with four walls, integrating one cloud per pose,
//! then the map is queried, pruned and written out compressed.
//!
//! Usage:
//!   cargo run --example build_map
//!   cargo run --example build_map -- /tmp/room.vyo

use std::f32::consts::TAU;

use vyoma_map::core::{Point3, PointCloud};
use vyoma_map::{OccupancyMap, Octree, OctreeConfig, TraversalFilter, WriteOptions};

/// Simulate one horizontal lidar sweep from `origin` inside a square room.
fn simulate_scan(origin: Point3, room_half: f32, beams: usize) -> PointCloud {
    let mut cloud = PointCloud::with_capacity(beams);
    for i in 0..beams {
        let angle = i as f32 / beams as f32 * TAU;
        let (dx, dy) = (angle.cos(), angle.sin());
        // Distance to the nearest wall along this beam
        let tx = if dx.abs() > 1e-6 {
            (room_half * dx.signum() - origin.x) / dx
        } else {
            f32::MAX
        };
        let ty = if dy.abs() > 1e-6 {
            (room_half * dy.signum() - origin.y) / dy
        } else {
            f32::MAX
        };
        let t = tx.min(ty);
        cloud.push(Point3::new(origin.x + t * dx, origin.y + t * dy, origin.z));
    }
    cloud
}

fn main() {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "room.vyo".to_string());

    let config = OctreeConfig::with_resolution(0.05, 16);
    let mut map: OccupancyMap = Octree::new(config).expect("valid config");

    // Sweep the sensor through the room
    let room_half = 2.0;
    for step in 0..20 {
        let t = step as f32 / 20.0 * TAU;
        let origin = Point3::new(0.8 * t.cos(), 0.8 * t.sin(), 0.3);
        let scan = simulate_scan(origin, room_half, 360);
        map.insert_point_cloud(origin, &scan, 10.0);
    }

    map.prune();

    let occupied = map.iter_leaves(TraversalFilter::occupied_only()).count();
    let free = map.iter_leaves(TraversalFilter::free_only()).count();
    println!(
        "map: {} nodes ({} occupied / {} free leaves), ~{} KiB",
        map.size(),
        occupied,
        free,
        map.memory_usage() / 1024
    );

    let cast = map.cast_ray(Point3::new(0.0, 0.0, 0.3), Point3::new(1.0, 0.0, 0.0), true, 10.0, 0);
    println!("ray +x hits wall: {} at {:?}", cast.hit, cast.end);

    let options = WriteOptions {
        compress: true,
        ..Default::default()
    };
    map.save(&output, &options).expect("write map file");
    println!("saved {}", output);
}

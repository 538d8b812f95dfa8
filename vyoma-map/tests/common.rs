//! Shared helpers for the integration tests.

#![allow(dead_code)]

use vyoma_map::core::{Point3, PointCloud};
use vyoma_map::{OccupancyMap, Octree, OctreeConfig};

/// Standard sensor model used across the integration tests:
/// 10cm voxels, 16 levels, hit 0.7 / miss 0.4, occupied > 0.5,
/// free < 0.12, clamping [0.1192, 0.971].
pub fn standard_config() -> OctreeConfig {
    OctreeConfig {
        resolution: 0.1,
        depth_levels: 16,
        automatic_pruning: true,
        occupancy_thres: 0.5,
        free_thres: 0.12,
        prob_hit: 0.7,
        prob_miss: 0.4,
        clamp_thres_min: 0.1192,
        clamp_thres_max: 0.971,
    }
}

pub fn standard_map() -> OccupancyMap {
    Octree::new(standard_config()).unwrap()
}

/// Drive a voxel well past the occupancy threshold.
pub fn occupy(map: &mut OccupancyMap, p: Point3) {
    for _ in 0..5 {
        map.integrate_hit_at(p, 0);
    }
}

/// Drive a voxel to the lower clamp (known free).
pub fn free(map: &mut OccupancyMap, p: Point3) {
    for _ in 0..8 {
        map.integrate_miss_at(p, 0);
    }
}

/// A wall of points at `x = distance`, facing the origin.
pub fn wall_cloud(distance: f32, extent: f32, spacing: f32) -> PointCloud {
    let mut cloud = PointCloud::new();
    let steps = (2.0 * extent / spacing) as i32;
    for iy in 0..=steps {
        for iz in 0..=steps {
            cloud.push(Point3::new(
                distance,
                -extent + iy as f32 * spacing,
                -extent + iz as f32 * spacing,
            ));
        }
    }
    cloud
}

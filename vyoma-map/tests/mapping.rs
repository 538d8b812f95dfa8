//! End-to-end mapping scenarios: cloud integration, ray casting and
//! bounding-box clipping with the standard sensor model.

mod common;

use vyoma_map::core::{Point3, PointCloud};

#[test]
fn test_cloud_carves_free_corridor() {
    let mut map = common::standard_map();
    let cloud = PointCloud::from_points(&[Point3::new(1.0, 0.0, 0.0)]);

    // Repeated scans accumulate: endpoint to occupied, corridor to free
    for _ in 0..5 {
        map.insert_point_cloud(Point3::ZERO, &cloud, -1.0);
    }

    assert!(map.is_occupied_at(Point3::new(1.0, 0.0, 0.0), 0));
    for i in 0..10 {
        let cell = Point3::new(0.05 + i as f32 * 0.1, 0.05, 0.05);
        assert!(map.is_free_at(cell, 0), "corridor cell {} not free", i);
    }
    // Space beyond the wall stays unexplored
    assert!(map.is_unknown_at(Point3::new(1.55, 0.05, 0.05), 0));
}

#[test]
fn test_wall_scan() {
    let mut map = common::standard_map();
    let wall = common::wall_cloud(2.0, 0.4, 0.1);
    for _ in 0..5 {
        map.insert_point_cloud(Point3::ZERO, &wall, -1.0);
    }

    // Wall cells occupied, the space in front of them free
    assert!(map.is_occupied_at(Point3::new(2.0, 0.0, 0.0), 0));
    assert!(map.is_occupied_at(Point3::new(2.0, 0.3, -0.3), 0));
    assert!(map.is_free_at(Point3::new(1.0, 0.0, 0.0), 0));
}

#[test]
fn test_empty_cloud_changes_nothing() {
    let mut map = common::standard_map();
    let size = map.size();
    map.insert_point_cloud(Point3::new(1.0, 2.0, 3.0), &PointCloud::new(), -1.0);
    assert_eq!(map.size(), size);
}

#[test]
fn test_cast_ray_to_obstacle() {
    let mut map = common::standard_map();
    common::occupy(&mut map, Point3::new(1.0, 0.0, 0.0));

    let result = map.cast_ray(Point3::ZERO, Point3::new(1.0, 0.0, 0.0), true, -1.0, 0);
    assert!(result.hit);
    // The reported end is the center of the occupied voxel
    let occupied_center = map.key_to_coord(&map.coord_to_key(Point3::new(1.0, 0.0, 0.0), 0));
    assert!((result.end - occupied_center).norm() < 1e-4);
}

#[test]
fn test_cast_ray_blocked_by_unknown() {
    let mut map = common::standard_map();
    common::occupy(&mut map, Point3::new(1.0, 0.0, 0.0));
    // Free corridor up to x = 0.5 only
    for i in 0..5 {
        common::free(&mut map, Point3::new(0.05 + i as f32 * 0.1, 0.05, 0.05));
    }

    let result = map.cast_ray(
        Point3::new(0.05, 0.05, 0.05),
        Point3::new(1.0, 0.0, 0.0),
        false,
        -1.0,
        0,
    );
    assert!(!result.hit);
    // Stopped on the first unknown cell, [0.5, 0.6)
    assert!((result.end.x - 0.55).abs() < 1e-4);
}

#[test]
fn test_ray_with_zero_length_emits_no_keys() {
    let map = common::standard_map();
    let p = Point3::new(0.42, -1.0, 3.0);
    assert!(map.compute_ray(p, p, -1.0, 0).is_empty());
}

#[test]
fn test_ray_truncated_by_max_range() {
    let map = common::standard_map();
    let origin = Point3::new(0.05, 0.05, 0.05);
    let keys = map.compute_ray(origin, Point3::new(3.0, 0.05, 0.05), 1.0, 0);
    assert!(!keys.is_empty());
    for key in &keys {
        let center = map.key_to_coord(key);
        assert!(
            origin.distance(&center) <= 1.0 + map.resolution() / 2.0 + 1e-4,
            "key at {:?} beyond max range",
            center
        );
    }
}

#[test]
fn test_bbx_clips_ray_before_traversal() {
    let mut map = common::standard_map();
    map.set_bbx_min(Point3::new(-0.5, -0.5, -0.5));
    map.set_bbx_max(Point3::new(0.5, 0.5, 0.5));
    map.enable_bbx_limit(true);

    // Clipping moves both endpoints onto the box faces
    let mut origin = Point3::new(-1.0, 0.0, 0.0);
    let mut end = Point3::new(1.0, 0.0, 0.0);
    assert!(map.move_line_into_bbx(&mut origin, &mut end));
    assert!((origin.x + 0.5).abs() < 1e-5);
    assert!((end.x - 0.5).abs() < 1e-5);

    // The traversal only covers cells inside the box
    let keys = map.compute_ray(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), -1.0, 0);
    assert!(!keys.is_empty());
    for key in &keys {
        let c = map.key_to_coord(key);
        assert!(c.x >= -0.55 && c.x <= 0.55);
    }
}

#[test]
fn test_cloud_outside_bbx_is_ignored() {
    let mut map = common::standard_map();
    map.set_bbx_min(Point3::new(-0.5, -0.5, -0.5));
    map.set_bbx_max(Point3::new(0.5, 0.5, 0.5));
    map.enable_bbx_limit(true);

    let cloud = PointCloud::from_points(&[Point3::new(5.0, 5.0, 5.0)]);
    for _ in 0..3 {
        map.insert_point_cloud(Point3::new(4.0, 5.0, 5.0), &cloud, -1.0);
    }
    assert_eq!(map.size(), 1);
}

#[test]
fn test_discrete_insertion_matches_plain_on_endpoints() {
    let mut plain = common::standard_map();
    let mut discrete = common::standard_map();
    let cloud = common::wall_cloud(1.5, 0.3, 0.1);

    for _ in 0..5 {
        plain.insert_point_cloud(Point3::ZERO, &cloud, -1.0);
        discrete.insert_point_cloud_discrete(Point3::ZERO, &cloud, -1.0, 0, 0);
    }

    for point in &cloud {
        assert_eq!(
            plain.is_occupied_at(*point, 0),
            discrete.is_occupied_at(*point, 0),
            "endpoint state diverged at {:?}",
            point
        );
    }
}

#[test]
fn test_insert_ray_free_and_hit() {
    let mut map = common::standard_map();
    for _ in 0..5 {
        map.insert_ray(Point3::ZERO, Point3::new(0.8, 0.0, 0.0), -1.0, 0);
    }
    assert!(map.is_occupied_at(Point3::new(0.8, 0.0, 0.0), 0));
    assert!(map.is_free_at(Point3::new(0.45, 0.05, 0.05), 0));
}

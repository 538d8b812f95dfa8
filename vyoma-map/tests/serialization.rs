//! Round-trip tests for the map file format.

mod common;

use rand::{Rng, SeedableRng};

use vyoma_map::core::{Aabb, BoundingVolume, Point3};
use vyoma_map::{OccupancyMap, TraversalFilter, WriteOptions};

/// Build a map with randomized hits and misses in a 10m cube.
fn random_map(seed: u64) -> OccupancyMap {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut map = common::standard_map();
    for _ in 0..300 {
        let p = Point3::new(
            rng.gen_range(-5.0..5.0),
            rng.gen_range(-5.0..5.0),
            rng.gen_range(-5.0..5.0),
        );
        let hits = rng.gen_range(1..8);
        if rng.gen_bool(0.5) {
            for _ in 0..hits {
                map.integrate_hit_at(p, 0);
            }
        } else {
            for _ in 0..hits {
                map.integrate_miss_at(p, 0);
            }
        }
    }
    map
}

/// Every node of `a` must exist in `b` with the same value, and the trees
/// must have the same node count.
fn assert_trees_equal(a: &OccupancyMap, b: &OccupancyMap) {
    assert_eq!(a.size(), b.size());
    assert_eq!(a.num_inner_nodes(), b.num_inner_nodes());
    assert_eq!(a.num_leaf_nodes(), b.num_leaf_nodes());
    for view in a.iter_tree(TraversalFilter::all()) {
        let other = b.get_node(view.code);
        assert_eq!(other.code, view.code, "missing node {:?}", view.code);
        assert_eq!(
            other.value.logit, view.value.logit,
            "logit mismatch at {:?}",
            view.code
        );
    }
}

#[test]
fn test_write_read_uncompressed() {
    let map = random_map(1);
    let mut buffer = Vec::new();
    map.write_to(&mut buffer, &WriteOptions::default()).unwrap();

    let mut decoded = common::standard_map();
    decoded.read_from(buffer.as_slice()).unwrap();
    assert_trees_equal(&map, &decoded);
}

#[test]
fn test_compressed_equals_uncompressed() {
    let map = random_map(2);

    let mut plain = Vec::new();
    map.write_to(&mut plain, &WriteOptions::default()).unwrap();
    let mut compressed = Vec::new();
    map.write_to(
        &mut compressed,
        &WriteOptions {
            compress: true,
            ..Default::default()
        },
    )
    .unwrap();

    let mut from_plain = common::standard_map();
    from_plain.read_from(plain.as_slice()).unwrap();
    let mut from_compressed = common::standard_map();
    from_compressed.read_from(compressed.as_slice()).unwrap();

    assert_trees_equal(&map, &from_plain);
    assert_trees_equal(&from_plain, &from_compressed);
}

#[test]
fn test_header_size_field_matches_body() {
    let map = random_map(3);
    let mut buffer = Vec::new();
    map.write_to(&mut buffer, &WriteOptions::default()).unwrap();

    // The header is ASCII, so text offsets equal byte offsets up to "data"
    let text = String::from_utf8_lossy(&buffer).to_string();
    let reported: usize = text
        .lines()
        .find_map(|line| line.strip_prefix("uncompressed_data_size "))
        .unwrap()
        .parse()
        .unwrap();
    let body_start = text.find("data\n").unwrap() + "data\n".len();
    assert_eq!(buffer.len() - body_start, reported);
}

#[test]
fn test_bounded_write_read_keeps_region_only() {
    let mut map = common::standard_map();
    let inside = Point3::new(0.55, 0.55, 0.55);
    let outside = Point3::new(4.05, 4.05, 4.05);
    common::occupy(&mut map, inside);
    common::occupy(&mut map, outside);

    let volume = BoundingVolume::from_aabb(Aabb::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 1.0),
    ));

    let mut buffer = Vec::new();
    map.write_to(
        &mut buffer,
        &WriteOptions {
            volume: volume.clone(),
            ..Default::default()
        },
    )
    .unwrap();

    // Decode with the same volume into an empty tree
    let mut decoded = common::standard_map();
    decoded
        .read_from_bounded(buffer.as_slice(), &volume)
        .unwrap();

    assert!(decoded.is_occupied_at(inside, 0));
    assert!(!decoded.is_occupied_at(outside, 0));
    // Every occupied leaf of the decoded tree intersects the volume
    for view in decoded.iter_leaves(TraversalFilter::occupied_only()) {
        assert!(volume.intersects(&Aabb::cube(view.center, view.size / 2.0)));
    }
}

#[test]
fn test_repeated_roundtrip_is_stable() {
    let map = random_map(4);

    let mut first = Vec::new();
    map.write_to(&mut first, &WriteOptions::default()).unwrap();
    let mut decoded = common::standard_map();
    decoded.read_from(first.as_slice()).unwrap();

    let mut second = Vec::new();
    decoded.write_to(&mut second, &WriteOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_coarsened_write_with_min_depth() {
    let map = random_map(5);
    let mut buffer = Vec::new();
    map.write_to(
        &mut buffer,
        &WriteOptions {
            min_depth: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let mut decoded = common::standard_map();
    decoded.read_from(buffer.as_slice()).unwrap();
    // Nothing below depth 2 survives a coarsened write
    for view in decoded.iter_tree(TraversalFilter::all()) {
        assert!(
            view.depth() >= 2 || !view.is_leaf,
            "node below min_depth at {:?}",
            view.code
        );
    }
    // Coarse occupancy agrees with the source's summaries
    for view in map.iter_leaves(TraversalFilter::occupied_only().at_min_depth(2)) {
        assert!(
            decoded.is_occupied_at(view.center, 2),
            "coarse cell at {:?} lost its occupancy",
            view.center
        );
    }
}

#[test]
fn test_save_and_load_file() {
    let dir = std::env::temp_dir().join("vyoma_map_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("roundtrip.vyo");

    let map = random_map(6);
    map.save(
        &path,
        &WriteOptions {
            compress: true,
            ..Default::default()
        },
    )
    .unwrap();

    let mut decoded = common::standard_map();
    decoded.load(&path).unwrap();
    assert_trees_equal(&map, &decoded);

    std::fs::remove_file(&path).ok();
}

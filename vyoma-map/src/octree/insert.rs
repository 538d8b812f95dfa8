//! Sensor integration: rays and point clouds.
//!
//! Cloud insertion goes through a transient `code -> log-odds` accumulator
//! rather than updating the tree per ray. Hits are written with assignment
//! and misses with insert-if-absent, so within one cloud a cell receives at
//! most one update and a hit always beats a later miss on the same cell. The
//! accumulator is drained into the tree afterwards and its allocation is
//! kept for the next cloud.

use crate::core::{Code, Key, KeyMap, KeySet, Point3, PointCloud, Pose3D};

use super::node::VoxelValue;
use super::tree::Octree;

impl<T: VoxelValue> Octree<T> {
    /// Integrate a single ray: misses along the segment, a hit at the end.
    pub fn insert_ray(&mut self, origin: Point3, end: Point3, max_range: f32, depth: u32) {
        self.insert_miss_on_ray(origin, end, max_range, depth);
        self.integrate_hit_at(end, 0);
    }

    /// Integrate only the free space along a segment.
    pub fn insert_miss_on_ray(&mut self, origin: Point3, end: Point3, max_range: f32, depth: u32) {
        for key in self.compute_ray(origin, end, max_range, depth) {
            self.integrate_miss(Code::from_key(&key));
        }
    }

    /// Integrate a point cloud observed from `sensor_origin`.
    ///
    /// Every point is a hit at its end voxel; every voxel a ray traverses on
    /// the way is a miss. Segments are truncated to `max_range` (negative
    /// disables the limit) and clipped against the bounding box.
    pub fn insert_point_cloud(
        &mut self,
        sensor_origin: Point3,
        cloud: &PointCloud,
        max_range: f32,
    ) {
        self.compute_update(sensor_origin, cloud, max_range);
        self.drain_accumulator();
    }

    /// Like [`insert_point_cloud`](Self::insert_point_cloud), with the cloud
    /// first moved from the sensor frame into the map frame.
    pub fn insert_point_cloud_transformed(
        &mut self,
        sensor_origin: Point3,
        cloud: &PointCloud,
        frame_origin: &Pose3D,
        max_range: f32,
    ) {
        let cloud_transformed = cloud.transformed(frame_origin);
        self.insert_point_cloud(sensor_origin, &cloud_transformed, max_range);
    }

    /// Integrate a point cloud with multiresolution free-space coarsening.
    ///
    /// Points are deduplicated per leaf voxel, then rewritten to unique
    /// parent keys up to `depth`. Free space along each coarse ray gets a
    /// weighted miss of `prob_miss_log / (2d + 1)`; with `n > 0` the walk
    /// stops `n` cells short of the endpoint and recurses into the next
    /// finer level through this endpoint's children.
    pub fn insert_point_cloud_discrete(
        &mut self,
        sensor_origin: Point3,
        cloud: &PointCloud,
        max_range: f32,
        n: u32,
        depth: u32,
    ) {
        let mut discrete_map: KeyMap<Vec<Key>> = KeyMap::default();
        let mut discrete: Vec<Key> = Vec::new();
        let mut seen = KeySet::default();

        for &point in cloud {
            let point_key = self.coord_to_key(point, 0);
            if !seen.insert(point_key) {
                continue;
            }
            let changed_point = self.key_to_coord(&point_key);

            let mut origin = sensor_origin;
            let diff = changed_point - origin;
            let distance = diff.norm();
            let dir = diff / distance;
            let mut end = if 0.0 <= max_range && distance > max_range {
                origin + dir * max_range
            } else {
                changed_point
            };

            if !self.move_line_into_bbx(&mut origin, &mut end) {
                continue;
            }

            let changed_end = self.coord_to_key(end, 0);
            if changed_point == end {
                if 0 == n && 0 != depth {
                    // NOTE: hit applied immediately instead of accumulated;
                    // verify against ground truth before relying on it
                    self.integrate_hit(Code::from_key(&changed_end));
                } else {
                    let hit_log = self.prob_hit_log();
                    match self.update_accumulator.entry(Code::from_key(&changed_end)) {
                        std::collections::hash_map::Entry::Occupied(_) => continue,
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(hit_log);
                        }
                    }
                }
            }

            discrete.push(changed_end);
        }

        if depth != 0 {
            let mut previous: Vec<Key> = Vec::new();
            let start_depth = if n == 0 { depth } else { 1 };
            for d in start_depth..=depth {
                std::mem::swap(&mut previous, &mut discrete);
                discrete.clear();
                for key in &previous {
                    let key_at_depth = Code::from_key(key).to_depth(d).to_key();
                    let children = discrete_map.entry(key_at_depth).or_default();
                    if children.is_empty() {
                        discrete.push(key_at_depth);
                    }
                    children.push(*key);
                }
            }
        }

        self.compute_update_discrete(sensor_origin, &discrete, &discrete_map, n);
        self.drain_accumulator();
    }

    /// Discrete insertion with a frame transform applied first.
    pub fn insert_point_cloud_discrete_transformed(
        &mut self,
        sensor_origin: Point3,
        cloud: &PointCloud,
        frame_origin: &Pose3D,
        max_range: f32,
        n: u32,
        depth: u32,
    ) {
        let cloud_transformed = cloud.transformed(frame_origin);
        self.insert_point_cloud_discrete(sensor_origin, &cloud_transformed, max_range, n, depth);
    }

    /// Fill the accumulator with one hit per endpoint and one miss per
    /// traversed voxel.
    fn compute_update(&mut self, sensor_origin: Point3, cloud: &PointCloud, max_range: f32) {
        let hit_log = self.prob_hit_log();
        let miss_log = self.prob_miss_log();

        for &point in cloud {
            let mut origin = sensor_origin;
            let diff = point - origin;
            let distance = diff.norm();
            let dir = diff / distance;
            let mut end = if 0.0 <= max_range && distance > max_range {
                origin + dir * max_range
            } else {
                point
            };

            if !self.move_line_into_bbx(&mut origin, &mut end) {
                continue;
            }

            if point == end {
                // The endpoint survived range truncation and clipping:
                // a hit, overriding any miss another ray left here
                self.update_accumulator
                    .insert(Code::from_key(&self.coord_to_key(end, 0)), hit_log);
            }

            let mut state = self.ray_init(origin, end, dir, 0);
            while state.current != state.ending && state.t_max.min_element() <= distance {
                self.update_accumulator
                    .entry(Code::from_key(&state.current))
                    .or_insert(miss_log);
                self.ray_step(&mut state, 0);
            }
        }
    }

    /// Walk the multiresolution endpoint set, accumulating weighted misses.
    fn compute_update_discrete(
        &mut self,
        sensor_origin: Point3,
        current_keys: &[Key],
        discrete_map: &KeyMap<Vec<Key>>,
        n: u32,
    ) {
        let miss_log = self.prob_miss_log();

        for key in current_keys {
            let end_coord = self.key_to_coord(key);
            let diff = end_coord - sensor_origin;
            let distance = diff.norm();
            let dir = diff / distance;
            let end = sensor_origin + dir * distance;

            if key.depth() == 0 {
                let mut state = self.ray_init(sensor_origin, end, dir, 0);
                while state.current != state.ending && state.t_max.min_element() <= distance {
                    self.update_accumulator
                        .entry(Code::from_key(&state.current))
                        .or_insert(miss_log);
                    self.ray_step(&mut state, 0);
                }
            } else {
                let node_size = self.node_size(key.depth());
                let num_steps = (distance / node_size) as i32 - n as i32;
                let value = miss_log / (2.0 * key.depth() as f32 + 1.0);

                let mut current = sensor_origin;
                let mut last = current;
                let mut current_key = self.coord_to_key(current, key.depth());
                let mut step = 0;
                while current_key != *key && step <= num_steps {
                    last = current;
                    self.update_accumulator
                        .entry(Code::from_key(&current_key))
                        .or_insert(value);
                    current = current + dir * node_size;
                    current_key = self.coord_to_key(current, key.depth());
                    step += 1;
                }

                if n == 0 {
                    self.update_accumulator
                        .entry(Code::from_key(&current_key))
                        .or_insert(value);
                } else if let Some(children) = discrete_map.get(key) {
                    self.compute_update_discrete(last, children, discrete_map, n);
                }
            }
        }
    }

    /// Apply every accumulated update to the tree, keeping the allocation.
    fn drain_accumulator(&mut self) {
        let mut updates = std::mem::take(&mut self.update_accumulator);
        for (&code, &value) in &updates {
            self.update_node_value(code, value);
        }
        updates.clear();
        self.update_accumulator = updates;
    }
}

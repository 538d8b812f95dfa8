//! The sparse occupancy octree engine.
//!
//! ## Storage model
//!
//! The tree has a fixed number of depth levels `L`; leaf voxels live at depth
//! 0 and the root at depth `L`. Nodes are allocated lazily: a fresh tree is a
//! single collapsed root. Updates expand collapsed nodes on the way down
//! (seeding all eight children from the parent) and re-summarize ancestors on
//! the way up, collapsing any subtree whose children became identical.
//!
//! ## Coordinate system
//!
//! A per-axis integer key in `[0, 2^L)` is derived from a world coordinate by
//! `floor(coord / resolution) + 2^(L-1)`, so the representable cube spans
//! `[-resolution * 2^(L-1), +resolution * 2^(L-1))` per axis, centered at the
//! world origin. At depth `d > 0` the canonical key has its `d`-th bit set so
//! key-to-coordinate conversion lands on the cell center.

use crate::config::OctreeConfig;
use crate::core::{Code, CodeMap, CodeSet, Key, KeySet, Point3, PointCloud};
use crate::error::{Error, Result};

use super::node::{Children, InnerNode, NodeSample, OccupancyCell, VoxelValue};

/// Log-odds of a probability: `log(p / (1 - p))`
#[inline]
pub fn logit(probability: f32) -> f32 {
    (probability / (1.0 - probability)).ln()
}

/// Probability of a log-odds value: `1 - 1 / (1 + exp(l))`
#[inline]
pub fn probability(logit: f32) -> f32 {
    1.0 - (1.0 / (1.0 + logit.exp()))
}

/// The standard occupancy octree.
pub type OccupancyMap = Octree<OccupancyCell>;

/// A sparse octree of probabilistic voxels, generic over the leaf payload.
pub struct Octree<T: VoxelValue = OccupancyCell> {
    pub(crate) resolution: f32,
    pub(crate) resolution_factor: f32,
    pub(crate) depth_levels: u32,
    pub(crate) max_value: u32,

    // Sensor model, all in log-odds
    pub(crate) occupancy_thres_log: f32,
    pub(crate) free_thres_log: f32,
    pub(crate) prob_hit_log: f32,
    pub(crate) prob_miss_log: f32,
    pub(crate) clamp_min_log: f32,
    pub(crate) clamp_max_log: f32,

    // Optional bounding box restricting updates and queries
    pub(crate) bbx_limit_enabled: bool,
    pub(crate) bbx_min: Point3,
    pub(crate) bbx_max: Point3,
    pub(crate) bbx_min_key: Key,
    pub(crate) bbx_max_key: Key,

    // Change tracking
    pub(crate) change_detection_enabled: bool,
    pub(crate) changed_codes: CodeSet,

    pub(crate) root: InnerNode<T>,
    pub(crate) node_sizes: Vec<f32>,
    pub(crate) node_half_sizes: Vec<f32>,

    pub(crate) automatic_pruning: bool,

    pub(crate) num_inner_nodes: usize,
    pub(crate) num_inner_leaf_nodes: usize,
    pub(crate) num_leaf_nodes: usize,

    // Retained across insertions so the allocation amortizes
    pub(crate) update_accumulator: CodeMap<f32>,
}

pub(crate) struct TreeSnapshot<T: VoxelValue> {
    root: InnerNode<T>,
    resolution: f32,
    resolution_factor: f32,
    depth_levels: u32,
    max_value: u32,
    node_sizes: Vec<f32>,
    node_half_sizes: Vec<f32>,
    num_inner_nodes: usize,
    num_inner_leaf_nodes: usize,
    num_leaf_nodes: usize,
}

impl<T: VoxelValue> Octree<T> {
    /// Create an empty tree from a validated configuration.
    pub fn new(config: OctreeConfig) -> Result<Self> {
        config.validate()?;

        let mut tree = Self {
            resolution: config.resolution,
            resolution_factor: 1.0 / config.resolution,
            depth_levels: config.depth_levels,
            max_value: 1u32 << (config.depth_levels - 1),
            occupancy_thres_log: logit(config.occupancy_thres),
            free_thres_log: logit(config.free_thres),
            prob_hit_log: logit(config.prob_hit),
            prob_miss_log: logit(config.prob_miss),
            clamp_min_log: logit(config.clamp_thres_min),
            clamp_max_log: logit(config.clamp_thres_max),
            bbx_limit_enabled: false,
            bbx_min: Point3::ZERO,
            bbx_max: Point3::ZERO,
            bbx_min_key: Key::default(),
            bbx_max_key: Key::default(),
            change_detection_enabled: false,
            changed_codes: CodeSet::default(),
            root: InnerNode::default(),
            node_sizes: Vec::new(),
            node_half_sizes: Vec::new(),
            automatic_pruning: config.automatic_pruning,
            num_inner_nodes: 0,
            num_inner_leaf_nodes: 1,
            num_leaf_nodes: 0,
            update_accumulator: CodeMap::default(),
        };
        tree.rebuild_size_tables();
        tree.root.contains_free = tree.is_free_log(tree.root.value.logit());
        tree.root.contains_unknown = tree.is_unknown_log(tree.root.value.logit());
        tree.update_accumulator.reserve(100_003);
        Ok(tree)
    }

    /// The tree type identifier written to map files.
    pub fn tree_type(&self) -> &'static str {
        T::TREE_TYPE
    }

    /// Snapshot of the current configuration, with sensor parameters
    /// converted back to probabilities.
    pub fn config(&self) -> OctreeConfig {
        OctreeConfig {
            resolution: self.resolution,
            depth_levels: self.depth_levels,
            automatic_pruning: self.automatic_pruning,
            occupancy_thres: probability(self.occupancy_thres_log),
            free_thres: probability(self.free_thres_log),
            prob_hit: probability(self.prob_hit_log),
            prob_miss: probability(self.prob_miss_log),
            clamp_thres_min: probability(self.clamp_min_log),
            clamp_thres_max: probability(self.clamp_max_log),
        }
    }

    fn rebuild_size_tables(&mut self) {
        let levels = self.depth_levels as usize;
        self.node_sizes.clear();
        self.node_sizes.reserve(levels + 1);
        self.node_sizes.push(self.resolution);
        self.node_half_sizes.clear();
        self.node_half_sizes.reserve(levels + 1);
        self.node_half_sizes.push(self.resolution / 2.0);
        for i in 1..=levels {
            self.node_sizes.push(self.node_sizes[i - 1] * 2.0);
            self.node_half_sizes.push(self.node_sizes[i - 1]);
        }
    }

    // === Basic properties ===

    /// Leaf voxel size in meters
    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Number of depth levels
    #[inline]
    pub fn depth_levels(&self) -> u32 {
        self.depth_levels
    }

    /// Node edge length at a depth
    #[inline]
    pub fn node_size(&self, depth: u32) -> f32 {
        self.node_sizes[depth as usize]
    }

    /// Half the node edge length at a depth
    #[inline]
    pub fn node_half_size(&self, depth: u32) -> f32 {
        self.node_half_sizes[depth as usize]
    }

    /// Minimum corner of the representable cube
    pub fn min_coord(&self) -> Point3 {
        Point3::splat(-self.node_half_size(self.depth_levels))
    }

    /// Maximum corner of the representable cube
    pub fn max_coord(&self) -> Point3 {
        Point3::splat(self.node_half_size(self.depth_levels))
    }

    // === Coordinate <-> key ===

    pub(crate) fn coord_to_key_scalar(&self, coord: f32, depth: u32) -> u32 {
        let key_value = (self.resolution_factor * coord).floor() as i32;
        if depth == 0 {
            (key_value + self.max_value as i32) as u32
        } else {
            (((key_value >> depth) << depth) + (1 << (depth - 1)) + self.max_value as i32) as u32
        }
    }

    /// Key of the cell containing `coord` at a depth
    pub fn coord_to_key(&self, coord: Point3, depth: u32) -> Key {
        Key::new(
            self.coord_to_key_scalar(coord.x, depth),
            self.coord_to_key_scalar(coord.y, depth),
            self.coord_to_key_scalar(coord.z, depth),
            depth,
        )
    }

    /// Key of the cell containing `coord`, or `None` when the coordinate is
    /// outside the active bounding box (or the representable cube).
    pub fn coord_to_key_checked(&self, coord: Point3, depth: u32) -> Option<Key> {
        if !self.in_bbx(coord) {
            return None;
        }
        Some(self.coord_to_key(coord, depth))
    }

    pub(crate) fn key_to_coord_scalar(&self, key: u32, depth: u32) -> f32 {
        if depth == self.depth_levels {
            return 0.0;
        }
        let divider = (1u64 << depth) as f64;
        ((((key as f64) - (self.max_value as f64)) / divider).floor() + 0.5) as f32
            * self.node_size(depth)
    }

    /// Center coordinate of the cell a key addresses, at the key's own depth
    pub fn key_to_coord(&self, key: &Key) -> Point3 {
        self.key_to_coord_at(key, key.depth())
    }

    /// Center coordinate of the cell a key addresses, at an explicit depth
    pub fn key_to_coord_at(&self, key: &Key, depth: u32) -> Point3 {
        Point3::new(
            self.key_to_coord_scalar(key.x(), depth),
            self.key_to_coord_scalar(key.y(), depth),
            self.key_to_coord_scalar(key.z(), depth),
        )
    }

    /// Center coordinate at `depth`, or `None` when the requested depth is
    /// finer than the key's own depth.
    pub fn key_to_coord_checked(&self, key: &Key, depth: u32) -> Option<Point3> {
        if key.depth() > depth {
            return None;
        }
        Some(self.key_to_coord_at(key, depth))
    }

    // === Bounding box ===

    /// Restrict updates, ray traversal and checked conversions to a box
    pub fn enable_bbx_limit(&mut self, enable: bool) {
        self.bbx_limit_enabled = enable;
    }

    /// True if the bounding box limit is active
    #[inline]
    pub fn is_bbx_limit_enabled(&self) -> bool {
        self.bbx_limit_enabled
    }

    /// Set the minimum corner of the bounding box
    pub fn set_bbx_min(&mut self, min: Point3) {
        self.bbx_min = min;
        self.bbx_min_key = self.coord_to_key(min, 0);
    }

    /// Set the maximum corner of the bounding box
    pub fn set_bbx_max(&mut self, max: Point3) {
        self.bbx_max = max;
        self.bbx_max_key = self.coord_to_key(max, 0);
    }

    /// Minimum corner of the bounding box
    #[inline]
    pub fn bbx_min(&self) -> Point3 {
        self.bbx_min
    }

    /// Maximum corner of the bounding box
    #[inline]
    pub fn bbx_max(&self) -> Point3 {
        self.bbx_max
    }

    /// Center of the bounding box
    pub fn bbx_center(&self) -> Point3 {
        self.bbx_min + ((self.bbx_max - self.bbx_min) / 2.0)
    }

    /// True if `coord` lies inside the active bounding box, or inside the
    /// representable cube when no box is enabled.
    pub fn in_bbx(&self, coord: Point3) -> bool {
        let (min, max) = if self.bbx_limit_enabled {
            (self.bbx_min, self.bbx_max)
        } else {
            (self.min_coord(), self.max_coord())
        };
        min.x <= coord.x
            && coord.x <= max.x
            && min.y <= coord.y
            && coord.y <= max.y
            && min.z <= coord.z
            && coord.z <= max.z
    }

    /// True if `key` lies inside the active bounding box
    pub fn in_bbx_key(&self, key: &Key) -> bool {
        let (min, max) = if self.bbx_limit_enabled {
            (self.bbx_min_key, self.bbx_max_key)
        } else {
            (
                self.coord_to_key(self.min_coord(), 0),
                self.coord_to_key(self.max_coord(), 0),
            )
        };
        (0..3).all(|i| min[i] <= key[i] && key[i] <= max[i])
    }

    // === Sensor model ===

    /// Occupancy threshold as a probability
    pub fn occupancy_thres(&self) -> f32 {
        probability(self.occupancy_thres_log)
    }

    /// Occupancy threshold in log-odds
    #[inline]
    pub fn occupancy_thres_log(&self) -> f32 {
        self.occupancy_thres_log
    }

    /// Free threshold as a probability
    pub fn free_thres(&self) -> f32 {
        probability(self.free_thres_log)
    }

    /// Free threshold in log-odds
    #[inline]
    pub fn free_thres_log(&self) -> f32 {
        self.free_thres_log
    }

    /// Hit probability
    pub fn prob_hit(&self) -> f32 {
        probability(self.prob_hit_log)
    }

    /// Hit log-odds delta
    #[inline]
    pub fn prob_hit_log(&self) -> f32 {
        self.prob_hit_log
    }

    /// Miss probability
    pub fn prob_miss(&self) -> f32 {
        probability(self.prob_miss_log)
    }

    /// Miss log-odds delta
    #[inline]
    pub fn prob_miss_log(&self) -> f32 {
        self.prob_miss_log
    }

    /// Lower clamping bound as a probability
    pub fn clamp_thres_min(&self) -> f32 {
        probability(self.clamp_min_log)
    }

    /// Lower clamping bound in log-odds
    #[inline]
    pub fn clamp_thres_min_log(&self) -> f32 {
        self.clamp_min_log
    }

    /// Upper clamping bound as a probability
    pub fn clamp_thres_max(&self) -> f32 {
        probability(self.clamp_max_log)
    }

    /// Upper clamping bound in log-odds
    #[inline]
    pub fn clamp_thres_max_log(&self) -> f32 {
        self.clamp_max_log
    }

    /// Change the occupancy threshold.
    ///
    /// Cached `contains_*` summaries depend on the thresholds, so the whole
    /// tree is re-summarized; this walks every allocated node.
    pub fn set_occupancy_thres(&mut self, probability: f32) {
        self.set_occupancy_thres_log(logit(probability));
    }

    /// Change the occupancy threshold in log-odds. Re-summarizes the tree.
    pub fn set_occupancy_thres_log(&mut self, logit: f32) {
        self.occupancy_thres_log = logit;
        self.re_summarize();
    }

    /// Change the free threshold. Re-summarizes the tree.
    pub fn set_free_thres(&mut self, probability: f32) {
        self.set_free_thres_log(logit(probability));
    }

    /// Change the free threshold in log-odds. Re-summarizes the tree.
    pub fn set_free_thres_log(&mut self, logit: f32) {
        self.free_thres_log = logit;
        self.re_summarize();
    }

    /// Change the hit probability
    pub fn set_prob_hit(&mut self, probability: f32) {
        self.prob_hit_log = logit(probability);
    }

    /// Change the hit log-odds delta
    pub fn set_prob_hit_log(&mut self, logit: f32) {
        self.prob_hit_log = logit;
    }

    /// Change the miss probability
    pub fn set_prob_miss(&mut self, probability: f32) {
        self.prob_miss_log = logit(probability);
    }

    /// Change the miss log-odds delta
    pub fn set_prob_miss_log(&mut self, logit: f32) {
        self.prob_miss_log = logit;
    }

    /// Change the lower clamping bound
    pub fn set_clamp_thres_min(&mut self, probability: f32) {
        self.clamp_min_log = logit(probability);
    }

    /// Change the upper clamping bound
    pub fn set_clamp_thres_max(&mut self, probability: f32) {
        self.clamp_max_log = logit(probability);
    }

    // === State predicates ===

    /// True if a log-odds value counts as occupied
    #[inline]
    pub fn is_occupied_log(&self, logit: f32) -> bool {
        self.occupancy_thres_log < logit
    }

    /// True if a log-odds value counts as free
    #[inline]
    pub fn is_free_log(&self, logit: f32) -> bool {
        self.free_thres_log > logit
    }

    /// True if a log-odds value falls in the unknown band
    #[inline]
    pub fn is_unknown_log(&self, logit: f32) -> bool {
        self.free_thres_log <= logit && logit <= self.occupancy_thres_log
    }

    /// True if the node addressed by `code` is occupied
    pub fn is_occupied(&self, code: Code) -> bool {
        self.is_occupied_log(self.get_node(code).value.logit())
    }

    /// True if the node addressed by `code` is free
    pub fn is_free(&self, code: Code) -> bool {
        self.is_free_log(self.get_node(code).value.logit())
    }

    /// True if the node addressed by `code` is unknown
    pub fn is_unknown(&self, code: Code) -> bool {
        self.is_unknown_log(self.get_node(code).value.logit())
    }

    /// True if the voxel containing `coord` at `depth` is occupied
    pub fn is_occupied_at(&self, coord: Point3, depth: u32) -> bool {
        self.is_occupied(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// True if the voxel containing `coord` at `depth` is free
    pub fn is_free_at(&self, coord: Point3, depth: u32) -> bool {
        self.is_free(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// True if the voxel containing `coord` at `depth` is unknown
    pub fn is_unknown_at(&self, coord: Point3, depth: u32) -> bool {
        self.is_unknown(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// True if any voxel below `code` is occupied
    pub fn contains_occupied(&self, code: Code) -> bool {
        // The summary log-odds is the maximum over the subtree, so the node
        // state doubles as the "any descendant occupied" answer.
        self.is_occupied(code)
    }

    /// True if any voxel below `code` is free
    pub fn contains_free(&self, code: Code) -> bool {
        self.get_node(code).contains_free()
    }

    /// True if any voxel below `code` is unknown
    pub fn contains_unknown(&self, code: Code) -> bool {
        self.get_node(code).contains_unknown()
    }

    // === Node access ===

    pub(crate) fn sample_of(&self, node: &InnerNode<T>, code: Code) -> NodeSample<T> {
        NodeSample {
            value: node.value,
            code,
            contains_free: node.contains_free,
            contains_unknown: node.contains_unknown,
            has_children: !node.all_children_same,
        }
    }

    pub(crate) fn sample_of_leaf(&self, value: T, code: Code) -> NodeSample<T> {
        NodeSample {
            value,
            code,
            contains_free: self.is_free_log(value.logit()),
            contains_unknown: self.is_unknown_log(value.logit()),
            has_children: false,
        }
    }

    /// The root node
    pub fn get_root(&self) -> NodeSample<T> {
        self.sample_of(&self.root, Code::new(0, self.depth_levels))
    }

    /// Look up the node addressed by `code`.
    ///
    /// When the descent reaches a collapsed subtree, the returned sample is
    /// the deepest existing ancestor; its value applies to the whole subtree
    /// and its code carries the ancestor's depth.
    pub fn get_node(&self, code: Code) -> NodeSample<T> {
        let mut current = &self.root;
        let mut depth = self.depth_levels;
        while depth > code.depth() {
            if current.all_children_same {
                return self.sample_of(current, code.to_depth(depth));
            }
            let child_idx = code.child_idx(depth - 1);
            match current.children.as_deref() {
                Some(Children::Inner(children)) => {
                    current = &children[child_idx];
                }
                Some(Children::Leaf(children)) => {
                    return self.sample_of_leaf(children[child_idx], code);
                }
                None => {
                    // all_children_same is false, so a block must exist
                    debug_assert!(false, "expanded node without child block");
                    return self.sample_of(current, code.to_depth(depth));
                }
            }
            depth -= 1;
        }
        self.sample_of(current, code)
    }

    /// Like [`get_node`](Self::get_node) but returns `None` instead of the
    /// collapsed ancestor when the node does not physically exist.
    pub fn get_node_opt(&self, code: Code) -> Option<NodeSample<T>> {
        let sample = self.get_node(code);
        (sample.code == code).then_some(sample)
    }

    /// Node containing `coord` at `depth`
    pub fn get_node_at(&self, coord: Point3, depth: u32) -> NodeSample<T> {
        self.get_node(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// Child `idx` of a sampled node.
    ///
    /// Fails with [`Error::InvalidArgument`] when `idx > 7` or the sample is
    /// a depth-0 leaf.
    pub fn get_child(&self, sample: &NodeSample<T>, idx: usize) -> Result<NodeSample<T>> {
        if idx > 7 {
            return Err(Error::InvalidArgument(format!(
                "child index {} out of range 0..8",
                idx
            )));
        }
        if sample.depth() == 0 {
            return Err(Error::InvalidArgument(
                "leaf voxels have no children".to_string(),
            ));
        }
        Ok(self.get_node(sample.code.child(idx)))
    }

    // === Memory ===

    /// Total number of nodes in the tree
    pub fn size(&self) -> usize {
        self.num_inner_nodes + self.num_inner_leaf_nodes + self.num_leaf_nodes
    }

    /// Number of inner nodes with children
    #[inline]
    pub fn num_inner_nodes(&self) -> usize {
        self.num_inner_nodes
    }

    /// Number of collapsed inner nodes
    #[inline]
    pub fn num_inner_leaf_nodes(&self) -> usize {
        self.num_inner_leaf_nodes
    }

    /// Number of depth-0 leaf nodes
    #[inline]
    pub fn num_leaf_nodes(&self) -> usize {
        self.num_leaf_nodes
    }

    /// Approximate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        (self.num_inner_nodes + self.num_inner_leaf_nodes)
            * std::mem::size_of::<InnerNode<T>>()
            + self.num_leaf_nodes * std::mem::size_of::<T>()
    }

    // === Automatic pruning ===

    /// Allow or forbid freeing child blocks outside explicit [`prune`](Self::prune) calls
    pub fn set_automatic_pruning(&mut self, enable: bool) {
        self.automatic_pruning = enable;
    }

    /// True if automatic pruning is enabled
    #[inline]
    pub fn is_automatic_pruning_enabled(&self) -> bool {
        self.automatic_pruning
    }

    // === Change detection ===

    /// Start or stop recording codes whose value or summary changes
    pub fn enable_change_detection(&mut self, enable: bool) {
        self.change_detection_enabled = enable;
    }

    /// True if change detection is recording
    #[inline]
    pub fn is_change_detection_enabled(&self) -> bool {
        self.change_detection_enabled
    }

    /// Forget all recorded changes
    pub fn reset_change_detection(&mut self) {
        self.changed_codes.clear();
    }

    /// Number of codes recorded since the last reset
    pub fn num_changes_detected(&self) -> usize {
        self.changed_codes.len()
    }

    /// The codes recorded since the last reset
    pub fn changed_codes(&self) -> &CodeSet {
        &self.changed_codes
    }

    // === Clear ===

    /// Remove all content, keeping the current geometry.
    pub fn clear(&mut self) {
        let (resolution, depth_levels) = (self.resolution, self.depth_levels);
        // Parameters are unchanged, so this cannot fail
        let _ = self.clear_with(resolution, depth_levels);
    }

    /// Remove all content and switch to a new geometry.
    pub fn clear_with(&mut self, resolution: f32, depth_levels: u32) -> Result<()> {
        if !(resolution > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        if !(crate::config::MIN_DEPTH_LEVELS..=crate::config::MAX_DEPTH_LEVELS)
            .contains(&depth_levels)
        {
            return Err(Error::InvalidConfig(format!(
                "depth_levels must be in [{}, {}], got {}",
                crate::config::MIN_DEPTH_LEVELS,
                crate::config::MAX_DEPTH_LEVELS,
                depth_levels
            )));
        }

        // Dropping the root tears down every child block it owns
        self.root = InnerNode::default();
        self.root.contains_free = self.is_free_log(0.0);
        self.root.contains_unknown = self.is_unknown_log(0.0);
        self.num_inner_nodes = 0;
        self.num_inner_leaf_nodes = 1;
        self.num_leaf_nodes = 0;

        self.depth_levels = depth_levels;
        self.max_value = 1u32 << (depth_levels - 1);
        if resolution != self.resolution {
            self.resolution = resolution;
            self.resolution_factor = 1.0 / resolution;
        }
        self.rebuild_size_tables();
        Ok(())
    }

    // === Update / set ===

    /// Add a log-odds delta to the voxel addressed by `code`, clamped, and
    /// propagate summary changes toward the root.
    ///
    /// Saturated voxels short-circuit: a positive delta on a voxel already at
    /// the upper clamp (or negative at the lower clamp) is a no-op.
    pub fn update_node_value(&mut self, code: Code, logit_update: f32) -> NodeSample<T> {
        let node = self.get_node(code);
        if (0.0 <= logit_update && node.value.logit() >= self.clamp_max_log)
            || (0.0 >= logit_update && node.value.logit() <= self.clamp_min_log)
        {
            return node;
        }
        let mut root = std::mem::take(&mut self.root);
        let (sample, _) =
            self.update_value_recurs(code, logit_update, &mut root, self.depth_levels, false);
        self.root = root;
        sample
    }

    /// Add a log-odds delta to the voxel containing `coord` at `depth`
    pub fn update_node_value_at(
        &mut self,
        coord: Point3,
        logit_update: f32,
        depth: u32,
    ) -> NodeSample<T> {
        self.update_node_value(Code::from_key(&self.coord_to_key(coord, depth)), logit_update)
    }

    /// Overwrite the voxel addressed by `code` with a log-odds value
    /// (clamped). Setting an inner node overwrites its entire subtree.
    pub fn set_node_value(&mut self, code: Code, logit_value: f32) -> NodeSample<T> {
        let logit_value = logit_value.clamp(self.clamp_min_log, self.clamp_max_log);
        let node = self.get_node(code);
        if logit_value == node.value.logit() {
            return node;
        }
        let mut root = std::mem::take(&mut self.root);
        let (sample, _) =
            self.update_value_recurs(code, logit_value, &mut root, self.depth_levels, true);
        self.root = root;
        sample
    }

    /// Overwrite the voxel containing `coord` at `depth`
    pub fn set_node_value_at(
        &mut self,
        coord: Point3,
        logit_value: f32,
        depth: u32,
    ) -> NodeSample<T> {
        self.set_node_value(Code::from_key(&self.coord_to_key(coord, depth)), logit_value)
    }

    /// Integrate a sensor hit at `code`
    pub fn integrate_hit(&mut self, code: Code) -> NodeSample<T> {
        let delta = self.prob_hit_log;
        self.update_node_value(code, delta)
    }

    /// Integrate a sensor hit at the voxel containing `coord`
    pub fn integrate_hit_at(&mut self, coord: Point3, depth: u32) -> NodeSample<T> {
        self.integrate_hit(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// Integrate a sensor miss at `code`
    pub fn integrate_miss(&mut self, code: Code) -> NodeSample<T> {
        let delta = self.prob_miss_log;
        self.update_node_value(code, delta)
    }

    /// Integrate a sensor miss at the voxel containing `coord`
    pub fn integrate_miss_at(&mut self, coord: Point3, depth: u32) -> NodeSample<T> {
        self.integrate_miss(Code::from_key(&self.coord_to_key(coord, depth)))
    }

    /// Clear every cell in the box `[bbx_min, bbx_max]` at `depth` down to
    /// the lower clamping bound (known free).
    pub fn clear_area_bbx(&mut self, bbx_min: Point3, bbx_max: Point3, depth: u32) {
        let min_key = self.coord_to_key(bbx_min, depth);
        let max_key = self.coord_to_key(bbx_max, depth);
        let clamp_min = self.clamp_min_log;
        let inc = 1u32 << depth;

        let mut x = min_key.x();
        while x <= max_key.x() {
            let mut y = min_key.y();
            while y <= max_key.y() {
                let mut z = min_key.z();
                while z <= max_key.z() {
                    self.set_node_value(Code::from_key(&Key::new(x, y, z, depth)), clamp_min);
                    z += inc;
                }
                y += inc;
            }
            x += inc;
        }
    }

    fn update_value_recurs(
        &mut self,
        code: Code,
        logit_value: f32,
        node: &mut InnerNode<T>,
        current_depth: u32,
        set_value: bool,
    ) -> (NodeSample<T>, bool) {
        if current_depth > code.depth() {
            self.expand_node(node, current_depth);
            let child_depth = current_depth - 1;
            let child_idx = code.child_idx(child_depth);

            let (sample, mut changed) = match node.children.as_deref_mut() {
                Some(Children::Leaf(children)) => {
                    let new_logit = if set_value {
                        logit_value.clamp(self.clamp_min_log, self.clamp_max_log)
                    } else {
                        (children[child_idx].logit() + logit_value)
                            .clamp(self.clamp_min_log, self.clamp_max_log)
                    };
                    children[child_idx].set_logit(new_logit);
                    let value = children[child_idx];
                    if self.change_detection_enabled {
                        self.changed_codes.insert(code);
                    }
                    (self.sample_of_leaf(value, code), true)
                }
                Some(Children::Inner(children)) => self.update_value_recurs(
                    code,
                    logit_value,
                    &mut children[child_idx],
                    child_depth,
                    set_value,
                ),
                None => {
                    debug_assert!(false, "expand_node left no child block");
                    return (self.sample_of(node, code.to_depth(current_depth)), false);
                }
            };

            if changed {
                changed = self.summarize_node(node, current_depth);
                if changed && self.change_detection_enabled {
                    self.changed_codes.insert(code.to_depth(current_depth));
                }
            }
            (sample, changed)
        } else {
            // Reached the target depth
            let new_logit = if set_value {
                logit_value.clamp(self.clamp_min_log, self.clamp_max_log)
            } else {
                (node.value.logit() + logit_value).clamp(self.clamp_min_log, self.clamp_max_log)
            };
            node.value.set_logit(new_logit);

            if self.is_occupied_log(new_logit) && !node.all_children_same {
                // Occupied and expanded: push the same operation into every
                // child so the subtree stays consistent with its summary.
                let child_depth = current_depth - 1;
                match node.children.as_deref_mut() {
                    Some(Children::Leaf(children)) => {
                        for (idx, child) in children.iter_mut().enumerate() {
                            let new = if set_value {
                                logit_value
                            } else {
                                child.logit() + logit_value
                            };
                            child.set_logit(new.clamp(self.clamp_min_log, self.clamp_max_log));
                            if self.change_detection_enabled {
                                self.changed_codes.insert(code.child(idx));
                            }
                        }
                    }
                    Some(Children::Inner(children)) => {
                        for (idx, child) in children.iter_mut().enumerate() {
                            self.update_value_recurs(
                                code.child(idx),
                                logit_value,
                                child,
                                child_depth,
                                set_value,
                            );
                        }
                    }
                    None => {}
                }
                self.summarize_node(node, current_depth);
            } else {
                // Not occupied (or collapsed): the subtree becomes uniform
                self.prune_node(node, current_depth, false);
            }

            if self.change_detection_enabled {
                self.changed_codes.insert(code);
            }
            (self.sample_of(node, code), true)
        }
    }

    // === Expand / prune ===

    /// Allocate a child block if none exists. Returns true on allocation.
    pub(crate) fn create_children(&mut self, node: &mut InnerNode<T>, depth: u32) -> bool {
        if node.children.is_some() {
            node.all_children_same = false;
            return false;
        }
        if depth == 1 {
            node.children = Some(Box::new(Children::Leaf([T::default(); 8])));
            self.num_leaf_nodes += 8;
            self.num_inner_leaf_nodes -= 1;
            self.num_inner_nodes += 1;
        } else {
            node.children = Some(Box::new(Children::Inner(std::array::from_fn(|_| {
                InnerNode::default()
            }))));
            // Eight new collapsed nodes, one node stops being collapsed
            self.num_inner_leaf_nodes += 7;
            self.num_inner_nodes += 1;
        }
        node.all_children_same = false;
        true
    }

    /// Expand a collapsed node: allocate (or reuse) its child block and seed
    /// every child from the parent so the tree's meaning is unchanged.
    /// Returns true if the node was collapsed.
    pub(crate) fn expand_node(&mut self, node: &mut InnerNode<T>, depth: u32) -> bool {
        if !node.all_children_same {
            return false;
        }
        self.create_children(node, depth);

        let value = node.value;
        let contains_free = node.contains_free;
        let contains_unknown = node.contains_unknown;
        match node.children.as_deref_mut() {
            Some(Children::Leaf(children)) => {
                for child in children.iter_mut() {
                    *child = value;
                }
            }
            Some(Children::Inner(children)) => {
                for child in children.iter_mut() {
                    child.value = value;
                    child.contains_free = contains_free;
                    child.contains_unknown = contains_unknown;
                    child.all_children_same = true;
                }
            }
            None => {}
        }
        true
    }

    /// Mark a node collapsed and free its child block when permitted.
    ///
    /// With automatic pruning disabled and `manual` false, the block is
    /// retained (and the node counters keep counting it) until a manual
    /// [`prune`](Self::prune) pass.
    pub(crate) fn delete_children(&mut self, node: &mut InnerNode<T>, depth: u32, manual: bool) {
        node.all_children_same = true;
        if !manual && !self.automatic_pruning {
            return;
        }
        let Some(children) = node.children.take() else {
            return;
        };
        match *children {
            Children::Leaf(_) => {
                self.num_leaf_nodes -= 8;
                self.num_inner_leaf_nodes += 1;
                self.num_inner_nodes -= 1;
            }
            Children::Inner(mut children) => {
                let child_depth = depth - 1;
                for child in children.iter_mut() {
                    self.delete_children(child, child_depth, manual);
                }
                self.num_inner_leaf_nodes -= 7;
                self.num_inner_nodes -= 1;
            }
        }
    }

    /// Collapse a node and refresh its summary flags from its own value.
    pub(crate) fn prune_node(&mut self, node: &mut InnerNode<T>, depth: u32, manual: bool) {
        self.delete_children(node, depth, manual);
        node.contains_free = self.is_free_log(node.value.logit());
        node.contains_unknown = self.is_unknown_log(node.value.logit());
    }

    /// Recompute a node's summary from its children, collapsing when they
    /// are identical. Returns true if any field of the node changed.
    pub(crate) fn summarize_node(&mut self, node: &mut InnerNode<T>, depth: u32) -> bool {
        let (new_logit, new_free, new_unknown) = match node.children.as_deref() {
            None => return false,
            Some(Children::Leaf(children)) => {
                if children.iter().all(|c| *c == children[0]) {
                    node.value = children[0];
                    self.prune_node(node, depth, false);
                    return true;
                }
                let mut max_logit = children[0].logit();
                let mut any_free = false;
                let mut any_unknown = false;
                for child in children {
                    max_logit = max_logit.max(child.logit());
                    if self.is_free_log(child.logit()) {
                        any_free = true;
                    } else if self.is_unknown_log(child.logit()) {
                        any_unknown = true;
                    }
                }
                (max_logit, any_free, any_unknown)
            }
            Some(Children::Inner(children)) => {
                let collapsible = children[0].all_children_same
                    && children
                        .iter()
                        .all(|c| c.all_children_same && c.value == children[0].value);
                if collapsible {
                    node.value = children[0].value;
                    self.prune_node(node, depth, false);
                    return true;
                }
                let mut max_logit = f32::MIN;
                let mut any_free = false;
                let mut any_unknown = false;
                for child in children {
                    max_logit = max_logit.max(child.value.logit());
                    any_free |= child.contains_free;
                    any_unknown |= child.contains_unknown;
                }
                (max_logit, any_free, any_unknown)
            }
        };

        if node.value.logit() != new_logit
            || node.contains_free != new_free
            || node.contains_unknown != new_unknown
        {
            node.value.set_logit(new_logit);
            node.contains_free = new_free;
            node.contains_unknown = new_unknown;
            return true;
        }
        false
    }

    /// Run a manual pruning pass over the whole tree, collapsing every
    /// uniform subtree and freeing blocks deferred while automatic pruning
    /// was disabled. A second pass directly after is a no-op.
    pub fn prune(&mut self) {
        let mut root = std::mem::take(&mut self.root);
        let depth = self.depth_levels;
        self.prune_recurs(&mut root, depth);
        self.root = root;
    }

    fn prune_recurs(&mut self, node: &mut InnerNode<T>, depth: u32) {
        if node.children.is_none() {
            return;
        }
        if node.all_children_same {
            // Block deferred by a collapse while automatic pruning was off
            self.delete_children(node, depth, true);
            return;
        }
        let mut collapse_value = None;
        match node.children.as_deref_mut() {
            Some(Children::Inner(children)) => {
                for child in children.iter_mut() {
                    self.prune_recurs(child, depth - 1);
                }
                let collapsible = children[0].all_children_same
                    && children
                        .iter()
                        .all(|c| c.all_children_same && c.value == children[0].value);
                if collapsible {
                    collapse_value = Some(children[0].value);
                }
            }
            Some(Children::Leaf(children)) => {
                if children.iter().all(|c| *c == children[0]) {
                    collapse_value = Some(children[0]);
                }
            }
            None => {}
        }
        if let Some(value) = collapse_value {
            node.value = value;
            self.prune_node(node, depth, true);
        }
    }

    /// Recompute every `contains_*` summary in the tree. Needed after the
    /// occupancy or free threshold changes, since the cached flags were
    /// computed against the old thresholds.
    fn re_summarize(&mut self) {
        let mut root = std::mem::take(&mut self.root);
        let depth = self.depth_levels;
        self.re_summarize_recurs(&mut root, depth);
        self.root = root;
    }

    fn re_summarize_recurs(&mut self, node: &mut InnerNode<T>, depth: u32) {
        if node.all_children_same || node.children.is_none() {
            node.contains_free = self.is_free_log(node.value.logit());
            node.contains_unknown = self.is_unknown_log(node.value.logit());
            return;
        }
        if let Some(Children::Inner(children)) = node.children.as_deref_mut() {
            for child in children.iter_mut() {
                self.re_summarize_recurs(child, depth - 1);
            }
        }
        self.summarize_node(node, depth);
    }

    // === Cloud helpers ===

    /// Deduplicate a cloud to one representative point per voxel at `depth`.
    pub fn discretize_cloud(&self, cloud: &PointCloud, depth: u32) -> PointCloud {
        let mut discrete = PointCloud::with_capacity(cloud.len());
        let mut seen = KeySet::default();
        for &point in cloud {
            let key = self.coord_to_key(point, depth);
            if seen.insert(key) {
                discrete.push(self.key_to_coord(&key));
            }
        }
        discrete
    }

    // === Known-space metrics ===

    /// Minimum corner of all known (occupied or free) space
    pub fn metric_min(&self) -> Point3 {
        let mut min_coord = self.max_coord();
        for view in self.iter_leaves(super::iter::TraversalFilter::known()) {
            let low = view.center - Point3::splat(view.size / 2.0);
            min_coord = min_coord.min(&low);
        }
        min_coord
    }

    /// Maximum corner of all known (occupied or free) space
    pub fn metric_max(&self) -> Point3 {
        let mut max_coord = self.min_coord();
        for view in self.iter_leaves(super::iter::TraversalFilter::known()) {
            let high = view.center + Point3::splat(view.size / 2.0);
            max_coord = max_coord.max(&high);
        }
        max_coord
    }

    /// Extent of all known space per axis
    pub fn metric_size(&self) -> Point3 {
        self.metric_max() - self.metric_min()
    }

    /// Volume in cubic meters of the known-space bounding box
    pub fn volume(&self) -> f64 {
        let size = self.metric_size();
        size.x as f64 * size.y as f64 * size.z as f64
    }

    // === Snapshot / restore (used by deserialization) ===

    pub(crate) fn snapshot(&self) -> TreeSnapshot<T> {
        TreeSnapshot {
            root: self.root.clone(),
            resolution: self.resolution,
            resolution_factor: self.resolution_factor,
            depth_levels: self.depth_levels,
            max_value: self.max_value,
            node_sizes: self.node_sizes.clone(),
            node_half_sizes: self.node_half_sizes.clone(),
            num_inner_nodes: self.num_inner_nodes,
            num_inner_leaf_nodes: self.num_inner_leaf_nodes,
            num_leaf_nodes: self.num_leaf_nodes,
        }
    }

    pub(crate) fn restore(&mut self, snapshot: TreeSnapshot<T>) {
        self.root = snapshot.root;
        self.resolution = snapshot.resolution;
        self.resolution_factor = snapshot.resolution_factor;
        self.depth_levels = snapshot.depth_levels;
        self.max_value = snapshot.max_value;
        self.node_sizes = snapshot.node_sizes;
        self.node_half_sizes = snapshot.node_half_sizes;
        self.num_inner_nodes = snapshot.num_inner_nodes;
        self.num_inner_leaf_nodes = snapshot.num_inner_leaf_nodes;
        self.num_leaf_nodes = snapshot.num_leaf_nodes;
    }
}

//! Configuration types for the occupancy octree.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum number of depth levels an octree can have.
pub const MIN_DEPTH_LEVELS: u32 = 2;

/// Maximum number of depth levels an octree can have.
///
/// Keys are Morton-packed into a `u64`, which holds three 21-bit components.
pub const MAX_DEPTH_LEVELS: u32 = 21;

/// Occupancy octree configuration.
///
/// All probabilities are plain probabilities in `(0, 1)`; the tree converts
/// them to log-odds internally. The defaults follow the standard inverse
/// sensor model for depth sensors: hits are weighted stronger than misses so
/// obstacles are "stickier" than free space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OctreeConfig {
    /// Leaf voxel size in meters (e.g. 0.1 = 10cm voxels)
    pub resolution: f32,

    /// Number of depth levels, in `[2, 21]`. The representable cube spans
    /// `resolution * 2^depth_levels` meters per axis, centered at the origin.
    pub depth_levels: u32,

    /// Collapse uniform subtrees automatically during updates.
    /// When disabled, collapsed equivalence is still tracked but the child
    /// memory is retained until a manual prune pass.
    pub automatic_pruning: bool,

    /// Probability threshold above which a voxel counts as occupied
    pub occupancy_thres: f32,

    /// Probability threshold below which a voxel counts as free
    pub free_thres: f32,

    /// Probability assigned to a sensor hit
    pub prob_hit: f32,

    /// Probability assigned to a sensor miss (ray pass-through)
    pub prob_miss: f32,

    /// Lower clamping bound for stored occupancy probability
    pub clamp_thres_min: f32,

    /// Upper clamping bound for stored occupancy probability
    pub clamp_thres_max: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
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
}

impl OctreeConfig {
    /// Create a configuration with a given voxel size and tree depth,
    /// keeping the default sensor model.
    pub fn with_resolution(resolution: f32, depth_levels: u32) -> Self {
        Self {
            resolution,
            depth_levels,
            ..Default::default()
        }
    }

    /// Side length in meters of the cube the tree can represent.
    pub fn metric_extent(&self) -> f32 {
        self.resolution * (1u64 << self.depth_levels) as f32
    }

    /// Check all parameters, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(MIN_DEPTH_LEVELS..=MAX_DEPTH_LEVELS).contains(&self.depth_levels) {
            return Err(Error::InvalidConfig(format!(
                "depth_levels must be in [{}, {}], got {}",
                MIN_DEPTH_LEVELS, MAX_DEPTH_LEVELS, self.depth_levels
            )));
        }
        for (name, p) in [
            ("occupancy_thres", self.occupancy_thres),
            ("free_thres", self.free_thres),
            ("prob_hit", self.prob_hit),
            ("prob_miss", self.prob_miss),
            ("clamp_thres_min", self.clamp_thres_min),
            ("clamp_thres_max", self.clamp_thres_max),
        ] {
            if !(0.0 < p && p < 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    name, p
                )));
            }
        }
        if self.clamp_thres_min > self.clamp_thres_max {
            return Err(Error::InvalidConfig(format!(
                "clamp_thres_min {} exceeds clamp_thres_max {}",
                self.clamp_thres_min, self.clamp_thres_max
            )));
        }
        Ok(())
    }
}

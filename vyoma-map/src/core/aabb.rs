//! Axis-aligned bounding volumes used to restrict traversal and serialization.

use serde::{Deserialize, Serialize};

use super::Point3;

/// An axis-aligned bounding box stored as center and half extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Box center
    pub center: Point3,
    /// Half extent per axis
    pub half_size: Point3,
}

impl Aabb {
    /// Create a box from its minimum and maximum corners
    #[inline]
    pub fn new(min: Point3, max: Point3) -> Self {
        let half_size = (max - min) / 2.0;
        Self {
            center: min + half_size,
            half_size,
        }
    }

    /// Create a cube from a center and a scalar half extent
    #[inline]
    pub fn cube(center: Point3, half_size: f32) -> Self {
        Self {
            center,
            half_size: Point3::splat(half_size),
        }
    }

    /// Minimum corner
    #[inline]
    pub fn min(&self) -> Point3 {
        self.center - self.half_size
    }

    /// Maximum corner
    #[inline]
    pub fn max(&self) -> Point3 {
        self.center + self.half_size
    }

    /// True if the two boxes overlap (touching counts as overlapping)
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        let delta = (self.center - other.center).abs();
        let reach = self.half_size + other.half_size;
        delta.x <= reach.x && delta.y <= reach.y && delta.z <= reach.z
    }

    /// True if the point lies inside or on the boundary
    #[inline]
    pub fn contains(&self, point: &Point3) -> bool {
        let delta = (self.center - *point).abs();
        delta.x <= self.half_size.x && delta.y <= self.half_size.y && delta.z <= self.half_size.z
    }
}

/// A set of bounding primitives.
///
/// An empty volume places no restriction: traversal and serialization treat
/// it as "everything intersects".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    volumes: Vec<Aabb>,
}

impl BoundingVolume {
    /// Create an empty (unrestricted) volume
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a volume from a single box
    #[inline]
    pub fn from_aabb(aabb: Aabb) -> Self {
        Self {
            volumes: vec![aabb],
        }
    }

    /// Add a box to the set
    #[inline]
    pub fn add(&mut self, aabb: Aabb) {
        self.volumes.push(aabb);
    }

    /// True if no primitives have been added
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// True if any primitive overlaps `aabb`
    #[inline]
    pub fn intersects(&self, aabb: &Aabb) -> bool {
        self.volumes.iter().any(|v| v.intersects(aabb))
    }

    /// Iterate over the primitives
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Aabb> {
        self.volumes.iter()
    }
}

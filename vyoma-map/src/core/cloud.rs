//! Point cloud container for sensor observations.

use serde::{Deserialize, Serialize};

use super::{Point3, Pose3D};

/// A growable sequence of 3D points in a common frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    points: Vec<Point3>,
}

impl PointCloud {
    /// Create an empty cloud
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cloud with pre-allocated capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a cloud from a slice of points
    #[inline]
    pub fn from_points(points: &[Point3]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    /// Number of points
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the cloud holds no points
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reserve capacity for at least `additional` more points
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.points.reserve(additional);
    }

    /// Append a point
    #[inline]
    pub fn push(&mut self, point: Point3) {
        self.points.push(point);
    }

    /// Remove all points, keeping the allocation
    #[inline]
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Iterate over the points
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Point3> {
        self.points.iter()
    }

    /// The points as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Point3] {
        &self.points
    }

    /// Apply a rigid transform to every point in place
    pub fn transform(&mut self, pose: &Pose3D) {
        for point in &mut self.points {
            *point = pose.transform_point(*point);
        }
    }

    /// Transformed copy of this cloud
    pub fn transformed(&self, pose: &Pose3D) -> PointCloud {
        let mut cloud = self.clone();
        cloud.transform(pose);
        cloud
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Point3;
    type IntoIter = std::slice::Iter<'a, Point3>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl FromIterator<Point3> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<Point3> for PointCloud {
    fn extend<I: IntoIterator<Item = Point3>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

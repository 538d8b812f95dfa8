//! Rigid 3D transforms for pre-transforming sensor data into the map frame.

use serde::{Deserialize, Serialize};

use super::Point3;

/// Unit quaternion representing a 3D rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar part
    pub w: f32,
    /// Vector part, x
    pub x: f32,
    /// Vector part, y
    pub y: f32,
    /// Vector part, z
    pub z: f32,
}

impl Quaternion {
    /// Identity rotation
    #[inline]
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Create from intrinsic roll/pitch/yaw angles (radians)
    pub fn from_euler(roll: f32, pitch: f32, yaw: f32) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    /// Normalize to unit length
    pub fn normalized(&self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        Self {
            w: self.w / n,
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
        }
    }

    /// Rotate a point by this quaternion.
    ///
    /// Uses the expanded form `p + 2w(v × p) + 2(v × (v × p))` which avoids
    /// constructing intermediate quaternions.
    pub fn rotate(&self, p: Point3) -> Point3 {
        let v = Point3::new(self.x, self.y, self.z);
        let cross1 = cross(&v, &p);
        let cross2 = cross(&v, &cross1);
        p + cross1 * (2.0 * self.w) + cross2 * 2.0
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

#[inline]
fn cross(a: &Point3, b: &Point3) -> Point3 {
    Point3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// A rigid transform in 3D: rotation followed by translation.
///
/// Used to move a point cloud from the sensor frame into the map frame
/// before insertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    /// Translation in meters
    pub translation: Point3,
    /// Rotation
    pub rotation: Quaternion,
}

impl Pose3D {
    /// Identity transform
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create from translation and rotation
    #[inline]
    pub fn new(translation: Point3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Create from position and roll/pitch/yaw angles (radians)
    pub fn from_euler(x: f32, y: f32, z: f32, roll: f32, pitch: f32, yaw: f32) -> Self {
        Self {
            translation: Point3::new(x, y, z),
            rotation: Quaternion::from_euler(roll, pitch, yaw),
        }
    }

    /// Apply the transform to a point
    #[inline]
    pub fn transform_point(&self, p: Point3) -> Point3 {
        self.rotation.rotate(p) + self.translation
    }
}

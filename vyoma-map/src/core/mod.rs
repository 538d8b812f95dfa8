//! Fundamental types: points, poses, clouds, keys, codes and bounding volumes.

mod aabb;
mod cloud;
mod code;
mod key;
mod point;
mod pose;

pub use aabb::{Aabb, BoundingVolume};
pub use cloud::PointCloud;
pub use code::{Code, CodeMap, CodeSet};
pub use key::{Key, KeyMap, KeySet};
pub use point::Point3;
pub use pose::{Pose3D, Quaternion};

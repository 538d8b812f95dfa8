//! Sparse occupancy octree: storage, probabilistic updates, ray traversal,
//! point-cloud integration and iteration.

mod insert;
mod iter;
mod node;
mod ray;
mod tree;

pub use iter::{NodeView, OctreeIter, TraversalFilter};
pub use node::{NodeSample, OccupancyCell, VoxelValue};
pub use ray::CastResult;
pub use tree::{logit, probability, OccupancyMap, Octree};

pub(crate) use node::{Children, InnerNode};

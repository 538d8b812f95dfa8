//! # Vyoma-Map: Sparse Octree Occupancy Mapping
//!
//! A 3D probabilistic occupancy mapping library organized as a sparse
//! octree, designed for robot navigation from depth sensors.
//!
//! ## Features
//!
//! - **Sparse Storage**: Nodes are allocated lazily and uniform subtrees
//!   collapse back into a single node, so large free or unexplored regions
//!   cost one node each
//! - **Log-Odds Occupancy**: Hits and misses integrate additively in
//!   log-odds with clamping, the standard Bayesian occupancy model
//! - **Summarized Queries**: Every inner node carries the maximum child
//!   log-odds plus `contains_free`/`contains_unknown` flags, so coarse
//!   queries and filtered traversal never touch full subtrees
//! - **Multiresolution Rays**: Voxel traversal and ray casting work at any
//!   tree depth, not just the leaf level
//! - **Compact Persistence**: Text header plus recursive child-bitmask
//!   binary body, optionally LZ4 compressed, with bounded-region support
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vyoma_map::{OccupancyMap, Octree, OctreeConfig, TraversalFilter};
//! use vyoma_map::core::{Point3, PointCloud};
//!
//! // 10cm voxels, 16 depth levels
//! let config = OctreeConfig::with_resolution(0.1, 16);
//! let mut map: OccupancyMap = Octree::new(config).unwrap();
//!
//! // Integrate a scan taken from the origin
//! let cloud = PointCloud::from_points(&[
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.1, 0.0),
//! ]);
//! map.insert_point_cloud(Point3::ZERO, &cloud, -1.0);
//!
//! // Query and iterate
//! if map.is_occupied_at(Point3::new(1.0, 0.0, 0.0), 0) {
//!     println!("obstacle!");
//! }
//! for view in map.iter_leaves(TraversalFilter::occupied_only()) {
//!     println!("occupied voxel at {:?}", view.center);
//! }
//! ```
//!
//! ## Coordinate Frame
//!
//! All coordinates follow the ROS REP-103 convention: X-forward, Y-left,
//! Z-up, in meters. The map spans a cube of `resolution * 2^depth_levels`
//! meters per axis, centered at the origin.
//!
//! ## Architecture
//!
//! The library is organized into modules:
//!
//! - [`core`]: Fundamental types (Point3, Pose3D, PointCloud, Key, Code,
//!   bounding volumes)
//! - [`config`]: Configuration types
//! - [`octree`]: The tree engine: storage, probabilistic updates, ray
//!   traversal, point-cloud integration, iterators
//! - [`io`]: Map file serialization
//! - [`error`]: Error types
//!
//! ## Data Flow
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │   Depth Sensor   │
//!                  │   (PointCloud)   │
//!                  └────────┬─────────┘
//!                           │ insert_point_cloud()
//!                           ▼
//!       ┌───────────────────────────────────────┐
//!       │    Per-point ray clipping (bbx)       │
//!       │    Voxel traversal (Amanatides-Woo)   │
//!       └───────────────────┬───────────────────┘
//!                           │ code -> log-odds delta
//!                           ▼
//!                ┌────────────────────┐
//!                │    Accumulator     │  hit overrides, miss
//!                │  (one per cloud)   │  only if absent
//!                └─────────┬──────────┘
//!                          │ update_node_value()
//!                          ▼
//!                ┌────────────────────┐
//!                │    Sparse Octree   │──► queries (occupied/free/unknown)
//!                │  expand / collapse │──► cast_ray, iterators
//!                │  summary flags     │──► change set, serialization
//!                └────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod octree;

// Re-export main types at crate root
pub use config::OctreeConfig;
pub use error::{Error, Result};
pub use io::WriteOptions;
pub use octree::{
    logit, probability, CastResult, NodeSample, NodeView, OccupancyCell, OccupancyMap, Octree,
    OctreeIter, TraversalFilter, VoxelValue,
};

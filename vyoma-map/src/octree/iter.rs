//! Depth-first traversal over the octree.
//!
//! Two flavors share one engine: the tree iterator visits every node whose
//! state matches the filter, parents before children; the leaf iterator only
//! yields at the deepest useful level (no children left, or the `min_depth`
//! cap). Subtrees that cannot contain a matching state are pruned from the
//! walk using the cached summaries, and children are visited in Morton order
//! 0..8, so iteration order is deterministic.

use crate::core::{Aabb, BoundingVolume, Code, Point3};

use super::node::{Children, InnerNode, VoxelValue};
use super::tree::Octree;

/// Which nodes a traversal visits and yields.
#[derive(Clone, Debug)]
pub struct TraversalFilter {
    /// Yield occupied space
    pub occupied: bool,
    /// Yield free space
    pub free: bool,
    /// Yield unknown space
    pub unknown: bool,
    /// Match inner summaries: yield a node when any descendant matches,
    /// not only when the node's own state does
    pub contains: bool,
    /// Do not descend below this depth
    pub min_depth: u32,
    /// Only visit nodes intersecting this volume (empty = everywhere)
    pub volume: BoundingVolume,
}

impl Default for TraversalFilter {
    fn default() -> Self {
        Self {
            occupied: true,
            free: true,
            unknown: false,
            contains: false,
            min_depth: 0,
            volume: BoundingVolume::new(),
        }
    }
}

impl TraversalFilter {
    /// Occupied and free space (the default)
    pub fn known() -> Self {
        Self::default()
    }

    /// Every state
    pub fn all() -> Self {
        Self {
            unknown: true,
            ..Self::default()
        }
    }

    /// Occupied space only
    pub fn occupied_only() -> Self {
        Self {
            free: false,
            ..Self::default()
        }
    }

    /// Free space only
    pub fn free_only() -> Self {
        Self {
            occupied: false,
            ..Self::default()
        }
    }

    /// Unknown space only
    pub fn unknown_only() -> Self {
        Self {
            occupied: false,
            free: false,
            unknown: true,
            ..Self::default()
        }
    }

    /// Match against descendant summaries instead of the node's own state
    pub fn containing(mut self) -> Self {
        self.contains = true;
        self
    }

    /// Restrict the walk to a bounding volume
    pub fn bounded(mut self, volume: BoundingVolume) -> Self {
        self.volume = volume;
        self
    }

    /// Cap the descent depth
    pub fn at_min_depth(mut self, min_depth: u32) -> Self {
        self.min_depth = min_depth;
        self
    }
}

/// One traversed node: payload plus geometry and summary flags.
#[derive(Clone, Copy, Debug)]
pub struct NodeView<T: VoxelValue> {
    /// Payload of the node
    pub value: T,
    /// Code (and depth) of the node
    pub code: Code,
    /// Center of the node's cell
    pub center: Point3,
    /// Edge length of the node's cell
    pub size: f32,
    /// True if the node had no children to descend into
    pub is_leaf: bool,
    /// Any descendant (or the node itself) below the free threshold
    pub contains_free: bool,
    /// Any descendant (or the node itself) in the unknown band
    pub contains_unknown: bool,
}

impl<T: VoxelValue> NodeView<T> {
    /// Depth of the node
    #[inline]
    pub fn depth(&self) -> u32 {
        self.code.depth()
    }
}

#[derive(Clone, Copy)]
enum NodeRef<'a, T: VoxelValue> {
    Inner(&'a InnerNode<T>),
    Leaf(&'a T),
}

struct StackEntry<'a, T: VoxelValue> {
    node: NodeRef<'a, T>,
    code: Code,
}

/// Depth-first iterator over the tree. Created by
/// [`Octree::iter_tree`] and [`Octree::iter_leaves`].
pub struct OctreeIter<'a, T: VoxelValue> {
    tree: &'a Octree<T>,
    filter: TraversalFilter,
    leaves_only: bool,
    stack: Vec<StackEntry<'a, T>>,
}

impl<'a, T: VoxelValue> OctreeIter<'a, T> {
    fn new(tree: &'a Octree<T>, filter: TraversalFilter, leaves_only: bool) -> Self {
        let stack = vec![StackEntry {
            node: NodeRef::Inner(&tree.root),
            code: Code::new(0, tree.depth_levels()),
        }];
        Self {
            tree,
            filter,
            leaves_only,
            stack,
        }
    }
}

impl<'a, T: VoxelValue> Iterator for OctreeIter<'a, T> {
    type Item = NodeView<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(entry) = self.stack.pop() {
            let tree = self.tree;
            let depth = entry.code.depth();

            let (value, contains_free, contains_unknown, has_children) = match entry.node {
                NodeRef::Inner(node) => (
                    node.value,
                    node.contains_free,
                    node.contains_unknown,
                    !node.all_children_same,
                ),
                NodeRef::Leaf(value) => (
                    *value,
                    tree.is_free_log(value.logit()),
                    tree.is_unknown_log(value.logit()),
                    false,
                ),
            };

            let center = tree.key_to_coord(&entry.code.to_key());
            if !self.filter.volume.is_empty() {
                let aabb = Aabb::cube(center, tree.node_half_size(depth));
                if !self.filter.volume.intersects(&aabb) {
                    continue;
                }
            }

            // The summary log-odds is the subtree maximum, so the node's own
            // occupied state doubles as "contains occupied"
            let contains_occupied = tree.is_occupied_log(value.logit());
            let reachable = (self.filter.occupied && contains_occupied)
                || (self.filter.free && contains_free)
                || (self.filter.unknown && contains_unknown);
            if !reachable {
                continue;
            }

            if has_children && depth > self.filter.min_depth {
                if let NodeRef::Inner(node) = entry.node {
                    match node.children.as_deref() {
                        Some(Children::Inner(children)) => {
                            for idx in (0..8).rev() {
                                self.stack.push(StackEntry {
                                    node: NodeRef::Inner(&children[idx]),
                                    code: entry.code.child(idx),
                                });
                            }
                        }
                        Some(Children::Leaf(children)) => {
                            for idx in (0..8).rev() {
                                self.stack.push(StackEntry {
                                    node: NodeRef::Leaf(&children[idx]),
                                    code: entry.code.child(idx),
                                });
                            }
                        }
                        None => {}
                    }
                }
            }

            let matches = if self.filter.contains {
                reachable
            } else {
                (self.filter.occupied && tree.is_occupied_log(value.logit()))
                    || (self.filter.free && tree.is_free_log(value.logit()))
                    || (self.filter.unknown && tree.is_unknown_log(value.logit()))
            };
            let terminal = !has_children || depth == self.filter.min_depth;
            if matches && (!self.leaves_only || terminal) {
                return Some(NodeView {
                    value,
                    code: entry.code,
                    center,
                    size: tree.node_size(depth),
                    is_leaf: !has_children,
                    contains_free,
                    contains_unknown,
                });
            }
        }
        None
    }
}

impl<T: VoxelValue> Octree<T> {
    /// Iterate over every node (inner and leaf) matching the filter,
    /// parents before children, children in Morton order.
    pub fn iter_tree(&self, filter: TraversalFilter) -> OctreeIter<'_, T> {
        OctreeIter::new(self, filter, false)
    }

    /// Iterate over the deepest useful nodes matching the filter: nodes
    /// without children, and nodes at the filter's `min_depth`.
    pub fn iter_leaves(&self, filter: TraversalFilter) -> OctreeIter<'_, T> {
        OctreeIter::new(self, filter, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OctreeConfig;
    use crate::octree::tree::OccupancyMap;
    use crate::octree::Octree;

    fn test_tree() -> OccupancyMap {
        Octree::new(OctreeConfig::default()).unwrap()
    }

    fn occupy(tree: &mut OccupancyMap, p: Point3) {
        for _ in 0..3 {
            tree.integrate_hit_at(p, 0);
        }
    }

    #[test]
    fn test_empty_tree_yields_root_for_unknown() {
        let tree = test_tree();
        assert_eq!(tree.iter_leaves(TraversalFilter::known()).count(), 0);
        let views: Vec<_> = tree.iter_leaves(TraversalFilter::unknown_only()).collect();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].depth(), tree.depth_levels());
        assert!(views[0].is_leaf);
    }

    #[test]
    fn test_tree_iter_counts_all_nodes() {
        let mut tree = test_tree();
        occupy(&mut tree, Point3::new(0.05, 0.05, 0.05));
        occupy(&mut tree, Point3::new(-2.0, 1.0, 0.0));
        let count = tree.iter_tree(TraversalFilter::all()).count();
        assert_eq!(count, tree.size());
    }

    #[test]
    fn test_leaf_iter_occupied_only() {
        let mut tree = test_tree();
        let a = Point3::new(0.05, 0.05, 0.05);
        let b = Point3::new(1.05, 0.05, 0.05);
        occupy(&mut tree, a);
        occupy(&mut tree, b);

        let views: Vec<_> = tree.iter_leaves(TraversalFilter::occupied_only()).collect();
        assert_eq!(views.len(), 2);
        for view in &views {
            assert_eq!(view.depth(), 0);
            assert!(tree.is_occupied_log(view.value.logit));
            assert!((view.size - tree.resolution()).abs() < 1e-6);
        }
        // Morton order: the cell nearer the low corner comes first
        assert!(views[0].center.x < views[1].center.x);
    }

    #[test]
    fn test_leaf_iter_includes_collapsed_regions() {
        let mut tree = test_tree();
        // Saturate a full depth-1 cell so it collapses into one node
        let points: Vec<Point3> = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 != 0 { 0.15 } else { 0.05 },
                    if i & 2 != 0 { 0.15 } else { 0.05 },
                    if i & 4 != 0 { 0.15 } else { 0.05 },
                )
            })
            .collect();
        for _ in 0..8 {
            for &p in &points {
                tree.integrate_miss_at(p, 0);
            }
        }

        let views: Vec<_> = tree.iter_leaves(TraversalFilter::free_only()).collect();
        assert_eq!(views.len(), 1);
        // The collapsed node stands in for its whole subtree
        assert_eq!(views[0].depth(), 1);
        assert!((views[0].size - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_min_depth_caps_descent() {
        let mut tree = test_tree();
        occupy(&mut tree, Point3::new(0.05, 0.05, 0.05));

        let views: Vec<_> = tree
            .iter_leaves(TraversalFilter::occupied_only().at_min_depth(2))
            .collect();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].depth(), 2);
        assert!(!views[0].is_leaf);
    }

    #[test]
    fn test_bounding_volume_filters() {
        let mut tree = test_tree();
        occupy(&mut tree, Point3::new(0.05, 0.05, 0.05));
        occupy(&mut tree, Point3::new(5.05, 0.05, 0.05));

        let volume =
            BoundingVolume::from_aabb(Aabb::cube(Point3::new(0.0, 0.0, 0.0), 1.0));
        let views: Vec<_> = tree
            .iter_leaves(TraversalFilter::occupied_only().bounded(volume))
            .collect();
        assert_eq!(views.len(), 1);
        assert!((views[0].center.x - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_contains_yields_inner_summaries() {
        let mut tree = test_tree();
        occupy(&mut tree, Point3::new(0.05, 0.05, 0.05));

        // At min_depth 3 with contains set, the inner summary qualifies even
        // though its own "state" is the max over a mixed subtree
        let views: Vec<_> = tree
            .iter_leaves(
                TraversalFilter::free_only().containing().at_min_depth(3),
            )
            .collect();
        assert!(views.is_empty());

        // Enough misses to drive the voxel below the free threshold
        for _ in 0..12 {
            tree.integrate_miss_at(Point3::new(0.05, 0.05, 0.05), 0);
        }
        let views: Vec<_> = tree
            .iter_leaves(
                TraversalFilter::free_only().containing().at_min_depth(3),
            )
            .collect();
        assert_eq!(views.len(), 1);
        assert!(views[0].contains_free);
    }

    #[test]
    fn test_tree_iter_preorder() {
        let mut tree = test_tree();
        occupy(&mut tree, Point3::new(0.05, 0.05, 0.05));
        let depths: Vec<u32> = tree
            .iter_tree(TraversalFilter::occupied_only())
            .map(|v| v.depth())
            .collect();
        // Straight spine: depths strictly decrease root-to-leaf
        let mut sorted = depths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(depths, sorted);
        assert_eq!(depths[0], tree.depth_levels());
        assert_eq!(*depths.last().unwrap(), 0);
    }
}

//! Node storage for the sparse octree.
//!
//! The tree is generic over its leaf payload through [`VoxelValue`]. An inner
//! node embeds a payload of its own: when the node has children, that payload
//! carries the subtree summary (its log-odds is the maximum over the
//! children); when the node is collapsed (`all_children_same`), the payload
//! *is* the uniform value of the entire subtree and no child block exists.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Leaf payload of an octree.
///
/// Implementors provide log-odds access for the probabilistic model, byte
/// stream (de)serialization for the map file body, and equality for collapse
/// detection. The `packed` hooks back the compact tri-state file variant;
/// the defaults report the variant as unsupported.
pub trait VoxelValue: Copy + PartialEq + Default {
    /// Stable identifier written to and checked against map file headers.
    const TREE_TYPE: &'static str;

    /// Log-odds occupancy of this voxel
    fn logit(&self) -> f32;

    /// Overwrite the log-odds occupancy
    fn set_logit(&mut self, logit: f32);

    /// Read this payload from a map file body.
    ///
    /// The occupancy and free thresholds of the *file* are provided so
    /// payload formats that only store a coarse state can reconstruct a
    /// representative log-odds.
    fn read_data<R: Read>(
        &mut self,
        reader: &mut R,
        occupancy_thres_log: f32,
        free_thres_log: f32,
    ) -> Result<()>;

    /// Write this payload to a map file body.
    fn write_data<W: Write>(
        &self,
        writer: &mut W,
        occupancy_thres_log: f32,
        free_thres_log: f32,
    ) -> Result<()>;

    /// Whether the compact tri-state file variant is implemented
    fn packed_support() -> bool {
        false
    }

    /// Read the compact tri-state payload variant.
    fn read_packed<R: Read>(
        &mut self,
        _reader: &mut R,
        _occupancy_thres_log: f32,
        _free_thres_log: f32,
    ) -> Result<()> {
        Err(Error::Unsupported("packed payload decoding"))
    }

    /// Write the compact tri-state payload variant.
    fn write_packed<W: Write>(
        &self,
        _writer: &mut W,
        _occupancy_thres_log: f32,
        _free_thres_log: f32,
    ) -> Result<()> {
        Err(Error::Unsupported("packed payload encoding"))
    }
}

/// The standard occupancy payload: a single clamped log-odds value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OccupancyCell {
    /// Log-odds occupancy estimate
    pub logit: f32,
}

impl OccupancyCell {
    /// Create a cell with a given log-odds value
    #[inline]
    pub fn new(logit: f32) -> Self {
        Self { logit }
    }
}

impl VoxelValue for OccupancyCell {
    const TREE_TYPE: &'static str = "occupancy_map";

    #[inline]
    fn logit(&self) -> f32 {
        self.logit
    }

    #[inline]
    fn set_logit(&mut self, logit: f32) {
        self.logit = logit;
    }

    fn read_data<R: Read>(
        &mut self,
        reader: &mut R,
        _occupancy_thres_log: f32,
        _free_thres_log: f32,
    ) -> Result<()> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        self.logit = f32::from_le_bytes(buf);
        Ok(())
    }

    fn write_data<W: Write>(
        &self,
        writer: &mut W,
        _occupancy_thres_log: f32,
        _free_thres_log: f32,
    ) -> Result<()> {
        writer.write_all(&self.logit.to_le_bytes())?;
        Ok(())
    }
}

/// The child block owned by an expanded inner node.
///
/// Nodes one level above the leaves own plain payloads; everything higher
/// owns further inner nodes.
#[derive(Clone, Debug)]
pub(crate) enum Children<T: VoxelValue> {
    Leaf([T; 8]),
    Inner([InnerNode<T>; 8]),
}

/// An inner node of the octree.
///
/// `all_children_same` is the canonical leaf-like predicate: when set, the
/// subtree below this node is uniform and `value` applies to all of it. The
/// child block is absent in that state unless automatic pruning is disabled,
/// in which case a stale block may be retained until a manual prune pass.
#[derive(Clone, Debug)]
pub(crate) struct InnerNode<T: VoxelValue> {
    /// Embedded payload; subtree summary (max child log-odds) when expanded
    pub value: T,
    /// Any descendant below the free threshold
    pub contains_free: bool,
    /// Any descendant inside the unknown band
    pub contains_unknown: bool,
    /// Subtree is uniform; `value` stands for all of it
    pub all_children_same: bool,
    /// Owned child block, absent while collapsed
    pub children: Option<Box<Children<T>>>,
}

impl<T: VoxelValue> Default for InnerNode<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            contains_free: false,
            contains_unknown: true,
            all_children_same: true,
            children: None,
        }
    }
}

impl<T: VoxelValue> InnerNode<T> {
    /// True if a child block is currently allocated
    #[inline]
    pub fn has_child_block(&self) -> bool {
        self.children.is_some()
    }
}

/// A by-value snapshot of one node, returned by lookups and updates.
///
/// Carrying the payload by value keeps query results independent of later
/// tree mutation. For a lookup that lands on a collapsed subtree the sample
/// describes the deepest existing ancestor and its code reflects that depth.
#[derive(Clone, Copy, Debug)]
pub struct NodeSample<T: VoxelValue> {
    /// Payload of the sampled node
    pub value: T,
    /// Code (and therefore depth) of the sampled node
    pub code: crate::core::Code,
    pub(crate) contains_free: bool,
    pub(crate) contains_unknown: bool,
    pub(crate) has_children: bool,
}

impl<T: VoxelValue> NodeSample<T> {
    /// Depth of the sampled node
    #[inline]
    pub fn depth(&self) -> u32 {
        self.code.depth()
    }

    /// True if the node had children to descend into when sampled
    #[inline]
    pub fn has_children(&self) -> bool {
        self.has_children
    }

    /// Any descendant (or the node itself, for leaves) below the free threshold
    #[inline]
    pub fn contains_free(&self) -> bool {
        self.contains_free
    }

    /// Any descendant (or the node itself, for leaves) in the unknown band
    #[inline]
    pub fn contains_unknown(&self) -> bool {
        self.contains_unknown
    }
}

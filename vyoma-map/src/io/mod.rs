//! Map file format: text header, recursive binary body, optional LZ4.
//!
//! Format:
//! - Text header, LF-terminated lines, token order independent:
//!   ```text
//!   # Vyoma octree file
//!   <comment lines beginning with #>
//!   version 1.0.0
//!   id occupancy_map
//!   binary <0|1>
//!   resolution <float>
//!   depth_levels <uint>
//!   occupancy_thres <probability>
//!   free_thres <probability>
//!   compressed <0|1>
//!   uncompressed_data_size <int>
//!   data
//!   ```
//! - Binary body, recursive from the root: one bitmask byte per inner node,
//!   bit `i` set when child `i` has further children to descend into. A zero
//!   byte is followed by the node's own payload; otherwise children are
//!   visited in Morton order, clear bits contributing their payload in
//!   place. One level above the leaves, the eight leaf payloads are written
//!   contiguously without another bitmask.
//! - When `compressed` is set the whole body is a single LZ4 block and
//!   `uncompressed_data_size` sizes the decode buffer.
//!
//! A bounding volume makes both writer and reader skip subtrees that do not
//! intersect it, so a bounded stream must be decoded with the same volume it
//! was encoded with.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::config::{MAX_DEPTH_LEVELS, MIN_DEPTH_LEVELS};
use crate::core::{Aabb, BoundingVolume, Point3};
use crate::error::{Error, Result};
use crate::octree::{logit, Children, InnerNode, Octree, VoxelValue};

/// First line of every map file.
pub const FILE_MAGIC: &str = "# Vyoma octree file";

/// Format version written to the header.
pub const FILE_VERSION: &str = "1.0.0";

/// Options for serializing a tree.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// LZ4-compress the body
    pub compress: bool,
    /// Use the compact tri-state payload variant (`binary 1` in the header)
    pub packed: bool,
    /// Only write subtrees intersecting this volume (empty = everything)
    pub volume: BoundingVolume,
    /// Write nodes at this depth as leaves, dropping finer detail
    pub min_depth: u32,
}

struct Header {
    packed: bool,
    resolution: f32,
    depth_levels: u32,
    occupancy_thres: f32,
    free_thres: f32,
    compressed: bool,
    uncompressed_data_size: usize,
}

fn parse_num<F: FromStr>(value: &str, what: &str) -> Result<F> {
    value
        .parse()
        .map_err(|_| Error::Format(format!("bad {} value '{}'", what, value)))
}

fn parse_flag(value: &str, what: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::Format(format!("bad {} flag '{}'", what, value))),
    }
}

fn parse_header<R: BufRead>(
    reader: &mut R,
    expected_id: &str,
    packed_support: bool,
) -> Result<Header> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(Error::Format("empty stream".to_string()));
    }
    if !line.starts_with(FILE_MAGIC) {
        return Err(Error::Format("missing file magic".to_string()));
    }

    let mut version = String::new();
    let mut id = String::new();
    let mut packed = false;
    let mut resolution = 0.0f32;
    let mut depth_levels = 0u32;
    let mut occupancy_thres = -1.0f32;
    let mut free_thres = -1.0f32;
    let mut compressed = false;
    let mut uncompressed_data_size = -1i64;
    let mut header_read = false;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed == "data" {
            header_read = true;
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let Some(token) = tokens.next() else {
            continue;
        };
        let value = tokens.next().unwrap_or("");
        match token {
            "version" => version = value.to_string(),
            "id" => id = value.to_string(),
            "binary" => packed = parse_flag(value, "binary")?,
            "resolution" => resolution = parse_num(value, "resolution")?,
            "depth_levels" => depth_levels = parse_num(value, "depth_levels")?,
            "occupancy_thres" => occupancy_thres = parse_num(value, "occupancy_thres")?,
            "free_thres" => free_thres = parse_num(value, "free_thres")?,
            "compressed" => compressed = parse_flag(value, "compressed")?,
            "uncompressed_data_size" => {
                uncompressed_data_size = parse_num(value, "uncompressed_data_size")?
            }
            _ => {} // unknown tokens are skipped
        }
    }

    if !header_read {
        return Err(Error::Format("header ended without data token".to_string()));
    }
    if version.is_empty() {
        return Err(Error::Format("missing version".to_string()));
    }
    if id.is_empty() {
        return Err(Error::Format("missing id".to_string()));
    }
    if packed && !packed_support {
        return Err(Error::Unsupported("packed map files for this tree type"));
    }
    if resolution <= 0.0 {
        return Err(Error::Format(format!(
            "resolution must be positive, got {}",
            resolution
        )));
    }
    if !(MIN_DEPTH_LEVELS..=MAX_DEPTH_LEVELS).contains(&depth_levels) {
        return Err(Error::Format(format!(
            "depth_levels must be in [{}, {}], got {}",
            MIN_DEPTH_LEVELS, MAX_DEPTH_LEVELS, depth_levels
        )));
    }
    for (what, value) in [
        ("occupancy_thres", occupancy_thres),
        ("free_thres", free_thres),
    ] {
        if !(0.0 < value && value < 1.0) {
            return Err(Error::Format(format!(
                "{} must be in (0, 1), got {}",
                what, value
            )));
        }
    }
    if uncompressed_data_size < 0 {
        return Err(Error::Format(
            "missing or negative uncompressed_data_size".to_string(),
        ));
    }
    if id != expected_id {
        log::warn!("rejecting map file with tree type '{}'", id);
        return Err(Error::Format(format!(
            "tree type mismatch: file holds '{}', receiver is '{}'",
            id, expected_id
        )));
    }

    Ok(Header {
        packed,
        resolution,
        depth_levels,
        occupancy_thres,
        free_thres,
        compressed,
        uncompressed_data_size: uncompressed_data_size as usize,
    })
}

/// Center of child `idx` given the parent center and the child half size.
fn child_center(parent: Point3, half: f32, idx: usize) -> Point3 {
    Point3::new(
        parent.x + if idx & 1 != 0 { half } else { -half },
        parent.y + if idx & 2 != 0 { half } else { -half },
        parent.z + if idx & 4 != 0 { half } else { -half },
    )
}

impl<T: VoxelValue> Octree<T> {
    /// Serialize the tree to a stream.
    pub fn write_to<W: Write>(&self, mut writer: W, options: &WriteOptions) -> Result<()> {
        if options.packed && !T::packed_support() {
            return Err(Error::Unsupported("packed map files for this tree type"));
        }

        let mut body = Vec::new();
        self.write_nodes(&mut body, &options.volume, options.packed, options.min_depth)?;
        let uncompressed_size = body.len();
        let body = if options.compress {
            lz4_flex::compress(&body)
        } else {
            body
        };

        writeln!(writer, "{}", FILE_MAGIC)?;
        writeln!(
            writer,
            "# (feel free to add / change comments, but leave the first line as it is!)"
        )?;
        writeln!(writer, "#")?;
        writeln!(writer, "version {}", FILE_VERSION)?;
        writeln!(writer, "id {}", T::TREE_TYPE)?;
        writeln!(writer, "binary {}", options.packed as u8)?;
        writeln!(writer, "resolution {}", self.resolution())?;
        writeln!(writer, "depth_levels {}", self.depth_levels())?;
        writeln!(writer, "occupancy_thres {}", self.occupancy_thres())?;
        writeln!(writer, "free_thres {}", self.free_thres())?;
        writeln!(writer, "compressed {}", options.compress as u8)?;
        writeln!(writer, "uncompressed_data_size {}", uncompressed_size)?;
        writeln!(writer, "data")?;
        writer.write_all(&body)?;

        log::debug!(
            "wrote map: {} nodes, {} body bytes{}",
            self.size(),
            uncompressed_size,
            if options.compress {
                format!(" ({} compressed)", body.len())
            } else {
                String::new()
            }
        );
        Ok(())
    }

    /// Deserialize a map file into this tree.
    ///
    /// The file's tree type must match [`tree_type`](Self::tree_type); the
    /// tree geometry is switched to the file's resolution and depth when
    /// they differ. On any failure the tree keeps its prior state.
    pub fn read_from<R: Read>(&mut self, reader: R) -> Result<()> {
        self.read_from_bounded(reader, &BoundingVolume::new())
    }

    /// Deserialize only the subtrees intersecting `volume`.
    ///
    /// The volume must be the same one the stream was written with (an empty
    /// volume for an unbounded stream): both sides skip non-intersecting
    /// payloads, so the framing only lines up when they agree.
    pub fn read_from_bounded<R: Read>(
        &mut self,
        reader: R,
        volume: &BoundingVolume,
    ) -> Result<()> {
        let mut reader = BufReader::new(reader);
        let header = parse_header(&mut reader, T::TREE_TYPE, T::packed_support())?;

        let snapshot = self.snapshot();
        match self.read_data(&mut reader, &header, volume) {
            Ok(()) => {
                log::debug!("read map: {} nodes", self.size());
                Ok(())
            }
            Err(err) => {
                self.restore(snapshot);
                Err(err)
            }
        }
    }

    /// Serialize to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P, options: &WriteOptions) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file), options)
    }

    /// Deserialize from a file path.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path)?;
        self.read_from(BufReader::new(file))
    }

    fn read_data<R: BufRead>(
        &mut self,
        reader: &mut R,
        header: &Header,
        volume: &BoundingVolume,
    ) -> Result<()> {
        if self.resolution() != header.resolution || self.depth_levels() != header.depth_levels {
            self.clear_with(header.resolution, header.depth_levels)
                .map_err(|e| Error::Format(e.to_string()))?;
        }
        let occupancy_thres_log = logit(header.occupancy_thres);
        let free_thres_log = logit(header.free_thres);

        if header.compressed {
            let mut compressed = Vec::new();
            reader.read_to_end(&mut compressed)?;
            let body = lz4_flex::decompress(&compressed, header.uncompressed_data_size)
                .map_err(|_| Error::Compression("decompression"))?;
            self.read_nodes(
                &mut body.as_slice(),
                volume,
                header.packed,
                occupancy_thres_log,
                free_thres_log,
            )
        } else {
            self.read_nodes(
                reader,
                volume,
                header.packed,
                occupancy_thres_log,
                free_thres_log,
            )
        }
    }

    fn write_value<W: Write>(&self, value: &T, writer: &mut W, packed: bool) -> Result<()> {
        if packed {
            value.write_packed(writer, self.occupancy_thres_log(), self.free_thres_log())
        } else {
            value.write_data(writer, self.occupancy_thres_log(), self.free_thres_log())
        }
    }

    fn read_value<R: Read>(
        &self,
        value: &mut T,
        reader: &mut R,
        packed: bool,
        occupancy_thres_log: f32,
        free_thres_log: f32,
    ) -> Result<()> {
        if packed {
            value.read_packed(reader, occupancy_thres_log, free_thres_log)
        } else {
            value.read_data(reader, occupancy_thres_log, free_thres_log)
        }
    }

    fn write_nodes<W: Write>(
        &self,
        writer: &mut W,
        volume: &BoundingVolume,
        packed: bool,
        min_depth: u32,
    ) -> Result<()> {
        let center = Point3::ZERO;
        let half_size = self.node_half_size(self.depth_levels());
        if !volume.is_empty() && !volume.intersects(&Aabb::cube(center, half_size)) {
            return Ok(());
        }

        let descend = !self.root.all_children_same && self.depth_levels() > min_depth;
        let bits: u8 = if descend { 0xFF } else { 0x00 };
        writer.write_all(&[bits])?;
        if descend {
            self.write_nodes_recurs(
                writer,
                volume,
                &self.root,
                center,
                self.depth_levels(),
                packed,
                min_depth,
            )
        } else {
            self.write_value(&self.root.value, writer, packed)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_nodes_recurs<W: Write>(
        &self,
        writer: &mut W,
        volume: &BoundingVolume,
        node: &InnerNode<T>,
        center: Point3,
        current_depth: u32,
        packed: bool,
        min_depth: u32,
    ) -> Result<()> {
        let child_depth = current_depth - 1;
        let child_half = self.node_half_size(child_depth);

        let Some(Children::Inner(children)) = node.children.as_deref() else {
            debug_assert!(false, "body writer entered a node without inner children");
            return Ok(());
        };

        let mut centers = [Point3::ZERO; 8];
        let mut intersects = [false; 8];
        let mut bits: u8 = 0;
        for i in 0..8 {
            centers[i] = child_center(center, child_half, i);
            intersects[i] =
                volume.is_empty() || volume.intersects(&Aabb::cube(centers[i], child_half));
            if intersects[i] && child_depth > min_depth && !children[i].all_children_same {
                bits |= 1 << i;
            }
        }
        writer.write_all(&[bits])?;

        for i in 0..8 {
            if !intersects[i] {
                continue;
            }
            let child = &children[i];
            if bits & (1 << i) != 0 {
                if child_depth == 1 {
                    // Eight leaf payloads, contiguous, no further bitmask
                    let Some(Children::Leaf(grandchildren)) = child.children.as_deref() else {
                        debug_assert!(false, "depth-1 node without leaf children");
                        continue;
                    };
                    let leaf_half = self.node_half_size(0);
                    for (j, grandchild) in grandchildren.iter().enumerate() {
                        if volume.is_empty()
                            || volume.intersects(&Aabb::cube(
                                child_center(centers[i], leaf_half, j),
                                leaf_half,
                            ))
                        {
                            self.write_value(grandchild, writer, packed)?;
                        }
                    }
                } else {
                    self.write_nodes_recurs(
                        writer,
                        volume,
                        child,
                        centers[i],
                        child_depth,
                        packed,
                        min_depth,
                    )?;
                }
            } else {
                self.write_value(&child.value, writer, packed)?;
            }
        }
        Ok(())
    }

    fn read_nodes<R: Read>(
        &mut self,
        reader: &mut R,
        volume: &BoundingVolume,
        packed: bool,
        occupancy_thres_log: f32,
        free_thres_log: f32,
    ) -> Result<()> {
        let center = Point3::ZERO;
        let half_size = self.node_half_size(self.depth_levels());
        if !volume.is_empty() && !volume.intersects(&Aabb::cube(center, half_size)) {
            return Ok(());
        }

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;

        let mut root = std::mem::take(&mut self.root);
        let depth = self.depth_levels();
        let result = if byte[0] == 0 {
            let result =
                self.read_value(&mut root.value, reader, packed, occupancy_thres_log, free_thres_log);
            if result.is_ok() {
                self.prune_node(&mut root, depth, false);
            }
            result
        } else {
            let result = self.read_nodes_recurs(
                reader,
                volume,
                &mut root,
                center,
                depth,
                packed,
                occupancy_thres_log,
                free_thres_log,
            );
            if result.is_ok() {
                self.summarize_node(&mut root, depth);
            }
            result
        };
        self.root = root;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn read_nodes_recurs<R: Read>(
        &mut self,
        reader: &mut R,
        volume: &BoundingVolume,
        node: &mut InnerNode<T>,
        center: Point3,
        current_depth: u32,
        packed: bool,
        occupancy_thres_log: f32,
        free_thres_log: f32,
    ) -> Result<()> {
        let child_depth = current_depth - 1;
        let child_half = self.node_half_size(child_depth);

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let bits = byte[0];

        let mut centers = [Point3::ZERO; 8];
        let mut intersects = [false; 8];
        for i in 0..8 {
            centers[i] = child_center(center, child_half, i);
            intersects[i] =
                volume.is_empty() || volume.intersects(&Aabb::cube(centers[i], child_half));
        }

        self.expand_node(node, current_depth);
        let Some(Children::Inner(children)) = node.children.as_deref_mut() else {
            return Err(Error::Format(
                "body does not match the tree structure".to_string(),
            ));
        };

        for i in 0..8 {
            if !intersects[i] {
                continue;
            }
            let child = &mut children[i];
            if bits & (1 << i) != 0 {
                if child_depth == 1 {
                    self.expand_node(child, child_depth);
                    let leaf_half = self.node_half_size(0);
                    let Some(Children::Leaf(grandchildren)) = child.children.as_deref_mut()
                    else {
                        return Err(Error::Format(
                            "body does not match the tree structure".to_string(),
                        ));
                    };
                    for (j, grandchild) in grandchildren.iter_mut().enumerate() {
                        if volume.is_empty()
                            || volume.intersects(&Aabb::cube(
                                child_center(centers[i], leaf_half, j),
                                leaf_half,
                            ))
                        {
                            self.read_value(
                                grandchild,
                                reader,
                                packed,
                                occupancy_thres_log,
                                free_thres_log,
                            )?;
                        }
                    }
                } else {
                    self.read_nodes_recurs(
                        reader,
                        volume,
                        child,
                        centers[i],
                        child_depth,
                        packed,
                        occupancy_thres_log,
                        free_thres_log,
                    )?;
                }
                self.summarize_node(child, child_depth);
            } else {
                self.read_value(
                    &mut child.value,
                    reader,
                    packed,
                    occupancy_thres_log,
                    free_thres_log,
                )?;
                self.prune_node(child, child_depth, false);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OctreeConfig;
    use crate::core::PointCloud;
    use crate::octree::OccupancyMap;

    fn test_tree() -> OccupancyMap {
        Octree::new(OctreeConfig::default()).unwrap()
    }

    fn small_map() -> OccupancyMap {
        let mut tree = test_tree();
        let cloud = PointCloud::from_points(&[
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.5),
            Point3::new(-0.7, -0.3, 0.2),
        ]);
        for _ in 0..4 {
            tree.insert_point_cloud(Point3::ZERO, &cloud, -1.0);
        }
        tree
    }

    fn assert_same_leaves(a: &OccupancyMap, b: &OccupancyMap) {
        assert_eq!(a.size(), b.size());
        for view in a.iter_tree(crate::octree::TraversalFilter::all()) {
            let other = b.get_node(view.code);
            assert_eq!(other.code, view.code, "node presence differs");
            assert_eq!(
                other.value.logit, view.value.logit,
                "logit differs at {:?}",
                view.code
            );
        }
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();

        let mut decoded = test_tree();
        decoded.read_from(buffer.as_slice()).unwrap();
        assert_same_leaves(&tree, &decoded);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let tree = small_map();
        let mut plain = Vec::new();
        tree.write_to(&mut plain, &WriteOptions::default()).unwrap();
        let mut compressed = Vec::new();
        tree.write_to(
            &mut compressed,
            &WriteOptions {
                compress: true,
                ..Default::default()
            },
        )
        .unwrap();

        let mut from_plain = test_tree();
        from_plain.read_from(plain.as_slice()).unwrap();
        let mut from_compressed = test_tree();
        from_compressed.read_from(compressed.as_slice()).unwrap();
        assert_same_leaves(&from_plain, &from_compressed);
    }

    #[test]
    fn test_empty_tree_roundtrip() {
        let tree = test_tree();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();

        let mut decoded = test_tree();
        decoded.read_from(buffer.as_slice()).unwrap();
        assert_eq!(decoded.size(), 1);
    }

    #[test]
    fn test_header_token_order_independent() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();

        // Reorder two header lines
        let text = String::from_utf8_lossy(&buffer).to_string();
        let data_pos = text.find("data\n").unwrap() + 5;
        let (head, body) = buffer.split_at(data_pos);
        let head = String::from_utf8(head.to_vec()).unwrap();
        let mut lines: Vec<&str> = head.lines().collect();
        let len = lines.len();
        lines.swap(3, len - 3);
        let mut reordered = lines.join("\n").into_bytes();
        reordered.push(b'\n');
        reordered.extend_from_slice(body);

        let mut decoded = test_tree();
        decoded.read_from(reordered.as_slice()).unwrap();
        assert_eq!(decoded.size(), tree.size());
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut tree = test_tree();
        let err = tree.read_from(&b"# some other file\ndata\n"[..]);
        assert!(matches!(err, Err(Error::Format(_))));
    }

    #[test]
    fn test_rejects_wrong_tree_type() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();
        let text = String::from_utf8_lossy(&buffer).replace("id occupancy_map", "id color_map");

        let mut decoded = test_tree();
        let err = decoded.read_from(text.as_bytes());
        assert!(matches!(err, Err(Error::Format(_))));
    }

    #[test]
    fn test_rejects_bad_values() {
        for (from, to) in [
            ("resolution 0.1", "resolution 0"),
            ("depth_levels 16", "depth_levels 0"),
            ("occupancy_thres 0.5", "occupancy_thres -1"),
            ("uncompressed_data_size", "uncompressed_data_size -5\njunk"),
        ] {
            let tree = small_map();
            let mut buffer = Vec::new();
            tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();
            let text = String::from_utf8_lossy(&buffer).replacen(from, to, 1);

            let mut decoded = test_tree();
            let err = decoded.read_from(text.as_bytes());
            assert!(matches!(err, Err(Error::Format(_))), "accepted {}", to);
        }
    }

    #[test]
    fn test_truncated_body_leaves_tree_unchanged() {
        let source = small_map();
        let mut buffer = Vec::new();
        source.write_to(&mut buffer, &WriteOptions::default()).unwrap();
        buffer.truncate(buffer.len() - 7);

        let mut tree = test_tree();
        tree.integrate_hit_at(Point3::new(0.35, 0.0, 0.0), 0);
        let size_before = tree.size();
        let logit_before = tree.get_node_at(Point3::new(0.35, 0.0, 0.0), 0).value.logit;

        assert!(tree.read_from(buffer.as_slice()).is_err());
        assert_eq!(tree.size(), size_before);
        let after = tree.get_node_at(Point3::new(0.35, 0.0, 0.0), 0);
        assert_eq!(after.value.logit, logit_before);
    }

    #[test]
    fn test_packed_write_unsupported() {
        let tree = small_map();
        let mut buffer = Vec::new();
        let err = tree.write_to(
            &mut buffer,
            &WriteOptions {
                packed: true,
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(Error::Unsupported(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_packed_read_unsupported() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();
        let text = String::from_utf8_lossy(&buffer).replacen("binary 0", "binary 1", 1);

        let mut decoded = test_tree();
        let err = decoded.read_from(text.as_bytes());
        assert!(matches!(err, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_geometry_switch_on_read() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();

        let mut decoded: OccupancyMap =
            Octree::new(OctreeConfig::with_resolution(0.25, 12)).unwrap();
        decoded.read_from(buffer.as_slice()).unwrap();
        assert_eq!(decoded.resolution(), 0.1);
        assert_eq!(decoded.depth_levels(), 16);
        assert_same_leaves(&tree, &decoded);
    }

    #[test]
    fn test_header_reports_body_size() {
        let tree = small_map();
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer, &WriteOptions::default()).unwrap();

        let text = String::from_utf8_lossy(&buffer).to_string();
        let reported: usize = text
            .lines()
            .find_map(|l| l.strip_prefix("uncompressed_data_size "))
            .unwrap()
            .parse()
            .unwrap();
        let body_start = text.find("data\n").unwrap() + 5;
        assert_eq!(buffer.len() - body_start, reported);
    }
}

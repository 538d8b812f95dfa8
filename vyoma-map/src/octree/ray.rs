//! Voxel traversal and ray casting.
//!
//! Rays are walked with the Amanatides–Woo algorithm ("A Fast Voxel
//! Traversal Algorithm for Ray Tracing"), generalized to an arbitrary tree
//! depth: stepping at depth `d` advances whole `2^d`-voxel cells. Before
//! traversal, rays are clipped against the active bounding box (or the
//! representable cube) with slab clipping.

use crate::core::{Code, Key, Point3};

use super::node::VoxelValue;
use super::tree::Octree;

/// Traversal state for one ray at a fixed depth.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RayState {
    pub current: Key,
    pub ending: Key,
    step: [i32; 3],
    t_delta: Point3,
    pub t_max: Point3,
}

/// Result of casting a ray against the map.
#[derive(Clone, Copy, Debug)]
pub struct CastResult {
    /// Center of the cell where the cast stopped
    pub end: Point3,
    /// True if the cast stopped on an occupied cell
    pub hit: bool,
}

impl<T: VoxelValue> Octree<T> {
    /// Set up traversal state for a clipped ray.
    ///
    /// `direction` must be the normalized direction from `origin` to `end`.
    pub(crate) fn ray_init(
        &self,
        origin: Point3,
        end: Point3,
        direction: Point3,
        depth: u32,
    ) -> RayState {
        let current = self.coord_to_key(origin, depth);
        let ending = self.coord_to_key(end, depth);
        let mut state = RayState {
            current,
            ending,
            step: [0; 3],
            t_delta: Point3::splat(f32::MAX),
            t_max: Point3::splat(f32::MAX),
        };
        if current == ending {
            return state;
        }

        let mut voxel_border = self.key_to_coord(&current);
        for i in 0..3 {
            state.step[i] = if direction[i] > 0.0 {
                1
            } else if direction[i] < 0.0 {
                -1
            } else {
                0
            };
            if state.step[i] != 0 {
                state.t_delta[i] = self.node_size(depth) / direction[i].abs();
                voxel_border[i] += state.step[i] as f32 * self.node_half_size(depth);
                state.t_max[i] = (voxel_border[i] - origin[i]) / direction[i];
            }
        }
        state
    }

    /// Advance the ray one cell along the axis with the nearest boundary.
    pub(crate) fn ray_step(&self, state: &mut RayState, depth: u32) {
        let dim = state.t_max.min_element_index();
        let stepped =
            state.current[dim] as i64 + ((state.step[dim] as i64) << depth);
        state.current[dim] = stepped as u32;
        state.t_max[dim] += state.t_delta[dim];
    }

    /// Keys of all cells a ray traverses from `origin` to `end` at `depth`,
    /// excluding the end cell.
    ///
    /// The segment is truncated to `max_range` (negative disables the limit)
    /// and clipped against the bounding box; a ray that misses the box
    /// produces no keys.
    pub fn compute_ray(
        &self,
        mut origin: Point3,
        mut end: Point3,
        max_range: f32,
        depth: u32,
    ) -> Vec<Key> {
        let mut ray = Vec::new();
        let direction = (end - origin).normalized();
        if 0.0 <= max_range && origin.distance(&end) > max_range {
            end = origin + direction * max_range;
        }
        if !self.move_line_into_bbx(&mut origin, &mut end) {
            return ray;
        }
        let distance = origin.distance(&end);

        let mut state = self.ray_init(origin, end, direction, depth);
        while state.current != state.ending && state.t_max.min_element() <= distance {
            ray.push(state.current);
            self.ray_step(&mut state, depth);
        }
        ray
    }

    /// Like [`compute_ray`](Self::compute_ray) but yields cell centers.
    pub fn compute_ray_coords(
        &self,
        origin: Point3,
        end: Point3,
        max_range: f32,
        depth: u32,
    ) -> Vec<Point3> {
        self.compute_ray(origin, end, max_range, depth)
            .iter()
            .map(|key| self.key_to_coord(key))
            .collect()
    }

    /// Cast a ray from `origin` along `direction` until it reaches an
    /// occupied cell, exhausts `max_range` (negative means the full map
    /// diagonal), leaves the bounding box, or, unless `ignore_unknown`,
    /// reaches an unknown cell.
    pub fn cast_ray(
        &self,
        mut origin: Point3,
        direction: Point3,
        ignore_unknown: bool,
        max_range: f32,
        depth: u32,
    ) -> CastResult {
        let max_range = if max_range < 0.0 {
            self.min_coord().distance(&self.max_coord())
        } else {
            max_range
        };
        let direction = direction.normalized();
        let mut end = origin + direction * max_range;

        if !self.move_line_into_bbx(&mut origin, &mut end) {
            return CastResult { end, hit: false };
        }

        let mut state = self.ray_init(origin, end, direction, depth);
        while state.current != state.ending
            && state.t_max.min_element() <= max_range
            && !self.is_occupied(Code::from_key(&state.current))
            && (ignore_unknown || !self.is_unknown(Code::from_key(&state.current)))
        {
            self.ray_step(&mut state, depth);
        }

        CastResult {
            end: self.key_to_coord(&state.current),
            hit: self.is_occupied(Code::from_key(&state.current)),
        }
    }

    /// Clip the segment `origin -> end` to the active bounding box (or the
    /// representable cube). Returns false when the segment misses the box
    /// entirely; otherwise both endpoints are moved inside.
    pub fn move_line_into_bbx(&self, origin: &mut Point3, end: &mut Point3) -> bool {
        let (bbx_min, bbx_max) = if self.is_bbx_limit_enabled() {
            (self.bbx_min(), self.bbx_max())
        } else {
            (self.min_coord(), self.max_coord())
        };
        move_line_into_box(bbx_min, bbx_max, origin, end)
    }
}

/// Intersection of the segment `p1 -> p2` with the plane where the signed
/// distances `d1` (at `p1`) and `d2` (at `p2`) cross zero.
fn plane_intersection(d1: f32, d2: f32, p1: &Point3, p2: &Point3) -> Option<Point3> {
    if d1 * d2 >= 0.0 {
        return None;
    }
    Some(*p1 + (*p2 - *p1) * (-d1 / (d2 - d1)))
}

/// Whether a face-plane hit lies on the box: the two off-axis components
/// must be strictly inside.
fn on_face(point: &Point3, axis: usize, bbx_min: &Point3, bbx_max: &Point3) -> bool {
    let (a, b) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    point[a] > bbx_min[a] && point[a] < bbx_max[a] && point[b] > bbx_min[b] && point[b] < bbx_max[b]
}

/// Slab clipping of a segment against an axis-aligned box.
fn move_line_into_box(
    bbx_min: Point3,
    bbx_max: Point3,
    origin: &mut Point3,
    end: &mut Point3,
) -> bool {
    // Both endpoints beyond the same face: no intersection possible
    for i in 0..3 {
        if (origin[i] < bbx_min[i] && end[i] < bbx_min[i])
            || (origin[i] > bbx_max[i] && end[i] > bbx_max[i])
        {
            return false;
        }
    }

    let inside = |p: &Point3| {
        (0..3).all(|i| p[i] >= bbx_min[i] && p[i] <= bbx_max[i])
    };

    let mut hits: [Point3; 2] = [Point3::ZERO; 2];
    let mut num_hits = 0;
    for i in 0..3 {
        if num_hits >= 2 {
            break;
        }
        if let Some(hit) =
            plane_intersection(origin[i] - bbx_min[i], end[i] - bbx_min[i], origin, end)
        {
            if on_face(&hit, i, &bbx_min, &bbx_max) {
                hits[num_hits] = hit;
                num_hits += 1;
            }
        }
    }
    for i in 0..3 {
        if num_hits >= 2 {
            break;
        }
        if let Some(hit) =
            plane_intersection(origin[i] - bbx_max[i], end[i] - bbx_max[i], origin, end)
        {
            if on_face(&hit, i, &bbx_min, &bbx_max) {
                hits[num_hits] = hit;
                num_hits += 1;
            }
        }
    }

    match num_hits {
        1 => {
            if inside(origin) {
                *end = hits[0];
            } else {
                *origin = hits[0];
            }
            true
        }
        2 => {
            // Assign the two hits so each endpoint moves as little as possible
            if (*origin - hits[0]).squared_norm() + (*end - hits[1]).squared_norm()
                <= (*origin - hits[1]).squared_norm() + (*end - hits[0]).squared_norm()
            {
                *origin = hits[0];
                *end = hits[1];
            } else {
                *origin = hits[1];
                *end = hits[0];
            }
            true
        }
        _ => true,
    }
}

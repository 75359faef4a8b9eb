//! landscape.rs — square heightmap terrain.
//!
//! The world is a `size x size` grid of node heights, `tile_size` world
//! units between nodes. Each tile splits into two triangles along the
//! `frac(x) + frac(y) = 1` diagonal; height and normal queries interpolate
//! over the triangle under the query point. The map is immutable once the
//! server is running; all queries are read-only.

use crate::math::{Vec3, EPS};
use anyhow::{ensure, Context, Result};

pub struct Landscape {
    size: usize,
    tile_size: usize,
    heights: Vec<f64>,
}

impl Landscape {
    /// Flat landscape of zero height.
    pub fn new(size: usize, tile_size: usize) -> Self {
        assert!(size > 0, "bad landscape size");
        assert!(tile_size > 0, "bad tile size");
        Self {
            size,
            tile_size,
            heights: vec![0.0; size * size],
        }
    }

    /// Loads a raw heightmap: a square file of one byte per node, row-major,
    /// node height = byte * `height_scale`.
    pub fn from_file(path: &str, tile_size: usize, height_scale: f64) -> Result<Self> {
        let raw = std::fs::read(path).with_context(|| format!("reading landscape {path}"))?;
        let size = (raw.len() as f64).sqrt() as usize;
        ensure!(
            size > 0 && size * size == raw.len(),
            "landscape file {path} is not square ({} bytes)",
            raw.len()
        );
        let mut l = Self::new(size, tile_size);
        for (h, b) in l.heights.iter_mut().zip(raw) {
            *h = height_scale * f64::from(b);
        }
        Ok(l)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// World extent along each horizontal axis; valid positions span
    /// `[0, extent]` inclusive.
    pub fn extent(&self) -> f64 {
        (self.size * self.tile_size) as f64
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.extent() && y <= self.extent()
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn height_at_node(&self, y: usize, x: usize) -> f64 {
        assert!(x < self.size && y < self.size, "node out of range");
        self.heights[y * self.size + x]
    }

    pub fn set_height_at_node(&mut self, y: usize, x: usize, h: f64) {
        assert!(x < self.size && y < self.size, "node out of range");
        self.heights[y * self.size + x] = h;
    }

    /// Node lookup with indices clamped to the last row/column, so height
    /// queries stay defined on the closed world boundary.
    fn node(&self, y: usize, x: usize) -> f64 {
        self.heights[y.min(self.size - 1) * self.size + x.min(self.size - 1)]
    }

    /// Tile containing `(x, y)`, clamped into the grid.
    pub fn tile_at(&self, x: f64, y: f64) -> (usize, usize) {
        let tx = ((x / self.tile_size as f64) as usize).min(self.size - 1);
        let ty = ((y / self.tile_size as f64) as usize).min(self.size - 1);
        (tx, ty)
    }

    /// Corners of the triangle under `(x, y)`, in node-grid units
    /// (one unit per tile edge) with node heights as z.
    fn triangle_at(&self, x: f64, y: f64) -> (Vec3, Vec3, Vec3) {
        debug_assert!(x >= 0.0 && y >= 0.0, "negative landscape query");
        let (tx, ty) = self.tile_at(x, y);

        let a = Vec3::new(
            (tx + 1) as f64,
            ty as f64,
            self.node(ty, tx + 1),
        );
        let b = Vec3::new(
            tx as f64,
            (ty + 1) as f64,
            self.node(ty + 1, tx),
        );

        let gx = x / self.tile_size as f64;
        let gy = y / self.tile_size as f64;
        let c = if gx.fract() + gy.fract() < 1.0 {
            Vec3::new(tx as f64, ty as f64, self.node(ty, tx))
        } else {
            Vec3::new((tx + 1) as f64, (ty + 1) as f64, self.node(ty + 1, tx + 1))
        };

        (a, b, c)
    }

    /// Interpolated surface height at a world position.
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        let (a, b, c) = self.triangle_at(x, y);
        let n = (b - a).cross(c - a);
        // The triangle legs are axis-aligned unit steps in grid space, so
        // the plane is never vertical.
        let gx = x / self.tile_size as f64;
        let gy = y / self.tile_size as f64;
        a.z - (n.x * (gx - a.x) + n.y * (gy - a.y)) / n.z
    }

    /// Surface normal at a world position, unit length, z >= 0.
    pub fn normal_at(&self, x: f64, y: f64) -> Vec3 {
        let (a, b, c) = self.triangle_at(x, y);
        let n = (b - a).cross(c - a).normalize();
        if n.z < 0.0 {
            -n
        } else {
            n
        }
    }

    /// First intersection of the segment `p0 -> p1` with the surface,
    /// as a parameter t in [0, 1], or `None` when the segment stays clear.
    ///
    /// The segment is subdivided at every tile-boundary and tile-diagonal
    /// crossing; between consecutive breakpoints both the segment z and the
    /// surface height under it are linear in t, so the first sign change of
    /// the clearance yields the exact crossing.
    pub fn ray_hit(&self, p0: Vec3, p1: Vec3) -> Option<f64> {
        let d = p1 - p0;
        let tile = self.tile_size as f64;

        let mut ts = vec![0.0, 1.0];
        collect_line_crossings(p0.x, d.x, tile, &mut ts);
        collect_line_crossings(p0.y, d.y, tile, &mut ts);
        // Diagonal planes x + y = k * tile.
        collect_line_crossings(p0.x + p0.y, d.x + d.y, tile, &mut ts);
        ts.sort_by(|a, b| a.total_cmp(b));
        ts.dedup_by(|a, b| (*a - *b).abs() <= EPS * EPS);

        let clearance = |t: f64| -> Option<f64> {
            let p = p0 + d * t;
            if !self.contains(p.x, p.y) {
                return None;
            }
            Some(p.z - self.height_at(p.x, p.y))
        };

        for w in ts.windows(2) {
            let (t0, t1) = (w[0], w[1]);
            // Evaluate just inside the sub-segment so the triangle choice is
            // unambiguous at breakpoints.
            let mid = (t0 + t1) / 2.0;
            if clearance(mid).is_none() {
                continue;
            }
            let (Some(c0), Some(c1)) = (clearance(t0), clearance(t1)) else {
                continue;
            };
            if c0 < 0.0 {
                return Some(t0);
            }
            if c1 < 0.0 {
                let t = t0 + (t1 - t0) * c0 / (c0 - c1);
                return Some(t.clamp(0.0, 1.0));
            }
        }

        None
    }
}

/// Pushes every t in (0, 1) where `start + t * delta` crosses a multiple
/// of `step`.
fn collect_line_crossings(start: f64, delta: f64, step: f64, ts: &mut Vec<f64>) {
    if delta.abs() <= f64::EPSILON {
        return;
    }
    let end = start + delta;
    let (lo, hi) = if start < end { (start, end) } else { (end, start) };
    let mut k = (lo / step).ceil();
    while k * step <= hi {
        let t = (k * step - start) / delta;
        if t > 0.0 && t < 1.0 {
            ts.push(t);
        }
        k += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tolerance_eq;

    fn slope_2x4() -> Landscape {
        // Two nodes per side, 4 units per tile, height rising along x.
        let mut l = Landscape::new(2, 4);
        l.set_height_at_node(0, 0, 0.1);
        l.set_height_at_node(0, 1, 0.2);
        l.set_height_at_node(1, 0, 0.1);
        l.set_height_at_node(1, 1, 0.2);
        l
    }

    #[test]
    fn height_matches_nodes_and_interpolates() {
        let l = slope_2x4();
        assert!(tolerance_eq(l.height_at(0.0, 0.0), 0.1));
        assert!(tolerance_eq(l.height_at(0.0, 4.0 - EPS), 0.1));
        assert!(tolerance_eq(l.height_at(4.0 - EPS, 0.0), 0.2));
        assert!(tolerance_eq(l.height_at(4.0 - EPS, 4.0 - EPS), 0.2));
        assert!(tolerance_eq(l.height_at(2.0 - EPS, 0.0), 0.15));
    }

    #[test]
    fn height_is_defined_on_the_closed_boundary() {
        let l = slope_2x4();
        let e = l.extent();
        assert!(l.contains(0.0, 0.0));
        assert!(l.contains(e, e));
        // Far-edge queries clamp to the last node row/column.
        assert!(tolerance_eq(l.height_at(e, e), 0.2));
        assert!(tolerance_eq(l.height_at(e, 0.0), 0.2));
    }

    #[test]
    fn normal_of_uniform_slope() {
        let mut l = Landscape::new(2, 4);
        l.set_height_at_node(0, 1, 1.0);
        l.set_height_at_node(1, 1, 1.0);
        let expected = Vec3::new(-1.0, 0.0, 1.0).normalize();
        assert!(l.normal_at(0.5, 0.5).tolerance_eq(expected));
        assert!(l.normal_at(0.0, 0.0).tolerance_eq(expected));
    }

    #[test]
    fn normal_points_up_on_flat_ground() {
        let l = Landscape::new(4, 16);
        let n = l.normal_at(10.0, 20.0);
        assert!(n.tolerance_eq(Vec3::UP));
    }

    #[test]
    fn ray_hits_flat_ground_mid_segment() {
        let l = Landscape::new(4, 16);
        let p0 = Vec3::new(8.0, 8.0, 2.0);
        let p1 = Vec3::new(40.0, 8.0, -2.0);
        let t = l.ray_hit(p0, p1).expect("must hit");
        // Crosses z = 0 exactly halfway.
        assert!(tolerance_eq(t, 0.5));
    }

    #[test]
    fn ray_above_ground_misses() {
        let l = Landscape::new(4, 16);
        let p0 = Vec3::new(0.0, 0.0, 5.0);
        let p1 = Vec3::new(60.0, 60.0, 1.0);
        assert_eq!(l.ray_hit(p0, p1), None);
    }

    #[test]
    fn ray_starting_below_hits_immediately() {
        let mut l = Landscape::new(4, 16);
        for y in 0..4 {
            for x in 0..4 {
                l.set_height_at_node(y, x, 10.0);
            }
        }
        let p0 = Vec3::new(8.0, 8.0, 1.0);
        let p1 = Vec3::new(9.0, 8.0, 0.5);
        assert_eq!(l.ray_hit(p0, p1), Some(0.0));
    }

    #[test]
    fn ray_hits_rising_ridge_in_later_tile() {
        // Flat first tiles, then a ridge the segment runs into.
        let mut l = Landscape::new(4, 16);
        l.set_height_at_node(0, 3, 50.0);
        l.set_height_at_node(1, 3, 50.0);
        l.set_height_at_node(2, 3, 50.0);
        l.set_height_at_node(3, 3, 50.0);
        let p0 = Vec3::new(1.0, 17.0, 5.0);
        let p1 = Vec3::new(47.0, 17.0, 5.0);
        let t = l.ray_hit(p0, p1).expect("ridge hit");
        let hit = p0 + (p1 - p0) * t;
        // Impact must be on the rising slope past x = 32.
        assert!(hit.x > 32.0 && hit.x < 47.0);
        assert!(tolerance_eq(hit.z, l.height_at(hit.x, hit.y)));
    }

    #[test]
    fn loads_square_raw_file() {
        let dir = std::env::temp_dir().join("ironclad-landscape-test");
        std::fs::create_dir_all(&dir).expect("tmp dir");
        let path = dir.join("land.dat");
        std::fs::write(&path, [1u8, 2, 3, 4]).expect("write");
        let l = Landscape::from_file(path.to_str().expect("utf8"), 16, 0.5)
            .expect("load");
        assert_eq!(l.size(), 2);
        assert!(tolerance_eq(l.height_at_node(0, 1), 1.0));
        assert!(tolerance_eq(l.height_at_node(1, 1), 2.0));

        std::fs::write(&path, [1u8, 2, 3]).expect("write");
        assert!(Landscape::from_file(path.to_str().expect("utf8"), 16, 1.0).is_err());
    }
}

//! bounding.rs — collision volumes and intersection tests.
//!
//! A volume is a box, a sphere, or a flat composite of those leaves. Volumes
//! never alias their owner: every query takes the owner's moving [`Frame`]
//! explicitly, and a leaf only stores its shape plus an offset expressed in
//! that frame. Pairwise tests project both volumes onto the three world axes
//! and report separation on any axis; projections cover both the previous
//! and current origin, so a fast mover cannot tunnel through a tick.
//!
//! Resolution is symmetric: both owners revert to their previous origin,
//! which the integration step saves before every move.

use crate::landscape::Landscape;
use crate::math::Vec3;

/// A moving reference frame, copied out of the owning entity while its lock
/// is held. `direction` (forward) and `orientation` (up) are unit vectors;
/// `previous_origin` is the origin as of the start of the current tick.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub origin: Vec3,
    pub previous_origin: Vec3,
    pub direction: Vec3,
    pub orientation: Vec3,
}

impl Frame {
    /// The frame's side axis. Falls back to a canonical orthogonal when
    /// direction and orientation are (degenerately) parallel.
    fn side(&self) -> Vec3 {
        if self.orientation.tolerance_eq(self.direction) {
            self.direction.orthogonal().normalize()
        } else {
            self.orientation.cross(self.direction).normalize()
        }
    }

    /// Resolves a frame-local offset to a world position, based on either
    /// the current or the previous origin.
    fn effective_position(&self, offset: Vec3, current: bool) -> Vec3 {
        let base = if current {
            self.origin
        } else {
            self.previous_origin
        };
        base + self.direction * offset.x + self.side() * offset.y + self.orientation * offset.z
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Half-extents along the frame's forward / side / up axes.
    Box { extent: Vec3 },
    Sphere { radius: f64 },
}

/// One collision primitive, positioned relative to its owner's frame.
#[derive(Debug, Clone, Copy)]
pub struct Bounding {
    pub offset: Vec3,
    pub shape: Shape,
}

/// A leaf or a flat sequence of leaves. Nested composites are not needed:
/// every entity here is a handful of primitives around one frame.
#[derive(Debug, Clone)]
pub enum Volume {
    Leaf(Bounding),
    Composite(Vec<Bounding>),
}

impl Volume {
    pub fn sphere(radius: f64) -> Self {
        Volume::Leaf(Bounding {
            offset: Vec3::ZERO,
            shape: Shape::Sphere { radius },
        })
    }

    fn leaves(&self) -> &[Bounding] {
        match self {
            Volume::Leaf(b) => std::slice::from_ref(b),
            Volume::Composite(children) => children,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn coord(self, v: Vec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// The 8 box corners at either the previous or current origin.
fn box_vertices(b: &Bounding, extent: Vec3, frame: &Frame, current: bool) -> [Vec3; 8] {
    let p = frame.effective_position(b.offset, current);
    let e = [
        frame.direction * extent.x,
        frame.side() * extent.y,
        frame.orientation * extent.z,
    ];

    let mut vertices = [Vec3::ZERO; 8];
    for (i, v) in vertices.iter_mut().enumerate() {
        let mut corner = p;
        for (j, axis) in e.iter().enumerate() {
            corner = if i & (1 << j) != 0 {
                corner + *axis
            } else {
                corner - *axis
            };
        }
        *v = corner;
    }
    vertices
}

/// Interval covered by a leaf on a world axis, swept over the tick
/// (previous origin to current origin).
fn project(b: &Bounding, frame: &Frame, axis: Axis) -> (f64, f64) {
    match b.shape {
        Shape::Box { extent } => {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for current in [false, true] {
                for v in box_vertices(b, extent, frame, current) {
                    let c = axis.coord(v);
                    lo = lo.min(c);
                    hi = hi.max(c);
                }
            }
            (lo, hi)
        }
        Shape::Sphere { radius } => {
            let c1 = axis.coord(frame.effective_position(b.offset, false));
            let c2 = axis.coord(frame.effective_position(b.offset, true));
            (c1.min(c2) - radius, c1.max(c2) + radius)
        }
    }
}

fn projections_intersect(a: (f64, f64), b: (f64, f64)) -> bool {
    !(a.1 <= b.0 || b.1 <= a.0)
}

fn leaves_intersect(a: &Bounding, fa: &Frame, b: &Bounding, fb: &Frame) -> bool {
    Axis::ALL
        .iter()
        .all(|&axis| projections_intersect(project(a, fa, axis), project(b, fb, axis)))
}

/// Pairwise intersection test. Composites test every leaf pair.
pub fn intersects(a: &Volume, fa: &Frame, b: &Volume, fb: &Frame) -> bool {
    a.leaves()
        .iter()
        .any(|la| b.leaves().iter().any(|lb| leaves_intersect(la, fa, lb, fb)))
}

/// Volume-vs-terrain test at the current origin.
pub fn intersects_landscape(l: &Landscape, v: &Volume, frame: &Frame) -> bool {
    v.leaves().iter().any(|b| leaf_touches_landscape(l, b, frame))
}

fn leaf_touches_landscape(l: &Landscape, b: &Bounding, frame: &Frame) -> bool {
    let p = frame.effective_position(b.offset, true);
    match b.shape {
        Shape::Box { extent } => {
            let lowest = box_vertices(b, extent, frame, true)
                .iter()
                .map(|v| v.z)
                .fold(f64::INFINITY, f64::min);
            terrain_height(l, p) >= lowest
        }
        Shape::Sphere { radius } => terrain_height(l, p) >= p.z - radius,
    }
}

/// Terrain height with the query clamped into the world extent; a volume
/// poking past the boundary reads the nearest in-world column.
fn terrain_height(l: &Landscape, p: Vec3) -> f64 {
    l.height_at(p.x.clamp(0.0, l.extent()), p.y.clamp(0.0, l.extent()))
}

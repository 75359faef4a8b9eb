//! math.rs — 3-D vector and matrix kernel.
//!
//! Everything downstream (landscape queries, collision projection, tank and
//! shell kinematics) is built on these two types. Rotation goes through the
//! Rodrigues matrix so a single code path serves hull yaw, turret slew and
//! terrain-following re-orientation.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Tolerance used for all approximate float comparisons.
pub const EPS: f64 = 1e-5;

/// Returns true when two scalars are equal within [`EPS`].
pub fn tolerance_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS
}

/// 3D vector in world frame (x east, y north, z up), world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    /// World up axis, the default hull orientation.
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };
    /// World x axis, the default hull forward direction.
    pub const FORWARD: Vec3 = Vec3 {
        x: 1.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Scales to unit length. Normalizing a zero vector is a programmer
    /// error; callers clamp their inputs before reaching here.
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        debug_assert!(len > 0.0, "normalizing a zero-length vector");
        self * (1.0 / len)
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).length()
    }

    /// Reflects about a unit normal.
    pub fn reflect(self, normal: Vec3) -> Vec3 {
        self - normal * (2.0 * self.dot(normal))
    }

    /// Angle between two vectors, in [0, pi].
    pub fn angle_to(self, other: Vec3) -> f64 {
        let c = self.dot(other) / (self.length() * other.length());
        c.clamp(-1.0, 1.0).acos()
    }

    /// Rotates about a unit axis by `angle` radians (right-handed).
    pub fn rotate(self, axis: Vec3, angle: f64) -> Vec3 {
        Mat3::rotation(axis, angle) * self
    }

    /// Component-wise equality within [`EPS`].
    pub fn tolerance_eq(self, other: Vec3) -> bool {
        tolerance_eq(self.x, other.x)
            && tolerance_eq(self.y, other.y)
            && tolerance_eq(self.z, other.z)
    }

    /// Any vector orthogonal to `self`. Used as a fallback side axis when a
    /// frame's direction and orientation are parallel.
    pub fn orthogonal(self) -> Vec3 {
        let candidate = if self.x.abs() <= self.y.abs().min(self.z.abs()) {
            Vec3::FORWARD
        } else if self.y.abs() <= self.z.abs() {
            Vec3::new(0.0, 1.0, 0.0)
        } else {
            Vec3::UP
        };
        self.cross(candidate)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// Row-major 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub m: [[f64; 3]; 3],
}

impl Mat3 {
    /// Rodrigues rotation matrix about the unit `axis` by `angle` radians.
    pub fn rotation(axis: Vec3, angle: f64) -> Mat3 {
        let (x, y, z) = (axis.x, axis.y, axis.z);
        let c = angle.cos();
        let s = angle.sin();
        let t = 1.0 - c;
        Mat3 {
            m: [
                [c + t * x * x, t * x * y - s * z, t * x * z + s * y],
                [t * y * x + s * z, c + t * y * y, t * y * z - s * x],
                [t * z * x - s * y, t * z * y + s * x, c + t * z * z],
            ],
        }
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m[0][0] * v.x + self.m[0][1] * v.y + self.m[0][2] * v.z,
            self.m[1][0] * v.x + self.m[1][1] * v.y + self.m[1][2] * v.z,
            self.m[2][0] * v.x + self.m[2][1] * v.y + self.m[2][2] * v.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn basic_arithmetic() {
        let a = Vec3::new(1.0, 1.0, 1.0);
        let b = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(a + b, Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(a - b, Vec3::new(0.0, -1.0, -2.0));
        assert_eq!(a.dot(b), 6.0);
        assert_eq!(b * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert!(tolerance_eq(a.length(), 3.0f64.sqrt()));
        assert!(tolerance_eq(a.normalize().length(), 1.0));
        assert!(tolerance_eq(a.distance(b), 5.0f64.sqrt()));
    }

    #[test]
    fn cross_is_orthogonal() {
        let a = Vec3::new(1.0, 1.0, 1.0);
        let b = Vec3::new(1.0, 2.0, 3.0);
        let c = a.cross(b);
        assert!(tolerance_eq(a.dot(c), 0.0));
        assert!(tolerance_eq(b.dot(c), 0.0));
    }

    #[test]
    fn reflect_about_normal() {
        let v = Vec3::new(-1.0, -1.0, 0.0);
        let n = Vec3::new(0.0, 1.0, 0.0);
        let r = v.reflect(n);
        assert!(tolerance_eq(r.x, -1.0));
        assert!(tolerance_eq(r.y, 1.0));
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = Vec3::FORWARD.rotate(Vec3::UP, FRAC_PI_2);
        assert!(v.tolerance_eq(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn rotation_preserves_length() {
        let v = Vec3::new(3.0, -2.0, 5.0);
        for &angle in &[0.1, 1.0, PI, 2.0 * PI, -0.7] {
            let axis = Vec3::new(1.0, 2.0, -1.0).normalize();
            let r = v.rotate(axis, angle);
            assert!((r.length() - v.length()).abs() <= 10.0 * EPS);
        }
    }

    #[test]
    fn angle_between_axes() {
        assert!(tolerance_eq(Vec3::FORWARD.angle_to(Vec3::UP), FRAC_PI_2));
        assert!(tolerance_eq(Vec3::FORWARD.angle_to(Vec3::FORWARD), 0.0));
    }

    #[test]
    fn orthogonal_fallback() {
        for v in [Vec3::FORWARD, Vec3::UP, Vec3::new(1.0, 1.0, 1.0)] {
            let o = v.orthogonal();
            assert!(o.length() > 0.0);
            assert!(tolerance_eq(v.dot(o), 0.0));
        }
    }
}

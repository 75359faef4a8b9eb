//! shell.rs — shell ballistics.
//!
//! A shell is a point mass with a tiny collision sphere. Each tick it gains
//! per-tick gravity, advances, and tests the swept segment against the
//! terrain; the segment test makes high closing speeds safe against tunneling
//! through a ridge.

use std::net::SocketAddr;

use crate::bounding::{Frame, Volume};
use crate::landscape::Landscape;
use crate::math::Vec3;

pub const SHELL_DEFAULT_SPEED: f64 = 768.0;
pub const SHELL_RADIUS: f64 = 0.1;
/// Per-tick gravity applied to the velocity's z component.
pub const SHELL_G_ACCELERATION: f64 = 0.5;
/// Damage applied to a tank whose volume intersects the impact point.
pub const SHELL_HIT_AMOUNT: i32 = 50;
/// Damage applied to every tank inside the explosion radius.
pub const SHELL_EXPLOSION_DAMAGE: i32 = 1000;
pub const SHELL_EXPLOSION_RADIUS: f64 = 20.0;

/// Result of one flight step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShellOutcome {
    Flying,
    /// Terrain impact; position has been snapped to the intersection point.
    Hit(Vec3),
    /// Left the world bounds; the shell vanishes silently.
    Gone,
}

#[derive(Debug, Clone)]
pub struct Shell {
    pub position: Vec3,
    pub previous_position: Vec3,
    pub direction: Vec3,
    pub speed: f64,
    /// Endpoint of the tank that fired, for damage attribution.
    pub shooter: SocketAddr,
    /// Cleared once the tick loop has pushed the launch notifications.
    pub announced: bool,
}

impl Shell {
    pub fn new(position: Vec3, direction: Vec3, shooter: SocketAddr) -> Self {
        Self {
            position,
            previous_position: position,
            direction,
            speed: SHELL_DEFAULT_SPEED,
            shooter,
            announced: false,
        }
    }

    pub fn volume() -> Volume {
        Volume::sphere(SHELL_RADIUS)
    }

    pub fn frame(&self) -> Frame {
        Frame {
            origin: self.position,
            previous_origin: self.previous_position,
            direction: self.direction,
            orientation: self.direction,
        }
    }

    /// One ballistic step: integrate gravity, advance, re-derive direction
    /// and scalar speed from the actual displacement, then test the swept
    /// segment against the terrain.
    pub fn tick(&mut self, l: &Landscape) -> ShellOutcome {
        self.previous_position = self.position;

        let mut velocity = self.direction * self.speed;
        velocity.z -= SHELL_G_ACCELERATION;

        self.position = self.position + velocity;
        self.direction = (self.position - self.previous_position).normalize();
        self.speed = self.direction.dot(velocity);

        match l.ray_hit(self.previous_position, self.position) {
            Some(t) => {
                self.position =
                    self.previous_position + (self.position - self.previous_position) * t;
                ShellOutcome::Hit(self.position)
            }
            None => {
                if l.contains(self.position.x, self.position.y) {
                    ShellOutcome::Flying
                } else {
                    ShellOutcome::Gone
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tolerance_eq;

    fn shooter_addr() -> SocketAddr {
        "127.0.0.1:9999".parse().expect("addr")
    }

    #[test]
    fn gravity_bends_the_trajectory() {
        let l = Landscape::new(64, 16);
        let mut s = Shell::new(
            Vec3::new(8.0, 8.0, 500.0),
            Vec3::new(1.0, 0.0, 0.0),
            shooter_addr(),
        );
        // Slow the shell down so it stays inside the 1024-unit world.
        s.speed = 100.0;

        assert_eq!(s.tick(&l), ShellOutcome::Flying);
        assert!(tolerance_eq(s.position.x, 108.0));
        assert!(tolerance_eq(s.position.z, 499.5));
        assert!(s.direction.z < 0.0);
        // Speed is re-derived from the actual displacement.
        assert!(s.speed > 99.0 && s.speed < 101.0);
    }

    #[test]
    fn shell_stays_above_ground_while_flying() {
        let l = Landscape::new(64, 16);
        let mut s = Shell::new(
            Vec3::new(8.0, 8.0, 300.0),
            Vec3::new(1.0, 0.0, 0.0),
            shooter_addr(),
        );
        s.speed = 50.0;
        loop {
            match s.tick(&l) {
                ShellOutcome::Flying => {
                    assert!(s.position.z > l.height_at(s.position.x, s.position.y));
                }
                ShellOutcome::Hit(p) => {
                    assert!(tolerance_eq(p.z, l.height_at(p.x, p.y)));
                    break;
                }
                ShellOutcome::Gone => break,
            }
        }
    }

    #[test]
    fn impact_snaps_to_the_surface() {
        let l = Landscape::new(64, 16);
        let mut s = Shell::new(
            Vec3::new(100.0, 100.0, 10.0),
            Vec3::new(0.0, 0.0, -1.0),
            shooter_addr(),
        );
        s.speed = 100.0;
        match s.tick(&l) {
            ShellOutcome::Hit(p) => {
                assert!(tolerance_eq(p.z, 0.0));
                assert!(tolerance_eq(p.x, 100.0));
                assert!(tolerance_eq(p.y, 100.0));
            }
            other => panic!("expected a hit, got {other:?}"),
        }
    }

    #[test]
    fn leaving_the_world_destroys_the_shell() {
        let l = Landscape::new(4, 16);
        let mut s = Shell::new(
            Vec3::new(32.0, 32.0, 50.0),
            Vec3::new(1.0, 0.0, 0.0),
            shooter_addr(),
        );
        // 768 units per tick blows straight past the 64-unit extent.
        assert_eq!(s.tick(&l), ShellOutcome::Gone);
    }
}

//! tank.rs — tank state and per-tick kinematics.
//!
//! A tank is a frame (position + forward + up) riding the landscape surface,
//! plus rate-limited control targets: engine power converges by 5 per tick,
//! yaw by pi/12 per tick, the turret by pi/6 per tick. Commands only store
//! targets; all convergence happens inside [`Tank::tick`] so the dispatcher
//! and the simulation loop never race on intermediate state.

use std::f64::consts::PI;

use crate::bounding::{Bounding, Frame, Shape, Volume};
use crate::landscape::Landscape;
use crate::math::{Vec3, EPS};

pub const TANK_HP: i32 = 100;
pub const TANK_MIN_ENGINE_POWER: i32 = -10;
pub const TANK_MAX_ENGINE_POWER: i32 = 100;
pub const TANK_ENGINE_POWER_CHANGE_STEP: i32 = 5;
pub const TANK_ENGINE_POWER_TO_SPEED: f64 = 0.5;
pub const TANK_MIN_LOOK_Z: f64 = -PI / 12.0;
pub const TANK_MAX_LOOK_Z: f64 = PI / 4.0;
pub const TANK_MAX_TURN_SPEED: f64 = PI / 12.0;
pub const TANK_MAX_TURRET_TURN_SPEED: f64 = PI / 6.0;
pub const TANK_FIRE_DELAY: u32 = 300;
pub const TANK_BOX_EXTENT: Vec3 = Vec3 {
    x: 10.0,
    y: 6.0,
    z: 2.0,
};
pub const TANK_SPHERE_RADIUS: f64 = 3.75;

/// Lifetime combat counters backing the statistics query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TankStats {
    pub ticks_alive: u64,
    pub direct_hits: u64,
    pub hits: u64,
    pub got_direct_hits: u64,
    pub got_hits: u64,
}

/// Result of one integration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Moved,
    /// The move left the world; position was reverted.
    HitBound,
}

#[derive(Debug, Clone)]
pub struct Tank {
    pub position: Vec3,
    pub previous_position: Vec3,
    /// Hull forward axis, unit, tangent to the surface.
    pub direction: Vec3,
    /// Hull up axis, unit: the surface normal under the tank.
    pub orientation: Vec3,
    pub speed: f64,
    pub hp: i32,
    pub team: u8,
    pub engine_power: i32,
    pub engine_power_target: i32,
    /// Ticks until the gun may fire again; 0 means ready.
    pub fire_delay: u32,
    pub turret_direction: Vec3,
    pub turret_direction_target: Vec3,
    /// Pending yaw in radians, consumed by up to pi/12 per tick.
    pub turn_angle_target: f64,
    pub stats: TankStats,
}

impl Default for Tank {
    /// The pre-spawn state: everything zeroed, notably hp. Commands against
    /// an unplaced tank therefore answer the same way as against a dead one.
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            previous_position: Vec3::ZERO,
            direction: Vec3::FORWARD,
            orientation: Vec3::UP,
            speed: 0.0,
            hp: 0,
            team: 0,
            engine_power: 0,
            engine_power_target: 0,
            fire_delay: 0,
            turret_direction: Vec3::FORWARD,
            turret_direction_target: Vec3::FORWARD,
            turn_angle_target: 0.0,
            stats: TankStats::default(),
        }
    }
}

/// The tank's composite collision volume: hull box plus turret sphere
/// sitting on top of it.
pub fn tank_volume() -> Volume {
    Volume::Composite(vec![
        Bounding {
            offset: Vec3::ZERO,
            shape: Shape::Box {
                extent: TANK_BOX_EXTENT,
            },
        },
        Bounding {
            offset: Vec3::new(0.0, 0.0, TANK_SPHERE_RADIUS),
            shape: Shape::Sphere {
                radius: TANK_SPHERE_RADIUS,
            },
        },
    ])
}

impl Tank {
    /// Places the tank at a surface position with the given up vector,
    /// restoring full combat state.
    pub fn initialize(&mut self, position: Vec3, top: Vec3, team: u8) {
        *self = Tank {
            position,
            previous_position: position,
            direction: Vec3::FORWARD,
            orientation: top,
            hp: TANK_HP,
            team,
            ..Tank::default()
        };

        // Tilt the default forward axis out of the horizontal plane so it
        // is tangent to the surface.
        if !Vec3::UP.tolerance_eq(top) {
            let axis = Vec3::UP.cross(top).normalize();
            let angle = top.angle_to(Vec3::UP);
            self.direction = self.direction.rotate(axis, angle);
        }
    }

    pub fn alive(&self) -> bool {
        self.hp > 0
    }

    pub fn frame(&self) -> Frame {
        Frame {
            origin: self.position,
            previous_origin: self.previous_position,
            direction: self.direction,
            orientation: self.orientation,
        }
    }

    /// One simulation step. Callers hold the tank's lock.
    pub fn tick(&mut self, l: &Landscape) -> TickOutcome {
        self.change_engine_power();
        let outcome = self.advance(l);
        self.change_turn();
        self.rotate_turret();
        if self.fire_delay > 0 {
            self.fire_delay -= 1;
        }
        self.stats.ticks_alive += 1;
        outcome
    }

    fn change_engine_power(&mut self) {
        let diff = self.engine_power_target - self.engine_power;
        if diff == 0 {
            return;
        }
        if diff.abs() <= TANK_ENGINE_POWER_CHANGE_STEP {
            self.engine_power = self.engine_power_target;
        } else {
            self.engine_power += TANK_ENGINE_POWER_CHANGE_STEP * diff.signum();
        }
    }

    fn advance(&mut self, l: &Landscape) -> TickOutcome {
        self.previous_position = self.position;

        if self.engine_power == 0 {
            // Brakes held.
            self.speed = 0.0;
            return TickOutcome::Moved;
        }

        self.speed = TANK_ENGINE_POWER_TO_SPEED * f64::from(self.engine_power);
        let next = self.previous_position + self.direction * self.speed;

        if !l.contains(next.x, next.y) {
            self.position = self.previous_position;
            return TickOutcome::HitBound;
        }

        self.position = Vec3::new(next.x, next.y, l.height_at(next.x, next.y));

        let old_orientation = self.orientation;
        self.orientation = l.normal_at(self.position.x, self.position.y);
        if !old_orientation.tolerance_eq(self.orientation) {
            let axis = old_orientation.cross(self.orientation).normalize();
            let angle = self.orientation.angle_to(old_orientation);
            self.direction = self.direction.rotate(axis, angle);
        }

        TickOutcome::Moved
    }

    fn change_turn(&mut self) {
        if self.turn_angle_target.abs() <= EPS {
            return;
        }

        let step = if self.turn_angle_target.abs() <= TANK_MAX_TURN_SPEED {
            std::mem::replace(&mut self.turn_angle_target, 0.0)
        } else {
            let step = TANK_MAX_TURN_SPEED * self.turn_angle_target.signum();
            self.turn_angle_target -= step;
            step
        };

        self.direction = self.direction.rotate(self.orientation, step);
    }

    fn rotate_turret(&mut self) {
        if self.turret_direction_target.tolerance_eq(self.turret_direction) {
            return;
        }

        let angle = self.turret_direction.angle_to(self.turret_direction_target);
        if angle <= TANK_MAX_TURRET_TURN_SPEED {
            self.turret_direction = self.turret_direction_target;
            return;
        }

        let cross = self.turret_direction.cross(self.turret_direction_target);
        let axis = if cross.length() <= EPS {
            // Target is dead astern; any plane through the turret axis works.
            self.turret_direction.orthogonal().normalize()
        } else {
            cross.normalize()
        };
        self.turret_direction = self
            .turret_direction
            .rotate(axis, TANK_MAX_TURRET_TURN_SPEED);
    }

    // ── Command surface (called by packet executors) ─────────────────────────

    pub fn set_engine_power(&mut self, power: i32) {
        self.engine_power_target = power.clamp(TANK_MIN_ENGINE_POWER, TANK_MAX_ENGINE_POWER);
    }

    pub fn turn(&mut self, turn_angle: f64) {
        self.turn_angle_target = turn_angle.clamp(-PI, PI);
    }

    /// Aims the turret. Pitch is clamped into [`TANK_MIN_LOOK_Z`,
    /// `TANK_MAX_LOOK_Z`] by rescaling the horizontal component, keeping the
    /// target unit length without pushing the pitch back out of range.
    pub fn look_at(&mut self, look: Vec3) {
        let target = look.normalize();
        let z = target.z.clamp(TANK_MIN_LOOK_Z, TANK_MAX_LOOK_Z);
        let horizontal = (1.0 - z * z).sqrt();

        let h_len = (target.x * target.x + target.y * target.y).sqrt();
        let (hx, hy) = if h_len > EPS {
            (target.x / h_len, target.y / h_len)
        } else {
            // Straight up or down: keep the current azimuth. The pitch
            // invariant keeps the turret's own horizontal part non-zero.
            let t = self.turret_direction;
            let t_len = (t.x * t.x + t.y * t.y).sqrt();
            (t.x / t_len, t.y / t_len)
        };

        self.turret_direction_target = Vec3::new(hx * horizontal, hy * horizontal, z);
    }

    /// Fires if the gun is ready, returning the muzzle point and shell
    /// direction and arming the reload countdown.
    pub fn shoot(&mut self) -> Option<(Vec3, Vec3)> {
        if self.fire_delay > 0 {
            return None;
        }
        self.fire_delay = TANK_FIRE_DELAY;
        let muzzle = self.position + self.turret_direction * TANK_BOX_EXTENT.x;
        Some((muzzle, self.turret_direction))
    }

    /// Compass heading of the hull in [0, 2*pi).
    pub fn heading(&self) -> f64 {
        let h = self.direction.y.atan2(self.direction.x);
        if h < 0.0 {
            h + 2.0 * PI
        } else {
            h
        }
    }

    /// Applies damage, clamping at zero. Returns true when this damage
    /// killed the tank.
    pub fn apply_damage(&mut self, amount: i32) -> bool {
        if !self.alive() {
            return false;
        }
        self.hp = (self.hp - amount).max(0);
        self.hp == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tolerance_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_6};

    fn flat_world() -> Landscape {
        Landscape::new(8, 16)
    }

    fn placed_tank(l: &Landscape) -> Tank {
        let mut t = Tank::default();
        let top = l.normal_at(40.0, 40.0);
        t.initialize(Vec3::new(40.0, 40.0, l.height_at(40.0, 40.0)), top, 1);
        t
    }

    #[test]
    fn engine_power_converges_in_steps() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.set_engine_power(20);

        let mut powers = Vec::new();
        for _ in 0..4 {
            t.tick(&l);
            powers.push(t.engine_power);
        }
        assert_eq!(powers, vec![5, 10, 15, 20]);

        // 0.5 * (5 + 10 + 15 + 20) world units along +x.
        assert!(tolerance_eq(t.position.x - 40.0, 25.0));
        assert!(tolerance_eq(t.position.y, 40.0));
    }

    #[test]
    fn engine_power_is_clamped() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.set_engine_power(127);
        assert_eq!(t.engine_power_target, TANK_MAX_ENGINE_POWER);
        t.set_engine_power(-100);
        assert_eq!(t.engine_power_target, TANK_MIN_ENGINE_POWER);

        // Reaching the target exactly takes ceil(|p - p0| / 5) ticks.
        t.set_engine_power(-10);
        t.tick(&l);
        t.tick(&l);
        assert_eq!(t.engine_power, -10);
    }

    #[test]
    fn zero_power_holds_position() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        let start = t.position;
        t.tick(&l);
        assert!(t.position.tolerance_eq(start));
        assert_eq!(t.speed, 0.0);
    }

    #[test]
    fn driving_off_the_edge_reverts() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.position = Vec3::new(2.0, 40.0, 0.0);
        t.previous_position = t.position;
        t.direction = Vec3::new(-1.0, 0.0, 0.0);
        t.set_engine_power(100);
        t.engine_power = 100;

        let outcome = t.tick(&l);
        assert_eq!(outcome, TickOutcome::HitBound);
        assert!(t.position.tolerance_eq(Vec3::new(2.0, 40.0, 0.0)));
    }

    #[test]
    fn corner_positions_are_in_bounds() {
        let l = flat_world();
        assert!(l.contains(0.0, 0.0));
        assert!(l.contains(l.extent(), l.extent()));
        assert!(!l.contains(-EPS * 2.0, 0.0));
        assert!(!l.contains(0.0, l.extent() + EPS * 2.0));
    }

    #[test]
    fn turn_consumes_target_across_ticks() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.turn(FRAC_PI_6);

        t.tick(&l);
        assert!(tolerance_eq(t.turn_angle_target, FRAC_PI_6 - TANK_MAX_TURN_SPEED));
        let after_one = t.heading();
        assert!(tolerance_eq(after_one, TANK_MAX_TURN_SPEED));

        t.tick(&l);
        assert!(tolerance_eq(t.turn_angle_target, 0.0));
        assert!(tolerance_eq(t.heading(), FRAC_PI_6));
    }

    #[test]
    fn second_turn_overwrites_the_first() {
        let l = flat_world();
        let mut a = placed_tank(&l);
        let mut b = placed_tank(&l);

        a.turn(FRAC_PI_6);
        a.turn(FRAC_PI_6);
        b.turn(FRAC_PI_6);
        for _ in 0..4 {
            a.tick(&l);
            b.tick(&l);
        }
        assert!(tolerance_eq(a.heading(), b.heading()));
    }

    #[test]
    fn negative_turn_rotates_the_other_way() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.turn(-FRAC_PI_6);
        t.tick(&l);
        t.tick(&l);
        assert!(tolerance_eq(t.heading(), 2.0 * PI - FRAC_PI_6));
    }

    #[test]
    fn turret_snaps_within_one_step() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.look_at(Vec3::new(0.9, 0.2, 0.0));
        t.tick(&l);
        assert!(t.turret_direction.tolerance_eq(t.turret_direction_target));
    }

    #[test]
    fn turret_slews_large_angles() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.look_at(Vec3::new(-1.0, 0.1, 0.0));
        let target = t.turret_direction_target;

        t.tick(&l);
        // First step moves exactly pi/6 toward the target.
        assert!(tolerance_eq(
            t.turret_direction.angle_to(Vec3::FORWARD),
            TANK_MAX_TURRET_TURN_SPEED
        ));
        for _ in 0..20 {
            t.tick(&l);
        }
        assert!(t.turret_direction.tolerance_eq(target));
    }

    #[test]
    fn look_at_clamps_pitch() {
        let l = flat_world();
        let mut t = placed_tank(&l);

        // Straight up clamps to the maximum pitch, keeping the azimuth.
        t.look_at(Vec3::new(0.0, 0.0, 1.0));
        assert!(tolerance_eq(t.turret_direction_target.z, TANK_MAX_LOOK_Z));
        assert!(tolerance_eq(t.turret_direction_target.length(), 1.0));
        assert!(t.turret_direction_target.x > 0.0);

        t.look_at(Vec3::new(0.1, 0.0, -1.0));
        assert!(tolerance_eq(t.turret_direction_target.z, TANK_MIN_LOOK_Z));
        assert!(tolerance_eq(t.turret_direction_target.length(), 1.0));

        // An in-range pitch passes through unchanged.
        t.look_at(Vec3::new(1.0, 0.0, 0.1));
        let expected = Vec3::new(1.0, 0.0, 0.1).normalize();
        assert!(t.turret_direction_target.tolerance_eq(expected));
    }

    #[test]
    fn shoot_arms_the_reload_countdown() {
        let l = flat_world();
        let mut t = placed_tank(&l);

        let shot = t.shoot().expect("gun ready");
        assert_eq!(t.fire_delay, TANK_FIRE_DELAY);
        assert!(shot.1.tolerance_eq(t.turret_direction));
        assert!(t.shoot().is_none());

        for expected in (0..TANK_FIRE_DELAY).rev() {
            t.tick(&l);
            assert_eq!(t.fire_delay, expected);
        }
        assert!(t.shoot().is_some());
    }

    #[test]
    fn heading_round_trips_through_direction() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        for angle in [0.0f64, 1.0, 2.5, 4.0, 6.0] {
            t.direction = Vec3::new(angle.cos(), angle.sin(), 0.0);
            let h = t.heading();
            assert!((0.0..2.0 * PI).contains(&h));
            let back = Vec3::new(h.cos(), h.sin(), 0.0);
            assert!(back.tolerance_eq(t.direction));
        }
    }

    #[test]
    fn initialize_tilts_direction_onto_slope() {
        let mut l = Landscape::new(2, 4);
        l.set_height_at_node(0, 1, 1.0);
        l.set_height_at_node(1, 1, 1.0);
        let top = l.normal_at(1.0, 1.0);

        let mut t = Tank::default();
        t.initialize(Vec3::new(1.0, 1.0, l.height_at(1.0, 1.0)), top, 0);
        assert!(tolerance_eq(t.direction.length(), 1.0));
        // Forward must be tangent to the slope: orthogonal to its normal.
        assert!(tolerance_eq(t.direction.dot(top), 0.0));
        assert_eq!(t.hp, TANK_HP);
    }

    #[test]
    fn damage_clamps_and_reports_death_once() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        assert!(!t.apply_damage(50));
        assert_eq!(t.hp, 50);
        assert!(t.apply_damage(1000));
        assert_eq!(t.hp, 0);
        assert!(!t.apply_damage(50));
    }

    #[test]
    fn surface_following_keeps_z_snapped() {
        let mut l = Landscape::new(8, 16);
        for y in 0..8 {
            for x in 0..8 {
                l.set_height_at_node(y, x, (x as f64) * 2.0);
            }
        }
        let top = l.normal_at(30.0, 30.0);
        let mut t = Tank::default();
        t.initialize(Vec3::new(30.0, 30.0, l.height_at(30.0, 30.0)), top, 0);
        t.set_engine_power(40);

        for _ in 0..3 {
            t.tick(&l);
            assert!(tolerance_eq(
                t.position.z,
                l.height_at(t.position.x, t.position.y)
            ));
            // Orientation tracks the surface normal under the new position.
            assert!(t
                .orientation
                .tolerance_eq(l.normal_at(t.position.x, t.position.y)));
        }
    }

    #[test]
    fn rotate_quarter_frame() {
        let l = flat_world();
        let mut t = placed_tank(&l);
        t.turn(FRAC_PI_2);
        for _ in 0..10 {
            t.tick(&l);
        }
        assert!(tolerance_eq(t.heading(), FRAC_PI_2));
    }
}

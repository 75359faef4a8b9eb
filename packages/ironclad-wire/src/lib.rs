//! # ironclad-wire
//!
//! Shared UDP packet structures for the Ironclad tank combat protocol.
//!
//! These types are used by:
//! - `ironclad-server`: parsing requests and building replies/notifications
//! - client implementations: building requests and parsing replies
//!
//! ## Wire conventions
//!
//! - Every datagram starts with a one-byte packet id; the rest is the body.
//! - Bodies are tightly packed, little-endian. `size`-typed fields are u64.
//! - A datagram never exceeds [`MAX_DATAGRAM`] bytes.
//! - Single-byte acks echo the request id; errors use the 0xf0 range.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Hard upper bound on datagram size, both directions.
pub const MAX_DATAGRAM: usize = 32_768;

/// Default server listen port.
pub const DEFAULT_PORT: u16 = 9000;

/// Side length, in tiles, of the local map window a tank can observe.
/// Also bounds the range of the relative tank query (0x32).
pub const TANK_OBSERVING_RANGE: usize = 32;

// ── Packet ids ────────────────────────────────────────────────────────────────

/// Client and viewer request ids. Acks echo the same byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Request {
    // Connecting.
    Hello = 0x00,
    Bye = 0x01,
    ViewerHello = 0x03,
    ViewerBye = 0x04,

    // Tank control.
    SetEnginePower = 0x10,
    Turn = 0x11,
    LookAt = 0x12,
    Shoot = 0x13,

    // Tank telemetry.
    GetHeading = 0x20,
    GetSpeed = 0x21,
    GetHp = 0x22,
    GetStatistics = 0x23,

    // Observing.
    GetMap = 0x30,
    GetNormal = 0x31,
    GetTanks = 0x32,

    // Viewing.
    ViewerGetMap = 0x40,
    ViewerGetTanks = 0x41,
}

impl Request {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::Hello,
            0x01 => Self::Bye,
            0x03 => Self::ViewerHello,
            0x04 => Self::ViewerBye,
            0x10 => Self::SetEnginePower,
            0x11 => Self::Turn,
            0x12 => Self::LookAt,
            0x13 => Self::Shoot,
            0x20 => Self::GetHeading,
            0x21 => Self::GetSpeed,
            0x22 => Self::GetHp,
            0x23 => Self::GetStatistics,
            0x30 => Self::GetMap,
            0x31 => Self::GetNormal,
            0x32 => Self::GetTanks,
            0x40 => Self::ViewerGetMap,
            0x41 => Self::ViewerGetTanks,
            _ => return None,
        })
    }
}

/// Single-byte error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Response {
    BadRequest = 0xf0,
    TooManyClients = 0xf3,
    /// The sender already has a request in flight.
    Wait = 0xf4,
    /// Shoot refused: the gun is still reloading.
    WaitShoot = 0xf5,
    /// Command refused: the tank is dead (or not yet placed into the world).
    Dead = 0xf6,
}

/// Out-of-band notifications pushed by the simulation loop.
/// Client notifications are a single byte; viewer shell events carry a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Notification {
    HitBound = 0x80,
    TankCollision = 0x81,
    NearShoot = 0x82,
    Death = 0x83,
    Win = 0x84,
    Hit = 0x85,
    NearExplosion = 0x86,
    ExplosionDamage = 0x87,
    ViewerShoot = 0x88,
    ViewerExplosion = 0x89,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("packet body is {got} bytes, expected {expected}")]
    BadLength { expected: usize, got: usize },
    #[error("unknown packet id 0x{0:02x}")]
    UnknownId(u8),
    #[error("truncated packet")]
    Truncated,
}

fn expect_len(body: &[u8], expected: usize) -> Result<(), WireError> {
    if body.len() == expected {
        Ok(())
    } else {
        Err(WireError::BadLength {
            expected,
            got: body.len(),
        })
    }
}

// ── Request bodies ────────────────────────────────────────────────────────────

/// 0x10 — target engine power, clamped server-side into [-10, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReqSetEnginePower {
    pub engine_power: i8,
}

impl ReqSetEnginePower {
    pub const BODY_LEN: usize = 1;

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::BODY_LEN)?;
        Ok(Self {
            engine_power: body[0] as i8,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![Request::SetEnginePower as u8, self.engine_power as u8]
    }
}

/// 0x11 — pending yaw in radians, valid range [-pi, pi].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReqTurn {
    pub turn_angle: f64,
}

impl ReqTurn {
    pub const BODY_LEN: usize = 8;

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::BODY_LEN)?;
        Ok(Self {
            turn_angle: body.get_f64_le(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + Self::BODY_LEN);
        buf.put_u8(Request::Turn as u8);
        buf.put_f64_le(self.turn_angle);
        buf
    }
}

/// 0x12 — turret look direction; each component in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReqLookAt {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ReqLookAt {
    pub const BODY_LEN: usize = 24;

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::BODY_LEN)?;
        Ok(Self {
            x: body.get_f64_le(),
            y: body.get_f64_le(),
            z: body.get_f64_le(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + Self::BODY_LEN);
        buf.put_u8(Request::LookAt as u8);
        buf.put_f64_le(self.x);
        buf.put_f64_le(self.y);
        buf.put_f64_le(self.z);
        buf
    }
}

// ── Reply bodies ──────────────────────────────────────────────────────────────

/// 0x20 — heading in radians, [0, 2*pi).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResGetHeading {
    pub heading: f64,
}

impl ResGetHeading {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.put_u8(Request::GetHeading as u8);
        buf.put_f64_le(self.heading);
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 8)?;
        Ok(Self {
            heading: body.get_f64_le(),
        })
    }
}

/// 0x21 — current linear speed in world units per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResGetSpeed {
    pub speed: f64,
}

impl ResGetSpeed {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.put_u8(Request::GetSpeed as u8);
        buf.put_f64_le(self.speed);
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 8)?;
        Ok(Self {
            speed: body.get_f64_le(),
        })
    }
}

/// 0x22 — remaining hit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResGetHp {
    pub hp: u8,
}

impl ResGetHp {
    pub fn encode(&self) -> Vec<u8> {
        vec![Request::GetHp as u8, self.hp]
    }

    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 1)?;
        Ok(Self { hp: body[0] })
    }
}

/// 0x23 — lifetime combat statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResGetStatistics {
    pub ticks_alive: u64,
    pub hp: u64,
    pub direct_hits: u64,
    pub hits: u64,
    pub got_direct_hits: u64,
    pub got_hits: u64,
}

impl ResGetStatistics {
    pub const BODY_LEN: usize = 48;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + Self::BODY_LEN);
        buf.put_u8(Request::GetStatistics as u8);
        buf.put_u64_le(self.ticks_alive);
        buf.put_u64_le(self.hp);
        buf.put_u64_le(self.direct_hits);
        buf.put_u64_le(self.hits);
        buf.put_u64_le(self.got_direct_hits);
        buf.put_u64_le(self.got_hits);
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::BODY_LEN)?;
        Ok(Self {
            ticks_alive: body.get_u64_le(),
            hp: body.get_u64_le(),
            direct_hits: body.get_u64_le(),
            hits: body.get_u64_le(),
            got_direct_hits: body.get_u64_le(),
            got_hits: body.get_u64_le(),
        })
    }
}

/// 0x31 — surface normal under the tank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResGetNormal {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ResGetNormal {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(25);
        buf.put_u8(Request::GetNormal as u8);
        buf.put_f64_le(self.x);
        buf.put_f64_le(self.y);
        buf.put_f64_le(self.z);
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 24)?;
        Ok(Self {
            x: body.get_f64_le(),
            y: body.get_f64_le(),
            z: body.get_f64_le(),
        })
    }
}

/// One tank in a 0x32 / 0x41 reply.
///
/// Positions are relative to the observer for 0x32 and absolute for 0x41;
/// every other field is absolute in both.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TankRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub direction_x: f64,
    pub direction_y: f64,
    pub direction_z: f64,
    pub orientation_x: f64,
    pub orientation_y: f64,
    pub orientation_z: f64,
    pub turret_x: f64,
    pub turret_y: f64,
    pub turret_z: f64,
    pub target_turret_x: f64,
    pub target_turret_y: f64,
    pub target_turret_z: f64,
    pub target_turn: f64,
    pub speed: f64,
    pub team: u8,
    pub hp: u8,
}

impl TankRecord {
    /// 17 doubles plus team and hp bytes.
    pub const WIRE_LEN: usize = 17 * 8 + 2;

    fn put(&self, buf: &mut Vec<u8>) {
        for v in [
            self.x,
            self.y,
            self.z,
            self.direction_x,
            self.direction_y,
            self.direction_z,
            self.orientation_x,
            self.orientation_y,
            self.orientation_z,
            self.turret_x,
            self.turret_y,
            self.turret_z,
            self.target_turret_x,
            self.target_turret_y,
            self.target_turret_z,
            self.target_turn,
            self.speed,
        ] {
            buf.put_f64_le(v);
        }
        buf.put_u8(self.team);
        buf.put_u8(self.hp);
    }

    fn get(body: &mut &[u8]) -> Self {
        let mut d = [0.0f64; 17];
        for v in &mut d {
            *v = body.get_f64_le();
        }
        Self {
            x: d[0],
            y: d[1],
            z: d[2],
            direction_x: d[3],
            direction_y: d[4],
            direction_z: d[5],
            orientation_x: d[6],
            orientation_y: d[7],
            orientation_z: d[8],
            turret_x: d[9],
            turret_y: d[10],
            turret_z: d[11],
            target_turret_x: d[12],
            target_turret_y: d[13],
            target_turret_z: d[14],
            target_turn: d[15],
            speed: d[16],
            team: body.get_u8(),
            hp: body.get_u8(),
        }
    }
}

/// 0x32 / 0x41 — tank list. The id distinguishes the two queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ResGetTanks {
    pub id: Request,
    pub tanks: Vec<TankRecord>,
}

impl ResGetTanks {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.tanks.len() * TankRecord::WIRE_LEN);
        buf.put_u8(self.id as u8);
        buf.put_u8(self.tanks.len() as u8);
        for t in &self.tanks {
            t.put(&mut buf);
        }
        buf
    }

    pub fn decode(id: Request, mut body: &[u8]) -> Result<Self, WireError> {
        if body.is_empty() {
            return Err(WireError::Truncated);
        }
        let count = body.get_u8() as usize;
        expect_len(body, count * TankRecord::WIRE_LEN).map_err(|_| WireError::Truncated)?;
        let tanks = (0..count).map(|_| TankRecord::get(&mut body)).collect();
        Ok(Self { id, tanks })
    }
}

/// 0x30 — local height window, `TANK_OBSERVING_RANGE` squared doubles,
/// row-major, centered on the observer's tile. Out-of-range cells are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ResGetMap {
    pub window: Vec<f64>,
}

impl ResGetMap {
    pub const CELLS: usize = TANK_OBSERVING_RANGE * TANK_OBSERVING_RANGE;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + Self::CELLS * 8);
        buf.put_u8(Request::GetMap as u8);
        for &h in &self.window {
            buf.put_f64_le(h);
        }
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::CELLS * 8)?;
        let window = (0..Self::CELLS).map(|_| body.get_f64_le()).collect();
        Ok(Self { window })
    }
}

/// 0x40 — the full heightmap, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ResViewerGetMap {
    pub landscape_size: u64,
    pub tile_size: u64,
    pub heights: Vec<f64>,
}

impl ResViewerGetMap {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(17 + self.heights.len() * 8);
        buf.put_u8(Request::ViewerGetMap as u8);
        buf.put_u64_le(self.landscape_size);
        buf.put_u64_le(self.tile_size);
        for &h in &self.heights {
            buf.put_f64_le(h);
        }
        buf
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, WireError> {
        if body.len() < 16 {
            return Err(WireError::Truncated);
        }
        let landscape_size = body.get_u64_le();
        let tile_size = body.get_u64_le();
        let cells = (landscape_size * landscape_size) as usize;
        expect_len(body, cells * 8).map_err(|_| WireError::Truncated)?;
        let heights = (0..cells).map(|_| body.get_f64_le()).collect();
        Ok(Self {
            landscape_size,
            tile_size,
            heights,
        })
    }
}

/// 0x88 / 0x89 — shell event pushed to viewers, carrying the world point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotViewerShellEvent {
    pub id: Notification,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl NotViewerShellEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(25);
        buf.put_u8(self.id as u8);
        buf.put_f64_le(self.x);
        buf.put_f64_le(self.y);
        buf.put_f64_le(self.z);
        buf
    }

    pub fn decode(id: Notification, mut body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 24)?;
        Ok(Self {
            id,
            x: body.get_f64_le(),
            y: body.get_f64_le(),
            z: body.get_f64_le(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

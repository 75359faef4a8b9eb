//! handlers.rs — packet executors.
//!
//! Executors run on the worker task only. Contract: produce at most one
//! reply to the sender, touch tank state only under the tank's lock, and
//! never block on the network (sends go through the shared non-blocking-ish
//! UDP responder). The worker clears the session's request slot after each
//! executor returns.

use std::sync::Arc;

use ironclad_wire::{
    ReqLookAt, ReqSetEnginePower, ReqTurn, Request, ResGetHeading, ResGetHp, ResGetMap,
    ResGetNormal, ResGetSpeed, ResGetStatistics, ResGetTanks, ResViewerGetMap, Response,
    TankRecord, TANK_OBSERVING_RANGE,
};
use tracing::{debug, info};

use crate::math::Vec3;
use crate::server::World;
use crate::session::{ClientSession, Session, SessionState, ViewerSession};
use crate::shell::Shell;
use crate::tank::Tank;

pub async fn execute_client(world: &Arc<World>, c: &Arc<ClientSession>, data: &[u8]) {
    let Some(req) = Request::from_u8(data[0]) else {
        return;
    };
    let body = &data[1..];

    match req {
        Request::Hello => hello(world, c).await,
        Request::Bye => bye(world, c).await,
        Request::SetEnginePower => set_engine_power(world, c, body).await,
        Request::Turn => turn(world, c, body).await,
        Request::LookAt => look_at(world, c, body).await,
        Request::Shoot => shoot(world, c).await,
        Request::GetHeading => get_heading(world, c).await,
        Request::GetSpeed => get_speed(world, c).await,
        Request::GetHp => get_hp(world, c).await,
        Request::GetStatistics => get_statistics(world, c).await,
        Request::GetMap => get_map(world, c).await,
        Request::GetNormal => get_normal(world, c).await,
        Request::GetTanks => get_tanks(world, c).await,
        // Viewer ids never reach a client session; classification bounces them.
        _ => {}
    }
}

pub async fn execute_viewer(world: &Arc<World>, v: &Arc<ViewerSession>, data: &[u8]) {
    let Some(req) = Request::from_u8(data[0]) else {
        return;
    };

    match req {
        Request::ViewerHello => viewer_hello(world, v).await,
        Request::ViewerBye => viewer_bye(world, v).await,
        Request::ViewerGetMap => viewer_get_map(world, v).await,
        Request::ViewerGetTanks => viewer_get_tanks(world, v).await,
        _ => {}
    }
}

// ── Connecting ────────────────────────────────────────────────────────────────

async fn hello(world: &Arc<World>, c: &Arc<ClientSession>) {
    if c.state() == SessionState::Connected {
        c.set_state(SessionState::Acknowledged);
        debug!("client {} acknowledged", c.addr);
    }
    world.responder.send_id(c.addr, Request::Hello as u8).await;
}

async fn bye(world: &Arc<World>, c: &Arc<ClientSession>) {
    world.clients.unregister(c.addr).await;
    world.responder.send_id(c.addr, Request::Bye as u8).await;
    info!("client {} disconnected", c.addr);
}

async fn viewer_hello(world: &Arc<World>, v: &Arc<ViewerSession>) {
    if v.state() == SessionState::Connected {
        v.set_state(SessionState::Acknowledged);
        debug!("viewer {} acknowledged", v.addr);
    }
    world
        .responder
        .send_id(v.addr, Request::ViewerHello as u8)
        .await;
}

async fn viewer_bye(world: &Arc<World>, v: &Arc<ViewerSession>) {
    world.viewers.unregister(v.addr).await;
    world
        .responder
        .send_id(v.addr, Request::ViewerBye as u8)
        .await;
    info!("viewer {} disconnected", v.addr);
}

// ── Tank control ──────────────────────────────────────────────────────────────

async fn set_engine_power(world: &Arc<World>, c: &Arc<ClientSession>, body: &[u8]) {
    let Ok(packet) = ReqSetEnginePower::decode(body) else {
        return;
    };
    let mut tank = c.tank.lock().await;
    if !tank.alive() {
        drop(tank);
        world.responder.send_id(c.addr, Response::Dead as u8).await;
        return;
    }
    tank.set_engine_power(i32::from(packet.engine_power));
    drop(tank);
    world
        .responder
        .send_id(c.addr, Request::SetEnginePower as u8)
        .await;
}

async fn turn(world: &Arc<World>, c: &Arc<ClientSession>, body: &[u8]) {
    let Ok(packet) = ReqTurn::decode(body) else {
        return;
    };
    let mut tank = c.tank.lock().await;
    if !tank.alive() {
        drop(tank);
        world.responder.send_id(c.addr, Response::Dead as u8).await;
        return;
    }
    tank.turn(packet.turn_angle);
    drop(tank);
    world.responder.send_id(c.addr, Request::Turn as u8).await;
}

async fn look_at(world: &Arc<World>, c: &Arc<ClientSession>, body: &[u8]) {
    let Ok(packet) = ReqLookAt::decode(body) else {
        return;
    };
    let mut tank = c.tank.lock().await;
    if !tank.alive() {
        drop(tank);
        world.responder.send_id(c.addr, Response::Dead as u8).await;
        return;
    }
    tank.look_at(Vec3::new(packet.x, packet.y, packet.z));
    drop(tank);
    world.responder.send_id(c.addr, Request::LookAt as u8).await;
}

async fn shoot(world: &Arc<World>, c: &Arc<ClientSession>) {
    let mut tank = c.tank.lock().await;
    if !tank.alive() {
        drop(tank);
        world.responder.send_id(c.addr, Response::Dead as u8).await;
        return;
    }
    let shot = tank.shoot();
    drop(tank);

    match shot {
        Some((muzzle, direction)) => {
            world
                .shells
                .lock()
                .await
                .push(Shell::new(muzzle, direction, c.addr));
            debug!("client {} fired from {muzzle:?}", c.addr);
            world.responder.send_id(c.addr, Request::Shoot as u8).await;
        }
        None => {
            world
                .responder
                .send_id(c.addr, Response::WaitShoot as u8)
                .await;
        }
    }
}

// ── Tank telemetry ────────────────────────────────────────────────────────────

/// Copies the tank out if it is alive, otherwise answers `Dead`.
/// A session that has not been placed yet has a zeroed tank and therefore
/// answers `Dead` as well.
async fn live_tank_snapshot(world: &Arc<World>, c: &Arc<ClientSession>) -> Option<Tank> {
    let tank = c.tank.lock().await;
    if tank.alive() {
        Some(tank.clone())
    } else {
        drop(tank);
        world.responder.send_id(c.addr, Response::Dead as u8).await;
        None
    }
}

async fn get_heading(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };
    let reply = ResGetHeading {
        heading: tank.heading(),
    };
    world.responder.send(c.addr, &reply.encode()).await;
}

async fn get_speed(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };
    let reply = ResGetSpeed { speed: tank.speed };
    world.responder.send(c.addr, &reply.encode()).await;
}

async fn get_hp(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };
    let reply = ResGetHp { hp: tank.hp as u8 };
    world.responder.send(c.addr, &reply.encode()).await;
}

async fn get_statistics(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };
    let reply = ResGetStatistics {
        ticks_alive: tank.stats.ticks_alive,
        hp: tank.hp as u64,
        direct_hits: tank.stats.direct_hits,
        hits: tank.stats.hits,
        got_direct_hits: tank.stats.got_direct_hits,
        got_hits: tank.stats.got_hits,
    };
    world.responder.send(c.addr, &reply.encode()).await;
}

// ── Observing ─────────────────────────────────────────────────────────────────

async fn get_map(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };

    let l = &world.landscape;
    let (tile_x, tile_y) = l.tile_at(tank.position.x, tank.position.y);
    let range = TANK_OBSERVING_RANGE;
    let half = (range / 2) as isize;

    let mut window = vec![0.0; range * range];
    for i in 0..range {
        for j in 0..range {
            let node_y = tile_y as isize + i as isize - half;
            let node_x = tile_x as isize + j as isize - half;
            if node_y < 0
                || node_x < 0
                || node_y >= l.size() as isize
                || node_x >= l.size() as isize
            {
                continue;
            }
            window[i * range + j] = l.height_at_node(node_y as usize, node_x as usize);
        }
    }

    let reply = ResGetMap { window };
    world.responder.send(c.addr, &reply.encode()).await;
}

async fn get_normal(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(tank) = live_tank_snapshot(world, c).await else {
        return;
    };
    let n = world
        .landscape
        .normal_at(tank.position.x, tank.position.y);
    let reply = ResGetNormal {
        x: n.x,
        y: n.y,
        z: n.z,
    };
    world.responder.send(c.addr, &reply.encode()).await;
}

fn tank_record(tank: &Tank, position: Vec3) -> TankRecord {
    TankRecord {
        x: position.x,
        y: position.y,
        z: position.z,
        direction_x: tank.direction.x,
        direction_y: tank.direction.y,
        direction_z: tank.direction.z,
        orientation_x: tank.orientation.x,
        orientation_y: tank.orientation.y,
        orientation_z: tank.orientation.z,
        turret_x: tank.turret_direction.x,
        turret_y: tank.turret_direction.y,
        turret_z: tank.turret_direction.z,
        target_turret_x: tank.turret_direction_target.x,
        target_turret_y: tank.turret_direction_target.y,
        target_turret_z: tank.turret_direction_target.z,
        target_turn: tank.turn_angle_target,
        speed: tank.speed,
        team: tank.team,
        hp: tank.hp.clamp(0, u8::MAX as i32) as u8,
    }
}

async fn get_tanks(world: &Arc<World>, c: &Arc<ClientSession>) {
    let Some(own) = live_tank_snapshot(world, c).await else {
        return;
    };
    let observing_range = (TANK_OBSERVING_RANGE * world.landscape.tile_size()) as f64;

    let mut records = Vec::new();
    for other in world.clients.snapshot().await {
        if other.addr == c.addr || other.state() != SessionState::InGame {
            continue;
        }
        let tank = other.tank.lock().await;
        if own.position.distance(tank.position) > observing_range {
            continue;
        }
        records.push(tank_record(&tank, tank.position - own.position));
    }

    let reply = ResGetTanks {
        id: Request::GetTanks,
        tanks: records,
    };
    world.responder.send(c.addr, &reply.encode()).await;
}

// ── Viewing ───────────────────────────────────────────────────────────────────

async fn viewer_get_map(world: &Arc<World>, v: &Arc<ViewerSession>) {
    let l = &world.landscape;
    let reply = ResViewerGetMap {
        landscape_size: l.size() as u64,
        tile_size: l.tile_size() as u64,
        heights: l.heights().to_vec(),
    };
    world.responder.send(v.addr, &reply.encode()).await;
}

async fn viewer_get_tanks(world: &Arc<World>, v: &Arc<ViewerSession>) {
    let mut records = Vec::new();
    for client in world.clients.snapshot().await {
        if client.state() != SessionState::InGame {
            continue;
        }
        let tank = client.tank.lock().await;
        records.push(tank_record(&tank, tank.position));
    }

    let reply = ResGetTanks {
        id: Request::ViewerGetTanks,
        tanks: records,
    };
    world.responder.send(v.addr, &reply.encode()).await;
}

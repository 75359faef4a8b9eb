//! game.rs — the fixed-period simulation loop.
//!
//! Each tick, in order: admit acknowledged clients onto the map, advance
//! every live tank, resolve tank-tank overlap by reverting both, then fly
//! every shell and apply its damage. Notifications collect into an outbox
//! and go out after the tick's state changes, so a notification never
//! observes a half-advanced world.
//!
//! The loop never skips a tick: an overrun just means the next tick starts
//! late, without sleeping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ironclad_wire::{NotViewerShellEvent, Notification, TANK_OBSERVING_RANGE};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bounding::intersects;
use crate::math::Vec3;
use crate::server::World;
use crate::session::{ClientSession, Session, SessionState};
use crate::shell::{
    Shell, ShellOutcome, SHELL_EXPLOSION_DAMAGE, SHELL_EXPLOSION_RADIUS, SHELL_HIT_AMOUNT,
};
use crate::tank::{tank_volume, Tank, TickOutcome};

/// Undamaged tanks this close to a burst still hear it.
const NEAR_EXPLOSION_FACTOR: f64 = 2.0;

pub async fn run_ticker(world: Arc<World>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_micros(world.settings.tick_period_us);
    let mut ticker = tokio::time::interval(period);
    // An overrun tick delays the next one instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                tick_world(&world).await;
                ticks += 1;
                if ticks % 600 == 0 {
                    debug!(
                        "tick {ticks} | clients={} viewers={} shells={}",
                        world.clients.len().await,
                        world.viewers.len().await,
                        world.shells.lock().await.len(),
                    );
                }
            }
        }
    }
    debug!("ticker stopped");
}

/// One full world step. Public for the integration tests, which drive the
/// simulation without waiting on wall-clock ticks.
pub async fn tick_world(world: &Arc<World>) {
    let mut outbox: Vec<(SocketAddr, Vec<u8>)> = Vec::new();

    {
        // Registry membership is frozen for the whole pass.
        let clients = world.clients.read().await;

        // 1. Admit acknowledged clients onto the map.
        for (index, c) in clients.iter().enumerate() {
            if c.state() == SessionState::Acknowledged {
                try_place_tank(world, &clients, index, c).await;
            }
        }

        // 2. Advance every live tank.
        for c in clients.iter() {
            if c.state() != SessionState::InGame {
                continue;
            }
            let mut tank = c.tank.lock().await;
            if !tank.alive() {
                continue;
            }
            if tank.tick(&world.landscape) == TickOutcome::HitBound {
                outbox.push((c.addr, vec![Notification::HitBound as u8]));
            }
        }

        // 3. Resolve pairwise overlap by reverting both tanks.
        let volume = tank_volume();
        for i in 0..clients.len() {
            for j in 0..i {
                let a = &clients[i];
                let b = &clients[j];
                if a.state() != SessionState::InGame || b.state() != SessionState::InGame {
                    continue;
                }
                // Lock order is registry order (lower index first).
                let mut tank_b = b.tank.lock().await;
                let mut tank_a = a.tank.lock().await;
                if intersects(&volume, &tank_a.frame(), &volume, &tank_b.frame()) {
                    tank_a.position = tank_a.previous_position;
                    tank_b.position = tank_b.previous_position;
                    outbox.push((a.addr, vec![Notification::TankCollision as u8]));
                    outbox.push((b.addr, vec![Notification::TankCollision as u8]));
                }
            }
        }

        // 4. Fly the shells.
        process_shells(world, &clients, &mut outbox).await;
    }

    // 5. Push notifications now that the tick's state is settled.
    for (addr, data) in outbox {
        world.responder.send(addr, &data).await;
    }
}

/// Tries a handful of random spawn positions; on success the tank enters
/// the game, otherwise the session stays acknowledged and retries next tick.
async fn try_place_tank(
    world: &Arc<World>,
    clients: &[Arc<ClientSession>],
    index: usize,
    c: &Arc<ClientSession>,
) {
    let mut occupied = Vec::new();
    for other in clients {
        if other.addr == c.addr || other.state() != SessionState::InGame {
            continue;
        }
        occupied.push(other.tank.lock().await.frame());
    }

    let volume = tank_volume();
    let placement = {
        let mut rng = rand::thread_rng();
        let extent = world.landscape.extent();
        let mut found = None;
        for _ in 0..world.settings.spawn_attempts {
            let x = rng.gen_range(0.0..extent);
            let y = rng.gen_range(0.0..extent);
            let position = Vec3::new(x, y, world.landscape.height_at(x, y));
            let top = world.landscape.normal_at(x, y);

            let mut candidate = Tank::default();
            candidate.initialize(position, top, index as u8);
            let frame = candidate.frame();
            if occupied
                .iter()
                .any(|f| intersects(&volume, &frame, &volume, f))
            {
                continue;
            }
            found = Some((position, top));
            break;
        }
        found
    };

    match placement {
        Some((position, top)) => {
            let mut tank = c.tank.lock().await;
            tank.initialize(position, top, index as u8);
            drop(tank);
            c.set_state(SessionState::InGame);
            info!(
                "client {} entered the game at ({:.1}, {:.1})",
                c.addr, position.x, position.y
            );
        }
        None => {
            warn!("no clear spawn position for {}, retrying next tick", c.addr);
        }
    }
}

async fn process_shells(
    world: &Arc<World>,
    clients: &[Arc<ClientSession>],
    outbox: &mut Vec<(SocketAddr, Vec<u8>)>,
) {
    let mut shells = world.shells.lock().await;
    if shells.is_empty() {
        return;
    }

    let near_shoot_range = (TANK_OBSERVING_RANGE * world.landscape.tile_size()) as f64;

    // Launch notifications for shells fired since the last tick.
    for shell in shells.iter_mut().filter(|s| !s.announced) {
        shell.announced = true;
        for c in clients {
            if c.state() != SessionState::InGame || c.addr == shell.shooter {
                continue;
            }
            let tank = c.tank.lock().await;
            if tank.alive() && tank.position.distance(shell.position) <= near_shoot_range {
                outbox.push((c.addr, vec![Notification::NearShoot as u8]));
            }
        }
        let event = NotViewerShellEvent {
            id: Notification::ViewerShoot,
            x: shell.position.x,
            y: shell.position.y,
            z: shell.position.z,
        };
        for v in world.viewers.snapshot().await {
            outbox.push((v.addr, event.encode()));
        }
    }

    let mut flying = Vec::with_capacity(shells.len());
    for mut shell in shells.drain(..) {
        match shell.tick(&world.landscape) {
            ShellOutcome::Flying => flying.push(shell),
            ShellOutcome::Gone => {}
            ShellOutcome::Hit(point) => explode(world, clients, &shell, point, outbox).await,
        }
    }
    *shells = flying;
}

async fn explode(
    world: &Arc<World>,
    clients: &[Arc<ClientSession>],
    shell: &Shell,
    point: Vec3,
    outbox: &mut Vec<(SocketAddr, Vec<u8>)>,
) {
    let tank_vol = tank_volume();
    let shell_vol = Shell::volume();
    let shell_frame = shell.frame();

    let mut direct_hits: u64 = 0;
    let mut splash_hits: u64 = 0;
    let mut any_death = false;

    for c in clients {
        if c.state() != SessionState::InGame {
            continue;
        }
        let mut tank = c.tank.lock().await;
        if !tank.alive() {
            continue;
        }

        let distance = tank.position.distance(point);
        let in_radius = distance <= SHELL_EXPLOSION_RADIUS;
        let direct = intersects(&tank_vol, &tank.frame(), &shell_vol, &shell_frame);

        if !in_radius && !direct {
            if distance <= SHELL_EXPLOSION_RADIUS * NEAR_EXPLOSION_FACTOR {
                outbox.push((c.addr, vec![Notification::NearExplosion as u8]));
            }
            continue;
        }

        let mut died = false;
        if in_radius {
            died |= tank.apply_damage(SHELL_EXPLOSION_DAMAGE);
            tank.stats.got_hits += 1;
            splash_hits += 1;
            outbox.push((c.addr, vec![Notification::ExplosionDamage as u8]));
        }
        if direct {
            died |= tank.apply_damage(SHELL_HIT_AMOUNT);
            tank.stats.got_direct_hits += 1;
            direct_hits += 1;
            outbox.push((c.addr, vec![Notification::Hit as u8]));
        }
        if died {
            any_death = true;
            outbox.push((c.addr, vec![Notification::Death as u8]));
            info!("client {} destroyed", c.addr);
        }
    }

    // Attribute damage dealt to the shooter, if it is still registered.
    if direct_hits > 0 || splash_hits > 0 {
        if let Some(shooter) = clients.iter().find(|c| c.addr == shell.shooter) {
            let mut tank = shooter.tank.lock().await;
            tank.stats.direct_hits += direct_hits;
            tank.stats.hits += splash_hits;
        }
    }

    let event = NotViewerShellEvent {
        id: Notification::ViewerExplosion,
        x: point.x,
        y: point.y,
        z: point.z,
    };
    for v in world.viewers.snapshot().await {
        outbox.push((v.addr, event.encode()));
    }

    // A death that leaves a single live tank ends the match for it.
    if any_death {
        let mut survivors = Vec::new();
        for c in clients {
            if c.state() != SessionState::InGame {
                continue;
            }
            if c.tank.lock().await.alive() {
                survivors.push(c.addr);
            }
        }
        if let [winner] = survivors.as_slice() {
            outbox.push((*winner, vec![Notification::Win as u8]));
            info!("client {winner} wins");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::landscape::Landscape;
    use crate::math::tolerance_eq;
    use crate::net::Responder;
    use crate::session::{Registry, MAX_CLIENTS, MAX_VIEWERS};
    use crate::tank::TANK_HP;
    use tokio::net::UdpSocket;
    use tokio::sync::{mpsc, Mutex};

    async fn test_world(
        landscape: Landscape,
    ) -> (Arc<World>, mpsc::Receiver<crate::dispatcher::WorkItem>) {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.expect("bind"));
        let (tx, rx) = mpsc::channel(16);
        let world = Arc::new(World {
            landscape,
            settings: GameConfig {
                tick_period_us: 1_000,
                spawn_attempts: 8,
            },
            clients: Registry::new(MAX_CLIENTS),
            viewers: Registry::new(MAX_VIEWERS),
            shells: Mutex::new(Vec::new()),
            responder: Responder::new(socket.clone()),
            socket,
            requests: tx,
        });
        (world, rx)
    }

    async fn in_game_client(
        world: &Arc<World>,
        port: u16,
        position: Vec3,
        team: u8,
    ) -> Arc<ClientSession> {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().expect("addr");
        let c = world.clients.register(addr).await.expect("registered");
        let top = world.landscape.normal_at(position.x, position.y);
        c.tank.lock().await.initialize(position, top, team);
        c.set_state(SessionState::InGame);
        c
    }

    #[tokio::test]
    async fn acknowledged_clients_are_placed_into_the_game() {
        let (world, _rx) = test_world(Landscape::new(16, 16)).await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().expect("addr");
        let c = world.clients.register(addr).await.expect("registered");
        c.set_state(SessionState::Acknowledged);

        tick_world(&world).await;

        assert_eq!(c.state(), SessionState::InGame);
        let tank = c.tank.lock().await;
        assert_eq!(tank.hp, TANK_HP);
        assert!(world.landscape.contains(tank.position.x, tank.position.y));
        assert!(tolerance_eq(
            tank.position.z,
            world.landscape.height_at(tank.position.x, tank.position.y)
        ));
    }

    #[tokio::test]
    async fn collision_rolls_both_tanks_back() {
        let (world, _rx) = test_world(Landscape::new(16, 16)).await;
        let a = in_game_client(&world, 40011, Vec3::new(100.0, 100.0, 0.0), 0).await;
        let b = in_game_client(&world, 40012, Vec3::new(130.0, 100.0, 0.0), 1).await;

        {
            let mut tank = a.tank.lock().await;
            tank.engine_power = 100;
            tank.engine_power_target = 100;
        }

        tick_world(&world).await;

        // A 50-unit advance would carry tank A through tank B; the swept
        // test catches it and both end up exactly where they started.
        let tank_a = a.tank.lock().await;
        let tank_b = b.tank.lock().await;
        assert!(tolerance_eq(tank_a.position.x, 100.0));
        assert!(tolerance_eq(tank_b.position.x, 130.0));
    }

    #[tokio::test]
    async fn stationary_overlap_stays_put() {
        let (world, _rx) = test_world(Landscape::new(16, 16)).await;
        let a = in_game_client(&world, 40021, Vec3::new(100.0, 100.0, 0.0), 0).await;
        let b = in_game_client(&world, 40022, Vec3::new(101.0, 100.0, 0.0), 1).await;

        tick_world(&world).await;

        let tank_a = a.tank.lock().await;
        let tank_b = b.tank.lock().await;
        assert!(tolerance_eq(tank_a.position.x, 100.0));
        assert!(tolerance_eq(tank_b.position.x, 101.0));
    }

    #[tokio::test]
    async fn explosion_damages_and_declares_a_winner() {
        let (world, _rx) = test_world(Landscape::new(64, 16)).await;
        let shooter = in_game_client(&world, 40031, Vec3::new(100.0, 100.0, 0.0), 0).await;
        let victim = in_game_client(&world, 40032, Vec3::new(200.0, 200.0, 0.0), 1).await;

        world.shells.lock().await.push(Shell::new(
            Vec3::new(200.0, 200.0, 50.0),
            Vec3::new(0.0, 0.0, -1.0),
            shooter.addr,
        ));

        tick_world(&world).await;

        let victim_tank = victim.tank.lock().await;
        assert_eq!(victim_tank.hp, 0);
        assert_eq!(victim_tank.stats.got_hits, 1);
        assert_eq!(victim_tank.stats.got_direct_hits, 1);

        let shooter_tank = shooter.tank.lock().await;
        assert_eq!(shooter_tank.hp, TANK_HP);
        assert_eq!(shooter_tank.stats.hits, 1);
        assert_eq!(shooter_tank.stats.direct_hits, 1);

        assert!(world.shells.lock().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_world_shells_vanish() {
        let (world, _rx) = test_world(Landscape::new(4, 16)).await;
        let shooter = in_game_client(&world, 40041, Vec3::new(32.0, 32.0, 0.0), 0).await;
        world.shells.lock().await.push(Shell::new(
            Vec3::new(32.0, 32.0, 30.0),
            Vec3::new(1.0, 0.0, 0.0),
            shooter.addr,
        ));

        tick_world(&world).await;

        assert!(world.shells.lock().await.is_empty());
        assert_eq!(shooter.tank.lock().await.hp, TANK_HP);
    }

    #[tokio::test]
    async fn hit_bound_reverts_the_runaway() {
        let (world, _rx) = test_world(Landscape::new(16, 16)).await;
        let c = in_game_client(&world, 40051, Vec3::new(4.0, 100.0, 0.0), 0).await;
        {
            let mut tank = c.tank.lock().await;
            tank.direction = Vec3::new(-1.0, 0.0, 0.0);
            tank.engine_power = 100;
            tank.engine_power_target = 100;
        }

        tick_world(&world).await;

        let tank = c.tank.lock().await;
        assert!(tolerance_eq(tank.position.x, 4.0));
        assert!(tolerance_eq(tank.position.y, 100.0));
    }
}

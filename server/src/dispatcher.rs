//! dispatcher.rs — datagram validation, classification and the work queue.
//!
//! The receiver task calls [`handle_packet`] for every datagram. The packet
//! table maps the id byte to a validator and a role; the sender's endpoint
//! is looked up in both registries to catch role confusion. Well-formed
//! requests land in the owning session's one-slot buffer and the session is
//! queued for the worker; the worker task ([`run_worker`]) is the only place
//! executors run, so replies always reflect the executor's state changes.

use std::net::SocketAddr;
use std::sync::Arc;

use ironclad_wire::{ReqLookAt, ReqSetEnginePower, ReqTurn, Request, Response, MAX_DATAGRAM};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::handlers;
use crate::server::World;
use crate::session::{ClientSession, ViewerSession};

/// Capacity of the request queue shared by all sessions.
pub const REQUEST_QUEUE_CAPACITY: usize = 16;

/// A queued unit of executor work.
pub enum WorkItem {
    Client(Arc<ClientSession>),
    Viewer(Arc<ViewerSession>),
}

/// One row of the packet table.
pub struct PacketDef {
    pub id: Request,
    /// Body validator; `None` accepts any body.
    pub validator: Option<fn(&[u8]) -> bool>,
    /// Client-protocol packets must come from clients, the rest from viewers.
    pub is_client_protocol: bool,
}

static PACKET_DEFS: &[PacketDef] = &[
    // Connecting.
    PacketDef {
        id: Request::Hello,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::Bye,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::ViewerHello,
        validator: None,
        is_client_protocol: false,
    },
    PacketDef {
        id: Request::ViewerBye,
        validator: None,
        is_client_protocol: false,
    },
    // Tank control.
    PacketDef {
        id: Request::SetEnginePower,
        validator: Some(validate_set_engine_power),
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::Turn,
        validator: Some(validate_turn),
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::LookAt,
        validator: Some(validate_look_at),
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::Shoot,
        validator: None,
        is_client_protocol: true,
    },
    // Tank telemetry.
    PacketDef {
        id: Request::GetHeading,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::GetSpeed,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::GetHp,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::GetStatistics,
        validator: None,
        is_client_protocol: true,
    },
    // Observing.
    PacketDef {
        id: Request::GetMap,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::GetNormal,
        validator: None,
        is_client_protocol: true,
    },
    PacketDef {
        id: Request::GetTanks,
        validator: None,
        is_client_protocol: true,
    },
    // Viewing.
    PacketDef {
        id: Request::ViewerGetMap,
        validator: None,
        is_client_protocol: false,
    },
    PacketDef {
        id: Request::ViewerGetTanks,
        validator: None,
        is_client_protocol: false,
    },
];

pub fn packet_def(id: u8) -> Option<&'static PacketDef> {
    PACKET_DEFS.iter().find(|d| d.id as u8 == id)
}

fn validate_set_engine_power(body: &[u8]) -> bool {
    ReqSetEnginePower::decode(body).is_ok()
}

fn validate_turn(body: &[u8]) -> bool {
    match ReqTurn::decode(body) {
        Ok(p) => {
            p.turn_angle.is_finite()
                && (-std::f64::consts::PI..=std::f64::consts::PI).contains(&p.turn_angle)
        }
        Err(_) => false,
    }
}

fn validate_look_at(body: &[u8]) -> bool {
    match ReqLookAt::decode(body) {
        Ok(p) => {
            // A zero-magnitude look direction cannot be normalized.
            [p.x, p.y, p.z]
                .iter()
                .all(|v| v.is_finite() && (-1.0..=1.0).contains(v))
                && p.x * p.x + p.y * p.y + p.z * p.z > crate::math::EPS
        }
        Err(_) => false,
    }
}

/// Classifies one datagram and either replies with a protocol error or
/// buffers it on the sender's session and queues the session.
pub async fn handle_packet(world: &Arc<World>, data: &[u8], src: SocketAddr) {
    if data.is_empty() || data.len() > MAX_DATAGRAM {
        return;
    }

    let Some(def) = packet_def(data[0]) else {
        debug!("unknown packet id 0x{:02x} from {src}", data[0]);
        world.responder.send_id(src, Response::BadRequest as u8).await;
        return;
    };

    if let Some(validator) = def.validator {
        if !validator(&data[1..]) {
            debug!("packet 0x{:02x} from {src} failed validation", data[0]);
            world.responder.send_id(src, Response::BadRequest as u8).await;
            return;
        }
    }

    if def.is_client_protocol {
        if world.viewers.find(src).await.is_some() {
            world.responder.send_id(src, Response::BadRequest as u8).await;
            return;
        }

        match world.clients.find(src).await {
            None => match world.clients.register(src).await {
                Some(_) => {
                    info!("client {src} connected");
                    world.responder.send_id(src, Request::Hello as u8).await;
                }
                None => {
                    warn!("client registry full, refusing {src}");
                    world
                        .responder
                        .send_id(src, Response::TooManyClients as u8)
                        .await;
                }
            },
            Some(client) => enqueue(world, data, src, WorkItem::Client(client)).await,
        }
    } else {
        if world.clients.find(src).await.is_some() {
            world.responder.send_id(src, Response::BadRequest as u8).await;
            return;
        }

        match world.viewers.find(src).await {
            None => match world.viewers.register(src).await {
                Some(_) => {
                    info!("viewer {src} connected");
                    world.responder.send_id(src, Request::ViewerHello as u8).await;
                }
                None => {
                    warn!("viewer registry full, refusing {src}");
                    world
                        .responder
                        .send_id(src, Response::TooManyClients as u8)
                        .await;
                }
            },
            Some(viewer) => enqueue(world, data, src, WorkItem::Viewer(viewer)).await,
        }
    }
}

fn pending_of(item: &WorkItem) -> &tokio::sync::Mutex<Option<Vec<u8>>> {
    match item {
        WorkItem::Client(c) => &c.pending,
        WorkItem::Viewer(v) => &v.pending,
    }
}

async fn enqueue(world: &Arc<World>, data: &[u8], src: SocketAddr, item: WorkItem) {
    {
        let mut slot = pending_of(&item).lock().await;
        if slot.is_some() {
            world.responder.send_id(src, Response::Wait as u8).await;
            return;
        }
        *slot = Some(data.to_vec());
    }

    if let Err(rejected) = world.requests.try_send(item) {
        // Saturation under a lossy transport: drop, like any other datagram,
        // and free the slot so the peer may retry.
        warn!("request queue full, dropping request from {src}");
        let item = rejected.into_inner();
        *pending_of(&item).lock().await = None;
    }
}

/// Drains the request queue, running one executor at a time.
pub async fn run_worker(
    world: Arc<World>,
    mut requests: mpsc::Receiver<WorkItem>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.changed() => break,
            item = requests.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match item {
            WorkItem::Client(client) => {
                let data = client.pending.lock().await.clone();
                if let Some(data) = data {
                    handlers::execute_client(&world, &client, &data).await;
                }
                *client.pending.lock().await = None;
            }
            WorkItem::Viewer(viewer) => {
                let data = viewer.pending.lock().await.clone();
                if let Some(data) = data {
                    handlers::execute_viewer(&world, &viewer, &data).await;
                }
                *viewer.pending.lock().await = None;
            }
        }
    }
    debug!("worker stopped");
}

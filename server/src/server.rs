//! server.rs — shared world state and task orchestration.
//!
//! [`World`] is the single shared structure: the immutable landscape, the
//! two session registries, the live shells, and the socket. Three tasks
//! run against it — receiver, worker, ticker — and all stop on one watch
//! flag. [`Server::spawn`] wires everything up; [`Server::shutdown`] says
//! goodbye to every session and joins the tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use ironclad_wire::Request;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::GameConfig;
use crate::dispatcher::{self, WorkItem, REQUEST_QUEUE_CAPACITY};
use crate::game;
use crate::landscape::Landscape;
use crate::net::{self, Responder};
use crate::session::{ClientSession, Registry, Session, ViewerSession, MAX_CLIENTS, MAX_VIEWERS};
use crate::shell::Shell;

pub struct World {
    pub landscape: Landscape,
    pub settings: GameConfig,
    pub clients: Registry<ClientSession>,
    pub viewers: Registry<ViewerSession>,
    pub shells: Mutex<Vec<Shell>>,
    pub socket: Arc<UdpSocket>,
    pub responder: Responder,
    pub requests: mpsc::Sender<WorkItem>,
}

pub struct Server {
    addr: SocketAddr,
    world: Arc<World>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds the socket and starts the receiver, worker and ticker tasks.
    pub async fn spawn(
        bind: SocketAddr,
        settings: GameConfig,
        landscape: Landscape,
    ) -> Result<Server> {
        let socket = Arc::new(
            UdpSocket::bind(bind)
                .await
                .with_context(|| format!("binding udp socket on {bind}"))?,
        );
        let addr = socket.local_addr().context("reading bound address")?;

        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let world = Arc::new(World {
            landscape,
            settings,
            clients: Registry::new(MAX_CLIENTS),
            viewers: Registry::new(MAX_VIEWERS),
            shells: Mutex::new(Vec::new()),
            responder: Responder::new(socket.clone()),
            socket,
            requests: requests_tx,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(net::run_receiver(world.clone(), shutdown_rx.clone())),
            tokio::spawn(dispatcher::run_worker(
                world.clone(),
                requests_rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(game::run_ticker(world.clone(), shutdown_rx)),
        ];

        info!("listening on udp {addr}");
        Ok(Server {
            addr,
            world,
            shutdown: shutdown_tx,
            tasks,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Stops the tasks, broadcasts bye to every session, and waits for the
    /// tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for c in self.world.clients.drain().await {
            self.world.responder.send_id(c.addr(), Request::Bye as u8).await;
        }
        for v in self.world.viewers.drain().await {
            self.world
                .responder
                .send_id(v.addr(), Request::ViewerBye as u8)
                .await;
        }

        for task in self.tasks {
            let _ = task.await;
        }
        info!("server stopped");
    }
}

//! net.rs — UDP receive loop and the shared responder.
//!
//! One socket serves everything: requests in, replies and notifications out.
//! Send failures are logged and swallowed; the transport is allowed to lose
//! datagrams, so a failed send is never worth crashing over.

use std::net::SocketAddr;
use std::sync::Arc;

use ironclad_wire::MAX_DATAGRAM;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::dispatcher;
use crate::server::World;

/// Thin sender over the shared socket.
pub struct Responder {
    socket: Arc<UdpSocket>,
}

impl Responder {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub async fn send(&self, to: SocketAddr, data: &[u8]) {
        if let Err(e) = self.socket.send_to(data, to).await {
            warn!("udp send to {to} failed: {e}");
        } else {
            debug!("udp -> {to}: 0x{:02x} ({} bytes)", data[0], data.len());
        }
    }

    /// Single-byte reply or notification.
    pub async fn send_id(&self, to: SocketAddr, id: u8) {
        self.send(to, &[id]).await;
    }
}

/// Blocks on the socket, feeding every datagram to the dispatcher. Exits
/// when the shutdown flag flips.
pub async fn run_receiver(world: Arc<World>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = world.socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    dispatcher::handle_packet(&world, &buf[..len], src).await;
                }
                Err(e) => {
                    warn!("udp recv error: {e}");
                }
            }
        }
    }
    debug!("receiver stopped");
}

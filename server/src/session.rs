//! session.rs — per-peer session records and the bounded registries.
//!
//! Every remote endpoint maps to at most one session: a client (owns a tank)
//! or a viewer (observes only). Registries are ordered, bounded at
//! [`MAX_CLIENTS`] / [`MAX_VIEWERS`], and keyed by endpoint equality.
//!
//! Concurrency shape: the session state byte is atomic (read on the hot
//! dispatch path), the tank sits behind its own async mutex (dispatcher vs
//! tick loop), and the one-slot pending request buffer has its own lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::tank::Tank;

pub const MAX_CLIENTS: usize = 16;
pub const MAX_VIEWERS: usize = 16;

/// Handshake progression. Two hellos reach `Acknowledged`; the tick loop
/// promotes acknowledged clients to `InGame` once a spawn spot is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connected = 0,
    Acknowledged = 1,
    InGame = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Acknowledged,
            2 => Self::InGame,
            _ => Self::Connected,
        }
    }
}

/// A connected player. The pending slot enforces one request in flight:
/// the dispatcher fills it, the worker drains it.
pub struct ClientSession {
    pub addr: SocketAddr,
    state: AtomicU8,
    pub tank: Mutex<Tank>,
    pub pending: Mutex<Option<Vec<u8>>>,
}

/// A connected observer. Same lifecycle as a client, no tank.
pub struct ViewerSession {
    pub addr: SocketAddr,
    state: AtomicU8,
    pub pending: Mutex<Option<Vec<u8>>>,
}

/// Common session behavior, so one registry implementation serves both roles.
pub trait Session: Send + Sync {
    fn create(addr: SocketAddr) -> Self;
    fn addr(&self) -> SocketAddr;
    fn state(&self) -> SessionState;
    fn set_state(&self, state: SessionState);
}

impl Session for ClientSession {
    fn create(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: AtomicU8::new(SessionState::Connected as u8),
            tank: Mutex::new(Tank::default()),
            pending: Mutex::new(None),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Session for ViewerSession {
    fn create(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: AtomicU8::new(SessionState::Connected as u8),
            pending: Mutex::new(None),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Ordered, bounded session registry keyed by endpoint.
pub struct Registry<S: Session> {
    entries: RwLock<Vec<Arc<S>>>,
    capacity: usize,
}

impl<S: Session> Registry<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn find(&self, addr: SocketAddr) -> Option<Arc<S>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|s| s.addr() == addr)
            .cloned()
    }

    /// Registers a new session in `Connected` state. An already-registered
    /// endpoint gets its existing session back; a full registry gets `None`.
    pub async fn register(&self, addr: SocketAddr) -> Option<Arc<S>> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.iter().find(|s| s.addr() == addr) {
            return Some(existing.clone());
        }
        if entries.len() >= self.capacity {
            return None;
        }
        let session = Arc::new(S::create(addr));
        entries.push(session.clone());
        Some(session)
    }

    pub async fn unregister(&self, addr: SocketAddr) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|s| s.addr() != addr);
        entries.len() != before
    }

    /// Read guard over the ordered entries; the tick loop holds this for a
    /// whole pass.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, Vec<Arc<S>>> {
        self.entries.read().await
    }

    /// Clones the current entries, for iteration without holding the lock.
    pub async fn snapshot(&self) -> Vec<Arc<S>> {
        self.entries.read().await.clone()
    }

    /// Removes and returns every session (shutdown broadcast).
    pub async fn drain(&self) -> Vec<Arc<S>> {
        let mut entries = self.entries.write().await;
        std::mem::take(&mut *entries)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().expect("addr")
    }

    #[tokio::test]
    async fn registry_enforces_capacity() {
        let reg: Registry<ViewerSession> = Registry::new(2);
        assert!(reg.register(addr(1)).await.is_some());
        assert!(reg.register(addr(2)).await.is_some());
        assert!(reg.register(addr(3)).await.is_none());

        // Re-registering an existing endpoint is not a new entry.
        assert!(reg.register(addr(1)).await.is_some());
        assert_eq!(reg.len().await, 2);

        assert!(reg.unregister(addr(1)).await);
        assert!(!reg.unregister(addr(1)).await);
        assert!(reg.register(addr(3)).await.is_some());
    }

    #[tokio::test]
    async fn sessions_start_connected() {
        let reg: Registry<ClientSession> = Registry::new(MAX_CLIENTS);
        let s = reg.register(addr(7)).await.expect("registered");
        assert_eq!(s.state(), SessionState::Connected);
        s.set_state(SessionState::Acknowledged);
        let found = reg.find(addr(7)).await.expect("found");
        assert_eq!(found.state(), SessionState::Acknowledged);
        assert!(reg.find(addr(8)).await.is_none());

        // The pre-spawn tank reads as dead.
        assert!(!s.tank.lock().await.alive());
    }
}

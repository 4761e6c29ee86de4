//! Peer registry and broadcast fan-out.
//!
//! One task owns the registry; register/unregister/broadcast requests
//! arrive on three bounded channels and are applied strictly one at a
//! time, so no lock guards the peer map. Delivery to a peer is a
//! non-blocking `try_send`: a peer whose queue is full is evicted in the
//! same pass, which keeps one stalled receiver from holding up the rest
//! of the population.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics;

/// Depth of the three command channels. Producers are per-peer pumps that
/// can afford to wait for the registry task.
const COMMAND_BUFFER: usize = 64;

/// One accepted connection as the registry sees it: an identity plus the
/// sending side of that peer's bounded delivery queue.
///
/// The hub holds the only sender. Dropping the handle closes the queue,
/// so a peer's write pump observes eviction or unregistration as the end
/// of its queue.
#[derive(Debug)]
pub struct PeerHandle {
    id: u64,
    queue: mpsc::Sender<Bytes>,
}

impl PeerHandle {
    pub fn new(id: u64, queue: mpsc::Sender<Bytes>) -> Self {
        Self { id, queue }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Cloneable front of the registry task.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<PeerHandle>,
    unregister_tx: mpsc::Sender<u64>,
    broadcast_tx: mpsc::Sender<Bytes>,
    connected: Arc<AtomicUsize>,
}

impl Hub {
    /// Starts the registry task and returns the handle all peer pumps share.
    pub fn spawn() -> Hub {
        let (register_tx, register_rx) = mpsc::channel(COMMAND_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(COMMAND_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(COMMAND_BUFFER);
        let connected = Arc::new(AtomicUsize::new(0));

        let registry = Registry {
            peers: HashMap::new(),
            connected: Arc::clone(&connected),
        };
        tokio::spawn(registry.run(register_rx, unregister_rx, broadcast_rx));

        Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
            connected,
        }
    }

    /// Adds a peer to the registry. Re-registering a live id replaces the
    /// stored handle and closes the old queue.
    pub async fn register(&self, peer: PeerHandle) {
        let _ = self.register_tx.send(peer).await;
    }

    /// Removes a peer and closes its delivery queue. Unknown ids are a
    /// no-op, so a pump may unregister a peer that was already evicted.
    pub async fn unregister(&self, peer_id: u64) {
        let _ = self.unregister_tx.send(peer_id).await;
    }

    /// Queues `message` for delivery to every registered peer.
    pub async fn broadcast(&self, message: Bytes) {
        let _ = self.broadcast_tx.send(message).await;
    }

    /// Number of currently registered peers. Maintained by the registry
    /// task; readers never touch the registry itself.
    pub fn connected_peers(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

struct Registry {
    peers: HashMap<u64, PeerHandle>,
    connected: Arc<AtomicUsize>,
}

impl Registry {
    async fn run(
        mut self,
        mut register_rx: mpsc::Receiver<PeerHandle>,
        mut unregister_rx: mpsc::Receiver<u64>,
        mut broadcast_rx: mpsc::Receiver<Bytes>,
    ) {
        loop {
            tokio::select! {
                Some(peer) = register_rx.recv() => self.register(peer),
                Some(peer_id) = unregister_rx.recv() => self.unregister(peer_id),
                Some(message) = broadcast_rx.recv() => self.broadcast(message),
                else => break,
            }
        }
        debug!("registry task stopped");
    }

    fn register(&mut self, peer: PeerHandle) {
        let id = peer.id();
        if self.peers.insert(id, peer).is_none() {
            self.connected.fetch_add(1, Ordering::SeqCst);
        } else {
            debug!(peer = id, "duplicate registration replaced");
        }
    }

    fn unregister(&mut self, peer_id: u64) {
        if let Some(peer) = self.peers.remove(&peer_id) {
            // Count is updated before the handle drops, so anyone observing
            // a closed queue also observes the updated count.
            self.connected.fetch_sub(1, Ordering::SeqCst);
            drop(peer);
        }
    }

    /// Non-blocking fan-out. Peers whose queue is full (or already gone)
    /// are evicted in the same pass; there is no retry.
    fn broadcast(&mut self, message: Bytes) {
        metrics::BROADCASTS.inc();
        let mut dead: Vec<u64> = Vec::new();
        for (peer_id, peer) in &self.peers {
            match peer.queue.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(peer = *peer_id, "delivery queue full, evicting");
                    dead.push(*peer_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = *peer_id, "delivery queue closed, evicting");
                    dead.push(*peer_id);
                }
            }
        }
        for peer_id in dead {
            metrics::EVICTED_PEERS.inc();
            self.unregister(peer_id);
        }
    }
}

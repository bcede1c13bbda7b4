//! Transport abstraction and the in-memory implementation.

use crate::batch::OpBatch;
use crate::error::SyncError;
use async_trait::async_trait;
use drift_clock::ReplicaId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Peer connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connected,
}

/// A known peer.
#[derive(Clone, Debug)]
pub struct Peer {
    pub id: ReplicaId,
    pub state: PeerState,
}

/// Abstract batch transport.
///
/// Implementations may deliver late, more than once, and in any order; they
/// must not corrupt or reorder the contents of a single batch. Ordering
/// across batches is the merge engine's problem, not the transport's.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Send a batch to one peer.
    async fn send(&self, peer: &ReplicaId, batch: OpBatch) -> Result<(), SyncError>;

    /// Send a batch to every connected peer. Per-peer failures are skipped.
    async fn broadcast(&self, batch: OpBatch) -> Result<(), SyncError>;

    /// Drop a peer. Batches to it start failing until reconnected.
    async fn disconnect(&self, peer: &ReplicaId) -> Result<(), SyncError>;

    /// Currently connected peers.
    async fn connected_peers(&self) -> Vec<Peer>;

    /// Take the incoming-batch receiver. Single consumer; panics if taken
    /// twice.
    fn subscribe(&self) -> mpsc::Receiver<OpBatch>;
}

type SharedReceiver = Arc<RwLock<Option<mpsc::Receiver<OpBatch>>>>;
type SharedOutgoing = Arc<RwLock<HashMap<ReplicaId, mpsc::Sender<OpBatch>>>>;

/// In-memory transport for tests and simulation. Pairs are wired up with
/// [`MemoryTransport::connect_to`] or [`full_mesh`].
pub struct MemoryTransport {
    local_id: ReplicaId,
    peers: Arc<RwLock<HashMap<ReplicaId, Peer>>>,
    inbox_tx: mpsc::Sender<OpBatch>,
    inbox_rx: SharedReceiver,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(local_id: ReplicaId) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            local_id,
            peers: Arc::new(RwLock::new(HashMap::new())),
            inbox_tx: tx,
            inbox_rx: Arc::new(RwLock::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn local_id(&self) -> &ReplicaId {
        &self.local_id
    }

    /// Wire two transports together, both directions.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.peers.write().insert(
            other.local_id.clone(),
            Peer {
                id: other.local_id.clone(),
                state: PeerState::Connected,
            },
        );
        self.outgoing
            .write()
            .insert(other.local_id.clone(), other.inbox_tx.clone());

        other.peers.write().insert(
            self.local_id.clone(),
            Peer {
                id: self.local_id.clone(),
                state: PeerState::Connected,
            },
        );
        other
            .outgoing
            .write()
            .insert(self.local_id.clone(), self.inbox_tx.clone());
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    async fn send(&self, peer: &ReplicaId, batch: OpBatch) -> Result<(), SyncError> {
        let tx = {
            let outgoing = self.outgoing.read();
            outgoing.get(peer).cloned()
        };
        match tx {
            Some(tx) => tx
                .send(batch)
                .await
                .map_err(|e| SyncError::SendFailed(e.to_string())),
            None => Err(SyncError::PeerNotFound(peer.to_string())),
        }
    }

    async fn broadcast(&self, batch: OpBatch) -> Result<(), SyncError> {
        let senders: Vec<_> = {
            let outgoing = self.outgoing.read();
            outgoing.values().cloned().collect()
        };
        for tx in senders {
            let _ = tx.send(batch.clone()).await;
        }
        Ok(())
    }

    async fn disconnect(&self, peer: &ReplicaId) -> Result<(), SyncError> {
        if let Some(entry) = self.peers.write().get_mut(peer) {
            entry.state = PeerState::Disconnected;
        }
        self.outgoing.write().remove(peer);
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> mpsc::Receiver<OpBatch> {
        self.inbox_rx
            .write()
            .take()
            .expect("subscribe can only be called once")
    }
}

/// Fully connected mesh of in-memory transports, one per replica id.
pub fn full_mesh(replicas: &[ReplicaId]) -> Vec<MemoryTransport> {
    let transports: Vec<_> = replicas
        .iter()
        .map(|id| MemoryTransport::new(id.clone()))
        .collect();
    for i in 0..transports.len() {
        for j in (i + 1)..transports.len() {
            transports[i].connect_to(&transports[j]);
        }
    }
    transports
}

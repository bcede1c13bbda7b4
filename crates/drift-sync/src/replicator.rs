//! The replicator: pumps operation batches between a store and a transport.

use crate::batch::OpBatch;
use crate::error::Result;
use crate::transport::SyncTransport;
use drift_clock::ReplicaId;
use drift_compaction::{AckTracker, GcPolicy};
use drift_store::{ApplyReport, ValueStore};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tuning for the background pump.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// How often to flush pending operations and heartbeat (milliseconds).
    pub sync_interval_ms: u64,
    /// Maximum operations per batch; larger outboxes are split.
    pub max_batch_size: usize,
    /// Run tombstone collection whenever acknowledgements arrive.
    pub auto_collect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 1000,
            max_batch_size: 100,
            auto_collect: true,
        }
    }
}

/// Builder for sync configuration.
#[derive(Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync_interval(mut self, ms: u64) -> Self {
        self.config.sync_interval_ms = ms;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    pub fn auto_collect(mut self, enabled: bool) -> Self {
        self.config.auto_collect = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

/// Events emitted while replicating.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// A batch of local operations went out.
    BatchSent { ops: usize },
    /// A remote batch was applied.
    BatchReceived { from: ReplicaId, report: ApplyReport },
    /// Tombstones were physically purged.
    Collected { purged: usize },
    /// A transport error was absorbed.
    SyncError { error: String },
}

/// Drives one replica's participation in the mesh.
///
/// The store is shared: the application mutates it directly through the
/// lock while the replicator broadcasts what accumulates in the outbox and
/// applies what arrives. Acknowledgement frontiers piggybacked on batches
/// feed the [`AckTracker`], and when collection is enabled the stable
/// frontier is handed to the store after every acknowledgement.
pub struct Replicator<T: SyncTransport> {
    store: Arc<RwLock<ValueStore>>,
    transport: Arc<T>,
    tracker: AckTracker,
    config: SyncConfig,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl<T: SyncTransport> Replicator<T> {
    pub fn new(
        store: Arc<RwLock<ValueStore>>,
        transport: Arc<T>,
        policy: GcPolicy,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            transport,
            tracker: AckTracker::new(policy),
            config,
            events: None,
        }
    }

    /// Attach an event channel. Events are dropped if the receiver lags.
    pub fn with_events(mut self, tx: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn store(&self) -> Arc<RwLock<ValueStore>> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Declare a peer whose acknowledgement matters for collection. Until
    /// it reports a frontier, nothing is stable under the all-replicas
    /// policy.
    pub fn register_peer(&mut self, peer: ReplicaId) {
        self.tracker.register_peer(peer);
    }

    /// Flush the store's outbox to every peer. Returns how many operations
    /// went out.
    pub async fn broadcast_pending(&mut self) -> Result<usize> {
        let (from, ops, frontier) = {
            let mut store = self.store.write();
            (
                store.replica_id().clone(),
                store.take_outbound(),
                store.frontier().clone(),
            )
        };
        if ops.is_empty() {
            return Ok(0);
        }

        let total = ops.len();
        for chunk in ops.chunks(self.config.max_batch_size) {
            let batch = OpBatch::new(from.clone(), chunk.to_vec(), frontier.clone());
            self.transport.broadcast(batch).await?;
        }
        debug!(replica = %from, ops = total, "broadcast pending operations");
        self.emit(SyncEvent::BatchSent { ops: total });
        Ok(total)
    }

    /// Broadcast a frontier-only acknowledgement.
    pub async fn heartbeat(&self) -> Result<()> {
        let (from, frontier) = {
            let store = self.store.read();
            (store.replica_id().clone(), store.frontier().clone())
        };
        self.transport
            .broadcast(OpBatch::heartbeat(from, frontier))
            .await
    }

    /// Apply one incoming batch and run collection if enabled.
    pub fn handle_batch(&mut self, batch: OpBatch) -> ApplyReport {
        self.tracker.record_frontier(&batch.from, &batch.frontier);

        let report = {
            let mut store = self.store.write();
            store.apply_remote(&batch.ops)
        };
        if !batch.is_heartbeat() {
            debug!(
                from = %batch.from,
                applied = report.applied,
                buffered = report.buffered,
                "applied remote batch"
            );
        }
        self.emit(SyncEvent::BatchReceived {
            from: batch.from.clone(),
            report,
        });

        if self.config.auto_collect {
            self.collect_stable();
        }
        report
    }

    /// Purge tombstones covered by the current stable frontier. The union
    /// of peer-reported frontiers is passed along so the store can hold
    /// back list-element purges while peer operations are still in flight.
    pub fn collect_stable(&mut self) -> usize {
        let mut store = self.store.write();
        let stable = self.tracker.stable_frontier(store.frontier());
        let reported = self.tracker.reported_union();
        let purged = store.collect(&stable, &reported);
        if purged > 0 {
            info!(purged, "collected stable tombstones");
            drop(store);
            self.emit(SyncEvent::Collected { purged });
        }
        purged
    }

    /// Background pump: flush the outbox and heartbeat on an interval,
    /// apply batches as they arrive. Returns when the transport's inbox
    /// closes.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<OpBatch>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.sync_interval_ms.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.broadcast_pending().await {
                        warn!(error = %e, "broadcast failed");
                        self.emit(SyncEvent::SyncError { error: e.to_string() });
                    }
                    if let Err(e) = self.heartbeat().await {
                        warn!(error = %e, "heartbeat failed");
                        self.emit(SyncEvent::SyncError { error: e.to_string() });
                    }
                }
                batch = inbox.recv() => {
                    match batch {
                        Some(batch) => {
                            self.handle_batch(batch);
                        }
                        None => {
                            debug!("inbox closed, replicator stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}

//! End-to-end replication over the in-memory transport.

use drift_access::{AccessGroup, GroupId, PrincipalId, Role};
use drift_clock::{ReplicaContext, ReplicaId};
use drift_compaction::GcPolicy;
use drift_store::{EntityKind, LifecycleState, Value, ValueStore};
use drift_sync::{full_mesh, MemoryTransport, Replicator, SyncConfigBuilder, SyncTransport};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn team() -> AccessGroup {
    let mut group = AccessGroup::new(GroupId::from_string("team"));
    group.insert(PrincipalId::from("alice"), Role::Admin);
    group.insert(PrincipalId::from("bob"), Role::Write);
    group
}

fn shared_store(name: &str) -> Arc<RwLock<ValueStore>> {
    let mut store = ValueStore::new(ReplicaContext::new(name));
    store.access_mut().register_group(team());
    Arc::new(RwLock::new(store))
}

fn replicator(
    store: &Arc<RwLock<ValueStore>>,
    transport: MemoryTransport,
    peers: &[&str],
) -> (Replicator<MemoryTransport>, tokio::sync::mpsc::Receiver<drift_sync::OpBatch>) {
    let transport = Arc::new(transport);
    let inbox = transport.subscribe();
    let mut rep = Replicator::new(
        Arc::clone(store),
        transport,
        GcPolicy::default(),
        SyncConfigBuilder::new().sync_interval(10).build(),
    );
    for peer in peers {
        rep.register_peer(ReplicaId::new(*peer));
    }
    (rep, inbox)
}

#[tokio::test]
async fn test_manual_pump_converges_two_replicas() {
    let mut mesh = full_mesh(&[ReplicaId::new("a"), ReplicaId::new("b")]);
    let tb = mesh.pop().unwrap();
    let ta = mesh.pop().unwrap();

    let store_a = shared_store("a");
    let store_b = shared_store("b");
    let (mut rep_a, mut inbox_a) = replicator(&store_a, ta, &["b"]);
    let (mut rep_b, mut inbox_b) = replicator(&store_b, tb, &["a"]);

    let gid = GroupId::from_string("team");
    let id = store_a
        .write()
        .create(
            EntityKind::Map,
            &gid,
            BTreeMap::from([("rating".to_string(), Value::Int(5))]),
            &PrincipalId::from("alice"),
        )
        .unwrap();

    let sent = rep_a.broadcast_pending().await.unwrap();
    assert_eq!(sent, 1);
    let batch = inbox_b.recv().await.unwrap();
    let report = rep_b.handle_batch(batch);
    assert_eq!(report.applied, 1);

    store_b
        .write()
        .set(&id, "rating", Value::Int(2), &PrincipalId::from("bob"))
        .unwrap();
    rep_b.broadcast_pending().await.unwrap();
    let batch = inbox_a.recv().await.unwrap();
    rep_a.handle_batch(batch);

    assert_eq!(
        store_a.read().field(&id, "rating").unwrap(),
        Some(Value::Int(2))
    );
    assert_eq!(
        store_b.read().field(&id, "rating").unwrap(),
        Some(Value::Int(2))
    );
}

#[tokio::test]
async fn test_large_outbox_is_chunked() {
    let mut mesh = full_mesh(&[ReplicaId::new("a"), ReplicaId::new("b")]);
    let tb = mesh.pop().unwrap();
    let ta = mesh.pop().unwrap();

    let store_a = shared_store("a");
    let store_b = shared_store("b");

    let transport_a = Arc::new(ta);
    let mut rep_a = Replicator::new(
        Arc::clone(&store_a),
        Arc::clone(&transport_a),
        GcPolicy::default(),
        SyncConfigBuilder::new().max_batch_size(3).build(),
    );
    let (mut rep_b, mut inbox_b) = replicator(&store_b, tb, &["a"]);

    let gid = GroupId::from_string("team");
    let id = store_a
        .write()
        .create(EntityKind::List, &gid, BTreeMap::new(), &PrincipalId::from("alice"))
        .unwrap();
    for i in 0..7 {
        store_a
            .write()
            .list_push(&id, Value::Int(i), &PrincipalId::from("alice"))
            .unwrap();
    }

    let sent = rep_a.broadcast_pending().await.unwrap();
    assert_eq!(sent, 8);

    // 8 ops at 3 per batch arrive in 3 batches.
    let mut batches = 0;
    let mut applied = 0;
    while applied < 8 {
        let batch = inbox_b.recv().await.unwrap();
        assert!(batch.ops.len() <= 3);
        applied += rep_b.handle_batch(batch).applied;
        batches += 1;
    }
    assert_eq!(batches, 3);
    assert_eq!(store_b.read().list_len(&id).unwrap(), 7);
}

#[tokio::test]
async fn test_heartbeats_drive_collection() {
    let mut mesh = full_mesh(&[ReplicaId::new("a"), ReplicaId::new("b")]);
    let tb = mesh.pop().unwrap();
    let ta = mesh.pop().unwrap();

    let store_a = shared_store("a");
    let store_b = shared_store("b");
    let (mut rep_a, mut inbox_a) = replicator(&store_a, ta, &["b"]);
    let (mut rep_b, mut inbox_b) = replicator(&store_b, tb, &["a"]);

    let gid = GroupId::from_string("team");
    let id = store_a
        .write()
        .create(EntityKind::Map, &gid, BTreeMap::new(), &PrincipalId::from("alice"))
        .unwrap();
    store_a
        .write()
        .tombstone(&id, &PrincipalId::from("alice"))
        .unwrap();

    rep_a.broadcast_pending().await.unwrap();
    let batch = inbox_b.recv().await.unwrap();
    rep_b.handle_batch(batch);

    // a has no acknowledgement from b yet, so nothing is stable there.
    assert_eq!(rep_a.collect_stable(), 0);
    assert_eq!(
        store_a.read().state(&id),
        Some(LifecycleState::Tombstoned)
    );

    // b's heartbeat carries its frontier back; now a may purge.
    rep_b.heartbeat().await.unwrap();
    let ack = inbox_a.recv().await.unwrap();
    assert!(ack.is_heartbeat());
    rep_a.handle_batch(ack);

    assert_eq!(store_a.read().state(&id), Some(LifecycleState::Collected));
}

#[tokio::test]
async fn test_background_pump_converges() {
    let mut mesh = full_mesh(&[ReplicaId::new("a"), ReplicaId::new("b")]);
    let tb = mesh.pop().unwrap();
    let ta = mesh.pop().unwrap();

    let store_a = shared_store("a");
    let store_b = shared_store("b");
    let (rep_a, inbox_a) = replicator(&store_a, ta, &["b"]);
    let (rep_b, inbox_b) = replicator(&store_b, tb, &["a"]);

    let pump_a = tokio::spawn(rep_a.run(inbox_a));
    let pump_b = tokio::spawn(rep_b.run(inbox_b));

    let gid = GroupId::from_string("team");
    let id = store_a
        .write()
        .create(
            EntityKind::Map,
            &gid,
            BTreeMap::from([("status".to_string(), Value::from("open"))]),
            &PrincipalId::from("alice"),
        )
        .unwrap();

    // Wait for the pump to carry it across.
    let mut converged = false;
    for _ in 0..200 {
        if store_b.read().field(&id, "status").ok() == Some(Some(Value::from("open"))) {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(converged, "replica b never saw the entity");

    pump_a.abort();
    pump_b.abort();
}

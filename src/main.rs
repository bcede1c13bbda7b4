//! Scenario walkthrough for Driftstore.
//!
//! Runs the canonical replication scenarios end to end: an offline
//! last-writer-wins conflict observed in both delivery orders, concurrent
//! list-head inserts, and a partition that heals through the background
//! replicator with tombstone collection.

use drift_access::{AccessGroup, GroupId, PrincipalId, Role};
use drift_clock::{ReplicaContext, ReplicaId};
use drift_compaction::GcPolicy;
use drift_store::{EntityKind, LifecycleState, Value, ValueStore};
use drift_sync::{full_mesh, Replicator, SyncConfigBuilder, SyncTransport};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async_main());
}

async fn async_main() {
    banner("OFFLINE LWW CONFLICT, BOTH DELIVERY ORDERS");
    lww_conflict_demo();

    banner("CONCURRENT HEAD INSERTS");
    head_insert_demo();

    banner("PARTITION, HEAL AND COLLECT");
    partition_demo().await;

    println!("\nAll scenarios converged.");
}

fn banner(title: &str) {
    println!("\n=== {title} ===");
}

fn team() -> AccessGroup {
    let mut group = AccessGroup::new(GroupId::from_string("team"));
    group.insert(PrincipalId::from("alice"), Role::Admin);
    group.insert(PrincipalId::from("bob"), Role::Write);
    group
}

fn replica(name: &str) -> ValueStore {
    let mut store = ValueStore::new(ReplicaContext::new(name));
    store.access_mut().register_group(team());
    store
}

/// Two devices edit the same field offline; two observers receive the edits
/// in opposite orders and still agree.
fn lww_conflict_demo() {
    let gid = GroupId::from_string("team");
    let alice = PrincipalId::from("alice");
    let bob = PrincipalId::from("bob");

    let mut phone = replica("phone");
    let mut laptop = replica("laptop");
    let mut obs1 = replica("obs1");
    let mut obs2 = replica("obs2");

    let id = phone
        .create(
            EntityKind::Map,
            &gid,
            BTreeMap::from([("rating".to_string(), Value::Int(3))]),
            &alice,
        )
        .expect("create");
    let create = phone.take_outbound();
    for store in [&mut laptop, &mut obs1, &mut obs2] {
        store.apply_remote(&create);
    }

    phone.set(&id, "rating", Value::Int(5), &alice).expect("set");
    laptop.set(&id, "note", Value::from("revisit"), &bob).expect("set");
    laptop.set(&id, "rating", Value::Int(2), &bob).expect("set");

    let early = phone.take_outbound();
    let late = laptop.take_outbound();

    obs1.apply_remote(&early);
    obs1.apply_remote(&late);
    obs2.apply_remote(&late);
    obs2.apply_remote(&early);

    println!(
        "obs1 rating: {:?}",
        obs1.field(&id, "rating").expect("field")
    );
    println!(
        "obs2 rating: {:?}",
        obs2.field(&id, "rating").expect("field")
    );
    assert_eq!(obs1.fields(&id).expect("fields"), obs2.fields(&id).expect("fields"));
    println!("observers agree on all fields");
}

/// Two replicas insert at the head of the same list concurrently; everyone
/// converges on one deterministic order.
fn head_insert_demo() {
    let gid = GroupId::from_string("team");
    let alice = PrincipalId::from("alice");
    let bob = PrincipalId::from("bob");

    let mut a = replica("a");
    let mut b = replica("b");

    let id = a
        .create(EntityKind::List, &gid, BTreeMap::new(), &alice)
        .expect("create");
    b.apply_remote(&a.take_outbound());

    a.list_insert(&id, 0, Value::from("X"), &alice).expect("insert");
    b.list_insert(&id, 0, Value::from("Y"), &bob).expect("insert");

    let from_a = a.take_outbound();
    let from_b = b.take_outbound();
    a.apply_remote(&from_b);
    b.apply_remote(&from_a);

    println!("a sees: {:?}", a.list_values(&id).expect("list"));
    println!("b sees: {:?}", b.list_values(&id).expect("list"));
    assert_eq!(a.list_values(&id).expect("list"), b.list_values(&id).expect("list"));
}

/// Background replicators over an in-memory mesh: a partitioned replica
/// catches up on heal, and a tombstone is collected once everyone has
/// acknowledged it.
async fn partition_demo() {
    let gid = GroupId::from_string("team");
    let alice = PrincipalId::from("alice");
    let bob = PrincipalId::from("bob");

    let mut mesh = full_mesh(&[ReplicaId::new("a"), ReplicaId::new("b")]);
    let tb = mesh.pop().expect("transport b");
    let ta = mesh.pop().expect("transport a");

    let store_a = Arc::new(RwLock::new(replica("a")));
    let store_b = Arc::new(RwLock::new(replica("b")));

    let ta = Arc::new(ta);
    let tb = Arc::new(tb);
    let inbox_a = ta.subscribe();
    let inbox_b = tb.subscribe();
    let config = SyncConfigBuilder::new().sync_interval(20).build();

    let mut rep_a = Replicator::new(
        Arc::clone(&store_a),
        Arc::clone(&ta),
        GcPolicy::default(),
        config.clone(),
    );
    rep_a.register_peer(ReplicaId::new("b"));
    let mut rep_b = Replicator::new(
        Arc::clone(&store_b),
        Arc::clone(&tb),
        GcPolicy::default(),
        config,
    );
    rep_b.register_peer(ReplicaId::new("a"));

    // Edits made while "offline": nothing pumps until the tasks start.
    let doc = store_a
        .write()
        .create(
            EntityKind::Map,
            &gid,
            BTreeMap::from([("status".to_string(), Value::from("open"))]),
            &alice,
        )
        .expect("create");
    let stale = store_a
        .write()
        .create(EntityKind::Map, &gid, BTreeMap::new(), &alice)
        .expect("create");
    store_a.write().tombstone(&stale, &alice).expect("tombstone");

    let pump_a = tokio::spawn(rep_a.run(inbox_a));
    let pump_b = tokio::spawn(rep_b.run(inbox_b));

    wait_for(|| store_b.read().get(&doc).is_ok()).await;
    println!("b caught up: {:?}", store_b.read().fields(&doc).expect("fields"));

    store_b
        .write()
        .set(&doc, "status", Value::from("resolved"), &bob)
        .expect("set");
    wait_for(|| {
        store_a.read().field(&doc, "status").ok() == Some(Some(Value::from("resolved")))
    })
    .await;
    println!("a caught up: {:?}", store_a.read().fields(&doc).expect("fields"));

    wait_for(|| store_a.read().state(&stale) == Some(LifecycleState::Collected)).await;
    println!("tombstoned entity collected after both replicas acknowledged");

    pump_a.abort();
    pump_b.abort();
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scenario did not converge in time");
}

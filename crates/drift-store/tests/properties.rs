//! Property tests: merge order never changes the converged state.

use drift_access::{AccessGroup, GroupId, PrincipalId, Role};
use drift_clock::ReplicaContext;
use drift_store::{EntityKind, Operation, Value, ValueStore};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

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

fn author(idx: usize) -> PrincipalId {
    if idx == 0 {
        PrincipalId::from("alice")
    } else {
        PrincipalId::from("bob")
    }
}

/// One randomly chosen local edit.
#[derive(Clone, Debug)]
enum Edit {
    Set { field: u8, value: i64 },
    Remove { field: u8 },
    Insert { slot: u8, value: i64 },
    Delete { slot: u8 },
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..4u8, -100..100i64).prop_map(|(field, value)| Edit::Set { field, value }),
        (0..4u8).prop_map(|field| Edit::Remove { field }),
        (0..8u8, -100..100i64).prop_map(|(slot, value)| Edit::Insert { slot, value }),
        (0..8u8).prop_map(|slot| Edit::Delete { slot }),
    ]
}

fn shuffled(ops: &[Operation], seed: u64) -> Vec<Operation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = ops.to_vec();
    out.shuffle(&mut rng);
    out
}

proptest! {
    #[test]
    fn prop_map_edits_converge_in_any_order(
        edits in proptest::collection::vec((0..2usize, edit_strategy()), 1..24),
        seed_a in any::<u64>(),
        seed_b in any::<u64>(),
    ) {
        let mut a = replica("a");
        let mut b = replica("b");
        let gid = GroupId::from_string("team");

        let id = a.create(EntityKind::Map, &gid, BTreeMap::new(), &author(0)).unwrap();
        let create = a.take_outbound();
        b.apply_remote(&create);

        for (who, edit) in &edits {
            let store = if *who == 0 { &mut a } else { &mut b };
            match edit {
                Edit::Set { field, value } | Edit::Insert { slot: field, value } => {
                    store.set(&id, format!("f{field}"), Value::Int(*value), &author(*who)).unwrap();
                }
                Edit::Remove { field } | Edit::Delete { slot: field } => {
                    store.remove_field(&id, format!("f{field}"), &author(*who)).unwrap();
                }
            }
        }

        let from_a = a.take_outbound();
        let from_b = b.take_outbound();
        a.apply_remote(&shuffled(&from_b, seed_a));
        b.apply_remote(&shuffled(&from_a, seed_b));

        prop_assert_eq!(a.fields(&id).unwrap(), b.fields(&id).unwrap());
        prop_assert_eq!(
            a.get(&id).unwrap().meta.version,
            b.get(&id).unwrap().meta.version
        );
    }

    #[test]
    fn prop_list_edits_converge_in_any_order(
        edits in proptest::collection::vec((0..2usize, edit_strategy()), 1..24),
        seed_a in any::<u64>(),
        seed_b in any::<u64>(),
    ) {
        let mut a = replica("a");
        let mut b = replica("b");
        let gid = GroupId::from_string("team");

        let id = a.create(EntityKind::List, &gid, BTreeMap::new(), &author(0)).unwrap();
        let create = a.take_outbound();
        b.apply_remote(&create);

        for (who, edit) in &edits {
            let store = if *who == 0 { &mut a } else { &mut b };
            match edit {
                Edit::Set { value, .. } | Edit::Insert { value, .. } => {
                    let len = store.list_len(&id).unwrap();
                    let index = if len == 0 { 0 } else { (*value).unsigned_abs() as usize % (len + 1) };
                    store.list_insert(&id, index, Value::Int(*value), &author(*who)).unwrap();
                }
                Edit::Remove { field: slot } | Edit::Delete { slot } => {
                    let len = store.list_len(&id).unwrap();
                    if len > 0 {
                        store.list_delete(&id, *slot as usize % len, &author(*who)).unwrap();
                    }
                }
            }
        }

        let from_a = a.take_outbound();
        let from_b = b.take_outbound();
        a.apply_remote(&shuffled(&from_b, seed_a));
        b.apply_remote(&shuffled(&from_a, seed_b));

        prop_assert_eq!(a.list_values(&id).unwrap(), b.list_values(&id).unwrap());
    }

    #[test]
    fn prop_redelivery_is_idempotent(
        edits in proptest::collection::vec((0..2usize, edit_strategy()), 1..16),
        seed in any::<u64>(),
    ) {
        let mut a = replica("a");
        let mut b = replica("b");
        let gid = GroupId::from_string("team");

        let id = a.create(EntityKind::Map, &gid, BTreeMap::new(), &author(0)).unwrap();
        b.apply_remote(&a.take_outbound());

        for (who, edit) in &edits {
            let store = if *who == 0 { &mut a } else { &mut b };
            match edit {
                Edit::Set { field, value } | Edit::Insert { slot: field, value } => {
                    store.set(&id, format!("f{field}"), Value::Int(*value), &author(*who)).unwrap();
                }
                Edit::Remove { field } | Edit::Delete { slot: field } => {
                    store.remove_field(&id, format!("f{field}"), &author(*who)).unwrap();
                }
            }
        }

        let from_a = a.take_outbound();
        let from_b = b.take_outbound();

        let first = b.apply_remote(&from_a);
        let fields_after_first = b.fields(&id).unwrap();
        let version_after_first = b.get(&id).unwrap().meta.version;

        let again = b.apply_remote(&shuffled(&from_a, seed));
        prop_assert_eq!(first.applied, from_a.len());
        prop_assert_eq!(again.duplicates, from_a.len());
        prop_assert_eq!(again.applied, 0);
        prop_assert_eq!(b.fields(&id).unwrap(), fields_after_first);
        prop_assert_eq!(b.get(&id).unwrap().meta.version, version_after_first);

        a.apply_remote(&from_b);
        prop_assert_eq!(a.fields(&id).unwrap(), b.fields(&id).unwrap());
    }
}
